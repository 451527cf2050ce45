// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The rendezvous path convention shared by create and attach.
//!
//! The spawner chooses the path and the server is told it via argv, so the
//! only thing both sides must agree on is this naming scheme.

use std::path::PathBuf;

const ENV_SOCKET_DIR: &str = "PTYD_SOCKET_DIR";
const DEFAULT_SOCKET_DIR: &str = "/tmp";

const ENV_SERVER_BIN: &str = "PTYD_SERVER_BIN";
const DEFAULT_SERVER_BIN: &str = "ptyd-server";

pub fn socket_dir() -> PathBuf {
    std::env::var_os(ENV_SOCKET_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_DIR))
}

/// Rendezvous socket for the server with the given pid.
pub fn socket_path(server_pid: libc::pid_t) -> PathBuf {
    socket_dir().join(format!("ptyd-{server_pid}.sock"))
}

/// The server executable `create` spawns; resolved through PATH unless
/// overridden.
pub fn server_binary() -> PathBuf {
    std::env::var_os(ENV_SERVER_BIN)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SERVER_BIN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_encodes_the_server_pid() {
        let path = socket_path(4321);
        let name = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(name, "ptyd-4321.sock");
    }

    #[test]
    fn paths_differ_per_pid() {
        assert_ne!(socket_path(1), socket_path(2));
    }
}
