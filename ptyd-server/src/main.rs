// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `ptyd-server <rendezvous-path> <connection-fd>`
//!
//! Spawned by the client library with a connected socketpair end as its
//! initial client. The rendezvous path is where the listener goes once that
//! first client disconnects; SIGUSR1 unlinks it and exits.

use anyhow::Context;
use ptyd_ipc::Channel;
use ptyd_server::supervisor::Supervisor;
use ptyd_server::{config, signals};
use std::fs;
use std::os::fd::{FromRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    anyhow::ensure!(
        args.len() == 3,
        "usage: {} <rendezvous-path> <connection-fd>",
        args.first().map(String::as_str).unwrap_or("ptyd-server")
    );
    let rendezvous = PathBuf::from(&args[1]);
    let connection_fd: RawFd = args[2]
        .parse()
        .with_context(|| format!("connection fd {:?}", args[2]))?;

    config::enable_logging().ok();

    // Detach from the spawner's session so a terminal that launched us for
    // debugging cannot deliver job-control signals to the children.
    if let Err(err) = nix::unistd::setsid() {
        error!("setsid failed: {err}");
    }

    ptyd_spawn::save_limits();
    let self_pipe = signals::install(&rendezvous).context("install signal handlers")?;

    info!(pid = std::process::id(), "ptyd server starting");

    // Safety: the spawner's contract is that argv[2] is a connected,
    // inherited stream socket that nothing else owns.
    let initial = unsafe { UnixStream::from_raw_fd(connection_fd) };

    let mut supervisor = Supervisor::new(self_pipe);
    let result = supervisor.run(Channel::from(initial), &rendezvous);
    let _ = fs::remove_file(&rendezvous);
    result
}
