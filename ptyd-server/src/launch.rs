// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Launch request handling: fork a child onto a fresh PTY and answer with
//! the master descriptor, or with the captured errno and no descriptor.

use crate::encode_frame;
use crate::registry::ChildRegistry;
use nix::errno::Errno;
use nix::unistd::{access, AccessFlags, Pid};
use ptyd_ipc::{Channel, LaunchRequest, LaunchResponse, ServerMessage};
use ptyd_spawn::{exec_child, fork_pty, ForkPtyResult, PreparedExec, TtyState};
use std::io;
use std::os::fd::{AsFd, OwnedFd};
use tracing::{debug, warn};

/// Handles one Launch request end to end. A launch failure is answered, not
/// fatal; only a failed send tears the session down.
pub fn handle_launch(
    registry: &mut ChildRegistry,
    channel: &mut Channel,
    request: LaunchRequest,
) -> io::Result<()> {
    match spawn_child(&request, channel) {
        Ok((pid, master)) => {
            debug!(pid = pid.as_raw(), path = ?request.path, "child launched");
            let response = ServerMessage::Launch(LaunchResponse {
                status: 0,
                pid: pid.as_raw(),
            });
            let frame = encode_frame(&response)?;
            registry.add(request, master, pid);
            // The registry owns the master now; the client gets its own
            // reference through the kernel.
            let record = registry
                .get(pid)
                .ok_or_else(|| io::Error::other("record vanished"))?;
            channel.send_with_fd(&frame, record.master.as_fd())?;
        }
        Err(errno) => {
            warn!(path = ?request.path, %errno, "launch failed");
            let response = ServerMessage::Launch(LaunchResponse {
                status: errno as i32,
                pid: 0,
            });
            let frame = encode_frame(&response)?;
            channel.send(&frame)?;
        }
    }
    Ok(())
}

fn spawn_child(request: &LaunchRequest, channel: &Channel) -> Result<(Pid, OwnedFd), Errno> {
    // The parent never sees execve fail (that happens after fork), so an
    // unlaunchable path is caught here to put the real errno in the
    // response.
    access(request.path.as_c_str(), AccessFlags::X_OK)?;

    let tty = TtyState::new(request.width, request.height, request.is_utf8);
    let prepared = PreparedExec::new(&request.path, &request.argv, &request.envp);
    let (deadman_read, deadman_write) = nix::unistd::pipe()?;

    // Safety: the child branch calls nothing but exec_child, which stays
    // within the async-signal-safe envelope.
    match unsafe { fork_pty(&tty, channel.as_fd(), deadman_write.as_fd()) }? {
        ForkPtyResult::Child => exec_child(&prepared, &request.pwd),
        ForkPtyResult::Parent { child, master } => {
            // The child holds its own copies at fds 0..=3.
            drop(deadman_write);
            drop(deadman_read);
            Ok((child, master))
        }
    }
}
