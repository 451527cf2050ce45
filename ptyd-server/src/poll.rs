// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Readiness wait for the main loop.

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::io;
use std::os::fd::BorrowedFd;

/// Blocks until at least one descriptor is readable (or hung up) and
/// returns a parallel array of ready flags. No timeout: the supervisor
/// sleeps until signal or socket activity.
pub fn wait_readable<const N: usize>(fds: [BorrowedFd<'_>; N]) -> io::Result<[bool; N]> {
    let mut poll_fds = fds.map(|fd| PollFd::new(fd, PollFlags::POLLIN));
    loop {
        match poll(&mut poll_fds, PollTimeout::NONE) {
            Err(Errno::EINTR) => continue,
            Err(err) => return Err(err.into()),
            Ok(_) => break,
        }
    }
    // Hangup and error count as readable: the subsequent read is what
    // discovers and reports the disconnect.
    Ok(poll_fds.map(|poll_fd| {
        poll_fd.revents().is_some_and(|revents| {
            revents.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR)
        })
    }))
}
