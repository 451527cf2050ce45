// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! openpty + fork with the multiplexer's descriptor contract.
//!
//! The child must end up with exactly four descriptors, at fixed positions:
//!
//! | fd | purpose |
//! |----|---------|
//! | 0  | PTY master |
//! | 1  | PTY slave |
//! | 2  | connection socket (fd passing if exec goes wrong) |
//! | 3  | dead-man's-pipe write end; closes when the wrapper dies |

use crate::tty::TtyState;
use nix::errno::Errno;
use nix::unistd::{fork, ForkResult, Pid};
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;

const FDS_TO_RENUMBER: usize = 4;

pub enum ForkPtyResult {
    /// The supervisor side. The slave has been closed; the master is yours.
    Parent { child: Pid, master: OwnedFd },
    /// Descriptors 0..=3 are in their final positions; call
    /// [`crate::exec_child`] next and nothing else.
    Child,
}

/// Allocates a PTY initialized from `tty` and forks.
///
/// # Safety
///
/// Caller must uphold the usual fork-in-a-threaded-process rules: the child
/// branch may only use async-signal-safe operations until exec.
pub unsafe fn fork_pty(
    tty: &TtyState,
    conn: BorrowedFd<'_>,
    deadman_write: BorrowedFd<'_>,
) -> nix::Result<ForkPtyResult> {
    let mut master: RawFd = -1;
    let mut slave: RawFd = -1;
    let mut term = tty.term;
    let mut win = tty.win;
    // Safety: stack-local out-pointers; termios and winsize are plain data.
    let rc = unsafe {
        libc::openpty(&mut master, &mut slave, ptr::null_mut(), &mut term, &mut win)
    };
    if rc != 0 {
        return Err(Errno::last());
    }

    match unsafe { fork() } {
        Err(err) => {
            unsafe {
                libc::close(master);
                libc::close(slave);
            }
            Err(err)
        }
        Ok(ForkResult::Child) => {
            login_tty_multiplex(master, slave, conn.as_raw_fd(), deadman_write.as_raw_fd());
            Ok(ForkPtyResult::Child)
        }
        Ok(ForkResult::Parent { child }) => {
            unsafe {
                libc::close(slave);
            }
            // Safety: openpty handed this descriptor to us and nothing else
            // owns it; the child renumbered its own copy.
            let master = unsafe { OwnedFd::from_raw_fd(master) };
            Ok(ForkPtyResult::Parent { child, master })
        }
    }
}

/// Child-side descriptor renumbering. Like `login_tty`, but the master lands
/// on 0 and the slave on 1, with the socket and dead-man pipe behind them.
///
/// Sources may collide with target slots, so each source is first duped to
/// the smallest index that is neither a target, a source, nor an already
/// chosen temporary; then the temporaries are duped down onto 0..=3. The
/// temporary choice is deterministic, so the child's final table never
/// depends on what the supervisor had open.
fn login_tty_multiplex(master: RawFd, slave: RawFd, conn: RawFd, deadman_write: RawFd) {
    unsafe {
        libc::setsid();
        libc::ioctl(slave, libc::TIOCSCTTY as _, 0);
    }

    let orig = [master, slave, conn, deadman_write];
    // Targets, sources, and room for the four temporaries.
    let mut inuse = [
        0,
        1,
        2,
        3,
        master,
        slave,
        conn,
        deadman_write,
        -1,
        -1,
        -1,
        -1,
    ];
    let mut inuse_count = 2 * FDS_TO_RENUMBER;
    let mut temp = [-1; FDS_TO_RENUMBER];

    for (o, &original) in orig.iter().enumerate() {
        for candidate in 0..inuse.len() as RawFd {
            if !inuse[..inuse_count].contains(&candidate) {
                inuse[inuse_count] = candidate;
                inuse_count += 1;
                temp[o] = candidate;
                unsafe {
                    libc::dup2(original, candidate);
                    libc::close(original);
                }
                break;
            }
        }
    }

    // Each temporary's target position equals its index.
    for (target, &tmp) in temp.iter().enumerate() {
        unsafe {
            libc::dup2(tmp, target as RawFd);
            libc::close(tmp);
        }
    }
}
