// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The exec half of child startup.
//!
//! `execve` needs NULL-terminated pointer arrays, and building those takes
//! allocation, so the whole layout is prepared in the parent as a
//! [`PreparedExec`] and the child merely dereferences it.

use crate::rlimit::restore_saved_limits;
use crate::signal_safe::{write_bytes, write_int, write_str};
use nix::errno::Errno;
use std::ffi::{CStr, CString};
use std::ptr;

pub struct PreparedExec {
    path: CString,
    // Owners of the bytes the pointer arrays reference. CString storage is
    // heap-stable, so moving this struct does not invalidate the pointers.
    _argv: Vec<CString>,
    _envp: Vec<CString>,
    argv_ptrs: Vec<*const libc::c_char>,
    envp_ptrs: Vec<*const libc::c_char>,
}

impl PreparedExec {
    pub fn new(path: &CStr, argv: &[CString], envp: &[CString]) -> PreparedExec {
        let argv = argv.to_vec();
        let envp = envp.to_vec();
        let argv_ptrs = argv
            .iter()
            .map(|arg| arg.as_ptr())
            .chain(std::iter::once(ptr::null()))
            .collect();
        let envp_ptrs = envp
            .iter()
            .map(|var| var.as_ptr())
            .chain(std::iter::once(ptr::null()))
            .collect();
        PreparedExec {
            path: path.to_owned(),
            _argv: argv,
            _envp: envp,
            argv_ptrs,
            envp_ptrs,
        }
    }

    pub fn path(&self) -> &CStr {
        &self.path
    }

    /// Returns only if `execve` failed.
    fn exec(&self) -> Errno {
        // Safety: the pointer arrays are NULL-terminated and their referents
        // live in self.
        unsafe {
            libc::execve(
                self.path.as_ptr(),
                self.argv_ptrs.as_ptr(),
                self.envp_ptrs.as_ptr(),
            );
        }
        Errno::last()
    }
}

/// Finishes child startup after the descriptor dance and never returns.
///
/// Runs between fork and exec: signal dispositions back to default, SIGPIPE
/// unblocked, every descriptor above the four renumbered ones closed, saved
/// resource limits restored, working directory changed, and the
/// environment wholly replaced by the request's. On exec failure a
/// human-readable note lands on fd 1 — the PTY slave, so it shows up in the
/// terminal — then the child lingers a moment and exits.
pub fn exec_child(prepared: &PreparedExec, pwd: &CStr) -> ! {
    unsafe {
        // Do not start the new program with inherited handlers.
        libc::signal(libc::SIGCHLD, libc::SIG_DFL);
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        let mut signals: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut signals);
        libc::sigaddset(&mut signals, libc::SIGPIPE);
        libc::sigprocmask(libc::SIG_UNBLOCK, &signals, ptr::null_mut());
    }

    // Precisely four descriptors survive into the child: the renumbered
    // 0..=3. Everything else the supervisor had open (other children's
    // masters, the self-pipe, the listener) is swept away here.
    let limit = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
    let limit = if limit < 0 { 1024 } else { limit as i32 };
    for fd in 4..limit {
        unsafe {
            libc::close(fd);
        }
    }

    restore_saved_limits();

    // A missing directory is not worth dying over; the child starts in the
    // supervisor's cwd instead.
    unsafe {
        libc::chdir(pwd.as_ptr());
    }

    let errno = prepared.exec();

    write_str(1, "## exec failed ##\n");
    write_str(1, "Program: ");
    write_bytes(1, prepared.path().to_bytes());
    if errno == Errno::ENOENT {
        write_str(1, "\nNo such file or directory\n");
    } else {
        write_str(1, "\nErrno: ");
        write_int(1, errno as i32 as i64);
        write_str(1, "\n");
    }

    // Give the host a beat to read the diagnostic off the master.
    unsafe {
        libc::sleep(1);
        libc::_exit(1);
    }
}
