// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Signal dispositions for the supervisor process.
//!
//! The handlers touch nothing but statics prepared before installation:
//! SIGCHLD's entire job is a one-byte write to the self-pipe, and SIGUSR1
//! unlinks the rendezvous path and exits. Reaping, logging, and everything
//! else that wants memory happens in the main loop.

use anyhow::Context;
use nix::sys::signal::{
    sigaction, sigprocmask, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal,
};
use std::ffi::CString;
use std::os::fd::{IntoRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicI32, AtomicPtr, Ordering};

static SELF_PIPE_WRITE: AtomicI32 = AtomicI32::new(-1);
static RENDEZVOUS_PATH: AtomicPtr<libc::c_char> = AtomicPtr::new(ptr::null_mut());

extern "C" fn on_sigchld(_signum: libc::c_int) {
    let fd = SELF_PIPE_WRITE.load(Ordering::Relaxed);
    if fd >= 0 {
        // A doorbell; the byte's value is ignored. Short writes mean the
        // pipe is already full of wakeups, which is just as good.
        unsafe {
            libc::write(fd, b"c".as_ptr() as *const libc::c_void, 1);
        }
    }
}

extern "C" fn on_sigusr1(_signum: libc::c_int) {
    let path = RENDEZVOUS_PATH.load(Ordering::Relaxed);
    if !path.is_null() {
        unsafe {
            libc::unlink(path);
        }
    }
    unsafe { libc::_exit(1) }
}

/// Installs all four dispositions and returns the self-pipe read end.
/// Call once, before the first child can exist.
pub fn install(rendezvous: &Path) -> anyhow::Result<OwnedFd> {
    let (pipe_read, pipe_write) = nix::unistd::pipe().context("self-pipe")?;
    SELF_PIPE_WRITE.store(pipe_write.into_raw_fd(), Ordering::SeqCst);

    let path = CString::new(rendezvous.as_os_str().as_bytes()).context("rendezvous path")?;
    RENDEZVOUS_PATH.store(path.into_raw(), Ordering::SeqCst);

    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    let chld = SigAction::new(
        SigHandler::Handler(on_sigchld),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    let usr1 = SigAction::new(
        SigHandler::Handler(on_sigusr1),
        SaFlags::empty(),
        SigSet::empty(),
    );

    // Safety: the handlers are async-signal-safe and their statics are
    // populated above, before any signal can arrive.
    unsafe {
        // Raised when the host GUI dies; must not take the server with it.
        sigaction(Signal::SIGHUP, &ignore).context("SIGHUP")?;
        // A peer that vanished mid-send surfaces as EPIPE instead.
        sigaction(Signal::SIGPIPE, &ignore).context("SIGPIPE")?;
        sigaction(Signal::SIGCHLD, &chld).context("SIGCHLD")?;
        sigaction(Signal::SIGUSR1, &usr1).context("SIGUSR1")?;
    }

    // The spawner may have handed us a mask with SIGCHLD blocked.
    let mut unblock = SigSet::empty();
    unblock.add(Signal::SIGCHLD);
    sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&unblock), None).context("unblock SIGCHLD")?;

    Ok(pipe_read)
}
