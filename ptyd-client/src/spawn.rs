// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Spawning the supervisor from the client.
//!
//! The rendezvous path must encode the server's pid, which does not exist
//! until fork returns — and argv is sealed before that. So the parent
//! computes the path from the child pid and hands it down a one-shot pipe;
//! the child reads it with nothing but async-signal-safe calls and passes
//! it along as the server's argv[1]. The spawner stays the one choosing the
//! path.

use crate::rendezvous;
use nix::errno::Errno;
use nix::sys::socket::{socketpair, AddressFamily, SockFlag, SockType};
use nix::unistd::{fork, ForkResult, Pid};
use ptyd_spawn::write_str;
use std::ffi::CString;
use std::io::{self, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::ffi::OsStringExt;
use std::os::unix::net::UnixStream;

pub(crate) fn spawn_server() -> io::Result<(UnixStream, Pid)> {
    let (client_end, server_end) = socketpair(
        AddressFamily::Unix,
        SockType::Stream,
        None,
        // No SOCK_CLOEXEC: the server end must survive into the exec'd child.
        SockFlag::empty(),
    )
    .map_err(io::Error::from)?;
    // Our end is long-lived though; keep it out of anything exec'd later.
    unsafe {
        libc::fcntl(client_end.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC);
    }
    let (path_read, path_write) = nix::unistd::pipe().map_err(io::Error::from)?;

    let binary = CString::new(rendezvous::server_binary().into_os_string().into_vec())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "server binary path"))?;
    let fd_arg = CString::new(server_end.as_raw_fd().to_string())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "fd argument"))?;

    // Safety: the child branch runs only the async-signal-safe exec helper.
    match unsafe { fork() }.map_err(io::Error::from)? {
        ForkResult::Child => child_exec_server(
            &binary,
            &fd_arg,
            path_read.as_raw_fd(),
            client_end.as_raw_fd(),
            path_write.as_raw_fd(),
        ),
        ForkResult::Parent { child } => {
            drop(server_end);
            drop(path_read);

            let path = rendezvous::socket_path(child.as_raw());
            let mut bytes = path.into_os_string().into_vec();
            bytes.push(0);
            let mut pipe = std::fs::File::from(path_write);
            pipe.write_all(&bytes)?;
            drop(pipe);

            Ok((UnixStream::from(client_end), child))
        }
    }
}

/// Between fork and exec. Reads the parent-chosen rendezvous path into a
/// stack buffer and execs `ptyd-server <path> <fd>`.
fn child_exec_server(
    binary: &CString,
    fd_arg: &CString,
    path_read: RawFd,
    client_end: RawFd,
    path_write: RawFd,
) -> ! {
    unsafe {
        libc::close(client_end);
        libc::close(path_write);
    }

    let mut buf = [0u8; 1024];
    let mut filled = 0;
    loop {
        if filled == buf.len() - 1 {
            break;
        }
        let rc = unsafe {
            libc::read(
                path_read,
                buf[filled..].as_mut_ptr() as *mut libc::c_void,
                buf.len() - 1 - filled,
            )
        };
        if rc < 0 {
            if Errno::last_raw() == libc::EINTR {
                continue;
            }
            break;
        }
        if rc == 0 {
            break;
        }
        filled += rc as usize;
        if buf[..filled].contains(&0) {
            break;
        }
    }
    unsafe {
        libc::close(path_read);
    }
    buf[filled] = 0;

    let argv: [*const libc::c_char; 4] = [
        binary.as_ptr(),
        buf.as_ptr() as *const libc::c_char,
        fd_arg.as_ptr(),
        std::ptr::null(),
    ];
    // Safety: argv is NULL-terminated and its strings outlive the call.
    unsafe {
        libc::execvp(binary.as_ptr(), argv.as_ptr());
    }
    write_str(2, "ptyd-client: could not exec the server binary\n");
    unsafe { libc::_exit(127) }
}
