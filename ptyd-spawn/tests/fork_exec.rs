// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg(unix)]

use nix::sys::wait::{waitpid, WaitStatus};
use ptyd_spawn::{exec_child, fork_pty, ForkPtyResult, PreparedExec, TtyState};
use std::ffi::CString;
use std::fs::File;
use std::io::Read;
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;

fn cstring(s: &str) -> CString {
    CString::new(s).unwrap()
}

/// Reads the master until the child is gone. EIO (Linux) or EOF (macOS)
/// marks the far end closed.
fn drain_master(master: std::os::fd::OwnedFd) -> String {
    let mut file = File::from(master);
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match file.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[test]
#[cfg_attr(miri, ignore)]
fn child_output_arrives_on_the_master() {
    let tty = TtyState::new(80, 24, true);
    let (conn, _peer) = UnixStream::pair().unwrap();
    let (deadman_read, deadman_write) = nix::unistd::pipe().unwrap();
    let prepared = PreparedExec::new(
        &cstring("/bin/echo"),
        &[cstring("echo"), cstring("pty-check")],
        &[cstring("PATH=/bin:/usr/bin")],
    );

    match unsafe { fork_pty(&tty, conn.as_fd(), deadman_write.as_fd()) }.unwrap() {
        ForkPtyResult::Child => exec_child(&prepared, &cstring("/")),
        ForkPtyResult::Parent { child, master } => {
            drop(deadman_write);
            drop(deadman_read);

            let output = drain_master(master);
            // ONLCR turns the echo's newline into CRLF.
            assert!(output.contains("pty-check"), "output: {output:?}");

            match waitpid(child, None).unwrap() {
                WaitStatus::Exited(_, 0) => {}
                other => panic!("unexpected exit status = {other:?}"),
            }
        }
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn exec_failure_reports_on_the_pty() {
    let tty = TtyState::new(80, 24, false);
    let (conn, _peer) = UnixStream::pair().unwrap();
    let (_deadman_read, deadman_write) = nix::unistd::pipe().unwrap();
    let prepared = PreparedExec::new(
        &cstring("/no/such/binary"),
        &[cstring("ghost")],
        &[],
    );

    match unsafe { fork_pty(&tty, conn.as_fd(), deadman_write.as_fd()) }.unwrap() {
        ForkPtyResult::Child => exec_child(&prepared, &cstring("/")),
        ForkPtyResult::Parent { child, master } => {
            drop(deadman_write);

            let output = drain_master(master);
            assert!(output.contains("## exec failed ##"), "output: {output:?}");
            assert!(output.contains("/no/such/binary"), "output: {output:?}");
            assert!(
                output.contains("No such file or directory"),
                "output: {output:?}"
            );

            match waitpid(child, None).unwrap() {
                WaitStatus::Exited(_, 1) => {}
                other => panic!("unexpected exit status = {other:?}"),
            }
        }
    }
}
