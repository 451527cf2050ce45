// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Diagnostics that are legal between fork and exec: raw `write`, no
//! stdio, no allocation. Best effort by design; there is nowhere to
//! report a failure to.

use std::os::fd::RawFd;

pub fn write_bytes(fd: RawFd, bytes: &[u8]) {
    let mut written = 0;
    while written < bytes.len() {
        let rc = unsafe {
            libc::write(
                fd,
                bytes[written..].as_ptr() as *const libc::c_void,
                bytes.len() - written,
            )
        };
        if rc < 0 {
            match nix::errno::Errno::last_raw() {
                libc::EINTR | libc::EAGAIN => continue,
                _ => return,
            }
        }
        if rc == 0 {
            return;
        }
        written += rc as usize;
    }
}

pub fn write_str(fd: RawFd, message: &str) {
    write_bytes(fd, message.as_bytes());
}

/// Decimal rendering into a stack buffer; handles the full i64 range.
pub fn write_int(fd: RawFd, value: i64) {
    let mut buf = [0u8; 20]; // sign + 19 digits covers i64::MIN
    let mut pos = buf.len();
    let mut magnitude = value.unsigned_abs();
    loop {
        pos -= 1;
        buf[pos] = b'0' + (magnitude % 10) as u8;
        magnitude /= 10;
        if magnitude == 0 {
            break;
        }
    }
    if value < 0 {
        pos -= 1;
        buf[pos] = b'-';
    }
    write_bytes(fd, &buf[pos..]);
}
