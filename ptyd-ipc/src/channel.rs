// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Blocking fd-passing transport over a Unix-domain stream socket.
//!
//! One encoded frame travels per `sendmsg`/`recvmsg`; frames never span
//! socket reads. At most one file descriptor accompanies a message as
//! `SCM_RIGHTS` ancillary data. A received descriptor belongs to the caller
//! the moment `recv` returns; discarding the message does not discard the
//! descriptor.

use crate::codec::MAX_FRAME_SIZE;
use sendfd::{RecvWithFd, SendWithFd};
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::time::Duration;

/// At most one descriptor rides along with any message.
const MAX_PASSED_FDS: usize = 1;

pub struct Channel {
    stream: UnixStream,
}

impl From<UnixStream> for Channel {
    fn from(stream: UnixStream) -> Self {
        Channel { stream }
    }
}

impl AsFd for Channel {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.stream.as_fd()
    }
}

impl Channel {
    /// Connected pair, one end per peer.
    pub fn pair() -> io::Result<(Channel, Channel)> {
        let (a, b) = UnixStream::pair()?;
        Ok((Channel::from(a), Channel::from(b)))
    }

    pub fn send(&mut self, frame: &[u8]) -> io::Result<usize> {
        self.send_with_fds(frame, &[])
    }

    pub fn send_with_fd(&mut self, frame: &[u8], fd: BorrowedFd<'_>) -> io::Result<usize> {
        self.send_with_fds(frame, &[fd.as_raw_fd()])
    }

    fn send_with_fds(&mut self, frame: &[u8], fds: &[RawFd]) -> io::Result<usize> {
        loop {
            match self.stream.send_with_fd(frame, fds) {
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                other => return other,
            }
        }
    }

    /// Receives one `recvmsg` worth of data. A payload carrying a
    /// descriptor is always a single frame (ancillary data is never merged
    /// with neighboring messages); a descriptor-less payload may hold
    /// several back-to-back frames, which the caller decodes sequentially.
    /// EOF surfaces as `UnexpectedEof`: every transport failure means the
    /// peer is gone.
    pub fn recv(&mut self) -> io::Result<(Vec<u8>, Option<OwnedFd>)> {
        let mut payload = vec![0; MAX_FRAME_SIZE];
        let mut fds = [0; MAX_PASSED_FDS];
        loop {
            match self.stream.recv_with_fd(&mut payload, &mut fds) {
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
                Ok((0, 0)) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok((bytes, received_fds)) => {
                    // Safety: the kernel just handed us this descriptor; it
                    // is open and nothing else owns it.
                    let fd = (received_fds > 0)
                        .then(|| unsafe { OwnedFd::from_raw_fd(fds[0]) });
                    payload.truncate(bytes);
                    return Ok((payload, fd));
                }
            }
        }
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(timeout)
    }

    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_write_timeout(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::{Read, Seek, Write};

    #[test]
    fn message_without_fd() {
        let (mut a, mut b) = Channel::pair().unwrap();
        a.send(b"hello").unwrap();
        let (payload, fd) = b.recv().unwrap();
        assert_eq!(payload, b"hello");
        assert!(fd.is_none());
    }

    #[test]
    fn message_with_fd_transfers_ownership() {
        let (mut a, mut b) = Channel::pair().unwrap();

        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"through the wall").unwrap();
        file.rewind().unwrap();

        a.send_with_fd(b"take this", file.as_fd()).unwrap();
        drop(file);

        let (payload, fd) = b.recv().unwrap();
        assert_eq!(payload, b"take this");
        let mut received = File::from(fd.expect("descriptor was passed"));
        let mut contents = String::new();
        received.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "through the wall");
    }

    #[test]
    fn eof_reports_disconnect() {
        let (a, mut b) = Channel::pair().unwrap();
        drop(a);
        let err = b.recv().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn fd_accompanies_its_own_message() {
        // Ancillary data stops the kernel from merging an fd-carrying
        // message with its neighbors, so a payload that arrives with a
        // descriptor is exactly one frame.
        let (mut a, mut b) = Channel::pair().unwrap();
        let file = tempfile::tempfile().unwrap();
        a.send(b"plain").unwrap();
        a.send_with_fd(b"carrier", file.as_fd()).unwrap();

        let (payload, fd) = b.recv().unwrap();
        assert_eq!(payload, b"plain");
        assert!(fd.is_none());
        let (payload, fd) = b.recv().unwrap();
        assert_eq!(payload, b"carrier");
        assert!(fd.is_some());
    }
}
