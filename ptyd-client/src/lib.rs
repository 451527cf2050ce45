// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client attachment library for the PTY supervisor.
//!
//! Two ways in: [`create`] spawns a fresh server with a pre-connected
//! socketpair end as its first client, and [`Connection::attach`] connects
//! to a running server's rendezvous socket (after which the server replays
//! every live child, master descriptors included).
//!
//! All server-originated traffic — launch responses, child reports,
//! terminations — arrives on one blocking reader. Pull events with
//! [`Connection::next_event`] (or the `Iterator` impl), or hand an
//! [`EventSink`] to [`Connection::serve`] to have them dispatched
//! synchronously until the connection dies. Handlers must not block: the
//! reader is the session.

#![cfg(unix)]

pub mod rendezvous;
mod spawn;

use nix::unistd::Pid;
use ptyd_ipc::{Channel, ClientMessage, FrameParser, LaunchRequest, ServerMessage};
use std::collections::VecDeque;
use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::time::Duration;
use tracing::debug;

/// A server-originated message plus the descriptor that rode along with it,
/// if any. The descriptor is the caller's to close.
#[derive(Debug)]
pub struct ServerEvent {
    pub message: ServerMessage,
    pub fd: Option<OwnedFd>,
}

/// Callback sink for [`Connection::serve`]. Invoked synchronously from the
/// reader; must not block.
pub trait EventSink {
    fn on_message(&mut self, event: ServerEvent);
}

pub struct Connection {
    channel: Channel,
    server_pid: Pid,
    // Frames that arrived coalesced behind the one just returned.
    pending: VecDeque<ServerEvent>,
}

/// Spawns a server and returns the connection that is its initial client.
pub fn create() -> io::Result<Connection> {
    let (stream, server_pid) = spawn::spawn_server()?;
    debug!(server_pid = server_pid.as_raw(), "spawned supervisor");
    Ok(Connection::new(stream, server_pid))
}

impl Connection {
    fn new(stream: UnixStream, server_pid: Pid) -> Connection {
        Connection {
            channel: Channel::from(stream),
            server_pid,
            pending: VecDeque::new(),
        }
    }

    /// Connects to the rendezvous socket of a running server. The replay
    /// burst follows as ordinary events.
    pub fn attach(server_pid: libc::pid_t) -> io::Result<Connection> {
        let path = rendezvous::socket_path(server_pid);
        let stream = UnixStream::connect(&path)?;
        debug!(server_pid, path = %path.display(), "attached");
        Ok(Connection::new(stream, Pid::from_raw(server_pid)))
    }

    pub fn server_pid(&self) -> Pid {
        self.server_pid
    }

    /// Fire-and-forget: the response arrives later through the reader.
    pub fn launch(&mut self, request: LaunchRequest) -> io::Result<()> {
        let frame = ClientMessage::Launch(request)
            .encode()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        self.channel.send(&frame)?;
        Ok(())
    }

    /// Blocks for the next server-originated message. Any transport or
    /// parse failure means the session is over.
    pub fn next_event(&mut self) -> io::Result<ServerEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(event);
        }

        let (payload, fd) = self.channel.recv()?;
        let mut parser = FrameParser::new(&payload);
        let decode = |parser: &mut FrameParser<'_>| {
            ServerMessage::decode_from(parser)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
        };

        // A descriptor-carrying payload is always exactly one frame, so the
        // fd can only belong to the first message.
        let first = ServerEvent {
            message: decode(&mut parser)?,
            fd,
        };
        while parser.remaining() > 0 {
            let message = decode(&mut parser)?;
            self.pending.push_back(ServerEvent { message, fd: None });
        }
        Ok(first)
    }

    /// Reads until disconnect, handing every message to `sink` in arrival
    /// order. Returns the error that ended the session.
    pub fn serve(&mut self, sink: &mut dyn EventSink) -> io::Error {
        loop {
            match self.next_event() {
                Ok(event) => sink.on_message(event),
                Err(err) => return err,
            }
        }
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.channel.set_read_timeout(timeout)
    }
}

impl Iterator for Connection {
    type Item = io::Result<ServerEvent>;

    fn next(&mut self) -> Option<io::Result<ServerEvent>> {
        Some(self.next_event())
    }
}
