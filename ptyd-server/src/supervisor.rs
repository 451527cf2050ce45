// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The single-threaded main loop and the accept/reattach loop around it.
//!
//! Exactly one client is served at a time. While a session is up, the loop
//! selects over the SIGCHLD self-pipe and the client socket; any transport
//! or protocol failure ends the session and control falls back to the
//! rendezvous listener, where the next client gets the registry replayed
//! before normal service resumes.

use crate::launch::handle_launch;
use crate::poll::wait_readable;
use crate::registry::ChildRegistry;
use crate::{encode_frame, protocol_violation};
use anyhow::Context;
use nix::unistd::Pid;
use ptyd_ipc::{Channel, ClientMessage, FrameParser, ServerMessage, Termination};
use std::fs;
use std::io;
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixListener;
use std::path::Path;
use tracing::{debug, info, warn};

pub struct Supervisor {
    registry: ChildRegistry,
    self_pipe: OwnedFd,
}

impl Supervisor {
    /// `self_pipe` is the read end returned by [`crate::signals::install`].
    pub fn new(self_pipe: OwnedFd) -> Supervisor {
        Supervisor {
            registry: ChildRegistry::new(),
            self_pipe,
        }
    }

    /// Serves the inherited initial connection, then alternates between
    /// accepting one client and serving it. Only a listener failure
    /// returns.
    pub fn run(&mut self, initial: Channel, rendezvous: &Path) -> anyhow::Result<()> {
        info!("entering main loop on inherited connection");
        self.serve_session(initial, false);

        let listener = bind_listener(rendezvous)
            .with_context(|| format!("bind rendezvous socket {}", rendezvous.display()))?;
        loop {
            let stream = match listener.accept() {
                Ok((stream, _addr)) => stream,
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err).context("accept"),
            };
            info!("client attached");
            self.serve_session(Channel::from(stream), true);
        }
    }

    /// One client session, start to disconnect. Dropping the channel on
    /// return closes the socket, which is what frees the listener for the
    /// next client.
    fn serve_session(&mut self, mut channel: Channel, replay: bool) {
        if replay {
            // Children may have died while nobody was attached; fold those
            // exits in first so the replay below announces them as
            // terminations rather than stale reports.
            self.reap_pending();
            if let Err(err) = self.replay(&mut channel) {
                debug!(%err, "client lost during replay");
                return;
            }
        }
        loop {
            let ready = match wait_readable([self.self_pipe.as_fd(), channel.as_fd()]) {
                Ok(ready) => ready,
                Err(err) => {
                    warn!(%err, "poll failed");
                    return;
                }
            };
            if ready[0] {
                self.drain_wakeup();
                if let Err(err) = self.reap_and_report(&mut channel) {
                    debug!(%err, "client lost while reporting a termination");
                    return;
                }
            }
            if ready[1] {
                if let Err(err) = self.handle_requests(&mut channel) {
                    debug!(%err, "session over");
                    return;
                }
            }
        }
    }

    /// One byte per wakeup; surplus doorbell bytes just wake us again for a
    /// no-op reap pass.
    fn drain_wakeup(&self) {
        let mut byte = [0u8; 1];
        let _ = unsafe {
            libc::read(
                self.self_pipe.as_raw_fd(),
                byte.as_mut_ptr() as *mut libc::c_void,
                1,
            )
        };
    }

    /// Nonblocking reap over every live record; announces and removes each
    /// reaped child. A failed send means the client is gone: the record
    /// stays, flagged terminated, for the next session's replay.
    fn reap_and_report(&mut self, channel: &mut Channel) -> io::Result<()> {
        for pid in self.registry.live_pids() {
            if let Some(status) = reap(pid) {
                debug!(pid = pid.as_raw(), status, "child exited");
                self.registry.mark_terminated(pid, status);
                self.report_termination(channel, pid)?;
            }
        }
        Ok(())
    }

    /// Mark-only variant used before a replay, when there is no session to
    /// report into yet.
    fn reap_pending(&mut self) {
        for pid in self.registry.live_pids() {
            if let Some(status) = reap(pid) {
                debug!(pid = pid.as_raw(), status, "child exited while detached");
                self.registry.mark_terminated(pid, status);
            }
        }
    }

    /// Sends the Termination for an already-marked record and, once the
    /// client has it, drops the record (closing the master).
    fn report_termination(&mut self, channel: &mut Channel, pid: Pid) -> io::Result<()> {
        let Some(record) = self.registry.get(pid) else {
            return Ok(());
        };
        let message = ServerMessage::Termination(Termination {
            pid: pid.as_raw(),
            status: record.status,
        });
        channel.send(&encode_frame(&message)?)?;
        self.registry.remove(pid);
        Ok(())
    }

    /// The replay burst. Terminations for children that died while we were
    /// detached go first; then every live child is reported in insertion
    /// order, master descriptor attached, with `isLast` on the final one —
    /// the burst always ends on the `isLast` report.
    fn replay(&mut self, channel: &mut Channel) -> io::Result<()> {
        for pid in self.registry.terminated_pids() {
            self.report_termination(channel, pid)?;
        }

        let count = self.registry.len();
        debug!(count, "replaying children");
        for (index, record) in self.registry.iter().enumerate() {
            let message = ServerMessage::ReportChild(record.report(index + 1 == count));
            let frame = encode_frame(&message)?;
            channel.send_with_fd(&frame, record.master.as_fd())?;
        }
        Ok(())
    }

    /// Reads one socket payload and dispatches every frame in it. The only
    /// request a client may originate is Launch; anything else is a
    /// protocol violation and fatal for the connection.
    fn handle_requests(&mut self, channel: &mut Channel) -> io::Result<()> {
        let (payload, fd) = channel.recv()?;
        // Clients have no business passing descriptors.
        drop(fd);

        let mut parser = FrameParser::new(&payload);
        while parser.remaining() > 0 {
            let request = ClientMessage::decode_from(&mut parser).map_err(protocol_violation)?;
            match request {
                ClientMessage::Launch(launch) => {
                    handle_launch(&mut self.registry, channel, launch)?
                }
            }
        }
        Ok(())
    }
}

/// Nonblocking reap of a single child. Returns the raw wait status when the
/// child has exited.
fn reap(pid: Pid) -> Option<i32> {
    let mut status: libc::c_int = 0;
    loop {
        let rc = unsafe { libc::waitpid(pid.as_raw(), &mut status, libc::WNOHANG) };
        if rc == pid.as_raw() {
            return Some(status);
        }
        if rc < 0 && nix::errno::Errno::last_raw() == libc::EINTR {
            continue;
        }
        // 0: still running. < 0: not our child (should not happen); treat
        // as still running rather than fabricating a status.
        return None;
    }
}

/// Binds the rendezvous listener. Stale socket files from a previous
/// incarnation are removed first; access control is the file mode.
fn bind_listener(path: &Path) -> io::Result<UnixListener> {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed stale rendezvous socket"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    let listener = UnixListener::bind(path)?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    info!(path = %path.display(), "listening for reattach");
    Ok(listener)
}
