// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The multiplexing PTY supervisor.
//!
//! A single-threaded, select-driven daemon that owns the controlling
//! terminals of many interactive children on behalf of a GUI host. The host
//! may crash and come back: children keep running, and on reattach the
//! supervisor replays every live child together with its PTY master
//! descriptor, so no output is lost.

#![cfg(unix)]

pub mod config;
pub mod launch;
pub mod poll;
pub mod registry;
pub mod signals;
pub mod supervisor;

use ptyd_ipc::{ProtocolError, ServerMessage};
use std::io;

/// Any malformed or out-of-place frame is fatal for the connection, so
/// protocol errors collapse into the transport error type at the boundary.
pub(crate) fn encode_frame(message: &ServerMessage) -> io::Result<bytes::Bytes> {
    message
        .encode()
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

pub(crate) fn protocol_violation(err: ProtocolError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}
