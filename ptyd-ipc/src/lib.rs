// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wire protocol and fd-passing transport for the PTY supervisor.
//!
//! Frames are sequences of tagged, little-endian fields carried one per
//! `sendmsg`/`recvmsg` over a Unix-domain stream socket, with at most one
//! file descriptor attached as `SCM_RIGHTS` ancillary data. Both ends share
//! the compiled-in tag enumeration; there is no version negotiation.

#[cfg(unix)]
pub mod channel;
pub mod codec;
pub mod message;

#[cfg(unix)]
pub use channel::Channel;
pub use codec::{FrameEncoder, FrameParser, ProtocolError, Tag, MAX_FRAME_SIZE};
pub use message::{
    ChildReport, ClientMessage, LaunchRequest, LaunchResponse, ServerMessage, Termination,
};
