// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Message types and their frame layouts.
//!
//! Four messages exist: the client sends `Launch`; the server answers with a
//! `LaunchResponse` (reusing the Launch type discriminant) and later pushes
//! `ReportChild` (replay only) and `Termination`. The PTY master descriptor
//! rides alongside `LaunchResponse` and `ReportChild` as ancillary data, not
//! inside the frame.

use crate::codec::{FrameEncoder, FrameParser, ProtocolError, Tag};
use bytes::Bytes;
use libc::pid_t;
use std::ffi::CString;

const TYPE_LAUNCH: i32 = 0;
const TYPE_REPORT_CHILD: i32 = 1;
const TYPE_TERMINATION: i32 = 2;

/// Client-chosen description of a child to start. `unique_id` is opaque to
/// the server, which stores it with the child's record and never interprets
/// it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub path: CString,
    pub argv: Vec<CString>,
    pub envp: Vec<CString>,
    pub width: i32,
    pub height: i32,
    pub is_utf8: bool,
    pub pwd: CString,
    pub unique_id: i64,
}

/// `status` is 0 on success, otherwise the captured errno from the failed
/// launch step. `pid` is only meaningful when `status` is 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchResponse {
    pub status: i32,
    pub pid: pid_t,
}

/// Replayed child announcement. Mirrors the original launch request;
/// `is_last` marks the final report of a replay burst.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildReport {
    pub is_last: bool,
    pub pid: pid_t,
    pub path: CString,
    pub argv: Vec<CString>,
    pub envp: Vec<CString>,
    pub is_utf8: bool,
    pub pwd: CString,
}

/// Raw wait status as returned by the reap, exit code and signal bits intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Termination {
    pub pid: pid_t,
    pub status: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Launch(LaunchRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Launch(LaunchResponse),
    ReportChild(ChildReport),
    Termination(Termination),
}

impl ClientMessage {
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut enc = FrameEncoder::new();
        match self {
            ClientMessage::Launch(launch) => {
                enc.put_tagged_int(Tag::Type, TYPE_LAUNCH)?;
                encode_launch(&mut enc, launch)?;
            }
        }
        Ok(enc.finish())
    }

    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        Self::decode_from(&mut FrameParser::new(frame))
    }

    /// Decodes one message, leaving the parser positioned after it. A
    /// descriptor-less payload can carry several frames back to back; the
    /// receive loop keeps calling this until the parser is exhausted.
    pub fn decode_from(parser: &mut FrameParser<'_>) -> Result<Self, ProtocolError> {
        match parser.tagged_int(Tag::Type)? {
            TYPE_LAUNCH => Ok(ClientMessage::Launch(decode_launch(parser)?)),
            // Server-originated; a client never sends these.
            t @ (TYPE_REPORT_CHILD | TYPE_TERMINATION) => {
                Err(ProtocolError::UnexpectedMessageType(t))
            }
            t => Err(ProtocolError::UnknownMessageType(t)),
        }
    }
}

impl ServerMessage {
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut enc = FrameEncoder::new();
        match self {
            ServerMessage::Launch(response) => {
                enc.put_tagged_int(Tag::Type, TYPE_LAUNCH)?;
                enc.put_tagged_int(Tag::LaunchResponseStatus, response.status)?;
                enc.put_tagged_int(Tag::LaunchResponsePid, response.pid)?;
            }
            ServerMessage::ReportChild(report) => {
                enc.put_tagged_int(Tag::Type, TYPE_REPORT_CHILD)?;
                enc.put_tagged_int(Tag::ReportChildIsLast, report.is_last as i32)?;
                enc.put_tagged_int(Tag::ReportChildPid, report.pid)?;
                enc.put_tagged_string(Tag::ReportChildPath, &report.path)?;
                enc.put_tagged_string_array(Tag::ReportChildArgs, &report.argv)?;
                enc.put_tagged_string_array(Tag::ReportChildEnv, &report.envp)?;
                // isUTF8 precedes pwd on the wire even though the tag values
                // are the other way around; both ends must agree.
                enc.put_tagged_int(Tag::ReportChildIsUtf8, report.is_utf8 as i32)?;
                enc.put_tagged_string(Tag::ReportChildPwd, &report.pwd)?;
            }
            ServerMessage::Termination(termination) => {
                enc.put_tagged_int(Tag::Type, TYPE_TERMINATION)?;
                enc.put_tagged_int(Tag::TerminationPid, termination.pid)?;
                enc.put_tagged_int(Tag::TerminationStatus, termination.status)?;
            }
        }
        Ok(enc.finish())
    }

    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        Self::decode_from(&mut FrameParser::new(frame))
    }

    pub fn decode_from(parser: &mut FrameParser<'_>) -> Result<Self, ProtocolError> {
        match parser.tagged_int(Tag::Type)? {
            TYPE_LAUNCH => Ok(ServerMessage::Launch(LaunchResponse {
                status: parser.tagged_int(Tag::LaunchResponseStatus)?,
                pid: parser.tagged_int(Tag::LaunchResponsePid)?,
            })),
            TYPE_REPORT_CHILD => Ok(ServerMessage::ReportChild(ChildReport {
                is_last: parser.tagged_int(Tag::ReportChildIsLast)? != 0,
                pid: parser.tagged_int(Tag::ReportChildPid)?,
                path: parser.tagged_string(Tag::ReportChildPath)?,
                argv: parser.tagged_string_array(Tag::ReportChildArgs)?,
                envp: parser.tagged_string_array(Tag::ReportChildEnv)?,
                is_utf8: parser.tagged_int(Tag::ReportChildIsUtf8)? != 0,
                pwd: parser.tagged_string(Tag::ReportChildPwd)?,
            })),
            TYPE_TERMINATION => Ok(ServerMessage::Termination(Termination {
                pid: parser.tagged_int(Tag::TerminationPid)?,
                status: parser.tagged_int(Tag::TerminationStatus)?,
            })),
            t => Err(ProtocolError::UnknownMessageType(t)),
        }
    }
}

fn encode_launch(enc: &mut FrameEncoder, launch: &LaunchRequest) -> Result<(), ProtocolError> {
    enc.put_tagged_string(Tag::LaunchPath, &launch.path)?;
    enc.put_tagged_string_array(Tag::LaunchArgv, &launch.argv)?;
    enc.put_tagged_string_array(Tag::LaunchEnvironment, &launch.envp)?;
    enc.put_tagged_int(Tag::LaunchWidth, launch.width)?;
    enc.put_tagged_int(Tag::LaunchHeight, launch.height)?;
    enc.put_tagged_int(Tag::LaunchIsUtf8, launch.is_utf8 as i32)?;
    enc.put_tagged_string(Tag::LaunchPwd, &launch.pwd)?;
    enc.put_tagged_long(Tag::LaunchUniqueId, launch.unique_id)?;
    Ok(())
}

fn decode_launch(parser: &mut FrameParser<'_>) -> Result<LaunchRequest, ProtocolError> {
    Ok(LaunchRequest {
        path: parser.tagged_string(Tag::LaunchPath)?,
        argv: parser.tagged_string_array(Tag::LaunchArgv)?,
        envp: parser.tagged_string_array(Tag::LaunchEnvironment)?,
        width: parser.tagged_int(Tag::LaunchWidth)?,
        height: parser.tagged_int(Tag::LaunchHeight)?,
        is_utf8: parser.tagged_int(Tag::LaunchIsUtf8)? != 0,
        pwd: parser.tagged_string(Tag::LaunchPwd)?,
        unique_id: parser.tagged_long(Tag::LaunchUniqueId)?,
    })
}
