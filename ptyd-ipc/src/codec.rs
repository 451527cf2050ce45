// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Tagged frame encoding.
//!
//! Every field is introduced by a 4-byte tag naming its role, followed by a
//! fixed-width little-endian integer or a length-prefixed byte string. The
//! receiver knows which tag it expects next; a mismatch is a hard parse
//! error and the caller tears the connection down.

use bytes::{BufMut, Bytes, BytesMut};
use std::ffi::{CStr, CString};
use thiserror::Error;

/// Receive buffers hold up to five segments of this size.
pub const SEGMENT_SIZE: usize = 64 * 1024;
pub const MAX_SEGMENTS: usize = 5;
/// Upper bound on a single encoded frame.
pub const MAX_FRAME_SIZE: usize = SEGMENT_SIZE * MAX_SEGMENTS;

/// Sentinel carried by every encoder/parser context. Operations assert it
/// so a context that was never initialized (or was torn down) trips
/// immediately instead of producing garbage frames.
const MAGIC: u32 = 0xDEAD_BEEF;

// Both ends compile the same enumeration; the wire carries the raw value.
const _: () = assert!(std::mem::size_of::<libc::pid_t>() == 4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Tag {
    Type = 0,

    LaunchPath = 1,
    LaunchArgv = 2,
    LaunchEnvironment = 3,
    LaunchWidth = 4,
    LaunchHeight = 5,
    LaunchIsUtf8 = 6,
    LaunchPwd = 7,
    LaunchUniqueId = 8,

    LaunchResponseStatus = 9,
    LaunchResponsePid = 10,

    ReportChildIsLast = 11,
    ReportChildPid = 12,
    ReportChildPath = 13,
    ReportChildArgs = 14,
    ReportChildEnv = 15,
    ReportChildPwd = 16,
    ReportChildIsUtf8 = 17,

    TerminationPid = 18,
    TerminationStatus = 19,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("expected tag {expected:?}, found {found}")]
    TagMismatch { expected: Tag, found: i32 },
    #[error("frame truncated")]
    Truncated,
    #[error("invalid length {0}")]
    BadLength(i32),
    #[error("string contains an interior NUL byte")]
    EmbeddedNul,
    #[error("unknown message type {0}")]
    UnknownMessageType(i32),
    #[error("message type {0} is not valid from this peer")]
    UnexpectedMessageType(i32),
    #[error("frame exceeds {MAX_FRAME_SIZE} bytes")]
    Oversized,
}

pub struct FrameEncoder {
    magic: u32,
    buf: BytesMut,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameEncoder {
    pub fn new() -> Self {
        FrameEncoder {
            magic: MAGIC,
            buf: BytesMut::with_capacity(256),
        }
    }

    fn check(&self) -> Result<(), ProtocolError> {
        assert_eq!(self.magic, MAGIC, "encoder context is not initialized");
        if self.buf.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::Oversized);
        }
        Ok(())
    }

    fn put_raw_int(&mut self, value: i32) {
        self.buf.put_i32_le(value);
    }

    pub fn put_tagged_int(&mut self, tag: Tag, value: i32) -> Result<(), ProtocolError> {
        self.put_raw_int(tag as i32);
        self.put_raw_int(value);
        self.check()
    }

    /// 8-byte field; only the client-chosen uniqueId is this wide.
    pub fn put_tagged_long(&mut self, tag: Tag, value: i64) -> Result<(), ProtocolError> {
        self.put_raw_int(tag as i32);
        self.buf.put_i64_le(value);
        self.check()
    }

    pub fn put_tagged_string(&mut self, tag: Tag, value: &CStr) -> Result<(), ProtocolError> {
        self.put_raw_int(tag as i32);
        self.put_raw_string(value)?;
        self.check()
    }

    // Strings inside an array are not individually tagged.
    fn put_raw_string(&mut self, value: &CStr) -> Result<(), ProtocolError> {
        let bytes = value.to_bytes();
        let len = i32::try_from(bytes.len()).map_err(|_| ProtocolError::Oversized)?;
        self.put_raw_int(len);
        self.buf.put_slice(bytes);
        Ok(())
    }

    pub fn put_tagged_string_array(
        &mut self,
        tag: Tag,
        values: &[CString],
    ) -> Result<(), ProtocolError> {
        self.put_raw_int(tag as i32);
        let count = i32::try_from(values.len()).map_err(|_| ProtocolError::Oversized)?;
        self.put_raw_int(count);
        for value in values {
            self.put_raw_string(value)?;
        }
        self.check()
    }

    pub fn finish(self) -> Bytes {
        assert_eq!(self.magic, MAGIC, "encoder context is not initialized");
        self.buf.freeze()
    }
}

pub struct FrameParser<'a> {
    magic: u32,
    buf: &'a [u8],
    offset: usize,
}

impl<'a> FrameParser<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        FrameParser {
            magic: MAGIC,
            buf,
            offset: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        assert_eq!(self.magic, MAGIC, "parser context is not initialized");
        if self.remaining() < n {
            return Err(ProtocolError::Truncated);
        }
        let out = &self.buf[self.offset..self.offset + n];
        self.offset += n;
        Ok(out)
    }

    fn raw_int(&mut self) -> Result<i32, ProtocolError> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes(bytes.try_into().expect("4-byte slice")))
    }

    fn expect_tag(&mut self, expected: Tag) -> Result<(), ProtocolError> {
        let found = self.raw_int()?;
        if found != expected as i32 {
            return Err(ProtocolError::TagMismatch { expected, found });
        }
        Ok(())
    }

    pub fn tagged_int(&mut self, tag: Tag) -> Result<i32, ProtocolError> {
        self.expect_tag(tag)?;
        self.raw_int()
    }

    pub fn tagged_long(&mut self, tag: Tag) -> Result<i64, ProtocolError> {
        self.expect_tag(tag)?;
        let bytes = self.take(8)?;
        Ok(i64::from_le_bytes(bytes.try_into().expect("8-byte slice")))
    }

    fn raw_string(&mut self) -> Result<CString, ProtocolError> {
        let len = self.raw_int()?;
        if len < 0 {
            return Err(ProtocolError::BadLength(len));
        }
        let bytes = self.take(len as usize)?;
        CString::new(bytes).map_err(|_| ProtocolError::EmbeddedNul)
    }

    pub fn tagged_string(&mut self, tag: Tag) -> Result<CString, ProtocolError> {
        self.expect_tag(tag)?;
        self.raw_string()
    }

    pub fn tagged_string_array(&mut self, tag: Tag) -> Result<Vec<CString>, ProtocolError> {
        self.expect_tag(tag)?;
        let count = self.raw_int()?;
        if count < 0 {
            return Err(ProtocolError::BadLength(count));
        }
        // Bounded by what the frame can actually hold (an empty string still
        // costs 4 length bytes), so a hostile count cannot balloon the Vec.
        if count as usize > self.remaining() / 4 {
            return Err(ProtocolError::Truncated);
        }
        let mut out = Vec::with_capacity(count as usize);
        for _ in 0..count {
            out.push(self.raw_string()?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cstr(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    #[test]
    fn tagged_int_round_trip() {
        let mut enc = FrameEncoder::new();
        enc.put_tagged_int(Tag::LaunchWidth, 80).unwrap();
        enc.put_tagged_int(Tag::LaunchHeight, -24).unwrap();
        let frame = enc.finish();

        let mut parser = FrameParser::new(&frame);
        assert_eq!(parser.tagged_int(Tag::LaunchWidth).unwrap(), 80);
        assert_eq!(parser.tagged_int(Tag::LaunchHeight).unwrap(), -24);
        assert_eq!(parser.remaining(), 0);
    }

    #[test]
    fn ints_are_little_endian_with_leading_tag() {
        let mut enc = FrameEncoder::new();
        enc.put_tagged_int(Tag::LaunchResponseStatus, 0x0102_0304)
            .unwrap();
        let frame = enc.finish();
        assert_eq!(&frame[..], &[9, 0, 0, 0, 0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn long_is_eight_bytes() {
        let mut enc = FrameEncoder::new();
        enc.put_tagged_long(Tag::LaunchUniqueId, -1).unwrap();
        let frame = enc.finish();
        assert_eq!(frame.len(), 4 + 8);
        let mut parser = FrameParser::new(&frame);
        assert_eq!(parser.tagged_long(Tag::LaunchUniqueId).unwrap(), -1);
    }

    #[test]
    fn string_has_no_terminator_on_the_wire() {
        let mut enc = FrameEncoder::new();
        enc.put_tagged_string(Tag::LaunchPath, &cstr("/bin/sh")).unwrap();
        let frame = enc.finish();
        // tag + length + exactly the bytes
        assert_eq!(frame.len(), 4 + 4 + 7);
        let mut parser = FrameParser::new(&frame);
        assert_eq!(parser.tagged_string(Tag::LaunchPath).unwrap(), cstr("/bin/sh"));
    }

    #[test]
    fn string_array_preserves_order() {
        let argv = vec![cstr("sh"), cstr("-c"), cstr("exit 7")];
        let mut enc = FrameEncoder::new();
        enc.put_tagged_string_array(Tag::LaunchArgv, &argv).unwrap();
        let frame = enc.finish();

        let mut parser = FrameParser::new(&frame);
        assert_eq!(parser.tagged_string_array(Tag::LaunchArgv).unwrap(), argv);
    }

    #[test]
    fn tag_mismatch_is_fatal() {
        let mut enc = FrameEncoder::new();
        enc.put_tagged_int(Tag::LaunchWidth, 80).unwrap();
        let frame = enc.finish();

        let mut parser = FrameParser::new(&frame);
        match parser.tagged_int(Tag::LaunchHeight) {
            Err(ProtocolError::TagMismatch { expected, found }) => {
                assert_eq!(expected, Tag::LaunchHeight);
                assert_eq!(found, Tag::LaunchWidth as i32);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn truncated_field_is_fatal() {
        let mut enc = FrameEncoder::new();
        enc.put_tagged_int(Tag::TerminationPid, 1234).unwrap();
        let frame = enc.finish();

        let mut parser = FrameParser::new(&frame[..frame.len() - 1]);
        assert!(matches!(
            parser.tagged_int(Tag::TerminationPid),
            Err(ProtocolError::Truncated)
        ));
    }

    #[test]
    fn negative_string_length_is_rejected() {
        let mut enc = FrameEncoder::new();
        enc.put_raw_int(Tag::LaunchPath as i32);
        enc.put_raw_int(-5);
        let frame = enc.finish();

        let mut parser = FrameParser::new(&frame);
        assert!(matches!(
            parser.tagged_string(Tag::LaunchPath),
            Err(ProtocolError::BadLength(-5))
        ));
    }

    #[test]
    fn hostile_array_count_is_bounded() {
        let mut enc = FrameEncoder::new();
        enc.put_raw_int(Tag::LaunchArgv as i32);
        enc.put_raw_int(i32::MAX);
        let frame = enc.finish();

        let mut parser = FrameParser::new(&frame);
        assert!(matches!(
            parser.tagged_string_array(Tag::LaunchArgv),
            Err(ProtocolError::Truncated)
        ));
    }
}
