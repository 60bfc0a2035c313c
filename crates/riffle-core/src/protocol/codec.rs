// ============================================
// File: crates/riffle-core/src/protocol/codec.rs
// ============================================
//! # Protocol Codec
//!
//! ## Creation Reason
//! Turns `Frame` values into length-prefixed byte records and back,
//! enforcing the version byte and the configured size ceiling.
//!
//! ## Main Functionality
//! - `Codec` trait: Generic encode/decode interface
//! - `FrameCodec`: Implementation for `Frame`
//! - `FrameCodec::check_complete`: Incremental framing for stream readers
//!
//! ## Wire Format
//! ```text
//! ┌─────────┬──────────────────┬──────────────────────────┐
//! │ version │ length (u32 LE)  │ JSON body (length bytes) │
//! │  1 byte │     4 bytes      │                          │
//! └─────────┴──────────────────┴──────────────────────────┘
//! ```
//!
//! ## Parsing Strategy
//! 1. Wait for the 5-byte header
//! 2. Reject unsupported versions and oversize lengths before buffering
//! 3. Wait for the full body, then parse JSON
//!
//! ## ⚠️ Important Note for Next Developer
//! - The size check happens on the header, so a hostile peer cannot make
//!   us buffer more than `max_frame_size` bytes
//! - Any error from this module is fatal for the connection
//!
//! ## Last Modified
//! v0.1.0 - Initial codec implementation

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CoreError, Result};
use crate::protocol::messages::Frame;
use crate::protocol::version::{ProtocolVersion, CURRENT_PROTOCOL_VERSION};

// ============================================
// Constants
// ============================================

/// Size of the frame header (version + length).
pub const FRAME_HEADER_SIZE: usize = 5;

/// Default upper bound for a frame body (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

// ============================================
// Codec Trait
// ============================================

/// Trait for encoding and decoding protocol messages.
///
/// # Type Parameters
/// * `T` - The message type to encode/decode
pub trait Codec<T> {
    /// Encodes a message into a byte buffer.
    ///
    /// # Errors
    /// Returns an error if the message cannot be serialized or exceeds
    /// the size limit.
    fn encode(&self, msg: &T, buf: &mut BytesMut) -> Result<()>;

    /// Decodes one complete message from bytes.
    ///
    /// # Errors
    /// Returns an error if the bytes are not a valid message.
    fn decode(&self, buf: &mut Bytes) -> Result<T>;
}

// ============================================
// FrameCodec
// ============================================

/// Codec for `Frame` with a configurable body size limit.
///
/// # Example
/// ```
/// use bytes::BytesMut;
/// use riffle_common::ObjectId;
/// use riffle_core::protocol::{Codec, Frame, FrameCodec};
///
/// let codec = FrameCodec::default();
/// let mut buf = BytesMut::new();
/// codec.encode(&Frame::Release { target: ObjectId::new(1) }, &mut buf).unwrap();
///
/// let len = FrameCodec::check_complete(&buf, codec.max_frame_size()).unwrap().unwrap();
/// let mut record = buf.split_to(len).freeze();
/// let frame = codec.decode(&mut record).unwrap();
/// assert_eq!(frame.kind(), "release");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    /// Creates a codec with the given body size limit.
    #[must_use]
    pub const fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Returns the configured body size limit.
    #[must_use]
    pub const fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Checks if the buffer starts with a complete frame.
    ///
    /// # Returns
    /// - `Ok(Some(len))` - Complete frame of `len` bytes (header included)
    /// - `Ok(None)` - Incomplete frame, need more data
    /// - `Err(_)` - Unsupported version or oversize length
    ///
    /// # Errors
    /// See above.
    pub fn check_complete(buf: &[u8], max_frame_size: usize) -> Result<Option<usize>> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let version = ProtocolVersion::new(buf[0]);
        if !version.is_supported() {
            return Err(CoreError::UnsupportedVersion {
                got: version.as_u8(),
                expected: CURRENT_PROTOCOL_VERSION,
            });
        }

        let body_len = u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
        if body_len > max_frame_size {
            return Err(CoreError::too_large(max_frame_size, body_len));
        }

        let total = FRAME_HEADER_SIZE + body_len;
        if buf.len() >= total {
            Ok(Some(total))
        } else {
            Ok(None)
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Codec<Frame> for FrameCodec {
    fn encode(&self, msg: &Frame, buf: &mut BytesMut) -> Result<()> {
        let body = serde_json::to_vec(msg)
            .map_err(|e| CoreError::malformed(format!("encode {}: {e}", msg.kind())))?;
        if body.len() > self.max_frame_size {
            return Err(CoreError::too_large(self.max_frame_size, body.len()));
        }
        let body_len = u32::try_from(body.len())
            .map_err(|_| CoreError::too_large(u32::MAX as usize, body.len()))?;

        buf.reserve(FRAME_HEADER_SIZE + body.len());
        buf.put_u8(CURRENT_PROTOCOL_VERSION);
        buf.put_u32_le(body_len);
        buf.put_slice(&body);
        Ok(())
    }

    fn decode(&self, buf: &mut Bytes) -> Result<Frame> {
        let total = Self::check_complete(&buf[..], self.max_frame_size)?
            .ok_or_else(|| CoreError::too_short(FRAME_HEADER_SIZE, buf.len()))?;
        if total != buf.len() {
            return Err(CoreError::malformed(format!(
                "record holds {} bytes, frame declares {total}",
                buf.len()
            )));
        }

        buf.advance(FRAME_HEADER_SIZE);
        serde_json::from_slice(&buf[..]).map_err(|e| CoreError::malformed(e.to_string()))
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::{RemoteFault, Value};
    use riffle_common::ObjectId;

    fn encode(codec: &FrameCodec, frame: &Frame) -> BytesMut {
        let mut buf = BytesMut::new();
        codec.encode(frame, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_header_layout() {
        let codec = FrameCodec::default();
        let buf = encode(
            &codec,
            &Frame::Release {
                target: ObjectId::new(2),
            },
        );

        assert_eq!(buf[0], CURRENT_PROTOCOL_VERSION);
        let body_len = u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
        assert_eq!(body_len, buf.len() - FRAME_HEADER_SIZE);
    }

    #[test]
    fn test_check_complete_incremental() {
        let codec = FrameCodec::default();
        let buf = encode(
            &codec,
            &Frame::Call {
                id: 1,
                target: ObjectId::ROOT,
                method: "login".into(),
                args: vec![Value::Remote(ObjectId::new(1))],
            },
        );

        assert_eq!(FrameCodec::check_complete(&[], DEFAULT_MAX_FRAME_SIZE).unwrap(), None);
        assert_eq!(
            FrameCodec::check_complete(&buf[..3], DEFAULT_MAX_FRAME_SIZE).unwrap(),
            None
        );
        assert_eq!(
            FrameCodec::check_complete(&buf[..buf.len() - 1], DEFAULT_MAX_FRAME_SIZE).unwrap(),
            None
        );
        assert_eq!(
            FrameCodec::check_complete(&buf, DEFAULT_MAX_FRAME_SIZE).unwrap(),
            Some(buf.len())
        );
    }

    #[test]
    fn test_two_frames_in_one_buffer() {
        let codec = FrameCodec::default();
        let mut buf = encode(
            &codec,
            &Frame::Reply {
                id: 1,
                value: "pong".into(),
            },
        );
        codec
            .encode(
                &Frame::Fault {
                    id: 2,
                    fault: RemoteFault::no_such_method("reboot"),
                },
                &mut buf,
            )
            .unwrap();

        let first_len = FrameCodec::check_complete(&buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        let mut first = buf.split_to(first_len).freeze();
        assert!(matches!(codec.decode(&mut first).unwrap(), Frame::Reply { id: 1, .. }));

        let second_len = FrameCodec::check_complete(&buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(second_len, buf.len());
        let mut second = buf.freeze();
        assert!(matches!(codec.decode(&mut second).unwrap(), Frame::Fault { id: 2, .. }));
    }

    #[test]
    fn test_rejects_unsupported_version() {
        let mut buf = encode(
            &FrameCodec::default(),
            &Frame::Release {
                target: ObjectId::new(1),
            },
        );
        buf[0] = 0x7F;
        let result = FrameCodec::check_complete(&buf, DEFAULT_MAX_FRAME_SIZE);
        assert!(matches!(
            result,
            Err(CoreError::UnsupportedVersion { got: 0x7F, .. })
        ));
    }

    #[test]
    fn test_rejects_oversize_header_before_body_arrives() {
        let header = [CURRENT_PROTOCOL_VERSION, 0xFF, 0xFF, 0xFF, 0x00];
        let result = FrameCodec::check_complete(&header, 1024);
        assert!(matches!(result, Err(CoreError::MessageTooLarge { max: 1024, .. })));
    }

    #[test]
    fn test_encode_respects_limit() {
        let codec = FrameCodec::new(16);
        let mut buf = BytesMut::new();
        let result = codec.encode(
            &Frame::Reply {
                id: 1,
                value: Value::Str("x".repeat(64)),
            },
            &mut buf,
        );
        assert!(matches!(result, Err(CoreError::MessageTooLarge { .. })));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_garbage_body() {
        let mut raw = BytesMut::new();
        raw.put_u8(CURRENT_PROTOCOL_VERSION);
        raw.put_u32_le(3);
        raw.put_slice(b"{{{");
        let result = FrameCodec::default().decode(&mut raw.freeze());
        assert!(matches!(result, Err(CoreError::MalformedMessage { .. })));
    }

    #[test]
    fn test_decode_too_short() {
        let mut short = Bytes::from_static(&[CURRENT_PROTOCOL_VERSION, 0x01]);
        let result = FrameCodec::default().decode(&mut short);
        assert!(matches!(result, Err(CoreError::MessageTooShort { .. })));
    }
}
