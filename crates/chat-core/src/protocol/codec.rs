//! Binary codec for encoding and decoding chat relay protocol messages.
//!
//! Wire format:
//! ```text
//! [kind:4 little-endian i32]
//! for each string field, in declared order:
//!     [byte_len: 1..=5 bytes, 7-bit encoded][utf8 bytes: byte_len]
//! ```
//!
//! There is no outer length or delimiter.  A frame ends where its last
//! declared string ends, so the decoder must know how many string fields the
//! kind carries.  Every kind in the catalogue carries one; the two-field
//! shape (`kind + username + text`) exists for callers that need it.
//!
//! # 7-bit encoded lengths (for beginners)
//!
//! Each length is written seven bits at a time, least significant group
//! first.  The high bit of every byte says "another byte follows".  Lengths
//! below 128 therefore cost a single byte:
//!
//! ```text
//! 5    -> 0x05
//! 300  -> 0xAC 0x02   (300 = 0b10_0101100)
//! ```

use thiserror::Error;

use crate::protocol::messages::ChatMessage;

/// Size of the kind header in bytes.
pub const KIND_SIZE: usize = 4;

/// Longest 7-bit encoded length prefix accepted (enough for `i32::MAX`).
const MAX_LENGTH_PREFIX_BYTES: usize = 5;

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The bytes do not form a valid frame.
    #[error("malformed frame: {0}")]
    MalformedFrame(FrameDefect),

    /// A string field is too long to be described by a length prefix.
    #[error("string field of {len} bytes exceeds the maximum encodable length")]
    FieldTooLong { len: usize },
}

/// What exactly is wrong with a malformed frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameDefect {
    /// The frame ends before its declared contents.
    #[error("truncated: need at least {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },

    /// A string length prefix is longer than five bytes or exceeds `i32::MAX`.
    #[error("invalid string length prefix")]
    BadLengthPrefix,

    /// A string field is not valid UTF-8.
    #[error("invalid UTF-8 in string field: {0}")]
    InvalidUtf8(std::str::Utf8Error),

    /// The frame declares more bytes than the receiver is willing to buffer.
    #[error("frame needs {declared} bytes, limit is {limit}")]
    TooLarge { declared: usize, limit: usize },
}

impl ProtocolError {
    /// Returns `true` if more bytes could still turn this into a valid frame.
    pub fn is_truncated(&self) -> bool {
        matches!(
            self,
            ProtocolError::MalformedFrame(FrameDefect::Truncated { .. })
        )
    }
}

impl From<FrameDefect> for ProtocolError {
    fn from(defect: FrameDefect) -> Self {
        ProtocolError::MalformedFrame(defect)
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`ChatMessage`] into a single frame.
///
/// # Errors
///
/// Returns [`ProtocolError::FieldTooLong`] if the text cannot be length-prefixed.
///
/// # Examples
///
/// ```rust
/// use chat_core::protocol::{decode_message, encode_message, ChatMessage};
///
/// let msg = ChatMessage::Chat { text: "hi".to_string() };
/// let bytes = encode_message(&msg).unwrap();
/// let (decoded, consumed) = decode_message(&bytes).unwrap();
/// assert_eq!(decoded, msg);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_message(msg: &ChatMessage) -> Result<Vec<u8>, ProtocolError> {
    encode_frame(msg.kind(), msg.text())
}

/// Decodes one [`ChatMessage`] from the beginning of `bytes`.
///
/// Returns the decoded message and the number of bytes consumed so the caller
/// can advance their read cursor.  Bytes after the frame are left untouched.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedFrame`] if `bytes` does not start with a
/// complete, valid frame.
pub fn decode_message(bytes: &[u8]) -> Result<(ChatMessage, usize), ProtocolError> {
    let (kind, text, consumed) = decode_frame(bytes)?;
    Ok((ChatMessage::from_parts(kind, text), consumed))
}

/// Encodes the single-field shape: `kind + text`.
///
/// # Errors
///
/// Returns [`ProtocolError::FieldTooLong`] if `text` cannot be length-prefixed.
pub fn encode_frame(kind: i32, text: &str) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::with_capacity(KIND_SIZE + MAX_LENGTH_PREFIX_BYTES + text.len());
    buf.extend_from_slice(&kind.to_le_bytes());
    write_length_prefixed_string(&mut buf, text)?;
    Ok(buf)
}

/// Encodes the two-field shape: `kind + username + text`.
///
/// # Errors
///
/// Returns [`ProtocolError::FieldTooLong`] if either string cannot be
/// length-prefixed.
pub fn encode_frame_with_username(
    kind: i32,
    username: &str,
    text: &str,
) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::with_capacity(
        KIND_SIZE + 2 * MAX_LENGTH_PREFIX_BYTES + username.len() + text.len(),
    );
    buf.extend_from_slice(&kind.to_le_bytes());
    write_length_prefixed_string(&mut buf, username)?;
    write_length_prefixed_string(&mut buf, text)?;
    Ok(buf)
}

/// Decodes the single-field shape from the beginning of `bytes`.
///
/// Returns `(kind, text, consumed)`.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedFrame`] on missing header, short string
/// data, a bad length prefix, or invalid UTF-8.
pub fn decode_frame(bytes: &[u8]) -> Result<(i32, String, usize), ProtocolError> {
    let kind = read_kind(bytes)?;
    let (text, end) = read_length_prefixed_string(bytes, KIND_SIZE)?;
    Ok((kind, text, end))
}

/// Decodes the two-field shape from the beginning of `bytes`.
///
/// Returns `(kind, username, text, consumed)`.
///
/// # Errors
///
/// Same conditions as [`decode_frame`].
pub fn decode_frame_with_username(
    bytes: &[u8],
) -> Result<(i32, String, String, usize), ProtocolError> {
    let kind = read_kind(bytes)?;
    let (username, name_end) = read_length_prefixed_string(bytes, KIND_SIZE)?;
    let (text, end) = read_length_prefixed_string(bytes, name_end)?;
    Ok((kind, username, text, end))
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn read_kind(buf: &[u8]) -> Result<i32, ProtocolError> {
    let header: [u8; KIND_SIZE] = buf
        .get(..KIND_SIZE)
        .and_then(|h| h.try_into().ok())
        .ok_or(FrameDefect::Truncated {
            needed: KIND_SIZE,
            available: buf.len(),
        })?;
    Ok(i32::from_le_bytes(header))
}

/// Writes a 7-bit encoded length prefix followed by the UTF-8 string bytes.
fn write_length_prefixed_string(buf: &mut Vec<u8>, s: &str) -> Result<(), ProtocolError> {
    let bytes = s.as_bytes();
    let len = u32::try_from(bytes.len())
        .ok()
        .filter(|len| *len <= i32::MAX as u32)
        .ok_or(ProtocolError::FieldTooLong { len: bytes.len() })?;
    write_7bit_length(buf, len);
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Reads a 7-bit encoded length prefix and then that many UTF-8 bytes.
/// Returns the string and the offset of the byte after the string.
fn read_length_prefixed_string(
    buf: &[u8],
    offset: usize,
) -> Result<(String, usize), ProtocolError> {
    let (len, start) = read_7bit_length(buf, offset)?;
    let end = start + len;
    let raw = buf.get(start..end).ok_or(FrameDefect::Truncated {
        needed: end,
        available: buf.len(),
    })?;
    let s = std::str::from_utf8(raw).map_err(FrameDefect::InvalidUtf8)?;
    Ok((s.to_string(), end))
}

fn write_7bit_length(buf: &mut Vec<u8>, mut value: u32) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Reads a 7-bit encoded length starting at `offset`.
/// Returns the length and the offset of the first byte after the prefix.
fn read_7bit_length(buf: &[u8], offset: usize) -> Result<(usize, usize), ProtocolError> {
    let mut value: u32 = 0;
    for i in 0..MAX_LENGTH_PREFIX_BYTES {
        let pos = offset + i;
        let byte = *buf.get(pos).ok_or(FrameDefect::Truncated {
            needed: pos + 1,
            available: buf.len(),
        })?;

        if i == MAX_LENGTH_PREFIX_BYTES - 1 {
            // Fifth byte carries bits 28..31; anything above bit 30 would
            // make the length negative as an i32.
            if byte > 0x07 {
                return Err(FrameDefect::BadLengthPrefix.into());
            }
            value |= u32::from(byte) << 28;
            return Ok((value as usize, pos + 1));
        }

        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value as usize, pos + 1));
        }
    }
    Err(FrameDefect::BadLengthPrefix.into())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: &ChatMessage) -> ChatMessage {
        let encoded = encode_message(msg).expect("encode failed");
        let (decoded, consumed) = decode_message(&encoded).expect("decode failed");
        assert_eq!(consumed, encoded.len(), "consumed bytes should equal total encoded size");
        decoded
    }

    // ── Byte layout ──────────────────────────────────────────────────────────

    #[test]
    fn test_chat_frame_has_little_endian_kind_and_single_byte_prefix() {
        let bytes = encode_frame(10, "hi").unwrap();
        assert_eq!(bytes, vec![0x0A, 0x00, 0x00, 0x00, 0x02, b'h', b'i']);
    }

    #[test]
    fn test_register_frame_layout() {
        let bytes = encode_message(&ChatMessage::Register { name: "bob".into() }).unwrap();
        assert_eq!(bytes, vec![0x01, 0x00, 0x00, 0x00, 0x03, b'b', b'o', b'b']);
    }

    #[test]
    fn test_negative_kind_is_written_as_twos_complement() {
        let bytes = encode_frame(-1, "").unwrap();
        assert_eq!(bytes, vec![0xFF, 0xFF, 0xFF, 0xFF, 0x00]);
    }

    #[test]
    fn test_length_prefix_uses_two_bytes_at_128() {
        let text = "a".repeat(128);
        let bytes = encode_frame(20, &text).unwrap();
        assert_eq!(&bytes[4..6], &[0x80, 0x01]);
        assert_eq!(bytes.len(), 4 + 2 + 128);
    }

    #[test]
    fn test_length_prefix_for_300_bytes() {
        let mut buf = Vec::new();
        write_7bit_length(&mut buf, 300);
        assert_eq!(buf, vec![0xAC, 0x02]);
        assert_eq!(read_7bit_length(&buf, 0).unwrap(), (300, 2));
    }

    #[test]
    fn test_length_prefix_for_i32_max_uses_five_bytes() {
        let mut buf = Vec::new();
        write_7bit_length(&mut buf, i32::MAX as u32);
        assert_eq!(buf, vec![0xFF, 0xFF, 0xFF, 0xFF, 0x07]);
        assert_eq!(read_7bit_length(&buf, 0).unwrap(), (i32::MAX as usize, 5));
    }

    #[test]
    fn test_multibyte_utf8_length_counts_bytes_not_chars() {
        let bytes = encode_frame(10, "héllo").unwrap();
        assert_eq!(bytes[4], 6);
    }

    // ── Round trips ──────────────────────────────────────────────────────────

    #[test]
    fn test_register_round_trip() {
        let msg = ChatMessage::Register { name: "alice".into() };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_system_round_trip_with_empty_text() {
        let msg = ChatMessage::System { text: String::new() };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_unrecognized_kind_round_trip() {
        let msg = ChatMessage::Unrecognized { kind: 99, text: "future".into() };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_two_field_shape_round_trip() {
        let bytes = encode_frame_with_username(10, "alice", "hello there").unwrap();
        let (kind, username, text, consumed) = decode_frame_with_username(&bytes).unwrap();
        assert_eq!(kind, 10);
        assert_eq!(username, "alice");
        assert_eq!(text, "hello there");
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut bytes = encode_frame(10, "first").unwrap();
        let frame_len = bytes.len();
        bytes.extend_from_slice(&encode_frame(10, "second").unwrap());
        let (msg, consumed) = decode_message(&bytes).unwrap();
        assert_eq!(msg, ChatMessage::Chat { text: "first".into() });
        assert_eq!(consumed, frame_len);
    }

    // ── Malformed input ──────────────────────────────────────────────────────

    #[test]
    fn test_decode_empty_input_is_truncated() {
        assert_eq!(
            decode_frame(&[]),
            Err(ProtocolError::MalformedFrame(FrameDefect::Truncated {
                needed: 4,
                available: 0
            }))
        );
    }

    #[test]
    fn test_decode_header_without_length_prefix_is_truncated() {
        let err = decode_frame(&[0x0A, 0, 0, 0]).unwrap_err();
        assert!(err.is_truncated());
    }

    #[test]
    fn test_decode_short_string_reports_needed_bytes() {
        let err = decode_frame(&[0x0A, 0, 0, 0, 0x05, b'h', b'i']).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::MalformedFrame(FrameDefect::Truncated {
                needed: 10,
                available: 7
            })
        );
    }

    #[test]
    fn test_decode_every_strict_prefix_is_malformed() {
        let bytes = encode_frame_with_username(10, "alice", &"x".repeat(200)).unwrap();
        for cut in 0..bytes.len() {
            let err = decode_frame_with_username(&bytes[..cut]).unwrap_err();
            assert!(err.is_truncated(), "prefix of {cut} bytes decoded as {err:?}");
        }
    }

    #[test]
    fn test_decode_rejects_six_byte_length_prefix() {
        let bytes = [0x0A, 0, 0, 0, 0x80, 0x80, 0x80, 0x80, 0x80, 0x01];
        assert_eq!(
            decode_frame(&bytes),
            Err(ProtocolError::MalformedFrame(FrameDefect::BadLengthPrefix))
        );
    }

    #[test]
    fn test_decode_rejects_length_above_i32_max() {
        let bytes = [0x0A, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF, 0x0F];
        assert_eq!(
            decode_frame(&bytes),
            Err(ProtocolError::MalformedFrame(FrameDefect::BadLengthPrefix))
        );
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let bytes = [0x0A, 0, 0, 0, 0x02, 0xC3, 0x28];
        let err = decode_frame(&bytes).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::MalformedFrame(FrameDefect::InvalidUtf8(_))
        ));
    }

    #[test]
    fn test_decode_accepts_non_canonical_zero_length() {
        let bytes = [0x14, 0, 0, 0, 0x80, 0x00];
        let (kind, text, consumed) = decode_frame(&bytes).unwrap();
        assert_eq!((kind, text.as_str(), consumed), (20, "", 6));
    }
}
