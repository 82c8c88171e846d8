//! Stream framing: turning a TCP byte stream back into whole messages.
//!
//! # Why a buffer is needed
//!
//! TCP is a stream protocol.  There is no guarantee that a single `read()`
//! call returns exactly one complete frame:
//!
//! - It may return fewer bytes than the full frame (partial read).
//! - It may return bytes from several frames at once (coalesced reads).
//!
//! The protocol has no outer length prefix, but every frame is
//! self-delimiting: the kind says how many strings follow, and each string
//! carries its own length.  [`FrameBuffer`] accumulates received bytes and
//! calls the codec repeatedly; a *truncated* result simply means "wait for
//! more bytes".
//!
//! A peer could declare a string of two gigabytes and never send it.  The
//! buffer therefore enforces a frame size limit: once the bytes a pending
//! frame needs exceed the limit, the frame is rejected as
//! [`FrameDefect::TooLarge`].

use crate::protocol::codec::{decode_message, FrameDefect, ProtocolError};
use crate::protocol::messages::ChatMessage;

/// Receive-side accumulator for one connection.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    max_frame_len: usize,
}

impl FrameBuffer {
    /// Creates an empty buffer that rejects frames longer than `max_frame_len` bytes.
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buf: Vec::with_capacity(max_frame_len.min(4096)),
            max_frame_len,
        }
    }

    /// Appends freshly received bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of bytes received but not yet consumed by a complete frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Extracts the next complete message, if one is buffered.
    ///
    /// Returns `Ok(None)` when the buffered bytes are only the beginning of a
    /// frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedFrame`] when the buffered bytes can
    /// never become a valid frame.  The buffer is left untouched; callers are
    /// expected to drop the connection.
    pub fn next_message(&mut self) -> Result<Option<ChatMessage>, ProtocolError> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        match decode_message(&self.buf) {
            Ok((msg, consumed)) => {
                if consumed > self.max_frame_len {
                    return Err(self.too_large(consumed));
                }
                self.buf.drain(..consumed);
                Ok(Some(msg))
            }
            Err(ProtocolError::MalformedFrame(FrameDefect::Truncated { needed, .. })) => {
                if needed > self.max_frame_len {
                    Err(self.too_large(needed))
                } else {
                    Ok(None)
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Drains every complete message currently buffered, in arrival order.
    ///
    /// # Errors
    ///
    /// Stops at the first malformed frame.  Messages decoded before it are
    /// lost to the caller, which is acceptable because the connection is
    /// about to be dropped anyway.
    pub fn drain_messages(&mut self) -> Result<Vec<ChatMessage>, ProtocolError> {
        let mut out = Vec::new();
        while let Some(msg) = self.next_message()? {
            out.push(msg);
        }
        Ok(out)
    }

    fn too_large(&self, declared: usize) -> ProtocolError {
        ProtocolError::MalformedFrame(FrameDefect::TooLarge {
            declared,
            limit: self.max_frame_len,
        })
    }
}
