//! Protocol module containing message types, the binary codec, and stream framing.

pub mod codec;
pub mod framing;
pub mod messages;

pub use codec::{decode_message, encode_message, FrameDefect, ProtocolError};
pub use framing::FrameBuffer;
pub use messages::*;
