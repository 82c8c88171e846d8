//! All chat relay protocol message types.
//!
//! The kind is the only type information carried on the wire, so kind values
//! are stable and must never be reused for a different meaning.

// ── Protocol constants ────────────────────────────────────────────────────────

/// TCP port the relay listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 8910;

/// Display name a session carries until it sends a `Register` message.
pub const UNKNOWN_USER: &str = "Unknown";

// ── Message kind codes ────────────────────────────────────────────────────────

/// All message kind codes defined by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum MessageKind {
    /// Client announces its display name.  One string field: the name.
    Register = 1,
    /// A chat line.  One string field: the text.
    Chat = 10,
    /// A server announcement.  One string field: the text.
    System = 20,
}

impl MessageKind {
    /// Returns the integer written to the wire for this kind.
    pub const fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for MessageKind {
    type Error = ();

    fn try_from(value: i32) -> Result<Self, ()> {
        match value {
            1 => Ok(MessageKind::Register),
            10 => Ok(MessageKind::Chat),
            20 => Ok(MessageKind::System),
            _ => Err(()),
        }
    }
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// A decoded protocol message.
///
/// Every kind in the catalogue carries exactly one string field.  Kinds the
/// catalogue does not know are decoded with the same single-field shape and
/// surfaced as [`ChatMessage::Unrecognized`] so receivers can log them
/// instead of dropping the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatMessage {
    /// `Register` (kind 1): sets the sender's display name.
    Register { name: String },
    /// `Chat` (kind 10): a chat line.  On the server-to-client path the text
    /// is already attributed (`"alice: hi"`).
    Chat { text: String },
    /// `System` (kind 20): a server announcement.
    System { text: String },
    /// Any other kind, decoded with the single-field shape.
    Unrecognized { kind: i32, text: String },
}

impl ChatMessage {
    /// Returns the wire kind of this message.
    pub fn kind(&self) -> i32 {
        match self {
            ChatMessage::Register { .. } => MessageKind::Register.code(),
            ChatMessage::Chat { .. } => MessageKind::Chat.code(),
            ChatMessage::System { .. } => MessageKind::System.code(),
            ChatMessage::Unrecognized { kind, .. } => *kind,
        }
    }

    /// Returns the single string field carried by this message.
    pub fn text(&self) -> &str {
        match self {
            ChatMessage::Register { name } => name,
            ChatMessage::Chat { text }
            | ChatMessage::System { text }
            | ChatMessage::Unrecognized { text, .. } => text,
        }
    }

    /// Builds the typed message for `kind` carrying `text`.
    ///
    /// Unknown kinds become [`ChatMessage::Unrecognized`].
    pub fn from_parts(kind: i32, text: String) -> Self {
        match MessageKind::try_from(kind) {
            Ok(MessageKind::Register) => ChatMessage::Register { name: text },
            Ok(MessageKind::Chat) => ChatMessage::Chat { text },
            Ok(MessageKind::System) => ChatMessage::System { text },
            Err(()) => ChatMessage::Unrecognized { kind, text },
        }
    }
}
