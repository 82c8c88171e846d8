//! Message dispatcher: what the relay does with each session event.
//!
//! The connection tasks in the infrastructure layer turn raw bytes into
//! [`SessionEvent`]s.  The coordinating loop hands each event to
//! [`dispatch`] together with the registry it owns.
//!
//! # Routing by kind
//!
//! | Kind            | Effect                                                            |
//! |-----------------|-------------------------------------------------------------------|
//! | `Register` (1)  | overwrite the display name, announce the join to *everyone*       |
//! | `Chat` (10)     | attribute as `"{name}: {text}"`, relay to everyone but the sender |
//! | anything else   | log verbatim, nothing else                                        |
//!
//! Chat lines sent before registering are attributed to `"Unknown"` rather
//! than rejected.
//!
//! # Failures
//!
//! A closed or failed session is removed and logged.  Nothing here returns
//! an error: one misbehaving peer must never stop the loop or affect other
//! sessions.  Leaving is not announced to the remaining peers; only joins are.

use std::io::ErrorKind;

use chat_core::protocol::codec::ProtocolError;
use chat_core::protocol::messages::ChatMessage;
use thiserror::Error;
use tracing::debug;

use crate::application::audit::AuditTrail;
use crate::application::broadcast::{broadcast_chat, broadcast_system};
use crate::application::session_registry::{DeliveryError, SessionId, SessionRegistry};

/// Session-level failure taxonomy.
///
/// All variants are resolved locally by dropping the affected session (or,
/// for [`SessionError::AcceptFailure`], skipping the connection).
#[derive(Debug, Error)]
pub enum SessionError {
    /// Bytes from the peer do not form a valid frame.
    #[error("{0}")]
    MalformedFrame(#[from] ProtocolError),

    /// The peer closed its side of the connection.
    #[error("peer closed the connection")]
    PeerClosed,

    /// Reading from or writing to the socket failed.
    #[error("transport failure: {0}")]
    TransportFailure(#[from] std::io::Error),

    /// A pending connection could not be admitted.
    #[error("accept failed: {0}")]
    AcceptFailure(#[source] std::io::Error),

    /// A frame could not be queued for the peer.
    #[error("{0}")]
    SendError(#[from] DeliveryError),
}

impl SessionError {
    /// Classifies a failed socket write.  A peer that hung up is a close,
    /// not a transport fault.
    pub fn from_write(error: std::io::Error) -> Self {
        match error.kind() {
            ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
                SessionError::PeerClosed
            }
            _ => SessionError::TransportFailure(error),
        }
    }
}

/// Something that happened on one session's connection.
#[derive(Debug)]
pub enum SessionEvent {
    /// A complete message arrived.
    Frame { id: SessionId, message: ChatMessage },
    /// The peer closed the connection (zero-byte read).
    Closed { id: SessionId },
    /// The connection failed and cannot continue.
    Failed { id: SessionId, error: SessionError },
}

impl SessionEvent {
    pub fn session(&self) -> SessionId {
        match self {
            SessionEvent::Frame { id, .. }
            | SessionEvent::Closed { id }
            | SessionEvent::Failed { id, .. } => *id,
        }
    }
}

/// Text of the announcement broadcast when a user registers.
pub fn join_announcement(name: &str) -> String {
    format!("User {name} has joined the chat.")
}

/// Applies one session event to the registry.
pub fn dispatch(registry: &mut SessionRegistry, audit: &AuditTrail, event: SessionEvent) {
    let id = event.session();
    let Some(peer) = registry.peer(id) else {
        // Already evicted (e.g. by a failed broadcast); its queued events are moot.
        debug!(session = %id, "ignoring event for unregistered session");
        return;
    };

    match event {
        SessionEvent::Frame { message, .. } => route_message(registry, audit, id, peer, message),
        SessionEvent::Closed { .. } | SessionEvent::Failed { error: SessionError::PeerClosed, .. } => {
            if let Some(removed) = registry.remove(id) {
                audit.record(&format!(
                    "Client disconnected: {} ({})",
                    removed.name, removed.peer
                ));
            }
        }
        SessionEvent::Failed { error, .. } => {
            audit.record_failure(&format!("Error processing client {peer}: {error}"));
            if let Some(removed) = registry.remove(id) {
                audit.record_failure(&format!(
                    "Client disconnected due to error: {} ({})",
                    removed.name, removed.peer
                ));
            }
        }
    }
}

fn route_message(
    registry: &mut SessionRegistry,
    audit: &AuditTrail,
    id: SessionId,
    peer: std::net::SocketAddr,
    message: ChatMessage,
) {
    match message {
        ChatMessage::Register { name } => {
            registry.update_name(id, name.as_str());
            audit.record(&format!("User registered: {name} ({peer})"));
            broadcast_system(registry, audit, &join_announcement(&name));
        }
        ChatMessage::Chat { text } => {
            let line = format!("{}: {}", registry.lookup(id), text);
            audit.record(&line);
            broadcast_chat(registry, audit, id, &line);
        }
        other => {
            audit.record(&format!("Received: [{}] - {}", other.kind(), other.text()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::audit::AuditSink;
    use crate::application::session_registry::{Frame, SessionLink};
    use chat_core::protocol::codec::{decode_message, FrameDefect};
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    // ── Test doubles ──────────────────────────────────────────────────────────

    #[derive(Default)]
    struct RecordingSink {
        lines: Mutex<Vec<String>>,
    }

    impl AuditSink for RecordingSink {
        fn append(&self, line: &str) -> std::io::Result<()> {
            self.lines.lock().unwrap().push(line.to_string());
            Ok(())
        }
    }

    struct Harness {
        registry: SessionRegistry,
        audit: AuditTrail,
        sink: Arc<RecordingSink>,
    }

    impl Harness {
        fn new() -> Self {
            let sink = Arc::new(RecordingSink::default());
            Self {
                registry: SessionRegistry::new(),
                audit: AuditTrail::new(sink.clone()),
                sink,
            }
        }

        fn connect(&mut self, id: u64) -> mpsc::Receiver<Frame> {
            let (tx, rx) = mpsc::channel(16);
            let peer = SocketAddr::from(([10, 0, 0, id as u8], 5000));
            self.registry
                .insert(SessionId(id), peer, "Unknown", SessionLink::new(tx));
            rx
        }

        fn send(&mut self, id: u64, message: ChatMessage) {
            dispatch(
                &mut self.registry,
                &self.audit,
                SessionEvent::Frame { id: SessionId(id), message },
            );
        }

        fn lines(&self) -> Vec<String> {
            self.sink.lines.lock().unwrap().clone()
        }
    }

    fn register(name: &str) -> ChatMessage {
        ChatMessage::Register { name: name.into() }
    }

    fn chat(text: &str) -> ChatMessage {
        ChatMessage::Chat { text: text.into() }
    }

    fn system(text: &str) -> ChatMessage {
        ChatMessage::System { text: text.into() }
    }

    fn received(rx: &mut mpsc::Receiver<Frame>) -> Vec<ChatMessage> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(decode_message(&frame).unwrap().0);
        }
        out
    }

    // ── Register ─────────────────────────────────────────────────────────────

    #[test]
    fn test_register_renames_and_announces_to_everyone_including_sender() {
        let mut h = Harness::new();
        let mut a = h.connect(1);
        let mut b = h.connect(2);

        h.send(1, register("alice"));

        assert_eq!(h.registry.lookup(SessionId(1)), "alice");
        let expected = vec![system("User alice has joined the chat.")];
        assert_eq!(received(&mut a), expected);
        assert_eq!(received(&mut b), expected);
        assert_eq!(
            h.lines(),
            ["User registered: alice (10.0.0.1:5000)"]
        );
    }

    #[test]
    fn test_second_registration_overwrites_attribution() {
        let mut h = Harness::new();
        let _a = h.connect(1);
        let mut b = h.connect(2);

        h.send(1, register("alice"));
        h.send(1, register("alicia"));
        received(&mut b);
        h.send(1, chat("hello"));

        assert_eq!(received(&mut b), vec![chat("alicia: hello")]);
    }

    // ── Chat ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_chat_before_register_is_attributed_to_unknown() {
        let mut h = Harness::new();
        let _a = h.connect(1);
        let mut b = h.connect(2);

        h.send(1, chat("anyone there?"));

        assert_eq!(received(&mut b), vec![chat("Unknown: anyone there?")]);
        assert_eq!(h.lines(), ["Unknown: anyone there?"]);
    }

    #[test]
    fn test_two_user_scenario() {
        let mut h = Harness::new();
        let mut a = h.connect(1);
        let mut b = h.connect(2);

        h.send(1, register("alice"));
        h.send(2, register("bob"));
        h.send(1, chat("hi"));

        assert_eq!(
            received(&mut a),
            vec![
                system("User alice has joined the chat."),
                system("User bob has joined the chat."),
            ]
        );
        assert_eq!(
            received(&mut b),
            vec![
                system("User alice has joined the chat."),
                system("User bob has joined the chat."),
                chat("alice: hi"),
            ]
        );
    }

    // ── Other kinds ──────────────────────────────────────────────────────────

    #[test]
    fn test_unknown_kind_is_logged_and_not_relayed() {
        let mut h = Harness::new();
        let _a = h.connect(1);
        let mut b = h.connect(2);

        h.send(1, ChatMessage::Unrecognized { kind: 42, text: "??".into() });

        assert!(received(&mut b).is_empty());
        assert_eq!(h.lines(), ["Received: [42] - ??"]);
        assert!(h.registry.contains(SessionId(1)));
    }

    #[test]
    fn test_system_kind_from_client_is_only_logged() {
        let mut h = Harness::new();
        let _a = h.connect(1);
        let mut b = h.connect(2);

        h.send(1, system("spoofed"));

        assert!(received(&mut b).is_empty());
        assert_eq!(h.lines(), ["Received: [20] - spoofed"]);
    }

    // ── Closed / failed sessions ─────────────────────────────────────────────

    #[test]
    fn test_closed_session_is_removed_without_announcement() {
        let mut h = Harness::new();
        let _a = h.connect(1);
        let mut b = h.connect(2);
        h.send(1, register("alice"));
        received(&mut b);

        dispatch(&mut h.registry, &h.audit, SessionEvent::Closed { id: SessionId(1) });

        assert!(!h.registry.contains(SessionId(1)));
        assert!(received(&mut b).is_empty());
        assert_eq!(
            h.lines().last().map(String::as_str),
            Some("Client disconnected: alice (10.0.0.1:5000)")
        );
    }

    #[test]
    fn test_peer_hang_up_on_write_is_a_plain_disconnect() {
        let mut h = Harness::new();
        let _a = h.connect(1);
        h.send(1, register("alice"));
        let broken = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe");

        dispatch(
            &mut h.registry,
            &h.audit,
            SessionEvent::Failed { id: SessionId(1), error: SessionError::from_write(broken) },
        );

        assert!(!h.registry.contains(SessionId(1)));
        assert_eq!(
            h.lines().last().map(String::as_str),
            Some("Client disconnected: alice (10.0.0.1:5000)")
        );
        assert!(!h.lines().iter().any(|l| l.starts_with("Error processing client")));
    }

    #[test]
    fn test_write_errors_other_than_hang_up_stay_transport_failures() {
        let timed_out = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");

        assert!(matches!(SessionError::from_write(timed_out), SessionError::TransportFailure(_)));
    }

    #[test]
    fn test_failed_session_is_removed_and_others_unaffected() {
        let mut h = Harness::new();
        let _a = h.connect(1);
        let mut b = h.connect(2);
        let _c = h.connect(3);

        dispatch(
            &mut h.registry,
            &h.audit,
            SessionEvent::Failed {
                id: SessionId(1),
                error: SessionError::MalformedFrame(ProtocolError::MalformedFrame(
                    FrameDefect::BadLengthPrefix,
                )),
            },
        );
        h.send(3, chat("still here"));

        assert!(!h.registry.contains(SessionId(1)));
        assert_eq!(received(&mut b), vec![chat("Unknown: still here")]);
        assert_eq!(
            h.lines()[..2],
            [
                "Error processing client 10.0.0.1:5000: malformed frame: invalid string length prefix",
                "Client disconnected due to error: Unknown (10.0.0.1:5000)",
            ]
        );
    }

    #[test]
    fn test_events_for_evicted_session_are_ignored() {
        let mut h = Harness::new();
        let _a = h.connect(1);
        h.registry.remove(SessionId(1));

        h.send(1, register("ghost"));
        dispatch(&mut h.registry, &h.audit, SessionEvent::Closed { id: SessionId(1) });

        assert!(h.registry.is_empty());
        assert!(h.lines().is_empty());
    }

    #[test]
    fn test_session_error_messages() {
        assert_eq!(SessionError::PeerClosed.to_string(), "peer closed the connection");
        assert_eq!(
            SessionError::from(DeliveryError::Full).to_string(),
            "outbox is full; peer is not reading"
        );
        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        assert_eq!(
            SessionError::from(reset).to_string(),
            "transport failure: reset by peer"
        );
    }

    #[test]
    fn test_join_announcement_text() {
        assert_eq!(join_announcement("bob"), "User bob has joined the chat.");
    }
}
