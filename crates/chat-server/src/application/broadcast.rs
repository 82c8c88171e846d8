//! Broadcaster: fan-out of one message to many sessions.
//!
//! Two modes:
//!
//! - [`broadcast_chat`] sends a `Chat` frame to every session except the
//!   sender.
//! - [`broadcast_system`] sends a `System` frame to every session.
//!
//! The frame is encoded once and shared.  Recipients come from a registry
//! snapshot, so evicting a recipient halfway through cannot disturb the loop.
//! A recipient whose delivery fails is logged and removed; everyone else
//! still gets the message, and the broadcast as a whole never fails.

use chat_core::protocol::codec::encode_message;
use chat_core::protocol::messages::ChatMessage;
use tracing::{debug, warn};

use crate::application::audit::AuditTrail;
use crate::application::dispatch::SessionError;
use crate::application::session_registry::{Frame, SessionId, SessionRegistry};

/// Outcome of one broadcast call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sessions the frame was queued for.
    pub delivered: Vec<SessionId>,
    /// Sessions evicted because delivery failed.
    pub evicted: Vec<SessionId>,
}

/// Relays an attributed chat line to everyone but `sender`.
pub fn broadcast_chat(
    registry: &mut SessionRegistry,
    audit: &AuditTrail,
    sender: SessionId,
    text: &str,
) -> BroadcastReport {
    let msg = ChatMessage::Chat {
        text: text.to_string(),
    };
    fan_out(registry, audit, &msg, Some(sender))
}

/// Sends a server announcement to every session.
pub fn broadcast_system(
    registry: &mut SessionRegistry,
    audit: &AuditTrail,
    text: &str,
) -> BroadcastReport {
    let msg = ChatMessage::System {
        text: text.to_string(),
    };
    fan_out(registry, audit, &msg, None)
}

fn fan_out(
    registry: &mut SessionRegistry,
    audit: &AuditTrail,
    msg: &ChatMessage,
    exclude: Option<SessionId>,
) -> BroadcastReport {
    let mut report = BroadcastReport::default();

    let frame: Frame = match encode_message(msg) {
        Ok(bytes) => bytes.into(),
        Err(e) => {
            warn!(error = %e, kind = msg.kind(), "dropping broadcast that cannot be encoded");
            return report;
        }
    };

    for (id, name) in registry.snapshot() {
        if Some(id) == exclude {
            continue;
        }

        match registry.send(id, Frame::clone(&frame)) {
            Ok(()) => report.delivered.push(id),
            Err(e) => {
                let error = SessionError::from(e);
                let peer = peer_label(registry, id);
                audit.record_failure(&format!("Error broadcasting to client {peer}: {error}"));
                if registry.remove(id).is_some() {
                    audit.record_failure(&format!(
                        "Client disconnected due to broadcast error: {name} ({peer})"
                    ));
                    report.evicted.push(id);
                }
            }
        }
    }

    debug!(
        kind = msg.kind(),
        delivered = report.delivered.len(),
        evicted = report.evicted.len(),
        "broadcast complete"
    );
    report
}

fn peer_label(registry: &SessionRegistry, id: SessionId) -> String {
    registry
        .peer(id)
        .map_or_else(|| id.to_string(), |addr| addr.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::audit::AuditSink;
    use crate::application::session_registry::SessionLink;
    use chat_core::protocol::codec::decode_message;
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

    fn trail() -> (AuditTrail, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (AuditTrail::new(sink.clone()), sink)
    }

    fn add(registry: &mut SessionRegistry, id: u64, name: &str) -> mpsc::Receiver<Frame> {
        let (tx, rx) = mpsc::channel(8);
        let peer = SocketAddr::from(([127, 0, 0, 1], 4000 + id as u16));
        registry.insert(SessionId(id), peer, name, SessionLink::new(tx));
        rx
    }

    fn received(rx: &mut mpsc::Receiver<Frame>) -> Vec<ChatMessage> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(decode_message(&frame).unwrap().0);
        }
        out
    }

    // ── Targeted chat broadcast ──────────────────────────────────────────────

    #[test]
    fn test_chat_broadcast_excludes_sender() {
        let (audit, _sink) = trail();
        let mut registry = SessionRegistry::new();
        let mut a = add(&mut registry, 1, "alice");
        let mut b = add(&mut registry, 2, "bob");
        let mut c = add(&mut registry, 3, "carol");

        let report = broadcast_chat(&mut registry, &audit, SessionId(1), "alice: hi");

        assert!(received(&mut a).is_empty());
        let expected = vec![ChatMessage::Chat { text: "alice: hi".into() }];
        assert_eq!(received(&mut b), expected);
        assert_eq!(received(&mut c), expected);
        assert_eq!(report.delivered, vec![SessionId(2), SessionId(3)]);
        assert!(report.evicted.is_empty());
    }

    #[test]
    fn test_chat_broadcast_with_no_other_sessions_delivers_nothing() {
        let (audit, _sink) = trail();
        let mut registry = SessionRegistry::new();
        let mut a = add(&mut registry, 1, "alice");

        let report = broadcast_chat(&mut registry, &audit, SessionId(1), "alice: anyone?");

        assert!(report.delivered.is_empty());
        assert!(received(&mut a).is_empty());
    }

    // ── System broadcast ─────────────────────────────────────────────────────

    #[test]
    fn test_system_broadcast_reaches_everyone() {
        let (audit, _sink) = trail();
        let mut registry = SessionRegistry::new();
        let mut a = add(&mut registry, 1, "alice");
        let mut b = add(&mut registry, 2, "Unknown");

        broadcast_system(&mut registry, &audit, "User alice has joined the chat.");

        let expected = vec![ChatMessage::System {
            text: "User alice has joined the chat.".into(),
        }];
        assert_eq!(received(&mut a), expected);
        assert_eq!(received(&mut b), expected);
    }

    // ── Fault isolation ──────────────────────────────────────────────────────

    #[test]
    fn test_failed_recipient_is_evicted_and_others_still_receive() {
        let (audit, sink) = trail();
        let mut registry = SessionRegistry::new();
        let mut a = add(&mut registry, 1, "alice");
        let b = add(&mut registry, 2, "bob");
        let mut c = add(&mut registry, 3, "carol");
        drop(b); // bob's writer has stopped

        let report = broadcast_system(&mut registry, &audit, "notice");

        assert_eq!(received(&mut a).len(), 1);
        assert_eq!(received(&mut c).len(), 1);
        assert_eq!(report.evicted, vec![SessionId(2)]);
        assert!(!registry.contains(SessionId(2)));
        assert_eq!(registry.len(), 2);

        let lines = sink.lines.lock().unwrap();
        assert_eq!(
            lines.as_slice(),
            [
                "Error broadcasting to client 127.0.0.1:4002: connection writer has stopped",
                "Client disconnected due to broadcast error: bob (127.0.0.1:4002)",
            ]
        );
    }

    #[test]
    fn test_full_outbox_counts_as_failed_delivery() {
        let (audit, _sink) = trail();
        let mut registry = SessionRegistry::new();
        let (tx, _slow_rx) = mpsc::channel(1);
        let peer = SocketAddr::from(([127, 0, 0, 1], 4100));
        registry.insert(SessionId(1), peer, "slow", SessionLink::new(tx));
        let mut fast = add(&mut registry, 2, "fast");

        broadcast_system(&mut registry, &audit, "one");
        let report = broadcast_system(&mut registry, &audit, "two");

        assert_eq!(report.evicted, vec![SessionId(1)]);
        assert_eq!(received(&mut fast).len(), 2);
    }

    #[test]
    fn test_evicted_session_is_not_sent_to_again() {
        let (audit, _sink) = trail();
        let mut registry = SessionRegistry::new();
        let b = add(&mut registry, 2, "bob");
        drop(b);

        broadcast_system(&mut registry, &audit, "first");
        let second = broadcast_system(&mut registry, &audit, "second");

        assert!(second.delivered.is_empty());
        assert!(second.evicted.is_empty());
    }
}
