//! Audit log seam.
//!
//! The relay keeps a human-readable, append-only record of what happened:
//! who connected, who registered under which name, every chat line, and
//! every session it dropped.
//!
//! Every line is emitted as a `tracing` event with target [`AUDIT_TARGET`].
//! The log file is a subscriber layer that picks out that target (see
//! `infrastructure::audit_file`), so writing it never blocks the relay loop.
//! An [`AuditSink`] can be attached as well when a caller wants the plain
//! lines back, which is how the tests observe the relay.
//!
//! A failing sink must never stop the relay: [`AuditTrail`] reports sink
//! errors to the operator through `tracing` and carries on.

use std::sync::Arc;

use tracing::{info, warn};

/// `tracing` target carried by every audit line.
pub const AUDIT_TARGET: &str = "chat_server::audit";

/// Extra destination for audit lines, besides `tracing`.
#[cfg_attr(test, mockall::automock)]
pub trait AuditSink: Send + Sync {
    /// Appends one line, without timestamp or line ending.
    fn append(&self, line: &str) -> std::io::Result<()>;
}

/// Emits audit lines as `tracing` events and optionally copies them to a sink.
#[derive(Clone, Default)]
pub struct AuditTrail {
    sink: Option<Arc<dyn AuditSink>>,
}

impl AuditTrail {
    /// A trail that also hands every line to `sink`.
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink: Some(sink) }
    }

    /// A trail that only emits `tracing` events.
    pub fn tracing_only() -> Self {
        Self::default()
    }

    /// Records a routine event.
    pub fn record(&self, line: &str) {
        info!(target: AUDIT_TARGET, "{line}");
        self.append(line);
    }

    /// Records a failure that the relay has already recovered from.
    pub fn record_failure(&self, line: &str) {
        warn!(target: AUDIT_TARGET, "{line}");
        self.append(line);
    }

    fn append(&self, line: &str) {
        let Some(sink) = &self.sink else { return };
        if let Err(e) = sink.append(line) {
            warn!(error = %e, "failed to write audit log line");
        }
    }
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail")
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}
