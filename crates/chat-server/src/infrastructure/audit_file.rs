//! Audit sinks: the append-only log file and an in-memory variant.
//!
//! The file format is one line per event:
//!
//! ```text
//! Chat Server Log - Started at 2024-05-01 09:30:00
//! [2024-05-01 09:30:00] Server started on 0.0.0.0:8910
//! [2024-05-01 09:30:04] Client connected: 192.168.1.7:51544
//! ```
//!
//! A blank line and a banner mark each server start, so consecutive runs
//! stay distinguishable in the same file.
//!
//! # How lines reach the file
//!
//! The relay never writes the file itself.  [`AuditTrail`] emits each line
//! as a `tracing` event under [`AUDIT_TARGET`]; [`audit_layer`] is a `fmt`
//! layer that keeps only that target and writes through a
//! `tracing_appender` non-blocking writer.  Disk I/O happens on the
//! appender's worker thread, and the [`WorkerGuard`] flushes whatever is
//! still queued when it is dropped.
//!
//! [`AuditTrail`]: crate::application::audit::AuditTrail

use std::fmt as std_fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use thiserror::Error;
use tracing::{Event, Metadata, Subscriber};
use tracing_appender::non_blocking::{NonBlocking, NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::filter::{filter_fn, FilterFn, Filtered};
use tracing_subscriber::fmt::{self, format, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::application::audit::{AuditSink, AUDIT_TARGET};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Error type for opening the audit log file.
#[derive(Debug, Error)]
pub enum AuditFileError {
    #[error("audit log path {0} does not name a file")]
    NoFileName(PathBuf),
    #[error("could not create audit log directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not open audit log {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: InitError,
    },
    #[error("could not write audit log banner: {0}")]
    Banner(#[source] std::io::Error),
}

/// The audit log file, opened for appending behind a non-blocking writer.
pub struct AuditFile {
    path: PathBuf,
    writer: NonBlocking,
    guard: WorkerGuard,
}

impl AuditFile {
    /// Opens (or creates) `path` for appending and queues the start banner.
    ///
    /// # Errors
    ///
    /// Returns [`AuditFileError`] if the path has no file name, its parent
    /// directory cannot be created, or the file cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuditFileError> {
        let path = path.into();
        let file_name = path
            .file_name()
            .ok_or_else(|| AuditFileError::NoFileName(path.clone()))?
            .to_string_lossy()
            .into_owned();
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|source| AuditFileError::Directory {
            path: dir.clone(),
            source,
        })?;

        let appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(file_name)
            .build(&dir)
            .map_err(|source| AuditFileError::Open {
                path: path.clone(),
                source,
            })?;
        // Audit lines are never dropped; a full queue makes the caller wait.
        let (mut writer, guard) = NonBlockingBuilder::default()
            .lossy(false)
            .thread_name("chat-audit-log")
            .finish(appender);

        writer
            .write_all(format!("\nChat Server Log - Started at {}\n", now()).as_bytes())
            .map_err(AuditFileError::Banner)?;

        Ok(Self { path, writer, guard })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Builds the subscriber layer for this file.
    ///
    /// The returned guard must stay alive for as long as lines should reach
    /// the file; dropping it flushes the queue.
    pub fn into_layer<S>(self) -> (AuditLayer<S>, WorkerGuard)
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        (audit_layer(self.writer), self.guard)
    }
}

impl std_fmt::Debug for AuditFile {
    fn fmt(&self, f: &mut std_fmt::Formatter<'_>) -> std_fmt::Result {
        f.debug_struct("AuditFile").field("path", &self.path).finish()
    }
}

/// The `fmt` layer that writes audit events to the log file.
pub type AuditLayer<S> =
    Filtered<fmt::Layer<S, format::DefaultFields, AuditLineFormat, NonBlocking>, FilterFn, S>;

/// Builds a layer that writes every [`AUDIT_TARGET`] event to `writer` in
/// the `[YYYY-MM-DD HH:MM:SS] line` format, and nothing else.
pub fn audit_layer<S>(writer: NonBlocking) -> AuditLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .event_format(AuditLineFormat)
        .with_filter(filter_fn(is_audit_event as fn(&Metadata<'_>) -> bool))
}

fn is_audit_event(meta: &Metadata<'_>) -> bool {
    meta.target() == AUDIT_TARGET
}

/// Event format for the audit file: a local timestamp in brackets, then the
/// message.  No level, target, or span context.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditLineFormat;

impl<S, N> FormatEvent<S, N> for AuditLineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> std_fmt::Result {
        write!(writer, "[{}] ", now())?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Keeps audit lines in memory, untimestamped.
///
/// Used by embedders and tests that want to observe what the relay recorded.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    lines: Mutex<Vec<String>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of every line recorded so far, oldest first.
    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Whether any recorded line equals `line`.
    pub fn contains(&self, line: &str) -> bool {
        self.lines().iter().any(|l| l == line)
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, line: &str) -> std::io::Result<()> {
        let mut lines = match self.lines.lock() {
            Ok(lines) => lines,
            Err(poisoned) => poisoned.into_inner(),
        };
        lines.push(line.to_string());
        Ok(())
    }
}
