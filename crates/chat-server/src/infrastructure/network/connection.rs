//! Per-connection I/O tasks.
//!
//! # How a connection is driven (for beginners)
//!
//! Each accepted socket is split into a read half and a write half, and each
//! half gets its own task:
//!
//! ```text
//!  socket ──► reader task ──► FrameBuffer ──► SessionEvent ──► relay loop
//!  socket ◄── writer task ◄── outbox (bounded mpsc<Frame>) ◄── broadcaster
//! ```
//!
//! Neither task touches the session registry.  The reader reports what it
//! saw; the relay loop decides what to do about it.  The writer drains the
//! outbox until the relay drops the sending side, then shuts its half down.
//! Removing the session aborts both tasks outright, so a writer stuck on a
//! peer that stopped reading is torn down as well.
//!
//! Reads are buffered: TCP may split one frame across several reads or pack
//! several frames into one, and [`FrameBuffer`] reassembles them.

use chat_core::protocol::framing::FrameBuffer;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::application::dispatch::{SessionError, SessionEvent};
use crate::application::session_registry::{Frame, SessionId, SessionLink};
use crate::infrastructure::storage::config::RelayConfig;

/// Sizes that govern one connection's buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub read_buffer_size: usize,
    pub max_frame_len: usize,
    pub outbox_capacity: usize,
}

impl From<&RelayConfig> for ConnectionSettings {
    fn from(relay: &RelayConfig) -> Self {
        let relay = relay.clamped();
        Self {
            read_buffer_size: relay.read_buffer_size,
            max_frame_len: relay.max_frame_len,
            outbox_capacity: relay.outbox_capacity,
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

/// Spawns the reader and writer tasks for `stream`.
///
/// The returned link owns both: dropping it closes the outbox and aborts
/// the two tasks, which releases the socket.
pub fn spawn_connection(
    id: SessionId,
    stream: TcpStream,
    settings: ConnectionSettings,
    events: mpsc::Sender<SessionEvent>,
) -> SessionLink {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(session = %id, error = %e, "could not disable Nagle's algorithm");
    }

    let (read_half, write_half) = stream.into_split();
    let (outbox_tx, outbox_rx) = mpsc::channel(settings.outbox_capacity);

    let writer = tokio::spawn(write_loop(id, write_half, outbox_rx, events.clone()));
    let reader = tokio::spawn(read_loop(id, read_half, settings, events));

    SessionLink::with_tasks(outbox_tx, reader.abort_handle(), writer.abort_handle())
}

/// Reads from `reader` until the peer closes, the bytes stop making sense,
/// or the relay loop goes away.
///
/// Emits one [`SessionEvent::Frame`] per complete message, then exactly one
/// terminal event ([`SessionEvent::Closed`] or [`SessionEvent::Failed`]).
pub async fn read_loop<R>(
    id: SessionId,
    mut reader: R,
    settings: ConnectionSettings,
    events: mpsc::Sender<SessionEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; settings.read_buffer_size.max(1)];
    let mut frames = FrameBuffer::new(settings.max_frame_len);

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                if frames.pending() > 0 {
                    debug!(session = %id, pending = frames.pending(), "peer closed mid-frame");
                }
                let _ = events.send(SessionEvent::Closed { id }).await;
                return;
            }
            Ok(n) => n,
            Err(e) => {
                let _ = events
                    .send(SessionEvent::Failed { id, error: SessionError::TransportFailure(e) })
                    .await;
                return;
            }
        };

        frames.extend(&buf[..n]);
        loop {
            match frames.next_message() {
                Ok(Some(message)) => {
                    if events.send(SessionEvent::Frame { id, message }).await.is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = events
                        .send(SessionEvent::Failed { id, error: SessionError::MalformedFrame(e) })
                        .await;
                    return;
                }
            }
        }
    }
}

/// Writes queued frames to `writer` in order.
///
/// A write failure is reported as [`SessionEvent::Failed`], classified by
/// [`SessionError::from_write`].  When the outbox closes the write half is
/// shut down; errors from that are ignored.
pub async fn write_loop<W>(
    id: SessionId,
    mut writer: W,
    mut outbox: mpsc::Receiver<Frame>,
    events: mpsc::Sender<SessionEvent>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = outbox.recv().await {
        let written = match writer.write_all(&frame).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = events
                .send(SessionEvent::Failed { id, error: SessionError::from_write(e) })
                .await;
            return;
        }
    }

    let _ = writer.shutdown().await;
}
