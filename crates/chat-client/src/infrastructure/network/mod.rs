//! TCP connection to the chat relay.
//!
//! [`ChatClient`] is the convenient all-in-one handle.  Programs that read
//! and write at the same time (like the console binary) split it into a
//! [`MessageReader`] and a [`MessageWriter`] with [`ChatClient::into_split`].
//!
//! Incoming bytes are buffered with [`FrameBuffer`], so a message split
//! across TCP segments, or several messages in one segment, decode the same
//! as one message per read.

use std::net::SocketAddr;

use chat_core::protocol::codec::{encode_message, ProtocolError};
use chat_core::protocol::framing::FrameBuffer;
use chat_core::protocol::messages::ChatMessage;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

/// Largest frame the client accepts from the server.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

const READ_BUFFER_SIZE: usize = 8192;

/// Error type for client connection operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// A connected chat session.
#[derive(Debug)]
pub struct ChatClient {
    reader: MessageReader,
    writer: MessageWriter,
    server: SocketAddr,
}

impl ChatClient {
    /// Opens a TCP connection to the relay at `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connect`] if no connection can be established.
    pub async fn connect<A>(addr: A) -> Result<Self, ClientError>
    where
        A: ToSocketAddrs + std::fmt::Display,
    {
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        Self::from_stream(stream)
    }

    /// Wraps an already connected stream.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if the peer address cannot be read.
    pub fn from_stream(stream: TcpStream) -> Result<Self, ClientError> {
        let server = stream.peer_addr()?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not disable Nagle's algorithm: {e}");
        }
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: MessageReader::new(read_half),
            writer: MessageWriter::new(write_half),
            server,
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server
    }

    /// Announces the display name other users will see.
    pub async fn register(&mut self, name: &str) -> Result<(), ClientError> {
        self.writer.register(name).await
    }

    /// Sends one chat line.
    pub async fn send_chat(&mut self, text: &str) -> Result<(), ClientError> {
        self.writer.send_chat(text).await
    }

    /// Sends an arbitrary message.
    pub async fn send(&mut self, msg: &ChatMessage) -> Result<(), ClientError> {
        self.writer.send(msg).await
    }

    /// Waits for the next message.  `Ok(None)` means the server closed.
    pub async fn next_message(&mut self) -> Result<Option<ChatMessage>, ClientError> {
        self.reader.next_message().await
    }

    /// Separates the receiving and sending sides.
    pub fn into_split(self) -> (MessageReader, MessageWriter) {
        (self.reader, self.writer)
    }
}

/// Receiving side of a chat session.
#[derive(Debug)]
pub struct MessageReader {
    half: OwnedReadHalf,
    frames: FrameBuffer,
    buf: Vec<u8>,
}

impl MessageReader {
    fn new(half: OwnedReadHalf) -> Self {
        Self {
            half,
            frames: FrameBuffer::new(MAX_FRAME_LEN),
            buf: vec![0u8; READ_BUFFER_SIZE],
        }
    }

    /// Waits for the next complete message.
    ///
    /// Returns `Ok(None)` once the server has closed the connection.  Safe to
    /// use as a `tokio::select!` branch: a cancelled call loses no bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Protocol`] if the server sent bytes that do not
    /// form a frame, or [`ClientError::Io`] if reading fails.
    pub async fn next_message(&mut self) -> Result<Option<ChatMessage>, ClientError> {
        loop {
            if let Some(msg) = self.frames.next_message()? {
                return Ok(Some(msg));
            }
            let n = self.half.read(&mut self.buf).await?;
            if n == 0 {
                if self.frames.pending() > 0 {
                    debug!(pending = self.frames.pending(), "server closed mid-frame");
                }
                return Ok(None);
            }
            self.frames.extend(&self.buf[..n]);
        }
    }
}

/// Sending side of a chat session.
#[derive(Debug)]
pub struct MessageWriter {
    half: OwnedWriteHalf,
}

impl MessageWriter {
    fn new(half: OwnedWriteHalf) -> Self {
        Self { half }
    }

    pub async fn register(&mut self, name: &str) -> Result<(), ClientError> {
        self.send(&ChatMessage::Register {
            name: name.to_string(),
        })
        .await
    }

    pub async fn send_chat(&mut self, text: &str) -> Result<(), ClientError> {
        self.send(&ChatMessage::Chat {
            text: text.to_string(),
        })
        .await
    }

    /// Encodes and writes one message.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Protocol`] if the message cannot be encoded,
    /// or [`ClientError::Io`] if the write fails.
    pub async fn send(&mut self, msg: &ChatMessage) -> Result<(), ClientError> {
        let bytes = encode_message(msg)?;
        self.half.write_all(&bytes).await?;
        Ok(())
    }

    /// Closes the sending direction; the server sees a clean disconnect.
    pub async fn shutdown(&mut self) -> Result<(), ClientError> {
        self.half.shutdown().await?;
        Ok(())
    }
}
