//! Connection Handler
//!
//! ```text
//! 1. Client connects
//!        │
//!        ▼
//! 2. ┌──────────────────────────────┐
//!    │  Read bytes (or shutdown)    │◄─┐
//!    └──────────────┬───────────────┘  │
//!                   ▼                  │
//!    ┌──────────────────────────────┐  │
//!    │  Split off complete frames   │  │
//!    └──────────────┬───────────────┘  │
//!                   ▼                  │
//!    ┌──────────────────────────────┐  │
//!    │  lock → process → unlock     │  │
//!    │  write reply                 │──┘
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 3. EOF, I/O error or shutdown ends the task
//! ```
//!
//! TCP may split one request over several reads or deliver several requests
//! in one read. Bytes accumulate in a `BytesMut` and [`frame_len`] finds the
//! end of each request, so every complete request is processed exactly once
//! and in arrival order. Bytes that can never form a valid request are handed
//! to the processor as they are, which replies with an error, and the buffer
//! is cleared.

use crate::commands::CommandProcessor;
use crate::protocol::frame_len;
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

/// Largest amount of unprocessed input held for one client (64 MiB).
const MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

const INITIAL_BUFFER_SIZE: usize = 4096;

/// The processor every connection runs its requests through.
pub type SharedProcessor = Arc<Mutex<CommandProcessor>>;

/// Counters shared by all connections.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub connections_accepted: AtomicU64,
    pub active_connections: AtomicU64,
    pub commands_processed: AtomicU64,
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Serves one client until it disconnects or the server shuts down.
pub struct ConnectionHandler<S> {
    stream: BufWriter<S>,
    addr: SocketAddr,
    buffer: BytesMut,
    processor: SharedProcessor,
    stats: Arc<ConnectionStats>,
    shutdown: watch::Receiver<bool>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Registers the connection in `stats`; [`run`](Self::run) unregisters it.
    pub fn new(
        stream: S,
        addr: SocketAddr,
        processor: SharedProcessor,
        stats: Arc<ConnectionStats>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        stats.connection_opened();
        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            processor,
            stats,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected"),
            Err(ConnectionError::IoError(e))
                if e.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        self.stats.connection_closed();
        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(request) = self.next_request() {
                let reply = self.process(&request);
                self.send_response(&reply).await?;
            }

            let stopping = *self.shutdown.borrow();
            if stopping {
                return Ok(());
            }

            if !self.read_more_data().await? {
                return Ok(());
            }
        }
    }

    /// Splits the next request off the front of the buffer.
    fn next_request(&mut self) -> Option<BytesMut> {
        if self.buffer.is_empty() {
            return None;
        }

        match frame_len(&self.buffer) {
            Ok(Some(len)) => {
                trace!(client = %self.addr, len, remaining = self.buffer.len() - len, "Framed request");
                Some(self.buffer.split_to(len))
            }
            Ok(None) => {
                trace!(client = %self.addr, buffered = self.buffer.len(), "Incomplete request");
                None
            }
            Err(e) => {
                debug!(client = %self.addr, error = %e, "Malformed request");
                Some(self.buffer.split())
            }
        }
    }

    /// Runs one request while holding the processor lock.
    fn process(&self, request: &[u8]) -> Bytes {
        let reply = self
            .processor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .process(request);
        self.stats.command_processed();
        reply
    }

    /// Reads into the buffer. Returns `false` on clean EOF or shutdown.
    async fn read_more_data(&mut self) -> Result<bool, ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = tokio::select! {
            read = self.stream.get_mut().read_buf(&mut self.buffer) => read?,
            _ = self.shutdown.changed() => {
                debug!(client = %self.addr, "Shutdown signalled");
                return Ok(false);
            }
        };

        if n == 0 {
            if self.buffer.is_empty() {
                return Ok(false);
            }
            return Err(ConnectionError::UnexpectedEof);
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");
        Ok(true)
    }

    async fn send_response(&mut self, reply: &[u8]) -> Result<(), ConnectionError> {
        self.stream.write_all(reply).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(reply.len());
        trace!(client = %self.addr, bytes = reply.len(), "Sent response");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The peer closed the stream in the middle of a request.
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Runs a [`ConnectionHandler`] to completion, logging how it ended.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    processor: SharedProcessor,
    stats: Arc<ConnectionStats>,
    shutdown: watch::Receiver<bool>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, processor, stats, shutdown);
    if let Err(e) = handler.run().await {
        debug!(client = %addr, error = %e, "Connection ended with error");
    }
}
