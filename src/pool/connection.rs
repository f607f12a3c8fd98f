//! Exclusively owned handle to a pooled socket.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::timeout;

use super::PoolInner;

/// A live connection checked out of a [`Pool`](super::Pool).
///
/// Every read and write is bounded by the io timeout the connection was
/// acquired with. Dropping the handle returns the connection to the pool; a
/// handle marked unusable is closed instead.
#[derive(Debug)]
pub struct PooledConnection {
    stream: Option<TcpStream>,
    permit: Option<OwnedSemaphorePermit>,
    pool: Arc<PoolInner>,
    io_timeout: Duration,
    unusable: bool,
}

impl PooledConnection {
    pub(super) fn checked_out(
        stream: TcpStream,
        permit: OwnedSemaphorePermit,
        pool: Arc<PoolInner>,
        io_timeout: Duration,
    ) -> Self {
        Self {
            stream: Some(stream),
            permit: Some(permit),
            pool,
            io_timeout,
            unusable: false,
        }
    }

    /// Flags the connection so release closes it instead of parking it.
    ///
    /// Call this after any failure that leaves unread or unwritten bytes on
    /// the stream; the connection cannot be safely reused afterwards.
    pub fn mark_unusable(&mut self) {
        self.unusable = true;
    }

    /// Writes all of `buf`, bounded by the io timeout.
    ///
    /// # Errors
    ///
    /// Any socket error, or [`io::ErrorKind::TimedOut`] on deadline expiry.
    pub async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let deadline = self.io_timeout;
        match timeout(deadline, self.stream_mut().write_all(buf)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out")),
        }
    }

    /// Fills all of `buf`, looping over short reads, bounded by the io
    /// timeout.
    ///
    /// # Errors
    ///
    /// Any socket error, or [`io::ErrorKind::TimedOut`] on deadline expiry.
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let deadline = self.io_timeout;
        match timeout(deadline, self.stream_mut().read_exact(buf)).await {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out")),
        }
    }

    /// Local address of the underlying socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream
            .as_ref()
            .expect("stream present until drop")
            .local_addr()
    }

    fn stream_mut(&mut self) -> &mut TcpStream {
        self.stream.as_mut().expect("stream present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let (Some(stream), Some(permit)) = (self.stream.take(), self.permit.take()) {
            super::release(&self.pool, stream, permit, self.unusable);
        }
    }
}
