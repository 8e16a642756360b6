//! Raw socket abstraction and its TCP implementation
//!
//! The runtime only talks to the network through [`RawSocket`], so tests can
//! script connect/read/write behaviour without a real server.

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

// ----------------------------------------------------------------------------
// Raw Socket Trait
// ----------------------------------------------------------------------------

/// Byte-stream connection to a single peer
///
/// Reads and writes may run concurrently from different tasks. `close` must
/// unblock any read or write in progress.
#[async_trait::async_trait]
pub trait RawSocket: Send + Sync {
    /// Open a connection, replacing any previous one
    async fn connect(&self, address: &str, port: u16) -> io::Result<()>;

    /// Read up to `buf.len()` bytes; `Ok(0)` means the peer closed the stream
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write a prefix of `buf`, returning how many bytes were accepted
    async fn send(&self, buf: &[u8]) -> io::Result<usize>;

    /// Close the connection
    fn close(&self);

    /// Whether a connection is currently open
    fn is_valid(&self) -> bool;

    /// Local endpoint of the open connection
    fn local_addr(&self) -> Option<SocketAddr>;
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "socket is not connected")
}

// ----------------------------------------------------------------------------
// TCP Client
// ----------------------------------------------------------------------------

/// `RawSocket` over a tokio TCP stream split into independent halves
#[derive(Debug)]
pub struct TcpClient {
    connect_timeout: Duration,
    reader: Mutex<Option<OwnedReadHalf>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    local_addr: parking_lot::Mutex<Option<SocketAddr>>,
    valid: AtomicBool,
    closed: Notify,
}

impl TcpClient {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            local_addr: parking_lot::Mutex::new(None),
            valid: AtomicBool::new(false),
            closed: Notify::new(),
        }
    }
}

#[async_trait::async_trait]
impl RawSocket for TcpClient {
    async fn connect(&self, address: &str, port: u16) -> io::Result<()> {
        self.close();

        let stream = match tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((address, port)),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!(
                        "connect to {}:{} timed out after {}ms",
                        address,
                        port,
                        self.connect_timeout.as_millis()
                    ),
                ))
            }
        };
        stream.set_nodelay(true)?;
        let local = stream.local_addr().ok();
        let (read_half, write_half) = stream.into_split();

        *self.reader.lock().await = Some(read_half);
        *self.writer.lock().await = Some(write_half);
        *self.local_addr.lock() = local;
        self.valid.store(true, Ordering::SeqCst);

        debug!("TCP connection to {}:{} established from {:?}", address, port, local);
        Ok(())
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let closed = self.closed.notified();
        tokio::pin!(closed);
        closed.as_mut().enable();
        if !self.is_valid() {
            return Err(not_connected());
        }

        let mut guard = self.reader.lock().await;
        let half = guard.as_mut().ok_or_else(not_connected)?;
        tokio::select! {
            result = half.read(buf) => return result,
            _ = &mut closed => {}
        }
        guard.take();
        Err(not_connected())
    }

    async fn send(&self, buf: &[u8]) -> io::Result<usize> {
        let closed = self.closed.notified();
        tokio::pin!(closed);
        closed.as_mut().enable();
        if !self.is_valid() {
            return Err(not_connected());
        }

        let mut guard = self.writer.lock().await;
        let half = guard.as_mut().ok_or_else(not_connected)?;
        tokio::select! {
            result = half.write(buf) => return result,
            _ = &mut closed => {}
        }
        guard.take();
        Err(not_connected())
    }

    fn close(&self) {
        if self.valid.swap(false, Ordering::SeqCst) {
            debug!("Closing TCP connection");
        }
        self.closed.notify_waiters();
        // Halves held by an in-flight read or write are dropped by that call
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
        self.local_addr.lock().take();
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }
}
