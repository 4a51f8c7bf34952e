//! TCP transport adapter.
//!
//! Implements [`Transport`] as a client connection to a peer that speaks the
//! framed envelope protocol directly (`backend_protocol = "framed"`).
//! The stream is switched to non-blocking mode after connect, so `read()`
//! returns `Ok(0)` when no data is waiting rather than stalling the
//! control loop.
//!
//! ## Connection model
//!
//! 1. `open()` resolves the configured address and connects with a short
//!    timeout.
//! 2. Reads and writes are non-blocking; `WouldBlock` maps to `Ok(0)`.
//! 3. EOF or any other socket error drops the stream and reports an error;
//!    the channel manager then schedules a reconnect.

use core::fmt;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{info, warn};

use crate::channel::transport::Transport;

/// Upper bound on a single connect attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

// ───────────────────────────────────────────────────────────────
// Error type
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TcpTransportError {
    /// Address did not resolve to anything.
    Resolve,
    /// Socket I/O failure.
    Io,
    /// Operation requires an open stream.
    NotConnected,
    /// The backend closed the connection.
    Closed,
}

impl fmt::Display for TcpTransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolve => write!(f, "backend address did not resolve"),
            Self::Io => write!(f, "TCP/socket I/O error"),
            Self::NotConnected => write!(f, "not connected"),
            Self::Closed => write!(f, "connection closed by peer"),
        }
    }
}

impl std::error::Error for TcpTransportError {}

// ───────────────────────────────────────────────────────────────
// TcpTransport
// ───────────────────────────────────────────────────────────────

pub struct TcpTransport {
    addr: String,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    /// Transport for `addr` (`host:port`).  Nothing is opened yet.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            stream: None,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn drop_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}

impl Transport for TcpTransport {
    type Error = TcpTransportError;

    fn open(&mut self) -> Result<(), TcpTransportError> {
        self.drop_stream();
        let target = self
            .addr
            .to_socket_addrs()
            .map_err(|_| TcpTransportError::Resolve)?
            .next()
            .ok_or(TcpTransportError::Resolve)?;

        let stream = TcpStream::connect_timeout(&target, CONNECT_TIMEOUT).map_err(|e| {
            warn!("TCP: connect to {} failed: {}", target, e);
            TcpTransportError::Io
        })?;
        stream
            .set_nonblocking(true)
            .map_err(|_| TcpTransportError::Io)?;
        // Frames are small and latency matters more than throughput.
        let _ = stream.set_nodelay(true);
        info!("TCP: connected to {}", target);
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        if self.stream.is_some() {
            info!("TCP: closing connection to {}", self.addr);
        }
        self.drop_stream();
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TcpTransportError> {
        let stream = self.stream.as_mut().ok_or(TcpTransportError::NotConnected)?;
        match stream.read(buf) {
            Ok(0) => {
                info!("TCP: backend closed the connection (EOF)");
                self.stream = None;
                Err(TcpTransportError::Closed)
            }
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(0),
            Err(_) => {
                self.stream = None;
                Err(TcpTransportError::Io)
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TcpTransportError> {
        let stream = self.stream.as_mut().ok_or(TcpTransportError::NotConnected)?;
        match stream.write(data) {
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(_) => {
                self.stream = None;
                Err(TcpTransportError::Io)
            }
        }
    }

    fn flush(&mut self) -> Result<(), TcpTransportError> {
        let stream = self.stream.as_mut().ok_or(TcpTransportError::NotConnected)?;
        match stream.flush() {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(()),
            Err(_) => Err(TcpTransportError::Io),
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
