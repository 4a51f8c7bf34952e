//! Transport abstraction: any reconnectable byte-oriented channel.
//!
//! Concrete implementations:
//! - Socket.IO websocket to the backend ([`crate::adapters::socketio::SocketIoTransport`])
//! - plain TCP carrying framed envelopes ([`crate::adapters::tcp::TcpTransport`])
//! - scripted in-memory transport in the integration tests
//!
//! The [`ChannelManager`](super::ChannelManager) is generic over
//! `Transport`, so a new link type needs no changes to the session logic.

/// Byte-oriented transport channel.
pub trait Transport {
    /// Error type for this transport.
    type Error: core::fmt::Debug;

    /// Establish the link.  Called again after every loss.
    fn open(&mut self) -> Result<(), Self::Error>;

    /// Tear the link down.  Must be idempotent.
    fn close(&mut self);

    /// Read up to `buf.len()` bytes into `buf` without blocking.
    /// Returns 0 if no data is available; a closed peer is an error.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write `data` to the transport.
    /// Returns the number of bytes actually written.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<(), Self::Error>;

    fn is_open(&self) -> bool;
}

/// A transport that never connects.  Used when no backend is configured.
pub struct NullTransport;

impl Transport for NullTransport {
    type Error = ();

    fn open(&mut self) -> Result<(), ()> {
        Err(())
    }

    fn close(&mut self) {}

    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, ()> {
        Err(())
    }

    fn write(&mut self, _data: &[u8]) -> Result<usize, ()> {
        Err(())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn is_open(&self) -> bool {
        false
    }
}
