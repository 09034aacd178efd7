//! TCP transport.

use super::{read_full, Transport};
use crate::error::{Error, Result};
use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use tracing::debug;

/// Blocking TCP stream.
///
/// Every call moves the whole buffer: writes use `write_all`, and reads keep
/// reading until the buffer is full, returning a short count only when the
/// peer closes the connection.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Connect to a listening peer
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).map_err(|e| Error::transport("connect", e))?;
        Self::from_stream(stream)
    }

    /// Accept one connection on `listener`
    pub fn accept(listener: &TcpListener) -> Result<Self> {
        let (stream, peer) = listener
            .accept()
            .map_err(|e| Error::transport("accept", e))?;
        debug!(%peer, "accepted archive peer");
        Self::from_stream(stream)
    }

    /// Bind `addr`, accept a single connection and stop listening
    pub fn listen_once(addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|e| Error::transport("bind", e))?;
        Self::accept(&listener)
    }

    /// Wrap a connected stream; disables Nagle's algorithm
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        stream
            .set_nodelay(true)
            .map_err(|e| Error::transport("connect", e))?;
        Ok(Self { stream })
    }

    /// Second handle to the same connection, for a reader and a writer
    /// on separate threads
    pub fn try_clone(&self) -> Result<Self> {
        let stream = self
            .stream
            .try_clone()
            .map_err(|e| Error::transport("clone", e))?;
        Ok(Self { stream })
    }

    /// Address of the remote peer
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.stream
            .peer_addr()
            .map_err(|e| Error::transport("peer_addr", e))
    }

    /// Unwrap the underlying stream
    pub fn into_inner(self) -> TcpStream {
        self.stream
    }
}

impl Transport for TcpTransport {
    fn save(&mut self, data: &[u8]) -> io::Result<usize> {
        self.stream.write_all(data)?;
        Ok(data.len())
    }

    fn load(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        read_full(&mut self.stream, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}
