//! In-memory transport.

use super::Transport;
use bytes::{Bytes, BytesMut};
use std::io;

/// Growable byte buffer with a read cursor.
///
/// Saves append to the end; loads consume from the cursor. A load asking
/// for more than remains copies what is left and returns a short count.
#[derive(Debug, Default, Clone)]
pub struct MemoryTransport {
    data: BytesMut,
    offset: usize,
}

impl MemoryTransport {
    /// Creates an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty buffer with room for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            offset: 0,
        }
    }

    /// Creates a buffer holding a copy of `data`, cursor at the start
    pub fn from_bytes(data: &[u8]) -> Self {
        Self {
            data: BytesMut::from(data),
            offset: 0,
        }
    }

    /// Everything written so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Bytes not yet consumed by loads
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.offset..]
    }

    /// Freeze the contents
    pub fn into_bytes(self) -> Bytes {
        self.data.freeze()
    }

    /// Total number of bytes held
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if nothing has been written
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Position of the read cursor
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Move the read cursor back to the start
    pub fn rewind(&mut self) {
        self.offset = 0;
    }

    /// Drop all contents
    pub fn clear(&mut self) {
        self.data.clear();
        self.offset = 0;
    }
}

impl From<Bytes> for MemoryTransport {
    fn from(data: Bytes) -> Self {
        Self::from_bytes(&data)
    }
}

impl Transport for MemoryTransport {
    fn save(&mut self, data: &[u8]) -> io::Result<usize> {
        self.data.extend_from_slice(data);
        Ok(data.len())
    }

    fn load(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.data.len() - self.offset;
        let n = buf.len().min(available);
        buf[..n].copy_from_slice(&self.data[self.offset..self.offset + n]);
        self.offset += n;
        Ok(n)
    }
}
