//! Byte transports.
//!
//! The archive engine talks to exactly one [`Transport`]. A transport moves
//! raw bytes and reports how many it moved; the engine treats any count
//! short of the request as an I/O error, so a transport over a stream that
//! may deliver partial reads must loop internally until the buffer is full
//! or the stream ends.

mod file;
mod filter;
mod memory;
mod socket;

pub use file::FileTransport;
pub use filter::XorFilter;
pub use memory::MemoryTransport;
pub use socket::TcpTransport;

use std::io::{self, Read};

/// Raw byte sink and source
pub trait Transport {
    /// Write `data`, returning the number of bytes accepted
    fn save(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Fill `buf`, returning the number of bytes read
    fn load(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Push buffered output to its destination
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn save(&mut self, data: &[u8]) -> io::Result<usize> {
        (**self).save(data)
    }

    fn load(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).load(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn save(&mut self, data: &[u8]) -> io::Result<usize> {
        (**self).save(data)
    }

    fn load(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).load(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// Read until `buf` is full or the reader reports end of stream.
///
/// Returns the number of bytes read; less than `buf.len()` only at EOF.
pub(crate) fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
