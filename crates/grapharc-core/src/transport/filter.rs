//! XOR-masking filter.

use super::Transport;
use std::io;

/// Masks every byte with a one-byte key in both directions.
///
/// This is obfuscation, not encryption.
#[derive(Debug, Clone)]
pub struct XorFilter<T> {
    inner: T,
    mask: u8,
    scratch: Vec<u8>,
}

impl<T: Transport> XorFilter<T> {
    /// Wrap `inner` with the given mask
    pub fn new(inner: T, mask: u8) -> Self {
        Self {
            inner,
            mask,
            scratch: Vec::new(),
        }
    }

    /// Current mask
    pub fn mask(&self) -> u8 {
        self.mask
    }

    /// Change the mask
    pub fn set_mask(&mut self, mask: u8) {
        self.mask = mask;
    }

    /// Borrow the wrapped transport
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the wrapped transport
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Unwrap the filter
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Transport> Transport for XorFilter<T> {
    fn save(&mut self, data: &[u8]) -> io::Result<usize> {
        self.scratch.clear();
        self.scratch.extend(data.iter().map(|b| b ^ self.mask));
        self.inner.save(&self.scratch)
    }

    fn load(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.load(buf)?;
        for byte in &mut buf[..n] {
            *byte ^= self.mask;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
