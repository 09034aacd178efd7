//! Bounded, NUL-terminated text buffers.

use crate::archive::{Archivable, Archive, Category};
use crate::error::{Error, Result};
use std::borrow::Cow;
use std::fmt;

/// Fixed-capacity text stored inline as `N` bytes.
///
/// The text ends at the first NUL byte. At most `N - 1` bytes of text fit,
/// leaving room for the terminator.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextBuf<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> Default for TextBuf<N> {
    fn default() -> Self {
        Self { bytes: [0; N] }
    }
}

impl<const N: usize> TextBuf<N> {
    /// Total size including the terminator
    pub const CAPACITY: usize = N;

    /// Creates an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Length of the text, up to the first NUL
    pub fn len(&self) -> usize {
        self.bytes.iter().position(|&b| b == 0).unwrap_or(N)
    }

    /// Returns true if the text is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text bytes without the terminator
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len()]
    }

    /// Text as UTF-8, replacing invalid sequences
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    /// Replace the contents with `text`
    pub fn set(&mut self, text: &str) -> Result<()> {
        if text.len() >= N {
            return Err(Error::capacity_exceeded(text.len(), N.saturating_sub(1)));
        }
        self.bytes = [0; N];
        self.bytes[..text.len()].copy_from_slice(text.as_bytes());
        Ok(())
    }

    /// Clear the contents
    pub fn clear(&mut self) {
        self.bytes = [0; N];
    }
}

impl<const N: usize> TryFrom<&str> for TextBuf<N> {
    type Error = Error;

    fn try_from(text: &str) -> Result<Self> {
        let mut buf = Self::new();
        buf.set(text)?;
        Ok(buf)
    }
}

impl<const N: usize> fmt::Debug for TextBuf<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TextBuf<{}>({:?})", N, self.to_string_lossy())
    }
}

impl<const N: usize> fmt::Display for TextBuf<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl<const N: usize> Archivable for TextBuf<N> {
    const CATEGORY: Category = Category::Text;

    fn save(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        let length = self.len();
        if length >= N {
            return Err(ar.fail(Error::capacity_exceeded(length, N.saturating_sub(1))));
        }
        ar.write_len(length)?;
        ar.write_bytes(&self.bytes[..length])
    }

    fn load(&mut self, ar: &mut Archive<'_>) -> Result<()> {
        let length = ar.read_len()? as usize;
        if length >= N {
            return Err(ar.fail(Error::capacity_exceeded(length, N.saturating_sub(1))));
        }
        ar.read_bytes(&mut self.bytes[..length])?;
        self.bytes[length] = 0;
        Ok(())
    }
}
