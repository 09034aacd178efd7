//! Low-level archive wire format.
//!
//! ## Wire Format Overview
//!
//! The engine writes three kinds of primitive encodings:
//!
//! - **varint**: an unsigned 32-bit integer, 7 bits per byte, least
//!   significant group first. Bit 7 is set on the *final* byte only, so
//!   `300` encodes as `[0x2C, 0x82]`.
//! - **fixed**: integers in canonical big-endian order, `n / 8` bytes.
//! - **checksum**: a 32-bit rolling hash over every byte that crossed the
//!   transport, written as a fixed integer at each checkpoint.

use crate::error::{Error, Result};

/// Maximum number of bytes a 32-bit varint occupies
pub const MAX_VARINT_LEN: usize = 5;

/// Marks the last byte of a varint
pub const FINAL_BIT: u8 = 0x80;

/// Payload mask of a varint byte
const PAYLOAD_MASK: u8 = 0x7F;

/// Seed of the rolling checksum
pub const CHECKSUM_SEED: u32 = 2_038_074_743;

/// Encode `value` into `buf`, returning the number of bytes used.
pub fn encode_varint(mut value: u32, buf: &mut [u8; MAX_VARINT_LEN]) -> usize {
    let mut len = 0;
    loop {
        let mut byte = (value & PAYLOAD_MASK as u32) as u8;
        value >>= 7;
        if value == 0 {
            byte |= FINAL_BIT;
        }
        buf[len] = byte;
        len += 1;
        if value == 0 {
            return len;
        }
    }
}

/// Number of bytes `value` occupies as a varint.
pub fn varint_len(value: u32) -> usize {
    let bits = 32 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

/// Incremental varint decoder, fed one byte at a time.
///
/// The archive reads varints straight off the transport and cannot know the
/// length in advance.
#[derive(Debug, Default, Clone, Copy)]
pub struct VarintDecoder {
    value: u32,
    shift: u32,
    len: usize,
}

impl VarintDecoder {
    /// Creates an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next byte; returns the value once the final byte is seen.
    pub fn push(&mut self, byte: u8) -> Result<Option<u32>> {
        if self.len == MAX_VARINT_LEN {
            return Err(Error::VarintOverflow);
        }
        let payload = (byte & PAYLOAD_MASK) as u32;
        // the fifth group only has room for the top four bits
        if self.shift == 28 && payload > 0x0F {
            return Err(Error::VarintOverflow);
        }
        self.value |= payload << self.shift;
        self.shift += 7;
        self.len += 1;

        if byte & FINAL_BIT != 0 {
            Ok(Some(self.value))
        } else if self.len == MAX_VARINT_LEN {
            Err(Error::VarintOverflow)
        } else {
            Ok(None)
        }
    }

    /// Number of bytes consumed so far
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no byte has been consumed yet
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Decode a varint from the given bytes.
///
/// Returns the decoded value and the number of bytes consumed.
pub fn decode_varint(data: &[u8]) -> Result<(u32, usize)> {
    let mut decoder = VarintDecoder::new();
    for &byte in data {
        if let Some(value) = decoder.push(byte)? {
            return Ok((value, decoder.len()));
        }
    }
    Err(Error::short_transfer("load", decoder.len() + 1, decoder.len()))
}

/// Integers with a canonical big-endian wire form.
///
/// Signed types travel through their unsigned twin, so the byte order is a
/// function of width only. `usize` and `isize` always take 64 bits; reading
/// one back on a narrower host yields `None` when the value does not fit.
pub trait FixedWidth: Copy {
    /// Encoded size in bytes
    const WIDTH: usize;

    /// Byte array holding the encoded value
    type Wire: AsRef<[u8]> + AsMut<[u8]> + Default;

    /// Host value to canonical wire bytes
    fn to_wire(self) -> Self::Wire;

    /// Canonical wire bytes to host value, if it fits the host type
    fn from_wire(wire: Self::Wire) -> Option<Self>;
}

macro_rules! fixed_width {
    ($($ty:ty => $unsigned:ty),* $(,)?) => {$(
        impl FixedWidth for $ty {
            const WIDTH: usize = std::mem::size_of::<$unsigned>();
            type Wire = [u8; std::mem::size_of::<$unsigned>()];

            #[inline]
            fn to_wire(self) -> Self::Wire {
                (self as $unsigned).to_be_bytes()
            }

            #[inline]
            fn from_wire(wire: Self::Wire) -> Option<Self> {
                Some(<$unsigned>::from_be_bytes(wire) as $ty)
            }
        }
    )*};
}

impl FixedWidth for usize {
    const WIDTH: usize = 8;
    type Wire = [u8; 8];

    #[inline]
    fn to_wire(self) -> Self::Wire {
        (self as u64).to_be_bytes()
    }

    #[inline]
    fn from_wire(wire: Self::Wire) -> Option<Self> {
        usize::try_from(u64::from_be_bytes(wire)).ok()
    }
}

impl FixedWidth for isize {
    const WIDTH: usize = 8;
    type Wire = [u8; 8];

    #[inline]
    fn to_wire(self) -> Self::Wire {
        (self as i64).to_be_bytes()
    }

    #[inline]
    fn from_wire(wire: Self::Wire) -> Option<Self> {
        isize::try_from(i64::from_be_bytes(wire)).ok()
    }
}

fixed_width! {
    u8 => u8,
    i8 => u8,
    u16 => u16,
    i16 => u16,
    u32 => u32,
    i32 => u32,
    u64 => u64,
    i64 => u64,
}

/// Rolling integrity hash over transferred bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingChecksum(u32);

impl Default for RollingChecksum {
    fn default() -> Self {
        Self(CHECKSUM_SEED)
    }
}

impl RollingChecksum {
    /// Creates a checksum at its seed value
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `data` into the accumulator
    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            self.0 = self.0.wrapping_add(byte as u32).wrapping_mul(0x0101);
            self.0 ^= self.0 >> 3;
        }
    }

    /// Current accumulator value
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Return to the seed value
    pub fn reset(&mut self) {
        self.0 = CHECKSUM_SEED;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn encode(value: u32) -> Vec<u8> {
        let mut buf = [0u8; MAX_VARINT_LEN];
        let len = encode_varint(value, &mut buf);
        buf[..len].to_vec()
    }

    #[test]
    fn test_encode_varint_single_byte() {
        assert_eq!(encode(0), vec![0x80]);
        assert_eq!(encode(1), vec![0x81]);
        assert_eq!(encode(127), vec![0xFF]);
    }

    #[test]
    fn test_encode_varint_multi_byte() {
        assert_eq!(encode(128), vec![0x00, 0x81]);
        assert_eq!(encode(300), vec![0x2C, 0x82]);
    }

    #[test]
    fn test_encode_varint_max() {
        assert_eq!(encode(u32::MAX), vec![0x7F, 0x7F, 0x7F, 0x7F, 0x8F]);
    }

    #[test]
    fn test_decode_varint_multi_byte() {
        let (value, len) = decode_varint(&[0x2C, 0x82, 0xFF]).unwrap();
        assert_eq!(value, 300);
        assert_eq!(len, 2);
    }

    #[test]
    fn test_decode_varint_truncated() {
        let err = decode_varint(&[0x2C]).unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn test_decode_varint_overflow() {
        assert!(decode_varint(&[0x7F, 0x7F, 0x7F, 0x7F, 0x9F]).is_err());
        assert!(decode_varint(&[0x00; 6]).unwrap_err().is_desync());
    }

    #[test]
    fn test_fixed_width_big_endian() {
        assert_eq!(42u32.to_wire(), [0x00, 0x00, 0x00, 0x2A]);
        assert_eq!(0x0102u16.to_wire(), [0x01, 0x02]);
        assert_eq!((-1i16).to_wire(), [0xFF, 0xFF]);
        assert_eq!(0xABu8.to_wire(), [0xAB]);
        assert_eq!(
            0x0102_0304_0506_0708u64.to_wire(),
            [1, 2, 3, 4, 5, 6, 7, 8]
        );
    }

    #[test]
    fn test_fixed_width_signed_matches_unsigned() {
        assert_eq!((-2i32).to_wire(), (-2i32 as u32).to_wire());
        assert_eq!(i64::from_wire((-7i64).to_wire()), Some(-7));
        assert_eq!(i8::from_wire([0x80]), Some(i8::MIN));
    }

    #[test]
    fn test_pointer_sized_integers_take_64_bits() {
        assert_eq!(7usize.to_wire(), 7u64.to_wire());
        assert_eq!((-7isize).to_wire(), (-7i64).to_wire());
        assert_eq!(usize::from_wire(300u64.to_wire()), Some(300));
        assert_eq!(isize::from_wire((-300i64).to_wire()), Some(-300));
        assert_eq!(
            usize::from_wire(u64::MAX.to_wire()),
            usize::try_from(u64::MAX).ok()
        );
    }

    #[cfg(target_pointer_width = "32")]
    #[test]
    fn test_pointer_sized_integers_reject_wide_values() {
        assert_eq!(usize::from_wire((1u64 << 32).to_wire()), None);
        assert_eq!(isize::from_wire(i64::MIN.to_wire()), None);
    }

    #[test]
    fn test_checksum_seed_and_reset() {
        let mut sum = RollingChecksum::new();
        assert_eq!(sum.value(), CHECKSUM_SEED);
        sum.update(b"abc");
        assert_ne!(sum.value(), CHECKSUM_SEED);
        sum.reset();
        assert_eq!(sum, RollingChecksum::default());
    }

    #[test]
    fn test_checksum_incremental() {
        let mut whole = RollingChecksum::new();
        whole.update(b"hello world");

        let mut parts = RollingChecksum::new();
        parts.update(b"hello");
        parts.update(b" world");

        assert_eq!(whole.value(), parts.value());
    }

    #[test]
    fn test_checksum_detects_single_byte_change() {
        let mut a = RollingChecksum::new();
        a.update(&[1]);
        let mut b = RollingChecksum::new();
        b.update(&[2]);
        assert_ne!(a.value(), b.value());
    }

    proptest! {
        #[test]
        fn prop_varint_roundtrip(value in any::<u32>()) {
            let bytes = encode(value);
            let (decoded, len) = decode_varint(&bytes).unwrap();
            prop_assert_eq!(decoded, value);
            prop_assert_eq!(len, bytes.len());
        }

        #[test]
        fn prop_varint_length(value in any::<u32>()) {
            let bits = 32 - value.leading_zeros() as usize;
            let expected = ((bits + 6) / 7).max(1);
            prop_assert_eq!(encode(value).len(), expected);
            prop_assert_eq!(varint_len(value), expected);
        }

        #[test]
        fn prop_only_last_byte_is_final(value in any::<u32>()) {
            let bytes = encode(value);
            let (last, rest) = bytes.split_last().unwrap();
            prop_assert!(last & FINAL_BIT != 0);
            prop_assert!(rest.iter().all(|b| b & FINAL_BIT == 0));
        }
    }
}
