//! ULEB128: unsigned little-endian base-128 variable-length integers.
//!
//! Every length, count, and enumeration index in BCS is a ULEB128. Each
//! byte carries 7 payload bits; the high bit says "more bytes follow".
//! The low group comes first:
//!
//! ```text
//! 0       → 00
//! 127     → 7F
//! 128     → 80 01
//! 16384   → 80 80 01
//! ```
//!
//! To keep the encoding canonical, the decoder accepts only the shortest
//! form: `80 00` (a padded zero) is rejected, as is anything that doesn't
//! fit in a `u32`.

use crate::codec::{put, take};
use crate::{BcsError, Codec};

/// A `u32` never needs more than 5 groups of 7 bits.
const MAX_LEN: usize = 5;

/// Number of bytes `value` encodes to.
pub fn encoded_len(value: u32) -> usize {
    encoded_len_u64(u64::from(value))
}

/// Like [`encoded_len`], for a collection length that might not fit in a
/// `u32`. Used by `size`, which can't fail; the matching `write` reports
/// [`BcsError::LengthOverflow`].
pub(crate) fn encoded_len_u64(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Size of the ULEB128 prefix for a collection of `len` items.
pub(crate) fn prefix_len(len: usize) -> usize {
    encoded_len_u64(len as u64)
}

/// Converts a collection length to a prefix value.
pub(crate) fn length_prefix(len: usize) -> Result<u32, BcsError> {
    u32::try_from(len).map_err(|_| BcsError::LengthOverflow(len))
}

/// Writes `value` at `offset`, returning the bytes written.
pub fn write(
    buf: &mut [u8],
    offset: usize,
    value: u32,
) -> Result<usize, BcsError> {
    let mut scratch = [0u8; MAX_LEN];
    let mut remaining = value;
    let mut len = 0;
    loop {
        let group = (remaining & 0x7F) as u8;
        remaining >>= 7;
        if remaining == 0 {
            scratch[len] = group;
            len += 1;
            break;
        }
        scratch[len] = group | 0x80;
        len += 1;
    }
    put(buf, offset, &scratch[..len])
}

/// Reads a ULEB128 at `offset`, returning `(bytes_consumed, value)`.
///
/// # Errors
/// - `UnexpectedEndOfInput` if the buffer ends mid-number.
/// - `InvalidUleb128` for overlong, overflowing, or non-minimal input.
pub fn read(buf: &[u8], offset: usize) -> Result<(usize, u32), BcsError> {
    let mut value: u64 = 0;

    for i in 0..MAX_LEN {
        let byte = take(buf, offset + i, 1)?[0];
        let payload = u64::from(byte & 0x7F);
        value |= payload << (7 * i);

        if byte & 0x80 == 0 {
            // A zero final group after the first byte means a shorter
            // encoding existed.
            if i > 0 && byte == 0 {
                return Err(BcsError::InvalidUleb128 {
                    offset,
                    reason: "non-minimal encoding",
                });
            }
            let value = u32::try_from(value).map_err(|_| {
                BcsError::InvalidUleb128 {
                    offset,
                    reason: "value exceeds u32",
                }
            })?;
            return Ok((i + 1, value));
        }
    }

    Err(BcsError::InvalidUleb128 {
        offset,
        reason: "more than 5 bytes",
    })
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// A bare ULEB128 number as a codec over `u32`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uleb128;

/// Builds a [`Uleb128`] codec.
pub fn uleb128() -> Uleb128 {
    Uleb128
}

impl Codec<u32> for Uleb128 {
    fn size(&self, value: &u32) -> usize {
        encoded_len(*value)
    }

    fn write(
        &self,
        buf: &mut [u8],
        offset: usize,
        value: &u32,
    ) -> Result<usize, BcsError> {
        write(buf, offset, *value)
    }

    fn read(&self, buf: &[u8], offset: usize) -> Result<(usize, u32), BcsError> {
        read(buf, offset)
    }

    fn describe(&self) -> String {
        "uleb128".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: u32) -> Vec<u8> {
        let mut buf = vec![0u8; encoded_len(value)];
        let written = write(&mut buf, 0, value).unwrap();
        assert_eq!(written, buf.len());
        assert_eq!(read(&buf, 0).unwrap(), (written, value));
        buf
    }

    #[test]
    fn test_boundaries_use_minimum_bytes() {
        assert_eq!(round_trip(0), vec![0x00]);
        assert_eq!(round_trip(127), vec![0x7F]);
        assert_eq!(round_trip(128), vec![0x80, 0x01]);
        assert_eq!(round_trip(16383), vec![0xFF, 0x7F]);
        assert_eq!(round_trip(16384), vec![0x80, 0x80, 0x01]);
        assert_eq!(round_trip(i32::MAX as u32), vec![0xFF, 0xFF, 0xFF, 0xFF, 0x07]);
        assert_eq!(round_trip(u32::MAX), vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
    }

    #[test]
    fn test_encoded_len() {
        assert_eq!(encoded_len(0), 1);
        assert_eq!(encoded_len(127), 1);
        assert_eq!(encoded_len(128), 2);
        assert_eq!(encoded_len(16383), 2);
        assert_eq!(encoded_len(16384), 3);
        assert_eq!(encoded_len(u32::MAX), 5);
    }

    #[test]
    fn test_read_at_offset() {
        let buf = [0xAA, 0x80, 0x01, 0xBB];
        assert_eq!(read(&buf, 1).unwrap(), (2, 128));
    }

    #[test]
    fn test_rejects_padded_zero() {
        let err = read(&[0x80, 0x00], 0).unwrap_err();
        assert!(matches!(err, BcsError::InvalidUleb128 { .. }));
    }

    #[test]
    fn test_rejects_padded_value() {
        // 1 encoded with a redundant continuation group.
        let err = read(&[0x81, 0x00], 0).unwrap_err();
        assert!(matches!(err, BcsError::InvalidUleb128 { .. }));
    }

    #[test]
    fn test_rejects_overflow() {
        let err = read(&[0xFF, 0xFF, 0xFF, 0xFF, 0x1F], 0).unwrap_err();
        assert!(matches!(
            err,
            BcsError::InvalidUleb128 {
                reason: "value exceeds u32",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_six_byte_encoding() {
        let err = read(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01], 0).unwrap_err();
        assert!(matches!(err, BcsError::InvalidUleb128 { .. }));
    }

    #[test]
    fn test_truncated_input() {
        let err = read(&[0x80], 0).unwrap_err();
        assert!(matches!(err, BcsError::UnexpectedEndOfInput { .. }));
    }

    #[test]
    fn test_length_prefix_overflow() {
        assert_eq!(length_prefix(5).unwrap(), 5);
        if usize::BITS > 32 {
            let too_long = u32::MAX as usize + 1;
            assert_eq!(
                length_prefix(too_long).unwrap_err(),
                BcsError::LengthOverflow(too_long)
            );
        }
    }
}
