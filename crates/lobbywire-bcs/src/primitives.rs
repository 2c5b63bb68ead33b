//! Primitive codecs: booleans, fixed-width numbers, strings, and bytes.
//!
//! Fixed-width numbers are little-endian, two's-complement for signed
//! integers and raw IEEE-754 bit patterns for floats. NaN payloads pass
//! through bit-for-bit; nothing is normalized.
//!
//! Strings are a ULEB128 **byte** length followed by UTF-8 bytes. A Rust
//! `String` is already UTF-8, so `value.len()` is the exact byte count —
//! "é" is 2 bytes, "€" is 3, and the prefix says so.

use crate::codec::{put, take};
use crate::{uleb128, BcsError, Codec};

// ---------------------------------------------------------------------------
// Fixed-width numbers
// ---------------------------------------------------------------------------

/// Generates a unit-struct codec for a fixed-width little-endian number.
///
/// Each generated codec has a constant size; `from_le_bytes` /
/// `to_le_bytes` do the byte-order work.
macro_rules! fixed_width {
    ($(#[$doc:meta])* $codec:ident, $ctor:ident, $ty:ty, $name:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $codec;

        #[doc = concat!("Builds a [`", stringify!($codec), "`] codec.")]
        pub fn $ctor() -> $codec {
            $codec
        }

        impl Codec<$ty> for $codec {
            fn size(&self, _value: &$ty) -> usize {
                std::mem::size_of::<$ty>()
            }

            fn write(
                &self,
                buf: &mut [u8],
                offset: usize,
                value: &$ty,
            ) -> Result<usize, BcsError> {
                put(buf, offset, &value.to_le_bytes())
            }

            fn read(
                &self,
                buf: &[u8],
                offset: usize,
            ) -> Result<(usize, $ty), BcsError> {
                const WIDTH: usize = std::mem::size_of::<$ty>();
                let bytes = take(buf, offset, WIDTH)?;
                let mut raw = [0u8; WIDTH];
                raw.copy_from_slice(bytes);
                Ok((WIDTH, <$ty>::from_le_bytes(raw)))
            }

            fn describe(&self) -> String {
                $name.into()
            }
        }
    };
}

fixed_width!(
    /// 4-byte little-endian two's-complement `i32`.
    Int32, int32, i32, "int32"
);
fixed_width!(
    /// 8-byte little-endian two's-complement `i64`.
    Int64, int64, i64, "int64"
);
fixed_width!(
    /// 4-byte little-endian IEEE-754 `f32`.
    Float32, float32, f32, "float32"
);
fixed_width!(
    /// 8-byte little-endian IEEE-754 `f64`.
    Float64, float64, f64, "float64"
);
fixed_width!(
    /// A single byte.
    Uint8, uint8, u8, "uint8"
);
fixed_width!(
    /// 2-byte little-endian `u16`.
    Uint16, uint16, u16, "uint16"
);
fixed_width!(
    /// 4-byte little-endian `u32`.
    Uint32, uint32, u32, "uint32"
);
fixed_width!(
    /// 8-byte little-endian `u64`.
    Uint64, uint64, u64, "uint64"
);

// ---------------------------------------------------------------------------
// Bool
// ---------------------------------------------------------------------------

/// One byte: `0x00` is false, `0x01` is true. Anything else is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bool;

/// Builds a [`Bool`] codec.
pub fn boolean() -> Bool {
    Bool
}

/// Reads a 0/1 flag byte. Shared with `nullable`'s presence byte.
pub(crate) fn read_flag(
    buf: &[u8],
    offset: usize,
    kind: &'static str,
) -> Result<bool, BcsError> {
    match take(buf, offset, 1)?[0] {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(BcsError::InvalidDiscriminant {
            kind,
            value: u32::from(other),
            offset,
        }),
    }
}

impl Codec<bool> for Bool {
    fn size(&self, _value: &bool) -> usize {
        1
    }

    fn write(
        &self,
        buf: &mut [u8],
        offset: usize,
        value: &bool,
    ) -> Result<usize, BcsError> {
        put(buf, offset, &[u8::from(*value)])
    }

    fn read(&self, buf: &[u8], offset: usize) -> Result<(usize, bool), BcsError> {
        Ok((1, read_flag(buf, offset, "boolean")?))
    }

    fn describe(&self) -> String {
        "boolean".into()
    }
}

// ---------------------------------------------------------------------------
// Length-prefixed byte runs
// ---------------------------------------------------------------------------

fn write_prefixed(
    buf: &mut [u8],
    offset: usize,
    bytes: &[u8],
) -> Result<usize, BcsError> {
    let prefix = uleb128::write(buf, offset, uleb128::length_prefix(bytes.len())?)?;
    let body = put(buf, offset + prefix, bytes)?;
    Ok(prefix + body)
}

fn read_prefixed(buf: &[u8], offset: usize) -> Result<(usize, &[u8]), BcsError> {
    let (prefix, len) = uleb128::read(buf, offset)?;
    let body = take(buf, offset + prefix, len as usize)?;
    Ok((prefix + body.len(), body))
}

/// ULEB128 byte length, then that many UTF-8 bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8String;

/// Builds a [`Utf8String`] codec.
pub fn string() -> Utf8String {
    Utf8String
}

impl Codec<String> for Utf8String {
    fn size(&self, value: &String) -> usize {
        // `len()` is the UTF-8 byte length, not the char count.
        uleb128::prefix_len(value.len()) + value.len()
    }

    fn write(
        &self,
        buf: &mut [u8],
        offset: usize,
        value: &String,
    ) -> Result<usize, BcsError> {
        write_prefixed(buf, offset, value.as_bytes())
    }

    fn read(
        &self,
        buf: &[u8],
        offset: usize,
    ) -> Result<(usize, String), BcsError> {
        let (n, bytes) = read_prefixed(buf, offset)?;
        let text = std::str::from_utf8(bytes)
            .map_err(|_| BcsError::InvalidUtf8 { offset })?;
        Ok((n, text.to_owned()))
    }

    fn describe(&self) -> String {
        "string".into()
    }
}

/// ULEB128 length, then raw bytes. Cheaper than `list(uint8())`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteVec;

/// Builds a [`ByteVec`] codec.
pub fn bytes() -> ByteVec {
    ByteVec
}

impl Codec<Vec<u8>> for ByteVec {
    fn size(&self, value: &Vec<u8>) -> usize {
        uleb128::prefix_len(value.len()) + value.len()
    }

    fn write(
        &self,
        buf: &mut [u8],
        offset: usize,
        value: &Vec<u8>,
    ) -> Result<usize, BcsError> {
        write_prefixed(buf, offset, value)
    }

    fn read(
        &self,
        buf: &[u8],
        offset: usize,
    ) -> Result<(usize, Vec<u8>), BcsError> {
        let (n, body) = read_prefixed(buf, offset)?;
        Ok((n, body.to_vec()))
    }

    fn describe(&self) -> String {
        "bytes".into()
    }
}

// ---------------------------------------------------------------------------
// Unit
// ---------------------------------------------------------------------------

/// Zero bytes. Useful for payload-less messages ("leave", "ping").
#[derive(Debug, Clone, Copy, Default)]
pub struct Unit;

/// Builds a [`Unit`] codec.
pub fn unit() -> Unit {
    Unit
}

impl Codec<()> for Unit {
    fn size(&self, _value: &()) -> usize {
        0
    }

    fn write(
        &self,
        _buf: &mut [u8],
        _offset: usize,
        _value: &(),
    ) -> Result<usize, BcsError> {
        Ok(0)
    }

    fn read(&self, _buf: &[u8], _offset: usize) -> Result<(usize, ()), BcsError> {
        Ok((0, ()))
    }

    fn describe(&self) -> String {
        "unit".into()
    }
}
