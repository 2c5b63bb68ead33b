//! The [`Codec`] trait: a value-level description of a wire shape.
//!
//! A codec for `T` answers three questions:
//!
//! - **size** — how many bytes will this value take?
//! - **write** — put the value's bytes into a buffer at an offset.
//! - **read** — pull one value out of a buffer at an offset.
//!
//! Every combinator in this crate (optional, list, map, tuple, struct,
//! enumeration) is built purely out of its children's three operations.
//! Adding a new wire shape means implementing this trait — nothing else
//! in the stack has to change.
//!
//! Unlike serde, nothing here is driven by derive macros or reflection:
//! the mapping from type to bytes is an ordinary value you can build,
//! pass around, and inspect with [`Codec::describe`].

use std::sync::Arc;

use crate::BcsError;

/// Describes how to size, write, and read a value of type `T`.
///
/// ## The round-trip law
///
/// For every value `v`:
///
/// ```text
/// write(buf, 0, v) == size(v)
/// read(buf, 0)     == (size(v), v)
/// ```
///
/// `size` must be pure and exact — not an estimate. `encode` allocates
/// exactly `size(v)` bytes and treats any disagreement as a
/// [`BcsError::SizeMismatch`] defect.
///
/// ## Trait bounds
///
/// `Send + Sync` lets one codec value be shared by every connection task
/// of a channel (they're usually stored behind an `Arc`).
pub trait Codec<T>: Send + Sync {
    /// Exact number of bytes `value` encodes to.
    fn size(&self, value: &T) -> usize;

    /// Writes `value` starting at `offset`, returning the bytes written.
    ///
    /// # Errors
    /// Fails if the value can't be represented (a length over `u32::MAX`,
    /// a value outside an enumeration) or if the buffer is too small.
    fn write(
        &self,
        buf: &mut [u8],
        offset: usize,
        value: &T,
    ) -> Result<usize, BcsError>;

    /// Reads one value starting at `offset`, returning
    /// `(bytes_consumed, value)`.
    ///
    /// The consumed count tells an enclosing combinator where its next
    /// field starts.
    ///
    /// # Errors
    /// Fails on truncated or malformed input.
    fn read(&self, buf: &[u8], offset: usize) -> Result<(usize, T), BcsError>;

    /// A stable, human-readable description of the wire shape,
    /// e.g. `struct Score{id:string,score:int32}`.
    ///
    /// Two codecs with the same description produce the same bytes.
    /// Channels hash these to fingerprint their schema.
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// Forwarding impls
// ---------------------------------------------------------------------------

// These let `&C`, `Box<C>`, and `Arc<C>` (including `Arc<dyn Codec<T>>`)
// be used anywhere a codec is expected.

impl<T, C: Codec<T> + ?Sized> Codec<T> for &C {
    fn size(&self, value: &T) -> usize {
        (**self).size(value)
    }

    fn write(
        &self,
        buf: &mut [u8],
        offset: usize,
        value: &T,
    ) -> Result<usize, BcsError> {
        (**self).write(buf, offset, value)
    }

    fn read(&self, buf: &[u8], offset: usize) -> Result<(usize, T), BcsError> {
        (**self).read(buf, offset)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<T, C: Codec<T> + ?Sized> Codec<T> for Box<C> {
    fn size(&self, value: &T) -> usize {
        (**self).size(value)
    }

    fn write(
        &self,
        buf: &mut [u8],
        offset: usize,
        value: &T,
    ) -> Result<usize, BcsError> {
        (**self).write(buf, offset, value)
    }

    fn read(&self, buf: &[u8], offset: usize) -> Result<(usize, T), BcsError> {
        (**self).read(buf, offset)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<T, C: Codec<T> + ?Sized> Codec<T> for Arc<C> {
    fn size(&self, value: &T) -> usize {
        (**self).size(value)
    }

    fn write(
        &self,
        buf: &mut [u8],
        offset: usize,
        value: &T,
    ) -> Result<usize, BcsError> {
        (**self).write(buf, offset, value)
    }

    fn read(&self, buf: &[u8], offset: usize) -> Result<(usize, T), BcsError> {
        (**self).read(buf, offset)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

// ---------------------------------------------------------------------------
// Whole-buffer helpers
// ---------------------------------------------------------------------------

/// Encodes `value` into a freshly allocated buffer of exactly `size(value)`
/// bytes.
///
/// # Errors
/// Propagates the codec's write error, or returns
/// [`BcsError::SizeMismatch`] if the codec wrote a different number of
/// bytes than it reported.
pub fn encode<T, C: Codec<T> + ?Sized>(
    codec: &C,
    value: &T,
) -> Result<Vec<u8>, BcsError> {
    let mut buf = Vec::new();
    encode_into(codec, &mut buf, value)?;
    Ok(buf)
}

/// Appends the encoding of `value` to `out`.
///
/// Used by the channel layer to write a payload right after a tag byte
/// without a second allocation. On error `out` is restored to its
/// original length.
pub fn encode_into<T, C: Codec<T> + ?Sized>(
    codec: &C,
    out: &mut Vec<u8>,
    value: &T,
) -> Result<(), BcsError> {
    let start = out.len();
    let expected = codec.size(value);
    out.resize(start + expected, 0);

    match codec.write(out, start, value) {
        Ok(actual) if actual == expected => Ok(()),
        Ok(actual) => {
            out.truncate(start);
            Err(BcsError::SizeMismatch { expected, actual })
        }
        Err(e) => {
            out.truncate(start);
            Err(e)
        }
    }
}

/// Decodes exactly one value from `data`.
///
/// # Errors
/// Fails on malformed input, and with [`BcsError::TrailingBytes`] if the
/// value doesn't span the whole slice — leftover bytes would mean two
/// different byte strings decode to the same value.
pub fn decode<T, C: Codec<T> + ?Sized>(
    codec: &C,
    data: &[u8],
) -> Result<T, BcsError> {
    let (consumed, value) = codec.read(data, 0)?;
    if consumed != data.len() {
        return Err(BcsError::TrailingBytes(data.len() - consumed));
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// Bounds-checked buffer access
// ---------------------------------------------------------------------------

/// Borrows `len` bytes at `offset`, or fails with `UnexpectedEndOfInput`.
pub(crate) fn take(
    buf: &[u8],
    offset: usize,
    len: usize,
) -> Result<&[u8], BcsError> {
    let available = buf.len().saturating_sub(offset);
    if len > available {
        return Err(BcsError::UnexpectedEndOfInput {
            offset,
            needed: len,
            available,
        });
    }
    Ok(&buf[offset..offset + len])
}

/// Copies `bytes` to `offset`, or fails with `BufferOverflow`.
pub(crate) fn put(
    buf: &mut [u8],
    offset: usize,
    bytes: &[u8],
) -> Result<usize, BcsError> {
    let available = buf.len().saturating_sub(offset);
    if bytes.len() > available {
        return Err(BcsError::BufferOverflow {
            offset,
            needed: bytes.len(),
            available,
        });
    }
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
    Ok(bytes.len())
}

// ---------------------------------------------------------------------------
// Mapped
// ---------------------------------------------------------------------------

/// Reuses an existing codec for another type via a pair of conversions.
///
/// This is how application types ride on the built-in shapes: a
/// `UserId(u64)` newtype is a `uint64` on the wire, a `Color` enum can be
/// an `int32`, and so on. The bytes are exactly the inner codec's bytes.
pub struct Mapped<C, T, U> {
    inner: C,
    to_inner: fn(&U) -> T,
    from_inner: fn(T) -> U,
}

/// Builds a [`Mapped`] codec.
///
/// ```rust
/// use lobbywire_bcs::{decode, encode, mapped, uint64};
///
/// #[derive(Debug, PartialEq)]
/// struct UserId(u64);
///
/// let codec = mapped(uint64(), |id: &UserId| id.0, UserId);
/// let bytes = encode(&codec, &UserId(7)).unwrap();
/// assert_eq!(bytes, [7, 0, 0, 0, 0, 0, 0, 0]);
/// assert_eq!(decode(&codec, &bytes).unwrap(), UserId(7));
/// ```
pub fn mapped<C, T, U>(
    inner: C,
    to_inner: fn(&U) -> T,
    from_inner: fn(T) -> U,
) -> Mapped<C, T, U>
where
    C: Codec<T>,
{
    Mapped {
        inner,
        to_inner,
        from_inner,
    }
}

impl<C, T, U> Codec<U> for Mapped<C, T, U>
where
    C: Codec<T>,
{
    fn size(&self, value: &U) -> usize {
        self.inner.size(&(self.to_inner)(value))
    }

    fn write(
        &self,
        buf: &mut [u8],
        offset: usize,
        value: &U,
    ) -> Result<usize, BcsError> {
        self.inner.write(buf, offset, &(self.to_inner)(value))
    }

    fn read(&self, buf: &[u8], offset: usize) -> Result<(usize, U), BcsError> {
        let (n, inner) = self.inner.read(buf, offset)?;
        Ok((n, (self.from_inner)(inner)))
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{int32, string};

    /// A deliberately broken codec: claims 2 bytes, writes 3.
    struct Liar;

    impl Codec<u8> for Liar {
        fn size(&self, _value: &u8) -> usize {
            2
        }

        fn write(
            &self,
            _buf: &mut [u8],
            _offset: usize,
            _value: &u8,
        ) -> Result<usize, BcsError> {
            Ok(3)
        }

        fn read(
            &self,
            _buf: &[u8],
            _offset: usize,
        ) -> Result<(usize, u8), BcsError> {
            Ok((1, 0))
        }

        fn describe(&self) -> String {
            "liar".into()
        }
    }

    #[test]
    fn test_encode_reports_size_mismatch() {
        let err = encode(&Liar, &1).unwrap_err();
        assert_eq!(
            err,
            BcsError::SizeMismatch {
                expected: 2,
                actual: 3
            }
        );
        assert!(err.is_defect());
    }

    #[test]
    fn test_encode_into_restores_buffer_on_error() {
        let mut out = vec![9];
        assert!(encode_into(&Liar, &mut out, &1).is_err());
        assert_eq!(out, vec![9]);
    }

    #[test]
    fn test_encode_into_appends_after_existing_bytes() {
        let mut out = vec![0xAA];
        encode_into(&int32(), &mut out, &1).unwrap();
        assert_eq!(out, vec![0xAA, 1, 0, 0, 0]);
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let err = decode(&int32(), &[1, 0, 0, 0, 0xFF]).unwrap_err();
        assert_eq!(err, BcsError::TrailingBytes(1));
    }

    #[test]
    fn test_codec_through_arc_dyn() {
        let codec: Arc<dyn Codec<String>> = Arc::new(string());
        let bytes = encode(&codec, &"hi".to_string()).unwrap();
        assert_eq!(bytes, vec![2, b'h', b'i']);
        assert_eq!(Codec::<String>::describe(&codec), "string");
    }

    #[test]
    fn test_take_past_end() {
        let err = take(&[1, 2], 1, 4).unwrap_err();
        assert_eq!(
            err,
            BcsError::UnexpectedEndOfInput {
                offset: 1,
                needed: 4,
                available: 1
            }
        );
    }
}
