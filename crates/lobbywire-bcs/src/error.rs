//! Error types for the BCS layer.
//!
//! Two families of errors live here, and they mean very different things:
//!
//! - **Malformed input** (`UnexpectedEndOfInput`, `InvalidDiscriminant`,
//!   `InvalidUleb128`, ...) — the bytes we were given are not a valid
//!   encoding. This is normal at a network boundary; the caller drops the
//!   frame and keeps going.
//! - **Defects** (`SizeMismatch`, `BufferOverflow`) — a codec disagreed with
//!   itself about how big a value is. That's a bug in a codec or schema
//!   definition, never bad input. See [`BcsError::is_defect`].

/// Errors that can occur while encoding or decoding BCS values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BcsError {
    /// A read needed more bytes than the buffer has left.
    #[error(
        "unexpected end of input: needed {needed} bytes at offset {offset}, {available} available"
    )]
    UnexpectedEndOfInput {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A boolean, presence flag, or enumeration index outside its valid set.
    #[error("invalid {kind} discriminant {value} at offset {offset}")]
    InvalidDiscriminant {
        kind: &'static str,
        value: u32,
        offset: usize,
    },

    /// A ULEB128 prefix that is too long, overflows `u32`, or is not minimal.
    #[error("invalid ULEB128 at offset {offset}: {reason}")]
    InvalidUleb128 { offset: usize, reason: &'static str },

    /// String bytes that are not valid UTF-8.
    #[error("invalid UTF-8 in string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    /// The same key appeared twice in an encoded map.
    #[error("duplicate map key at offset {offset}")]
    DuplicateMapKey { offset: usize },

    /// `decode` consumed a full value but bytes were left over.
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    /// Tried to encode a value that isn't in the enumeration's value list.
    #[error("value is not a member of enumeration {0}")]
    NotInEnumeration(&'static str),

    /// A collection or string is too long for a ULEB128 (u32) prefix.
    #[error("length {0} exceeds the u32 range of a length prefix")]
    LengthOverflow(usize),

    /// A codec wrote a different number of bytes than its own `size` reported.
    #[error("codec wrote {actual} bytes but sized the value at {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    /// A codec tried to write past the end of the buffer it was sized for.
    #[error(
        "write overflow: needed {needed} bytes at offset {offset}, buffer holds {available}"
    )]
    BufferOverflow {
        offset: usize,
        needed: usize,
        available: usize,
    },
}

impl BcsError {
    /// Returns `true` for errors that indicate a bug in a codec definition
    /// rather than bad input bytes.
    ///
    /// Defects are not recoverable by retrying — the same value will fail
    /// the same way every time. Callers should log them loudly.
    pub fn is_defect(&self) -> bool {
        matches!(
            self,
            Self::SizeMismatch { .. } | Self::BufferOverflow { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_mismatch_is_defect() {
        let err = BcsError::SizeMismatch {
            expected: 4,
            actual: 5,
        };
        assert!(err.is_defect());
        assert!(err.to_string().contains("sized the value at 4"));
    }

    #[test]
    fn test_malformed_input_is_not_defect() {
        let err = BcsError::UnexpectedEndOfInput {
            offset: 3,
            needed: 4,
            available: 1,
        };
        assert!(!err.is_defect());
        assert!(!BcsError::InvalidUtf8 { offset: 0 }.is_defect());
    }
}
