//! Binary Canonical Serialization (BCS) for lobbywire.
//!
//! This crate defines how typed values become bytes and back:
//!
//! - **Codec** ([`Codec`] trait) — the size / write / read contract every
//!   wire shape implements, plus [`encode`] and [`decode`] helpers.
//! - **Primitives** — [`boolean`], [`int32`], [`int64`], [`float32`],
//!   [`float64`], [`string`], [`uleb128`], and a few extras
//!   ([`uint8`] … [`uint64`], [`bytes`], [`unit`]).
//! - **Combinators** — [`nullable`], [`list`], [`map`], [`tuple`],
//!   [`structure`], [`enumeration`], [`mapped`].
//! - **Errors** ([`BcsError`]) — malformed input vs. codec defects.
//!
//! # Canonical encoding
//!
//! Every value of a declared shape has exactly one encoding: fixed
//! little-endian widths, minimal ULEB128 prefixes, no padding, no field
//! tags. The decoders enforce it from the other side — a non-canonical
//! byte string (a boolean of `2`, a padded ULEB128, a duplicated map key,
//! trailing garbage) is an error, not a second spelling of the same value.
//!
//! ```text
//! struct Score { id: string, score: int32 }   { id: "abc", score: 7 }
//!
//!   03 61 62 63   07 00 00 00
//!   └─ "abc" ─┘   └─ 7 LE ──┘
//! ```
//!
//! # Schema evolution
//!
//! There is none. Structs and tuples carry no tags, so both ends must
//! declare the same fields in the same order.

mod codec;
mod combinators;
mod error;
mod primitives;
mod structure;
pub mod uleb128;

pub use codec::{decode, encode, encode_into, mapped, Codec, Mapped};
pub use combinators::{
    enumeration, list, map, nullable, Enumeration, List, MapCodec, Nullable,
};
pub use error::BcsError;
pub use indexmap::IndexMap;
pub use primitives::{
    boolean, bytes, float32, float64, int32, int64, string, uint16, uint32,
    uint64, uint8, unit, Bool, ByteVec, Float32, Float64, Int32, Int64,
    Uint16, Uint32, Uint64, Uint8, Unit, Utf8String,
};
pub use structure::{field, structure, tuple, Field, FieldList, Structure};
pub use uleb128::{uleb128, Uleb128};
