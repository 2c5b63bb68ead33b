//! Combinators that build bigger codecs out of smaller ones.
//!
//! Each combinator only ever calls its children's `size` / `write` /
//! `read`. That keeps the size/write agreement compositional: if every
//! child is exact, so is the parent.

use std::fmt::Debug;
use std::hash::Hash;

use indexmap::IndexMap;

use crate::codec::put;
use crate::primitives::read_flag;
use crate::{uleb128, BcsError, Codec};

// ---------------------------------------------------------------------------
// Nullable
// ---------------------------------------------------------------------------

/// `Option<T>`: a presence byte (0/1), then the payload if present.
#[derive(Debug, Clone, Copy, Default)]
pub struct Nullable<C>(C);

/// Builds a [`Nullable`] codec around `inner`.
pub fn nullable<C>(inner: C) -> Nullable<C> {
    Nullable(inner)
}

impl<T, C: Codec<T>> Codec<Option<T>> for Nullable<C> {
    fn size(&self, value: &Option<T>) -> usize {
        1 + value.as_ref().map_or(0, |v| self.0.size(v))
    }

    fn write(
        &self,
        buf: &mut [u8],
        offset: usize,
        value: &Option<T>,
    ) -> Result<usize, BcsError> {
        match value {
            None => put(buf, offset, &[0]),
            Some(v) => {
                put(buf, offset, &[1])?;
                Ok(1 + self.0.write(buf, offset + 1, v)?)
            }
        }
    }

    fn read(
        &self,
        buf: &[u8],
        offset: usize,
    ) -> Result<(usize, Option<T>), BcsError> {
        if !read_flag(buf, offset, "nullable")? {
            return Ok((1, None));
        }
        let (n, v) = self.0.read(buf, offset + 1)?;
        Ok((1 + n, Some(v)))
    }

    fn describe(&self) -> String {
        format!("nullable<{}>", self.0.describe())
    }
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// `Vec<T>`: ULEB128 count, then each element in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct List<C>(C);

/// Builds a [`List`] codec around the element codec.
pub fn list<C>(element: C) -> List<C> {
    List(element)
}

impl<T, C: Codec<T>> Codec<Vec<T>> for List<C> {
    fn size(&self, value: &Vec<T>) -> usize {
        uleb128::prefix_len(value.len())
            + value.iter().map(|v| self.0.size(v)).sum::<usize>()
    }

    fn write(
        &self,
        buf: &mut [u8],
        offset: usize,
        value: &Vec<T>,
    ) -> Result<usize, BcsError> {
        let count = uleb128::length_prefix(value.len())?;
        let mut cursor = offset + uleb128::write(buf, offset, count)?;
        for item in value {
            cursor += self.0.write(buf, cursor, item)?;
        }
        Ok(cursor - offset)
    }

    fn read(
        &self,
        buf: &[u8],
        offset: usize,
    ) -> Result<(usize, Vec<T>), BcsError> {
        let (prefix, count) = uleb128::read(buf, offset)?;
        let mut cursor = offset + prefix;

        // Cap the preallocation by the bytes left: a hostile prefix can
        // claim four billion elements. The count itself can't be rejected
        // up front because `unit` elements take zero bytes.
        let remaining = buf.len().saturating_sub(cursor);
        let mut items = Vec::with_capacity((count as usize).min(remaining));

        for _ in 0..count {
            let (n, item) = self.0.read(buf, cursor)?;
            cursor += n;
            items.push(item);
        }
        Ok((cursor - offset, items))
    }

    fn describe(&self) -> String {
        format!("list<{}>", self.0.describe())
    }
}

// ---------------------------------------------------------------------------
// Map
// ---------------------------------------------------------------------------

/// `IndexMap<K, V>`: ULEB128 count, then `(key, value)` pairs in
/// insertion order.
///
/// Insertion order survives the round trip. Decoding rejects a repeated
/// key.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapCodec<KC, VC> {
    key: KC,
    value: VC,
}

/// Builds a [`MapCodec`] from a key codec and a value codec.
pub fn map<KC, VC>(key: KC, value: VC) -> MapCodec<KC, VC> {
    MapCodec { key, value }
}

impl<K, V, KC, VC> Codec<IndexMap<K, V>> for MapCodec<KC, VC>
where
    K: Hash + Eq,
    KC: Codec<K>,
    VC: Codec<V>,
{
    fn size(&self, value: &IndexMap<K, V>) -> usize {
        uleb128::prefix_len(value.len())
            + value
                .iter()
                .map(|(k, v)| self.key.size(k) + self.value.size(v))
                .sum::<usize>()
    }

    fn write(
        &self,
        buf: &mut [u8],
        offset: usize,
        value: &IndexMap<K, V>,
    ) -> Result<usize, BcsError> {
        let count = uleb128::length_prefix(value.len())?;
        let mut cursor = offset + uleb128::write(buf, offset, count)?;
        for (k, v) in value {
            cursor += self.key.write(buf, cursor, k)?;
            cursor += self.value.write(buf, cursor, v)?;
        }
        Ok(cursor - offset)
    }

    fn read(
        &self,
        buf: &[u8],
        offset: usize,
    ) -> Result<(usize, IndexMap<K, V>), BcsError> {
        let (prefix, count) = uleb128::read(buf, offset)?;
        let mut cursor = offset + prefix;
        let remaining = buf.len().saturating_sub(cursor);
        let mut entries =
            IndexMap::with_capacity((count as usize).min(remaining));

        for _ in 0..count {
            let entry_offset = cursor;
            let (nk, k) = self.key.read(buf, cursor)?;
            cursor += nk;
            let (nv, v) = self.value.read(buf, cursor)?;
            cursor += nv;

            // A repeated key would make two byte strings decode to one map.
            if entries.insert(k, v).is_some() {
                return Err(BcsError::DuplicateMapKey {
                    offset: entry_offset,
                });
            }
        }
        Ok((cursor - offset, entries))
    }

    fn describe(&self) -> String {
        format!("map<{},{}>", self.key.describe(), self.value.describe())
    }
}

// ---------------------------------------------------------------------------
// Enumeration
// ---------------------------------------------------------------------------

/// A closed set of values, encoded as a ULEB128 index into a fixed list.
///
/// Both ends must use the same list in the same order — index 2 means
/// whatever the third entry is on the reading side.
#[derive(Debug, Clone)]
pub struct Enumeration<T> {
    name: &'static str,
    values: Vec<T>,
}

/// Builds an [`Enumeration`] codec over `values`, in order.
///
/// ```rust
/// use lobbywire_bcs::{decode, encode, enumeration};
///
/// #[derive(Debug, Clone, PartialEq)]
/// enum Suit { Hearts, Spades }
///
/// let codec = enumeration("Suit", vec![Suit::Hearts, Suit::Spades]);
/// assert_eq!(encode(&codec, &Suit::Spades).unwrap(), vec![1]);
/// assert_eq!(decode(&codec, &[0]).unwrap(), Suit::Hearts);
/// ```
///
/// # Panics
/// If a value appears twice, since it would have two indices.
pub fn enumeration<T>(name: &'static str, values: Vec<T>) -> Enumeration<T>
where
    T: PartialEq + Debug,
{
    for (i, value) in values.iter().enumerate() {
        assert!(
            !values[..i].contains(value),
            "{name}: value {value:?} appears twice"
        );
    }
    Enumeration { name, values }
}

impl<T> Enumeration<T>
where
    T: PartialEq,
{
    fn index_of(&self, value: &T) -> Option<usize> {
        self.values.iter().position(|v| v == value)
    }
}

impl<T> Codec<T> for Enumeration<T>
where
    T: PartialEq + Clone + Debug + Send + Sync,
{
    fn size(&self, value: &T) -> usize {
        // An unknown value fails in `write`; any size will do here.
        uleb128::prefix_len(self.index_of(value).unwrap_or(0))
    }

    fn write(
        &self,
        buf: &mut [u8],
        offset: usize,
        value: &T,
    ) -> Result<usize, BcsError> {
        let index = self
            .index_of(value)
            .ok_or(BcsError::NotInEnumeration(self.name))?;
        uleb128::write(buf, offset, uleb128::length_prefix(index)?)
    }

    fn read(&self, buf: &[u8], offset: usize) -> Result<(usize, T), BcsError> {
        let (n, index) = uleb128::read(buf, offset)?;
        let value = self.values.get(index as usize).ok_or(
            BcsError::InvalidDiscriminant {
                kind: self.name,
                value: index,
                offset,
            },
        )?;
        Ok((n, value.clone()))
    }

    fn describe(&self) -> String {
        let names: Vec<String> =
            self.values.iter().map(|v| format!("{v:?}")).collect();
        format!("enum {}[{}]", self.name, names.join(","))
    }
}
