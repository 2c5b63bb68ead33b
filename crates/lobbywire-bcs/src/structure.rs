//! Fixed-arity shapes: tuples and named structs.
//!
//! Neither carries a length prefix or field tags — the bytes are just the
//! children's bytes, back to back, in declaration order. That makes them
//! compact, and it also makes them fragile: a reader that declares the
//! fields in a different order will happily read the wrong bytes into the
//! wrong fields. Both ends must declare the same order.

use crate::{BcsError, Codec};

// ---------------------------------------------------------------------------
// Tuples
// ---------------------------------------------------------------------------

/// A tuple of codecs is a codec for the tuple of their values:
/// `(int32(), string())` encodes `(i32, String)`.
///
/// This function only exists to make call sites read like the other
/// combinators; it returns its argument unchanged.
pub fn tuple<C>(codecs: C) -> C {
    codecs
}

/// Implements `Codec` for tuples of codecs of one arity.
///
/// `$v` are the value types, `$c` the codec types, `$i` the tuple index.
/// Tuple expressions evaluate left to right, which is what keeps `read`
/// consuming fields in the same order `write` produced them.
macro_rules! tuple_codec {
    ($($v:ident : $c:ident . $i:tt),+) => {
        impl<$($v,)+ $($c: Codec<$v>,)+> Codec<($($v,)+)> for ($($c,)+) {
            fn size(&self, value: &($($v,)+)) -> usize {
                0 $(+ self.$i.size(&value.$i))+
            }

            fn write(
                &self,
                buf: &mut [u8],
                offset: usize,
                value: &($($v,)+),
            ) -> Result<usize, BcsError> {
                let mut cursor = offset;
                $(cursor += self.$i.write(buf, cursor, &value.$i)?;)+
                Ok(cursor - offset)
            }

            fn read(
                &self,
                buf: &[u8],
                offset: usize,
            ) -> Result<(usize, ($($v,)+)), BcsError> {
                let mut cursor = offset;
                let value = ($({
                    let (n, v) = self.$i.read(buf, cursor)?;
                    cursor += n;
                    v
                },)+);
                Ok((cursor - offset, value))
            }

            fn describe(&self) -> String {
                let parts = [$(self.$i.describe()),+];
                format!("tuple({})", parts.join(","))
            }
        }
    };
}

tuple_codec!(A: CA.0, B: CB.1);
tuple_codec!(A: CA.0, B: CB.1, C: CC.2);
tuple_codec!(A: CA.0, B: CB.1, C: CC.2, D: CD.3);
tuple_codec!(A: CA.0, B: CB.1, C: CC.2, D: CD.3, E: CE.4);
tuple_codec!(A: CA.0, B: CB.1, C: CC.2, D: CD.3, E: CE.4, F: CF.5);

// ---------------------------------------------------------------------------
// Structs
// ---------------------------------------------------------------------------

/// One named field of a struct: a name, a getter, and the field's codec.
pub struct Field<S, F, C> {
    name: &'static str,
    get: fn(&S) -> &F,
    codec: C,
}

/// Declares a struct field for [`structure`].
pub fn field<S, F, C: Codec<F>>(
    name: &'static str,
    get: fn(&S) -> &F,
    codec: C,
) -> Field<S, F, C> {
    Field { name, get, codec }
}

/// An ordered list of [`Field`]s for struct `S`, as a tuple.
///
/// Implemented for tuples of 1 to 8 fields. `Values` is the tuple of the
/// decoded field values, handed to the struct's constructor.
pub trait FieldList<S>: Send + Sync {
    /// Field values in declaration order.
    type Values;

    /// Sum of the field sizes.
    fn size(&self, value: &S) -> usize;

    /// Writes every field in declaration order.
    fn write(
        &self,
        buf: &mut [u8],
        offset: usize,
        value: &S,
    ) -> Result<usize, BcsError>;

    /// Reads every field in declaration order.
    fn read(
        &self,
        buf: &[u8],
        offset: usize,
    ) -> Result<(usize, Self::Values), BcsError>;

    /// `name:shape` pairs, comma separated.
    fn describe(&self) -> String;
}

macro_rules! field_list {
    ($($f:ident : $c:ident . $i:tt),+) => {
        impl<S, $($f, $c: Codec<$f>,)+> FieldList<S> for ($(Field<S, $f, $c>,)+) {
            type Values = ($($f,)+);

            fn size(&self, value: &S) -> usize {
                0 $(+ self.$i.codec.size((self.$i.get)(value)))+
            }

            fn write(
                &self,
                buf: &mut [u8],
                offset: usize,
                value: &S,
            ) -> Result<usize, BcsError> {
                let mut cursor = offset;
                $(cursor += self.$i.codec.write(buf, cursor, (self.$i.get)(value))?;)+
                Ok(cursor - offset)
            }

            fn read(
                &self,
                buf: &[u8],
                offset: usize,
            ) -> Result<(usize, Self::Values), BcsError> {
                let mut cursor = offset;
                let values = ($({
                    let (n, v) = self.$i.codec.read(buf, cursor)?;
                    cursor += n;
                    v
                },)+);
                Ok((cursor - offset, values))
            }

            fn describe(&self) -> String {
                let parts = [$(format!("{}:{}", self.$i.name, self.$i.codec.describe())),+];
                parts.join(",")
            }
        }
    };
}

field_list!(A: CA.0);
field_list!(A: CA.0, B: CB.1);
field_list!(A: CA.0, B: CB.1, C: CC.2);
field_list!(A: CA.0, B: CB.1, C: CC.2, D: CD.3);
field_list!(A: CA.0, B: CB.1, C: CC.2, D: CD.3, E: CE.4);
field_list!(A: CA.0, B: CB.1, C: CC.2, D: CD.3, E: CE.4, F: CF.5);
field_list!(A: CA.0, B: CB.1, C: CC.2, D: CD.3, E: CE.4, F: CF.5, G: CG.6);
field_list!(A: CA.0, B: CB.1, C: CC.2, D: CD.3, E: CE.4, F: CF.5, G: CG.6, H: CH.7);

/// A named struct: fields in declaration order, no prefix, no tags.
pub struct Structure<S, L, B> {
    name: &'static str,
    fields: L,
    build: B,
    _marker: std::marker::PhantomData<fn() -> S>,
}

/// Builds a [`Structure`] codec.
///
/// `fields` is a tuple of [`field`]s in wire order; `build` turns the
/// decoded values (a tuple in the same order) back into the struct.
///
/// ```rust
/// use lobbywire_bcs::{decode, encode, field, int32, string, structure};
///
/// #[derive(Debug, PartialEq)]
/// struct Score { id: String, score: i32 }
///
/// let codec = structure(
///     "Score",
///     (
///         field("id", |s: &Score| &s.id, string()),
///         field("score", |s: &Score| &s.score, int32()),
///     ),
///     |(id, score)| Score { id, score },
/// );
///
/// let value = Score { id: "abc".into(), score: 7 };
/// let bytes = encode(&codec, &value).unwrap();
/// assert_eq!(bytes, [3, b'a', b'b', b'c', 7, 0, 0, 0]);
/// assert_eq!(decode(&codec, &bytes).unwrap(), value);
/// ```
pub fn structure<S, L, B>(
    name: &'static str,
    fields: L,
    build: B,
) -> Structure<S, L, B>
where
    L: FieldList<S>,
    B: Fn(L::Values) -> S + Send + Sync,
{
    Structure {
        name,
        fields,
        build,
        _marker: std::marker::PhantomData,
    }
}

impl<S, L, B> Codec<S> for Structure<S, L, B>
where
    L: FieldList<S>,
    B: Fn(L::Values) -> S + Send + Sync,
{
    fn size(&self, value: &S) -> usize {
        self.fields.size(value)
    }

    fn write(
        &self,
        buf: &mut [u8],
        offset: usize,
        value: &S,
    ) -> Result<usize, BcsError> {
        self.fields.write(buf, offset, value)
    }

    fn read(&self, buf: &[u8], offset: usize) -> Result<(usize, S), BcsError> {
        let (n, values) = self.fields.read(buf, offset)?;
        Ok((n, (self.build)(values)))
    }

    fn describe(&self) -> String {
        format!("struct {}{{{}}}", self.name, self.fields.describe())
    }
}
