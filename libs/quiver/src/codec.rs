//! Recursive value codec.
//!
//! Statically typed path: [`decode`] / [`encode`] over types implementing
//! [`Decode`] / [`Encode`]. `Vec<Option<T>>` is the host form of a LIST
//! column and nests to any depth.
//!
//! Dynamically typed path: [`decode_values`] / [`encode_values`] dispatch on
//! the runtime tag and produce or consume [`Value`].
//!
//! Both paths validate the full type tree and the requested row range before
//! touching data, so a failed call never yields partial output.

use quiver_abi::{Interval, ListEntry, StringElement, TypeTag};

use crate::error::{Error, Result};
use crate::types::{LogicalTypeRef, TypeHandle};
use crate::value::{Date, Time, Timestamp, TimestampTz, Value};
use crate::vector::{Primitive, VectorHandle, VectorHandleMut};

// ═══════════════════════════════════════════════════════════════
//  Traits
// ═══════════════════════════════════════════════════════════════

/// Host type with a fixed engine type.
pub trait Typed {
    /// Tag of the outermost engine type.
    const TAG: TypeTag;

    /// Check the full engine type tree, not just the outer tag.
    fn check_type(ty: LogicalTypeRef<'_>) -> Result<()> {
        expect(ty.type_tag(), Self::TAG)
    }
}

pub trait Decode: Typed + Sized {
    /// Decode rows `offset..offset + length`. Type and range are already
    /// validated by [`decode`].
    fn decode_range(vector: &impl VectorHandle, length: usize, offset: usize) -> Result<Vec<Option<Self>>>;
}

pub trait Encode: Typed + Sized {
    /// Write `values` starting at row `offset`. Type and range are already
    /// validated by [`encode`].
    fn encode_range(vector: &mut impl VectorHandleMut, values: &[Option<Self>], offset: usize) -> Result<()>;
}

fn expect(actual: TypeTag, expected: TypeTag) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(Error::TypeMismatch { expected, actual })
    }
}

fn check_range(vector: &impl VectorHandle, length: usize, offset: usize) -> Result<()> {
    let len = vector.len();
    match offset.checked_add(length) {
        Some(end) if end <= len => Ok(()),
        _ => Err(Error::out_of_bounds("row", offset.saturating_add(length), len)),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Entry points
// ═══════════════════════════════════════════════════════════════

/// Decode `length` rows starting at `offset` as `T`.
pub fn decode<T: Decode>(vector: &impl VectorHandle, length: usize, offset: usize) -> Result<Vec<Option<T>>> {
    T::check_type(vector.logical_type())?;
    check_range(vector, length, offset)?;
    T::decode_range(vector, length, offset)
}

/// Encode `values` into rows `offset..offset + values.len()`.
pub fn encode<T: Encode>(vector: &mut impl VectorHandleMut, values: &[Option<T>], offset: usize) -> Result<()> {
    T::check_type(vector.logical_type())?;
    check_range(vector, values.len(), offset)?;
    T::encode_range(vector, values, offset)
}

// ═══════════════════════════════════════════════════════════════
//  Fixed width
// ═══════════════════════════════════════════════════════════════

fn decode_fixed<T: Primitive>(vector: &impl VectorHandle, length: usize, offset: usize) -> Result<Vec<Option<T>>> {
    let data = &vector.data::<T>()?[offset..offset + length];
    let validity = vector.validity();
    if validity.is_all_valid() {
        return Ok(data.iter().copied().map(Some).collect());
    }
    Ok(data
        .iter()
        .enumerate()
        .map(|(i, v)| validity.is_valid(offset + i).then_some(*v))
        .collect())
}

fn encode_fixed<T: Primitive>(vector: &mut impl VectorHandleMut, values: &[Option<T>], offset: usize) -> Result<()> {
    let data = &mut vector.data_mut::<T>()?[offset..offset + values.len()];
    for (slot, value) in data.iter_mut().zip(values) {
        if let Some(value) = value {
            *slot = *value;
        }
    }
    write_validity(vector, offset, values.iter().map(Option::is_some))
}

/// Apply per-row validity. Untouched when every row is valid and no
/// bitmap exists yet.
fn write_validity(
    vector: &mut impl VectorHandleMut,
    offset: usize,
    valid: impl ExactSizeIterator<Item = bool> + Clone,
) -> Result<()> {
    let any_null = valid.clone().any(|v| !v);
    if !any_null && vector.validity().is_all_valid() {
        return Ok(());
    }
    let mut validity = vector.ensure_validity_writable()?;
    for (i, v) in valid.enumerate() {
        validity.set_valid(offset + i, v);
    }
    Ok(())
}

macro_rules! fixed_width {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(
            impl Typed for $ty {
                const TAG: TypeTag = TypeTag::$tag;
            }

            impl Decode for $ty {
                fn decode_range(vector: &impl VectorHandle, length: usize, offset: usize) -> Result<Vec<Option<Self>>> {
                    decode_fixed(vector, length, offset)
                }
            }

            impl Encode for $ty {
                fn encode_range(vector: &mut impl VectorHandleMut, values: &[Option<Self>], offset: usize) -> Result<()> {
                    encode_fixed(vector, values, offset)
                }
            }
        )*
    };
}

fixed_width!(
    bool => Boolean,
    i8 => TinyInt,
    i16 => SmallInt,
    i32 => Integer,
    i64 => BigInt,
    u8 => UTinyInt,
    u16 => USmallInt,
    u32 => UInteger,
    u64 => UBigInt,
    f32 => Float,
    f64 => Double,
    Date => Date,
    Time => Time,
    Timestamp => Timestamp,
    TimestampTz => TimestampTz,
    Interval => Interval,
);

// ═══════════════════════════════════════════════════════════════
//  Strings
// ═══════════════════════════════════════════════════════════════

impl Typed for String {
    const TAG: TypeTag = TypeTag::Varchar;
}

impl Decode for String {
    fn decode_range(vector: &impl VectorHandle, length: usize, offset: usize) -> Result<Vec<Option<Self>>> {
        let elements = &vector.data::<StringElement>()?[offset..offset + length];
        let validity = vector.validity();
        Ok(elements
            .iter()
            .enumerate()
            .map(|(i, element)| {
                validity.is_valid(offset + i).then(|| {
                    // Inline bytes live in the element; long strings point
                    // into engine memory owned by the vector.
                    let bytes = unsafe { element.as_bytes() };
                    String::from_utf8_lossy(bytes).into_owned()
                })
            })
            .collect())
    }
}

fn encode_strings<S: AsRef<str>>(
    vector: &mut impl VectorHandleMut,
    values: &[Option<S>],
    offset: usize,
) -> Result<()> {
    for (i, value) in values.iter().enumerate() {
        if let Some(value) = value {
            vector.assign_string(offset + i, value.as_ref().as_bytes())?;
        }
    }
    write_validity(vector, offset, values.iter().map(Option::is_some))
}

impl Encode for String {
    fn encode_range(vector: &mut impl VectorHandleMut, values: &[Option<Self>], offset: usize) -> Result<()> {
        encode_strings(vector, values, offset)
    }
}

impl Typed for &str {
    const TAG: TypeTag = TypeTag::Varchar;
}

impl Encode for &str {
    fn encode_range(vector: &mut impl VectorHandleMut, values: &[Option<Self>], offset: usize) -> Result<()> {
        encode_strings(vector, values, offset)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Lists
// ═══════════════════════════════════════════════════════════════

impl<T: Typed> Typed for Vec<Option<T>> {
    const TAG: TypeTag = TypeTag::List;

    fn check_type(ty: LogicalTypeRef<'_>) -> Result<()> {
        expect(ty.type_tag(), TypeTag::List)?;
        T::check_type(ty.child_type()?)
    }
}

/// List entries of rows `offset..offset + length`, each checked against the
/// child's size.
fn list_entries<'v>(vector: &'v impl VectorHandle, length: usize, offset: usize) -> Result<&'v [ListEntry]> {
    let entries = &vector.data::<ListEntry>()?[offset..offset + length];
    let child_len = vector.list_size()?;
    let validity = vector.validity();
    for (i, entry) in entries.iter().enumerate() {
        if validity.is_valid(offset + i) && entry.end() > child_len as u64 {
            return Err(Error::out_of_bounds("list element", entry.end() as usize, child_len));
        }
    }
    Ok(entries)
}

impl<T: Decode> Decode for Vec<Option<T>> {
    fn decode_range(vector: &impl VectorHandle, length: usize, offset: usize) -> Result<Vec<Option<Self>>> {
        let entries = list_entries(vector, length, offset)?;
        let child = vector.list_child()?;
        let validity = vector.validity();
        entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                if !validity.is_valid(offset + i) {
                    return Ok(None);
                }
                T::decode_range(&child, entry.length as usize, entry.offset as usize).map(Some)
            })
            .collect()
    }
}

impl<T: Encode> Encode for Vec<Option<T>> {
    fn encode_range(vector: &mut impl VectorHandleMut, values: &[Option<Self>], offset: usize) -> Result<()> {
        let lists: Vec<Option<&[Option<T>]>> = values.iter().map(|v| v.as_deref()).collect();
        encode_list(vector, &lists, offset, |child, items, at| T::encode_range(child, items, at))
    }
}

/// Append every list's elements to the child, then write the parent's
/// entries and validity.
fn encode_list<I>(
    vector: &mut impl VectorHandleMut,
    lists: &[Option<&[I]>],
    offset: usize,
    mut encode_child: impl FnMut(&mut crate::vector::VectorMut<'_>, &[I], usize) -> Result<()>,
) -> Result<()> {
    let start = vector.list_size()?;
    let total: usize = lists.iter().flatten().map(|items| items.len()).sum();
    vector.list_reserve(start + total)?;
    vector.list_set_size(start + total)?;

    {
        let mut child = vector.list_child_mut()?;
        let mut cursor = start;
        for items in lists.iter().flatten() {
            encode_child(&mut child, items, cursor)?;
            cursor += items.len();
        }
    }

    let entries = &mut vector.data_mut::<ListEntry>()?[offset..offset + lists.len()];
    let mut cursor = start as u64;
    for (entry, list) in entries.iter_mut().zip(lists) {
        let length = list.map_or(0, |items| items.len() as u64);
        *entry = ListEntry::new(cursor, length);
        cursor += length;
    }
    write_validity(vector, offset, lists.iter().map(Option::is_some))
}

// ═══════════════════════════════════════════════════════════════
//  Dynamic path
// ═══════════════════════════════════════════════════════════════

fn lift<T: Decode>(
    vector: &impl VectorHandle,
    length: usize,
    offset: usize,
    wrap: fn(T) -> Value,
) -> Result<Vec<Value>> {
    Ok(T::decode_range(vector, length, offset)?
        .into_iter()
        .map(|v| v.map_or(Value::Null, wrap))
        .collect())
}

/// Decode rows by runtime tag.
///
/// LIST decodes recursively, ARRAY through its child with `row * size`
/// offsets. Tags without a host representation are `NotSupported`.
pub fn decode_values(vector: &impl VectorHandle, length: usize, offset: usize) -> Result<Vec<Value>> {
    check_range(vector, length, offset)?;
    let tag = vector.type_tag();
    tracing::trace!(tag = %tag, length, offset, "decode values");
    match tag {
        TypeTag::Boolean => lift(vector, length, offset, Value::Boolean),
        TypeTag::TinyInt => lift(vector, length, offset, Value::TinyInt),
        TypeTag::SmallInt => lift(vector, length, offset, Value::SmallInt),
        TypeTag::Integer => lift(vector, length, offset, Value::Integer),
        TypeTag::BigInt => lift(vector, length, offset, Value::BigInt),
        TypeTag::UTinyInt => lift(vector, length, offset, Value::UTinyInt),
        TypeTag::USmallInt => lift(vector, length, offset, Value::USmallInt),
        TypeTag::UInteger => lift(vector, length, offset, Value::UInteger),
        TypeTag::UBigInt => lift(vector, length, offset, Value::UBigInt),
        TypeTag::Float => lift(vector, length, offset, Value::Float),
        TypeTag::Double => lift(vector, length, offset, Value::Double),
        TypeTag::Date => lift(vector, length, offset, Value::Date),
        TypeTag::Time => lift(vector, length, offset, Value::Time),
        TypeTag::Timestamp => lift(vector, length, offset, Value::Timestamp),
        TypeTag::TimestampTz => lift(vector, length, offset, Value::TimestampTz),
        TypeTag::Interval => lift(vector, length, offset, Value::Interval),
        TypeTag::Varchar => lift(vector, length, offset, Value::Varchar),
        TypeTag::List => {
            check_decodable(vector.logical_type())?;
            let entries = list_entries(vector, length, offset)?;
            let child = vector.list_child()?;
            let validity = vector.validity();
            entries
                .iter()
                .enumerate()
                .map(|(i, entry)| {
                    if !validity.is_valid(offset + i) {
                        return Ok(Value::Null);
                    }
                    decode_values(&child, entry.length as usize, entry.offset as usize).map(Value::List)
                })
                .collect()
        }
        TypeTag::Array => {
            check_decodable(vector.logical_type())?;
            let size = vector.logical_type().array_size()?;
            let child = vector.array_child()?;
            let validity = vector.validity();
            (offset..offset + length)
                .map(|row| {
                    if !validity.is_valid(row) {
                        return Ok(Value::Null);
                    }
                    decode_values(&child, size, row * size).map(Value::List)
                })
                .collect()
        }
        TypeTag::SqlNull => Ok(vec![Value::Null; length]),
        TypeTag::Invalid
        | TypeTag::HugeInt
        | TypeTag::UHugeInt
        | TypeTag::Blob
        | TypeTag::Decimal
        | TypeTag::TimestampS
        | TypeTag::TimestampMs
        | TypeTag::TimestampNs
        | TypeTag::Enum
        | TypeTag::Struct
        | TypeTag::Map
        | TypeTag::Uuid
        | TypeTag::Union
        | TypeTag::Bit
        | TypeTag::TimeTz
        | TypeTag::Any
        | TypeTag::Varint => Err(Error::NotSupported { tag }),
    }
}

/// Reject a nested type whose leaves are not decodable before reading any
/// row, so all-NULL prefixes cannot hide an unsupported child.
fn check_decodable(ty: LogicalTypeRef<'_>) -> Result<()> {
    match ty.type_tag() {
        TypeTag::List | TypeTag::Array => check_decodable(ty.child_type()?),
        tag if Value::supports(tag) => Ok(()),
        tag => Err(Error::NotSupported { tag }),
    }
}

impl Value {
    /// Tags the dynamic codec reads and writes.
    pub fn supports(tag: TypeTag) -> bool {
        matches!(
            tag,
            TypeTag::Boolean
                | TypeTag::TinyInt
                | TypeTag::SmallInt
                | TypeTag::Integer
                | TypeTag::BigInt
                | TypeTag::UTinyInt
                | TypeTag::USmallInt
                | TypeTag::UInteger
                | TypeTag::UBigInt
                | TypeTag::Float
                | TypeTag::Double
                | TypeTag::Date
                | TypeTag::Time
                | TypeTag::Timestamp
                | TypeTag::TimestampTz
                | TypeTag::Interval
                | TypeTag::Varchar
                | TypeTag::List
                | TypeTag::Array
                | TypeTag::SqlNull
        )
    }
}

fn lower<'v, T>(
    values: &'v [Value],
    expected: TypeTag,
    unwrap: fn(&'v Value) -> Option<T>,
) -> Result<Vec<Option<T>>> {
    values
        .iter()
        .map(|value| match value {
            Value::Null => Ok(None),
            other => unwrap(other).map(Some).ok_or(Error::TypeMismatch {
                expected,
                actual: other.type_tag(),
            }),
        })
        .collect()
}

/// Encode dynamic values by the vector's runtime tag. Each value must be
/// `Null` or the variant matching the tag.
pub fn encode_values(vector: &mut impl VectorHandleMut, values: &[Value], offset: usize) -> Result<()> {
    check_range(vector, values.len(), offset)?;
    let tag = vector.type_tag();
    check_decodable(vector.logical_type())?;
    check_value_shapes(vector.logical_type(), values)?;
    encode_checked(vector, values, offset, tag)
}

/// Validate every value against the type tree before any write.
fn check_value_shapes(ty: LogicalTypeRef<'_>, values: &[Value]) -> Result<()> {
    let tag = ty.type_tag();
    for value in values {
        match (tag, value) {
            (_, Value::Null) => {}
            (TypeTag::List, Value::List(items)) => check_value_shapes(ty.child_type()?, items)?,
            (TypeTag::Array, Value::List(items)) => {
                let size = ty.array_size()?;
                if items.len() != size {
                    return Err(Error::out_of_bounds("array element", items.len(), size));
                }
                check_value_shapes(ty.child_type()?, items)?;
            }
            (tag, value) if value.type_tag() == tag => {}
            (tag, value) => {
                return Err(Error::TypeMismatch {
                    expected: tag,
                    actual: value.type_tag(),
                });
            }
        }
    }
    Ok(())
}

fn encode_checked(vector: &mut impl VectorHandleMut, values: &[Value], offset: usize, tag: TypeTag) -> Result<()> {
    match tag {
        TypeTag::Boolean => encode_as::<bool>(vector, values, offset, tag),
        TypeTag::TinyInt => encode_as::<i8>(vector, values, offset, tag),
        TypeTag::SmallInt => encode_as::<i16>(vector, values, offset, tag),
        TypeTag::Integer => encode_as::<i32>(vector, values, offset, tag),
        TypeTag::BigInt => encode_as::<i64>(vector, values, offset, tag),
        TypeTag::UTinyInt => encode_as::<u8>(vector, values, offset, tag),
        TypeTag::USmallInt => encode_as::<u16>(vector, values, offset, tag),
        TypeTag::UInteger => encode_as::<u32>(vector, values, offset, tag),
        TypeTag::UBigInt => encode_as::<u64>(vector, values, offset, tag),
        TypeTag::Float => encode_as::<f32>(vector, values, offset, tag),
        TypeTag::Double => encode_as::<f64>(vector, values, offset, tag),
        TypeTag::Date => encode_as::<Date>(vector, values, offset, tag),
        TypeTag::Time => encode_as::<Time>(vector, values, offset, tag),
        TypeTag::Timestamp => encode_as::<Timestamp>(vector, values, offset, tag),
        TypeTag::TimestampTz => encode_as::<TimestampTz>(vector, values, offset, tag),
        TypeTag::Interval => encode_as::<Interval>(vector, values, offset, tag),
        TypeTag::Varchar => {
            let typed = lower(values, tag, |v| match v {
                Value::Varchar(s) => Some(s.as_str()),
                _ => None,
            })?;
            <&str>::encode_range(vector, &typed, offset)
        }
        TypeTag::List => {
            let lists = lower(values, tag, |v| v.as_list())?;
            let child_tag = vector.logical_type().child_type()?.type_tag();
            encode_list(vector, &lists, offset, |child, items, at| {
                encode_checked(child, items, at, child_tag)
            })
        }
        TypeTag::Array => {
            let size = vector.logical_type().array_size()?;
            let child_tag = vector.logical_type().child_type()?.type_tag();
            {
                let mut child = vector.array_child_mut()?;
                for (i, value) in values.iter().enumerate() {
                    if let Value::List(items) = value {
                        encode_checked(&mut child, items, (offset + i) * size, child_tag)?;
                    }
                }
            }
            write_validity(vector, offset, values.iter().map(|v| !v.is_null()))
        }
        TypeTag::SqlNull => {
            let mut validity = vector.ensure_validity_writable()?;
            for row in offset..offset + values.len() {
                validity.set_valid(row, false);
            }
            Ok(())
        }
        tag => Err(Error::NotSupported { tag }),
    }
}

/// Scalars whose `Value` variant wraps `T` directly.
trait FromValue: Encode + Copy {
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::$variant(x) => Some(*x),
                        _ => None,
                    }
                }
            }
        )*
    };
}

from_value!(
    bool => Boolean,
    i8 => TinyInt,
    i16 => SmallInt,
    i32 => Integer,
    i64 => BigInt,
    u8 => UTinyInt,
    u16 => USmallInt,
    u32 => UInteger,
    u64 => UBigInt,
    f32 => Float,
    f64 => Double,
    Date => Date,
    Time => Time,
    Timestamp => Timestamp,
    TimestampTz => TimestampTz,
    Interval => Interval,
);

fn encode_as<T: FromValue>(
    vector: &mut impl VectorHandleMut,
    values: &[Value],
    offset: usize,
    tag: TypeTag,
) -> Result<()> {
    let typed = lower(values, tag, T::from_value)?;
    T::encode_range(vector, &typed, offset)
}
