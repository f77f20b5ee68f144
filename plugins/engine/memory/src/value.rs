use std::ffi::c_char;

use quiver_abi::ffi::{RawLogicalType, RawValue};
use quiver_abi::{Interval, TypeTag};

use crate::alloc::track;
use crate::types::TypeNode;
use crate::vector::Cell;

/// Scalar value: a type plus the single row it holds.
pub(crate) struct ValueNode {
    pub ty: TypeNode,
    pub cell: Cell,
}

impl ValueNode {
    fn into_handle(self) -> RawValue {
        track(|live| live.values += 1);
        Box::into_raw(Box::new(self)).cast()
    }

    /// # Safety
    ///
    /// `raw` must be null or a live value handle of this engine.
    pub unsafe fn from_handle<'a>(raw: RawValue) -> Option<&'a ValueNode> {
        unsafe { raw.cast::<ValueNode>().as_ref() }
    }

    fn fixed(tag: TypeTag, bytes: &[u8]) -> RawValue {
        Self {
            ty: TypeNode::leaf(tag),
            cell: Cell::Fixed(bytes.to_vec()),
        }
        .into_handle()
    }
}

macro_rules! scalar_constructor {
    ($name:ident, $ty:ty, $tag:ident) => {
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $name(value: $ty) -> RawValue {
            ValueNode::fixed(TypeTag::$tag, &value.to_ne_bytes())
        }
    };
}

scalar_constructor!(qv_create_int8, i8, TinyInt);
scalar_constructor!(qv_create_int16, i16, SmallInt);
scalar_constructor!(qv_create_int32, i32, Integer);
scalar_constructor!(qv_create_int64, i64, BigInt);
scalar_constructor!(qv_create_uint8, u8, UTinyInt);
scalar_constructor!(qv_create_uint16, u16, USmallInt);
scalar_constructor!(qv_create_uint32, u32, UInteger);
scalar_constructor!(qv_create_uint64, u64, UBigInt);
scalar_constructor!(qv_create_float, f32, Float);
scalar_constructor!(qv_create_double, f64, Double);
scalar_constructor!(qv_create_date, i32, Date);
scalar_constructor!(qv_create_time, i64, Time);
scalar_constructor!(qv_create_timestamp, i64, Timestamp);
scalar_constructor!(qv_create_timestamp_tz, i64, TimestampTz);

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_create_bool(value: bool) -> RawValue {
    ValueNode::fixed(TypeTag::Boolean, &[value as u8])
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_create_interval(value: Interval) -> RawValue {
    let mut bytes = Vec::with_capacity(size_of::<Interval>());
    bytes.extend_from_slice(&value.months.to_ne_bytes());
    bytes.extend_from_slice(&value.days.to_ne_bytes());
    bytes.extend_from_slice(&value.micros.to_ne_bytes());
    ValueNode::fixed(TypeTag::Interval, &bytes)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_create_varchar_length(data: *const c_char, len: u64) -> RawValue {
    let bytes = if len == 0 {
        Vec::new()
    } else if data.is_null() {
        return std::ptr::null_mut();
    } else {
        unsafe { std::slice::from_raw_parts(data.cast::<u8>(), len as usize) }.to_vec()
    };
    ValueNode {
        ty: TypeNode::leaf(TypeTag::Varchar),
        cell: Cell::Bytes(bytes),
    }
    .into_handle()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_create_null_value() -> RawValue {
    ValueNode {
        ty: TypeNode::leaf(TypeTag::SqlNull),
        cell: Cell::Null,
    }
    .into_handle()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_destroy_value(value: *mut RawValue) {
    if value.is_null() {
        return;
    }
    unsafe {
        let raw = *value;
        if !raw.is_null() {
            drop(Box::from_raw(raw.cast::<ValueNode>()));
            track(|live| live.values -= 1);
        }
        *value = std::ptr::null_mut();
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_get_value_type(value: RawValue) -> RawLogicalType {
    unsafe { ValueNode::from_handle(value) }
        .map_or(std::ptr::null_mut(), |node| node.ty.as_borrowed_handle())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_values_carry_their_type() {
        unsafe {
            let mut v = qv_create_int64(-5);
            let ty = qv_get_value_type(v);
            assert_eq!(crate::types::qv_get_type_id(ty), TypeTag::BigInt.as_raw());
            let node = ValueNode::from_handle(v).unwrap();
            assert_eq!(node.cell, Cell::Fixed((-5i64).to_ne_bytes().to_vec()));
            qv_destroy_value(&mut v);
            assert!(v.is_null());
        }
    }

    #[test]
    fn null_value_is_sql_null() {
        unsafe {
            let mut v = qv_create_null_value();
            let node = ValueNode::from_handle(v).unwrap();
            assert_eq!(node.ty.tag, TypeTag::SqlNull);
            assert_eq!(node.cell, Cell::Null);
            qv_destroy_value(&mut v);
        }
    }
}
