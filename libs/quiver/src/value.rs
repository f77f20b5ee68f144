use quiver_abi::ffi::RawValue;
use quiver_abi::{Interval, TypeTag};
use serde::ser::{SerializeSeq, SerializeStruct};
use serde::{Serialize, Serializer};

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::types::{LogicalTypeRef, TypeHandle};

// ═══════════════════════════════════════════════════════════════
//  Temporal host types
// ═══════════════════════════════════════════════════════════════

/// Days since 1970-01-01.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Date {
    pub days: i32,
}

/// Microseconds since midnight.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Time {
    pub micros: i64,
}

/// Microseconds since the Unix epoch, no time zone.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Timestamp {
    pub micros: i64,
}

/// Microseconds since the Unix epoch, UTC.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TimestampTz {
    pub micros: i64,
}

// ═══════════════════════════════════════════════════════════════
//  Value
// ═══════════════════════════════════════════════════════════════

/// Dynamically typed decoded value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    UTinyInt(u8),
    USmallInt(u16),
    UInteger(u32),
    UBigInt(u64),
    Float(f32),
    Double(f64),
    Date(Date),
    Time(Time),
    Timestamp(Timestamp),
    TimestampTz(TimestampTz),
    Interval(Interval),
    Varchar(String),
    /// Elements of a LIST or ARRAY row.
    List(Vec<Value>),
}

impl Value {
    /// Engine tag this value encodes to. `Null` reports `SQLNULL`.
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Null => TypeTag::SqlNull,
            Value::Boolean(_) => TypeTag::Boolean,
            Value::TinyInt(_) => TypeTag::TinyInt,
            Value::SmallInt(_) => TypeTag::SmallInt,
            Value::Integer(_) => TypeTag::Integer,
            Value::BigInt(_) => TypeTag::BigInt,
            Value::UTinyInt(_) => TypeTag::UTinyInt,
            Value::USmallInt(_) => TypeTag::USmallInt,
            Value::UInteger(_) => TypeTag::UInteger,
            Value::UBigInt(_) => TypeTag::UBigInt,
            Value::Float(_) => TypeTag::Float,
            Value::Double(_) => TypeTag::Double,
            Value::Date(_) => TypeTag::Date,
            Value::Time(_) => TypeTag::Time,
            Value::Timestamp(_) => TypeTag::Timestamp,
            Value::TimestampTz(_) => TypeTag::TimestampTz,
            Value::Interval(_) => TypeTag::Interval,
            Value::Varchar(_) => TypeTag::Varchar,
            Value::List(_) => TypeTag::List,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// JSON rendering: NULL as `null`, lists as arrays, temporal values as
    /// their integer encoding, intervals as `{months, days, micros}`.
    pub fn to_json(&self) -> serde_json::Value {
        // Serializing a Value never fails: there are no map keys, and
        // non-finite floats become `null`.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Varchar(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Varchar(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Boolean(v) => serializer.serialize_bool(*v),
            Value::TinyInt(v) => serializer.serialize_i8(*v),
            Value::SmallInt(v) => serializer.serialize_i16(*v),
            Value::Integer(v) => serializer.serialize_i32(*v),
            Value::BigInt(v) => serializer.serialize_i64(*v),
            Value::UTinyInt(v) => serializer.serialize_u8(*v),
            Value::USmallInt(v) => serializer.serialize_u16(*v),
            Value::UInteger(v) => serializer.serialize_u32(*v),
            Value::UBigInt(v) => serializer.serialize_u64(*v),
            Value::Float(v) => serializer.serialize_f32(*v),
            Value::Double(v) => serializer.serialize_f64(*v),
            Value::Date(v) => v.serialize(serializer),
            Value::Time(v) => v.serialize(serializer),
            Value::Timestamp(v) => v.serialize(serializer),
            Value::TimestampTz(v) => v.serialize(serializer),
            Value::Interval(v) => {
                let mut st = serializer.serialize_struct("Interval", 3)?;
                st.serialize_field("months", &v.months)?;
                st.serialize_field("days", &v.days)?;
                st.serialize_field("micros", &v.micros)?;
                st.end()
            }
            Value::Varchar(v) => serializer.serialize_str(v),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Scalar (engine value handle)
// ═══════════════════════════════════════════════════════════════

/// Owned engine scalar value, used with `reference_value`.
pub struct Scalar<'e> {
    engine: &'e Engine,
    raw: RawValue,
}

impl<'e> Scalar<'e> {
    /// Create an engine value from a host value. Lists have no scalar form
    /// in the engine ABI and yield `NotSupported`.
    pub fn new(engine: &'e Engine, value: &Value) -> Result<Self> {
        let api = engine.api();
        let raw = unsafe {
            match value {
                Value::Null => (api.create_null_value)(),
                Value::Boolean(v) => (api.create_bool)(*v),
                Value::TinyInt(v) => (api.create_int8)(*v),
                Value::SmallInt(v) => (api.create_int16)(*v),
                Value::Integer(v) => (api.create_int32)(*v),
                Value::BigInt(v) => (api.create_int64)(*v),
                Value::UTinyInt(v) => (api.create_uint8)(*v),
                Value::USmallInt(v) => (api.create_uint16)(*v),
                Value::UInteger(v) => (api.create_uint32)(*v),
                Value::UBigInt(v) => (api.create_uint64)(*v),
                Value::Float(v) => (api.create_float)(*v),
                Value::Double(v) => (api.create_double)(*v),
                Value::Date(v) => (api.create_date)(v.days),
                Value::Time(v) => (api.create_time)(v.micros),
                Value::Timestamp(v) => (api.create_timestamp)(v.micros),
                Value::TimestampTz(v) => (api.create_timestamp_tz)(v.micros),
                Value::Interval(v) => (api.create_interval)(*v),
                Value::Varchar(v) => (api.create_varchar_length)(v.as_ptr().cast(), v.len() as u64),
                Value::List(_) => return Err(Error::NotSupported { tag: TypeTag::List }),
            }
        };
        if raw.is_null() {
            return Err(Error::Allocation("value"));
        }
        Ok(Self { engine, raw })
    }

    pub fn logical_type(&self) -> LogicalTypeRef<'_> {
        let raw = unsafe { (self.engine.api().get_value_type)(self.raw) };
        unsafe { LogicalTypeRef::from_raw(self.engine, raw) }
    }

    pub fn type_tag(&self) -> TypeTag {
        self.logical_type().type_tag()
    }

    pub fn as_raw(&self) -> RawValue {
        self.raw
    }
}

impl std::fmt::Debug for Scalar<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Scalar").field(&self.type_tag()).finish()
    }
}

impl Drop for Scalar<'_> {
    fn drop(&mut self) {
        unsafe { (self.engine.api().destroy_value)(&mut self.raw) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_rendering() {
        let value = Value::List(vec![
            Value::Integer(1),
            Value::Null,
            Value::Varchar("a".into()),
            Value::Date(Date { days: 19000 }),
        ]);
        assert_eq!(value.to_json(), json!([1, null, "a", 19000]));

        let interval = Value::Interval(Interval {
            months: 1,
            days: 2,
            micros: 3,
        });
        assert_eq!(interval.to_json(), json!({"months": 1, "days": 2, "micros": 3}));
        assert_eq!(Value::Double(f64::NAN).to_json(), serde_json::Value::Null);
    }

    #[test]
    fn tags_follow_variants() {
        assert_eq!(Value::Null.type_tag(), TypeTag::SqlNull);
        assert_eq!(Value::from("x").type_tag(), TypeTag::Varchar);
        assert_eq!(Value::from(Some(3i64)).type_tag(), TypeTag::BigInt);
        assert_eq!(Value::from(None::<i32>), Value::Null);
    }

    #[cfg(feature = "memory")]
    #[test]
    fn scalar_reports_type_and_is_freed() {
        let engine = Engine::in_memory();
        let before = quiver_engine_memory::live_handles().values;
        {
            let scalar = Scalar::new(&engine, &Value::Varchar("hello".into())).unwrap();
            assert_eq!(scalar.type_tag(), TypeTag::Varchar);
            assert_eq!(quiver_engine_memory::live_handles().values, before + 1);
        }
        assert_eq!(quiver_engine_memory::live_handles().values, before);
        assert!(matches!(
            Scalar::new(&engine, &Value::List(vec![])),
            Err(Error::NotSupported { tag: TypeTag::List })
        ));
    }
}
