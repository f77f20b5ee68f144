use std::fmt;

use crate::layout::{Interval, ListEntry, StringElement};

/// Logical type id as reported by the engine.
///
/// The discriminants are the engine's numbering and cross the ABI as `u32`.
/// The set is closed: an id outside this enumeration maps to `Invalid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TypeTag {
    Invalid = 0,
    Boolean = 1,
    TinyInt = 2,
    SmallInt = 3,
    Integer = 4,
    BigInt = 5,
    UTinyInt = 6,
    USmallInt = 7,
    UInteger = 8,
    UBigInt = 9,
    Float = 10,
    Double = 11,
    Timestamp = 12,
    Date = 13,
    Time = 14,
    Interval = 15,
    HugeInt = 16,
    Varchar = 17,
    Blob = 18,
    Decimal = 19,
    TimestampS = 20,
    TimestampMs = 21,
    TimestampNs = 22,
    Enum = 23,
    List = 24,
    Struct = 25,
    Map = 26,
    Uuid = 27,
    Union = 28,
    Bit = 29,
    TimeTz = 30,
    TimestampTz = 31,
    UHugeInt = 32,
    Array = 33,
    Any = 34,
    Varint = 35,
    SqlNull = 36,
}

const ALL_TAGS: [TypeTag; 37] = [
    TypeTag::Invalid,
    TypeTag::Boolean,
    TypeTag::TinyInt,
    TypeTag::SmallInt,
    TypeTag::Integer,
    TypeTag::BigInt,
    TypeTag::UTinyInt,
    TypeTag::USmallInt,
    TypeTag::UInteger,
    TypeTag::UBigInt,
    TypeTag::Float,
    TypeTag::Double,
    TypeTag::Timestamp,
    TypeTag::Date,
    TypeTag::Time,
    TypeTag::Interval,
    TypeTag::HugeInt,
    TypeTag::Varchar,
    TypeTag::Blob,
    TypeTag::Decimal,
    TypeTag::TimestampS,
    TypeTag::TimestampMs,
    TypeTag::TimestampNs,
    TypeTag::Enum,
    TypeTag::List,
    TypeTag::Struct,
    TypeTag::Map,
    TypeTag::Uuid,
    TypeTag::Union,
    TypeTag::Bit,
    TypeTag::TimeTz,
    TypeTag::TimestampTz,
    TypeTag::UHugeInt,
    TypeTag::Array,
    TypeTag::Any,
    TypeTag::Varint,
    TypeTag::SqlNull,
];

impl TypeTag {
    /// Map a raw engine id. Unknown ids become `Invalid`.
    pub fn from_raw(id: u32) -> Self {
        ALL_TAGS
            .get(id as usize)
            .copied()
            .filter(|tag| tag.as_raw() == id)
            .unwrap_or(TypeTag::Invalid)
    }

    pub fn as_raw(self) -> u32 {
        self as u32
    }

    /// Engine (SQL) spelling of the type name.
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Invalid => "INVALID",
            TypeTag::Boolean => "BOOLEAN",
            TypeTag::TinyInt => "TINYINT",
            TypeTag::SmallInt => "SMALLINT",
            TypeTag::Integer => "INTEGER",
            TypeTag::BigInt => "BIGINT",
            TypeTag::UTinyInt => "UTINYINT",
            TypeTag::USmallInt => "USMALLINT",
            TypeTag::UInteger => "UINTEGER",
            TypeTag::UBigInt => "UBIGINT",
            TypeTag::Float => "FLOAT",
            TypeTag::Double => "DOUBLE",
            TypeTag::Timestamp => "TIMESTAMP",
            TypeTag::Date => "DATE",
            TypeTag::Time => "TIME",
            TypeTag::Interval => "INTERVAL",
            TypeTag::HugeInt => "HUGEINT",
            TypeTag::Varchar => "VARCHAR",
            TypeTag::Blob => "BLOB",
            TypeTag::Decimal => "DECIMAL",
            TypeTag::TimestampS => "TIMESTAMP_S",
            TypeTag::TimestampMs => "TIMESTAMP_MS",
            TypeTag::TimestampNs => "TIMESTAMP_NS",
            TypeTag::Enum => "ENUM",
            TypeTag::List => "LIST",
            TypeTag::Struct => "STRUCT",
            TypeTag::Map => "MAP",
            TypeTag::Uuid => "UUID",
            TypeTag::Union => "UNION",
            TypeTag::Bit => "BIT",
            TypeTag::TimeTz => "TIME WITH TIME ZONE",
            TypeTag::TimestampTz => "TIMESTAMP WITH TIME ZONE",
            TypeTag::UHugeInt => "UHUGEINT",
            TypeTag::Array => "ARRAY",
            TypeTag::Any => "ANY",
            TypeTag::Varint => "VARINT",
            TypeTag::SqlNull => "NULL",
        }
    }

    /// Reverse of [`TypeTag::name`].
    pub fn from_name(name: &str) -> Option<Self> {
        ALL_TAGS
            .iter()
            .copied()
            .find(|tag| tag.name().eq_ignore_ascii_case(name))
    }

    /// Tags whose logical type carries child types.
    pub fn is_nested(self) -> bool {
        matches!(
            self,
            TypeTag::List | TypeTag::Struct | TypeTag::Map | TypeTag::Array | TypeTag::Union
        )
    }

    /// Tags that need parameters the plain constructor cannot supply.
    pub fn is_parameterized(self) -> bool {
        self.is_nested() || matches!(self, TypeTag::Decimal | TypeTag::Enum)
    }

    /// Size in bytes of one element in a vector's data buffer.
    ///
    /// `None` for tags whose vectors keep no per-row data (struct, array)
    /// and for tags whose width depends on parameters (decimal, enum).
    pub fn element_width(self) -> Option<usize> {
        let width = match self {
            TypeTag::Boolean | TypeTag::TinyInt | TypeTag::UTinyInt | TypeTag::SqlNull => 1,
            TypeTag::SmallInt | TypeTag::USmallInt => 2,
            TypeTag::Integer | TypeTag::UInteger | TypeTag::Float | TypeTag::Date => 4,
            TypeTag::BigInt
            | TypeTag::UBigInt
            | TypeTag::Double
            | TypeTag::Timestamp
            | TypeTag::TimestampS
            | TypeTag::TimestampMs
            | TypeTag::TimestampNs
            | TypeTag::TimestampTz
            | TypeTag::Time
            | TypeTag::TimeTz => 8,
            TypeTag::Interval => size_of::<Interval>(),
            TypeTag::HugeInt | TypeTag::UHugeInt | TypeTag::Uuid => 16,
            TypeTag::Varchar | TypeTag::Blob | TypeTag::Bit | TypeTag::Varint => {
                size_of::<StringElement>()
            }
            TypeTag::List | TypeTag::Map => size_of::<ListEntry>(),
            TypeTag::Invalid
            | TypeTag::Any
            | TypeTag::Decimal
            | TypeTag::Enum
            | TypeTag::Struct
            | TypeTag::Union
            | TypeTag::Array => return None,
        };
        Some(width)
    }

    /// Tags whose elements are [`StringElement`] records.
    pub fn is_string_like(self) -> bool {
        matches!(
            self,
            TypeTag::Varchar | TypeTag::Blob | TypeTag::Bit | TypeTag::Varint
        )
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl serde::Serialize for TypeTag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> serde::Deserialize<'de> for TypeTag {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        TypeTag::from_name(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown type '{name}'")))
    }
}
