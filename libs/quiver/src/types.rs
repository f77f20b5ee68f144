//! Logical type descriptors.
//!
//! [`LogicalType`] owns its engine handle and destroys it on drop.
//! [`LogicalTypeRef`] aliases a handle owned by a vector, value or result and
//! is bounded by that owner's lifetime. Both expose the same read interface
//! through [`TypeHandle`].

use std::ffi::{CStr, CString, c_char};
use std::fmt;
use std::marker::PhantomData;

use quiver_abi::TypeTag;
use quiver_abi::ffi::RawLogicalType;

use crate::engine::Engine;
use crate::error::{Error, Result};

// ═══════════════════════════════════════════════════════════════
//  TypeHandle
// ═══════════════════════════════════════════════════════════════

/// Read access shared by owned and borrowed type descriptors.
///
/// `'e` is the lifetime of the engine reference the descriptor carries.
pub trait TypeHandle<'e> {
    fn engine(&self) -> &'e Engine;

    fn as_raw(&self) -> RawLogicalType;

    fn type_tag(&self) -> TypeTag {
        let id = unsafe { (self.engine().api().get_type_id)(self.as_raw()) };
        TypeTag::from_raw(id)
    }

    /// Element type of a list or array.
    fn child_type<'s>(&'s self) -> Result<LogicalTypeRef<'s>>
    where
        'e: 's,
    {
        let api = self.engine().api();
        let raw = match self.type_tag() {
            TypeTag::List => unsafe { (api.list_type_child_type)(self.as_raw()) },
            TypeTag::Array => unsafe { (api.array_type_child_type)(self.as_raw()) },
            actual => {
                return Err(Error::TypeMismatch {
                    expected: TypeTag::List,
                    actual,
                });
            }
        };
        borrowed(self.engine(), raw, "child type")
    }

    fn key_type<'s>(&'s self) -> Result<LogicalTypeRef<'s>>
    where
        'e: 's,
    {
        expect_tag(self.type_tag(), TypeTag::Map)?;
        let raw = unsafe { (self.engine().api().map_type_key_type)(self.as_raw()) };
        borrowed(self.engine(), raw, "map key type")
    }

    fn value_type<'s>(&'s self) -> Result<LogicalTypeRef<'s>>
    where
        'e: 's,
    {
        expect_tag(self.type_tag(), TypeTag::Map)?;
        let raw = unsafe { (self.engine().api().map_type_value_type)(self.as_raw()) };
        borrowed(self.engine(), raw, "map value type")
    }

    fn array_size(&self) -> Result<usize> {
        expect_tag(self.type_tag(), TypeTag::Array)?;
        Ok(unsafe { (self.engine().api().array_type_array_size)(self.as_raw()) } as usize)
    }

    /// Member count of a struct or union.
    fn struct_child_count(&self) -> Result<usize> {
        expect_struct(self.type_tag())?;
        Ok(unsafe { (self.engine().api().struct_type_child_count)(self.as_raw()) } as usize)
    }

    fn struct_child_type<'s>(&'s self, index: usize) -> Result<LogicalTypeRef<'s>>
    where
        'e: 's,
    {
        let count = self.struct_child_count()?;
        if index >= count {
            return Err(Error::out_of_bounds("struct member", index, count));
        }
        let raw = unsafe { (self.engine().api().struct_type_child_type)(self.as_raw(), index as u64) };
        borrowed(self.engine(), raw, "struct member type")
    }

    fn struct_child_name(&self, index: usize) -> Result<String> {
        let count = self.struct_child_count()?;
        if index >= count {
            return Err(Error::out_of_bounds("struct member", index, count));
        }
        let name = unsafe { (self.engine().api().struct_type_child_name)(self.as_raw(), index as u64) };
        if name.is_null() {
            return Err(Error::Engine(format!("struct member {index} has no name")));
        }
        Ok(unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned())
    }

    /// Rebuild this type as a new owned descriptor.
    ///
    /// Nested types are recreated level by level; handles are never shared.
    fn to_owned_type(&self) -> Result<LogicalType<'e>> {
        let view = unsafe { LogicalTypeRef::from_raw(self.engine(), self.as_raw()) };
        rebuild(self.engine(), view)
    }
}

fn rebuild<'e>(engine: &'e Engine, ty: LogicalTypeRef<'_>) -> Result<LogicalType<'e>> {
    match ty.type_tag() {
        TypeTag::List => LogicalType::list(&rebuild(engine, ty.child_type()?)?),
        TypeTag::Array => LogicalType::array(&rebuild(engine, ty.child_type()?)?, ty.array_size()?),
        TypeTag::Map => {
            let key = rebuild(engine, ty.key_type()?)?;
            let value = rebuild(engine, ty.value_type()?)?;
            LogicalType::map(&key, &value)
        }
        TypeTag::Struct => {
            let mut members = Vec::new();
            for i in 0..ty.struct_child_count()? {
                members.push((ty.struct_child_name(i)?, rebuild(engine, ty.struct_child_type(i)?)?));
            }
            let refs: Vec<(&str, &LogicalType<'e>)> =
                members.iter().map(|(name, ty)| (name.as_str(), ty)).collect();
            LogicalType::structure(engine, &refs)
        }
        TypeTag::Union => Err(Error::NotSupported { tag: TypeTag::Union }),
        tag => LogicalType::new(engine, tag),
    }
}

fn expect_tag(actual: TypeTag, expected: TypeTag) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(Error::TypeMismatch { expected, actual })
    }
}

fn expect_struct(actual: TypeTag) -> Result<()> {
    match actual {
        TypeTag::Struct | TypeTag::Union => Ok(()),
        actual => Err(Error::TypeMismatch {
            expected: TypeTag::Struct,
            actual,
        }),
    }
}

fn borrowed<'a>(engine: &'a Engine, raw: RawLogicalType, what: &'static str) -> Result<LogicalTypeRef<'a>> {
    if raw.is_null() {
        return Err(Error::Engine(format!("engine returned no {what}")));
    }
    Ok(unsafe { LogicalTypeRef::from_raw(engine, raw) })
}

/// Structural equality.
///
/// Tags must match; list, map and array children must match recursively and
/// arrays also compare their size. Struct and union members are not compared.
pub fn types_equal<'a, 'b>(a: &impl TypeHandle<'a>, b: &impl TypeHandle<'b>) -> bool {
    let tag = a.type_tag();
    if tag != b.type_tag() {
        return false;
    }
    match tag {
        TypeTag::List => match (a.child_type(), b.child_type()) {
            (Ok(x), Ok(y)) => types_equal(&x, &y),
            _ => false,
        },
        TypeTag::Array => {
            let sizes = a.array_size().ok() == b.array_size().ok();
            sizes
                && match (a.child_type(), b.child_type()) {
                    (Ok(x), Ok(y)) => types_equal(&x, &y),
                    _ => false,
                }
        }
        TypeTag::Map => match (a.key_type(), b.key_type(), a.value_type(), b.value_type()) {
            (Ok(ak), Ok(bk), Ok(av), Ok(bv)) => types_equal(&ak, &bk) && types_equal(&av, &bv),
            _ => false,
        },
        _ => true,
    }
}

fn fmt_type<'e>(ty: &impl TypeHandle<'e>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let tag = ty.type_tag();
    match tag {
        TypeTag::List => match ty.child_type() {
            Ok(child) => {
                fmt_type(&child, f)?;
                f.write_str("[]")
            }
            Err(_) => f.write_str("LIST"),
        },
        TypeTag::Array => match (ty.child_type(), ty.array_size()) {
            (Ok(child), Ok(size)) => {
                fmt_type(&child, f)?;
                write!(f, "[{size}]")
            }
            _ => f.write_str("ARRAY"),
        },
        TypeTag::Map => match (ty.key_type(), ty.value_type()) {
            (Ok(key), Ok(value)) => {
                f.write_str("MAP(")?;
                fmt_type(&key, f)?;
                f.write_str(", ")?;
                fmt_type(&value, f)?;
                f.write_str(")")
            }
            _ => f.write_str("MAP"),
        },
        TypeTag::Struct | TypeTag::Union => {
            let Ok(count) = ty.struct_child_count() else {
                return f.write_str(tag.name());
            };
            write!(f, "{}(", tag.name())?;
            for i in 0..count {
                if i > 0 {
                    f.write_str(", ")?;
                }
                let name = ty.struct_child_name(i).unwrap_or_default();
                write!(f, "{name} ")?;
                match ty.struct_child_type(i) {
                    Ok(member) => fmt_type(&member, f)?,
                    Err(_) => f.write_str("?")?,
                }
            }
            f.write_str(")")
        }
        tag => f.write_str(tag.name()),
    }
}

// ═══════════════════════════════════════════════════════════════
//  LogicalType (owned)
// ═══════════════════════════════════════════════════════════════

/// Owned logical type; the engine handle is destroyed on drop.
pub struct LogicalType<'e> {
    engine: &'e Engine,
    raw: RawLogicalType,
}

impl<'e> LogicalType<'e> {
    /// Plain type for a primitive tag. Nested and parameterized tags need
    /// their own constructors and yield `NotSupported` here.
    pub fn new(engine: &'e Engine, tag: TypeTag) -> Result<Self> {
        if tag.is_parameterized() || tag == TypeTag::Invalid {
            return Err(Error::NotSupported { tag });
        }
        let raw = unsafe { (engine.api().create_logical_type)(tag.as_raw()) };
        Self::wrap(engine, raw)
    }

    pub fn list(child: &impl TypeHandle<'e>) -> Result<Self> {
        let engine = child.engine();
        let raw = unsafe { (engine.api().create_list_type)(child.as_raw()) };
        Self::wrap(engine, raw)
    }

    pub fn array(child: &impl TypeHandle<'e>, size: usize) -> Result<Self> {
        let engine = child.engine();
        let raw = unsafe { (engine.api().create_array_type)(child.as_raw(), size as u64) };
        Self::wrap(engine, raw)
    }

    pub fn map(key: &impl TypeHandle<'e>, value: &impl TypeHandle<'e>) -> Result<Self> {
        let engine = key.engine();
        let raw = unsafe { (engine.api().create_map_type)(key.as_raw(), value.as_raw()) };
        Self::wrap(engine, raw)
    }

    pub fn structure<T: TypeHandle<'e>>(engine: &'e Engine, members: &[(&str, &T)]) -> Result<Self> {
        let names = members
            .iter()
            .map(|(name, _)| {
                CString::new(*name)
                    .map_err(|_| Error::Engine(format!("struct member name '{name}' contains NUL")))
            })
            .collect::<Result<Vec<_>>>()?;
        let name_ptrs: Vec<*const c_char> = names.iter().map(|name| name.as_ptr()).collect();
        let types: Vec<RawLogicalType> = members.iter().map(|(_, ty)| ty.as_raw()).collect();
        let raw = unsafe {
            (engine.api().create_struct_type)(types.as_ptr(), name_ptrs.as_ptr(), members.len() as u64)
        };
        Self::wrap(engine, raw)
    }

    /// Take ownership of a handle created by `engine`.
    ///
    /// # Safety
    ///
    /// `raw` must be an owned, not yet destroyed logical type of `engine`.
    pub unsafe fn from_raw(engine: &'e Engine, raw: RawLogicalType) -> Self {
        Self { engine, raw }
    }

    fn wrap(engine: &'e Engine, raw: RawLogicalType) -> Result<Self> {
        if raw.is_null() {
            return Err(Error::Allocation("logical type"));
        }
        Ok(Self { engine, raw })
    }

    /// Independent copy with its own native handle.
    pub fn try_clone(&self) -> Result<Self> {
        self.to_owned_type()
    }

    pub fn as_borrowed(&self) -> LogicalTypeRef<'_> {
        unsafe { LogicalTypeRef::from_raw(self.engine, self.raw) }
    }
}

impl<'e> TypeHandle<'e> for LogicalType<'e> {
    fn engine(&self) -> &'e Engine {
        self.engine
    }

    fn as_raw(&self) -> RawLogicalType {
        self.raw
    }
}

impl Drop for LogicalType<'_> {
    fn drop(&mut self) {
        unsafe { (self.engine.api().destroy_logical_type)(&mut self.raw) };
    }
}

// ═══════════════════════════════════════════════════════════════
//  LogicalTypeRef (borrowed)
// ═══════════════════════════════════════════════════════════════

/// Borrowed logical type. Never destroyed through this handle.
#[derive(Clone, Copy)]
pub struct LogicalTypeRef<'a> {
    engine: &'a Engine,
    raw: RawLogicalType,
    _owner: PhantomData<&'a ()>,
}

impl<'a> LogicalTypeRef<'a> {
    /// # Safety
    ///
    /// `raw` must be a live handle that stays valid for `'a`.
    pub unsafe fn from_raw(engine: &'a Engine, raw: RawLogicalType) -> Self {
        Self {
            engine,
            raw,
            _owner: PhantomData,
        }
    }
}

impl<'a> TypeHandle<'a> for LogicalTypeRef<'a> {
    fn engine(&self) -> &'a Engine {
        self.engine
    }

    fn as_raw(&self) -> RawLogicalType {
        self.raw
    }
}

// ═══════════════════════════════════════════════════════════════
//  Equality & formatting
// ═══════════════════════════════════════════════════════════════

macro_rules! type_traits {
    ($($ty:ident),*) => {
        $(
            impl fmt::Display for $ty<'_> {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    fmt_type(self, f)
                }
            }

            impl fmt::Debug for $ty<'_> {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}({self})", stringify!($ty))
                }
            }

            impl PartialEq<LogicalType<'_>> for $ty<'_> {
                fn eq(&self, other: &LogicalType<'_>) -> bool {
                    types_equal(self, other)
                }
            }

            impl PartialEq<LogicalTypeRef<'_>> for $ty<'_> {
                fn eq(&self, other: &LogicalTypeRef<'_>) -> bool {
                    types_equal(self, other)
                }
            }
        )*
    };
}

type_traits!(LogicalType, LogicalTypeRef);

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;

    #[test]
    fn primitive_type_reports_tag() {
        let engine = Engine::in_memory();
        let ty = LogicalType::new(&engine, TypeTag::BigInt).unwrap();
        assert_eq!(ty.type_tag(), TypeTag::BigInt);
        assert_eq!(ty.to_string(), "BIGINT");
    }

    #[test]
    fn nested_tags_need_constructors() {
        let engine = Engine::in_memory();
        for tag in [TypeTag::List, TypeTag::Struct, TypeTag::Decimal, TypeTag::Invalid] {
            assert!(matches!(
                LogicalType::new(&engine, tag),
                Err(Error::NotSupported { tag: t }) if t == tag
            ));
        }
    }

    #[test]
    fn drop_releases_handle_once() {
        let engine = Engine::in_memory();
        let before = quiver_engine_memory::live_handles().types;
        {
            let int = LogicalType::new(&engine, TypeTag::Integer).unwrap();
            let list = LogicalType::list(&int).unwrap();
            let _child = list.child_type().unwrap();
            assert_eq!(quiver_engine_memory::live_handles().types, before + 2);
        }
        assert_eq!(quiver_engine_memory::live_handles().types, before);
    }

    #[test]
    fn structural_equality() {
        let engine = Engine::in_memory();
        let int = LogicalType::new(&engine, TypeTag::Integer).unwrap();
        let big = LogicalType::new(&engine, TypeTag::BigInt).unwrap();
        let a = LogicalType::list(&int).unwrap();
        let b = LogicalType::list(&int).unwrap();
        let c = LogicalType::list(&big).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.child_type().unwrap(), int);

        let arr3 = LogicalType::array(&int, 3).unwrap();
        let arr4 = LogicalType::array(&int, 4).unwrap();
        assert_ne!(arr3, arr4);
    }

    #[test]
    fn struct_equality_compares_tags_only() {
        let engine = Engine::in_memory();
        let int = LogicalType::new(&engine, TypeTag::Integer).unwrap();
        let text = LogicalType::new(&engine, TypeTag::Varchar).unwrap();
        let a = LogicalType::structure(&engine, &[("a", &int)]).unwrap();
        let b = LogicalType::structure(&engine, &[("b", &text), ("c", &int)]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn try_clone_rebuilds_nested_types() {
        let engine = Engine::in_memory();
        let before = quiver_engine_memory::live_handles().types;
        let key = LogicalType::new(&engine, TypeTag::Varchar).unwrap();
        let value = LogicalType::new(&engine, TypeTag::BigInt).unwrap();
        let map = LogicalType::map(&key, &value).unwrap();
        let copy = map.try_clone().unwrap();
        assert_ne!(copy.as_raw(), map.as_raw());
        assert_eq!(copy, map);
        assert_eq!(copy.to_string(), "MAP(VARCHAR, BIGINT)");
        drop((key, value, map, copy));
        assert_eq!(quiver_engine_memory::live_handles().types, before);
    }

    #[test]
    fn display_nested() {
        let engine = Engine::in_memory();
        let int = LogicalType::new(&engine, TypeTag::Integer).unwrap();
        let arr = LogicalType::array(&int, 3).unwrap();
        let list = LogicalType::list(&arr).unwrap();
        assert_eq!(list.to_string(), "INTEGER[3][]");
        let st = LogicalType::structure(&engine, &[("id", &int), ("tags", &list)]).unwrap();
        assert_eq!(st.to_string(), "STRUCT(id INTEGER, tags INTEGER[3][])");
        assert_eq!(st.struct_child_name(1).unwrap(), "tags");
        assert!(matches!(
            st.struct_child_type(2),
            Err(Error::OutOfBounds { index: 2, len: 2, .. })
        ));
    }

    #[test]
    fn wrong_kind_accessors_mismatch() {
        let engine = Engine::in_memory();
        let int = LogicalType::new(&engine, TypeTag::Integer).unwrap();
        assert!(matches!(
            int.child_type(),
            Err(Error::TypeMismatch { expected: TypeTag::List, actual: TypeTag::Integer })
        ));
        assert!(int.key_type().is_err());
        assert!(int.array_size().is_err());
    }
}
