use std::ffi::{CStr, CString, c_char};

use quiver_abi::TypeTag;
use quiver_abi::ffi::RawLogicalType;

use crate::alloc::track;

/// Logical type tree.
///
/// Children are boxed so that a borrowed child handle stays put for as long
/// as the parent lives.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TypeNode {
    pub tag: TypeTag,
    /// list/array: `[element]`, map: `[key, value]`, struct/union: members.
    pub children: Vec<Box<TypeNode>>,
    /// Member names for struct/union.
    pub names: Vec<CString>,
    pub array_size: u64,
}

impl TypeNode {
    pub fn leaf(tag: TypeTag) -> Self {
        Self {
            tag,
            children: Vec::new(),
            names: Vec::new(),
            array_size: 0,
        }
    }

    pub fn list(child: TypeNode) -> Self {
        Self {
            children: vec![Box::new(child)],
            ..Self::leaf(TypeTag::List)
        }
    }

    pub fn array(child: TypeNode, size: u64) -> Self {
        Self {
            children: vec![Box::new(child)],
            array_size: size,
            ..Self::leaf(TypeTag::Array)
        }
    }

    pub fn map(key: TypeNode, value: TypeNode) -> Self {
        Self {
            children: vec![Box::new(key), Box::new(value)],
            ..Self::leaf(TypeTag::Map)
        }
    }

    pub fn structure(members: Vec<(CString, TypeNode)>) -> Self {
        let (names, children) = members
            .into_iter()
            .map(|(name, ty)| (name, Box::new(ty)))
            .unzip();
        Self {
            children,
            names,
            ..Self::leaf(TypeTag::Struct)
        }
    }

    /// Vector layout of a map: a list of `{key, value}` structs.
    pub fn map_entry_struct(&self) -> TypeNode {
        let members = self
            .children
            .iter()
            .zip([c"key", c"value"])
            .map(|(ty, name)| (name.to_owned(), (**ty).clone()))
            .collect();
        TypeNode::structure(members)
    }

    pub fn child(&self, index: usize) -> Option<&TypeNode> {
        self.children.get(index).map(|child| &**child)
    }

    pub fn into_handle(self) -> RawLogicalType {
        track(|live| live.types += 1);
        Box::into_raw(Box::new(self)).cast()
    }

    /// # Safety
    ///
    /// `raw` must be null or a handle produced by this engine.
    pub unsafe fn from_handle<'a>(raw: RawLogicalType) -> Option<&'a TypeNode> {
        unsafe { raw.cast::<TypeNode>().as_ref() }
    }

    pub fn as_borrowed_handle(&self) -> RawLogicalType {
        (self as *const TypeNode).cast_mut().cast()
    }
}

/// # Safety
///
/// `ty` must be null or a handle produced by this engine.
unsafe fn borrowed_child(ty: RawLogicalType, tag: TypeTag, index: usize) -> RawLogicalType {
    match unsafe { TypeNode::from_handle(ty) } {
        Some(node) if node.tag == tag => node
            .child(index)
            .map_or(std::ptr::null_mut(), TypeNode::as_borrowed_handle),
        _ => std::ptr::null_mut(),
    }
}

// ═══════════════════════════════════════════════════════════════
//  ABI entry points
// ═══════════════════════════════════════════════════════════════

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_create_logical_type(type_id: u32) -> RawLogicalType {
    let tag = TypeTag::from_raw(type_id);
    let tag = if tag.is_parameterized() { TypeTag::Invalid } else { tag };
    TypeNode::leaf(tag).into_handle()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_create_list_type(child: RawLogicalType) -> RawLogicalType {
    match unsafe { TypeNode::from_handle(child) } {
        Some(child) => TypeNode::list(child.clone()).into_handle(),
        None => std::ptr::null_mut(),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_create_array_type(child: RawLogicalType, size: u64) -> RawLogicalType {
    match unsafe { TypeNode::from_handle(child) } {
        Some(child) => TypeNode::array(child.clone(), size).into_handle(),
        None => std::ptr::null_mut(),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_create_map_type(
    key: RawLogicalType,
    value: RawLogicalType,
) -> RawLogicalType {
    match unsafe { (TypeNode::from_handle(key), TypeNode::from_handle(value)) } {
        (Some(key), Some(value)) => TypeNode::map(key.clone(), value.clone()).into_handle(),
        _ => std::ptr::null_mut(),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_create_struct_type(
    members: *const RawLogicalType,
    names: *const *const c_char,
    count: u64,
) -> RawLogicalType {
    if count > 0 && (members.is_null() || names.is_null()) {
        return std::ptr::null_mut();
    }
    let mut fields = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let (ty, name) = unsafe { (*members.add(i), *names.add(i)) };
        let Some(ty) = (unsafe { TypeNode::from_handle(ty) }) else {
            return std::ptr::null_mut();
        };
        if name.is_null() {
            return std::ptr::null_mut();
        }
        let name = unsafe { CStr::from_ptr(name) }.to_owned();
        fields.push((name, ty.clone()));
    }
    TypeNode::structure(fields).into_handle()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_destroy_logical_type(ty: *mut RawLogicalType) {
    if ty.is_null() {
        return;
    }
    unsafe {
        let raw = *ty;
        if !raw.is_null() {
            drop(Box::from_raw(raw.cast::<TypeNode>()));
            track(|live| live.types -= 1);
        }
        *ty = std::ptr::null_mut();
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_get_type_id(ty: RawLogicalType) -> u32 {
    unsafe { TypeNode::from_handle(ty) }.map_or(TypeTag::Invalid, |node| node.tag).as_raw()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_list_type_child_type(ty: RawLogicalType) -> RawLogicalType {
    unsafe { borrowed_child(ty, TypeTag::List, 0) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_array_type_child_type(ty: RawLogicalType) -> RawLogicalType {
    unsafe { borrowed_child(ty, TypeTag::Array, 0) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_array_type_array_size(ty: RawLogicalType) -> u64 {
    match unsafe { TypeNode::from_handle(ty) } {
        Some(node) if node.tag == TypeTag::Array => node.array_size,
        _ => 0,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_map_type_key_type(ty: RawLogicalType) -> RawLogicalType {
    unsafe { borrowed_child(ty, TypeTag::Map, 0) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_map_type_value_type(ty: RawLogicalType) -> RawLogicalType {
    unsafe { borrowed_child(ty, TypeTag::Map, 1) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_struct_type_child_count(ty: RawLogicalType) -> u64 {
    match unsafe { TypeNode::from_handle(ty) } {
        Some(node) if matches!(node.tag, TypeTag::Struct | TypeTag::Union) => {
            node.children.len() as u64
        }
        _ => 0,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_struct_type_child_type(ty: RawLogicalType, index: u64) -> RawLogicalType {
    match unsafe { TypeNode::from_handle(ty) } {
        Some(node) if matches!(node.tag, TypeTag::Struct | TypeTag::Union) => node
            .child(index as usize)
            .map_or(std::ptr::null_mut(), TypeNode::as_borrowed_handle),
        _ => std::ptr::null_mut(),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_struct_type_child_name(ty: RawLogicalType, index: u64) -> *const c_char {
    match unsafe { TypeNode::from_handle(ty) } {
        Some(node) => node
            .names
            .get(index as usize)
            .map_or(std::ptr::null(), |name| name.as_ptr()),
        None => std::ptr::null(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameterized_tags_become_invalid() {
        unsafe {
            let mut ty = qv_create_logical_type(TypeTag::Decimal.as_raw());
            assert_eq!(qv_get_type_id(ty), TypeTag::Invalid.as_raw());
            qv_destroy_logical_type(&mut ty);
            assert!(ty.is_null());
        }
    }

    #[test]
    fn list_child_is_borrowed_from_parent() {
        unsafe {
            let before = crate::live_handles().types;
            let mut int = qv_create_logical_type(TypeTag::Integer.as_raw());
            let mut list = qv_create_list_type(int);
            qv_destroy_logical_type(&mut int);

            let child = qv_list_type_child_type(list);
            assert_eq!(qv_get_type_id(child), TypeTag::Integer.as_raw());
            assert!(qv_array_type_child_type(list).is_null());

            qv_destroy_logical_type(&mut list);
            assert_eq!(crate::live_handles().types, before);
        }
    }

    #[test]
    fn struct_members_keep_names() {
        unsafe {
            let mut a = qv_create_logical_type(TypeTag::BigInt.as_raw());
            let mut b = qv_create_logical_type(TypeTag::Varchar.as_raw());
            let names = [c"id".as_ptr(), c"name".as_ptr()];
            let mut st = qv_create_struct_type([a, b].as_ptr(), names.as_ptr(), 2);
            assert_eq!(qv_struct_type_child_count(st), 2);
            let name = CStr::from_ptr(qv_struct_type_child_name(st, 1));
            assert_eq!(name, c"name");
            assert_eq!(
                qv_get_type_id(qv_struct_type_child_type(st, 0)),
                TypeTag::BigInt.as_raw()
            );
            qv_destroy_logical_type(&mut a);
            qv_destroy_logical_type(&mut b);
            qv_destroy_logical_type(&mut st);
        }
    }
}
