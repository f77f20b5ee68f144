use std::cell::RefCell;
use std::ffi::{c_char, c_void};
use std::rc::Rc;

use quiver_abi::TypeTag;
use quiver_abi::ffi::{
    QV_ERROR, QV_SUCCESS, RawLogicalType, RawSelection, RawValue, RawVector, State,
};
use quiver_abi::layout::{
    INLINE_STRING_LEN, ListEntry, StringElement, VALIDITY_WORD_BITS, validity_word_count,
};

use crate::alloc::{Buffer, track};
use crate::types::TypeNode;
use crate::value::ValueNode;

// ═══════════════════════════════════════════════════════════════
//  Cell: engine-neutral copy of one row
// ═══════════════════════════════════════════════════════════════

/// Detached copy of one row, used to move rows between vectors (slice,
/// copy_sel, value references) without holding two storage borrows at once.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Cell {
    Null,
    /// Raw element bytes of a fixed-width type.
    Fixed(Vec<u8>),
    /// String-like payload.
    Bytes(Vec<u8>),
    List(Vec<Cell>),
    Struct(Vec<Cell>),
    Array(Vec<Cell>),
}

// ═══════════════════════════════════════════════════════════════
//  Storage
// ═══════════════════════════════════════════════════════════════

/// Backing memory of a vector. Shared between aliases through `Rc`; the
/// buffers are released when the last alias lets go.
pub(crate) struct Storage {
    capacity: usize,
    width: usize,
    data: Buffer,
    validity: Option<Buffer>,
    /// Out-of-line bytes of long strings. Boxed slices never move.
    heap: Vec<Box<[u8]>>,
    list_size: usize,
    children: Vec<Box<VectorNode>>,
}

impl Storage {
    fn new(ty: &TypeNode, capacity: usize) -> Self {
        let width = ty.tag.element_width().unwrap_or(0);
        let element = |index: usize| {
            ty.child(index)
                .cloned()
                .unwrap_or_else(|| TypeNode::leaf(TypeTag::Invalid))
        };
        let children = match ty.tag {
            TypeTag::List => vec![VectorNode::new(element(0), 0)],
            TypeTag::Map => vec![VectorNode::new(ty.map_entry_struct(), 0)],
            TypeTag::Struct | TypeTag::Union => ty
                .children
                .iter()
                .map(|member| VectorNode::new((**member).clone(), capacity))
                .collect(),
            TypeTag::Array => {
                let size = ty.array_size as usize;
                vec![VectorNode::new(element(0), capacity * size)]
            }
            _ => Vec::new(),
        };
        Self {
            capacity,
            width,
            data: Buffer::zeroed(capacity * width),
            validity: None,
            heap: Vec::new(),
            list_size: 0,
            children,
        }
    }

    fn is_valid(&self, row: usize) -> bool {
        match &self.validity {
            None => true,
            Some(words) => {
                let word = unsafe { words.as_ptr().cast::<u64>().add(row / VALIDITY_WORD_BITS).read() };
                word & (1u64 << (row % VALIDITY_WORD_BITS)) != 0
            }
        }
    }

    fn ensure_validity(&mut self) -> *mut u64 {
        let words = validity_word_count(self.capacity);
        self.validity
            .get_or_insert_with(|| Buffer::filled(words * size_of::<u64>(), 0xFF))
            .as_ptr()
            .cast()
    }

    fn element<T: Copy>(&self, row: usize) -> T {
        debug_assert!(row < self.capacity && size_of::<T>() == self.width);
        unsafe { self.data.as_ptr().cast::<T>().add(row).read() }
    }

    fn set_element<T: Copy>(&mut self, row: usize, value: T) {
        debug_assert!(row < self.capacity && size_of::<T>() == self.width);
        unsafe { self.data.as_ptr().cast::<T>().add(row).write(value) }
    }
}

// ═══════════════════════════════════════════════════════════════
//  VectorNode
// ═══════════════════════════════════════════════════════════════

pub(crate) struct VectorNode {
    ty: TypeNode,
    storage: Rc<RefCell<Storage>>,
}

impl VectorNode {
    pub fn new(ty: TypeNode, capacity: usize) -> Box<Self> {
        let storage = Storage::new(&ty, capacity);
        Box::new(Self {
            ty,
            storage: Rc::new(RefCell::new(storage)),
        })
    }

    /// # Safety
    ///
    /// `raw` must be null or a live vector handle of this engine.
    pub unsafe fn from_handle<'a>(raw: RawVector) -> Option<&'a mut VectorNode> {
        unsafe { raw.cast::<VectorNode>().as_mut() }
    }

    pub fn as_borrowed_handle(&self) -> RawVector {
        (self as *const VectorNode).cast_mut().cast()
    }

    pub fn logical_type(&self) -> &TypeNode {
        &self.ty
    }

    pub fn capacity(&self) -> usize {
        self.storage.borrow().capacity
    }

    /// Replace storage with a fresh allocation of the same type and capacity.
    /// Aliases keep the old storage.
    pub fn reset(&mut self) {
        let capacity = self.capacity();
        self.storage = Rc::new(RefCell::new(Storage::new(&self.ty, capacity)));
    }

    fn child(&self, index: usize) -> Option<&VectorNode> {
        let storage = self.storage.borrow();
        let child: *const VectorNode = &**storage.children.get(index)?;
        drop(storage);
        // Children are boxed inside the storage this node keeps alive, and
        // are only swapped out together with the whole storage.
        Some(unsafe { &*child })
    }

    fn array_size(&self) -> usize {
        self.ty.array_size as usize
    }

    fn set_valid(&self, row: usize, valid: bool) {
        let mut storage = self.storage.borrow_mut();
        if row >= storage.capacity {
            return;
        }
        if valid && storage.validity.is_none() {
            return;
        }
        let words = storage.ensure_validity();
        let mask = 1u64 << (row % VALIDITY_WORD_BITS);
        unsafe {
            let word = words.add(row / VALIDITY_WORD_BITS);
            if valid {
                *word |= mask;
            } else {
                *word &= !mask;
            }
        }
    }

    fn list_size(&self) -> usize {
        self.storage.borrow().list_size
    }

    /// Grow to hold at least `capacity` rows. Existing rows are preserved and
    /// new rows start out valid.
    fn reserve(&self, capacity: usize) {
        let mut storage = self.storage.borrow_mut();
        if capacity <= storage.capacity {
            return;
        }
        let capacity = capacity.next_power_of_two();
        storage.data = storage.data.resized(capacity * storage.width, 0);
        if let Some(words) = &storage.validity {
            let grown = words.resized(validity_word_count(capacity) * size_of::<u64>(), 0xFF);
            storage.validity = Some(grown);
        }
        storage.capacity = capacity;
        drop(storage);

        match self.ty.tag {
            TypeTag::Struct | TypeTag::Union => {
                let count = self.storage.borrow().children.len();
                for index in 0..count {
                    if let Some(child) = self.child(index) {
                        child.reserve(capacity);
                    }
                }
            }
            TypeTag::Array => {
                if let Some(child) = self.child(0) {
                    child.reserve(capacity * self.array_size());
                }
            }
            _ => {}
        }
    }

    fn list_reserve(&self, capacity: usize) -> bool {
        match self.child(0) {
            Some(child) if matches!(self.ty.tag, TypeTag::List | TypeTag::Map) => {
                child.reserve(capacity);
                true
            }
            _ => false,
        }
    }

    fn list_set_size(&self, size: usize) -> bool {
        let Some(child) = self.child(0) else {
            return false;
        };
        if size > child.capacity() {
            return false;
        }
        self.storage.borrow_mut().list_size = size;
        true
    }

    fn assign_string(&self, row: usize, bytes: &[u8]) {
        let mut storage = self.storage.borrow_mut();
        if row >= storage.capacity || !self.ty.tag.is_string_like() {
            return;
        }
        let element = if bytes.len() <= INLINE_STRING_LEN {
            StringElement::inlined(bytes)
        } else {
            let owned: Box<[u8]> = bytes.into();
            let element = StringElement::pointing_to(&owned);
            storage.heap.push(owned);
            Some(element)
        };
        if let Some(element) = element {
            storage.set_element(row, element);
        }
    }

    pub fn read_cell(&self, row: usize) -> Cell {
        let storage = self.storage.borrow();
        if row >= storage.capacity || !storage.is_valid(row) {
            return Cell::Null;
        }
        let tag = self.ty.tag;
        if tag.is_string_like() {
            let element = storage.element::<StringElement>(row);
            return Cell::Bytes(unsafe { element.as_bytes() }.to_vec());
        }
        match tag {
            TypeTag::List | TypeTag::Map => {
                let entry = storage.element::<ListEntry>(row);
                drop(storage);
                let Some(child) = self.child(0) else {
                    return Cell::Null;
                };
                let items = (entry.offset..entry.end())
                    .map(|index| child.read_cell(index as usize))
                    .collect();
                Cell::List(items)
            }
            TypeTag::Struct | TypeTag::Union => {
                let count = storage.children.len();
                drop(storage);
                let fields = (0..count)
                    .filter_map(|index| self.child(index))
                    .map(|child| child.read_cell(row))
                    .collect();
                Cell::Struct(fields)
            }
            TypeTag::Array => {
                drop(storage);
                let size = self.array_size();
                let Some(child) = self.child(0) else {
                    return Cell::Null;
                };
                Cell::Array((0..size).map(|j| child.read_cell(row * size + j)).collect())
            }
            _ if storage.width > 0 => {
                let width = storage.width;
                Cell::Fixed(storage.data.as_slice()[row * width..(row + 1) * width].to_vec())
            }
            _ => Cell::Null,
        }
    }

    pub fn write_cell(&self, row: usize, cell: &Cell) {
        if row >= self.capacity() {
            return;
        }
        if let Cell::Null = cell {
            self.set_valid(row, false);
            if matches!(self.ty.tag, TypeTag::Struct | TypeTag::Union) {
                let count = self.storage.borrow().children.len();
                for child in (0..count).filter_map(|index| self.child(index)) {
                    child.write_cell(row, &Cell::Null);
                }
            }
            return;
        }
        self.set_valid(row, true);

        match (self.ty.tag, cell) {
            (tag, Cell::Bytes(bytes)) if tag.is_string_like() => self.assign_string(row, bytes),
            (TypeTag::List | TypeTag::Map, Cell::List(items)) => {
                let start = self.list_size();
                let end = start + items.len();
                if !self.list_reserve(end) {
                    return;
                }
                if let Some(child) = self.child(0) {
                    for (offset, item) in items.iter().enumerate() {
                        child.write_cell(start + offset, item);
                    }
                }
                let mut storage = self.storage.borrow_mut();
                storage.list_size = end;
                storage.set_element(row, ListEntry::new(start as u64, items.len() as u64));
            }
            (TypeTag::Struct | TypeTag::Union, Cell::Struct(fields)) => {
                for (index, field) in fields.iter().enumerate() {
                    if let Some(child) = self.child(index) {
                        child.write_cell(row, field);
                    }
                }
            }
            (TypeTag::Array, Cell::Array(items)) => {
                let size = self.array_size();
                if let Some(child) = self.child(0) {
                    for (j, item) in items.iter().take(size).enumerate() {
                        child.write_cell(row * size + j, item);
                    }
                }
            }
            (_, Cell::Fixed(bytes)) => {
                let mut storage = self.storage.borrow_mut();
                let width = storage.width;
                if width == 0 {
                    return;
                }
                let n = bytes.len().min(width);
                storage.data.as_mut_slice()[row * width..row * width + n]
                    .copy_from_slice(&bytes[..n]);
            }
            // Shape does not fit the column; leave the row as NULL.
            _ => self.set_valid(row, false),
        }
    }

    /// Make this vector a flat gather of `selection` over its current rows.
    fn slice(&mut self, selection: &[u32]) {
        let cells: Vec<Cell> = selection
            .iter()
            .map(|&row| self.read_cell(row as usize))
            .collect();
        let capacity = self.capacity().max(cells.len());
        self.storage = Rc::new(RefCell::new(Storage::new(&self.ty, capacity)));
        for (row, cell) in cells.iter().enumerate() {
            self.write_cell(row, cell);
        }
    }

    /// Fill every row with `value`. The vector keeps its own type.
    fn reference_value(&mut self, value: &ValueNode) {
        let capacity = self.capacity();
        self.storage = Rc::new(RefCell::new(Storage::new(&self.ty, capacity)));
        for row in 0..capacity {
            self.write_cell(row, &value.cell);
        }
    }

    fn reference_vector(&mut self, other: &VectorNode) {
        self.ty = other.ty.clone();
        self.storage = Rc::clone(&other.storage);
    }
}

// ═══════════════════════════════════════════════════════════════
//  Selection vectors
// ═══════════════════════════════════════════════════════════════

pub(crate) struct SelectionNode {
    indices: Buffer,
    len: usize,
}

impl SelectionNode {
    /// # Safety
    ///
    /// `raw` must be null or a live selection handle of this engine.
    unsafe fn from_handle<'a>(raw: RawSelection) -> Option<&'a SelectionNode> {
        unsafe { raw.cast::<SelectionNode>().as_ref() }
    }

    fn indices(&self) -> &[u32] {
        unsafe { std::slice::from_raw_parts(self.indices.as_ptr().cast::<u32>(), self.len) }
    }
}

// ═══════════════════════════════════════════════════════════════
//  ABI entry points
// ═══════════════════════════════════════════════════════════════

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_create_vector(ty: RawLogicalType, capacity: u64) -> RawVector {
    match unsafe { TypeNode::from_handle(ty) } {
        Some(ty) => {
            track(|live| live.vectors += 1);
            Box::into_raw(VectorNode::new(ty.clone(), capacity as usize)).cast()
        }
        None => std::ptr::null_mut(),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_destroy_vector(vector: *mut RawVector) {
    if vector.is_null() {
        return;
    }
    unsafe {
        let raw = *vector;
        if !raw.is_null() {
            drop(Box::from_raw(raw.cast::<VectorNode>()));
            track(|live| live.vectors -= 1);
        }
        *vector = std::ptr::null_mut();
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_vector_get_column_type(vector: RawVector) -> RawLogicalType {
    unsafe { VectorNode::from_handle(vector) }
        .map_or(std::ptr::null_mut(), |node| node.ty.as_borrowed_handle())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_vector_get_data(vector: RawVector) -> *mut c_void {
    unsafe { VectorNode::from_handle(vector) }
        .map_or(std::ptr::null_mut(), |node| node.storage.borrow().data.as_ptr().cast())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_vector_get_validity(vector: RawVector) -> *mut u64 {
    unsafe { VectorNode::from_handle(vector) }.map_or(std::ptr::null_mut(), |node| {
        node.storage
            .borrow()
            .validity
            .as_ref()
            .map_or(std::ptr::null_mut(), |words| words.as_ptr().cast())
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_vector_ensure_validity_writable(vector: RawVector) {
    if let Some(node) = unsafe { VectorNode::from_handle(vector) } {
        node.storage.borrow_mut().ensure_validity();
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_vector_assign_string_element_len(
    vector: RawVector,
    index: u64,
    data: *const c_char,
    len: u64,
) {
    let Some(node) = (unsafe { VectorNode::from_handle(vector) }) else {
        return;
    };
    let bytes: &[u8] = if len == 0 {
        &[]
    } else if data.is_null() {
        return;
    } else {
        unsafe { std::slice::from_raw_parts(data.cast::<u8>(), len as usize) }
    };
    node.assign_string(index as usize, bytes);
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_list_vector_get_child(vector: RawVector) -> RawVector {
    match unsafe { VectorNode::from_handle(vector) } {
        Some(node) if matches!(node.ty.tag, TypeTag::List | TypeTag::Map) => node
            .child(0)
            .map_or(std::ptr::null_mut(), VectorNode::as_borrowed_handle),
        _ => std::ptr::null_mut(),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_list_vector_get_size(vector: RawVector) -> u64 {
    match unsafe { VectorNode::from_handle(vector) } {
        Some(node) if matches!(node.ty.tag, TypeTag::List | TypeTag::Map) => node.list_size() as u64,
        _ => 0,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_list_vector_set_size(vector: RawVector, size: u64) -> State {
    match unsafe { VectorNode::from_handle(vector) } {
        Some(node)
            if matches!(node.ty.tag, TypeTag::List | TypeTag::Map)
                && node.list_set_size(size as usize) =>
        {
            QV_SUCCESS
        }
        _ => QV_ERROR,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_list_vector_reserve(vector: RawVector, capacity: u64) -> State {
    match unsafe { VectorNode::from_handle(vector) } {
        Some(node) if node.list_reserve(capacity as usize) => QV_SUCCESS,
        _ => QV_ERROR,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_struct_vector_get_child(vector: RawVector, index: u64) -> RawVector {
    match unsafe { VectorNode::from_handle(vector) } {
        Some(node) if matches!(node.ty.tag, TypeTag::Struct | TypeTag::Union) => node
            .child(index as usize)
            .map_or(std::ptr::null_mut(), VectorNode::as_borrowed_handle),
        _ => std::ptr::null_mut(),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_array_vector_get_child(vector: RawVector) -> RawVector {
    match unsafe { VectorNode::from_handle(vector) } {
        Some(node) if node.ty.tag == TypeTag::Array => node
            .child(0)
            .map_or(std::ptr::null_mut(), VectorNode::as_borrowed_handle),
        _ => std::ptr::null_mut(),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_slice_vector(vector: RawVector, sel: RawSelection, len: u64) {
    let (Some(node), Some(sel)) = (unsafe { VectorNode::from_handle(vector) }, unsafe {
        SelectionNode::from_handle(sel)
    }) else {
        return;
    };
    let len = (len as usize).min(sel.len);
    node.slice(&sel.indices()[..len]);
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_vector_copy_sel(
    src: RawVector,
    dst: RawVector,
    sel: RawSelection,
    src_count: u64,
    src_offset: u64,
    dst_offset: u64,
) {
    let (Some(src), Some(sel)) = (unsafe { VectorNode::from_handle(src) }, unsafe {
        SelectionNode::from_handle(sel)
    }) else {
        return;
    };
    let end = (src_count as usize).min(sel.len);
    let start = (src_offset as usize).min(end);
    let cells: Vec<Cell> = sel.indices()[start..end]
        .iter()
        .map(|&row| src.read_cell(row as usize))
        .collect();
    let Some(dst) = (unsafe { VectorNode::from_handle(dst) }) else {
        return;
    };
    for (i, cell) in cells.iter().enumerate() {
        dst.write_cell(dst_offset as usize + i, cell);
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_vector_reference_value(vector: RawVector, value: RawValue) {
    let Some(value) = (unsafe { ValueNode::from_handle(value) }) else {
        return;
    };
    if let Some(node) = unsafe { VectorNode::from_handle(vector) } {
        node.reference_value(value);
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_vector_reference_vector(to: RawVector, from: RawVector) {
    if to == from {
        return;
    }
    let Some(from) = (unsafe { VectorNode::from_handle(from) }) else {
        return;
    };
    let from: &VectorNode = from;
    if let Some(to) = unsafe { VectorNode::from_handle(to) } {
        to.reference_vector(from);
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_create_selection_vector(size: u64) -> RawSelection {
    let len = size as usize;
    track(|live| live.selections += 1);
    let node = SelectionNode {
        indices: Buffer::zeroed(len * size_of::<u32>()),
        len,
    };
    Box::into_raw(Box::new(node)).cast()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_destroy_selection_vector(sel: RawSelection) {
    if sel.is_null() {
        return;
    }
    drop(unsafe { Box::from_raw(sel.cast::<SelectionNode>()) });
    track(|live| live.selections -= 1);
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_selection_vector_get_data_ptr(sel: RawSelection) -> *mut u32 {
    unsafe { SelectionNode::from_handle(sel) }
        .map_or(std::ptr::null_mut(), |node| node.indices.as_ptr().cast())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(tag: TypeTag, capacity: usize) -> Box<VectorNode> {
        VectorNode::new(TypeNode::leaf(tag), capacity)
    }

    #[test]
    fn fresh_vector_has_no_validity() {
        let v = node(TypeTag::Integer, 8);
        let raw = v.as_borrowed_handle();
        unsafe {
            assert!(qv_vector_get_validity(raw).is_null());
            qv_vector_ensure_validity_writable(raw);
            let words = qv_vector_get_validity(raw);
            assert!(!words.is_null());
            assert_eq!(*words, u64::MAX);
        }
    }

    #[test]
    fn null_cell_clears_bit() {
        let v = node(TypeTag::BigInt, 70);
        v.write_cell(65, &Cell::Null);
        let storage = v.storage.borrow();
        assert!(!storage.is_valid(65));
        assert!(storage.is_valid(64));
        assert!(storage.is_valid(0));
    }

    #[test]
    fn long_strings_go_to_heap() {
        let v = node(TypeTag::Varchar, 2);
        v.assign_string(0, b"short");
        v.assign_string(1, b"definitely longer than twelve");
        let storage = v.storage.borrow();
        assert_eq!(storage.heap.len(), 1);
        assert!(storage.element::<StringElement>(0).is_inlined());
        assert!(!storage.element::<StringElement>(1).is_inlined());
        drop(storage);
        assert_eq!(v.read_cell(1), Cell::Bytes(b"definitely longer than twelve".to_vec()));
    }

    #[test]
    fn list_cells_append_to_child() {
        let v = VectorNode::new(TypeNode::list(TypeNode::leaf(TypeTag::Integer)), 4);
        let item = |n: i32| Cell::Fixed(n.to_ne_bytes().to_vec());
        v.write_cell(0, &Cell::List(vec![item(1), item(2)]));
        v.write_cell(1, &Cell::List(vec![item(3)]));
        assert_eq!(v.list_size(), 3);
        assert_eq!(v.storage.borrow().element::<ListEntry>(1), ListEntry::new(2, 1));
        assert_eq!(v.read_cell(0), Cell::List(vec![item(1), item(2)]));
    }

    #[test]
    fn set_size_beyond_reserve_fails() {
        let v = VectorNode::new(TypeNode::list(TypeNode::leaf(TypeTag::Integer)), 4);
        let raw = v.as_borrowed_handle();
        unsafe {
            assert_eq!(qv_list_vector_set_size(raw, 3), QV_ERROR);
            assert_eq!(qv_list_vector_reserve(raw, 3), QV_SUCCESS);
            assert_eq!(qv_list_vector_set_size(raw, 3), QV_SUCCESS);
            assert_eq!(qv_list_vector_get_size(raw), 3);
        }
    }

    #[test]
    fn aliases_share_storage_until_last_drop() {
        let before = crate::live_handles().buffers;
        let mut a = node(TypeTag::Integer, 4);
        let b = node(TypeTag::Integer, 4);
        b.write_cell(0, &Cell::Fixed(7i32.to_ne_bytes().to_vec()));
        a.reference_vector(&b);
        drop(b);
        assert_eq!(a.read_cell(0), Cell::Fixed(7i32.to_ne_bytes().to_vec()));
        drop(a);
        assert_eq!(crate::live_handles().buffers, before);
    }
}
