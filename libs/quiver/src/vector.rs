//! Column vectors.
//!
//! Three wrappers share one raw vector interface:
//!
//! - [`Vector`] owns a standalone engine vector and destroys it on drop.
//! - [`VectorRef`] is a read-only view borrowed from a chunk or a parent vector.
//! - [`VectorMut`] is a writable view borrowed from a chunk or a parent vector.
//!
//! Read operations live on [`VectorHandle`], writes on [`VectorHandleMut`].
//! Typed access to the data buffer goes through [`Primitive`] and is only
//! granted after the runtime type tag has been checked.

use std::marker::PhantomData;

use quiver_abi::ffi::{QV_SUCCESS, RawVector};
use quiver_abi::{Interval, ListEntry, StringElement, TypeTag};

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::types::{LogicalTypeRef, TypeHandle, types_equal};
use crate::validity::{ValidityMask, WritableValidity};
use crate::value::{Date, Scalar, Time, Timestamp, TimestampTz};

// ═══════════════════════════════════════════════════════════════
//  Primitive element types
// ═══════════════════════════════════════════════════════════════

/// Element type stored directly in a vector's data buffer.
///
/// # Safety
///
/// `Self` must have exactly the engine's element layout for every tag that
/// `accepts` returns true for, and every bit pattern the engine writes for
/// those tags must be a valid `Self`.
pub unsafe trait Primitive: Copy + 'static {
    /// Tag reported in a mismatch error.
    const TAG: TypeTag;

    fn accepts(tag: TypeTag) -> bool {
        tag == Self::TAG
    }
}

macro_rules! primitive {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $( unsafe impl Primitive for $ty { const TAG: TypeTag = TypeTag::$tag; } )*
    };
}

primitive!(
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

unsafe impl Primitive for StringElement {
    const TAG: TypeTag = TypeTag::Varchar;

    fn accepts(tag: TypeTag) -> bool {
        tag.is_string_like()
    }
}

unsafe impl Primitive for ListEntry {
    const TAG: TypeTag = TypeTag::List;

    fn accepts(tag: TypeTag) -> bool {
        matches!(tag, TypeTag::List | TypeTag::Map)
    }
}

fn mismatch(expected: TypeTag, actual: TypeTag) -> Error {
    Error::TypeMismatch { expected, actual }
}

fn check_row(row: usize, len: usize) -> Result<()> {
    if row < len {
        Ok(())
    } else {
        Err(Error::out_of_bounds("row", row, len))
    }
}

// ═══════════════════════════════════════════════════════════════
//  VectorHandle (read)
// ═══════════════════════════════════════════════════════════════

pub trait VectorHandle {
    fn engine(&self) -> &Engine;

    fn as_raw(&self) -> RawVector;

    /// Addressable rows of this view.
    ///
    /// Chunk read views cover the chunk's row count, writable views the full
    /// capacity, list children the list size.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn logical_type(&self) -> LogicalTypeRef<'_> {
        let raw = unsafe { (self.engine().api().vector_get_column_type)(self.as_raw()) };
        unsafe { LogicalTypeRef::from_raw(self.engine(), raw) }
    }

    fn type_tag(&self) -> TypeTag {
        self.logical_type().type_tag()
    }

    fn validity(&self) -> ValidityMask<'_> {
        let words = unsafe { (self.engine().api().vector_get_validity)(self.as_raw()) };
        unsafe { ValidityMask::from_raw(words, self.len()) }
    }

    /// Data buffer viewed as `len()` elements of `T`.
    fn data<T: Primitive>(&self) -> Result<&[T]> {
        let tag = self.type_tag();
        if !T::accepts(tag) {
            return Err(mismatch(T::TAG, tag));
        }
        let len = self.len();
        if len == 0 {
            return Ok(&[]);
        }
        let ptr = unsafe { (self.engine().api().vector_get_data)(self.as_raw()) };
        if ptr.is_null() {
            return Err(Error::Engine(format!("{tag} vector has no data buffer")));
        }
        Ok(unsafe { std::slice::from_raw_parts(ptr.cast::<T>(), len) })
    }

    fn list_size(&self) -> Result<usize> {
        expect_list(self.type_tag())?;
        Ok(unsafe { (self.engine().api().list_vector_get_size)(self.as_raw()) } as usize)
    }

    /// Flattened child elements of a list (or map) vector.
    fn list_child(&self) -> Result<VectorRef<'_>> {
        let size = self.list_size()?;
        let raw = unsafe { (self.engine().api().list_vector_get_child)(self.as_raw()) };
        VectorRef::child(self.engine(), raw, size)
    }

    fn struct_child(&self, index: usize) -> Result<VectorRef<'_>> {
        let raw = struct_child_raw(self, index)?;
        VectorRef::child(self.engine(), raw, self.len())
    }

    /// Child of a fixed-size array vector; row `r` owns child rows
    /// `r * size .. (r + 1) * size`.
    fn array_child(&self) -> Result<VectorRef<'_>> {
        let (raw, size) = array_child_raw(self)?;
        VectorRef::child(self.engine(), raw, self.len() * size)
    }

    /// Gather-copy into `dst`: for `i` in `src_offset..count`,
    /// `dst[dst_offset + i - src_offset] = self[selection[i]]`.
    fn copy_sel(
        &self,
        dst: &mut impl VectorHandleMut,
        selection: &SelectionVector<'_>,
        count: usize,
        src_offset: usize,
        dst_offset: usize,
    ) -> Result<()> {
        if !types_equal(&self.logical_type(), &dst.logical_type()) {
            return Err(mismatch(dst.type_tag(), self.type_tag()));
        }
        if count > selection.len() {
            return Err(Error::out_of_bounds("selection", count, selection.len()));
        }
        if src_offset > count {
            return Err(Error::out_of_bounds("selection offset", src_offset, count));
        }
        for &row in &selection.as_slice()[src_offset..count] {
            check_row(row as usize, self.len())?;
        }
        let end = dst_offset + (count - src_offset);
        if end > dst.len() {
            return Err(Error::out_of_bounds("row", end, dst.len()));
        }
        unsafe {
            (self.engine().api().vector_copy_sel)(
                self.as_raw(),
                dst.as_raw(),
                selection.as_raw(),
                count as u64,
                src_offset as u64,
                dst_offset as u64,
            )
        };
        Ok(())
    }
}

fn expect_list(tag: TypeTag) -> Result<()> {
    match tag {
        TypeTag::List | TypeTag::Map => Ok(()),
        tag => Err(mismatch(TypeTag::List, tag)),
    }
}

fn struct_child_raw(vector: &(impl VectorHandle + ?Sized), index: usize) -> Result<RawVector> {
    let ty = vector.logical_type();
    let count = ty.struct_child_count()?;
    if index >= count {
        return Err(Error::out_of_bounds("struct member", index, count));
    }
    Ok(unsafe { (vector.engine().api().struct_vector_get_child)(vector.as_raw(), index as u64) })
}

fn array_child_raw(vector: &(impl VectorHandle + ?Sized)) -> Result<(RawVector, usize)> {
    let size = vector.logical_type().array_size()?;
    let raw = unsafe { (vector.engine().api().array_vector_get_child)(vector.as_raw()) };
    Ok((raw, size))
}

// ═══════════════════════════════════════════════════════════════
//  VectorHandleMut (write)
// ═══════════════════════════════════════════════════════════════

pub trait VectorHandleMut: VectorHandle {
    fn data_mut<T: Primitive>(&mut self) -> Result<&mut [T]> {
        let tag = self.type_tag();
        if !T::accepts(tag) {
            return Err(mismatch(T::TAG, tag));
        }
        let len = self.len();
        if len == 0 {
            return Ok(&mut []);
        }
        let ptr = unsafe { (self.engine().api().vector_get_data)(self.as_raw()) };
        if ptr.is_null() {
            return Err(Error::Engine(format!("{tag} vector has no data buffer")));
        }
        Ok(unsafe { std::slice::from_raw_parts_mut(ptr.cast::<T>(), len) })
    }

    /// Materialize the validity bitmap (all valid) if none exists yet.
    fn ensure_validity_writable(&mut self) -> Result<WritableValidity<'_>> {
        let api = self.engine().api();
        let words = unsafe {
            (api.vector_ensure_validity_writable)(self.as_raw());
            (api.vector_get_validity)(self.as_raw())
        };
        if words.is_null() {
            return Err(Error::Allocation("validity mask"));
        }
        Ok(unsafe { WritableValidity::from_raw(words, self.len()) })
    }

    fn set_null(&mut self, row: usize) -> Result<()> {
        check_row(row, self.len())?;
        self.ensure_validity_writable()?.set_valid(row, false);
        Ok(())
    }

    /// Store `bytes` in a string-like vector. The engine picks inline or
    /// pointer encoding and owns the copy.
    fn assign_string(&mut self, row: usize, bytes: &[u8]) -> Result<()> {
        let tag = self.type_tag();
        if !tag.is_string_like() {
            return Err(mismatch(TypeTag::Varchar, tag));
        }
        check_row(row, self.len())?;
        unsafe {
            (self.engine().api().vector_assign_string_element_len)(
                self.as_raw(),
                row as u64,
                bytes.as_ptr().cast(),
                bytes.len() as u64,
            )
        };
        Ok(())
    }

    /// Grow the list child to hold at least `capacity` elements. Child
    /// buffers may move.
    fn list_reserve(&mut self, capacity: usize) -> Result<()> {
        expect_list(self.type_tag())?;
        let state = unsafe { (self.engine().api().list_vector_reserve)(self.as_raw(), capacity as u64) };
        if state != QV_SUCCESS {
            return Err(Error::Engine(format!("list reserve of {capacity} elements failed")));
        }
        Ok(())
    }

    fn list_set_size(&mut self, size: usize) -> Result<()> {
        expect_list(self.type_tag())?;
        let state = unsafe { (self.engine().api().list_vector_set_size)(self.as_raw(), size as u64) };
        if state != QV_SUCCESS {
            return Err(Error::Engine(format!("list set size to {size} failed")));
        }
        Ok(())
    }

    fn list_child_mut(&mut self) -> Result<VectorMut<'_>> {
        let size = self.list_size()?;
        let raw = unsafe { (self.engine().api().list_vector_get_child)(self.as_raw()) };
        VectorMut::child(self.engine(), raw, size)
    }

    fn struct_child_mut(&mut self, index: usize) -> Result<VectorMut<'_>> {
        let raw = struct_child_raw(self, index)?;
        VectorMut::child(self.engine(), raw, self.len())
    }

    fn array_child_mut(&mut self) -> Result<VectorMut<'_>> {
        let (raw, size) = array_child_raw(self)?;
        VectorMut::child(self.engine(), raw, self.len() * size)
    }

    /// Reorder or filter rows in place: row `i` becomes old row
    /// `selection[i]` for `i < len`.
    fn slice(&mut self, selection: &SelectionVector<'_>, len: usize) -> Result<()> {
        if len > selection.len() {
            return Err(Error::out_of_bounds("selection", len, selection.len()));
        }
        if len > self.len() {
            return Err(Error::out_of_bounds("row", len, self.len()));
        }
        for &row in &selection.as_slice()[..len] {
            check_row(row as usize, self.len())?;
        }
        unsafe { (self.engine().api().slice_vector)(self.as_raw(), selection.as_raw(), len as u64) };
        Ok(())
    }

    /// Share `other`'s storage. The engine frees it once the last alias goes.
    fn reference_vector(&mut self, other: &impl VectorHandle) -> Result<()> {
        if !types_equal(&self.logical_type(), &other.logical_type()) {
            return Err(mismatch(self.type_tag(), other.type_tag()));
        }
        unsafe { (self.engine().api().vector_reference_vector)(self.as_raw(), other.as_raw()) };
        Ok(())
    }

    /// Make every row equal to `value`. A NULL value makes every row NULL.
    fn reference_value(&mut self, value: &Scalar<'_>) -> Result<()> {
        let tag = self.type_tag();
        let value_tag = value.type_tag();
        if value_tag != tag && value_tag != TypeTag::SqlNull {
            return Err(mismatch(tag, value_tag));
        }
        unsafe { (self.engine().api().vector_reference_value)(self.as_raw(), value.as_raw()) };
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
//  VectorRef / VectorMut
// ═══════════════════════════════════════════════════════════════

/// Read-only borrowed vector.
#[derive(Debug, Clone, Copy)]
pub struct VectorRef<'a> {
    engine: &'a Engine,
    raw: RawVector,
    len: usize,
    _owner: PhantomData<&'a ()>,
}

impl<'a> VectorRef<'a> {
    /// # Safety
    ///
    /// `raw` must be a live vector of `engine` with at least `len` rows, valid
    /// and not mutated for `'a`.
    pub unsafe fn from_raw(engine: &'a Engine, raw: RawVector, len: usize) -> Self {
        Self {
            engine,
            raw,
            len,
            _owner: PhantomData,
        }
    }

    fn child(engine: &'a Engine, raw: RawVector, len: usize) -> Result<Self> {
        if raw.is_null() {
            return Err(Error::Engine("engine returned no child vector".into()));
        }
        Ok(unsafe { Self::from_raw(engine, raw, len) })
    }
}

impl VectorHandle for VectorRef<'_> {
    fn engine(&self) -> &Engine {
        self.engine
    }

    fn as_raw(&self) -> RawVector {
        self.raw
    }

    fn len(&self) -> usize {
        self.len
    }
}

/// Writable borrowed vector.
#[derive(Debug)]
pub struct VectorMut<'a> {
    engine: &'a Engine,
    raw: RawVector,
    len: usize,
    _owner: PhantomData<&'a mut ()>,
}

impl<'a> VectorMut<'a> {
    /// # Safety
    ///
    /// `raw` must be a live vector of `engine` with at least `len` rows,
    /// exclusively borrowed for `'a`.
    pub unsafe fn from_raw(engine: &'a Engine, raw: RawVector, len: usize) -> Self {
        Self {
            engine,
            raw,
            len,
            _owner: PhantomData,
        }
    }

    fn child(engine: &'a Engine, raw: RawVector, len: usize) -> Result<Self> {
        if raw.is_null() {
            return Err(Error::Engine("engine returned no child vector".into()));
        }
        Ok(unsafe { Self::from_raw(engine, raw, len) })
    }

    pub fn as_view(&self) -> VectorRef<'_> {
        unsafe { VectorRef::from_raw(self.engine, self.raw, self.len) }
    }
}

impl VectorHandle for VectorMut<'_> {
    fn engine(&self) -> &Engine {
        self.engine
    }

    fn as_raw(&self) -> RawVector {
        self.raw
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl VectorHandleMut for VectorMut<'_> {}

// ═══════════════════════════════════════════════════════════════
//  Vector (owned)
// ═══════════════════════════════════════════════════════════════

/// Standalone vector owned by this wrapper.
#[derive(Debug)]
pub struct Vector<'e> {
    engine: &'e Engine,
    raw: RawVector,
    capacity: usize,
}

impl<'e> Vector<'e> {
    pub fn new<'t>(engine: &'e Engine, ty: &impl TypeHandle<'t>, capacity: usize) -> Result<Self> {
        let raw = unsafe { (engine.api().create_vector)(ty.as_raw(), capacity as u64) };
        if raw.is_null() {
            return Err(Error::Allocation("vector"));
        }
        Ok(Self {
            engine,
            raw,
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl VectorHandle for Vector<'_> {
    fn engine(&self) -> &Engine {
        self.engine
    }

    fn as_raw(&self) -> RawVector {
        self.raw
    }

    fn len(&self) -> usize {
        self.capacity
    }
}

impl VectorHandleMut for Vector<'_> {}

impl Drop for Vector<'_> {
    fn drop(&mut self) {
        unsafe { (self.engine.api().destroy_vector)(&mut self.raw) };
    }
}

// ═══════════════════════════════════════════════════════════════
//  SelectionVector
// ═══════════════════════════════════════════════════════════════

/// Engine-allocated list of row indices used by `slice` and `copy_sel`.
pub struct SelectionVector<'e> {
    engine: &'e Engine,
    raw: quiver_abi::ffi::RawSelection,
    indices: *mut u32,
    len: usize,
}

impl<'e> SelectionVector<'e> {
    /// Selection of `len` indices, all zero.
    pub fn new(engine: &'e Engine, len: usize) -> Result<Self> {
        let raw = unsafe { (engine.api().create_selection_vector)(len as u64) };
        if raw.is_null() {
            return Err(Error::Allocation("selection vector"));
        }
        let indices = unsafe { (engine.api().selection_vector_get_data_ptr)(raw) };
        // Construct first so the handle is released on the error path.
        let selection = Self {
            engine,
            raw,
            indices,
            len,
        };
        if indices.is_null() && len > 0 {
            return Err(Error::Allocation("selection vector indices"));
        }
        Ok(selection)
    }

    pub fn from_indices(engine: &'e Engine, indices: &[u32]) -> Result<Self> {
        let mut selection = Self::new(engine, indices.len())?;
        selection.as_mut_slice().copy_from_slice(indices);
        Ok(selection)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u32] {
        if self.len == 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.indices, self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u32] {
        if self.len == 0 {
            return &mut [];
        }
        unsafe { std::slice::from_raw_parts_mut(self.indices, self.len) }
    }

    pub fn as_raw(&self) -> quiver_abi::ffi::RawSelection {
        self.raw
    }
}

impl std::fmt::Debug for SelectionVector<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

impl Drop for SelectionVector<'_> {
    fn drop(&mut self) {
        unsafe { (self.engine.api().destroy_selection_vector)(self.raw) };
    }
}
