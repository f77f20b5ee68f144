use std::marker::PhantomData;
use std::mem::ManuallyDrop;

use quiver_abi::ffi::{RawDataChunk, RawLogicalType};

use crate::codec::{self, Decode, Encode};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::types::{LogicalTypeRef, TypeHandle};
use crate::value::Value;
use crate::vector::{VectorHandle, VectorMut, VectorRef};

/// Batch of row-aligned column vectors sharing one row count.
///
/// Implemented by the owned [`DataChunk`] and the borrowed [`DataChunkRef`].
pub trait Chunk {
    fn engine(&self) -> &Engine;

    fn as_raw(&self) -> RawDataChunk;

    /// Current row count.
    fn len(&self) -> usize {
        unsafe { (self.engine().api().data_chunk_get_size)(self.as_raw()) as usize }
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum row count, the engine's vector size.
    fn capacity(&self) -> usize {
        self.engine().vector_size()
    }

    fn column_count(&self) -> usize {
        unsafe { (self.engine().api().data_chunk_get_column_count)(self.as_raw()) as usize }
    }

    /// Read view of column `col` covering the current rows.
    fn vector(&self, col: usize) -> Result<VectorRef<'_>> {
        let raw = column_raw(self, col)?;
        Ok(unsafe { VectorRef::from_raw(self.engine(), raw, self.len()) })
    }

    /// Writable view of column `col` covering the full capacity.
    fn vector_mut(&mut self, col: usize) -> Result<VectorMut<'_>> {
        let raw = column_raw(self, col)?;
        Ok(unsafe { VectorMut::from_raw(self.engine(), raw, self.capacity()) })
    }

    fn set_size(&mut self, len: usize) -> Result<()> {
        let capacity = self.capacity();
        if len > capacity {
            return Err(Error::out_of_bounds("chunk size", len, capacity));
        }
        unsafe { (self.engine().api().data_chunk_set_size)(self.as_raw(), len as u64) };
        Ok(())
    }

    /// Zero rows; every vector is reset for reuse.
    fn reset(&mut self) {
        unsafe { (self.engine().api().data_chunk_reset)(self.as_raw()) };
    }

    fn column_types(&self) -> Vec<LogicalTypeRef<'_>> {
        let api = self.engine().api();
        (0..self.column_count())
            .map(|col| unsafe {
                let vector = (api.data_chunk_get_vector)(self.as_raw(), col as u64);
                LogicalTypeRef::from_raw(self.engine(), (api.vector_get_column_type)(vector))
            })
            .collect()
    }

    fn decode_column<T: Decode>(&self, col: usize) -> Result<Vec<Option<T>>> {
        let vector = self.vector(col)?;
        codec::decode(&vector, vector.len(), 0)
    }

    fn values(&self, col: usize) -> Result<Vec<Value>> {
        let vector = self.vector(col)?;
        codec::decode_values(&vector, vector.len(), 0)
    }

    fn value(&self, col: usize, row: usize) -> Result<Value> {
        let vector = self.vector(col)?;
        if row >= vector.len() {
            return Err(Error::out_of_bounds("row", row, vector.len()));
        }
        let mut decoded = codec::decode_values(&vector, 1, row)?;
        decoded
            .pop()
            .ok_or_else(|| Error::out_of_bounds("row", row, vector.len()))
    }

    fn row_values(&self, row: usize) -> Result<Vec<Value>> {
        (0..self.column_count()).map(|col| self.value(col, row)).collect()
    }

    /// Encode `values` into rows `0..values.len()` of column `col`, growing
    /// the row count to cover them.
    fn encode_column<T: Encode>(&mut self, col: usize, values: &[Option<T>]) -> Result<()> {
        {
            let mut vector = self.vector_mut(col)?;
            codec::encode(&mut vector, values, 0)?;
        }
        if values.len() > self.len() {
            self.set_size(values.len())?;
        }
        Ok(())
    }

    /// Dynamic counterpart of [`Chunk::encode_column`].
    fn encode_values(&mut self, col: usize, values: &[Value]) -> Result<()> {
        {
            let mut vector = self.vector_mut(col)?;
            codec::encode_values(&mut vector, values, 0)?;
        }
        if values.len() > self.len() {
            self.set_size(values.len())?;
        }
        Ok(())
    }
}

fn column_raw(chunk: &(impl Chunk + ?Sized), col: usize) -> Result<quiver_abi::ffi::RawVector> {
    let count = chunk.column_count();
    if col >= count {
        return Err(Error::out_of_bounds("column", col, count));
    }
    let raw = unsafe { (chunk.engine().api().data_chunk_get_vector)(chunk.as_raw(), col as u64) };
    if raw.is_null() {
        return Err(Error::Engine(format!("chunk has no vector for column {col}")));
    }
    Ok(raw)
}

fn fmt_chunk(chunk: &impl Chunk, name: &str, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let types: Vec<String> = chunk.column_types().iter().map(ToString::to_string).collect();
    f.debug_struct(name)
        .field("len", &chunk.len())
        .field("columns", &types)
        .finish()
}

// ═══════════════════════════════════════════════════════════════
//  DataChunk (owned)
// ═══════════════════════════════════════════════════════════════

pub struct DataChunk<'e> {
    engine: &'e Engine,
    raw: RawDataChunk,
}

impl<'e> DataChunk<'e> {
    /// Empty chunk with one column per type and capacity `vector_size`.
    pub fn new<'t, T: TypeHandle<'t>>(engine: &'e Engine, types: &[T]) -> Result<Self> {
        let raw_types: Vec<RawLogicalType> = types.iter().map(|ty| ty.as_raw()).collect();
        let raw = unsafe { (engine.api().create_data_chunk)(raw_types.as_ptr(), raw_types.len() as u64) };
        if raw.is_null() {
            return Err(Error::Allocation("data chunk"));
        }
        Ok(Self { engine, raw })
    }

    /// Take ownership of an engine chunk.
    ///
    /// # Safety
    ///
    /// `raw` must be a live chunk of `engine` that nobody else frees.
    pub unsafe fn from_raw(engine: &'e Engine, raw: RawDataChunk) -> Self {
        Self { engine, raw }
    }

    /// Release ownership to the caller, typically to hand the chunk back to
    /// the engine.
    pub fn into_raw(self) -> RawDataChunk {
        ManuallyDrop::new(self).raw
    }
}

impl Chunk for DataChunk<'_> {
    fn engine(&self) -> &Engine {
        self.engine
    }

    fn as_raw(&self) -> RawDataChunk {
        self.raw
    }
}

impl std::fmt::Debug for DataChunk<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt_chunk(self, "DataChunk", f)
    }
}

impl Drop for DataChunk<'_> {
    fn drop(&mut self) {
        unsafe { (self.engine.api().destroy_data_chunk)(&mut self.raw) };
    }
}

// ═══════════════════════════════════════════════════════════════
//  DataChunkRef (borrowed)
// ═══════════════════════════════════════════════════════════════

/// Engine-owned chunk, e.g. the input or output of an engine callback.
/// Never freed by this wrapper.
pub struct DataChunkRef<'a> {
    engine: &'a Engine,
    raw: RawDataChunk,
    _owner: PhantomData<&'a mut ()>,
}

impl<'a> DataChunkRef<'a> {
    /// # Safety
    ///
    /// `raw` must be a live chunk of `engine`, exclusively borrowed for `'a`.
    pub unsafe fn from_raw(engine: &'a Engine, raw: RawDataChunk) -> Self {
        Self {
            engine,
            raw,
            _owner: PhantomData,
        }
    }
}

impl Chunk for DataChunkRef<'_> {
    fn engine(&self) -> &Engine {
        self.engine
    }

    fn as_raw(&self) -> RawDataChunk {
        self.raw
    }
}

impl std::fmt::Debug for DataChunkRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt_chunk(self, "DataChunkRef", f)
    }
}
