//! Query results: a single-pass [`ResultCursor`] over engine chunks and the
//! random-access [`MaterializedResult`] built from it.

use std::ffi::CStr;

use quiver_abi::ffi::RawResult;
use tracing::{debug, warn};

use crate::chunk::{Chunk, DataChunk};
use crate::codec::{self, Decode};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::types::LogicalTypeRef;
use crate::value::Value;

// ═══════════════════════════════════════════════════════════════
//  QueryResult
// ═══════════════════════════════════════════════════════════════

/// Owned engine result handle.
pub struct QueryResult<'e> {
    engine: &'e Engine,
    raw: RawResult,
}

impl<'e> QueryResult<'e> {
    /// # Safety
    ///
    /// `raw` must be a live result of `engine` that nobody else frees.
    pub unsafe fn from_raw(engine: &'e Engine, raw: RawResult) -> Self {
        Self { engine, raw }
    }

    /// Result over already filled chunks. Only the built-in engine can
    /// assemble results host-side.
    #[cfg(feature = "memory")]
    pub fn from_chunks(
        engine: &'e Engine,
        columns: &[(&str, &crate::types::LogicalType<'_>)],
        chunks: Vec<DataChunk<'e>>,
    ) -> Result<Self> {
        use std::ffi::CString;

        use crate::types::TypeHandle;

        if !engine.is_in_memory() {
            return Err(Error::Engine("results can only be assembled by the memory engine".into()));
        }
        let names = columns
            .iter()
            .map(|(name, _)| {
                CString::new(*name).map_err(|_| Error::Config(format!("column name {name:?} contains NUL")))
            })
            .collect::<Result<Vec<_>>>()?;
        let name_ptrs: Vec<_> = names.iter().map(|name| name.as_ptr()).collect();
        let types: Vec<_> = columns.iter().map(|(_, ty)| ty.as_raw()).collect();

        let raw = unsafe {
            quiver_engine_memory::qv_memory_result_create(types.as_ptr(), name_ptrs.as_ptr(), columns.len() as u64)
        };
        if raw.is_null() {
            return Err(Error::Allocation("result"));
        }
        let result = Self { engine, raw };

        for (index, chunk) in chunks.into_iter().enumerate() {
            let raw_chunk = chunk.into_raw();
            let state = unsafe { quiver_engine_memory::qv_memory_result_append(result.raw, raw_chunk) };
            if state != quiver_abi::ffi::QV_SUCCESS {
                // Ownership stays with us on failure.
                drop(unsafe { DataChunk::from_raw(engine, raw_chunk) });
                return Err(Error::Engine(format!("chunk {index} does not match the result columns")));
            }
        }
        Ok(result)
    }

    pub fn engine(&self) -> &'e Engine {
        self.engine
    }

    pub fn column_count(&self) -> usize {
        unsafe { (self.engine.api().result_column_count)(self.raw) as usize }
    }

    pub fn column_name(&self, index: usize) -> Result<String> {
        self.check_column(index)?;
        let name = unsafe { (self.engine.api().result_column_name)(self.raw, index as u64) };
        if name.is_null() {
            return Err(Error::Engine(format!("column {index} has no name")));
        }
        Ok(unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned())
    }

    pub fn column_type(&self, index: usize) -> Result<LogicalTypeRef<'_>> {
        self.check_column(index)?;
        let raw = unsafe { (self.engine.api().result_column_type)(self.raw, index as u64) };
        if raw.is_null() {
            return Err(Error::Engine(format!("column {index} has no type")));
        }
        Ok(unsafe { LogicalTypeRef::from_raw(self.engine, raw) })
    }

    pub fn column_names(&self) -> Result<Vec<String>> {
        (0..self.column_count()).map(|i| self.column_name(i)).collect()
    }

    pub fn into_cursor(self) -> ResultCursor<'e> {
        ResultCursor::new(self)
    }

    pub fn materialize(self) -> Result<MaterializedResult<'e>> {
        MaterializedResult::from_cursor(self.into_cursor())
    }

    fn check_column(&self, index: usize) -> Result<()> {
        let count = self.column_count();
        if index >= count {
            return Err(Error::out_of_bounds("column", index, count));
        }
        Ok(())
    }
}

impl std::fmt::Debug for QueryResult<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryResult")
            .field("columns", &self.column_names().unwrap_or_default())
            .finish()
    }
}

impl Drop for QueryResult<'_> {
    fn drop(&mut self) {
        unsafe { (self.engine.api().destroy_result)(&mut self.raw) };
    }
}

// ═══════════════════════════════════════════════════════════════
//  ResultCursor
// ═══════════════════════════════════════════════════════════════

/// Pull-based stream of chunks, one chunk fetched ahead.
///
/// The stream ends at the first null or zero-row chunk.
pub struct ResultCursor<'e> {
    // Dropped before the result that produced it.
    next: Option<DataChunk<'e>>,
    result: QueryResult<'e>,
    done: bool,
    fetched: usize,
}

impl<'e> ResultCursor<'e> {
    fn new(result: QueryResult<'e>) -> Self {
        let mut cursor = Self {
            next: None,
            result,
            done: false,
            fetched: 0,
        };
        cursor.next = cursor.fetch();
        cursor
    }

    fn fetch(&mut self) -> Option<DataChunk<'e>> {
        if self.done {
            return None;
        }
        let engine = self.result.engine;
        let raw = unsafe { (engine.api().fetch_chunk)(self.result.raw) };
        if raw.is_null() {
            self.done = true;
            return None;
        }
        let chunk = unsafe { DataChunk::from_raw(engine, raw) };
        if chunk.is_empty() {
            warn!(after = self.fetched, "zero-row chunk ends result stream");
            self.done = true;
            return None;
        }
        self.fetched += 1;
        debug!(chunk = self.fetched, rows = chunk.len(), "fetched chunk");
        Some(chunk)
    }

    /// True when another chunk is buffered. Never calls the engine.
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    pub fn next_chunk(&mut self) -> Result<DataChunk<'e>> {
        let chunk = self.next.take().ok_or(Error::Exhausted)?;
        self.next = self.fetch();
        Ok(chunk)
    }

    pub fn column_count(&self) -> usize {
        self.result.column_count()
    }

    pub fn column_name(&self, index: usize) -> Result<String> {
        self.result.column_name(index)
    }

    pub fn column_type(&self, index: usize) -> Result<LogicalTypeRef<'_>> {
        self.result.column_type(index)
    }
}

impl<'e> Iterator for ResultCursor<'e> {
    type Item = DataChunk<'e>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().ok()
    }
}

// ═══════════════════════════════════════════════════════════════
//  MaterializedResult
// ═══════════════════════════════════════════════════════════════

/// Every chunk of a result held in memory, addressable by global row.
pub struct MaterializedResult<'e> {
    chunks: Vec<DataChunk<'e>>,
    result: QueryResult<'e>,
    /// Global row of each chunk's first row.
    starts: Vec<usize>,
    row_count: usize,
    vector_size: usize,
    /// Every chunk but the last holds exactly `vector_size` rows.
    uniform: bool,
}

impl<'e> MaterializedResult<'e> {
    pub fn from_cursor(mut cursor: ResultCursor<'e>) -> Result<Self> {
        let vector_size = cursor.result.engine.vector_size();
        let mut chunks = Vec::new();
        let mut starts = Vec::new();
        let mut row_count = 0;
        while cursor.has_next() {
            let chunk = cursor.next_chunk()?;
            starts.push(row_count);
            row_count += chunk.len();
            chunks.push(chunk);
        }
        let uniform = match chunks.split_last() {
            Some((_, rest)) => rest.iter().all(|chunk| chunk.len() == vector_size),
            None => true,
        };
        if !uniform {
            warn!(vector_size, chunks = chunks.len(), "non-uniform chunk sizes, using offset search");
        }
        debug!(rows = row_count, chunks = chunks.len(), "materialized result");

        let ResultCursor { result, .. } = cursor;
        Ok(Self {
            chunks,
            result,
            starts,
            row_count,
            vector_size,
            uniform,
        })
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunks(&self) -> &[DataChunk<'e>] {
        &self.chunks
    }

    /// Chunk capacity captured at materialization.
    pub fn vector_size(&self) -> usize {
        self.vector_size
    }

    pub fn column_count(&self) -> usize {
        self.result.column_count()
    }

    pub fn column_name(&self, index: usize) -> Result<String> {
        self.result.column_name(index)
    }

    pub fn column_type(&self, index: usize) -> Result<LogicalTypeRef<'_>> {
        self.result.column_type(index)
    }

    /// Chunk index and chunk-local row of global row `row`.
    fn locate(&self, row: usize) -> Result<(usize, usize)> {
        if row >= self.row_count {
            return Err(Error::out_of_bounds("row", row, self.row_count));
        }
        if self.uniform {
            return Ok((row / self.vector_size, row % self.vector_size));
        }
        let index = self.starts.partition_point(|&start| start <= row) - 1;
        Ok((index, row - self.starts[index]))
    }

    pub fn value(&self, col: usize, row: usize) -> Result<Value> {
        let (chunk, local) = self.locate(row)?;
        self.chunks[chunk].value(col, local)
    }

    pub fn get<T: Decode>(&self, col: usize, row: usize) -> Result<Option<T>> {
        let (chunk, local) = self.locate(row)?;
        let vector = self.chunks[chunk].vector(col)?;
        let mut decoded = codec::decode::<T>(&vector, 1, local)?;
        Ok(decoded.pop().flatten())
    }

    pub fn row(&self, row: usize) -> Result<Vec<Value>> {
        let (chunk, local) = self.locate(row)?;
        self.chunks[chunk].row_values(local)
    }

    /// Column `col` concatenated across chunks.
    pub fn column<T: Decode>(&self, col: usize) -> Result<Vec<Option<T>>> {
        let mut out = Vec::with_capacity(self.row_count);
        for chunk in &self.chunks {
            out.extend(chunk.decode_column::<T>(col)?);
        }
        Ok(out)
    }

    /// Rows as JSON objects keyed by column name.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let names = self.result.column_names()?;
        let mut rows = Vec::with_capacity(self.row_count);
        for chunk in &self.chunks {
            for local in 0..chunk.len() {
                let object = names
                    .iter()
                    .zip(chunk.row_values(local)?)
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect();
                rows.push(serde_json::Value::Object(object));
            }
        }
        Ok(serde_json::Value::Array(rows))
    }
}

impl std::fmt::Debug for MaterializedResult<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaterializedResult")
            .field("rows", &self.row_count)
            .field("chunks", &self.chunks.len())
            .field("uniform", &self.uniform)
            .finish()
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::types::{LogicalType, TypeHandle};
    use quiver_abi::TypeTag;

    fn int_chunk<'e>(engine: &'e Engine, ty: &LogicalType<'_>, values: &[i64]) -> DataChunk<'e> {
        let mut chunk = DataChunk::new(engine, std::slice::from_ref(ty)).unwrap();
        let values: Vec<_> = values.iter().copied().map(Some).collect();
        chunk.encode_column(0, &values).unwrap();
        chunk
    }

    #[test]
    fn cursor_prefetches_and_reports_exhausted() {
        let engine = Engine::in_memory();
        let ty = LogicalType::new(&engine, TypeTag::BigInt).unwrap();
        let chunks = vec![int_chunk(&engine, &ty, &[1, 2]), int_chunk(&engine, &ty, &[3])];
        let result = QueryResult::from_chunks(&engine, &[("n", &ty)], chunks).unwrap();
        assert_eq!(result.column_name(0).unwrap(), "n");
        assert_eq!(result.column_type(0).unwrap().type_tag(), TypeTag::BigInt);
        assert!(result.column_name(1).is_err());

        let mut cursor = result.into_cursor();
        assert!(cursor.has_next());
        assert!(cursor.has_next());
        assert_eq!(cursor.next_chunk().unwrap().len(), 2);
        assert_eq!(cursor.next_chunk().unwrap().len(), 1);
        assert!(!cursor.has_next());
        assert!(matches!(cursor.next_chunk(), Err(Error::Exhausted)));
        assert!(cursor.next().is_none());
    }

    #[test]
    fn zero_row_chunk_ends_stream_and_is_freed() {
        let engine = Engine::in_memory();
        let ty = LogicalType::new(&engine, TypeTag::BigInt).unwrap();
        let before = quiver_engine_memory::live_handles();
        {
            let chunks = vec![
                int_chunk(&engine, &ty, &[1]),
                int_chunk(&engine, &ty, &[]),
                int_chunk(&engine, &ty, &[2]),
            ];
            let result = QueryResult::from_chunks(&engine, &[("n", &ty)], chunks).unwrap();
            let total: usize = result.into_cursor().map(|chunk| chunk.len()).sum();
            assert_eq!(total, 1);
        }
        assert_eq!(quiver_engine_memory::live_handles(), before);
    }

    #[test]
    fn mismatched_chunk_is_rejected_and_freed() {
        let engine = Engine::in_memory();
        let int = LogicalType::new(&engine, TypeTag::BigInt).unwrap();
        let text = LogicalType::new(&engine, TypeTag::Varchar).unwrap();
        let before = quiver_engine_memory::live_handles();
        {
            let chunk = DataChunk::new(&engine, &[text.try_clone().unwrap()]).unwrap();
            let err = QueryResult::from_chunks(&engine, &[("n", &int)], vec![chunk]).unwrap_err();
            assert!(matches!(err, Error::Engine(_)));
        }
        assert_eq!(quiver_engine_memory::live_handles(), before);
    }

    #[test]
    fn non_uniform_chunks_fall_back_to_search() {
        let engine = Engine::in_memory();
        let ty = LogicalType::new(&engine, TypeTag::BigInt).unwrap();
        let chunks = vec![
            int_chunk(&engine, &ty, &[10, 11]),
            int_chunk(&engine, &ty, &[12]),
            int_chunk(&engine, &ty, &[13, 14, 15]),
        ];
        let result = QueryResult::from_chunks(&engine, &[("n", &ty)], chunks).unwrap();
        let materialized = result.materialize().unwrap();
        assert_eq!(materialized.row_count(), 6);
        assert_eq!(materialized.chunk_count(), 3);
        for row in 0..6 {
            assert_eq!(materialized.get::<i64>(0, row).unwrap(), Some(10 + row as i64));
        }
        assert!(matches!(materialized.value(0, 6), Err(Error::OutOfBounds { index: 6, .. })));
        assert_eq!(
            materialized.to_json().unwrap(),
            serde_json::json!([{"n": 10}, {"n": 11}, {"n": 12}, {"n": 13}, {"n": 14}, {"n": 15}])
        );
    }
}
