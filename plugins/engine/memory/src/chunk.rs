use quiver_abi::ffi::{RawDataChunk, RawLogicalType, RawVector};

use crate::STANDARD_VECTOR_SIZE;
use crate::alloc::track;
use crate::types::TypeNode;
use crate::vector::VectorNode;

/// Fixed-capacity batch of column vectors.
pub(crate) struct ChunkNode {
    pub vectors: Vec<Box<VectorNode>>,
    pub size: usize,
}

impl ChunkNode {
    pub fn new(types: Vec<TypeNode>) -> Box<Self> {
        track(|live| live.chunks += 1);
        let vectors = types
            .into_iter()
            .map(|ty| VectorNode::new(ty, STANDARD_VECTOR_SIZE))
            .collect();
        Box::new(Self { vectors, size: 0 })
    }

    /// # Safety
    ///
    /// `raw` must be null or a live chunk handle of this engine.
    pub unsafe fn from_handle<'a>(raw: RawDataChunk) -> Option<&'a mut ChunkNode> {
        unsafe { raw.cast::<ChunkNode>().as_mut() }
    }

    pub fn into_handle(self: Box<Self>) -> RawDataChunk {
        Box::into_raw(self).cast()
    }

    /// # Safety
    ///
    /// `raw` must be a non-null handle not yet released.
    pub unsafe fn from_owned(raw: RawDataChunk) -> Box<ChunkNode> {
        unsafe { Box::from_raw(raw.cast::<ChunkNode>()) }
    }

    pub fn reset(&mut self) {
        self.size = 0;
        for vector in &mut self.vectors {
            vector.reset();
        }
    }
}

impl Drop for ChunkNode {
    fn drop(&mut self) {
        track(|live| live.chunks -= 1);
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_create_data_chunk(
    types: *const RawLogicalType,
    count: u64,
) -> RawDataChunk {
    if count > 0 && types.is_null() {
        return std::ptr::null_mut();
    }
    let mut nodes = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        match unsafe { TypeNode::from_handle(*types.add(i)) } {
            Some(ty) => nodes.push(ty.clone()),
            None => return std::ptr::null_mut(),
        }
    }
    ChunkNode::new(nodes).into_handle()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_destroy_data_chunk(chunk: *mut RawDataChunk) {
    if chunk.is_null() {
        return;
    }
    unsafe {
        let raw = *chunk;
        if !raw.is_null() {
            drop(ChunkNode::from_owned(raw));
        }
        *chunk = std::ptr::null_mut();
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_data_chunk_reset(chunk: RawDataChunk) {
    if let Some(node) = unsafe { ChunkNode::from_handle(chunk) } {
        node.reset();
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_data_chunk_get_column_count(chunk: RawDataChunk) -> u64 {
    unsafe { ChunkNode::from_handle(chunk) }.map_or(0, |node| node.vectors.len() as u64)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_data_chunk_get_vector(chunk: RawDataChunk, index: u64) -> RawVector {
    unsafe { ChunkNode::from_handle(chunk) }
        .and_then(|node| node.vectors.get(index as usize))
        .map_or(std::ptr::null_mut(), |vector| vector.as_borrowed_handle())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_data_chunk_get_size(chunk: RawDataChunk) -> u64 {
    unsafe { ChunkNode::from_handle(chunk) }.map_or(0, |node| node.size as u64)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_data_chunk_set_size(chunk: RawDataChunk, size: u64) {
    if let Some(node) = unsafe { ChunkNode::from_handle(chunk) } {
        node.size = (size as usize).min(STANDARD_VECTOR_SIZE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_abi::TypeTag;

    #[test]
    fn chunk_vectors_are_borrowed() {
        let before = crate::live_handles();
        unsafe {
            let mut ty = crate::types::qv_create_logical_type(TypeTag::Integer.as_raw());
            let mut chunk = qv_create_data_chunk([ty, ty].as_ptr(), 2);
            crate::types::qv_destroy_logical_type(&mut ty);

            assert_eq!(qv_data_chunk_get_column_count(chunk), 2);
            assert!(!qv_data_chunk_get_vector(chunk, 1).is_null());
            assert!(qv_data_chunk_get_vector(chunk, 2).is_null());

            qv_data_chunk_set_size(chunk, 17);
            assert_eq!(qv_data_chunk_get_size(chunk), 17);
            qv_data_chunk_reset(chunk);
            assert_eq!(qv_data_chunk_get_size(chunk), 0);

            qv_destroy_data_chunk(&mut chunk);
            assert!(chunk.is_null());
        }
        assert_eq!(crate::live_handles(), before);
    }
}
