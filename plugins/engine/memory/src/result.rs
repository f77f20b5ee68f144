use std::collections::VecDeque;
use std::ffi::{CStr, CString, c_char};

use quiver_abi::ffi::{QV_ERROR, QV_SUCCESS, RawDataChunk, RawLogicalType, RawResult, State};

use crate::alloc::track;
use crate::chunk::ChunkNode;
use crate::types::TypeNode;

/// Query result backed by a queue of pre-built chunks.
pub(crate) struct ResultNode {
    names: Vec<CString>,
    types: Vec<TypeNode>,
    chunks: VecDeque<Box<ChunkNode>>,
}

impl ResultNode {
    /// # Safety
    ///
    /// `raw` must be null or a live result handle of this engine.
    unsafe fn from_handle<'a>(raw: RawResult) -> Option<&'a mut ResultNode> {
        unsafe { raw.cast::<ResultNode>().as_mut() }
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_fetch_chunk(result: RawResult) -> RawDataChunk {
    unsafe { ResultNode::from_handle(result) }
        .and_then(|node| node.chunks.pop_front())
        .map_or(std::ptr::null_mut(), ChunkNode::into_handle)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_result_column_count(result: RawResult) -> u64 {
    unsafe { ResultNode::from_handle(result) }.map_or(0, |node| node.types.len() as u64)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_result_column_name(result: RawResult, index: u64) -> *const c_char {
    unsafe { ResultNode::from_handle(result) }
        .and_then(|node| node.names.get(index as usize))
        .map_or(std::ptr::null(), |name| name.as_ptr())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_result_column_type(result: RawResult, index: u64) -> RawLogicalType {
    unsafe { ResultNode::from_handle(result) }
        .and_then(|node| node.types.get(index as usize))
        .map_or(std::ptr::null_mut(), TypeNode::as_borrowed_handle)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_destroy_result(result: *mut RawResult) {
    if result.is_null() {
        return;
    }
    unsafe {
        let raw = *result;
        if !raw.is_null() {
            drop(Box::from_raw(raw.cast::<ResultNode>()));
            track(|live| live.results -= 1);
        }
        *result = std::ptr::null_mut();
    }
}

// ═══════════════════════════════════════════════════════════════
//  Result construction (memory engine only)
// ═══════════════════════════════════════════════════════════════

/// Create an empty result with the given column schema.
///
/// # Safety
///
/// `types` and `names` must each point to `count` valid entries. Both are
/// copied; the caller keeps ownership.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_memory_result_create(
    types: *const RawLogicalType,
    names: *const *const c_char,
    count: u64,
) -> RawResult {
    if count > 0 && (types.is_null() || names.is_null()) {
        return std::ptr::null_mut();
    }
    let mut node = ResultNode {
        names: Vec::with_capacity(count as usize),
        types: Vec::with_capacity(count as usize),
        chunks: VecDeque::new(),
    };
    for i in 0..count as usize {
        let (ty, name) = unsafe { (*types.add(i), *names.add(i)) };
        let Some(ty) = (unsafe { TypeNode::from_handle(ty) }) else {
            return std::ptr::null_mut();
        };
        if name.is_null() {
            return std::ptr::null_mut();
        }
        node.types.push(ty.clone());
        node.names.push(unsafe { CStr::from_ptr(name) }.to_owned());
    }
    track(|live| live.results += 1);
    Box::into_raw(Box::new(node)).cast()
}

/// Queue `chunk` behind the chunks already appended. Takes ownership of the
/// chunk on success; on error the caller still owns it.
///
/// # Safety
///
/// `result` must be a live result and `chunk` a live owned chunk handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_memory_result_append(result: RawResult, chunk: RawDataChunk) -> State {
    let Some(node) = (unsafe { ResultNode::from_handle(result) }) else {
        return QV_ERROR;
    };
    if chunk.is_null() {
        return QV_ERROR;
    }
    let chunk = unsafe { ChunkNode::from_owned(chunk) };
    let matches = chunk.vectors.len() == node.types.len()
        && chunk
            .vectors
            .iter()
            .zip(&node.types)
            .all(|(vector, ty)| vector.logical_type() == ty);
    if !matches {
        // Hand ownership back untouched.
        let _ = chunk.into_handle();
        return QV_ERROR;
    }
    node.chunks.push_back(chunk);
    QV_SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{qv_create_data_chunk, qv_destroy_data_chunk};
    use crate::types::{qv_create_logical_type, qv_destroy_logical_type};
    use quiver_abi::TypeTag;

    #[test]
    fn chunks_are_fetched_in_append_order() {
        let before = crate::live_handles();
        unsafe {
            let mut ty = qv_create_logical_type(TypeTag::Integer.as_raw());
            let names = [c"n".as_ptr()];
            let mut result = qv_memory_result_create([ty].as_ptr(), names.as_ptr(), 1);

            let first = qv_create_data_chunk([ty].as_ptr(), 1);
            let second = qv_create_data_chunk([ty].as_ptr(), 1);
            assert_eq!(qv_memory_result_append(result, first), QV_SUCCESS);
            assert_eq!(qv_memory_result_append(result, second), QV_SUCCESS);

            assert_eq!(qv_result_column_count(result), 1);
            assert_eq!(CStr::from_ptr(qv_result_column_name(result, 0)), c"n");
            assert!(qv_result_column_name(result, 1).is_null());

            let mut a = qv_fetch_chunk(result);
            assert_eq!(a, first);
            qv_destroy_data_chunk(&mut a);

            qv_destroy_logical_type(&mut ty);
            qv_destroy_result(&mut result);
        }
        assert_eq!(crate::live_handles(), before);
    }

    #[test]
    fn mismatched_chunk_is_rejected() {
        unsafe {
            let mut int = qv_create_logical_type(TypeTag::Integer.as_raw());
            let mut text = qv_create_logical_type(TypeTag::Varchar.as_raw());
            let names = [c"n".as_ptr()];
            let mut result = qv_memory_result_create([int].as_ptr(), names.as_ptr(), 1);
            let mut chunk = qv_create_data_chunk([text].as_ptr(), 1);

            assert_eq!(qv_memory_result_append(result, chunk), QV_ERROR);
            assert!(qv_fetch_chunk(result).is_null());

            qv_destroy_data_chunk(&mut chunk);
            qv_destroy_logical_type(&mut int);
            qv_destroy_logical_type(&mut text);
            qv_destroy_result(&mut result);
        }
    }
}
