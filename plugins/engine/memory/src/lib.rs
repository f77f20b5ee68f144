//! In-process columnar engine implementing the quiver engine ABI.
//!
//! Built as an `rlib` for direct linking (`api()`) and as a `cdylib` that
//! exports every entry as a `qv_*` symbol for dynamic loading. Layouts match
//! the production engine bit-for-bit: 16-byte string and list elements,
//! 64-bit validity words, a chunk capacity of 2048 rows.
//!
//! Slicing materializes a flat copy instead of building a dictionary view.

mod alloc;
mod chunk;
mod result;
mod types;
mod value;
mod vector;

use quiver_abi::EngineApi;

pub use alloc::{LiveHandles, live_handles};
pub use result::{qv_memory_result_append, qv_memory_result_create};

/// Rows per chunk.
pub const STANDARD_VECTOR_SIZE: usize = 2048;

quiver_abi::qv_abi_version_fn!();

#[unsafe(no_mangle)]
pub unsafe extern "C" fn qv_vector_size() -> u64 {
    STANDARD_VECTOR_SIZE as u64
}

/// Function table of the in-process engine.
pub fn api() -> EngineApi {
    EngineApi {
        vector_size: qv_vector_size,
        malloc: alloc::qv_malloc,
        free: alloc::qv_free,

        create_logical_type: types::qv_create_logical_type,
        create_list_type: types::qv_create_list_type,
        create_array_type: types::qv_create_array_type,
        create_map_type: types::qv_create_map_type,
        create_struct_type: types::qv_create_struct_type,
        destroy_logical_type: types::qv_destroy_logical_type,
        get_type_id: types::qv_get_type_id,
        list_type_child_type: types::qv_list_type_child_type,
        array_type_child_type: types::qv_array_type_child_type,
        array_type_array_size: types::qv_array_type_array_size,
        map_type_key_type: types::qv_map_type_key_type,
        map_type_value_type: types::qv_map_type_value_type,
        struct_type_child_count: types::qv_struct_type_child_count,
        struct_type_child_type: types::qv_struct_type_child_type,
        struct_type_child_name: types::qv_struct_type_child_name,

        create_data_chunk: chunk::qv_create_data_chunk,
        destroy_data_chunk: chunk::qv_destroy_data_chunk,
        data_chunk_reset: chunk::qv_data_chunk_reset,
        data_chunk_get_column_count: chunk::qv_data_chunk_get_column_count,
        data_chunk_get_vector: chunk::qv_data_chunk_get_vector,
        data_chunk_get_size: chunk::qv_data_chunk_get_size,
        data_chunk_set_size: chunk::qv_data_chunk_set_size,

        create_vector: vector::qv_create_vector,
        destroy_vector: vector::qv_destroy_vector,
        vector_get_column_type: vector::qv_vector_get_column_type,
        vector_get_data: vector::qv_vector_get_data,
        vector_get_validity: vector::qv_vector_get_validity,
        vector_ensure_validity_writable: vector::qv_vector_ensure_validity_writable,
        vector_assign_string_element_len: vector::qv_vector_assign_string_element_len,
        list_vector_get_child: vector::qv_list_vector_get_child,
        list_vector_get_size: vector::qv_list_vector_get_size,
        list_vector_set_size: vector::qv_list_vector_set_size,
        list_vector_reserve: vector::qv_list_vector_reserve,
        struct_vector_get_child: vector::qv_struct_vector_get_child,
        array_vector_get_child: vector::qv_array_vector_get_child,
        slice_vector: vector::qv_slice_vector,
        vector_copy_sel: vector::qv_vector_copy_sel,
        vector_reference_value: vector::qv_vector_reference_value,
        vector_reference_vector: vector::qv_vector_reference_vector,

        create_selection_vector: vector::qv_create_selection_vector,
        destroy_selection_vector: vector::qv_destroy_selection_vector,
        selection_vector_get_data_ptr: vector::qv_selection_vector_get_data_ptr,

        create_bool: value::qv_create_bool,
        create_int8: value::qv_create_int8,
        create_int16: value::qv_create_int16,
        create_int32: value::qv_create_int32,
        create_int64: value::qv_create_int64,
        create_uint8: value::qv_create_uint8,
        create_uint16: value::qv_create_uint16,
        create_uint32: value::qv_create_uint32,
        create_uint64: value::qv_create_uint64,
        create_float: value::qv_create_float,
        create_double: value::qv_create_double,
        create_date: value::qv_create_date,
        create_time: value::qv_create_time,
        create_timestamp: value::qv_create_timestamp,
        create_timestamp_tz: value::qv_create_timestamp_tz,
        create_interval: value::qv_create_interval,
        create_varchar_length: value::qv_create_varchar_length,
        create_null_value: value::qv_create_null_value,
        destroy_value: value::qv_destroy_value,
        get_value_type: value::qv_get_value_type,

        fetch_chunk: result::qv_fetch_chunk,
        result_column_count: result::qv_result_column_count,
        result_column_name: result::qv_result_column_name,
        result_column_type: result::qv_result_column_type,
        destroy_result: result::qv_destroy_result,
    }
}
