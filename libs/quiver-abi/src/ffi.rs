use std::ffi::{c_char, c_void};

use crate::layout::Interval;

// ════════════════════════════════════════════════════════════════
//  ABI Version
// ════════════════════════════════════════════════════════════════

/// Version of the engine function table.
///
/// Bump whenever a function is added, removed, reordered or changes its
/// signature, or when any `#[repr(C)]` element layout changes.
pub const QV_ABI_VERSION: u32 = 1;

/// Signature of the `qv_abi_version` symbol exported by an engine library.
pub type AbiVersionFn = unsafe extern "C" fn() -> u32;

/// Return code for fallible engine calls.
pub type State = u32;
pub const QV_SUCCESS: State = 0;
pub const QV_ERROR: State = 1;

// ════════════════════════════════════════════════════════════════
//  Opaque handles
// ════════════════════════════════════════════════════════════════

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $opaque:ident, $raw:ident) => {
        $(#[$meta])*
        #[repr(C)]
        pub struct $opaque {
            _private: [u8; 0],
        }

        pub type $raw = *mut $opaque;
    };
}

opaque_handle!(
    /// Logical type handle.
    OpaqueLogicalType,
    RawLogicalType
);
opaque_handle!(
    /// Column vector handle.
    OpaqueVector,
    RawVector
);
opaque_handle!(
    /// Data chunk handle.
    OpaqueDataChunk,
    RawDataChunk
);
opaque_handle!(
    /// Scalar value handle.
    OpaqueValue,
    RawValue
);
opaque_handle!(
    /// Selection vector handle.
    OpaqueSelection,
    RawSelection
);
opaque_handle!(
    /// Query result handle.
    OpaqueResult,
    RawResult
);

// ════════════════════════════════════════════════════════════════
//  Function table
// ════════════════════════════════════════════════════════════════

/// Function table of an engine.
///
/// A dynamically loaded engine exports each entry as a symbol named
/// `qv_<field>` (e.g. `qv_vector_get_data`). Handles documented as
/// "borrowed" are owned by their parent and must never be destroyed.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct EngineApi {
    /// Maximum rows per chunk. Constant for the process lifetime.
    pub vector_size: unsafe extern "C" fn() -> u64,
    pub malloc: unsafe extern "C" fn(size: usize) -> *mut c_void,
    pub free: unsafe extern "C" fn(ptr: *mut c_void),

    // Logical types
    /// Plain type from an id. Parameterized ids yield an `INVALID` type.
    pub create_logical_type: unsafe extern "C" fn(type_id: u32) -> RawLogicalType,
    /// Copies `child`; the caller keeps ownership of its argument.
    pub create_list_type: unsafe extern "C" fn(child: RawLogicalType) -> RawLogicalType,
    pub create_array_type:
        unsafe extern "C" fn(child: RawLogicalType, size: u64) -> RawLogicalType,
    pub create_map_type:
        unsafe extern "C" fn(key: RawLogicalType, value: RawLogicalType) -> RawLogicalType,
    pub create_struct_type: unsafe extern "C" fn(
        members: *const RawLogicalType,
        names: *const *const c_char,
        count: u64,
    ) -> RawLogicalType,
    /// Frees the type and nulls `*ty`.
    pub destroy_logical_type: unsafe extern "C" fn(ty: *mut RawLogicalType),
    pub get_type_id: unsafe extern "C" fn(ty: RawLogicalType) -> u32,
    /// Borrowed.
    pub list_type_child_type: unsafe extern "C" fn(ty: RawLogicalType) -> RawLogicalType,
    /// Borrowed.
    pub array_type_child_type: unsafe extern "C" fn(ty: RawLogicalType) -> RawLogicalType,
    pub array_type_array_size: unsafe extern "C" fn(ty: RawLogicalType) -> u64,
    /// Borrowed.
    pub map_type_key_type: unsafe extern "C" fn(ty: RawLogicalType) -> RawLogicalType,
    /// Borrowed.
    pub map_type_value_type: unsafe extern "C" fn(ty: RawLogicalType) -> RawLogicalType,
    pub struct_type_child_count: unsafe extern "C" fn(ty: RawLogicalType) -> u64,
    /// Borrowed.
    pub struct_type_child_type:
        unsafe extern "C" fn(ty: RawLogicalType, index: u64) -> RawLogicalType,
    /// Borrowed NUL-terminated name.
    pub struct_type_child_name: unsafe extern "C" fn(ty: RawLogicalType, index: u64) -> *const c_char,

    // Data chunks
    pub create_data_chunk:
        unsafe extern "C" fn(types: *const RawLogicalType, count: u64) -> RawDataChunk,
    pub destroy_data_chunk: unsafe extern "C" fn(chunk: *mut RawDataChunk),
    /// Row count to 0, validity cleared, list children emptied.
    pub data_chunk_reset: unsafe extern "C" fn(chunk: RawDataChunk),
    pub data_chunk_get_column_count: unsafe extern "C" fn(chunk: RawDataChunk) -> u64,
    /// Borrowed.
    pub data_chunk_get_vector: unsafe extern "C" fn(chunk: RawDataChunk, index: u64) -> RawVector,
    pub data_chunk_get_size: unsafe extern "C" fn(chunk: RawDataChunk) -> u64,
    pub data_chunk_set_size: unsafe extern "C" fn(chunk: RawDataChunk, size: u64),

    // Vectors
    pub create_vector: unsafe extern "C" fn(ty: RawLogicalType, capacity: u64) -> RawVector,
    pub destroy_vector: unsafe extern "C" fn(vector: *mut RawVector),
    /// Borrowed.
    pub vector_get_column_type: unsafe extern "C" fn(vector: RawVector) -> RawLogicalType,
    pub vector_get_data: unsafe extern "C" fn(vector: RawVector) -> *mut c_void,
    /// Null when every row is valid.
    pub vector_get_validity: unsafe extern "C" fn(vector: RawVector) -> *mut u64,
    pub vector_ensure_validity_writable: unsafe extern "C" fn(vector: RawVector),
    /// The engine decides between inline and pointer encoding.
    pub vector_assign_string_element_len:
        unsafe extern "C" fn(vector: RawVector, index: u64, data: *const c_char, len: u64),
    /// Borrowed.
    pub list_vector_get_child: unsafe extern "C" fn(vector: RawVector) -> RawVector,
    pub list_vector_get_size: unsafe extern "C" fn(vector: RawVector) -> u64,
    pub list_vector_set_size: unsafe extern "C" fn(vector: RawVector, size: u64) -> State,
    /// May move the child's buffers; previously read child pointers are stale.
    pub list_vector_reserve: unsafe extern "C" fn(vector: RawVector, capacity: u64) -> State,
    /// Borrowed.
    pub struct_vector_get_child: unsafe extern "C" fn(vector: RawVector, index: u64) -> RawVector,
    /// Borrowed.
    pub array_vector_get_child: unsafe extern "C" fn(vector: RawVector) -> RawVector,
    pub slice_vector: unsafe extern "C" fn(vector: RawVector, sel: RawSelection, len: u64),
    pub vector_copy_sel: unsafe extern "C" fn(
        src: RawVector,
        dst: RawVector,
        sel: RawSelection,
        src_count: u64,
        src_offset: u64,
        dst_offset: u64,
    ),
    pub vector_reference_value: unsafe extern "C" fn(vector: RawVector, value: RawValue),
    /// `to` shares `from`'s storage afterwards.
    pub vector_reference_vector: unsafe extern "C" fn(to: RawVector, from: RawVector),

    // Selection vectors
    pub create_selection_vector: unsafe extern "C" fn(size: u64) -> RawSelection,
    pub destroy_selection_vector: unsafe extern "C" fn(sel: RawSelection),
    pub selection_vector_get_data_ptr: unsafe extern "C" fn(sel: RawSelection) -> *mut u32,

    // Values
    pub create_bool: unsafe extern "C" fn(value: bool) -> RawValue,
    pub create_int8: unsafe extern "C" fn(value: i8) -> RawValue,
    pub create_int16: unsafe extern "C" fn(value: i16) -> RawValue,
    pub create_int32: unsafe extern "C" fn(value: i32) -> RawValue,
    pub create_int64: unsafe extern "C" fn(value: i64) -> RawValue,
    pub create_uint8: unsafe extern "C" fn(value: u8) -> RawValue,
    pub create_uint16: unsafe extern "C" fn(value: u16) -> RawValue,
    pub create_uint32: unsafe extern "C" fn(value: u32) -> RawValue,
    pub create_uint64: unsafe extern "C" fn(value: u64) -> RawValue,
    pub create_float: unsafe extern "C" fn(value: f32) -> RawValue,
    pub create_double: unsafe extern "C" fn(value: f64) -> RawValue,
    pub create_date: unsafe extern "C" fn(days: i32) -> RawValue,
    pub create_time: unsafe extern "C" fn(micros: i64) -> RawValue,
    pub create_timestamp: unsafe extern "C" fn(micros: i64) -> RawValue,
    pub create_timestamp_tz: unsafe extern "C" fn(micros: i64) -> RawValue,
    pub create_interval: unsafe extern "C" fn(value: Interval) -> RawValue,
    pub create_varchar_length: unsafe extern "C" fn(data: *const c_char, len: u64) -> RawValue,
    pub create_null_value: unsafe extern "C" fn() -> RawValue,
    pub destroy_value: unsafe extern "C" fn(value: *mut RawValue),
    /// Borrowed.
    pub get_value_type: unsafe extern "C" fn(value: RawValue) -> RawLogicalType,

    // Results
    /// Owned by the caller; null once the result is exhausted.
    pub fetch_chunk: unsafe extern "C" fn(result: RawResult) -> RawDataChunk,
    pub result_column_count: unsafe extern "C" fn(result: RawResult) -> u64,
    /// Borrowed NUL-terminated name; null for an out-of-range index.
    pub result_column_name: unsafe extern "C" fn(result: RawResult, index: u64) -> *const c_char,
    /// Borrowed; null for an out-of-range index.
    pub result_column_type: unsafe extern "C" fn(result: RawResult, index: u64) -> RawLogicalType,
    pub destroy_result: unsafe extern "C" fn(result: *mut RawResult),
}

/// Macro: export `qv_abi_version` from an engine library.
#[macro_export]
macro_rules! qv_abi_version_fn {
    () => {
        #[unsafe(no_mangle)]
        pub extern "C" fn qv_abi_version() -> u32 {
            $crate::ffi::QV_ABI_VERSION
        }
    };
}
