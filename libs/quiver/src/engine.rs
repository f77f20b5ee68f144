use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use libloading::{Library, Symbol};

use quiver_abi::ffi::{AbiVersionFn, EngineApi, QV_ABI_VERSION};

use crate::config::{EngineKind, QuiverConfig};
use crate::error::{Error, Result};

/// Where an engine's function table came from.
#[derive(Debug)]
enum Source {
    #[cfg(feature = "memory")]
    InMemory,
    /// Kept alive for as long as the table is callable.
    Library { path: PathBuf, _lib: Library },
    Custom,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(feature = "memory")]
            Source::InMemory => f.write_str("memory"),
            Source::Library { path, .. } => write!(f, "library:{}", path.display()),
            Source::Custom => f.write_str("custom"),
        }
    }
}

/// A columnar engine reachable through its [`EngineApi`] table.
///
/// Every wrapper in this crate borrows the engine it was created from, so an
/// engine always outlives the handles it produced. Chunk capacity is read
/// once here and treated as a constant afterwards.
pub struct Engine {
    api: EngineApi,
    vector_size: usize,
    source: Source,
}

impl Engine {
    /// The built-in in-process engine.
    #[cfg(feature = "memory")]
    pub fn in_memory() -> Self {
        Self::with_source(quiver_engine_memory::api(), Source::InMemory)
    }

    /// Wrap a function table provided by the embedding application.
    ///
    /// # Safety
    ///
    /// Every entry of `api` must implement the documented contract of the
    /// engine ABI, and must stay callable for the lifetime of the engine.
    pub unsafe fn from_api(api: EngineApi) -> Self {
        Self::with_source(api, Source::Custom)
    }

    /// Load an engine shared library, verify its ABI version and resolve the
    /// `qv_*` symbols.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let lib = unsafe { Library::new(path) }.map_err(|e| {
            Error::Config(format!("failed to load engine '{}': {e}", path.display()))
        })?;

        let abi_fn: Symbol<AbiVersionFn> = unsafe { lib.get(b"qv_abi_version") }.map_err(|e| {
            Error::Config(format!(
                "engine '{}' missing qv_abi_version symbol: {e}",
                path.display()
            ))
        })?;
        let engine_abi = unsafe { abi_fn() };
        if engine_abi != QV_ABI_VERSION {
            return Err(Error::Config(format!(
                "engine '{}' ABI version mismatch: engine={engine_abi}, host={QV_ABI_VERSION}",
                path.display()
            )));
        }

        let api = unsafe { resolve_api(&lib) }.map_err(|e| e.with_context(path.display()))?;
        Ok(Self::with_source(
            api,
            Source::Library {
                path: path.to_path_buf(),
                _lib: lib,
            },
        ))
    }

    /// Build the engine selected by `config` and check its chunk capacity.
    pub fn from_config(config: &QuiverConfig) -> Result<Self> {
        let engine = match config.engine.kind {
            #[cfg(feature = "memory")]
            EngineKind::Memory => Self::in_memory(),
            #[cfg(not(feature = "memory"))]
            EngineKind::Memory => {
                return Err(Error::Config(
                    "memory engine not compiled in (enable the `memory` feature)".into(),
                ));
            }
            EngineKind::Library => {
                let path = config.engine.path.as_ref().ok_or_else(|| {
                    Error::Config("engine.path is required when engine.kind = \"library\"".into())
                })?;
                Self::load(path)?
            }
        };

        if let Some(expected) = config.engine.expected_vector_size {
            if expected != engine.vector_size {
                return Err(Error::Config(format!(
                    "engine {} reports vector size {}, config expects {expected}",
                    engine.source, engine.vector_size
                )));
            }
        }
        Ok(engine)
    }

    fn with_source(api: EngineApi, source: Source) -> Self {
        let vector_size = unsafe { (api.vector_size)() } as usize;
        tracing::debug!(source = %source, vector_size, "engine ready");
        Self {
            api,
            vector_size,
            source,
        }
    }

    /// Maximum rows per chunk, as reported by the engine.
    pub fn vector_size(&self) -> usize {
        self.vector_size
    }

    /// Raw function table, for collaborators that call the engine directly.
    pub fn api(&self) -> &EngineApi {
        &self.api
    }

    #[cfg(feature = "memory")]
    pub(crate) fn is_in_memory(&self) -> bool {
        matches!(self.source, Source::InMemory)
    }

    /// Allocate `len` bytes through the engine's allocator.
    pub fn alloc(&self, len: usize) -> Result<EngineBuffer<'_>> {
        let ptr = unsafe { (self.api.malloc)(len) };
        let ptr = NonNull::new(ptr.cast::<u8>()).ok_or(Error::Allocation("engine buffer"))?;
        Ok(EngineBuffer {
            engine: self,
            ptr,
            len,
        })
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("source", &self.source.to_string())
            .field("vector_size", &self.vector_size)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Engine-allocated buffers
// ═══════════════════════════════════════════════════════════════

/// Memory owned by the engine allocator, released with the engine's `free`.
pub struct EngineBuffer<'e> {
    engine: &'e Engine,
    ptr: NonNull<u8>,
    len: usize,
}

impl EngineBuffer<'_> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Hand the allocation to the engine. It must later be released with the
    /// engine's `free`.
    pub fn into_raw(self) -> *mut c_void {
        let ptr = self.ptr.as_ptr().cast();
        std::mem::forget(self);
        ptr
    }
}

impl Drop for EngineBuffer<'_> {
    fn drop(&mut self) {
        unsafe { (self.engine.api.free)(self.ptr.as_ptr().cast()) };
    }
}

// ═══════════════════════════════════════════════════════════════
//  Symbol resolution
// ═══════════════════════════════════════════════════════════════

/// # Safety
///
/// `T` must be the function pointer type of the symbol `name`.
unsafe fn resolve<T: Copy>(lib: &Library, name: &str) -> Result<T> {
    let symbol: Symbol<T> = unsafe { lib.get(name.as_bytes()) }.map_err(|e| {
        Error::Config(format!(
            "missing {} symbol: {e}",
            name.trim_end_matches('\0')
        ))
    })?;
    Ok(*symbol)
}

macro_rules! resolve_api {
    ($lib:expr; $($field:ident),* $(,)?) => {
        EngineApi {
            $( $field: unsafe { resolve($lib, concat!("qv_", stringify!($field), "\0"))? }, )*
        }
    };
}

/// Resolve every table entry from `qv_<field>` symbols.
///
/// # Safety
///
/// The library must export each symbol with the signature of its field.
unsafe fn resolve_api(lib: &Library) -> Result<EngineApi> {
    Ok(resolve_api!(lib;
        vector_size, malloc, free,
        create_logical_type, create_list_type, create_array_type, create_map_type,
        create_struct_type, destroy_logical_type, get_type_id, list_type_child_type,
        array_type_child_type, array_type_array_size, map_type_key_type, map_type_value_type,
        struct_type_child_count, struct_type_child_type, struct_type_child_name,
        create_data_chunk, destroy_data_chunk, data_chunk_reset, data_chunk_get_column_count,
        data_chunk_get_vector, data_chunk_get_size, data_chunk_set_size,
        create_vector, destroy_vector, vector_get_column_type, vector_get_data,
        vector_get_validity, vector_ensure_validity_writable, vector_assign_string_element_len,
        list_vector_get_child, list_vector_get_size, list_vector_set_size, list_vector_reserve,
        struct_vector_get_child, array_vector_get_child, slice_vector, vector_copy_sel,
        vector_reference_value, vector_reference_vector,
        create_selection_vector, destroy_selection_vector, selection_vector_get_data_ptr,
        create_bool, create_int8, create_int16, create_int32, create_int64,
        create_uint8, create_uint16, create_uint32, create_uint64, create_float, create_double,
        create_date, create_time, create_timestamp, create_timestamp_tz, create_interval,
        create_varchar_length, create_null_value, destroy_value, get_value_type,
        fetch_chunk, result_column_count, result_column_name, result_column_type, destroy_result,
    ))
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;

    #[test]
    fn in_memory_reports_standard_vector_size() {
        let engine = Engine::in_memory();
        assert_eq!(engine.vector_size(), 2048);
        assert!(format!("{engine:?}").contains("memory"));
    }

    #[test]
    fn config_vector_size_mismatch_is_rejected() {
        let config = QuiverConfig::parse("[engine]\nexpected_vector_size = 1024\n").unwrap();
        let err = Engine::from_config(&config).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("1024")));

        let config = QuiverConfig::parse("[engine]\nexpected_vector_size = 2048\n").unwrap();
        assert!(Engine::from_config(&config).is_ok());
    }

    #[test]
    fn loading_missing_library_fails() {
        let err = Engine::load("/nonexistent/libquiver_engine.so").unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("failed to load engine")));
    }

    #[test]
    fn custom_table_is_accepted() {
        let engine = unsafe { Engine::from_api(quiver_engine_memory::api()) };
        assert_eq!(engine.vector_size(), 2048);
    }

    #[test]
    fn engine_buffers_are_writable() {
        let engine = Engine::in_memory();
        let mut buffer = engine.alloc(32).unwrap();
        assert_eq!(buffer.len(), 32);
        buffer.as_mut_slice().fill(9);
        assert!(buffer.as_slice().iter().all(|b| *b == 9));
    }
}
