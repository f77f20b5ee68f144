//! Columnar marshaling layer over a foreign engine ABI.
//!
//! Host code exchanges typed, possibly NULL, possibly nested data with a
//! columnar engine through the engine's own memory layout. Every wrapper
//! borrows the [`Engine`] it came from; owned wrappers release their handle
//! exactly once on drop, borrowed wrappers never do.
//!
//! ```no_run
//! use quiver::{Chunk, DataChunk, Engine, LogicalType, TypeTag};
//!
//! # fn main() -> quiver::Result<()> {
//! let engine = Engine::in_memory();
//! let ty = LogicalType::new(&engine, TypeTag::BigInt)?;
//! let mut chunk = DataChunk::new(&engine, &[ty])?;
//! chunk.encode_column(0, &[Some(1i64), None, Some(3)])?;
//! assert_eq!(chunk.decode_column::<i64>(0)?, vec![Some(1), None, Some(3)]);
//! # Ok(())
//! # }
//! ```

pub mod chunk;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod result;
pub mod types;
pub mod validity;
pub mod value;
pub mod vector;

pub use chunk::{Chunk, DataChunk, DataChunkRef};
pub use codec::{Decode, Encode, Typed, decode, decode_values, encode, encode_values};
pub use config::{EngineConfig, EngineKind, QuiverConfig};
pub use engine::{Engine, EngineBuffer};
pub use error::{Error, Result};
pub use quiver_abi::{Interval, ListEntry, TypeTag};
pub use result::{MaterializedResult, QueryResult, ResultCursor};
pub use types::{LogicalType, LogicalTypeRef, TypeHandle, types_equal};
pub use validity::{ValidityMask, WritableValidity};
pub use value::{Date, Scalar, Time, Timestamp, TimestampTz, Value};
pub use vector::{Primitive, SelectionVector, Vector, VectorHandle, VectorHandleMut, VectorMut, VectorRef};
