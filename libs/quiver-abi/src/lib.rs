//! Binary contract between host code and a columnar engine.
//!
//! Everything here is layout: element structs that must match the engine
//! bit-for-bit, the closed set of type ids, opaque handle types and the
//! function table an engine exports. Behavior lives in the `quiver` crate.

pub mod ffi;
pub mod layout;
pub mod types;

pub use ffi::{EngineApi, QV_ABI_VERSION};
pub use layout::{Interval, ListEntry, StringElement};
pub use types::TypeTag;
