//! Entity table codec and native error bridge for embedded object databases.
//!
//! This crate sits between an object-mapping layer and the storage engine. It encodes
//! the typed, nullable properties of one object into a FlatBuffers table, reads such
//! tables back without copying, and guards every call into native code with a
//! configurable error policy.
//!
//! # Features
//!
//! - **Zero-copy reads**: [`TableReader`] borrows the record bytes and returns scalars,
//!   strings and byte vectors in place
//! - **Stable vtables**: [`TableBuilder`] forces defaults, so every collected property
//!   gets a slot even when it holds the type's zero value
//! - **Reusable builders**: [`TableBuilder::clear`] keeps the allocation, and
//!   [`TableBuilder::dequeue`] hands out a per-thread cached instance
//! - **Error policies**: [`ErrorBridge`] turns allocation failures, protocol violations,
//!   engine errors and panics into either a [`BridgeError`] or a fatal abort
//!
//! # Example
//!
//! ```rust
//! use flatentity::{TableBuilder, TableReader};
//!
//! let mut builder = TableBuilder::new();
//! builder.set_collecting(true);
//!
//! // Variable-length payloads first, then the table itself.
//! let name = builder.prepare_string("Alice").unwrap();
//! builder.collect_offset(name, 4).unwrap();
//! builder.collect_scalar(42_i32, 6).unwrap();
//! let bytes = builder.finish().unwrap().to_vec();
//! builder.set_collecting(false);
//!
//! let reader = TableReader::get_root(&bytes);
//! assert_eq!(reader.read_string(4), Some("Alice"));
//! assert_eq!(reader.read_scalar::<i32>(6), Some(42));
//! assert_eq!(reader.read_scalar::<i64>(8), None);
//! ```

pub mod bridge;
pub mod config;
mod error;
pub mod table;

pub use bridge::engine::{EngineError, EngineErrorSource, LastErrorCell, Severity};
pub use bridge::{CapturedFault, ErrorBridge};
pub use config::{BridgeConfig, BuilderConfig, FatalMode};
pub use error::{
    AllocationError, BridgeError, CodecError, ErrorKind, FatalError, Fault, ProtocolViolation,
};
pub use table::{CollectingGuard, DataOffset, FieldOffset, Scalar, TableBuilder, TableReader};

/// Whether builder protocol checks are compiled in.
///
/// Checks are active in debug builds and whenever the `checked` feature is enabled.
/// Release builds without the feature skip them and trust the caller.
pub const CHECKED: bool = cfg!(any(debug_assertions, feature = "checked"));
