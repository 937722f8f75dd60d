//! FlatBuffers table encoding for entity records.
//!
//! One record is one table. Properties are addressed by their field offset, which is the
//! byte offset of the property's slot inside the table's vtable (4, 6, 8, ...). The schema
//! compiler assigns these; this module never derives them.
//!
//! # Wire Format
//!
//! ```text
//! [u32 root offset] -> [table]
//!                        [i32 soffset]  vtable = table - soffset
//!                        [inline scalars and u32 offsets to payloads]
//!                      [vtable]
//!                        [u16 vtable size][u16 table size][u16 slot per field...]
//!                      [payloads]
//!                        string: [u32 len][utf-8 bytes][0]
//!                        bytes:  [u32 len][bytes]
//! ```
//!
//! A slot value of 0 means the property is absent, which is how nulls are encoded.
//!
//! # Write Order
//!
//! The builder fills its buffer from the back. Payloads are written first so that the
//! table can refer to them by already known offsets; the table header is opened after
//! the last payload and closed by [`TableBuilder::finish`].

pub(crate) mod buffer;
mod builder;
#[cfg(feature = "chrono_v0_4")]
mod date;
mod pool;
mod reader;
mod scalar;

pub use builder::{CollectingGuard, DataOffset, FieldOffset, TableBuilder};
pub use reader::TableReader;
pub use scalar::Scalar;

/// Size of an unsigned offset to a payload or to the root table.
pub(crate) const UOFFSET_SIZE: usize = 4;
/// Size of the signed offset from a table to its vtable.
pub(crate) const SOFFSET_SIZE: usize = 4;
/// Size of one vtable entry.
pub(crate) const VOFFSET_SIZE: usize = 2;
/// Field offset of the first property slot; the two entries before it hold the sizes.
pub(crate) const FIRST_FIELD_OFFSET: u16 = 4;
