//! Snapshot layer headers.
//!
//! A header describes one layer of an incremental memory snapshot: its
//! metadata (identity, parent, generation, block geometry) and a mapping that
//! partitions the layer's address space into block-aligned ranges, each
//! tagged with the build that physically stores those bytes.
//!
//! # Architecture
//!
//! - [`Header`]: validated metadata + mapping, immutable once built
//! - [`codec`]: versioned, CRC-checked binary encoding (`encode` / `decode`)
//! - [`MappingIndex`]: sorted start offsets for O(log n) ownership lookups
//!
//! # Invariants
//!
//! Every `Header` that exists has passed validation: the block size is a
//! power of two, entries are block-aligned, sorted, non-overlapping, and
//! cover `[0, total_size)` exactly.

pub mod codec;
pub mod error;
pub mod header;
pub mod index;
pub mod mapping;
pub mod metadata;

pub use codec::{decode, encode, HEADER_MAGIC, HEADER_VERSION};
pub use error::{HeaderError, HeaderResult};
pub use header::Header;
pub use index::{MappingIndex, ShiftedMapping};
pub use mapping::MappingEntry;
pub use metadata::Metadata;
