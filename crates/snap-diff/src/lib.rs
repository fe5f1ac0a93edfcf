//! Redundancy detection for incremental snapshot chains.
//!
//! For every block in a range, the engine walks the chain from the root to
//! the leaf and classifies each layer's view of the block: unmapped,
//! inherited from an ancestor, a genuinely new value, or a byte-identical
//! copy of what an ancestor already stored. Redundant copies are wasted
//! storage in the incremental snapshot.
//!
//! # Key Types
//!
//! - [`DiffEngine`] / [`DiffConfig`] -- bounded-concurrency block scanner
//! - [`DiffReport`] / [`BlockReport`] / [`LayerSummary`] -- scan results
//! - [`BlockRange`] -- block-aligned byte range to scan
//! - [`render`] -- fixed-width text rendering of a report

pub mod engine;
pub mod error;
pub mod range;
pub mod render;
pub mod report;

pub use engine::{DiffConfig, DiffEngine};
pub use error::{DiffError, DiffResult};
pub use range::BlockRange;
pub use report::{BlockClass, BlockFailure, BlockReport, DiffReport, LayerCell, LayerSummary};
