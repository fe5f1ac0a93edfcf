//! Foundation types for snapshot layer inspection.
//!
//! Every other `snap-*` crate depends on `snap-types`. It holds the identity
//! type shared by headers, storage and the chain resolver, plus the block-size
//! rule the snapshot writer and readers must agree on.
//!
//! # Key Types
//!
//! - [`BuildId`] -- 16-byte identifier of one immutable snapshot layer
//! - [`TypeError`] -- parse failures for textual identifiers

pub mod build_id;
pub mod consts;
pub mod error;

pub use build_id::BuildId;
pub use consts::is_valid_block_size;
pub use error::TypeError;
