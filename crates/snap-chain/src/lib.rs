//! Snapshot chains.
//!
//! A chain is the ordered list of layers from the root snapshot to a leaf,
//! linked by parent build ids. Each layer's header says which build owns
//! each block; a build may point at an ancestor, which may in turn point
//! further back. [`ChainResolver`] validates a chain once and then answers
//! "which build physically stores block X as seen from layer L".
//! [`load_chain`] fetches a chain's headers from storage, leaf first.
//!
//! # Invariants (checked by [`ChainResolver::new`])
//!
//! - Parent links form a simple path: one leaf, one root, no cycles.
//! - Generations start at 0 and strictly increase towards the leaf.
//! - Every layer shares the root's block size and base build id.

pub mod error;
pub mod loader;
pub mod resolver;

pub use error::{ChainError, ChainResult, ChainViolation};
pub use loader::{load_chain, MAX_CHAIN_LENGTH};
pub use resolver::{ChainResolver, Ownership};
