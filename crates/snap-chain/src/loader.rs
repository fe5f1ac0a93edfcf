//! Bottom-up chain loading from a [`HeaderSource`].

use std::collections::HashSet;

use tracing::{debug, info};

use snap_header::Header;
use snap_store::HeaderSource;
use snap_types::BuildId;

use crate::error::{ChainError, ChainResult, ChainViolation};
use crate::resolver::ChainResolver;

/// Upper bound on the number of headers fetched for one chain.
pub const MAX_CHAIN_LENGTH: usize = 4096;

/// Load every header from `leaf` up to the root by following parent links.
///
/// Headers are fetched one at a time, leaf first, and returned root first.
/// A parent that was already visited is reported as a cycle instead of
/// looping forever.
pub async fn load_chain(source: &dyn HeaderSource, leaf: BuildId) -> ChainResult<Vec<Header>> {
    let mut visited = HashSet::new();
    let mut headers = Vec::new();
    let mut current = leaf;

    loop {
        if !visited.insert(current) {
            return Err(ChainError::invalid(current, ChainViolation::Cycle));
        }
        if headers.len() == MAX_CHAIN_LENGTH {
            return Err(ChainError::invalid(
                leaf,
                ChainViolation::TooLong {
                    limit: MAX_CHAIN_LENGTH,
                },
            ));
        }

        let header = source.read_header(current).await?;
        debug!(
            build = %current.short_id(),
            generation = header.generation(),
            "loaded chain layer"
        );
        let parent = header.parent_build_id();
        headers.push(header);

        match parent {
            Some(parent) => current = parent,
            None => break,
        }
    }

    headers.reverse();
    info!(leaf = %leaf, layers = headers.len(), "loaded chain");
    Ok(headers)
}

impl ChainResolver {
    /// Load the chain ending at `leaf` and validate it.
    pub async fn load(source: &dyn HeaderSource, leaf: BuildId) -> ChainResult<Self> {
        let headers = load_chain(source, leaf).await?;
        Self::new(headers)
    }
}
