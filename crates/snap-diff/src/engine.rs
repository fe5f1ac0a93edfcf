//! Bounded-concurrency block scanner.
//!
//! Each block is scanned independently: the layers are visited root first,
//! carrying the last distinct value seen so far. Blocks run in parallel on a
//! [`JoinSet`], with a [`Semaphore`] capping how many are in flight (and so
//! how many remote reads are outstanding).

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use snap_chain::{ChainResolver, Ownership};
use snap_store::BlockSource;
use snap_types::BuildId;

use crate::error::{DiffError, DiffResult};
use crate::range::BlockRange;
use crate::report::{BlockClass, BlockFailure, BlockReport, DiffReport, LayerCell};

/// Default number of blocks scanned concurrently.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    /// Upper bound on blocks in flight. Zero is treated as one.
    pub max_concurrency: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

/// Classifies every block of a range across a validated chain.
pub struct DiffEngine {
    chain: Arc<ChainResolver>,
    source: Arc<dyn BlockSource>,
    config: DiffConfig,
}

impl DiffEngine {
    pub fn new(chain: Arc<ChainResolver>, source: Arc<dyn BlockSource>, config: DiffConfig) -> Self {
        Self {
            chain,
            source,
            config,
        }
    }

    pub fn chain(&self) -> &ChainResolver {
        &self.chain
    }

    pub fn config(&self) -> &DiffConfig {
        &self.config
    }

    /// Scan `range` and classify each block in every layer.
    ///
    /// Range and ownership problems abort the run before any block is read.
    /// Once `cancel` reads `true`, no further block is started; blocks
    /// already in flight finish and the partial report is returned with
    /// `cancelled` set.
    pub async fn run(&self, range: BlockRange, cancel: watch::Receiver<bool>) -> DiffResult<DiffReport> {
        let block_size = self.chain.block_size();
        range.validate(block_size, self.chain.leaf().header().total_size())?;
        self.chain.verify_owners()?;

        info!(
            layers = self.chain.len(),
            start = range.start,
            end = range.end,
            block_size,
            concurrency = self.config.max_concurrency,
            "starting diff"
        );

        let permits = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut offsets = HashMap::new();
        let mut cancelled = false;

        for offset in range.offsets(block_size) {
            let permit = permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| DiffError::Worker(e.to_string()))?;
            if *cancel.borrow() {
                cancelled = true;
                break;
            }

            let chain = Arc::clone(&self.chain);
            let source = Arc::clone(&self.source);
            let handle = tasks.spawn(async move {
                let result = scan_block(&chain, source.as_ref(), offset, block_size).await;
                drop(permit);
                result
            });
            offsets.insert(handle.id(), offset);
        }
        if cancelled {
            info!(in_flight = tasks.len(), "diff cancelled, draining in-flight blocks");
        }

        let mut blocks = Vec::new();
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            // A worker that panicked still counts as a failed block.
            let outcome = joined.unwrap_or_else(|e| {
                Err(BlockFailure {
                    offset: offsets.get(&e.id()).copied().unwrap_or_default(),
                    build_id: BuildId::nil(),
                    cause: format!("block worker failed: {e}"),
                })
            });
            match outcome {
                Ok(block) => blocks.push(block),
                Err(failure) => {
                    warn!(
                        offset = failure.offset,
                        build = %failure.build_id,
                        cause = %failure.cause,
                        "block scan failed"
                    );
                    failures.push(failure);
                }
            }
        }

        let layers: Vec<(BuildId, u64)> = self
            .chain
            .layers()
            .iter()
            .map(|l| (l.build_id(), l.header().generation()))
            .collect();
        let report = DiffReport::new(block_size, range, &layers, blocks, failures, cancelled);
        info!(
            classified = report.classified_blocks(),
            failed = report.failures.len(),
            redundant_bytes = report.redundant_bytes(),
            cancelled,
            "diff finished"
        );
        Ok(report)
    }
}

/// Last distinct value seen while walking one block towards the leaf.
struct Seen {
    bytes: Bytes,
    generation: u64,
}

async fn scan_block(
    chain: &ChainResolver,
    source: &dyn BlockSource,
    offset: u64,
    block_size: u64,
) -> Result<BlockReport, BlockFailure> {
    let mut cells = Vec::with_capacity(chain.len());
    let mut last: Option<Seen> = None;

    for (position, layer) in chain.layers().iter().enumerate() {
        let build_id = layer.build_id();
        let generation = layer.header().generation();
        let fail = move |cause: String| BlockFailure {
            offset,
            build_id,
            cause,
        };

        let class = if offset >= layer.header().total_size() {
            BlockClass::Unmapped
        } else {
            let ownership = chain
                .resolve_at(position, offset)
                .map_err(|e| fail(e.to_string()))?;
            match ownership {
                Ownership::Unmapped => BlockClass::Unmapped,
                Ownership::Stored { owner, .. } if owner != build_id => BlockClass::Inherited { owner },
                Ownership::Stored {
                    owner,
                    local_offset,
                } => {
                    let bytes = source
                        .read_block(owner, local_offset, block_size)
                        .await
                        .map_err(|e| fail(e.to_string()))?;
                    let duplicate = last
                        .as_ref()
                        .filter(|seen| seen.bytes == bytes)
                        .map(|seen| seen.generation);
                    match duplicate {
                        Some(duplicates_generation) => BlockClass::Redundant {
                            duplicates_generation,
                        },
                        None => {
                            last = Some(Seen { bytes, generation });
                            BlockClass::Introduced
                        }
                    }
                }
            }
        };
        cells.push(LayerCell {
            build_id,
            generation,
            class,
        });
    }

    debug!(offset, layers = cells.len(), "scanned block");
    Ok(BlockReport { offset, cells })
}
