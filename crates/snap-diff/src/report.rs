//! Results of a diff run.

use serde::Serialize;

use snap_types::BuildId;

use crate::range::BlockRange;

/// How one layer sees one block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockClass {
    /// No layer up to this one ever mapped the block.
    Unmapped,
    /// The layer points at an ancestor's copy and stores nothing itself.
    Inherited { owner: BuildId },
    /// The layer stores a value no earlier layer had.
    Introduced,
    /// The layer stores bytes identical to the value first seen at
    /// `duplicates_generation`.
    Redundant { duplicates_generation: u64 },
}

impl BlockClass {
    /// `true` if the layer physically stores the block.
    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Introduced | Self::Redundant { .. })
    }
}

/// One layer's classification of one block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LayerCell {
    pub build_id: BuildId,
    pub generation: u64,
    pub class: BlockClass,
}

/// Every layer's classification of one block, root first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BlockReport {
    pub offset: u64,
    pub cells: Vec<LayerCell>,
}

impl BlockReport {
    pub fn redundant_layers(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| matches!(c.class, BlockClass::Redundant { .. }))
            .count()
    }
}

/// A block whose scan stopped on an error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BlockFailure {
    pub offset: u64,
    /// The layer being processed when the scan stopped. Nil when the
    /// worker died before it could name one.
    pub build_id: BuildId,
    pub cause: String,
}

/// Per-layer totals over the classified blocks.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LayerSummary {
    pub build_id: BuildId,
    pub generation: u64,
    pub owned: u64,
    pub introduced: u64,
    pub redundant: u64,
    pub inherited: u64,
    pub unmapped: u64,
    /// Bytes the layer stores that an ancestor already had.
    pub redundant_bytes: u64,
}

impl LayerSummary {
    pub fn new(build_id: BuildId, generation: u64) -> Self {
        Self {
            build_id,
            generation,
            ..Self::default()
        }
    }

    fn record(&mut self, class: &BlockClass, block_size: u64) {
        if class.is_owned() {
            self.owned += 1;
        }
        match class {
            BlockClass::Unmapped => self.unmapped += 1,
            BlockClass::Inherited { .. } => self.inherited += 1,
            BlockClass::Introduced => self.introduced += 1,
            BlockClass::Redundant { .. } => {
                self.redundant += 1;
                self.redundant_bytes += block_size;
            }
        }
    }
}

/// Outcome of one diff run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DiffReport {
    pub block_size: u64,
    pub range: BlockRange,
    /// Blocks in the requested range, scanned or not.
    pub total_blocks: u64,
    /// Classified blocks, sorted by offset.
    pub blocks: Vec<BlockReport>,
    pub summaries: Vec<LayerSummary>,
    /// Blocks whose scan stopped on an error, sorted by offset.
    pub failures: Vec<BlockFailure>,
    /// The run stopped early; `blocks` covers only what finished.
    pub cancelled: bool,
}

impl DiffReport {
    /// Assemble a report and compute the per-layer summaries.
    pub fn new(
        block_size: u64,
        range: BlockRange,
        layers: &[(BuildId, u64)],
        mut blocks: Vec<BlockReport>,
        mut failures: Vec<BlockFailure>,
        cancelled: bool,
    ) -> Self {
        blocks.sort_by_key(|b| b.offset);
        failures.sort_by_key(|f| f.offset);

        let mut summaries: Vec<LayerSummary> = layers
            .iter()
            .map(|&(id, generation)| LayerSummary::new(id, generation))
            .collect();
        for block in &blocks {
            for (summary, cell) in summaries.iter_mut().zip(&block.cells) {
                summary.record(&cell.class, block_size);
            }
        }

        Self {
            block_size,
            range,
            total_blocks: range.block_count(block_size),
            blocks,
            summaries,
            failures,
            cancelled,
        }
    }

    pub fn classified_blocks(&self) -> u64 {
        self.blocks.len() as u64
    }

    /// Blocks that at least one layer stores redundantly.
    pub fn redundant_blocks(&self) -> u64 {
        self.blocks
            .iter()
            .filter(|b| b.redundant_layers() > 0)
            .count() as u64
    }

    pub fn redundant_bytes(&self) -> u64 {
        self.summaries.iter().map(|s| s.redundant_bytes).sum()
    }

    /// Every block in the range was classified.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.failures.is_empty() && self.classified_blocks() == self.total_blocks
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
