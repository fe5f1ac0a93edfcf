use serde::{Deserialize, Serialize};

use crate::error::{DiffError, DiffResult};

/// Half-open byte range `[start, end)` of an address space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub start: u64,
    pub end: u64,
}

impl BlockRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Range covering blocks `[start_block, end_block)`.
    pub fn from_blocks(start_block: u64, end_block: u64, block_size: u64) -> DiffResult<Self> {
        let overflow = || DiffError::InvalidRange {
            start: start_block,
            end: end_block,
            reason: "block index overflows the address space".to_string(),
        };
        let start = start_block.checked_mul(block_size).ok_or_else(overflow)?;
        let end = end_block.checked_mul(block_size).ok_or_else(overflow)?;
        Ok(Self { start, end })
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Check alignment and bounds against a chain's geometry.
    pub fn validate(&self, block_size: u64, total_size: u64) -> DiffResult<()> {
        let invalid = |reason: String| DiffError::InvalidRange {
            start: self.start,
            end: self.end,
            reason,
        };
        if block_size == 0 {
            return Err(invalid("block size is zero".to_string()));
        }
        if self.start % block_size != 0 || self.end % block_size != 0 {
            return Err(invalid(format!(
                "bounds are not multiples of the block size {block_size}"
            )));
        }
        if self.start > self.end {
            return Err(invalid("start is after end".to_string()));
        }
        if self.end > total_size {
            return Err(invalid(format!(
                "end exceeds the address space of {total_size} bytes"
            )));
        }
        Ok(())
    }

    /// Number of blocks in the range.
    pub fn block_count(&self, block_size: u64) -> u64 {
        if block_size == 0 {
            return 0;
        }
        self.len() / block_size
    }

    /// Start offset of every block in the range, in order.
    pub fn offsets(&self, block_size: u64) -> impl Iterator<Item = u64> {
        let start = self.start;
        (0..self.block_count(block_size)).map(move |i| start + i * block_size)
    }
}
