use serde::{Deserialize, Serialize};

use snap_types::BuildId;

/// A block-aligned half-open range `[start, end)` and the build whose
/// object physically stores its bytes.
///
/// The owner is the layer itself, one of its ancestors, or the nil id for
/// ranges that were never mapped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MappingEntry {
    pub start: u64,
    pub end: u64,
    pub owner: BuildId,
}

impl MappingEntry {
    pub fn new(start: u64, end: u64, owner: BuildId) -> Self {
        Self { start, end, owner }
    }

    /// Length of the range in bytes.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, offset: u64) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Unmapped ranges carry the nil owner.
    pub fn is_unmapped(&self) -> bool {
        self.owner.is_nil()
    }
}
