use snap_types::BuildId;

use crate::error::{HeaderError, HeaderResult};
use crate::header::Header;
use crate::mapping::MappingEntry;

/// Result of a shifted-mapping lookup within a single header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShiftedMapping {
    /// Build whose object holds the bytes (nil when unmapped).
    pub owner: BuildId,
    /// Offset inside the owner's object. Blocks are never relocated within
    /// a layer, so this equals the logical offset.
    pub local_offset: u64,
    /// Bytes left in the mapping entry from `local_offset`.
    pub remaining: u64,
}

/// Read-only ownership index over one header.
///
/// Keeps the entry start offsets in a sorted vector and answers
/// "who owns offset X" with a binary search. Immutable once built, so it can
/// be shared freely across threads.
#[derive(Clone, Debug)]
pub struct MappingIndex {
    header: Header,
    starts: Vec<u64>,
}

impl MappingIndex {
    pub fn new(header: Header) -> Self {
        let starts = header.mappings().iter().map(|e| e.start).collect();
        Self { header, starts }
    }

    /// The entry covering `offset`.
    pub fn lookup(&self, offset: u64) -> HeaderResult<&MappingEntry> {
        if offset >= self.header.total_size() {
            return Err(self.out_of_range(offset));
        }
        let pos = self.starts.partition_point(|&start| start <= offset);
        pos.checked_sub(1)
            .and_then(|i| self.header.mappings().get(i))
            .ok_or_else(|| self.out_of_range(offset))
    }

    pub fn shifted_mapping(&self, offset: u64) -> HeaderResult<ShiftedMapping> {
        let entry = self.lookup(offset)?;
        Ok(ShiftedMapping {
            owner: entry.owner,
            local_offset: offset,
            remaining: entry.end - offset,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn build_id(&self) -> BuildId {
        self.header.build_id()
    }

    /// Number of mapping entries.
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    fn out_of_range(&self, offset: u64) -> HeaderError {
        HeaderError::OutOfRange {
            build_id: self.header.build_id(),
            offset,
            total_size: self.header.total_size(),
        }
    }
}
