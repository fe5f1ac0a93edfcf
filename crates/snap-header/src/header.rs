use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use snap_types::{is_valid_block_size, BuildId};

use crate::error::{HeaderError, HeaderResult};
use crate::mapping::MappingEntry;
use crate::metadata::Metadata;

/// Metadata plus the block ownership mapping of one snapshot layer.
///
/// Construction always validates, so a `Header` value is structurally sound:
/// - the block size is a non-zero power of two and divides `total_size`;
/// - mapping entries are block-aligned, sorted and non-overlapping;
/// - their union is exactly `[0, total_size)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawHeader")]
pub struct Header {
    metadata: Metadata,
    mappings: Vec<MappingEntry>,
}

/// Unvalidated wire shape; only reachable through [`Header::new`].
#[derive(Deserialize)]
struct RawHeader {
    metadata: Metadata,
    mappings: Vec<MappingEntry>,
}

impl TryFrom<RawHeader> for Header {
    type Error = HeaderError;

    fn try_from(raw: RawHeader) -> HeaderResult<Self> {
        Self::new(raw.metadata, raw.mappings)
    }
}

impl Header {
    /// Validate and assemble a header.
    pub fn new(metadata: Metadata, mappings: Vec<MappingEntry>) -> HeaderResult<Self> {
        validate(&metadata, &mappings)?;
        Ok(Self { metadata, mappings })
    }

    /// A root layer that owns every block of its address space.
    pub fn root(build_id: BuildId, block_size: u32, total_size: u64) -> HeaderResult<Self> {
        let metadata = Metadata::root(build_id, block_size, total_size);
        let mappings = if total_size == 0 {
            Vec::new()
        } else {
            vec![MappingEntry::new(0, total_size, build_id)]
        };
        Self::new(metadata, mappings)
    }

    /// Build a header from one owner per block, coalescing adjacent blocks
    /// that share an owner into a single entry.
    pub fn from_block_owners(metadata: Metadata, owners: &[BuildId]) -> HeaderResult<Self> {
        let block_len = metadata.block_len();
        if owners.len() as u64 != metadata.block_count() {
            return Err(HeaderError::corrupted(
                Some(metadata.build_id),
                format!(
                    "{} block owners supplied for {} blocks",
                    owners.len(),
                    metadata.block_count()
                ),
            ));
        }

        let mut mappings = Vec::new();
        for (i, owner) in owners.iter().enumerate() {
            let start = i as u64 * block_len;
            push_coalesced(&mut mappings, MappingEntry::new(start, start + block_len, *owner));
        }
        Self::new(metadata, mappings)
    }

    /// The header a snapshot of a direct child layer would carry.
    ///
    /// `dirty_blocks` holds block indices the child rewrote; those become
    /// owned by `child_id`. Every other block keeps this layer's owner.
    pub fn derive_child(&self, child_id: BuildId, dirty_blocks: &BTreeSet<u64>) -> HeaderResult<Self> {
        let block_len = self.metadata.block_len();
        let block_count = self.metadata.block_count();
        if let Some(&last) = dirty_blocks.iter().next_back() {
            if last >= block_count {
                return Err(HeaderError::OutOfRange {
                    build_id: self.metadata.build_id,
                    offset: last.saturating_mul(block_len),
                    total_size: self.metadata.total_size,
                });
            }
        }

        let mut mappings = Vec::with_capacity(self.mappings.len() + dirty_blocks.len() * 2);
        for entry in &self.mappings {
            let mut cursor = entry.start;
            for &block in dirty_blocks.range(entry.start / block_len..entry.end / block_len) {
                let offset = block * block_len;
                if offset > cursor {
                    push_coalesced(&mut mappings, MappingEntry::new(cursor, offset, entry.owner));
                }
                push_coalesced(&mut mappings, MappingEntry::new(offset, offset + block_len, child_id));
                cursor = offset + block_len;
            }
            if cursor < entry.end {
                push_coalesced(&mut mappings, MappingEntry::new(cursor, entry.end, entry.owner));
            }
        }

        debug!(
            parent = %self.metadata.build_id.short_id(),
            child = %child_id.short_id(),
            dirty = dirty_blocks.len(),
            entries = mappings.len(),
            "derived child header"
        );
        Self::new(self.metadata.child(child_id), mappings)
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn mappings(&self) -> &[MappingEntry] {
        &self.mappings
    }

    pub fn build_id(&self) -> BuildId {
        self.metadata.build_id
    }

    pub fn parent_build_id(&self) -> Option<BuildId> {
        self.metadata.parent_build_id
    }

    pub fn generation(&self) -> u64 {
        self.metadata.generation
    }

    pub fn block_size(&self) -> u32 {
        self.metadata.block_size
    }

    pub fn total_size(&self) -> u64 {
        self.metadata.total_size
    }

    /// Number of blocks this layer itself stores.
    pub fn owned_blocks(&self) -> u64 {
        let block_len = self.metadata.block_len();
        self.mappings
            .iter()
            .filter(|e| e.owner == self.metadata.build_id)
            .map(|e| e.len() / block_len)
            .sum()
    }
}

/// Append an entry, merging it into the previous one when contiguous and
/// owned by the same build.
fn push_coalesced(mappings: &mut Vec<MappingEntry>, entry: MappingEntry) {
    if let Some(last) = mappings.last_mut() {
        if last.owner == entry.owner && last.end == entry.start {
            last.end = entry.end;
            return;
        }
    }
    mappings.push(entry);
}

fn validate(metadata: &Metadata, mappings: &[MappingEntry]) -> HeaderResult<()> {
    let id = Some(metadata.build_id);
    let block_len = metadata.block_len();

    if metadata.build_id.is_nil() {
        return Err(HeaderError::corrupted(None, "build id is nil"));
    }
    if !is_valid_block_size(block_len) {
        return Err(HeaderError::corrupted(
            id,
            format!("block size {} is not a power of two", metadata.block_size),
        ));
    }
    if metadata.total_size % block_len != 0 {
        return Err(HeaderError::corrupted(
            id,
            format!(
                "total size {} is not a multiple of block size {}",
                metadata.total_size, metadata.block_size
            ),
        ));
    }
    if metadata.parent_build_id == Some(metadata.build_id) {
        return Err(HeaderError::corrupted(id, "layer lists itself as parent"));
    }

    let mut next = 0u64;
    for (i, entry) in mappings.iter().enumerate() {
        if entry.is_empty() {
            return Err(HeaderError::corrupted(
                id,
                format!("entry {i} [{}, {}) is empty", entry.start, entry.end),
            ));
        }
        if entry.start % block_len != 0 || entry.end % block_len != 0 {
            return Err(HeaderError::corrupted(
                id,
                format!("entry {i} [{}, {}) is not block-aligned", entry.start, entry.end),
            ));
        }
        if entry.start < next {
            return Err(HeaderError::corrupted(
                id,
                format!("entry {i} starts at {} inside previous entry ending at {next}", entry.start),
            ));
        }
        if entry.start > next {
            return Err(HeaderError::corrupted(
                id,
                format!("gap in coverage between {next} and {}", entry.start),
            ));
        }
        next = entry.end;
    }

    if next != metadata.total_size {
        return Err(HeaderError::corrupted(
            id,
            format!("mapping covers {next} bytes, expected {}", metadata.total_size),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BS: u32 = 4096;

    #[test]
    fn deserialize_validates() {
        let id = BuildId::random();
        let json = serde_json::json!({
            "metadata": {
                "version": 1,
                "build_id": id,
                "base_build_id": id,
                "parent_build_id": null,
                "generation": 0,
                "block_size": 3,
                "total_size": 100,
            },
            "mappings": [{ "start": 0, "end": 10, "owner": id }],
        });
        let err = serde_json::from_value::<Header>(json).unwrap_err();
        assert!(err.to_string().contains("block size 3"));

        let header = Header::root(id, BS, bs() * 2).unwrap();
        let text = serde_json::to_string(&header).unwrap();
        assert_eq!(serde_json::from_str::<Header>(&text).unwrap(), header);
    }

    fn bs() -> u64 {
        u64::from(BS)
    }

    #[test]
    fn root_owns_everything() {
        let id = BuildId::random();
        let header = Header::root(id, BS, bs() * 10).unwrap();
        assert_eq!(header.mappings(), &[MappingEntry::new(0, bs() * 10, id)]);
        assert_eq!(header.owned_blocks(), 10);
    }

    #[test]
    fn empty_address_space_is_valid() {
        let header = Header::root(BuildId::random(), BS, 0).unwrap();
        assert!(header.mappings().is_empty());
    }

    #[test]
    fn rejects_non_power_of_two_block_size() {
        let err = Header::root(BuildId::random(), 3000, 6000).unwrap_err();
        assert!(matches!(err, HeaderError::CorruptedHeader { .. }));
    }

    #[test]
    fn rejects_zero_block_size() {
        let err = Header::root(BuildId::random(), 0, 0).unwrap_err();
        assert!(matches!(err, HeaderError::CorruptedHeader { .. }));
    }

    #[test]
    fn rejects_unaligned_total_size() {
        let err = Header::root(BuildId::random(), BS, bs() + 1).unwrap_err();
        assert!(matches!(err, HeaderError::CorruptedHeader { .. }));
    }

    #[test]
    fn rejects_gap() {
        let id = BuildId::random();
        let meta = Metadata::root(id, BS, bs() * 4);
        let err = Header::new(
            meta,
            vec![
                MappingEntry::new(0, bs(), id),
                MappingEntry::new(bs() * 2, bs() * 4, id),
            ],
        )
        .unwrap_err();
        match err {
            HeaderError::CorruptedHeader { build_id, reason } => {
                assert_eq!(build_id, Some(id));
                assert!(reason.contains("gap"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_overlap() {
        let id = BuildId::random();
        let meta = Metadata::root(id, BS, bs() * 4);
        let err = Header::new(
            meta,
            vec![
                MappingEntry::new(0, bs() * 2, id),
                MappingEntry::new(bs(), bs() * 4, id),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, HeaderError::CorruptedHeader { .. }));
    }

    #[test]
    fn rejects_short_coverage() {
        let id = BuildId::random();
        let meta = Metadata::root(id, BS, bs() * 4);
        let err = Header::new(meta, vec![MappingEntry::new(0, bs() * 3, id)]).unwrap_err();
        assert!(matches!(err, HeaderError::CorruptedHeader { .. }));
    }

    #[test]
    fn rejects_unaligned_entry() {
        let id = BuildId::random();
        let meta = Metadata::root(id, BS, bs() * 2);
        let err = Header::new(
            meta,
            vec![
                MappingEntry::new(0, 100, id),
                MappingEntry::new(100, bs() * 2, id),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, HeaderError::CorruptedHeader { .. }));
    }

    #[test]
    fn rejects_self_parent() {
        let id = BuildId::random();
        let mut meta = Metadata::root(id, BS, bs());
        meta.parent_build_id = Some(id);
        let err = Header::new(meta, vec![MappingEntry::new(0, bs(), id)]).unwrap_err();
        assert!(matches!(err, HeaderError::CorruptedHeader { .. }));
    }

    #[test]
    fn from_block_owners_coalesces_runs() {
        let a = BuildId::random();
        let b = BuildId::random();
        let meta = Metadata::root(a, BS, bs() * 5);
        let header = Header::from_block_owners(meta, &[a, a, b, b, a]).unwrap();
        assert_eq!(
            header.mappings(),
            &[
                MappingEntry::new(0, bs() * 2, a),
                MappingEntry::new(bs() * 2, bs() * 4, b),
                MappingEntry::new(bs() * 4, bs() * 5, a),
            ]
        );
    }

    #[test]
    fn from_block_owners_checks_count() {
        let a = BuildId::random();
        let meta = Metadata::root(a, BS, bs() * 3);
        assert!(Header::from_block_owners(meta, &[a, a]).is_err());
    }

    #[test]
    fn derive_child_claims_dirty_blocks() {
        let root_id = BuildId::random();
        let child_id = BuildId::random();
        let root = Header::root(root_id, BS, bs() * 6).unwrap();

        let child = root
            .derive_child(child_id, &BTreeSet::from([1, 2, 5]))
            .unwrap();

        assert_eq!(child.generation(), 1);
        assert_eq!(child.parent_build_id(), Some(root_id));
        assert_eq!(child.metadata().base_build_id, root_id);
        assert_eq!(
            child.mappings(),
            &[
                MappingEntry::new(0, bs(), root_id),
                MappingEntry::new(bs(), bs() * 3, child_id),
                MappingEntry::new(bs() * 3, bs() * 5, root_id),
                MappingEntry::new(bs() * 5, bs() * 6, child_id),
            ]
        );
        assert_eq!(child.owned_blocks(), 3);
    }

    #[test]
    fn derive_child_keeps_grandparent_owners() {
        let r = BuildId::random();
        let a = BuildId::random();
        let b = BuildId::random();
        let root = Header::root(r, BS, bs() * 4).unwrap();
        let la = root.derive_child(a, &BTreeSet::from([0])).unwrap();
        let lb = la.derive_child(b, &BTreeSet::from([3])).unwrap();

        assert_eq!(lb.generation(), 2);
        assert_eq!(
            lb.mappings(),
            &[
                MappingEntry::new(0, bs(), a),
                MappingEntry::new(bs(), bs() * 3, r),
                MappingEntry::new(bs() * 3, bs() * 4, b),
            ]
        );
    }

    #[test]
    fn derive_child_rejects_block_past_end() {
        let root = Header::root(BuildId::random(), BS, bs() * 2).unwrap();
        let err = root
            .derive_child(BuildId::random(), &BTreeSet::from([2]))
            .unwrap_err();
        assert!(matches!(err, HeaderError::OutOfRange { .. }));
    }
}
