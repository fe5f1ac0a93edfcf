//! Chain validation and multi-hop shifted-mapping resolution.
//!
//! [`ChainResolver`] keeps one [`MappingIndex`] per layer in root → leaf
//! order plus a build id → position map. Resolution walks towards the root
//! with an explicit loop; every hop must move to a strictly older layer, so
//! the walk is bounded by the chain length.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use snap_header::{Header, MappingIndex};
use snap_types::BuildId;

use crate::error::{ChainError, ChainResult, ChainViolation};

/// Where the bytes of a block live, as seen from one layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ownership {
    /// Stored in `owner`'s data object at `local_offset`.
    Stored { owner: BuildId, local_offset: u64 },
    /// No layer ever mapped the block.
    Unmapped,
}

impl Ownership {
    pub fn owner(&self) -> Option<BuildId> {
        match self {
            Self::Stored { owner, .. } => Some(*owner),
            Self::Unmapped => None,
        }
    }
}

/// Validated, read-only view of a snapshot chain.
///
/// Safe for unlimited concurrent reads; nothing is mutated after
/// construction.
#[derive(Clone, Debug)]
pub struct ChainResolver {
    /// Root first, leaf last.
    layers: Vec<MappingIndex>,
    positions: HashMap<BuildId, usize>,
}

impl ChainResolver {
    /// Validate and index the headers of one chain, supplied in any order.
    pub fn new(headers: Vec<Header>) -> ChainResult<Self> {
        if headers.is_empty() {
            return Err(ChainError::EmptyChain);
        }

        let mut by_id: HashMap<BuildId, Header> = HashMap::with_capacity(headers.len());
        let mut input_order = Vec::with_capacity(headers.len());
        for header in headers {
            let id = header.build_id();
            if by_id.contains_key(&id) {
                return Err(ChainError::invalid(id, ChainViolation::DuplicateBuild));
            }
            input_order.push(id);
            by_id.insert(id, header);
        }

        let referenced: HashSet<BuildId> = by_id
            .values()
            .filter_map(|h| h.parent_build_id())
            .collect();
        let leaves: Vec<BuildId> = input_order
            .iter()
            .copied()
            .filter(|id| !referenced.contains(id))
            .collect();
        if leaves.len() > 1 {
            return Err(ChainError::invalid(
                leaves[0],
                ChainViolation::MultipleLeaves {
                    count: leaves.len(),
                },
            ));
        }
        // Without a leaf every layer is someone's parent, so the walk below
        // is guaranteed to hit the cycle.
        let start = leaves.first().copied().unwrap_or(input_order[0]);

        let order = walk_parents(&by_id, start)?;
        if order.len() != by_id.len() {
            let stray = input_order
                .iter()
                .copied()
                .find(|id| !order.contains(id))
                .unwrap_or(start);
            return Err(ChainError::invalid(stray, ChainViolation::Disconnected));
        }

        let mut layers: Vec<MappingIndex> = Vec::with_capacity(order.len());
        for id in order.iter().rev() {
            if let Some(header) = by_id.remove(id) {
                layers.push(MappingIndex::new(header));
            }
        }
        validate_layers(&layers)?;

        let positions = layers
            .iter()
            .enumerate()
            .map(|(i, layer)| (layer.build_id(), i))
            .collect();

        debug!(
            layers = layers.len(),
            root = %layers[0].build_id().short_id(),
            leaf = %layers[layers.len() - 1].build_id().short_id(),
            "validated chain"
        );
        Ok(Self { layers, positions })
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Always `false`; an empty chain cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layers in generation order, root first.
    pub fn layers(&self) -> &[MappingIndex] {
        &self.layers
    }

    pub fn root(&self) -> &MappingIndex {
        &self.layers[0]
    }

    pub fn leaf(&self) -> &MappingIndex {
        &self.layers[self.layers.len() - 1]
    }

    pub fn layer(&self, build_id: BuildId) -> Option<&MappingIndex> {
        self.position(build_id).map(|i| &self.layers[i])
    }

    /// Index of a layer in root → leaf order.
    pub fn position(&self, build_id: BuildId) -> Option<usize> {
        self.positions.get(&build_id).copied()
    }

    pub fn contains(&self, build_id: BuildId) -> bool {
        self.positions.contains_key(&build_id)
    }

    /// Block size shared by every layer.
    pub fn block_size(&self) -> u64 {
        self.root().header().metadata().block_len()
    }

    /// Resolve which build stores the bytes at `offset` as seen from `layer`.
    pub fn resolve(&self, layer: BuildId, offset: u64) -> ChainResult<Ownership> {
        let position = self
            .position(layer)
            .ok_or(ChainError::UnknownLayer(layer))?;
        self.resolve_at(position, offset)
    }

    /// [`resolve`](Self::resolve) by layer position instead of build id.
    pub fn resolve_at(&self, position: usize, offset: u64) -> ChainResult<Ownership> {
        let mut current = position;
        let layer = self.layers.get(current).ok_or_else(|| ChainError::CorruptedChain {
            build_id: self.leaf().build_id(),
            offset,
            reason: format!("layer position {position} is outside the chain"),
        })?;
        let mut index = layer;

        for _ in 0..self.layers.len() {
            let entry = index.lookup(offset)?;
            if entry.is_unmapped() {
                return Ok(Ownership::Unmapped);
            }
            if entry.owner == index.build_id() {
                return Ok(Ownership::Stored {
                    owner: entry.owner,
                    local_offset: offset,
                });
            }

            let owner_position =
                self.position(entry.owner)
                    .ok_or(ChainError::AncestorNotFound {
                        layer: index.build_id(),
                        owner: entry.owner,
                        offset,
                    })?;
            if owner_position >= current {
                return Err(ChainError::CorruptedChain {
                    build_id: index.build_id(),
                    offset,
                    reason: format!("owner {} is not an ancestor", entry.owner),
                });
            }
            current = owner_position;
            index = &self.layers[current];
        }

        Err(ChainError::CorruptedChain {
            build_id: layer.build_id(),
            offset,
            reason: format!("ownership does not settle within {} hops", self.layers.len()),
        })
    }

    /// Check every mapping owner in every layer before any block work.
    ///
    /// Owners must be nil, the layer itself, or an ancestor whose address
    /// space covers the whole entry.
    pub fn verify_owners(&self) -> ChainResult<()> {
        for (position, layer) in self.layers.iter().enumerate() {
            let id = layer.build_id();
            for entry in layer.header().mappings() {
                if entry.is_unmapped() || entry.owner == id {
                    continue;
                }
                let owner_position =
                    self.position(entry.owner)
                        .ok_or(ChainError::AncestorNotFound {
                            layer: id,
                            owner: entry.owner,
                            offset: entry.start,
                        })?;
                if owner_position >= position {
                    return Err(ChainError::CorruptedChain {
                        build_id: id,
                        offset: entry.start,
                        reason: format!("owner {} is not an ancestor", entry.owner),
                    });
                }
                let owner_size = self.layers[owner_position].header().total_size();
                if entry.end > owner_size {
                    return Err(ChainError::CorruptedChain {
                        build_id: id,
                        offset: entry.start,
                        reason: format!(
                            "entry [{}, {}) extends past the {owner_size} bytes of owner {}",
                            entry.start, entry.end, entry.owner
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Follow parent links from `start`, returning the visited ids leaf-first.
fn walk_parents(by_id: &HashMap<BuildId, Header>, start: BuildId) -> ChainResult<Vec<BuildId>> {
    let mut visited = HashSet::with_capacity(by_id.len());
    let mut order = Vec::with_capacity(by_id.len());
    let mut current = start;

    loop {
        if !visited.insert(current) {
            return Err(ChainError::invalid(current, ChainViolation::Cycle));
        }
        order.push(current);

        let parent = by_id.get(&current).and_then(|h| h.parent_build_id());
        match parent {
            None => return Ok(order),
            Some(parent) if by_id.contains_key(&parent) => current = parent,
            Some(parent) => {
                return Err(ChainError::invalid(
                    current,
                    ChainViolation::BrokenParentLink { parent },
                ))
            }
        }
    }
}

fn validate_layers(layers: &[MappingIndex]) -> ChainResult<()> {
    let root = layers[0].header().metadata();
    if root.generation != 0 {
        return Err(ChainError::invalid(
            root.build_id,
            ChainViolation::RootGeneration {
                generation: root.generation,
            },
        ));
    }

    let mut parent_generation = None;
    for layer in layers {
        let meta = layer.header().metadata();
        if meta.block_size != root.block_size {
            return Err(ChainError::invalid(
                meta.build_id,
                ChainViolation::BlockSizeMismatch {
                    expected: root.block_size,
                    actual: meta.block_size,
                },
            ));
        }
        if meta.base_build_id != root.build_id {
            return Err(ChainError::invalid(
                meta.build_id,
                ChainViolation::BaseMismatch {
                    expected: root.build_id,
                    actual: meta.base_build_id,
                },
            ));
        }
        if let Some(parent_generation) = parent_generation {
            if meta.generation <= parent_generation {
                return Err(ChainError::invalid(
                    meta.build_id,
                    ChainViolation::NonMonotonicGeneration {
                        parent_generation,
                        generation: meta.generation,
                    },
                ));
            }
        }
        parent_generation = Some(meta.generation);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use snap_header::{HeaderError, MappingEntry, Metadata};

    use super::*;

    const BS: u32 = 4096;

    fn bs() -> u64 {
        u64::from(BS)
    }

    /// R (gen 0) owns all 8 blocks, A (gen 1) rewrites block 0,
    /// B (gen 2) rewrites block 2.
    fn three_layers() -> (Header, Header, Header) {
        let r = Header::root(BuildId::random(), BS, bs() * 8).unwrap();
        let a = r
            .derive_child(BuildId::random(), &BTreeSet::from([0]))
            .unwrap();
        let b = a
            .derive_child(BuildId::random(), &BTreeSet::from([2]))
            .unwrap();
        (r, a, b)
    }

    fn with_parent(header: &Header, parent: Option<BuildId>, generation: u64) -> Header {
        let mut meta = header.metadata().clone();
        meta.parent_build_id = parent;
        meta.generation = generation;
        Header::new(meta, header.mappings().to_vec()).unwrap()
    }

    fn violation(err: ChainError) -> ChainViolation {
        match err {
            ChainError::InvalidChain { violation, .. } => violation,
            other => panic!("expected InvalidChain, got {other:?}"),
        }
    }

    #[test]
    fn resolves_across_three_layers() {
        let (r, a, b) = three_layers();
        let (rid, aid, bid) = (r.build_id(), a.build_id(), b.build_id());
        let chain = ChainResolver::new(vec![r, a, b]).unwrap();

        assert_eq!(
            chain.resolve(bid, bs() * 2).unwrap(),
            Ownership::Stored {
                owner: bid,
                local_offset: bs() * 2
            }
        );
        assert_eq!(
            chain.resolve(bid, 0).unwrap(),
            Ownership::Stored {
                owner: aid,
                local_offset: 0
            }
        );
        assert_eq!(
            chain.resolve(bid, bs() * 5).unwrap(),
            Ownership::Stored {
                owner: rid,
                local_offset: bs() * 5
            }
        );
        assert_eq!(chain.resolve(aid, bs() * 2).unwrap().owner(), Some(rid));
    }

    #[test]
    fn accepts_headers_in_any_order() {
        let (r, a, b) = three_layers();
        let (rid, bid) = (r.build_id(), b.build_id());
        let chain = ChainResolver::new(vec![b, r, a]).unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.root().build_id(), rid);
        assert_eq!(chain.leaf().build_id(), bid);
        assert_eq!(chain.position(bid), Some(2));
        assert_eq!(chain.block_size(), bs());
    }

    #[test]
    fn unmapped_blocks_resolve_to_unmapped() {
        let rid = BuildId::random();
        let meta = Metadata::root(rid, BS, bs() * 2);
        let root = Header::from_block_owners(meta, &[rid, BuildId::nil()]).unwrap();
        let chain = ChainResolver::new(vec![root]).unwrap();
        assert_eq!(chain.resolve(rid, bs()).unwrap(), Ownership::Unmapped);
        assert_eq!(chain.resolve(rid, bs()).unwrap().owner(), None);
    }

    #[test]
    fn empty_chain_is_rejected() {
        assert!(matches!(
            ChainResolver::new(vec![]).unwrap_err(),
            ChainError::EmptyChain
        ));
    }

    #[test]
    fn duplicate_build_is_rejected() {
        let (r, _, _) = three_layers();
        let err = ChainResolver::new(vec![r.clone(), r]).unwrap_err();
        assert_eq!(violation(err), ChainViolation::DuplicateBuild);
    }

    #[test]
    fn two_node_cycle_is_rejected() {
        let (r, a, _) = three_layers();
        // r now claims a as parent while a still points at r.
        let r = with_parent(&r, Some(a.build_id()), 0);
        let err = ChainResolver::new(vec![r, a]).unwrap_err();
        assert_eq!(violation(err), ChainViolation::Cycle);
    }

    #[test]
    fn cycle_behind_a_leaf_is_rejected() {
        let (r, a, b) = three_layers();
        let r = with_parent(&r, Some(a.build_id()), 0);
        let err = ChainResolver::new(vec![r, a, b]).unwrap_err();
        assert_eq!(violation(err), ChainViolation::Cycle);
    }

    #[test]
    fn missing_parent_is_broken_link() {
        let (_, a, b) = three_layers();
        let err = ChainResolver::new(vec![a.clone(), b]).unwrap_err();
        match err {
            ChainError::InvalidChain {
                build_id,
                violation: ChainViolation::BrokenParentLink { parent },
            } => {
                assert_eq!(build_id, a.build_id());
                assert_eq!(Some(parent), a.parent_build_id());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn fork_is_rejected() {
        let (r, a, _) = three_layers();
        let sibling = r
            .derive_child(BuildId::random(), &BTreeSet::from([1]))
            .unwrap();
        let err = ChainResolver::new(vec![r, a, sibling]).unwrap_err();
        assert_eq!(violation(err), ChainViolation::MultipleLeaves { count: 2 });
    }

    #[test]
    fn non_monotonic_generation_is_rejected() {
        let (r, a, b) = three_layers();
        let b = with_parent(&b, b.parent_build_id(), 1);
        let err = ChainResolver::new(vec![r, a, b]).unwrap_err();
        assert_eq!(
            violation(err),
            ChainViolation::NonMonotonicGeneration {
                parent_generation: 1,
                generation: 1
            }
        );
    }

    #[test]
    fn root_must_be_generation_zero() {
        let (r, _, _) = three_layers();
        let r = with_parent(&r, None, 3);
        let err = ChainResolver::new(vec![r]).unwrap_err();
        assert_eq!(
            violation(err),
            ChainViolation::RootGeneration { generation: 3 }
        );
    }

    #[test]
    fn block_size_mismatch_is_rejected() {
        let (r, a, _) = three_layers();
        let mut meta = a.metadata().clone();
        meta.block_size = BS * 2;
        let a = Header::new(meta, vec![MappingEntry::new(0, bs() * 8, a.build_id())]).unwrap();
        let err = ChainResolver::new(vec![r, a]).unwrap_err();
        assert_eq!(
            violation(err),
            ChainViolation::BlockSizeMismatch {
                expected: BS,
                actual: BS * 2
            }
        );
    }

    #[test]
    fn foreign_base_is_rejected() {
        let (r, a, _) = three_layers();
        let mut meta = a.metadata().clone();
        meta.base_build_id = BuildId::random();
        let a = Header::new(meta, a.mappings().to_vec()).unwrap();
        let err = ChainResolver::new(vec![r, a]).unwrap_err();
        assert!(matches!(violation(err), ChainViolation::BaseMismatch { .. }));
    }

    #[test]
    fn owner_outside_chain_is_ancestor_not_found() {
        let r = Header::root(BuildId::random(), BS, bs() * 2).unwrap();
        let stranger = BuildId::random();
        let child_id = BuildId::random();
        let child = Header::from_block_owners(
            r.metadata().child(child_id),
            &[child_id, stranger],
        )
        .unwrap();
        let chain = ChainResolver::new(vec![r, child]).unwrap();

        let err = chain.resolve(child_id, bs()).unwrap_err();
        assert!(matches!(
            err,
            ChainError::AncestorNotFound { owner, offset, .. } if owner == stranger && offset == bs()
        ));
        assert!(matches!(
            chain.verify_owners().unwrap_err(),
            ChainError::AncestorNotFound { .. }
        ));
    }

    #[test]
    fn forward_owner_is_corrupted_chain() {
        let (r, a, b) = three_layers();
        // A claims block 7 is stored by its own child B.
        let mut owners: Vec<BuildId> = vec![a.build_id(); 1];
        owners.extend(std::iter::repeat(r.build_id()).take(6));
        owners.push(b.build_id());
        let a = Header::from_block_owners(a.metadata().clone(), &owners).unwrap();
        let aid = a.build_id();
        let chain = ChainResolver::new(vec![r, a, b]).unwrap();

        assert!(matches!(
            chain.resolve(aid, bs() * 7).unwrap_err(),
            ChainError::CorruptedChain { build_id, .. } if build_id == aid
        ));
        assert!(matches!(
            chain.verify_owners().unwrap_err(),
            ChainError::CorruptedChain { .. }
        ));
    }

    #[test]
    fn owner_shorter_than_entry_is_corrupted_chain() {
        let r = Header::root(BuildId::random(), BS, bs()).unwrap();
        let mut meta = r.metadata().child(BuildId::random());
        meta.total_size = bs() * 2;
        let child = Header::from_block_owners(meta, &[BuildId::nil(), r.build_id()]).unwrap();
        let cid = child.build_id();
        let chain = ChainResolver::new(vec![r, child]).unwrap();

        assert!(matches!(
            chain.verify_owners().unwrap_err(),
            ChainError::CorruptedChain { build_id, offset, .. } if build_id == cid && offset == bs()
        ));
    }

    #[test]
    fn valid_chain_passes_owner_verification() {
        let (r, a, b) = three_layers();
        let chain = ChainResolver::new(vec![r, a, b]).unwrap();
        chain.verify_owners().unwrap();
    }

    #[test]
    fn unknown_layer_and_out_of_range() {
        let (r, a, b) = three_layers();
        let bid = b.build_id();
        let chain = ChainResolver::new(vec![r, a, b]).unwrap();

        assert!(matches!(
            chain.resolve(BuildId::random(), 0).unwrap_err(),
            ChainError::UnknownLayer(_)
        ));
        assert!(matches!(
            chain.resolve(bid, bs() * 8).unwrap_err(),
            ChainError::Header(HeaderError::OutOfRange { .. })
        ));
    }

    #[test]
    fn resolver_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ChainResolver>();
    }
}
