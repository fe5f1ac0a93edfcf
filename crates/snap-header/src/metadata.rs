use serde::{Deserialize, Serialize};

use snap_types::BuildId;

use crate::codec::HEADER_VERSION;

/// Per-layer metadata stored at the front of every header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Header format version the layer was written with.
    pub version: u32,
    /// The layer this header describes.
    pub build_id: BuildId,
    /// Root layer of the chain. Equal to `build_id` for the root itself.
    pub base_build_id: BuildId,
    /// Direct parent. `None` only for the root layer.
    pub parent_build_id: Option<BuildId>,
    /// Position in the chain; the root is generation 0.
    pub generation: u64,
    /// Bytes per block. A power of two, shared by the whole chain.
    pub block_size: u32,
    /// Logical address-space size in bytes.
    pub total_size: u64,
}

impl Metadata {
    /// Metadata for the first layer of a new chain.
    pub fn root(build_id: BuildId, block_size: u32, total_size: u64) -> Self {
        Self {
            version: HEADER_VERSION,
            build_id,
            base_build_id: build_id,
            parent_build_id: None,
            generation: 0,
            block_size,
            total_size,
        }
    }

    /// Metadata for a direct child of this layer.
    pub fn child(&self, build_id: BuildId) -> Self {
        Self {
            version: self.version,
            build_id,
            base_build_id: self.base_build_id,
            parent_build_id: Some(self.build_id),
            generation: self.generation + 1,
            block_size: self.block_size,
            total_size: self.total_size,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_build_id.is_none()
    }

    /// Block size widened for offset arithmetic.
    pub fn block_len(&self) -> u64 {
        u64::from(self.block_size)
    }

    /// Number of whole blocks in the address space.
    pub fn block_count(&self) -> u64 {
        match self.block_len() {
            0 => 0,
            len => self.total_size / len,
        }
    }
}
