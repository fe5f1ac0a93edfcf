//! Binary header encoding.
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! magic "SNPH" | version u32 | total_size u64 | block_size u32 | generation u64
//! build_id [16] | base_build_id [16] | parent_build_id [16] (zero for root)
//! entry_count u64 | entry_count × { start u64 | length u64 | owner [16] }
//! crc32 u32 over all preceding bytes
//! ```

use snap_types::BuildId;

use crate::error::{HeaderError, HeaderResult};
use crate::header::Header;
use crate::mapping::MappingEntry;
use crate::metadata::Metadata;

pub const HEADER_MAGIC: &[u8; 4] = b"SNPH";
pub const HEADER_VERSION: u32 = 1;

const FIXED_LEN: usize = 4 + 4 + 8 + 4 + 8 + BuildId::LEN * 3 + 8;
const ENTRY_LEN: usize = 8 + 8 + BuildId::LEN;
const TRAILER_LEN: usize = 4;

/// Serialize a header. Entries are written in address order, so encoding is
/// deterministic and `decode(&encode(h)) == h`.
pub fn encode(header: &Header) -> Vec<u8> {
    encode_parts(header.metadata(), header.mappings())
}

fn encode_parts(meta: &Metadata, mappings: &[MappingEntry]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(FIXED_LEN + mappings.len() * ENTRY_LEN + TRAILER_LEN);
    buf.extend_from_slice(HEADER_MAGIC);
    buf.extend_from_slice(&meta.version.to_be_bytes());
    buf.extend_from_slice(&meta.total_size.to_be_bytes());
    buf.extend_from_slice(&meta.block_size.to_be_bytes());
    buf.extend_from_slice(&meta.generation.to_be_bytes());
    buf.extend_from_slice(meta.build_id.as_bytes());
    buf.extend_from_slice(meta.base_build_id.as_bytes());
    buf.extend_from_slice(meta.parent_build_id.unwrap_or_default().as_bytes());
    buf.extend_from_slice(&(mappings.len() as u64).to_be_bytes());

    for entry in mappings {
        buf.extend_from_slice(&entry.start.to_be_bytes());
        buf.extend_from_slice(&entry.len().to_be_bytes());
        buf.extend_from_slice(entry.owner.as_bytes());
    }

    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(&crc.to_be_bytes());
    buf
}

/// Parse and validate a header.
pub fn decode(data: &[u8]) -> HeaderResult<Header> {
    if data.len() < FIXED_LEN + TRAILER_LEN {
        return Err(HeaderError::corrupted(
            None,
            format!("header is {} bytes, need at least {}", data.len(), FIXED_LEN + TRAILER_LEN),
        ));
    }
    if &data[0..4] != HEADER_MAGIC {
        return Err(HeaderError::InvalidMagic {
            expected: String::from_utf8_lossy(HEADER_MAGIC).into(),
            actual: String::from_utf8_lossy(&data[0..4]).into(),
        });
    }

    let mut reader = Reader::new(data, 4);
    let version = reader.u32()?;
    if version != HEADER_VERSION {
        return Err(HeaderError::UnsupportedVersion(version));
    }

    let total_size = reader.u64()?;
    let block_size = reader.u32()?;
    let generation = reader.u64()?;
    let build_id = reader.build_id()?;
    let base_build_id = reader.build_id()?;
    let parent_build_id = reader.build_id()?.non_nil();
    let count = reader.u64()?;
    let id = Some(build_id);

    let expected_len = usize::try_from(count)
        .ok()
        .and_then(|n| n.checked_mul(ENTRY_LEN))
        .and_then(|n| n.checked_add(FIXED_LEN + TRAILER_LEN));
    if expected_len != Some(data.len()) {
        return Err(HeaderError::corrupted(
            id,
            format!("{count} entries inconsistent with header length {}", data.len()),
        ));
    }

    let body_len = data.len() - TRAILER_LEN;
    let stored = u32::from_be_bytes([
        data[body_len],
        data[body_len + 1],
        data[body_len + 2],
        data[body_len + 3],
    ]);
    let computed = crc32fast::hash(&data[..body_len]);
    if stored != computed {
        return Err(HeaderError::ChecksumMismatch { stored, computed });
    }

    let mut mappings = Vec::with_capacity(count as usize);
    for i in 0..count {
        let start = reader.u64()?;
        let length = reader.u64()?;
        let owner = reader.build_id()?;
        let end = start.checked_add(length).ok_or_else(|| {
            HeaderError::corrupted(id, format!("entry {i} overflows the address space"))
        })?;
        mappings.push(MappingEntry::new(start, end, owner));
    }

    let metadata = Metadata {
        version,
        build_id,
        base_build_id,
        parent_build_id,
        generation,
        block_size,
        total_size,
    };
    Header::new(metadata, mappings)
}

/// Forward-only cursor over the encoded bytes.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    fn take<const N: usize>(&mut self) -> HeaderResult<[u8; N]> {
        let end = self.pos + N;
        let bytes: [u8; N] = self
            .data
            .get(self.pos..end)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| HeaderError::corrupted(None, format!("truncated at offset {}", self.pos)))?;
        self.pos = end;
        Ok(bytes)
    }

    fn u32(&mut self) -> HeaderResult<u32> {
        self.take::<4>().map(u32::from_be_bytes)
    }

    fn u64(&mut self) -> HeaderResult<u64> {
        self.take::<8>().map(u64::from_be_bytes)
    }

    fn build_id(&mut self) -> HeaderResult<BuildId> {
        self.take::<16>().map(BuildId::from_bytes)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use super::*;

    fn sample() -> Header {
        let root = Header::root(BuildId::random(), 4096, 4096 * 16).unwrap();
        root.derive_child(BuildId::random(), &BTreeSet::from([0, 3, 4, 15]))
            .unwrap()
    }

    #[test]
    fn roundtrip_root() {
        let header = Header::root(BuildId::random(), 2 * 1024 * 1024, 512 * 1024 * 1024).unwrap();
        let decoded = decode(&encode(&header)).unwrap();
        assert_eq!(decoded, header);
        assert!(decoded.metadata().is_root());
    }

    #[test]
    fn roundtrip_child_keeps_parent() {
        let header = sample();
        let decoded = decode(&encode(&header)).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.generation(), 1);
        assert!(decoded.parent_build_id().is_some());
    }

    #[test]
    fn encoding_is_deterministic() {
        let header = sample();
        assert_eq!(encode(&header), encode(&header));
    }

    #[test]
    fn encoded_length_matches_layout() {
        let header = sample();
        let bytes = encode(&header);
        assert_eq!(
            bytes.len(),
            FIXED_LEN + header.mappings().len() * ENTRY_LEN + TRAILER_LEN
        );
    }

    #[test]
    fn bad_magic() {
        let mut bytes = encode(&sample());
        bytes[0..4].copy_from_slice(b"BADM");
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, HeaderError::InvalidMagic { .. }));
    }

    #[test]
    fn bad_version() {
        let mut bytes = encode(&sample());
        bytes[4..8].copy_from_slice(&99u32.to_be_bytes());
        let err = decode(&bytes).unwrap_err();
        assert_eq!(err, HeaderError::UnsupportedVersion(99));
    }

    #[test]
    fn too_short() {
        let err = decode(b"SNPH").unwrap_err();
        assert!(matches!(err, HeaderError::CorruptedHeader { build_id: None, .. }));
    }

    #[test]
    fn truncated_entries() {
        let bytes = encode(&sample());
        let err = decode(&bytes[..bytes.len() - 10]).unwrap_err();
        assert!(matches!(err, HeaderError::CorruptedHeader { build_id: Some(_), .. }));
    }

    #[test]
    fn trailing_bytes() {
        let mut bytes = encode(&sample());
        bytes.push(0);
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, HeaderError::CorruptedHeader { .. }));
    }

    #[test]
    fn flipped_bit_fails_checksum() {
        let mut bytes = encode(&sample());
        let last_entry_owner = bytes.len() - TRAILER_LEN - 1;
        bytes[last_entry_owner] ^= 0x01;
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, HeaderError::ChecksumMismatch { .. }));
    }

    #[test]
    fn zero_block_size_is_corrupted() {
        let mut bytes = encode(&Header::root(BuildId::random(), 4096, 0).unwrap());
        // block_size sits after magic, version and total_size.
        bytes[16..20].copy_from_slice(&0u32.to_be_bytes());
        let body = bytes.len() - TRAILER_LEN;
        let crc = crc32fast::hash(&bytes[..body]);
        bytes[body..].copy_from_slice(&crc.to_be_bytes());
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, HeaderError::CorruptedHeader { .. }));
    }

    #[test]
    fn entry_past_total_size_is_corrupted() {
        let id = BuildId::random();
        let header = Header::root(id, 4096, 4096 * 2).unwrap();
        let mut bytes = encode(&header);
        // Stretch the single entry past total_size and re-seal the checksum.
        let length_at = FIXED_LEN + 8;
        bytes[length_at..length_at + 8].copy_from_slice(&(4096u64 * 3).to_be_bytes());
        let body = bytes.len() - TRAILER_LEN;
        let crc = crc32fast::hash(&bytes[..body]);
        bytes[body..].copy_from_slice(&crc.to_be_bytes());
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, HeaderError::CorruptedHeader { build_id: Some(b), .. } if b == id));
    }

    fn arb_header() -> impl Strategy<Value = Header> {
        let pool: Vec<BuildId> = (1..=4u8).map(|b| BuildId::from_bytes([b; 16])).collect();
        (9u32..=21, prop::collection::vec(0usize..5, 1..64), 0u64..1000).prop_map(
            move |(shift, picks, generation)| {
                let block_size = 1u32 << shift;
                let build_id = pool[0];
                let owners: Vec<BuildId> = picks
                    .iter()
                    .map(|&p| if p == 4 { BuildId::nil() } else { pool[p] })
                    .collect();
                let mut metadata = Metadata::root(
                    build_id,
                    block_size,
                    owners.len() as u64 * u64::from(block_size),
                );
                if generation > 0 {
                    metadata.generation = generation;
                    metadata.parent_build_id = Some(pool[1]);
                    metadata.base_build_id = pool[2];
                }
                Header::from_block_owners(metadata, &owners).unwrap()
            },
        )
    }

    /// Ranges are non-empty, block-aligned and laid end to end from 0 to
    /// `total_size`.
    fn tiles(ranges: &[(u64, u64)], block_len: u64, total_size: u64) -> bool {
        let mut next = 0u64;
        for &(start, end) in ranges {
            if start != next || end <= start || start % block_len != 0 || end % block_len != 0 {
                return false;
            }
            next = end;
        }
        next == total_size
    }

    /// A tiling of `[0, total_size)`, then at most one edit that may leave a
    /// gap, an overlap, a misaligned bound, an unsorted pair or an overrun.
    fn arb_layout() -> impl Strategy<Value = (u32, u64, Vec<(u64, u64)>)> {
        (4u32..=8, 1u64..=12).prop_flat_map(|(shift, blocks)| {
            let block_len = 1u64 << shift;
            (
                Just(shift),
                Just(blocks * block_len),
                prop::collection::vec(any::<bool>(), blocks as usize - 1),
                0usize..6,
                any::<prop::sample::Index>(),
                1u64..=block_len * 2,
            )
                .prop_map(move |(shift, total_size, cuts, edit, at, delta)| {
                    let mut ranges = Vec::new();
                    let mut start = 0u64;
                    for (i, cut) in cuts.iter().enumerate() {
                        if *cut {
                            let end = (i as u64 + 1) * block_len;
                            ranges.push((start, end));
                            start = end;
                        }
                    }
                    ranges.push((start, total_size));

                    let i = at.index(ranges.len());
                    match edit {
                        1 => ranges[i].0 = ranges[i].0.saturating_sub(delta),
                        2 => ranges[i].1 += delta,
                        3 => {
                            ranges.remove(i);
                        }
                        4 => {
                            let copy = ranges[i];
                            ranges.insert(i, copy);
                        }
                        5 if ranges.len() > 1 => { let last = ranges.len() - 1; ranges.swap(0, last) }
                        _ => {}
                    }
                    (shift, total_size, ranges)
                })
        })
    }

    proptest! {
        #[test]
        fn decode_encode_roundtrip(header in arb_header()) {
            let decoded = decode(&encode(&header)).unwrap();
            prop_assert_eq!(decoded, header);
        }

        #[test]
        fn accepts_exactly_the_tilings((shift, total_size, ranges) in arb_layout()) {
            let block_size = 1u32 << shift;
            let id = BuildId::from_bytes([7; 16]);
            let metadata = Metadata::root(id, block_size, total_size);
            let mappings: Vec<MappingEntry> = ranges
                .iter()
                .map(|&(start, end)| MappingEntry::new(start, end, id))
                .collect();

            let built = Header::new(metadata.clone(), mappings.clone());
            let decoded = decode(&encode_parts(&metadata, &mappings));
            if tiles(&ranges, u64::from(block_size), total_size) {
                let header = built.unwrap();
                prop_assert_eq!(decoded.unwrap(), header);
            } else {
                prop_assert!(
                    matches!(built, Err(HeaderError::CorruptedHeader { .. })),
                    "accepted {:?}",
                    ranges
                );
                prop_assert!(
                    matches!(decoded, Err(HeaderError::CorruptedHeader { .. })),
                    "decoded {:?}",
                    ranges
                );
            }
        }
    }
}
