//! Block-size rules shared between the snapshot writer and every reader.

/// A block size is usable when it is a non-zero power of two.
pub fn is_valid_block_size(block_size: u64) -> bool {
    block_size != 0 && block_size.is_power_of_two()
}
