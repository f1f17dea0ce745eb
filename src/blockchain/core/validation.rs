use crate::blockchain::core::chain::Block;
use crate::error::ChainError;

/// Recompute the block's digest and compare it with the stored one.
pub fn is_block_hash_valid(block: &Block) -> Result<bool, ChainError> {
    Ok(block.calculate_hash()? == block.hash)
}

/// Genesis links to the empty hash; every other block links to its predecessor's stored hash.
pub fn is_linked_to(block: &Block, previous_hash: &str) -> bool {
    block.previous_block_hash == previous_hash
}
