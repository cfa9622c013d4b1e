use anyhow::{bail, Result};

use crate::disk_format::block::{Block, BlockNumber, BLOCK_SIZE};

use super::block_storage::BlockStorage;

/// Storage backed by a vector of blocks in memory. Used by tests in place of a disk
/// image file.
#[derive(Clone)]
pub struct MemoryStorage {
    /// The blocks.
    pub blocks: Vec<Block>,
}

impl MemoryStorage {
    /// Constructs a [`MemoryStorage`] of `num_blocks` zeroed blocks.
    #[must_use]
    pub fn new(num_blocks: usize) -> Self {
        MemoryStorage {
            blocks: vec![[0; BLOCK_SIZE]; num_blocks],
        }
    }
}

impl BlockStorage for MemoryStorage {
    fn read_block(&self, block_number: BlockNumber) -> Result<Block> {
        match self.blocks.get(block_number) {
            Some(block) => Ok(*block),
            None => bail!("block number {block_number} out of bounds"),
        }
    }

    fn write_block(&mut self, block_number: BlockNumber, block: &Block) -> Result<()> {
        match self.blocks.get_mut(block_number) {
            Some(slot) => {
                *slot = *block;
                Ok(())
            }
            None => bail!("block number {block_number} out of bounds"),
        }
    }
}
