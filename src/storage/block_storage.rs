use anyhow::Result;

use crate::disk_format::block::{Block, BlockNumber};

/// A store of fixed-size blocks addressed by block number.
pub trait BlockStorage {
    /// Reads the block at `block_number`.
    fn read_block(&self, block_number: BlockNumber) -> Result<Block>;

    /// Writes the block at `block_number`.
    fn write_block(&mut self, block_number: BlockNumber, block: &Block) -> Result<()>;
}
