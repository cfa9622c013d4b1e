use std::mem::size_of;

/// Size of a block in bytes.
pub const BLOCK_SIZE: usize = 4096;

/// A disk block.
pub type Block = [u8; BLOCK_SIZE];
const_assert!(size_of::<Block>() == BLOCK_SIZE);

/// An all-zero block.
pub const EMPTY_BLOCK: Block = [0; BLOCK_SIZE];

/// The index of a block on the disk.
pub type BlockNumber = usize;
