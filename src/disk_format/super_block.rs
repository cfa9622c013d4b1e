use std::mem::size_of;

use serde::{Deserialize, Serialize};

use super::block::BLOCK_SIZE;
use super::inode::INODE_SIZE;

/// The number of bytes occupied by the superblock at the start of block zero.
pub const SUPERBLOCK_SIZE: usize = 40;
const_assert!(size_of::<Superblock>() == SUPERBLOCK_SIZE);
const_assert!(SUPERBLOCK_SIZE <= BLOCK_SIZE);

/// The block number of the superblock.
pub const SUPERBLOCK_BLOCK_NUMBER: usize = 0;

/// The superblock. Describes where every region of the image lives; read-only after
/// format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct Superblock {
    /// The first block of the inode bitmap.
    pub inode_bitmap_addr: i32,
    /// The number of blocks occupied by the inode bitmap.
    pub inode_bitmap_len: i32,
    /// The first block of the data bitmap.
    pub data_bitmap_addr: i32,
    /// The number of blocks occupied by the data bitmap.
    pub data_bitmap_len: i32,
    /// The first block of the inode region.
    pub inode_region_addr: i32,
    /// The number of blocks occupied by the inode region.
    pub inode_region_len: i32,
    /// The first block of the data region.
    pub data_region_addr: i32,
    /// The number of blocks occupied by the data region.
    pub data_region_len: i32,
    /// The total number of inodes.
    pub num_inodes: i32,
    /// The total number of data blocks.
    pub num_data: i32,
}

impl Superblock {
    /// Computes the layout for an image with `num_inodes` inodes and `num_data` data
    /// blocks. The regions are packed back to back after the superblock: inode bitmap,
    /// data bitmap, inode region, data region.
    #[must_use]
    pub fn new(num_inodes: usize, num_data: usize) -> Self {
        let inode_bitmap_len = num_inodes.div_ceil(8).div_ceil(BLOCK_SIZE);
        let data_bitmap_len = num_data.div_ceil(8).div_ceil(BLOCK_SIZE);
        let inode_region_len = (num_inodes * INODE_SIZE).div_ceil(BLOCK_SIZE);

        let inode_bitmap_addr = 1;
        let data_bitmap_addr = inode_bitmap_addr + inode_bitmap_len;
        let inode_region_addr = data_bitmap_addr + data_bitmap_len;
        let data_region_addr = inode_region_addr + inode_region_len;

        Self {
            inode_bitmap_addr: inode_bitmap_addr as i32,
            inode_bitmap_len: inode_bitmap_len as i32,
            data_bitmap_addr: data_bitmap_addr as i32,
            data_bitmap_len: data_bitmap_len as i32,
            inode_region_addr: inode_region_addr as i32,
            inode_region_len: inode_region_len as i32,
            data_region_addr: data_region_addr as i32,
            data_region_len: num_data as i32,
            num_inodes: num_inodes as i32,
            num_data: num_data as i32,
        }
    }

    /// The total number of blocks in the image.
    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.data_region_addr as usize + self.num_data as usize
    }
}
