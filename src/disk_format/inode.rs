use std::mem::size_of;

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use super::block::BLOCK_SIZE;

/// The index of an inode. Inode zero is the root directory.
pub type InodeNumber = i32;

/// The number of bytes occupied by an inode.
pub const INODE_SIZE: usize = 128;
const_assert!(size_of::<Inode>() == INODE_SIZE);

/// The number of direct block numbers supported by an inode.
pub const DIRECT_PTRS: usize = 30;

const_assert!(BLOCK_SIZE % INODE_SIZE == 0);
/// The number of inodes that fit in a block.
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;

/// The maximum supported file size.
pub const MAX_FILE_SIZE: usize = DIRECT_PTRS * BLOCK_SIZE;

/// The inode number of the root directory.
pub const ROOT_INODE: InodeNumber = 0;

/// The record stored in unused inode slots. Allocation is tracked by the inode bitmap,
/// so the fields of a free slot carry no meaning; the record is all zeroes on disk.
pub const FREE_INODE: Inode = Inode {
    type_: InodeType::Directory,
    size: 0,
    direct: [0; DIRECT_PTRS],
};

/// An inode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct Inode {
    /// File type (directory or regular file).
    pub type_: InodeType,
    /// File size in bytes.
    pub size: i32,
    /// Absolute block numbers of the file's first [`DIRECT_PTRS`] blocks. Zero means
    /// the slot holds no block.
    pub direct: [i32; DIRECT_PTRS],
}

impl Inode {
    /// Constructs an empty [`Inode`] of the given type.
    #[must_use]
    pub fn new(type_: InodeType) -> Self {
        Inode {
            type_,
            size: 0,
            direct: [0; DIRECT_PTRS],
        }
    }

    /// The number of blocks holding the inode's content.
    #[must_use]
    pub fn num_blocks(&self) -> usize {
        (self.size as usize).div_ceil(BLOCK_SIZE)
    }
}

/// The type of an inode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(i32)]
pub enum InodeType {
    /// A directory.
    Directory = 0,
    /// A regular data file.
    Regular = 1,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_size() {
        let serialized = bincode::serialize(&FREE_INODE).unwrap();
        assert_eq!(serialized.len(), INODE_SIZE);
    }

    #[test]
    fn test_zeroed_record_is_free_inode() {
        let deserialized: Inode = bincode::deserialize(&[0; INODE_SIZE]).unwrap();
        assert_eq!(deserialized, FREE_INODE);
    }

    #[test]
    fn test_round_trip() {
        let mut inode = Inode::new(InodeType::Regular);
        inode.size = 4097;
        inode.direct[0] = 5;
        inode.direct[1] = 7;

        let serialized = bincode::serialize(&inode).unwrap();
        let deserialized: Inode = bincode::deserialize(&serialized).unwrap();

        assert_eq!(deserialized, inode);
    }

    #[test]
    fn test_num_blocks() {
        let mut inode = Inode::new(InodeType::Regular);
        assert_eq!(inode.num_blocks(), 0);

        inode.size = 1;
        assert_eq!(inode.num_blocks(), 1);

        inode.size = BLOCK_SIZE as i32;
        assert_eq!(inode.num_blocks(), 1);

        inode.size = BLOCK_SIZE as i32 + 1;
        assert_eq!(inode.num_blocks(), 2);
    }
}
