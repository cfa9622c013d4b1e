//! The file system engine: `stat`, `lookup`, `read`, `write`, `create`, and `unlink`
//! over a block storage, plus the region accessors the dump utilities consume.
//!
//! The mutating operations validate and assemble their state in memory before emitting
//! any block write, so a caller that stages them inside a storage transaction can roll
//! back to the exact pre-call image on error.

use anyhow::{ensure, Context, Result};
use thiserror::Error;

use crate::bitmap::Bitmap;
use crate::disk_format::block::{BlockNumber, BLOCK_SIZE, EMPTY_BLOCK};
use crate::disk_format::directory_entry::{DirectoryEntry, DIRECTORY_ENTRY_SIZE, NAME_MAX};
use crate::disk_format::inode::{
    Inode, InodeNumber, InodeType, FREE_INODE, INODE_SIZE, MAX_FILE_SIZE, ROOT_INODE,
};
use crate::disk_format::super_block::{Superblock, SUPERBLOCK_BLOCK_NUMBER};
use crate::storage::BlockStorage;

/// A file system operation failure.
#[derive(Debug, Error)]
pub enum FsError {
    /// There is no free inode or data block left for the operation.
    #[error("not enough space on disk")]
    NotEnoughSpace,
    /// The directory being unlinked still has entries.
    #[error("directory is not empty")]
    DirNotEmpty,
    /// The inode number is out of range, unallocated, or of the wrong kind for the
    /// operation.
    #[error("invalid inode")]
    InvalidInode,
    /// The inode number is in range but not allocated.
    #[error("inode is not allocated")]
    NotAllocated,
    /// The requested size exceeds the maximum file size.
    #[error("invalid size")]
    InvalidSize,
    /// Directories cannot be written through `write`.
    #[error("cannot write to a directory")]
    WriteToDir,
    /// No entry with the given name exists.
    #[error("entry not found")]
    NotFound,
    /// The entry name is empty or too long.
    #[error("invalid entry name")]
    InvalidName,
    /// An entry with the given name exists with a different type.
    #[error("entry exists with a different type")]
    InvalidType,
    /// `.` and `..` cannot be unlinked.
    #[error("'.' and '..' cannot be unlinked")]
    UnlinkNotAllowed,
    /// The underlying storage or codec failed.
    #[error("storage failure")]
    Storage(#[from] anyhow::Error),
}

/// A file system over a block storage.
pub struct FileSystem<S: BlockStorage> {
    /// The underlying block storage.
    pub storage: S,
    super_block: Superblock,
}

impl<S: BlockStorage> FileSystem<S> {
    /// Opens the file system on an already-formatted storage.
    pub fn open(storage: S) -> Result<Self> {
        let block = storage.read_block(SUPERBLOCK_BLOCK_NUMBER)?;
        let super_block = bincode::deserialize(&block).context("decoding superblock")?;

        Ok(FileSystem {
            storage,
            super_block,
        })
    }

    /// Formats the storage with `num_inodes` inodes and `num_data` data blocks: writes
    /// the superblock, both bitmaps, the inode region with the root directory at inode
    /// zero, and the root's first content block holding `.` and `..`.
    pub fn format(storage: S, num_inodes: usize, num_data: usize) -> Result<Self> {
        ensure!(num_inodes > 0, "an image needs at least one inode");
        ensure!(num_data > 0, "an image needs at least one data block");

        let super_block = Superblock::new(num_inodes, num_data);
        let mut fs = FileSystem {
            storage,
            super_block,
        };

        let encoded = bincode::serialize(&super_block).context("encoding superblock")?;
        let mut block = EMPTY_BLOCK;
        block[..encoded.len()].copy_from_slice(&encoded);
        fs.storage.write_block(SUPERBLOCK_BLOCK_NUMBER, &block)?;

        let mut inode_bitmap =
            Bitmap::new(vec![0; super_block.inode_bitmap_len as usize * BLOCK_SIZE]);
        inode_bitmap.set(ROOT_INODE as usize);
        fs.write_inode_bitmap(&inode_bitmap)?;

        let mut data_bitmap =
            Bitmap::new(vec![0; super_block.data_bitmap_len as usize * BLOCK_SIZE]);
        data_bitmap.set(0);
        fs.write_data_bitmap(&data_bitmap)?;

        let mut root = Inode::new(InodeType::Directory);
        root.size = (2 * DIRECTORY_ENTRY_SIZE) as i32;
        root.direct[0] = super_block.data_region_addr;

        let mut inodes = vec![FREE_INODE; num_inodes];
        inodes[ROOT_INODE as usize] = root;
        fs.write_inode_region(&inodes)?;

        let entries = [
            DirectoryEntry::new(".", ROOT_INODE)?,
            DirectoryEntry::new("..", ROOT_INODE)?,
        ];
        let encoded = encode_entries(&entries)?;
        let mut block = EMPTY_BLOCK;
        block[..encoded.len()].copy_from_slice(&encoded);
        fs.storage
            .write_block(super_block.data_region_addr as BlockNumber, &block)?;

        // Zero the rest of the data region so the image reaches its full size.
        for i in 1..num_data {
            fs.storage
                .write_block(super_block.data_region_addr as BlockNumber + i, &EMPTY_BLOCK)?;
        }

        Ok(fs)
    }

    /// The superblock, as parsed at open time.
    #[must_use]
    pub fn super_block(&self) -> &Superblock {
        &self.super_block
    }

    /// Reads the inode allocation bitmap.
    pub fn read_inode_bitmap(&self) -> Result<Bitmap> {
        self.read_bitmap(
            self.super_block.inode_bitmap_addr,
            self.super_block.inode_bitmap_len,
        )
    }

    /// Writes the inode allocation bitmap.
    pub fn write_inode_bitmap(&mut self, bitmap: &Bitmap) -> Result<()> {
        self.write_bitmap(self.super_block.inode_bitmap_addr, bitmap)
    }

    /// Reads the data allocation bitmap.
    pub fn read_data_bitmap(&self) -> Result<Bitmap> {
        self.read_bitmap(
            self.super_block.data_bitmap_addr,
            self.super_block.data_bitmap_len,
        )
    }

    /// Writes the data allocation bitmap.
    pub fn write_data_bitmap(&mut self, bitmap: &Bitmap) -> Result<()> {
        self.write_bitmap(self.super_block.data_bitmap_addr, bitmap)
    }

    fn read_bitmap(&self, addr: i32, len: i32) -> Result<Bitmap> {
        let mut bytes = Vec::with_capacity(len as usize * BLOCK_SIZE);
        for i in 0..len as usize {
            bytes.extend_from_slice(&self.storage.read_block(addr as BlockNumber + i)?);
        }

        Ok(Bitmap::new(bytes))
    }

    fn write_bitmap(&mut self, addr: i32, bitmap: &Bitmap) -> Result<()> {
        for (i, chunk) in bitmap.as_bytes().chunks(BLOCK_SIZE).enumerate() {
            let mut block = EMPTY_BLOCK;
            block[..chunk.len()].copy_from_slice(chunk);
            self.storage.write_block(addr as BlockNumber + i, &block)?;
        }

        Ok(())
    }

    /// Reads the full inode table.
    pub fn read_inode_region(&self) -> Result<Vec<Inode>> {
        let addr = self.super_block.inode_region_addr as BlockNumber;
        let len = self.super_block.inode_region_len as usize;

        let mut bytes = Vec::with_capacity(len * BLOCK_SIZE);
        for i in 0..len {
            bytes.extend_from_slice(&self.storage.read_block(addr + i)?);
        }
        bytes.truncate(self.super_block.num_inodes as usize * INODE_SIZE);

        bytes
            .chunks_exact(INODE_SIZE)
            .map(|chunk| bincode::deserialize(chunk).context("decoding inode"))
            .collect()
    }

    /// Writes the full inode table.
    pub fn write_inode_region(&mut self, inodes: &[Inode]) -> Result<()> {
        let mut bytes = inodes
            .iter()
            .map(|inode| bincode::serialize(inode).context("encoding inode"))
            .collect::<Result<Vec<_>>>()?
            .concat();
        bytes.resize(self.super_block.inode_region_len as usize * BLOCK_SIZE, 0);

        let addr = self.super_block.inode_region_addr as BlockNumber;
        for (i, chunk) in bytes.chunks_exact(BLOCK_SIZE).enumerate() {
            let mut block = EMPTY_BLOCK;
            block.copy_from_slice(chunk);
            self.storage.write_block(addr + i, &block)?;
        }

        Ok(())
    }

    /// Returns a copy of the inode record for `inum`. Fails with
    /// [`FsError::InvalidInode`] when the number is out of range or the inode is not
    /// allocated.
    pub fn stat(&self, inum: InodeNumber) -> Result<Inode, FsError> {
        if inum < 0 || inum >= self.super_block.num_inodes {
            return Err(FsError::InvalidInode);
        }

        let inode_bitmap = self.read_inode_bitmap()?;
        if !inode_bitmap.is_set(inum as usize) {
            return Err(FsError::InvalidInode);
        }

        let inodes = self.read_inode_region()?;
        Ok(inodes[inum as usize])
    }

    /// Looks up `name` in the directory `parent_inum` and returns the matching entry's
    /// inode number. Comparison is byte-exact; the first hit wins.
    pub fn lookup(&self, parent_inum: InodeNumber, name: &str) -> Result<InodeNumber, FsError> {
        let parent = self.stat(parent_inum)?;
        if parent.type_ != InodeType::Directory {
            return Err(FsError::InvalidInode);
        }
        if name.is_empty() || name.len() >= NAME_MAX {
            return Err(FsError::InvalidName);
        }

        let contents = self.read(parent_inum, parent.size as usize)?;
        let entries = decode_entries(&contents)?;

        entries
            .iter()
            .find(|entry| entry.name.matches(name))
            .map(|entry| entry.inum)
            .ok_or(FsError::NotFound)
    }

    /// Reads up to `size` bytes of the file or directory `inum`, clamped to the
    /// inode's size. Directory bytes are the packed entry array.
    pub fn read(&self, inum: InodeNumber, size: usize) -> Result<Vec<u8>, FsError> {
        if size > MAX_FILE_SIZE {
            return Err(FsError::InvalidSize);
        }

        let inode = self.stat(inum)?;
        let size = size.min(inode.size as usize);

        let mut data = Vec::with_capacity(size);
        for i in 0..size.div_ceil(BLOCK_SIZE) {
            let block = self.storage.read_block(inode.direct[i] as BlockNumber)?;
            let take = (size - data.len()).min(BLOCK_SIZE);
            data.extend_from_slice(&block[..take]);
        }

        Ok(data)
    }

    /// Reads the directory `inum` as a list of entries.
    pub fn read_directory(&self, inum: InodeNumber) -> Result<Vec<DirectoryEntry>, FsError> {
        let inode = self.stat(inum)?;
        if inode.type_ != InodeType::Directory {
            return Err(FsError::InvalidType);
        }

        let contents = self.read(inum, inode.size as usize)?;
        Ok(decode_entries(&contents)?)
    }

    /// Replaces the contents of the regular file `inum` with `buf`. Every block the
    /// inode held is released before allocation, so a rewrite can reuse its own
    /// blocks. Returns the number of bytes written.
    pub fn write(&mut self, inum: InodeNumber, buf: &[u8]) -> Result<usize, FsError> {
        let mut inode = self.stat(inum)?;
        if buf.len() > MAX_FILE_SIZE {
            return Err(FsError::InvalidSize);
        }
        if inode.type_ != InodeType::Regular {
            return Err(FsError::WriteToDir);
        }

        let data_region_addr = self.super_block.data_region_addr;
        let mut data_bitmap = self.read_data_bitmap()?;

        for ptr in inode.direct.iter_mut() {
            if *ptr != 0 {
                data_bitmap.clear((*ptr - data_region_addr) as usize);
                *ptr = 0;
            }
        }

        let blocks_needed = buf.len().div_ceil(BLOCK_SIZE);
        let available = data_bitmap
            .find_clear(blocks_needed, self.super_block.num_data as usize)
            .ok_or(FsError::NotEnoughSpace)?;

        for (i, &index) in available.iter().enumerate() {
            let addr = data_region_addr + index as i32;
            let chunk = &buf[i * BLOCK_SIZE..buf.len().min((i + 1) * BLOCK_SIZE)];

            // A short final chunk keeps the block's pre-existing bytes past the data;
            // they sit beyond the file size and are never readable.
            let mut block = if chunk.len() == BLOCK_SIZE {
                EMPTY_BLOCK
            } else {
                self.storage.read_block(addr as BlockNumber)?
            };
            block[..chunk.len()].copy_from_slice(chunk);
            self.storage.write_block(addr as BlockNumber, &block)?;

            inode.direct[i] = addr;
            data_bitmap.set(index);
        }

        inode.size = buf.len() as i32;

        self.write_data_bitmap(&data_bitmap)?;

        let mut inodes = self.read_inode_region()?;
        inodes[inum as usize] = inode;
        self.write_inode_region(&inodes)?;

        Ok(buf.len())
    }

    /// Creates a file or directory named `name` under the directory `parent_inum` and
    /// returns its inode number. If an entry of that name and type already exists its
    /// inode number is returned unchanged; an existing entry of the other type fails
    /// with [`FsError::InvalidType`].
    pub fn create(
        &mut self,
        parent_inum: InodeNumber,
        type_: InodeType,
        name: &str,
    ) -> Result<InodeNumber, FsError> {
        if name.is_empty() || name.len() >= NAME_MAX {
            return Err(FsError::InvalidName);
        }

        let mut parent = self.stat(parent_inum)?;
        if parent.type_ != InodeType::Directory {
            return Err(FsError::InvalidInode);
        }

        match self.lookup(parent_inum, name) {
            Ok(existing) => {
                let inode = self.stat(existing)?;
                return if inode.type_ == type_ {
                    Ok(existing)
                } else {
                    Err(FsError::InvalidType)
                };
            }
            Err(FsError::NotFound) => {}
            Err(err) => return Err(err),
        }

        let mut inode_bitmap = self.read_inode_bitmap()?;
        let new_inum = inode_bitmap
            .find_clear(1, self.super_block.num_inodes as usize)
            .ok_or(FsError::NotEnoughSpace)?[0] as InodeNumber;

        // The parent grows by one entry; a fresh parent block is needed exactly when
        // its size is block-aligned. A directory child needs a block for `.`/`..`.
        let parent_size = parent.size as usize;
        let parent_block_index = parent_size / BLOCK_SIZE;
        let parent_offset = parent_size % BLOCK_SIZE;

        if parent_offset == 0 && parent_size + BLOCK_SIZE > MAX_FILE_SIZE {
            return Err(FsError::NotEnoughSpace);
        }

        let blocks_needed =
            usize::from(parent_offset == 0) + usize::from(type_ == InodeType::Directory);

        let mut data_bitmap = self.read_data_bitmap()?;
        let available = data_bitmap
            .find_clear(blocks_needed, self.super_block.num_data as usize)
            .ok_or(FsError::NotEnoughSpace)?;

        let data_region_addr = self.super_block.data_region_addr;

        if parent_offset == 0 {
            parent.direct[parent_block_index] = data_region_addr + available[0] as i32;
        }

        let mut inode = Inode::new(type_);

        if type_ == InodeType::Directory {
            inode.size = (2 * DIRECTORY_ENTRY_SIZE) as i32;

            let child_block_addr = data_region_addr
                + *available
                    .last()
                    .expect("a directory allocation includes a content block")
                    as i32;

            let entries = [
                DirectoryEntry::new(".", new_inum)?,
                DirectoryEntry::new("..", parent_inum)?,
            ];
            let encoded = encode_entries(&entries)?;
            let mut block = EMPTY_BLOCK;
            block[..encoded.len()].copy_from_slice(&encoded);
            self.storage
                .write_block(child_block_addr as BlockNumber, &block)?;

            inode.direct[0] = child_block_addr;
        }

        for &index in &available {
            data_bitmap.set(index);
        }
        inode_bitmap.set(new_inum as usize);

        // Append the new entry at the tail of the parent's content.
        let parent_block_addr = parent.direct[parent_block_index];
        let entry = DirectoryEntry::new(name, new_inum)?;
        let encoded = bincode::serialize(&entry).context("encoding directory entry")?;

        let mut block = self.storage.read_block(parent_block_addr as BlockNumber)?;
        block[parent_offset..parent_offset + DIRECTORY_ENTRY_SIZE].copy_from_slice(&encoded);
        self.storage
            .write_block(parent_block_addr as BlockNumber, &block)?;

        parent.size += DIRECTORY_ENTRY_SIZE as i32;

        self.write_inode_bitmap(&inode_bitmap)?;
        self.write_data_bitmap(&data_bitmap)?;

        let mut inodes = self.read_inode_region()?;
        inodes[parent_inum as usize] = parent;
        inodes[new_inum as usize] = inode;
        self.write_inode_region(&inodes)?;

        Ok(new_inum)
    }

    /// Removes the entry `name` from the directory `parent_inum`, freeing the target's
    /// inode and data blocks. Unlinking a name that does not exist succeeds; unlinking
    /// a non-empty directory fails with [`FsError::DirNotEmpty`].
    pub fn unlink(&mut self, parent_inum: InodeNumber, name: &str) -> Result<(), FsError> {
        if name.is_empty() || name.len() >= NAME_MAX {
            return Err(FsError::InvalidName);
        }
        if name == "." || name == ".." {
            return Err(FsError::UnlinkNotAllowed);
        }

        let mut parent = self.stat(parent_inum)?;
        if parent.type_ != InodeType::Directory {
            return Err(FsError::InvalidType);
        }

        let target_inum = match self.lookup(parent_inum, name) {
            Ok(inum) => inum,
            Err(FsError::NotFound) => return Ok(()),
            Err(err) => return Err(err),
        };

        let target = self.stat(target_inum)?;
        if target.type_ == InodeType::Directory
            && target.size as usize > 2 * DIRECTORY_ENTRY_SIZE
        {
            return Err(FsError::DirNotEmpty);
        }

        let mut inode_bitmap = self.read_inode_bitmap()?;
        let mut data_bitmap = self.read_data_bitmap()?;

        for &ptr in &target.direct {
            if ptr != 0 {
                data_bitmap.clear((ptr - self.super_block.data_region_addr) as usize);
            }
        }
        inode_bitmap.clear(target_inum as usize);

        // Compact the parent: drop the target's slot and shift every successor left by
        // one, across block boundaries. The parent keeps all of its content blocks.
        let contents = self.read(parent_inum, parent.size as usize)?;
        let mut entries = decode_entries(&contents)?;
        let position = entries
            .iter()
            .position(|entry| entry.name.matches(name))
            .ok_or(FsError::NotFound)?;
        entries.remove(position);

        let encoded = encode_entries(&entries)?;
        for i in 0..parent.num_blocks() {
            let start = (i * BLOCK_SIZE).min(encoded.len());
            let end = ((i + 1) * BLOCK_SIZE).min(encoded.len());

            let mut block = EMPTY_BLOCK;
            block[..end - start].copy_from_slice(&encoded[start..end]);
            self.storage
                .write_block(parent.direct[i] as BlockNumber, &block)?;
        }

        parent.size -= DIRECTORY_ENTRY_SIZE as i32;

        let mut inodes = self.read_inode_region()?;
        inodes[target_inum as usize] = FREE_INODE;
        inodes[parent_inum as usize] = parent;
        self.write_inode_region(&inodes)?;

        self.write_inode_bitmap(&inode_bitmap)?;
        self.write_data_bitmap(&data_bitmap)?;

        Ok(())
    }
}

/// Decodes a packed directory entry array.
fn decode_entries(bytes: &[u8]) -> Result<Vec<DirectoryEntry>> {
    bytes
        .chunks_exact(DIRECTORY_ENTRY_SIZE)
        .map(|chunk| bincode::deserialize(chunk).context("decoding directory entry"))
        .collect()
}

/// Encodes directory entries into a packed array.
fn encode_entries(entries: &[DirectoryEntry]) -> Result<Vec<u8>> {
    Ok(entries
        .iter()
        .map(|entry| bincode::serialize(entry).context("encoding directory entry"))
        .collect::<Result<Vec<_>>>()?
        .concat())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::disk_format::inode::DIRECT_PTRS;
    use crate::storage::MemoryStorage;

    use super::*;

    fn formatted(num_inodes: usize, num_data: usize) -> FileSystem<MemoryStorage> {
        let storage = MemoryStorage::new(Superblock::new(num_inodes, num_data).num_blocks());
        FileSystem::format(storage, num_inodes, num_data).unwrap()
    }

    fn fresh_fs() -> FileSystem<MemoryStorage> {
        formatted(64, 64)
    }

    /// Every allocated inode's blocks are marked in the data bitmap, no block is
    /// claimed twice, and no marked block is unclaimed.
    fn assert_bitmap_consistency(fs: &FileSystem<MemoryStorage>) {
        let inode_bitmap = fs.read_inode_bitmap().unwrap();
        let data_bitmap = fs.read_data_bitmap().unwrap();
        let inodes = fs.read_inode_region().unwrap();

        let mut claimed = HashSet::new();
        for (inum, inode) in inodes.iter().enumerate() {
            if !inode_bitmap.is_set(inum) {
                continue;
            }
            for &ptr in inode.direct.iter().filter(|&&ptr| ptr != 0) {
                let index = (ptr - fs.super_block().data_region_addr) as usize;
                assert!(claimed.insert(index), "data block {index} claimed twice");
                assert!(data_bitmap.is_set(index), "claimed block {index} not marked");
            }
        }

        let num_data = fs.super_block().num_data as usize;
        assert_eq!(data_bitmap.count_set(num_data), claimed.len());
    }

    #[test]
    fn test_format_creates_root_directory() {
        let fs = fresh_fs();

        let root = fs.stat(ROOT_INODE).unwrap();
        assert_eq!(root.type_, InodeType::Directory);
        assert_eq!(root.size as usize, 2 * DIRECTORY_ENTRY_SIZE);

        let entries = fs.read_directory(ROOT_INODE).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].name.matches("."));
        assert_eq!(entries[0].inum, ROOT_INODE);
        assert!(entries[1].name.matches(".."));
        assert_eq!(entries[1].inum, ROOT_INODE);

        assert_bitmap_consistency(&fs);
    }

    #[test]
    fn test_stat_rejects_invalid_inodes() {
        let fs = fresh_fs();

        assert!(matches!(fs.stat(-1), Err(FsError::InvalidInode)));
        assert!(matches!(fs.stat(64), Err(FsError::InvalidInode)));
        // in range but unallocated
        assert!(matches!(fs.stat(5), Err(FsError::InvalidInode)));
    }

    #[test]
    fn test_create_and_lookup_file() {
        let mut fs = fresh_fs();

        let inum = fs.create(ROOT_INODE, InodeType::Regular, "hello.txt").unwrap();
        assert_eq!(inum, 1);

        assert_eq!(fs.lookup(ROOT_INODE, "hello.txt").unwrap(), inum);

        let inode = fs.stat(inum).unwrap();
        assert_eq!(inode.type_, InodeType::Regular);
        assert_eq!(inode.size, 0);
        assert_eq!(inode.direct, [0; DIRECT_PTRS]);

        let root = fs.stat(ROOT_INODE).unwrap();
        assert_eq!(root.size as usize, 3 * DIRECTORY_ENTRY_SIZE);

        assert_bitmap_consistency(&fs);
    }

    #[test]
    fn test_create_is_idempotent() {
        let mut fs = fresh_fs();

        let first = fs.create(ROOT_INODE, InodeType::Regular, "a").unwrap();
        let snapshot = fs.storage.blocks.clone();

        let second = fs.create(ROOT_INODE, InodeType::Regular, "a").unwrap();

        assert_eq!(second, first);
        assert_eq!(fs.storage.blocks, snapshot);
    }

    #[test]
    fn test_create_existing_name_with_other_type_fails() {
        let mut fs = fresh_fs();

        fs.create(ROOT_INODE, InodeType::Regular, "a").unwrap();
        assert!(matches!(
            fs.create(ROOT_INODE, InodeType::Directory, "a"),
            Err(FsError::InvalidType)
        ));

        fs.create(ROOT_INODE, InodeType::Directory, "d").unwrap();
        assert!(matches!(
            fs.create(ROOT_INODE, InodeType::Regular, "d"),
            Err(FsError::InvalidType)
        ));
    }

    #[test]
    fn test_create_directory_seeds_dot_entries() {
        let mut fs = fresh_fs();

        let dir = fs.create(ROOT_INODE, InodeType::Directory, "sub").unwrap();

        let entries = fs.read_directory(dir).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].name.matches("."));
        assert_eq!(entries[0].inum, dir);
        assert!(entries[1].name.matches(".."));
        assert_eq!(entries[1].inum, ROOT_INODE);

        assert_bitmap_consistency(&fs);
    }

    #[test]
    fn test_create_rejects_bad_parent() {
        let mut fs = fresh_fs();

        assert!(matches!(
            fs.create(40, InodeType::Regular, "a"),
            Err(FsError::InvalidInode)
        ));

        let file = fs.create(ROOT_INODE, InodeType::Regular, "a").unwrap();
        assert!(matches!(
            fs.create(file, InodeType::Regular, "b"),
            Err(FsError::InvalidInode)
        ));
    }

    #[test]
    fn test_create_rejects_bad_names() {
        let mut fs = fresh_fs();

        assert!(matches!(
            fs.create(ROOT_INODE, InodeType::Regular, ""),
            Err(FsError::InvalidName)
        ));
        assert!(matches!(
            fs.create(ROOT_INODE, InodeType::Regular, &"x".repeat(NAME_MAX)),
            Err(FsError::InvalidName)
        ));
        assert!(fs
            .create(ROOT_INODE, InodeType::Regular, &"x".repeat(NAME_MAX - 1))
            .is_ok());
    }

    #[test]
    fn test_create_exhausts_inodes() {
        let mut fs = formatted(2, 8);

        fs.create(ROOT_INODE, InodeType::Regular, "a").unwrap();
        assert!(matches!(
            fs.create(ROOT_INODE, InodeType::Regular, "b"),
            Err(FsError::NotEnoughSpace)
        ));
    }

    #[test]
    fn test_write_read_round_trip() {
        let mut fs = fresh_fs();
        let inum = fs.create(ROOT_INODE, InodeType::Regular, "f").unwrap();

        for size in [0, 5, BLOCK_SIZE, BLOCK_SIZE + 1, 3 * BLOCK_SIZE + 7] {
            let buf: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();

            assert_eq!(fs.write(inum, &buf).unwrap(), size);
            assert_eq!(fs.stat(inum).unwrap().size as usize, size);
            assert_eq!(fs.read(inum, size).unwrap(), buf);

            // reads larger than the file clamp to its size
            assert_eq!(fs.read(inum, MAX_FILE_SIZE).unwrap(), buf);

            assert_bitmap_consistency(&fs);
        }
    }

    #[test]
    fn test_write_max_file_size() {
        let mut fs = formatted(4, 32);
        let inum = fs.create(ROOT_INODE, InodeType::Regular, "big").unwrap();

        let buf: Vec<u8> = (0..MAX_FILE_SIZE)
            .map(|i| if i % 2 == 0 { 0xaa } else { 0x55 })
            .collect();

        assert_eq!(fs.write(inum, &buf).unwrap(), MAX_FILE_SIZE);
        assert_eq!(fs.read(inum, MAX_FILE_SIZE).unwrap(), buf);

        let too_big = vec![0; MAX_FILE_SIZE + 1];
        assert!(matches!(fs.write(inum, &too_big), Err(FsError::InvalidSize)));
    }

    #[test]
    fn test_write_rejects_directories_and_bad_inodes() {
        let mut fs = fresh_fs();

        assert!(matches!(fs.write(9, b"x"), Err(FsError::InvalidInode)));
        assert!(matches!(
            fs.write(ROOT_INODE, b"x"),
            Err(FsError::WriteToDir)
        ));
    }

    #[test]
    fn test_rewrite_releases_blocks() {
        let mut fs = fresh_fs();
        let inum = fs.create(ROOT_INODE, InodeType::Regular, "f").unwrap();

        fs.write(inum, &vec![1; 3 * BLOCK_SIZE]).unwrap();
        let data_bitmap = fs.read_data_bitmap().unwrap();
        assert_eq!(data_bitmap.count_set(64), 4); // root block + 3

        fs.write(inum, &vec![2; 10]).unwrap();
        let data_bitmap = fs.read_data_bitmap().unwrap();
        assert_eq!(data_bitmap.count_set(64), 2); // root block + 1

        assert_bitmap_consistency(&fs);
    }

    #[test]
    fn test_rewrite_can_reuse_its_own_blocks() {
        // 4 data blocks: one for the root, three free
        let mut fs = formatted(8, 4);
        let inum = fs.create(ROOT_INODE, InodeType::Regular, "f").unwrap();

        let buf = vec![7; 3 * BLOCK_SIZE];
        fs.write(inum, &buf).unwrap();

        // a full rewrite fits because the old blocks are released before allocation
        let buf = vec![8; 3 * BLOCK_SIZE];
        fs.write(inum, &buf).unwrap();
        assert_eq!(fs.read(inum, 3 * BLOCK_SIZE).unwrap(), buf);

        assert!(matches!(
            fs.write(inum, &vec![9; 4 * BLOCK_SIZE]),
            Err(FsError::NotEnoughSpace)
        ));
        assert_bitmap_consistency(&fs);
    }

    #[test]
    fn test_lookup_errors() {
        let mut fs = fresh_fs();

        assert!(matches!(
            fs.lookup(ROOT_INODE, "ghost"),
            Err(FsError::NotFound)
        ));
        assert!(matches!(
            fs.lookup(ROOT_INODE, ""),
            Err(FsError::InvalidName)
        ));
        assert!(matches!(
            fs.lookup(ROOT_INODE, &"x".repeat(NAME_MAX)),
            Err(FsError::InvalidName)
        ));

        let file = fs.create(ROOT_INODE, InodeType::Regular, "f").unwrap();
        assert!(matches!(fs.lookup(file, "a"), Err(FsError::InvalidInode)));
    }

    #[test]
    fn test_unlink_missing_name_succeeds_without_mutation() {
        let mut fs = fresh_fs();
        fs.create(ROOT_INODE, InodeType::Regular, "keep").unwrap();
        let snapshot = fs.storage.blocks.clone();

        fs.unlink(ROOT_INODE, "ghost").unwrap();

        assert_eq!(fs.storage.blocks, snapshot);
    }

    #[test]
    fn test_unlink_rejections() {
        let mut fs = fresh_fs();

        assert!(matches!(
            fs.unlink(ROOT_INODE, "."),
            Err(FsError::UnlinkNotAllowed)
        ));
        assert!(matches!(
            fs.unlink(ROOT_INODE, ".."),
            Err(FsError::UnlinkNotAllowed)
        ));
        assert!(matches!(
            fs.unlink(ROOT_INODE, ""),
            Err(FsError::InvalidName)
        ));
        assert!(matches!(fs.unlink(17, "a"), Err(FsError::InvalidInode)));

        let file = fs.create(ROOT_INODE, InodeType::Regular, "f").unwrap();
        assert!(matches!(fs.unlink(file, "a"), Err(FsError::InvalidType)));
    }

    #[test]
    fn test_unlink_frees_inode_and_blocks() {
        let mut fs = fresh_fs();

        let inum = fs.create(ROOT_INODE, InodeType::Regular, "f").unwrap();
        fs.write(inum, &vec![3; 2 * BLOCK_SIZE]).unwrap();

        fs.unlink(ROOT_INODE, "f").unwrap();

        assert!(matches!(fs.stat(inum), Err(FsError::InvalidInode)));
        assert!(matches!(
            fs.lookup(ROOT_INODE, "f"),
            Err(FsError::NotFound)
        ));

        let inode_bitmap = fs.read_inode_bitmap().unwrap();
        assert_eq!(inode_bitmap.count_set(64), 1); // only the root
        let data_bitmap = fs.read_data_bitmap().unwrap();
        assert_eq!(data_bitmap.count_set(64), 1); // only the root's block

        assert_bitmap_consistency(&fs);
    }

    #[test]
    fn test_unlink_nonempty_directory_fails() {
        let mut fs = fresh_fs();

        let dir = fs.create(ROOT_INODE, InodeType::Directory, "d").unwrap();
        fs.create(dir, InodeType::Regular, "inner").unwrap();

        assert!(matches!(
            fs.unlink(ROOT_INODE, "d"),
            Err(FsError::DirNotEmpty)
        ));

        fs.unlink(dir, "inner").unwrap();
        fs.unlink(ROOT_INODE, "d").unwrap();

        assert!(matches!(
            fs.lookup(ROOT_INODE, "d"),
            Err(FsError::NotFound)
        ));
        assert_bitmap_consistency(&fs);
    }

    #[test]
    fn test_unlink_compacts_entries() {
        let mut fs = fresh_fs();

        fs.create(ROOT_INODE, InodeType::Regular, "a").unwrap();
        fs.create(ROOT_INODE, InodeType::Regular, "b").unwrap();
        fs.create(ROOT_INODE, InodeType::Regular, "c").unwrap();

        fs.unlink(ROOT_INODE, "b").unwrap();

        let names: Vec<String> = fs
            .read_directory(ROOT_INODE)
            .unwrap()
            .iter()
            .map(|entry| entry.name.to_string())
            .collect();
        assert_eq!(names, [".", "..", "a", "c"]);

        let root = fs.stat(ROOT_INODE).unwrap();
        assert_eq!(root.size as usize, 4 * DIRECTORY_ENTRY_SIZE);
    }

    #[test]
    fn test_unlink_shifts_entries_across_blocks() {
        let entries_per_block = BLOCK_SIZE / DIRECTORY_ENTRY_SIZE;
        let mut fs = formatted(256, 64);

        // fill the root's first content block and spill one entry into a second
        let spill_count = entries_per_block - 2 + 1;
        for i in 0..spill_count {
            fs.create(ROOT_INODE, InodeType::Regular, &format!("f{i:03}"))
                .unwrap();
        }

        let root = fs.stat(ROOT_INODE).unwrap();
        assert_eq!(root.num_blocks(), 2);

        fs.unlink(ROOT_INODE, "f000").unwrap();

        // the spilled entry moved down into the first block
        let root = fs.stat(ROOT_INODE).unwrap();
        assert_eq!(root.size as usize, entries_per_block * DIRECTORY_ENTRY_SIZE);

        let entries = fs.read_directory(ROOT_INODE).unwrap();
        assert_eq!(entries.len(), entries_per_block);
        assert!(entries.last().unwrap().name.matches(&format!("f{:03}", spill_count - 1)));

        for i in 1..spill_count {
            assert!(fs.lookup(ROOT_INODE, &format!("f{i:03}")).is_ok());
        }
        assert!(matches!(
            fs.lookup(ROOT_INODE, "f000"),
            Err(FsError::NotFound)
        ));

        assert_bitmap_consistency(&fs);
    }

    #[test]
    fn test_inode_region_round_trip() {
        let mut fs = fresh_fs();

        let mut inodes = fs.read_inode_region().unwrap();
        assert_eq!(inodes.len(), 64);

        inodes[7] = Inode::new(InodeType::Regular);
        inodes[7].size = 1234;
        inodes[7].direct[0] = 42;
        fs.write_inode_region(&inodes).unwrap();

        assert_eq!(fs.read_inode_region().unwrap(), inodes);
    }
}
