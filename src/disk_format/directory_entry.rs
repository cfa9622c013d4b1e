use std::fmt;
use std::mem::size_of;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::block::BLOCK_SIZE;
use super::inode::InodeNumber;

/// The size of the name field of a directory entry. Names must be strictly shorter so
/// that a stored name is never confused with its zero padding.
pub const NAME_MAX: usize = 28;

/// The number of bytes occupied by a directory entry.
pub const DIRECTORY_ENTRY_SIZE: usize = 32;
const_assert!(size_of::<DirectoryEntry>() == DIRECTORY_ENTRY_SIZE);

const_assert!(BLOCK_SIZE % DIRECTORY_ENTRY_SIZE == 0);
/// The number of directory entries that fit in a block.
pub const ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DIRECTORY_ENTRY_SIZE;

/// A directory entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct DirectoryEntry {
    /// Entry name.
    pub name: EntryName,
    /// Inode number of the entry.
    pub inum: InodeNumber,
}

impl DirectoryEntry {
    /// Constructs a new [`DirectoryEntry`]. Fails if the name is empty or too long.
    pub fn new(name: &str, inum: InodeNumber) -> Result<DirectoryEntry> {
        Ok(DirectoryEntry {
            name: name.try_into()?,
            inum,
        })
    }
}

/// A directory entry name: a zero-padded byte string of length in `[1, NAME_MAX)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryName([u8; NAME_MAX]);

impl EntryName {
    /// The stored name bytes, without the zero padding.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(NAME_MAX);
        &self.0[..len]
    }

    /// Whether the stored name is byte-for-byte equal to `name`.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.as_bytes() == name.as_bytes()
    }
}

impl TryFrom<&str> for EntryName {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let bytes = value.as_bytes();
        if bytes.is_empty() || bytes.len() >= NAME_MAX {
            bail!("entry name length must be between 1 and {} bytes", NAME_MAX - 1);
        }

        let mut converted = [0; NAME_MAX];
        converted[0..bytes.len()].copy_from_slice(bytes);

        Ok(EntryName(converted))
    }
}

impl fmt::Display for EntryName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.as_bytes()))
    }
}
