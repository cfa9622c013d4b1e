use std::collections::HashMap;
use std::fs::File;
use std::os::unix::prelude::FileExt;
use std::path::Path;

use anyhow::{Context, Result};

use crate::disk_format::block::{Block, BlockNumber, BLOCK_SIZE};

use super::block_storage::BlockStorage;

/// A disk image file with transactional write staging.
///
/// While a transaction is open, writes land in an in-memory shadow map instead of the
/// file, and reads consult the shadow map before falling back to the file. Committing
/// flushes the staged blocks; rolling back discards them. Outside a transaction, writes
/// go straight to the file.
pub struct Disk {
    file: File,
    transaction: Option<HashMap<BlockNumber, Block>>,
}

impl Disk {
    /// Opens an existing disk image for reading and writing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .open(path)
            .context("opening disk image")?;

        Ok(Disk {
            file,
            transaction: None,
        })
    }

    /// Creates a new disk image file, truncating any existing one.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .context("creating disk image")?;

        Ok(Disk {
            file,
            transaction: None,
        })
    }

    /// Opens a transaction. Panics if one is already open; transactions do not nest.
    pub fn begin_transaction(&mut self) {
        assert!(
            self.transaction.is_none(),
            "begin_transaction called with a transaction already open"
        );
        self.transaction = Some(HashMap::new());
    }

    /// Flushes every staged block to the image and closes the transaction. The flush
    /// order is unspecified. Panics if no transaction is open.
    pub fn commit(&mut self) -> Result<()> {
        let staged = self
            .transaction
            .take()
            .expect("commit called without an open transaction");

        for (block_number, block) in staged {
            self.write_block_raw(block_number, &block)?;
        }

        Ok(())
    }

    /// Discards every staged block and closes the transaction. Does nothing if no
    /// transaction is open.
    pub fn rollback(&mut self) {
        self.transaction = None;
    }

    fn write_block_raw(&mut self, block_number: BlockNumber, block: &Block) -> Result<()> {
        let position = block_number * BLOCK_SIZE;

        self.file
            .write_all_at(block, position as u64)
            .context("writing block")?;

        Ok(())
    }
}

impl BlockStorage for Disk {
    fn read_block(&self, block_number: BlockNumber) -> Result<Block> {
        if let Some(staged) = &self.transaction {
            if let Some(block) = staged.get(&block_number) {
                return Ok(*block);
            }
        }

        let mut buf = [0; BLOCK_SIZE];
        let position = block_number * BLOCK_SIZE;

        self.file
            .read_exact_at(&mut buf, position as u64)
            .context("reading requested block")?;

        Ok(buf)
    }

    fn write_block(&mut self, block_number: BlockNumber, block: &Block) -> Result<()> {
        match &mut self.transaction {
            Some(staged) => {
                staged.insert(block_number, *block);
                Ok(())
            }
            None => self.write_block_raw(block_number, block),
        }
    }
}
