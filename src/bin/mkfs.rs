use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use ds3::fs::FileSystem;
use ds3::storage::Disk;

/// Create and format a ds3 disk image.
#[derive(Parser)]
struct Args {
    /// Disk image file to create
    #[arg(short, long)]
    file: PathBuf,

    /// Number of inodes
    #[arg(short, long)]
    inodes: usize,

    /// Number of data blocks
    #[arg(short, long)]
    data_blocks: usize,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let disk = Disk::create(&args.file)?;
    let fs = FileSystem::format(disk, args.inodes, args.data_blocks)?;

    info!(
        "formatted {} with {} inodes and {} data blocks ({} blocks total)",
        args.file.display(),
        args.inodes,
        args.data_blocks,
        fs.super_block().num_blocks()
    );

    Ok(())
}
