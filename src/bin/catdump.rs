use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::Parser;

use ds3::disk_format::inode::InodeNumber;
use ds3::fs::FileSystem;
use ds3::storage::Disk;

/// Print the block numbers and contents of a file by inode number.
#[derive(Parser)]
struct Args {
    /// Disk image file
    image: PathBuf,

    /// Inode number
    inum: InodeNumber,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::try_parse().unwrap_or_else(|err| {
        let _ = err.print();
        process::exit(1);
    });

    let disk = Disk::open(&args.image)?;
    let fs = FileSystem::open(disk)?;

    let inode = fs.stat(args.inum)?;

    println!("File blocks");
    for &ptr in inode.direct.iter().take(inode.num_blocks()) {
        if ptr != 0 {
            println!("{ptr}");
        }
    }
    println!();

    let data = fs.read(args.inum, inode.size as usize)?;

    println!("File data");
    io::stdout().write_all(&data)?;

    Ok(())
}
