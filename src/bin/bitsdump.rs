use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::Parser;

use ds3::fs::FileSystem;
use ds3::storage::Disk;

/// Print the region addresses and both allocation bitmaps of a disk image.
#[derive(Parser)]
struct Args {
    /// Disk image file
    image: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::try_parse().unwrap_or_else(|err| {
        let _ = err.print();
        process::exit(1);
    });

    let disk = Disk::open(&args.image)?;
    let fs = FileSystem::open(disk)?;
    let super_block = fs.super_block();

    println!("Super");
    println!("inode_region_addr {}", super_block.inode_region_addr);
    println!("data_region_addr {}", super_block.data_region_addr);
    println!();

    println!("Inode bitmap");
    print_bitmap(fs.read_inode_bitmap()?.as_bytes());
    println!();

    println!("Data bitmap");
    print_bitmap(fs.read_data_bitmap()?.as_bytes());

    Ok(())
}

/// Prints every byte as an unsigned decimal followed by a space, on one line.
fn print_bitmap(bytes: &[u8]) {
    let line: String = bytes.iter().map(|byte| format!("{byte} ")).collect();
    println!("{line}");
}
