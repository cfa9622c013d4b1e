use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::Parser;

use ds3::disk_format::inode::{InodeNumber, InodeType, ROOT_INODE};
use ds3::fs::FileSystem;
use ds3::storage::{BlockStorage, Disk};

/// Print every directory in a disk image, depth first.
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

    let stdout = io::stdout();
    print_tree(&fs, ROOT_INODE, "/", &mut stdout.lock())?;

    Ok(())
}

/// Prints the directory at `inum`, then recurses into its subdirectories. Entries are
/// sorted byte-wise by name; `.` and `..` are skipped.
fn print_tree<S: BlockStorage>(
    fs: &FileSystem<S>,
    inum: InodeNumber,
    path: &str,
    out: &mut impl Write,
) -> Result<()> {
    let mut entries = fs.read_directory(inum)?;
    entries.retain(|entry| !entry.name.matches(".") && !entry.name.matches(".."));
    entries.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));

    writeln!(out, "Directory {path}")?;
    for entry in &entries {
        writeln!(out, "{}\t{}", entry.inum, entry.name)?;
    }
    writeln!(out)?;

    for entry in &entries {
        if fs.stat(entry.inum)?.type_ == InodeType::Directory {
            print_tree(fs, entry.inum, &format!("{path}{}/", entry.name), out)?;
        }
    }

    Ok(())
}
