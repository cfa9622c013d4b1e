use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use ds3::fs::FileSystem;
use ds3::server;
use ds3::storage::Disk;

/// Serve a ds3 disk image over HTTP.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Disk image file
    image: PathBuf,

    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: String,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let disk = Disk::open(&args.image)?;
    let fs = FileSystem::open(disk)?;

    server::serve(fs, &args.listen)
}
