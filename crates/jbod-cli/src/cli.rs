use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Serve the reference array over TCP.
    Serve(ServeArgs),

    /// Replay a workload trace against an array server.
    Replay(ReplayArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[arg(long, env = "JBOD_LISTEN", default_value = "127.0.0.1:3333")]
    pub listen: SocketAddr,

    #[arg(long, env = "JBOD_DISK_DIR", default_value = "./disks")]
    pub disk_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Trace file with one MOUNT, UNMOUNT, READ or WRITE command per line.
    pub trace: PathBuf,

    #[arg(long, env = "JBOD_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "JBOD_PORT", default_value_t = 3333)]
    pub port: u16,

    /// Number of cache slots (2..=4096); the cache is disabled when omitted.
    #[arg(long, env = "JBOD_CACHE_SIZE")]
    pub cache_size: Option<usize>,

    /// Also cache blocks fetched by read misses.
    #[arg(long)]
    pub cache_read_misses: bool,

    /// Write read results here as hex lines.
    #[arg(long)]
    pub output: Option<PathBuf>,
}
