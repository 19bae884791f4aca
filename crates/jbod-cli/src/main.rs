mod cli;
mod replay;
mod trace;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::net::TcpListener;

use anyhow::{Context, Result};
use clap::Parser;
use jbod_rs::sim::{ReferenceArray, serve};
use jbod_rs::{ArrayClient, BlockCache, CacheFill, TcpTransport};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, ReplayArgs, ServeArgs};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    match Cli::parse().command {
        Command::Serve(args) => run_serve(&args),
        Command::Replay(args) => run_replay(&args),
    }
}

fn run_serve(args: &ServeArgs) -> Result<()> {
    let mut array = ReferenceArray::open(&args.disk_dir)?;
    let listener = TcpListener::bind(args.listen)
        .with_context(|| format!("failed to bind {}", args.listen))?;
    info!(listen = %args.listen, "serving reference array");
    serve(&listener, &mut array).context("accept failed")
}

fn run_replay(args: &ReplayArgs) -> Result<()> {
    let text = std::fs::read_to_string(&args.trace)
        .with_context(|| format!("failed to read trace {}", args.trace.display()))?;
    let ops = trace::parse_trace(&text)?;

    let cache = match args.cache_size {
        Some(n) => BlockCache::with_capacity(n).context("invalid cache size")?,
        None => BlockCache::new(),
    };
    let fill = if args.cache_read_misses {
        CacheFill::ReadAndWrite
    } else {
        CacheFill::WriteThrough
    };

    let mut transport = TcpTransport::new();
    transport
        .connect(&args.host, args.port)
        .with_context(|| format!("failed to connect to {}:{}", args.host, args.port))?;
    let mut client = ArrayClient::with_cache(transport, cache).cache_fill(fill);

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => Box::new(io::sink()),
    };

    let stats = replay::replay(&mut client, &ops, &mut out)?;
    out.flush()?;
    info!(
        "replay: ops={}, bytes_read={}, bytes_written={}",
        stats.ops, stats.bytes_read, stats.bytes_written
    );

    if client.cache().enabled() {
        eprintln!("{}", client.cache().hit_rate_report());
        client.cache_mut().destroy()?;
    }
    client.transport_mut().disconnect();
    Ok(())
}
