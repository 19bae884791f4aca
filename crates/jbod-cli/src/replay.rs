use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use jbod_rs::{ArrayClient, Transport};
use tracing::debug;

use crate::trace::TraceOp;

#[derive(Debug, Default, Eq, PartialEq)]
pub struct ReplayStats {
    pub ops: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

/// `replay` runs `ops` in order, writing each read result as a hex line to `out`.
///
/// # Errors
/// Stops at the first failed operation.
pub fn replay<T: Transport>(
    client: &mut ArrayClient<T>,
    ops: &[TraceOp],
    out: &mut dyn Write,
) -> Result<ReplayStats> {
    let mut stats = ReplayStats::default();
    let mut buf = Vec::new();
    for (i, op) in ops.iter().enumerate() {
        debug!(?op, "replaying");
        match *op {
            TraceOp::Mount => client.mount().context("MOUNT")?,
            TraceOp::Unmount => client.unmount().context("UNMOUNT")?,
            TraceOp::Read { addr, len } => {
                buf.resize(len as usize, 0);
                let n = client
                    .read(addr, len, &mut buf)
                    .with_context(|| format!("READ {addr} {len}"))?;
                writeln!(out, "{addr} {len} {}", hex(&buf[..n as usize]))?;
                stats.bytes_read += u64::from(n);
            }
            TraceOp::Write { addr, len, fill } => {
                buf.clear();
                buf.resize(len as usize, fill);
                let n = client
                    .write(addr, len, &buf)
                    .with_context(|| format!("WRITE {addr} {len} {fill}"))?;
                stats.bytes_written += u64::from(n);
            }
        }
        stats.ops = i as u64 + 1;
    }
    Ok(stats)
}

fn hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}
