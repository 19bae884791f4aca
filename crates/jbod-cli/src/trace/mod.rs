//! Workload trace format: one command per line, `#` starts a comment.
//!
//! ```text
//! MOUNT
//! WRITE <addr> <len> <byte>
//! READ <addr> <len>
//! UNMOUNT
//! ```


use anyhow::{Context, Result, anyhow, bail};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TraceOp {
    Mount,
    Unmount,
    Read { addr: u32, len: u32 },
    /// Writes `len` copies of `fill`.
    Write { addr: u32, len: u32, fill: u8 },
}

pub fn parse_trace(text: &str) -> Result<Vec<TraceOp>> {
    let mut ops = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if let Some(op) = parse_line(line).with_context(|| format!("trace line {}", i + 1))? {
            ops.push(op);
        }
    }
    Ok(ops)
}

fn parse_line(line: &str) -> Result<Option<TraceOp>> {
    let line = line.split('#').next().unwrap_or_default().trim();
    let mut words = line.split_whitespace();
    let Some(cmd) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let op = match (cmd.to_ascii_uppercase().as_str(), args.as_slice()) {
        ("MOUNT", []) => TraceOp::Mount,
        ("UNMOUNT", []) => TraceOp::Unmount,
        ("READ", [addr, len]) => TraceOp::Read {
            addr: number(addr)?,
            len: number(len)?,
        },
        ("WRITE", [addr, len, fill]) => TraceOp::Write {
            addr: number(addr)?,
            len: number(len)?,
            fill: number(fill)?,
        },
        (other, _) => bail!("unrecognised command or arguments: {other} {}", args.join(" ")),
    };
    Ok(Some(op))
}

fn number<N: TryFrom<u64>>(word: &str) -> Result<N> {
    let value: u64 = match word.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => word.parse(),
    }
    .with_context(|| format!("invalid number {word:?}"))?;
    N::try_from(value).map_err(|_| anyhow!("number {value} out of range"))
}
