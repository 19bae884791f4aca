//! Geometry helpers for mapping linear byte addresses onto disk/block/offset triples.


use crate::error::{JbodError, Result};

pub const DISK_COUNT: usize = 16;
pub const BLOCKS_PER_DISK: usize = 256;
pub const BLOCK_SIZE: usize = 256;
pub const DISK_SIZE: usize = BLOCKS_PER_DISK * BLOCK_SIZE;
pub const ADDRESS_SPACE: usize = DISK_COUNT * DISK_SIZE;
/// Largest byte count a single read or write may transfer.
pub const MAX_IO_SIZE: usize = 1024;

/// One disk block worth of bytes.
pub type Block = [u8; BLOCK_SIZE];

/// BlockAddr names a byte inside the array by disk, block and in-block offset.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BlockAddr {
    pub disk: u32,
    pub block: u32,
    pub offset: usize,
}

/// Chunk is one per-block slice of a larger read or write.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Chunk {
    pub at: BlockAddr,
    /// Bytes transferred within this block.
    pub len: usize,
    /// Position of this chunk inside the caller's buffer.
    pub buf_offset: usize,
}

/// `locate` maps a linear address to its disk, block and offset.
///
/// # Arguments
/// * `address` - Linear byte address; callers validate it against [`ADDRESS_SPACE`].
#[must_use]
pub const fn locate(address: u32) -> BlockAddr {
    let a = address as usize;
    BlockAddr {
        disk: (a / DISK_SIZE) as u32,
        block: ((a % DISK_SIZE) / BLOCK_SIZE) as u32,
        offset: a % BLOCK_SIZE,
    }
}

/// `check_range` validates that `[address, address + length)` is a legal single operation.
///
/// # Errors
/// Returns `InvalidArgument` if the range runs past the address space or `length`
/// exceeds [`MAX_IO_SIZE`].
pub fn check_range(address: u32, length: u32) -> Result<()> {
    let end = u64::from(address) + u64::from(length);
    if end > ADDRESS_SPACE as u64 {
        return Err(JbodError::InvalidArgument("range exceeds address space"));
    }
    if length as usize > MAX_IO_SIZE {
        return Err(JbodError::InvalidArgument("length exceeds maximum I/O size"));
    }
    Ok(())
}

/// `chunks` splits `[address, address + length)` into per-block sub-operations.
///
/// Only the first chunk may start at a non-zero offset and only the last may be short.
#[must_use]
pub const fn chunks(address: u32, length: u32) -> Chunks {
    Chunks {
        cursor: address as usize,
        end: address as usize + length as usize,
        start: address as usize,
    }
}

pub struct Chunks {
    cursor: usize,
    end: usize,
    start: usize,
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.cursor >= self.end {
            return None;
        }
        #[allow(clippy::cast_possible_truncation)]
        let at = locate(self.cursor as u32);
        let len = (BLOCK_SIZE - at.offset).min(self.end - self.cursor);
        let chunk = Chunk {
            at,
            len,
            buf_offset: self.cursor - self.start,
        };
        self.cursor += len;
        Some(chunk)
    }
}
