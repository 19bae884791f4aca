//! Wire format of the array protocol: packed opcodes and length-prefixed frames.
//!
//! Every frame starts with an 8-byte header in network byte order:
//!
//! | bytes | field  |
//! |-------|--------|
//! | 0..2  | length (8, or 264 when a block follows) |
//! | 2..6  | opcode |
//! | 6..8  | status (responses only, 0 = success) |
//!
//! A request carries a block only for [`Command::WriteBlock`]; a response only for
//! [`Command::ReadBlock`].


use std::io::{self, Read, Write};

use crate::error::{JbodError, Result};
use crate::geometry::{BLOCK_SIZE, BLOCKS_PER_DISK, Block, DISK_COUNT};

pub const HEADER_LEN: usize = 8;
pub const FRAME_LEN_WITH_BLOCK: usize = HEADER_LEN + BLOCK_SIZE;

const COMMAND_SHIFT: u32 = 14;
const COMMAND_MASK: u32 = 0x3F;
const BLOCK_SHIFT: u32 = 20;
const BLOCK_MASK: u32 = 0xFF;
const DISK_SHIFT: u32 = 28;
const DISK_MASK: u32 = 0xF;

#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Command {
    Mount = 0,
    Unmount = 1,
    SeekToDisk = 2,
    SeekToBlock = 3,
    ReadBlock = 4,
    WriteBlock = 5,
}

impl TryFrom<u32> for Command {
    type Error = JbodError;

    fn try_from(raw: u32) -> Result<Self> {
        Ok(match raw {
            0 => Self::Mount,
            1 => Self::Unmount,
            2 => Self::SeekToDisk,
            3 => Self::SeekToBlock,
            4 => Self::ReadBlock,
            5 => Self::WriteBlock,
            _ => return Err(JbodError::InvalidArgument("unknown command")),
        })
    }
}

/// Opcode is a command plus its disk and block operands.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Opcode {
    pub command: Command,
    pub disk: u8,
    pub block: u8,
}

impl Opcode {
    #[must_use]
    pub const fn new(command: Command) -> Self {
        Self {
            command,
            disk: 0,
            block: 0,
        }
    }

    #[must_use]
    pub const fn mount() -> Self {
        Self::new(Command::Mount)
    }

    #[must_use]
    pub const fn unmount() -> Self {
        Self::new(Command::Unmount)
    }

    /// # Errors
    /// Returns `InvalidArgument` if `disk` is not a valid disk number.
    #[allow(clippy::cast_possible_truncation)]
    pub fn seek_to_disk(disk: u32) -> Result<Self> {
        if disk as usize >= DISK_COUNT {
            return Err(JbodError::InvalidArgument("disk number out of range"));
        }
        Ok(Self {
            disk: disk as u8,
            ..Self::new(Command::SeekToDisk)
        })
    }

    /// # Errors
    /// Returns `InvalidArgument` if `block` is not a valid block number.
    #[allow(clippy::cast_possible_truncation)]
    pub fn seek_to_block(block: u32) -> Result<Self> {
        if block as usize >= BLOCKS_PER_DISK {
            return Err(JbodError::InvalidArgument("block number out of range"));
        }
        Ok(Self {
            block: block as u8,
            ..Self::new(Command::SeekToBlock)
        })
    }

    #[must_use]
    pub const fn read_block() -> Self {
        Self::new(Command::ReadBlock)
    }

    #[must_use]
    pub const fn write_block() -> Self {
        Self::new(Command::WriteBlock)
    }

    /// `encode` packs the opcode as `(command << 14) | (disk << 28) | (block << 20)`.
    #[must_use]
    pub const fn encode(&self) -> u32 {
        ((self.command as u32) << COMMAND_SHIFT)
            | (((self.disk as u32) & DISK_MASK) << DISK_SHIFT)
            | ((self.block as u32) << BLOCK_SHIFT)
    }

    /// `decode` unpacks a raw opcode produced by [`Self::encode`].
    ///
    /// # Errors
    /// Returns `InvalidArgument` if the command field holds an unknown command.
    #[allow(clippy::cast_possible_truncation)]
    pub fn decode(raw: u32) -> Result<Self> {
        let command = Command::try_from((raw >> COMMAND_SHIFT) & COMMAND_MASK)?;
        Ok(Self {
            command,
            disk: ((raw >> DISK_SHIFT) & DISK_MASK) as u8,
            block: ((raw >> BLOCK_SHIFT) & BLOCK_MASK) as u8,
        })
    }
}

/// Header is the fixed prefix of every frame, in host byte order.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Header {
    pub length: u16,
    pub opcode: u32,
    pub status: u16,
}

impl Header {
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn new(opcode: u32, status: u16, with_block: bool) -> Self {
        let length = if with_block {
            FRAME_LEN_WITH_BLOCK
        } else {
            HEADER_LEN
        };
        Self {
            length: length as u16,
            opcode,
            status,
        }
    }

    /// Whether a block follows this header on the wire.
    #[must_use]
    pub const fn has_block(&self) -> bool {
        self.length as usize > HEADER_LEN
    }

    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..2].copy_from_slice(&self.length.to_be_bytes());
        buf[2..6].copy_from_slice(&self.opcode.to_be_bytes());
        buf[6..8].copy_from_slice(&self.status.to_be_bytes());
        buf
    }

    #[must_use]
    pub const fn decode(buf: &[u8; HEADER_LEN]) -> Self {
        Self {
            length: u16::from_be_bytes([buf[0], buf[1]]),
            opcode: u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]),
            status: u16::from_be_bytes([buf[6], buf[7]]),
        }
    }
}

/// `write_full` writes all of `buf`, retrying short and interrupted writes.
///
/// # Errors
/// Returns `WriteZero` if the peer stops accepting bytes, or the underlying error.
pub fn write_full<W: Write + ?Sized>(w: &mut W, buf: &[u8]) -> io::Result<()> {
    let mut written = 0;
    while written < buf.len() {
        match w.write(&buf[written..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "connection closed during write",
                ));
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// `read_full` fills all of `buf`, retrying short and interrupted reads.
///
/// # Errors
/// Returns `UnexpectedEof` if the peer closes before `buf` is full, or the underlying error.
pub fn read_full<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> io::Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed during read",
                ));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// `write_frame` sends one frame, appending `block` when present.
///
/// # Errors
/// Propagates any I/O failure from the writer.
pub fn write_frame<W: Write + ?Sized>(
    w: &mut W,
    opcode: u32,
    status: u16,
    block: Option<&Block>,
) -> io::Result<()> {
    let header = Header::new(opcode, status, block.is_some());
    let mut frame = [0u8; FRAME_LEN_WITH_BLOCK];
    frame[..HEADER_LEN].copy_from_slice(&header.encode());
    if let Some(block) = block {
        frame[HEADER_LEN..].copy_from_slice(block);
    }
    write_full(w, &frame[..header.length as usize])?;
    w.flush()
}

/// `read_frame` receives one frame; the trailing block, if any, lands in `block`.
///
/// `block` is only written when the header announces a block.
///
/// # Errors
/// Propagates any I/O failure from the reader.
pub fn read_frame<R: Read + ?Sized>(r: &mut R, block: &mut Block) -> io::Result<Header> {
    let mut raw = [0u8; HEADER_LEN];
    read_full(r, &mut raw)?;
    let header = Header::decode(&raw);
    if header.has_block() {
        read_full(r, block)?;
    }
    Ok(header)
}
