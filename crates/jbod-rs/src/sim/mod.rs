//! Reference array server: sixteen image-backed disks driven by opcodes.
//!
//! This is the cooperating peer the client talks to in tests and from the CLI's
//! `serve` command. It keeps a mount flag and an I/O cursor (current disk and
//! block); read-block and write-block act at the cursor and advance it by one block.

mod disk;
mod server;

pub use disk::DiskImage;
pub use server::{handle_connection, serve};

use std::path::Path;

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::geometry::{BLOCK_SIZE, BLOCKS_PER_DISK, Block, DISK_COUNT};
use crate::net::{Payload, Transport};
use crate::proto::{Command, Opcode};

/// Status codes returned by the reference array.
#[repr(u16)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Status {
    Ok = 0,
    AlreadyMounted = 1,
    Unmounted = 2,
    BadCommand = 3,
    BadBlock = 4,
    Io = 5,
}

pub struct ReferenceArray {
    disks: Vec<DiskImage>,
    mounted: bool,
    disk: usize,
    block: usize,
}

impl ReferenceArray {
    /// `open` maps `disk-{i}.img` for every disk under `dir`, creating missing images.
    ///
    /// # Errors
    /// Returns an error if the directory or any image cannot be prepared.
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create disk directory {}", dir.display()))?;
        let disks = (0..DISK_COUNT)
            .map(|i| DiskImage::open(&dir.join(format!("disk-{i}.img"))))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let fresh = disks.iter().filter(|d| d.fresh).count();
        info!(dir = %dir.display(), fresh, "reference array opened");
        Ok(Self {
            disks,
            mounted: false,
            disk: 0,
            block: 0,
        })
    }

    #[must_use]
    pub const fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// `execute` runs one raw opcode. `block` is read for write-block and filled for read-block.
    pub fn execute(&mut self, raw: u32, block: &mut Block) -> Status {
        let Ok(op) = Opcode::decode(raw) else {
            return Status::BadCommand;
        };
        let status = self.apply(op, block);
        debug!(?op, ?status, "executed");
        status
    }

    fn apply(&mut self, op: Opcode, block: &mut Block) -> Status {
        match op.command {
            Command::Mount if self.mounted => Status::AlreadyMounted,
            Command::Mount => {
                self.mounted = true;
                self.disk = 0;
                self.block = 0;
                Status::Ok
            }
            _ if !self.mounted => Status::Unmounted,
            Command::Unmount => {
                self.mounted = false;
                self.flush()
            }
            Command::SeekToDisk => {
                self.disk = usize::from(op.disk);
                self.block = 0;
                Status::Ok
            }
            Command::SeekToBlock => {
                self.block = usize::from(op.block);
                Status::Ok
            }
            Command::ReadBlock => {
                if self.block >= BLOCKS_PER_DISK {
                    return Status::BadBlock;
                }
                self.disks[self.disk].read_block(self.block, block);
                self.block += 1;
                Status::Ok
            }
            Command::WriteBlock => {
                if self.block >= BLOCKS_PER_DISK {
                    return Status::BadBlock;
                }
                self.disks[self.disk].write_block(self.block, block);
                self.block += 1;
                Status::Ok
            }
        }
    }

    fn flush(&self) -> Status {
        for disk in &self.disks {
            if let Err(err) = disk.flush() {
                warn!(path = %disk.path().display(), error = %err, "flush failed");
                return Status::Io;
            }
        }
        Status::Ok
    }
}

/// In-process loopback: the array answers calls directly, without a socket.
impl Transport for ReferenceArray {
    fn call(&mut self, opcode: Opcode, payload: Payload<'_>) -> Result<u16> {
        let mut scratch = [0u8; BLOCK_SIZE];
        let status = match payload {
            Payload::None if opcode.command == Command::WriteBlock => Status::BadCommand,
            Payload::None => self.execute(opcode.encode(), &mut scratch),
            Payload::Send(data) => {
                scratch.copy_from_slice(data);
                self.execute(opcode.encode(), &mut scratch)
            }
            Payload::Recv(out) => {
                let status = self.execute(opcode.encode(), &mut scratch);
                if status == Status::Ok && opcode.command == Command::ReadBlock {
                    out.copy_from_slice(&scratch);
                }
                status
            }
        };
        Ok(status as u16)
    }
}
