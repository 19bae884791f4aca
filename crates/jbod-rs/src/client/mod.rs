//! Array client: maps linear byte ranges onto per-block transport calls.
//!
//! Every read or write is split into block-sized chunks (see [`crate::geometry::chunks`]).
//! For each chunk the client consults the block cache first and only goes to the
//! server on a miss. Writes are read-modify-write of whole blocks; after a
//! successful write-back the block is inserted into (or refreshed in) the cache so
//! the cache never disagrees with the server.

#[cfg(test)]
mod client_tests;

use tracing::{debug, info};

use crate::cache::BlockCache;
use crate::error::{JbodError, Result};
use crate::geometry::{BLOCK_SIZE, Block, check_range, chunks};
use crate::net::{Payload, Transport};
use crate::proto::Opcode;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum MountState {
    #[default]
    Unmounted,
    Mounted,
}

/// Which operations populate the cache.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum CacheFill {
    /// Only blocks written back to the server are cached.
    #[default]
    WriteThrough,
    /// Blocks fetched on a read miss are cached as well.
    ReadAndWrite,
}

pub struct ArrayClient<T: Transport> {
    transport: T,
    cache: BlockCache,
    state: MountState,
    fill: CacheFill,
}

impl<T: Transport> ArrayClient<T> {
    /// `new` returns an unmounted client with a disabled cache.
    pub const fn new(transport: T) -> Self {
        Self::with_cache(transport, BlockCache::new())
    }

    pub const fn with_cache(transport: T, cache: BlockCache) -> Self {
        Self {
            transport,
            cache,
            state: MountState::Unmounted,
            fill: CacheFill::WriteThrough,
        }
    }

    #[must_use]
    pub fn cache_fill(mut self, fill: CacheFill) -> Self {
        self.fill = fill;
        self
    }

    #[must_use]
    pub const fn state(&self) -> MountState {
        self.state
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.state == MountState::Mounted
    }

    #[must_use]
    pub const fn cache(&self) -> &BlockCache {
        &self.cache
    }

    pub const fn cache_mut(&mut self) -> &mut BlockCache {
        &mut self.cache
    }

    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    pub const fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// `mount` performs the mount handshake with the server.
    ///
    /// # Errors
    /// Returns the transport error or the non-zero server status; the state stays unmounted.
    pub fn mount(&mut self) -> Result<()> {
        self.exec(Opcode::mount(), Payload::None)?;
        self.state = MountState::Mounted;
        info!("array mounted");
        Ok(())
    }

    /// `unmount` asks the server to unmount the array.
    ///
    /// # Errors
    /// Returns the transport error or the non-zero server status; the state is unchanged.
    pub fn unmount(&mut self) -> Result<()> {
        self.exec(Opcode::unmount(), Payload::None)?;
        self.state = MountState::Unmounted;
        info!("array unmounted");
        Ok(())
    }

    /// `read` copies `length` bytes starting at `address` into `out`.
    ///
    /// # Arguments
    /// * `address` - Linear byte address of the first byte.
    /// * `length` - Bytes to read, at most [`crate::geometry::MAX_IO_SIZE`].
    /// * `out` - Destination; must hold at least `length` bytes when `length > 0`.
    ///
    /// # Returns
    /// The number of bytes read, always `length`.
    ///
    /// # Errors
    /// Fails without side effects when unmounted or on invalid arguments; fails as a
    /// whole if any block transfer fails.
    pub fn read(&mut self, address: u32, length: u32, out: &mut [u8]) -> Result<u32> {
        self.check_request(address, length, out.len())?;
        if length == 0 {
            return Ok(0);
        }

        let mut block = [0u8; BLOCK_SIZE];
        for chunk in chunks(address, length) {
            let (disk, blk) = (chunk.at.disk, chunk.at.block);
            let hit = self.fetch(disk, blk, &mut block)?;
            if !hit && self.fill == CacheFill::ReadAndWrite && self.cache.enabled() {
                self.cache.insert(disk, blk, &block)?;
            }
            out[chunk.buf_offset..chunk.buf_offset + chunk.len]
                .copy_from_slice(&block[chunk.at.offset..chunk.at.offset + chunk.len]);
        }
        Ok(length)
    }

    /// `write` stores `length` bytes from `data` starting at `address`.
    ///
    /// Each touched block is fetched, patched and written back whole.
    ///
    /// # Returns
    /// The number of bytes written, always `length`.
    ///
    /// # Errors
    /// Fails without side effects when unmounted or on invalid arguments; fails as a
    /// whole if any block transfer fails.
    pub fn write(&mut self, address: u32, length: u32, data: &[u8]) -> Result<u32> {
        self.check_request(address, length, data.len())?;
        if length == 0 {
            return Ok(0);
        }

        let mut block = [0u8; BLOCK_SIZE];
        for chunk in chunks(address, length) {
            let (disk, blk) = (chunk.at.disk, chunk.at.block);
            self.fetch(disk, blk, &mut block)?;
            block[chunk.at.offset..chunk.at.offset + chunk.len]
                .copy_from_slice(&data[chunk.buf_offset..chunk.buf_offset + chunk.len]);

            self.exec(Opcode::seek_to_disk(disk)?, Payload::None)?;
            self.exec(Opcode::seek_to_block(blk)?, Payload::None)?;
            self.exec(Opcode::write_block(), Payload::Send(&block))?;

            if self.cache.enabled() {
                match self.cache.insert(disk, blk, &block) {
                    Err(JbodError::AlreadyCached { .. }) => {
                        self.cache.update(disk, blk, &block);
                    }
                    other => other?,
                }
            }
        }
        Ok(length)
    }

    fn check_request(&self, address: u32, length: u32, buf_len: usize) -> Result<()> {
        if !self.is_mounted() {
            return Err(JbodError::StateViolation("array is not mounted"));
        }
        check_range(address, length)?;
        if length > 0 && buf_len < length as usize {
            return Err(JbodError::InvalidArgument("buffer is shorter than length"));
        }
        Ok(())
    }

    /// Loads the current contents of a block, from the cache when possible.
    /// Returns whether the cache served it.
    fn fetch(&mut self, disk: u32, block: u32, buf: &mut Block) -> Result<bool> {
        if self.cache.enabled() && self.cache.lookup(disk, block, buf).is_ok() {
            debug!(disk, block, "cache hit");
            return Ok(true);
        }
        self.exec(Opcode::seek_to_disk(disk)?, Payload::None)?;
        self.exec(Opcode::seek_to_block(block)?, Payload::None)?;
        self.exec(Opcode::read_block(), Payload::Recv(buf))?;
        Ok(false)
    }

    fn exec(&mut self, opcode: Opcode, payload: Payload<'_>) -> Result<()> {
        match self.transport.call(opcode, payload)? {
            0 => Ok(()),
            status => Err(JbodError::Server {
                command: opcode.command,
                status,
            }),
        }
    }
}
