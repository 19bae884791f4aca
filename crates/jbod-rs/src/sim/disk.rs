use anyhow::Context;
use memmap2::{MmapMut, MmapOptions};
use std::path::{Path, PathBuf};

use crate::geometry::{BLOCK_SIZE, Block, DISK_SIZE};

/// DiskImage is one simulated disk backed by a memory-mapped image file.
pub struct DiskImage {
    path: PathBuf,
    map: MmapMut,
    /// True when the image did not exist before (contents start zeroed).
    pub fresh: bool,
}

impl DiskImage {
    /// `open` maps the image at `path`, creating and sizing it to one disk if needed.
    ///
    /// # Errors
    /// Returns an error if the image cannot be created, resized or mapped.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let existed = path.exists();

        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("open disk image {}", path.display()))?;
        file.set_len(DISK_SIZE as u64)
            .with_context(|| format!("size disk image {}", path.display()))?;

        let map = unsafe { MmapOptions::new().len(DISK_SIZE).map_mut(&file)? };

        Ok(Self {
            path: path.to_path_buf(),
            map,
            fresh: !existed,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `read_block` copies block `index` into `out`.
    pub fn read_block(&self, index: usize, out: &mut Block) {
        let off = index * BLOCK_SIZE;
        out.copy_from_slice(&self.map[off..off + BLOCK_SIZE]);
    }

    /// `write_block` overwrites block `index` with `data`.
    pub fn write_block(&mut self, index: usize, data: &Block) {
        let off = index * BLOCK_SIZE;
        self.map[off..off + BLOCK_SIZE].copy_from_slice(data);
    }

    /// `flush` pushes dirty pages back to the image file.
    ///
    /// # Errors
    /// Returns an error if the mapping cannot be flushed.
    pub fn flush(&self) -> anyhow::Result<()> {
        self.map
            .flush()
            .with_context(|| format!("flush disk image {}", self.path.display()))
    }
}
