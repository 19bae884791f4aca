//! Fixed-capacity LRU cache of disk blocks keyed by `(disk, block)`.


use std::fmt;

use tracing::{debug, info};

use crate::error::{JbodError, Result};
use crate::geometry::{BLOCK_SIZE, BLOCKS_PER_DISK, Block, DISK_COUNT};

pub const MIN_CAPACITY: usize = 2;
pub const MAX_CAPACITY: usize = 4096;

/// CacheEntry is one slot of the cache.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub disk: u32,
    pub block: u32,
    pub valid: bool,
    /// Logical clock value of the last access; 0 for a slot that was never used.
    pub access_time: u64,
    pub data: Block,
}

impl CacheEntry {
    const fn empty() -> Self {
        Self {
            disk: 0,
            block: 0,
            valid: false,
            access_time: 0,
            data: [0u8; BLOCK_SIZE],
        }
    }

    const fn holds(&self, disk: u32, block: u32) -> bool {
        self.valid && self.disk == disk && self.block == block
    }
}

/// Lookup counters kept for hit-rate reporting.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CacheStats {
    pub lookups: u64,
    pub hits: u64,
}

impl CacheStats {
    /// Hit percentage; `0.0` before the first lookup.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            return 0.0;
        }
        100.0 * self.hits as f64 / self.lookups as f64
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hit rate: {:5.1}%", self.hit_rate())
    }
}

/// BlockCache keeps the most recently used blocks of the array.
///
/// The cache starts disabled; [`BlockCache::create`] allocates its slots and
/// [`BlockCache::destroy`] releases them again. Eviction is strict LRU over a
/// logical clock, found by a linear scan of the slots.
#[derive(Debug, Default)]
pub struct BlockCache {
    slots: Vec<CacheEntry>,
    clock: u64,
    stats: CacheStats,
}

impl BlockCache {
    /// `new` returns a disabled cache with no slots.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            clock: 0,
            stats: CacheStats { lookups: 0, hits: 0 },
        }
    }

    /// `with_capacity` returns an enabled cache with `capacity` empty slots.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if `capacity` is outside `[2, 4096]`.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut cache = Self::new();
        cache.create(capacity)?;
        Ok(cache)
    }

    /// `create` allocates `capacity` empty slots and resets the clock and counters.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if `capacity` is outside `[2, 4096]`, or
    /// `StateViolation` if the cache is already enabled.
    pub fn create(&mut self, capacity: usize) -> Result<()> {
        if !(MIN_CAPACITY..=MAX_CAPACITY).contains(&capacity) {
            return Err(JbodError::InvalidArgument("cache capacity must be in [2, 4096]"));
        }
        if self.enabled() {
            return Err(JbodError::StateViolation("cache is already enabled"));
        }
        self.slots = vec![CacheEntry::empty(); capacity];
        self.clock = 0;
        self.stats = CacheStats::default();
        info!(capacity, "block cache created");
        Ok(())
    }

    /// `destroy` releases every slot and disables the cache.
    ///
    /// # Errors
    /// Returns `StateViolation` if the cache is not enabled.
    pub fn destroy(&mut self) -> Result<()> {
        if !self.enabled() {
            return Err(JbodError::StateViolation("cache is not enabled"));
        }
        self.slots = Vec::new();
        info!(stats = %self.stats, "block cache destroyed");
        Ok(())
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        !self.slots.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub const fn stats(&self) -> CacheStats {
        self.stats
    }

    #[must_use]
    pub fn hit_rate_report(&self) -> String {
        self.stats.to_string()
    }

    /// `lookup` copies the cached block for `(disk, block)` into `out` and marks it most recent.
    ///
    /// The lookup counter advances on every call, including rejected ones.
    ///
    /// # Errors
    /// Returns `StateViolation` when disabled, `InvalidArgument` for an out-of-range key,
    /// and `NotCached` on a miss.
    pub fn lookup(&mut self, disk: u32, block: u32, out: &mut Block) -> Result<()> {
        self.stats.lookups += 1;
        if !self.enabled() {
            return Err(JbodError::StateViolation("cache is not enabled"));
        }
        check_key(disk, block)?;

        let Some(slot) = self.slots.iter_mut().find(|s| s.holds(disk, block)) else {
            return Err(JbodError::NotCached { disk, block });
        };
        out.copy_from_slice(&slot.data);
        self.clock += 1;
        slot.access_time = self.clock;
        self.stats.hits += 1;
        Ok(())
    }

    /// `insert` stores a block that is not cached yet, evicting the least recently used slot.
    ///
    /// # Errors
    /// Returns `StateViolation` when disabled, `InvalidArgument` for an out-of-range key,
    /// and `AlreadyCached` if a valid entry for the key exists (use [`Self::update`]).
    pub fn insert(&mut self, disk: u32, block: u32, data: &Block) -> Result<()> {
        if !self.enabled() {
            return Err(JbodError::StateViolation("cache is not enabled"));
        }
        check_key(disk, block)?;
        if self.slots.iter().any(|s| s.holds(disk, block)) {
            return Err(JbodError::AlreadyCached { disk, block });
        }

        // min_by_key keeps the first of equal minima; unused slots sit at time 0.
        let Some(victim) = self.slots.iter_mut().min_by_key(|s| s.access_time) else {
            return Err(JbodError::StateViolation("cache is not enabled"));
        };
        if victim.valid {
            debug!(
                disk = victim.disk,
                block = victim.block,
                "evicting least recently used block"
            );
        }
        self.clock += 1;
        *victim = CacheEntry {
            disk,
            block,
            valid: true,
            access_time: self.clock,
            data: *data,
        };
        Ok(())
    }

    /// `update` overwrites the payload of a cached block and marks it most recent.
    ///
    /// Does nothing when the cache is disabled or the key is not cached.
    /// Returns whether an entry was changed.
    pub fn update(&mut self, disk: u32, block: u32, data: &Block) -> bool {
        let Some(slot) = self.slots.iter_mut().find(|s| s.holds(disk, block)) else {
            return false;
        };
        slot.data.copy_from_slice(data);
        self.clock += 1;
        slot.access_time = self.clock;
        true
    }

    /// `entries` exposes the slot array for inspection.
    #[must_use]
    pub fn entries(&self) -> &[CacheEntry] {
        &self.slots
    }
}

fn check_key(disk: u32, block: u32) -> Result<()> {
    if disk as usize >= DISK_COUNT {
        return Err(JbodError::InvalidArgument("disk number out of range"));
    }
    if block as usize >= BLOCKS_PER_DISK {
        return Err(JbodError::InvalidArgument("block number out of range"));
    }
    Ok(())
}
