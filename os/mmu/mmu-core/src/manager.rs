//! # Memory Manager
//!
//! The synchronized front of an [`Mmu`]. A manager is created from a
//! configuration without touching memory; the arena and root directory are
//! set up by the first [`allocate`](MemoryManager::allocate).
//!
//! ## Locking
//!
//! One reader/writer lock guards the whole state. `allocate`, `release` and
//! `write` hold it exclusively; `read`, `translate` and the statistics share
//! it. Translations cached by shared readers go through the TLB's own mutex.

use crate::config::{ConfigError, MmuConfig};
use crate::error::MmuError;
use crate::mmu::Mmu;
use crate::tlb::TlbStats;
use mmu_addresses::{PageSize, PhysicalAddress, Size4K, VirtualAddress};
use parking_lot::RwLock;

pub struct MemoryManager<S: PageSize = Size4K> {
    config: MmuConfig,
    state: RwLock<Option<Mmu<S>>>,
}

static GLOBAL: MemoryManager = MemoryManager::new(MmuConfig::DEFAULT);

/// The process-wide manager with the default configuration.
///
/// ```rust
/// let mm = mmu_core::global();
/// let va = mm.allocate(16).unwrap();
/// mm.write(va, b"hello").unwrap();
/// assert_eq!(mm.read_vec(va, 5).unwrap(), b"hello");
/// mm.release(va, 16).unwrap();
/// ```
#[must_use]
pub fn global() -> &'static MemoryManager {
    &GLOBAL
}

impl<S: PageSize> MemoryManager<S> {
    /// A manager for `config`. The configuration is checked on first use.
    #[must_use]
    pub const fn new(config: MmuConfig) -> Self {
        Self {
            config,
            state: RwLock::new(None),
        }
    }

    /// A manager for `config`, rejecting an unusable configuration up front.
    ///
    /// # Errors
    /// The [`ConfigError`] found by [`MmuConfig::validate`].
    pub fn try_new(config: MmuConfig) -> Result<Self, ConfigError> {
        config.validate::<S>()?;
        Ok(Self::new(config))
    }

    #[inline]
    #[must_use]
    pub const fn config(&self) -> &MmuConfig {
        &self.config
    }

    /// Reserve `num_bytes` rounded up to whole pages; see [`Mmu::allocate`].
    ///
    /// # Errors
    /// [`MmuError::Config`] if the first call cannot set up the MMU, otherwise
    /// as [`Mmu::allocate`].
    pub fn allocate(&self, num_bytes: u64) -> Result<VirtualAddress, MmuError> {
        let mut state = self.state.write();
        let mmu = match state.take() {
            Some(mmu) => mmu,
            None => Mmu::new(self.config)?,
        };
        state.insert(mmu).allocate(num_bytes)
    }

    /// Unmap every page touched by `[va, va + size)`; see [`Mmu::release`].
    ///
    /// # Errors
    /// As [`Mmu::release`].
    pub fn release(&self, va: VirtualAddress, size: u64) -> Result<(), MmuError> {
        match self.state.write().as_mut() {
            Some(mmu) => mmu.release(va, size),
            None if size == 0 => Ok(()),
            None => Err(self.unmapped(va, size)),
        }
    }

    /// Fill `buf` from the virtual range starting at `va`.
    ///
    /// # Errors
    /// As [`Mmu::read`].
    pub fn read(&self, va: VirtualAddress, buf: &mut [u8]) -> Result<(), MmuError> {
        match self.state.read().as_ref() {
            Some(mmu) => mmu.read(va, buf),
            None if buf.is_empty() => Ok(()),
            None => Err(self.unmapped(va, buf.len() as u64)),
        }
    }

    /// Read `len` bytes starting at `va` into a new vector.
    ///
    /// # Errors
    /// As [`Mmu::read`].
    pub fn read_vec(&self, va: VirtualAddress, len: usize) -> Result<Vec<u8>, MmuError> {
        let mut buf = vec![0; len];
        self.read(va, &mut buf)?;
        Ok(buf)
    }

    /// Store `bytes` at the virtual range starting at `va`.
    ///
    /// # Errors
    /// As [`Mmu::write`].
    pub fn write(&self, va: VirtualAddress, bytes: &[u8]) -> Result<(), MmuError> {
        match self.state.write().as_mut() {
            Some(mmu) => mmu.write(va, bytes),
            None if bytes.is_empty() => Ok(()),
            None => Err(self.unmapped(va, bytes.len() as u64)),
        }
    }

    /// Physical address backing `va`, `None` if unmapped.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.state.read().as_ref()?.translate(va)
    }

    /// TLB misses per access so far; `0.0` before the first access.
    #[must_use]
    pub fn tlb_miss_rate(&self) -> f64 {
        self.state.read().as_ref().map_or(0.0, Mmu::tlb_miss_rate)
    }

    #[must_use]
    pub fn tlb_stats(&self) -> TlbStats {
        self.state
            .read()
            .as_ref()
            .map_or_else(TlbStats::default, Mmu::tlb_stats)
    }

    /// Run `f` against the set-up MMU under the shared lock, `None` before
    /// the first allocation.
    #[must_use]
    pub fn with_mmu<T>(&self, f: impl FnOnce(&Mmu<S>) -> T) -> Option<T> {
        self.state.read().as_ref().map(f)
    }

    /// What an access to a not-yet-set-up manager fails with: nothing is
    /// mapped yet, unless the range or the configuration is already invalid.
    fn unmapped(&self, va: VirtualAddress, len: u64) -> MmuError {
        match self.config.validate::<S>() {
            Err(e) => e.into(),
            Ok(geometry) => match geometry.check_range(va, len) {
                Err(e) => e,
                Ok(()) => MmuError::TranslationFault(va),
            },
        }
    }
}

impl<S: PageSize> Default for MemoryManager<S> {
    fn default() -> Self {
        Self::new(MmuConfig::DEFAULT)
    }
}

impl<S: PageSize> core::fmt::Debug for MemoryManager<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemoryManager")
            .field("page_size", &S::as_str())
            .field("config", &self.config)
            .field("ready", &self.state.read().is_some())
            .finish()
    }
}
