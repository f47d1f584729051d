//! # Software Memory-Management Unit
//!
//! A user-space emulation of paged virtual memory. A fixed-size arena plays
//! physical memory, callers see a larger virtual range starting at
//! `VBASE = PAGE_SIZE`, and a multi-level page table stored inside the arena
//! translates between the two, fronted by a direct-mapped TLB.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 MemoryManager                       │
//! │    • allocate / release / read / write / translate  │
//! │    • reader/writer lock, lazy setup                 │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │                      Mmu                            │
//! │    • rollback on failed allocation                  │
//! │    • page-chunked copies, TLB shootdown on release  │
//! └───────┬───────────────┬──────────────────┬──────────┘
//!         │               │                  │
//! ┌───────▼──────┐ ┌──────▼──────┐ ┌─────────▼─────────┐
//! │ PageTable    │ │ Tlb         │ │ VirtualPage-      │
//! │ L-level walk │ │ direct-     │ │ Allocator         │
//! │ in the arena │ │ mapped      │ │ (bitmap)          │
//! └───────┬──────┘ └─────────────┘ └───────────────────┘
//!         │
//! ┌───────▼─────────────────────────────────────────────┐
//! │           PhysicalMemory: arena + page bitmap       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! The page size is the type parameter `S: PageSize` (4 KiB by default); all
//! other sizes come from an [`MmuConfig`] and are validated into a
//! [`Geometry`].
//!
//! ## Example
//!
//! ```rust
//! use mmu_core::{MemoryManager, MmuConfig, MmuError};
//!
//! let mm: MemoryManager = MemoryManager::new(
//!     MmuConfig::DEFAULT
//!         .with_phys_size(1024 * 1024)
//!         .with_virt_size(16 * 1024 * 1024),
//! );
//!
//! let a = mm.allocate(100).unwrap();
//! assert_eq!(a.as_u64(), 4096);
//! mm.write(a, &42_u32.to_le_bytes()).unwrap();
//!
//! let mut back = [0; 4];
//! mm.read(a, &mut back).unwrap();
//! assert_eq!(u32::from_le_bytes(back), 42);
//!
//! mm.release(a, 100).unwrap();
//! assert_eq!(mm.read(a, &mut back), Err(MmuError::TranslationFault(a)));
//! ```
//!
//! ## Logging
//!
//! Diagnostics go through the [`log`] facade; installing a logger is up to
//! the application.

pub mod bits;
mod config;
mod error;
pub mod info;
mod manager;
mod mmu;
pub mod page_table;
pub mod phys;
pub mod tlb;
pub mod virt;

pub use config::{AddressWidth, ConfigError, Geometry, MmuConfig};
pub use error::MmuError;
pub use manager::{MemoryManager, global};
pub use mmu::Mmu;
pub use mmu_addresses::{
    PageId, PageSize, PhysicalAddress, Size4K, Size16K, Size64K, VirtualAddress,
};
pub use tlb::TlbStats;
