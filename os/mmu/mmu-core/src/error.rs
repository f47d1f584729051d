use crate::config::ConfigError;
use mmu_addresses::VirtualAddress;

/// Failures reported by the MMU operations.
///
/// None of these is fatal: the MMU stays usable after any of them, and a failed
/// operation leaves no partial state behind.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MmuError {
    /// No run of `pages` consecutive free virtual pages exists.
    #[error("out of virtual address space ({pages} contiguous pages requested)")]
    OutOfVirtualAddressSpace { pages: u64 },
    /// No free arena page for a data page or a page-table node.
    #[error("out of physical memory")]
    OutOfPhysicalMemory,
    /// The virtual page containing this address has no mapping.
    #[error("translation fault at {0}")]
    TranslationFault(VirtualAddress),
    /// The range is empty where a size is required, overflows, or leaves the
    /// managed virtual range.
    #[error("invalid range: {len:#x} bytes at {start}")]
    InvalidRange { start: VirtualAddress, len: u64 },
    /// Lazy setup found the configuration unusable.
    #[error("invalid MMU configuration: {0}")]
    Config(#[from] ConfigError),
}
