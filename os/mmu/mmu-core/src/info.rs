//! # Default Memory Layout
//!
//! Build-time defaults for an MMU instance. [`MmuConfig::DEFAULT`](crate::MmuConfig::DEFAULT)
//! is assembled from these; individual values can be overridden through the
//! configuration setters.

use crate::config::AddressWidth;

/// Default page size in bytes (matches [`Size4K`](mmu_addresses::Size4K)).
pub const PAGE_SIZE: u64 = 4096;

/// Size of the backing arena ("physical memory").
pub const PHYS_SIZE: u64 = 1024 * 1024 * 1024;

/// Size of the emulated virtual range.
pub const VIRT_SIZE: u64 = 4 * 1024 * 1024 * 1024;

/// Number of direct-mapped TLB slots.
pub const TLB_ENTRIES: usize = 1024;

/// Address width, selecting the page-table entry size.
pub const ADDRESS_WIDTH: AddressWidth = AddressWidth::Bits64;

const _: () = {
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(PHYS_SIZE.is_multiple_of(PAGE_SIZE));
    assert!(VIRT_SIZE.is_multiple_of(PAGE_SIZE));
    assert!(VIRT_SIZE > PHYS_SIZE);
    assert!(TLB_ENTRIES.is_power_of_two());
};
