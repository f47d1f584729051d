//! # Address Types for the Software MMU
//!
//! Typed wrappers for the integers that stand in for addresses in the emulated
//! memory-management unit. Nothing in here is a pointer:
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`VirtualAddress`] | Location in the emulated virtual range. |
//! | [`PhysicalAddress`] | Byte offset into the backing arena. |
//! | [`PageId`] | Index of one arena page. |
//! | [`PhysicalPage<S>`] | An arena page of size `S`; built from a [`PageId`]. |
//! | [`MemoryAddressOffset<S>`] | Byte position inside a page of size `S`. |
//! | [`MemoryAddress`] | The untyped address both address kinds wrap. |
//!
//! ## Page Sizes
//!
//! The page size of an MMU instance is a compile-time choice, expressed by a
//! marker type implementing [`PageSize`]: [`Size4K`] (the default),
//! [`Size16K`] or [`Size64K`].
//!
//! ```rust
//! # use mmu_addresses::*;
//! // Arena page 3 starts 3 * 4 KiB into the arena.
//! let pp = PhysicalPage::<Size4K>::from_id(PageId::new(3));
//! assert_eq!(pp.base().as_u64(), 3 * 4096);
//!
//! let va = VirtualAddress::new(0x1_2345);
//! let pa = pp.join(va.offset::<Size4K>());
//! assert_eq!(pa, PhysicalAddress::new(3 * 4096 + 0x345));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod memory_address;
mod memory_address_offset;
mod page_id;
mod page_size;
mod physical_address;
mod physical_page;
mod virtual_address;

pub use memory_address::MemoryAddress;
pub use memory_address_offset::MemoryAddressOffset;
pub use page_id::PageId;
pub use page_size::{PageSize, Size4K, Size16K, Size64K};
pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use virtual_address::VirtualAddress;
