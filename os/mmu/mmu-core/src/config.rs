//! # MMU Configuration and Derived Geometry
//!
//! [`MmuConfig`] holds the sizes a build chooses; [`MmuConfig::validate`]
//! checks them against a page size `S` and derives the [`Geometry`] every
//! other component works from:
//!
//! ```text
//!  virtual address
//!  ├──────────── VBASE + vpn << offset_bits ─────────────┤
//!  vpn = [ root_bits | index_bits | … | index_bits ] [ offset_bits ]
//!          level 0      level 1         level L-1
//! ```
//!
//! The root consumes whatever high bits remain after the `L - 1` full-width
//! levels, so a single node always suffices for the root directory.

use crate::error::MmuError;
use crate::info;
use core::fmt;
use mmu_accessors_derive::Setters;
use mmu_addresses::{PageSize, VirtualAddress};

/// Width of an emulated address; selects the size of a page-table entry.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum AddressWidth {
    /// 32-bit addresses, 4-byte entries.
    Bits32,
    /// 64-bit addresses, 8-byte entries.
    #[default]
    Bits64,
}

impl AddressWidth {
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::Bits32 => 32,
            Self::Bits64 => 64,
        }
    }

    /// Bytes per page-table entry.
    #[inline]
    #[must_use]
    pub const fn entry_size(self) -> u64 {
        match self {
            Self::Bits32 => 4,
            Self::Bits64 => 8,
        }
    }

    /// Exclusive upper bound of representable addresses, `None` if it is 2^64.
    #[inline]
    #[must_use]
    pub const fn limit(self) -> Option<u64> {
        match self {
            Self::Bits32 => Some(1 << 32),
            Self::Bits64 => None,
        }
    }
}

/// Sizes of one MMU instance. The page size is not part of it; it is the
/// `S: PageSize` type parameter of the components.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Setters)]
pub struct MmuConfig {
    /// Size of the backing arena in bytes.
    pub phys_size: u64,
    /// Size of the virtual range in bytes, starting at `VBASE = PAGE_SIZE`.
    pub virt_size: u64,
    /// Number of TLB slots (power of two).
    pub tlb_entries: usize,
    /// Address width; 32-bit uses 4-byte entries, 64-bit uses 8-byte entries.
    pub address_width: AddressWidth,
}

impl MmuConfig {
    pub const DEFAULT: Self = Self {
        phys_size: info::PHYS_SIZE,
        virt_size: info::VIRT_SIZE,
        tlb_entries: info::TLB_ENTRIES,
        address_width: info::ADDRESS_WIDTH,
    };

    /// Check the sizes against page size `S` and derive the paging geometry.
    ///
    /// # Errors
    /// Any [`ConfigError`] describing the first violated constraint.
    pub fn validate<S: PageSize>(&self) -> Result<Geometry, ConfigError> {
        let page = S::SIZE;
        if self.phys_size == 0 || !self.phys_size.is_multiple_of(page) {
            return Err(ConfigError::PhysSizeNotPageMultiple(self.phys_size, page));
        }
        if !self.virt_size.is_multiple_of(page) {
            return Err(ConfigError::VirtSizeNotPageMultiple(self.virt_size, page));
        }
        if self.virt_size <= self.phys_size {
            return Err(ConfigError::VirtualRangeTooSmall {
                virt: self.virt_size,
                phys: self.phys_size,
            });
        }
        if self.tlb_entries == 0 || !self.tlb_entries.is_power_of_two() {
            return Err(ConfigError::TlbEntries(self.tlb_entries));
        }

        let phys_pages = self.phys_size / page;
        if phys_pages < 2 {
            return Err(ConfigError::ArenaTooSmall(phys_pages));
        }
        if usize::try_from(self.phys_size).is_err() {
            return Err(ConfigError::ArenaNotAddressable(self.phys_size));
        }

        let width = self.address_width;
        let Some(virt_end) = page.checked_add(self.virt_size) else {
            return Err(ConfigError::ExceedsAddressWidth(width.bits()));
        };
        if let Some(limit) = width.limit()
            && (virt_end > limit || self.phys_size > limit)
        {
            return Err(ConfigError::ExceedsAddressWidth(width.bits()));
        }

        // Entries keep the present flag in bit 0 and the page id above it.
        if phys_pages >> (width.bits() - 1) != 0 {
            return Err(ConfigError::ExceedsAddressWidth(width.bits()));
        }

        let entry_shift = width.entry_size().trailing_zeros();
        let index_bits = S::SHIFT - entry_shift;
        let virt_pages = self.virt_size / page;
        let vpn_bits = ceil_log2(virt_pages).max(1);
        let levels = vpn_bits.div_ceil(index_bits).max(1);
        let root_bits = vpn_bits - (levels - 1) * index_bits;

        Ok(Geometry {
            offset_bits: S::SHIFT,
            page_size: page,
            entry_size: width.entry_size(),
            index_bits,
            root_bits,
            levels,
            vpn_bits,
            phys_pages,
            virt_pages,
            vbase: page,
            tlb_entries: self.tlb_entries,
            tlb_index_bits: self.tlb_entries.trailing_zeros(),
        })
    }
}

impl Default for MmuConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

const fn ceil_log2(value: u64) -> u32 {
    if value <= 1 {
        0
    } else {
        u64::BITS - (value - 1).leading_zeros()
    }
}

/// Paging layout derived from an [`MmuConfig`] and a page size.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Geometry {
    /// log2 of the page size; number of in-page offset bits.
    pub offset_bits: u32,
    pub page_size: u64,
    /// Bytes per page-table entry.
    pub entry_size: u64,
    /// Index width of every non-root level.
    pub index_bits: u32,
    /// Index width of the root directory (`1..=index_bits`).
    pub root_bits: u32,
    /// Depth `L` of the page-table tree, root included.
    pub levels: u32,
    /// Width of a virtual page number.
    pub vpn_bits: u32,
    pub phys_pages: u64,
    pub virt_pages: u64,
    /// First managed virtual address; everything below is never mapped.
    pub vbase: u64,
    pub tlb_entries: usize,
    pub tlb_index_bits: u32,
}

impl Geometry {
    /// Exclusive end of the virtual range.
    #[inline]
    #[must_use]
    pub const fn vend(&self) -> u64 {
        self.vbase + self.virt_pages * self.page_size
    }

    /// Number of entries in a full-width node.
    #[inline]
    #[must_use]
    pub const fn entries_per_node(&self) -> u64 {
        self.page_size / self.entry_size
    }

    /// Shift of the index for `level` (0 = root) within a virtual page number.
    #[inline]
    #[must_use]
    pub const fn level_shift(&self, level: u32) -> u32 {
        (self.levels - 1 - level) * self.index_bits
    }

    /// Index width at `level` (0 = root).
    #[inline]
    #[must_use]
    pub const fn level_bits(&self, level: u32) -> u32 {
        if level == 0 {
            self.root_bits
        } else {
            self.index_bits
        }
    }

    /// Check that `[va, va + len)` lies inside `[VBASE, VEND)`.
    ///
    /// # Errors
    /// [`MmuError::InvalidRange`] if the range leaves the virtual range or
    /// overflows.
    pub fn check_range(&self, va: VirtualAddress, len: u64) -> Result<(), MmuError> {
        let invalid = MmuError::InvalidRange { start: va, len };
        let end = va.checked_add(len).ok_or(invalid)?;
        if va.as_u64() < self.vbase || end.as_u64() > self.vend() {
            return Err(invalid);
        }
        Ok(())
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} levels ({}+{}x{} index bits, {} offset bits, {}-byte entries), {} physical / {} virtual pages, {} TLB slots",
            self.levels,
            self.root_bits,
            self.levels - 1,
            self.index_bits,
            self.offset_bits,
            self.entry_size,
            self.phys_pages,
            self.virt_pages,
            self.tlb_entries
        )
    }
}

/// Reasons an [`MmuConfig`] is rejected.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("physical size {0:#x} is not a non-zero multiple of the page size {1:#x}")]
    PhysSizeNotPageMultiple(u64, u64),
    #[error("virtual size {0:#x} is not a multiple of the page size {1:#x}")]
    VirtSizeNotPageMultiple(u64, u64),
    #[error("virtual size {virt:#x} must exceed physical size {phys:#x}")]
    VirtualRangeTooSmall { virt: u64, phys: u64 },
    #[error("TLB size {0} is not a non-zero power of two")]
    TlbEntries(usize),
    #[error("arena of {0} pages cannot hold a root directory and a data page")]
    ArenaTooSmall(u64),
    #[error("arena of {0:#x} bytes does not fit the host address space")]
    ArenaNotAddressable(u64),
    #[error("layout does not fit a {0}-bit address")]
    ExceedsAddressWidth(u32),
}

#[cfg(test)]
mod tests {
    use super::*;
    use mmu_addresses::{Size4K, Size16K};

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn default_geometry_is_three_levels() {
        let g = MmuConfig::DEFAULT.validate::<Size4K>().unwrap();
        assert_eq!(g.offset_bits, 12);
        assert_eq!(g.index_bits, 9);
        assert_eq!(g.vpn_bits, 20);
        assert_eq!(g.levels, 3);
        assert_eq!(g.root_bits, 2);
        assert_eq!(g.phys_pages, 262_144);
        assert_eq!(g.vbase, 4096);
        assert_eq!(g.tlb_index_bits, 10);
    }

    #[test]
    fn thirty_two_bit_geometry_uses_wider_indices() {
        let g = MmuConfig::DEFAULT
            .with_address_width(AddressWidth::Bits32)
            .with_virt_size(2048 * MIB)
            .validate::<Size4K>()
            .unwrap();
        assert_eq!(g.entry_size, 4);
        assert_eq!(g.index_bits, 10);
        assert_eq!(g.vpn_bits, 19);
        assert_eq!(g.levels, 2);
        assert_eq!(g.root_bits, 9);
    }

    #[test]
    fn small_range_collapses_to_a_single_level() {
        let g = MmuConfig::DEFAULT
            .with_phys_size(64 * 1024)
            .with_virt_size(MIB)
            .validate::<Size4K>()
            .unwrap();
        assert_eq!(g.levels, 1);
        assert_eq!(g.root_bits, 8);
        assert_eq!(g.vend(), 4096 + MIB);
    }

    #[test]
    fn larger_pages_change_every_width() {
        let g = MmuConfig::DEFAULT.validate::<Size16K>().unwrap();
        assert_eq!(g.offset_bits, 14);
        assert_eq!(g.index_bits, 11);
        assert_eq!(g.vpn_bits, 18);
        assert_eq!(g.levels, 2);
        assert_eq!(g.root_bits, 7);
    }

    #[test]
    fn rejects_inconsistent_sizes() {
        let base = MmuConfig::DEFAULT;
        assert!(matches!(
            base.with_phys_size(4097).validate::<Size4K>(),
            Err(ConfigError::PhysSizeNotPageMultiple(4097, 4096))
        ));
        assert!(matches!(
            base.with_virt_size(base.phys_size).validate::<Size4K>(),
            Err(ConfigError::VirtualRangeTooSmall { .. })
        ));
        assert_eq!(
            base.with_tlb_entries(1000).validate::<Size4K>(),
            Err(ConfigError::TlbEntries(1000))
        );
        assert_eq!(
            base.with_phys_size(4096).with_virt_size(MIB).validate::<Size4K>(),
            Err(ConfigError::ArenaTooSmall(1))
        );
        assert_eq!(
            base.with_address_width(AddressWidth::Bits32)
                .validate::<Size4K>(),
            Err(ConfigError::ExceedsAddressWidth(32))
        );
    }

    #[test]
    fn range_checks_respect_vbase_and_vend() {
        let g = MmuConfig::DEFAULT
            .with_phys_size(64 * 1024)
            .with_virt_size(MIB)
            .validate::<Size4K>()
            .unwrap();
        assert!(g.check_range(VirtualAddress::new(4096), MIB).is_ok());
        assert!(g.check_range(VirtualAddress::new(0), 1).is_err());
        assert!(g.check_range(VirtualAddress::new(4096), MIB + 1).is_err());
        assert!(g.check_range(VirtualAddress::new(u64::MAX), 2).is_err());
    }
}
