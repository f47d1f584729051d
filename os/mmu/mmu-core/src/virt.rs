//! # Virtual Page Allocator
//!
//! One bit per page slot of `[VBASE, VEND)`. A set bit means the page is
//! backed by a complete page-table path. Address 0 and everything below
//! `VBASE` are never handed out, so a null address is never a valid
//! allocation.
//!
//! The allocator only answers "where"; callers set bits once the mapping
//! succeeded, so a failed multi-page allocation leaves nothing behind.

use crate::bits::Bitmap;
use crate::config::Geometry;
use crate::error::MmuError;
use core::fmt;
use core::marker::PhantomData;
use mmu_addresses::{PageSize, VirtualAddress};

/// Index of a page slot in the virtual range; also the virtual page number
/// the page table and the TLB are keyed on.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPageIndex(u64);

impl VirtualPageIndex {
    #[inline]
    #[must_use]
    pub const fn new(index: u64) -> Self {
        Self(index)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// The `n`-th page after this one.
    #[inline]
    #[must_use]
    pub const fn step(self, n: u64) -> Self {
        Self(self.0 + n)
    }
}

impl fmt::Debug for VirtualPageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vpn {:#x}", self.0)
    }
}

pub struct VirtualPageAllocator<S: PageSize> {
    allocated: Bitmap,
    vbase: u64,
    _size: PhantomData<S>,
}

impl<S: PageSize> VirtualPageAllocator<S> {
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(geometry: &Geometry) -> Self {
        debug_assert_eq!(geometry.page_size, S::SIZE);
        Self {
            allocated: Bitmap::new(geometry.virt_pages as usize),
            vbase: geometry.vbase,
            _size: PhantomData,
        }
    }

    /// Lowest start of `pages` consecutive unallocated slots. Marks nothing.
    #[must_use]
    pub fn find_free_run(&self, pages: u64) -> Option<VirtualPageIndex> {
        let pages = usize::try_from(pages).ok()?;
        let start = self.allocated.find_clear_run(pages)?;
        Some(VirtualPageIndex::new(start as u64))
    }

    pub fn mark(&mut self, index: VirtualPageIndex, allocated: bool) {
        self.allocated.assign(index.as_usize(), allocated);
    }

    #[inline]
    #[must_use]
    pub fn is_allocated(&self, index: VirtualPageIndex) -> bool {
        self.allocated.test(index.as_usize())
    }

    #[inline]
    #[must_use]
    pub fn allocated_pages(&self) -> usize {
        self.allocated.count_set()
    }

    #[inline]
    #[must_use]
    pub const fn total_pages(&self) -> usize {
        self.allocated.len()
    }

    /// Base address of the page slot `index`.
    #[inline]
    #[must_use]
    pub const fn address_of(&self, index: VirtualPageIndex) -> VirtualAddress {
        VirtualAddress::new(self.vbase + (index.as_u64() << S::SHIFT))
    }

    /// Slot containing `va`. The caller has range-checked `va`.
    #[inline]
    #[must_use]
    pub const fn index_of(&self, va: VirtualAddress) -> VirtualPageIndex {
        vpn_of::<S>(self.vbase, va)
    }

    /// Slots touched by `[va, va + len)`, after checking the range against
    /// `geometry`. An empty range yields no slots.
    ///
    /// # Errors
    /// [`MmuError::InvalidRange`] if the range leaves `[VBASE, VEND)`.
    pub fn covered(
        &self,
        geometry: &Geometry,
        va: VirtualAddress,
        len: u64,
    ) -> Result<impl Iterator<Item = VirtualPageIndex> + use<S>, MmuError> {
        geometry.check_range(va, len)?;
        let first = self.index_of(va).as_u64();
        let end = if len == 0 {
            first
        } else {
            self.index_of(VirtualAddress::new(va.as_u64() + len - 1)).as_u64() + 1
        };
        Ok((first..end).map(VirtualPageIndex::new))
    }
}

/// Virtual page number of `va` relative to `vbase`.
#[inline]
#[must_use]
pub const fn vpn_of<S: PageSize>(vbase: u64, va: VirtualAddress) -> VirtualPageIndex {
    VirtualPageIndex::new((va.as_u64() - vbase) >> S::SHIFT)
}

impl<S: PageSize> fmt::Debug for VirtualPageAllocator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualPageAllocator")
            .field("vbase", &format_args!("{:#x}", self.vbase))
            .field("allocated", &self.allocated)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MmuConfig;
    use mmu_addresses::Size4K;

    fn geometry() -> Geometry {
        MmuConfig::DEFAULT
            .with_phys_size(64 * 1024)
            .with_virt_size(1024 * 1024)
            .validate::<Size4K>()
            .unwrap()
    }

    #[test]
    fn addresses_start_at_vbase() {
        let g = geometry();
        let v = VirtualPageAllocator::<Size4K>::new(&g);
        assert_eq!(v.address_of(VirtualPageIndex::new(0)).as_u64(), 4096);
        assert_eq!(v.address_of(VirtualPageIndex::new(3)).as_u64(), 4 * 4096);
        assert_eq!(v.index_of(VirtualAddress::new(4096 + 4095)).as_u64(), 0);
        assert_eq!(v.index_of(VirtualAddress::new(2 * 4096)).as_u64(), 1);
        assert_eq!(v.total_pages(), 256);
    }

    #[test]
    fn runs_are_lowest_first_and_unmarked() {
        let g = geometry();
        let mut v = VirtualPageAllocator::<Size4K>::new(&g);
        let run = v.find_free_run(3).unwrap();
        assert_eq!(run.as_u64(), 0);
        assert_eq!(v.allocated_pages(), 0);

        for i in 0..3 {
            v.mark(run.step(i), true);
        }
        assert_eq!(v.find_free_run(1).unwrap().as_u64(), 3);

        v.mark(VirtualPageIndex::new(1), false);
        assert_eq!(v.find_free_run(1).unwrap().as_u64(), 1);
        assert_eq!(v.find_free_run(2).unwrap().as_u64(), 3);
        assert!(v.find_free_run(257).is_none());
    }

    #[test]
    fn covered_pages_include_partial_pages() {
        let g = geometry();
        let v = VirtualPageAllocator::<Size4K>::new(&g);
        let pages: Vec<_> = v
            .covered(&g, VirtualAddress::new(4096 + 4094), 4)
            .unwrap()
            .map(VirtualPageIndex::as_u64)
            .collect();
        assert_eq!(pages, [0, 1]);

        assert_eq!(v.covered(&g, VirtualAddress::new(4096), 0).unwrap().count(), 0);
        assert!(v.covered(&g, VirtualAddress::new(0), 1).is_err());
        assert!(v.covered(&g, VirtualAddress::new(g.vend() - 1), 2).is_err());
    }
}
