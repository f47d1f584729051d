//! # Physical Page Allocator
//!
//! Owns the backing arena ("physical memory") and the bitmap of its pages.
//! Data pages and page-table nodes come out of the same pool. Allocation is
//! first-fit by ascending page id; nothing is compacted or reference counted.
//!
//! A physical address is a byte offset into the arena; [`PageId`] `n` covers
//! `[n * S::SIZE, (n + 1) * S::SIZE)`.

use crate::bits::Bitmap;
use crate::config::{ConfigError, Geometry};
use core::fmt;
use core::marker::PhantomData;
use mmu_addresses::{PageId, PageSize, PhysicalAddress, PhysicalPage};

pub struct PhysicalMemory<S: PageSize> {
    arena: Box<[u8]>,
    used: Bitmap,
    _size: PhantomData<S>,
}

impl<S: PageSize> PhysicalMemory<S> {
    /// Allocate a zeroed arena of `geometry.phys_pages` pages.
    ///
    /// # Errors
    /// [`ConfigError::ArenaNotAddressable`] if the arena does not fit `usize`.
    pub fn new(geometry: &Geometry) -> Result<Self, ConfigError> {
        debug_assert_eq!(geometry.page_size, S::SIZE);
        let bytes = geometry.phys_pages * S::SIZE;
        let not_addressable = ConfigError::ArenaNotAddressable(bytes);
        let pages = usize::try_from(geometry.phys_pages).map_err(|_| not_addressable)?;
        let len = usize::try_from(bytes).map_err(|_| not_addressable)?;

        Ok(Self {
            arena: vec![0; len].into_boxed_slice(),
            used: Bitmap::new(pages),
            _size: PhantomData,
        })
    }

    /// Claim the lowest-numbered free page. The page keeps whatever bytes
    /// its previous owner left; see [`zero_page`](Self::zero_page).
    pub fn find_free_page(&mut self) -> Option<PageId> {
        let index = self.used.first_clear()?;
        self.used.set(index);
        Some(PageId::new(index as u64))
    }

    /// Claim the lowest-numbered free page and clear its contents.
    pub fn allocate_zeroed(&mut self) -> Option<PageId> {
        let id = self.find_free_page()?;
        self.zero_page(id);
        Some(id)
    }

    /// Return `id` to the pool.
    pub fn release_page(&mut self, id: PageId) {
        debug_assert!(self.is_used(id), "double release of {id}");
        self.used.clear(id.as_usize());
    }

    #[inline]
    #[must_use]
    pub fn is_used(&self, id: PageId) -> bool {
        self.used.test(id.as_usize())
    }

    #[inline]
    #[must_use]
    pub fn page(&self, id: PageId) -> &[u8] {
        &self.arena[Self::span(id)]
    }

    #[inline]
    pub fn page_mut(&mut self, id: PageId) -> &mut [u8] {
        &mut self.arena[Self::span(id)]
    }

    pub fn zero_page(&mut self, id: PageId) {
        self.page_mut(id).fill(0);
    }

    /// Copy `out.len()` arena bytes starting at `pa`.
    pub fn read_bytes(&self, pa: PhysicalAddress, out: &mut [u8]) {
        let start = pa.as_usize();
        out.copy_from_slice(&self.arena[start..start + out.len()]);
    }

    /// Store `data` in the arena starting at `pa`.
    pub fn write_bytes(&mut self, pa: PhysicalAddress, data: &[u8]) {
        let start = pa.as_usize();
        self.arena[start..start + data.len()].copy_from_slice(data);
    }

    #[inline]
    #[must_use]
    pub fn used_pages(&self) -> usize {
        self.used.count_set()
    }

    #[inline]
    #[must_use]
    pub fn free_pages(&self) -> usize {
        self.total_pages() - self.used_pages()
    }

    #[inline]
    #[must_use]
    pub const fn total_pages(&self) -> usize {
        self.used.len()
    }

    #[inline]
    #[must_use]
    pub const fn base(id: PageId) -> PhysicalPage<S> {
        PhysicalPage::from_id(id)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn span(id: PageId) -> core::ops::Range<usize> {
        let start = Self::base(id).base().as_usize();
        start..start + S::SIZE as usize
    }
}

impl<S: PageSize> fmt::Debug for PhysicalMemory<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicalMemory")
            .field("page_size", &S::as_str())
            .field("used", &self.used)
            .finish_non_exhaustive()
    }
}
