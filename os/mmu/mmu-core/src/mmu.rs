//! # MMU Context
//!
//! [`Mmu`] ties the components of one emulated address space together: the
//! arena with its physical bitmap, the virtual bitmap, the page table and the
//! TLB. It is single-owner; [`MemoryManager`](crate::MemoryManager) adds the
//! locking.
//!
//! After every completed operation:
//!
//! - a virtual page is marked allocated iff the page table resolves it;
//! - every used arena page is referenced exactly once, either as a table node
//!   or as a leaf target;
//! - a valid TLB slot agrees with the page table.

use crate::config::{Geometry, MmuConfig};
use crate::error::MmuError;
use crate::page_table::PageTable;
use crate::phys::PhysicalMemory;
use crate::tlb::{Tlb, TlbStats};
use crate::virt::{VirtualPageAllocator, VirtualPageIndex};
use core::marker::PhantomData;
use log::{debug, info, warn};
use mmu_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};
use parking_lot::Mutex;

pub struct Mmu<S: PageSize = Size4K> {
    geometry: Geometry,
    phys: PhysicalMemory<S>,
    virt: VirtualPageAllocator<S>,
    table: PageTable<S>,
    /// Separately locked so shared readers can fill it.
    tlb: Mutex<Tlb<S>>,
}

impl<S: PageSize> Mmu<S> {
    /// Validate `config`, allocate the arena and install the root directory.
    ///
    /// # Errors
    /// [`MmuError::Config`] if the configuration is unusable.
    pub fn new(config: MmuConfig) -> Result<Self, MmuError> {
        let geometry = config.validate::<S>()?;
        let mut phys = PhysicalMemory::new(&geometry)?;
        let table = PageTable::new(&mut phys, geometry)?;

        info!("MMU with {} pages: {geometry}", S::as_str());
        Ok(Self {
            geometry,
            phys,
            virt: VirtualPageAllocator::new(&geometry),
            table,
            tlb: Mutex::new(Tlb::new(&geometry)),
        })
    }

    #[inline]
    #[must_use]
    pub const fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Map `ceil(num_bytes / PAGE_SIZE)` fresh, zeroed pages at the lowest
    /// free run of virtual pages and return its base address.
    ///
    /// # Errors
    /// - [`MmuError::InvalidRange`] for `num_bytes == 0`.
    /// - [`MmuError::OutOfVirtualAddressSpace`] if no run is large enough.
    /// - [`MmuError::OutOfPhysicalMemory`] if the arena runs out; every page
    ///   mapped by this call is released again.
    pub fn allocate(&mut self, num_bytes: u64) -> Result<VirtualAddress, MmuError> {
        if num_bytes == 0 {
            return Err(MmuError::InvalidRange {
                start: VirtualAddress::zero(),
                len: 0,
            });
        }

        let pages = num_bytes.div_ceil(S::SIZE);
        let Some(start) = self.virt.find_free_run(pages) else {
            warn!("no run of {pages} free virtual pages for {num_bytes:#x} bytes");
            return Err(MmuError::OutOfVirtualAddressSpace { pages });
        };

        for i in 0..pages {
            if let Err(e) = self.table.ensure_mapping(&mut self.phys, start.step(i)) {
                warn!("allocation of {pages} pages failed after {i}: {e}; rolling back");
                self.unmap_run(start, i);
                return Err(e);
            }
        }
        for i in 0..pages {
            self.virt.mark(start.step(i), true);
        }

        let va = self.virt.address_of(start);
        debug!("allocated {pages} pages ({num_bytes:#x} bytes) at {va}");
        Ok(va)
    }

    /// Unmap every page touched by `[va, va + size)`, return its arena page to
    /// the pool and drop its TLB entry. Nothing changes if the call fails;
    /// `size == 0` does nothing.
    ///
    /// # Errors
    /// - [`MmuError::InvalidRange`] if the range leaves the virtual range.
    /// - [`MmuError::TranslationFault`] at the first covered page that is not
    ///   allocated.
    pub fn release(&mut self, va: VirtualAddress, size: u64) -> Result<(), MmuError> {
        if size == 0 {
            return Ok(());
        }

        for vpn in self.virt.covered(&self.geometry, va, size)? {
            if !self.virt.is_allocated(vpn) {
                let fault = self.virt.address_of(vpn).max(va);
                warn!("release of {size:#x} bytes at {va} hit unmapped {fault}");
                return Err(MmuError::TranslationFault(fault));
            }
        }

        let tlb = self.tlb.get_mut();
        let mut pages = 0_u64;
        for vpn in self.virt.covered(&self.geometry, va, size)? {
            if let Some(page) = self.table.unmap(&mut self.phys, vpn) {
                self.phys.release_page(page);
            }
            tlb.invalidate_page(vpn);
            self.virt.mark(vpn, false);
            pages += 1;
        }

        debug!("released {pages} pages ({size:#x} bytes) at {va}");
        Ok(())
    }

    /// Copy `buf.len()` bytes starting at `va` into `buf`.
    ///
    /// # Errors
    /// [`MmuError::InvalidRange`] or [`MmuError::TranslationFault`]; `buf` is
    /// untouched on error.
    pub fn read(&self, va: VirtualAddress, buf: &mut [u8]) -> Result<(), MmuError> {
        let mut done = 0;
        for (pa, len) in self.resolve(va, buf.len() as u64)? {
            self.phys.read_bytes(pa, &mut buf[done..done + len]);
            done += len;
        }
        Ok(())
    }

    /// Copy `bytes` to the virtual range starting at `va`.
    ///
    /// # Errors
    /// [`MmuError::InvalidRange`] or [`MmuError::TranslationFault`]; nothing is
    /// written on error.
    pub fn write(&mut self, va: VirtualAddress, bytes: &[u8]) -> Result<(), MmuError> {
        let mut done = 0;
        for (pa, len) in self.resolve(va, bytes.len() as u64)? {
            self.phys.write_bytes(pa, &bytes[done..done + len]);
            done += len;
        }
        Ok(())
    }

    /// Physical address backing `va`: TLB first, then a table walk whose
    /// result is cached.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.geometry.check_range(va, 1).ok()?;

        let mut tlb = self.tlb.lock();
        if let Some(pa) = tlb.lookup(va) {
            return Some(pa);
        }

        let page = self.table.lookup(&self.phys, self.virt.index_of(va))?;
        tlb.insert(va, page);
        Some(PhysicalPage::<S>::from_id(page).join(va.offset::<S>()))
    }

    /// Whether the page containing `va` is allocated.
    #[must_use]
    pub fn is_mapped(&self, va: VirtualAddress) -> bool {
        self.geometry.check_range(va, 1).is_ok() && self.virt.is_allocated(self.virt.index_of(va))
    }

    #[must_use]
    pub fn tlb_miss_rate(&self) -> f64 {
        self.tlb.lock().miss_rate()
    }

    #[must_use]
    pub fn tlb_stats(&self) -> TlbStats {
        self.tlb.lock().stats()
    }

    /// Invalidate every TLB slot.
    pub fn flush_tlb(&self) {
        self.tlb.lock().flush();
    }

    /// Arena pages in use, page-table nodes included.
    #[must_use]
    pub fn used_physical_pages(&self) -> usize {
        self.phys.used_pages()
    }

    #[must_use]
    pub fn free_physical_pages(&self) -> usize {
        self.phys.free_pages()
    }

    #[must_use]
    pub fn allocated_virtual_pages(&self) -> usize {
        self.virt.allocated_pages()
    }

    /// Translate every page-sized chunk of `[va, va + len)` before anything
    /// is copied.
    fn resolve(&self, va: VirtualAddress, len: u64) -> Result<Vec<(PhysicalAddress, usize)>, MmuError> {
        if len == 0 {
            return Ok(Vec::new());
        }
        self.geometry.check_range(va, len)?;
        PageChunks::<S>::new(va, len)
            .map(|(chunk, n)| {
                self.translate(chunk)
                    .map(|pa| (pa, n))
                    .ok_or(MmuError::TranslationFault(chunk))
            })
            .collect()
    }

    fn unmap_run(&mut self, start: VirtualPageIndex, pages: u64) {
        for i in 0..pages {
            if let Some(page) = self.table.unmap(&mut self.phys, start.step(i)) {
                self.phys.release_page(page);
            }
        }
    }
}

/// Splits `[va, va + len)` at page boundaries into `(start, length)` pieces.
struct PageChunks<S: PageSize> {
    next: u64,
    end: u64,
    _size: PhantomData<S>,
}

impl<S: PageSize> PageChunks<S> {
    const fn new(va: VirtualAddress, len: u64) -> Self {
        Self {
            next: va.as_u64(),
            end: va.as_u64() + len,
            _size: PhantomData,
        }
    }
}

impl<S: PageSize> Iterator for PageChunks<S> {
    type Item = (VirtualAddress, usize);

    #[allow(clippy::cast_possible_truncation)]
    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let start = VirtualAddress::new(self.next);
        let len = start.offset::<S>().remaining().min(self.end - self.next);
        self.next += len;
        Some((start, len as usize))
    }
}

impl<S: PageSize> core::fmt::Debug for Mmu<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Mmu")
            .field("geometry", &self.geometry)
            .field("phys", &self.phys)
            .field("virt", &self.virt)
            .field("tlb", &*self.tlb.lock())
            .finish_non_exhaustive()
    }
}
