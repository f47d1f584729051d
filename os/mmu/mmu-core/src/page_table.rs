//! # Multi-Level Page Table
//!
//! An `L`-level radix tree whose nodes live in arena pages. Each node is an
//! array of little-endian [`TableEntry`] values, 4 or 8 bytes wide depending on
//! the configured address width.
//!
//! ## Walk
//!
//! Level 0 is the root directory and is indexed by the top `root_bits` of the
//! virtual page number; every further level consumes `index_bits`. The entry
//! found at level `L - 1` is the leaf and references a data page; all others
//! reference the next node. With `L = 1` the root directory holds the leaves.
//!
//! ## Invariants
//!
//! - The root is allocated once, in [`PageTable::new`], and never released.
//! - Intermediate nodes are created on demand, zero-filled, and retained when
//!   their leaves are cleared.
//! - Every present entry references a page marked used in the physical bitmap.

use crate::bits::mid_bits;
use crate::config::Geometry;
use crate::error::MmuError;
use crate::phys::PhysicalMemory;
use crate::virt::VirtualPageIndex;
use bitfield_struct::bitfield;
use core::marker::PhantomData;
use log::trace;
use mmu_addresses::{PageId, PageSize};

/// A page-table entry.
///
/// | Bits  | Meaning                               |
/// |-------|---------------------------------------|
/// | 0     | present                               |
/// | 1..64 | page id of the child node / data page |
///
/// 32-bit address widths store only the low 32 bits; the configuration
/// guarantees every page id fits.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct TableEntry {
    pub present: bool,
    #[bits(63)]
    pub page: u64,
}

impl TableEntry {
    /// A present entry referencing `page`.
    #[inline]
    #[must_use]
    pub const fn pointing_to(page: PageId) -> Self {
        Self::new().with_present(true).with_page(page.as_u64())
    }

    /// The referenced page, if present.
    #[inline]
    #[must_use]
    pub const fn target(self) -> Option<PageId> {
        if self.present() {
            Some(PageId::new(self.page()))
        } else {
            None
        }
    }
}

pub struct PageTable<S: PageSize> {
    root: PageId,
    geometry: Geometry,
    _size: PhantomData<S>,
}

impl<S: PageSize> PageTable<S> {
    /// Allocate and zero the root directory.
    ///
    /// # Errors
    /// [`MmuError::OutOfPhysicalMemory`] if the arena has no free page.
    pub fn new(phys: &mut PhysicalMemory<S>, geometry: Geometry) -> Result<Self, MmuError> {
        let root = phys
            .allocate_zeroed()
            .ok_or(MmuError::OutOfPhysicalMemory)?;
        trace!("root directory at page {root}");
        Ok(Self {
            root,
            geometry,
            _size: PhantomData,
        })
    }

    #[inline]
    #[must_use]
    pub const fn root(&self) -> PageId {
        self.root
    }

    /// Resolve `vpn` to its data page, installing whatever is missing: absent
    /// nodes are allocated, zero-filled and linked; an absent leaf receives a
    /// fresh zeroed data page. An existing mapping is returned unchanged.
    ///
    /// # Errors
    /// [`MmuError::OutOfPhysicalMemory`] when a node or data page cannot be
    /// allocated. Nodes created before the failure stay linked.
    pub fn ensure_mapping(
        &self,
        phys: &mut PhysicalMemory<S>,
        vpn: VirtualPageIndex,
    ) -> Result<PageId, MmuError> {
        let (node, index) = self.ensure_leaf_node(phys, vpn)?;
        if let Some(page) = self.entry(phys, node, index).target() {
            return Ok(page);
        }

        let page = phys
            .allocate_zeroed()
            .ok_or(MmuError::OutOfPhysicalMemory)?;
        self.set_entry(phys, node, index, TableEntry::pointing_to(page));
        Ok(page)
    }

    /// Install `page` as the leaf for `vpn`, creating nodes as needed. A
    /// previous leaf is overwritten, not released, and returned.
    ///
    /// # Errors
    /// [`MmuError::OutOfPhysicalMemory`] when a node cannot be allocated.
    pub fn map(
        &self,
        phys: &mut PhysicalMemory<S>,
        vpn: VirtualPageIndex,
        page: PageId,
    ) -> Result<Option<PageId>, MmuError> {
        let (node, index) = self.ensure_leaf_node(phys, vpn)?;
        let previous = self.entry(phys, node, index).target();
        self.set_entry(phys, node, index, TableEntry::pointing_to(page));
        Ok(previous)
    }

    /// Data page mapped at `vpn`, `None` at the first absent entry.
    #[must_use]
    pub fn lookup(&self, phys: &PhysicalMemory<S>, vpn: VirtualPageIndex) -> Option<PageId> {
        let (node, index) = self.find_leaf_node(phys, vpn)?;
        self.entry(phys, node, index).target()
    }

    /// Clear the leaf entry for `vpn` and return what it referenced. Nodes
    /// on the path are kept.
    pub fn unmap(&self, phys: &mut PhysicalMemory<S>, vpn: VirtualPageIndex) -> Option<PageId> {
        let (node, index) = self.find_leaf_node(phys, vpn)?;
        let page = self.entry(phys, node, index).target()?;
        self.set_entry(phys, node, index, TableEntry::new());
        Some(page)
    }

    /// Index into the node at `level` (0 = root) for `vpn`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn index(&self, vpn: VirtualPageIndex, level: u32) -> usize {
        mid_bits(
            vpn.as_u64(),
            self.geometry.level_bits(level),
            self.geometry.level_shift(level),
        ) as usize
    }

    fn find_leaf_node(
        &self,
        phys: &PhysicalMemory<S>,
        vpn: VirtualPageIndex,
    ) -> Option<(PageId, usize)> {
        let leaf = self.geometry.levels - 1;
        let mut node = self.root;
        for level in 0..leaf {
            node = self.entry(phys, node, self.index(vpn, level)).target()?;
        }
        Some((node, self.index(vpn, leaf)))
    }

    fn ensure_leaf_node(
        &self,
        phys: &mut PhysicalMemory<S>,
        vpn: VirtualPageIndex,
    ) -> Result<(PageId, usize), MmuError> {
        let leaf = self.geometry.levels - 1;
        let mut node = self.root;
        for level in 0..leaf {
            let index = self.index(vpn, level);
            node = match self.entry(phys, node, index).target() {
                Some(next) => next,
                None => {
                    let next = phys
                        .allocate_zeroed()
                        .ok_or(MmuError::OutOfPhysicalMemory)?;
                    self.set_entry(phys, node, index, TableEntry::pointing_to(next));
                    trace!("created level {} node {next} for {vpn:?}", level + 1);
                    next
                }
            };
        }
        Ok((node, self.index(vpn, leaf)))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn entry(&self, phys: &PhysicalMemory<S>, node: PageId, index: usize) -> TableEntry {
        let size = self.geometry.entry_size as usize;
        let at = index * size;
        let raw = phys.page(node)[at..at + size]
            .iter()
            .rev()
            .fold(0_u64, |acc, &b| (acc << 8) | u64::from(b));
        TableEntry::from_bits(raw)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn set_entry(&self, phys: &mut PhysicalMemory<S>, node: PageId, index: usize, entry: TableEntry) {
        let size = self.geometry.entry_size as usize;
        let at = index * size;
        let raw = entry.into_bits();
        for (i, byte) in phys.page_mut(node)[at..at + size].iter_mut().enumerate() {
            *byte = (raw >> (8 * i)) as u8;
        }
    }
}
