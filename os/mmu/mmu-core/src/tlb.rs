//! # Translation Lookaside Buffer
//!
//! A direct-mapped cache of virtual page → physical page translations. The
//! virtual page number selects slot `vpn mod N` (its low `log2(N)` bits) and
//! the remaining high bits are kept as the tag.
//!
//! Every [`Tlb::lookup`] counts as an access; a lookup that does not find a
//! valid slot with a matching tag also counts as a miss. Both counters only
//! grow.

use crate::bits::mid_bits;
use crate::config::Geometry;
use crate::virt::{VirtualPageIndex, vpn_of};
use core::fmt;
use core::marker::PhantomData;
use log::trace;
use mmu_addresses::{PageId, PageSize, PhysicalAddress, PhysicalPage, VirtualAddress};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TlbSlot {
    pub tag: u64,
    /// Cached page; `None` marks the slot invalid.
    pub page: Option<PageId>,
}

/// Access counters of a [`Tlb`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TlbStats {
    pub accesses: u64,
    pub misses: u64,
}

impl TlbStats {
    /// Hits are whatever did not miss.
    #[inline]
    #[must_use]
    pub const fn hits(&self) -> u64 {
        self.accesses - self.misses
    }

    /// `misses / accesses`, or `0.0` before the first access.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn miss_rate(&self) -> f64 {
        if self.accesses == 0 {
            0.0
        } else {
            self.misses as f64 / self.accesses as f64
        }
    }
}

impl fmt::Display for TlbStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TLB miss rate {:.6} ({} misses / {} accesses)",
            self.miss_rate(),
            self.misses,
            self.accesses
        )
    }
}

pub struct Tlb<S: PageSize> {
    slots: Box<[TlbSlot]>,
    index_bits: u32,
    vbase: u64,
    stats: TlbStats,
    _size: PhantomData<S>,
}

impl<S: PageSize> Tlb<S> {
    #[must_use]
    pub fn new(geometry: &Geometry) -> Self {
        Self {
            slots: vec![TlbSlot::default(); geometry.tlb_entries].into_boxed_slice(),
            index_bits: geometry.tlb_index_bits,
            vbase: geometry.vbase,
            stats: TlbStats::default(),
            _size: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot index and tag for a virtual page number.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn slot_of(&self, vpn: VirtualPageIndex) -> (usize, u64) {
        let vpn = vpn.as_u64();
        (mid_bits(vpn, self.index_bits, 0) as usize, vpn >> self.index_bits)
    }

    /// Cached translation of `va`. Counts an access, and a miss if the slot
    /// is invalid or holds another tag.
    pub fn lookup(&mut self, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.stats.accesses += 1;
        let (index, tag) = self.slot_of(vpn_of::<S>(self.vbase, va));
        let slot = self.slots[index];
        match slot.page {
            Some(page) if slot.tag == tag => {
                Some(PhysicalPage::<S>::from_id(page).join(va.offset::<S>()))
            }
            _ => {
                self.stats.misses += 1;
                trace!("TLB miss at {va}");
                None
            }
        }
    }

    /// Cache `va → page`, replacing whatever the slot held.
    pub fn insert(&mut self, va: VirtualAddress, page: PageId) {
        let (index, tag) = self.slot_of(vpn_of::<S>(self.vbase, va));
        self.slots[index] = TlbSlot {
            tag,
            page: Some(page),
        };
    }

    /// Drop the translation of `va`'s page if it is the one cached.
    pub fn invalidate(&mut self, va: VirtualAddress) {
        self.invalidate_page(vpn_of::<S>(self.vbase, va));
    }

    pub(crate) fn invalidate_page(&mut self, vpn: VirtualPageIndex) {
        let (index, tag) = self.slot_of(vpn);
        let slot = &mut self.slots[index];
        if slot.page.is_some() && slot.tag == tag {
            *slot = TlbSlot::default();
        }
    }

    /// Invalidate every slot. Counters are kept.
    pub fn flush(&mut self) {
        self.slots.fill(TlbSlot::default());
    }

    #[inline]
    #[must_use]
    pub fn miss_rate(&self) -> f64 {
        self.stats.miss_rate()
    }

    #[inline]
    #[must_use]
    pub const fn stats(&self) -> TlbStats {
        self.stats
    }

    #[inline]
    #[must_use]
    pub fn slot(&self, index: usize) -> Option<&TlbSlot> {
        self.slots.get(index)
    }
}

impl<S: PageSize> fmt::Debug for Tlb<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let valid = self.slots.iter().filter(|s| s.page.is_some()).count();
        f.debug_struct("Tlb")
            .field("slots", &self.slots.len())
            .field("valid", &valid)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MmuConfig;
    use mmu_addresses::Size4K;

    fn tlb(entries: usize) -> Tlb<Size4K> {
        let g = MmuConfig::DEFAULT
            .with_phys_size(64 * 1024)
            .with_virt_size(1024 * 1024)
            .with_tlb_entries(entries)
            .validate::<Size4K>()
            .unwrap();
        Tlb::new(&g)
    }

    fn va(page: u64, offset: u64) -> VirtualAddress {
        VirtualAddress::new(4096 + page * 4096 + offset)
    }

    #[test]
    fn empty_tlb_has_zero_miss_rate() {
        let t = tlb(16);
        assert!(t.miss_rate().abs() < f64::EPSILON);
        assert_eq!(t.stats(), TlbStats::default());
        assert_eq!(t.len(), 16);
    }

    #[test]
    fn hit_adds_the_page_offset() {
        let mut t = tlb(16);
        assert_eq!(t.lookup(va(3, 0)), None);
        t.insert(va(3, 0), PageId::new(9));
        assert_eq!(
            t.lookup(va(3, 0x123)),
            Some(PhysicalAddress::new(9 * 4096 + 0x123))
        );
        assert_eq!(t.stats(), TlbStats { accesses: 2, misses: 1 });
        assert_eq!(t.stats().hits(), 1);
    }

    #[test]
    fn conflicting_pages_evict_each_other() {
        let mut t = tlb(4);
        t.insert(va(1, 0), PageId::new(1));
        t.insert(va(5, 0), PageId::new(2));
        assert_eq!(t.slot_of(VirtualPageIndex::new(5)), (1, 1));
        assert_eq!(t.lookup(va(1, 0)), None);
        assert_eq!(t.lookup(va(5, 0)), Some(PhysicalAddress::new(2 * 4096)));
    }

    #[test]
    fn invalidate_requires_a_matching_tag() {
        let mut t = tlb(4);
        t.insert(va(1, 0), PageId::new(1));
        t.invalidate(va(5, 0));
        assert!(t.slot(1).unwrap().page.is_some());
        t.invalidate(va(1, 77));
        assert_eq!(t.slot(1), Some(&TlbSlot::default()));
    }

    #[test]
    fn flush_keeps_counters() {
        let mut t = tlb(4);
        t.insert(va(0, 0), PageId::new(1));
        let _ = t.lookup(va(0, 0));
        t.flush();
        assert_eq!(t.lookup(va(0, 0)), None);
        assert_eq!(t.stats(), TlbStats { accesses: 2, misses: 1 });
        assert!((t.miss_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn display_reports_the_rate() {
        let stats = TlbStats { accesses: 4, misses: 1 };
        assert_eq!(
            stats.to_string(),
            "TLB miss rate 0.250000 (1 misses / 4 accesses)"
        );
    }
}
