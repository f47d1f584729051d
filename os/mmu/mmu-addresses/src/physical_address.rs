use crate::{MemoryAddress, PageId, PageSize};
use core::fmt;

/// Byte offset into the backing arena.
///
/// ```rust
/// # use mmu_addresses::*;
/// let pa = PhysicalAddress::new(0x2042);
/// assert_eq!(pa.page_id::<Size4K>(), PageId::new(2));
/// assert_eq!(pa.as_usize(), 0x2042);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(MemoryAddress);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(MemoryAddress::new(v))
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0.as_u64()
    }

    /// The address as an index into the arena slice.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn as_usize(self) -> usize {
        self.0.as_u64() as usize
    }

    /// Arena page containing this address.
    #[inline]
    #[must_use]
    pub const fn page_id<S: PageSize>(self) -> PageId {
        PageId::new(self.as_u64() >> S::SHIFT)
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA({})", self.0)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
