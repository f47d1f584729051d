use crate::{MemoryAddressOffset, PageId, PageSize, PhysicalAddress};
use core::fmt;
use core::marker::PhantomData;

/// One arena page of size `S`, identified by its [`PageId`].
///
/// ```rust
/// # use mmu_addresses::*;
/// let pp = PhysicalPage::<Size16K>::from_id(PageId::new(5));
/// assert_eq!(pp.id(), PageId::new(5));
/// assert_eq!(pp.base().as_u64(), 0x1_4000);
/// assert_eq!(pp.join(MemoryAddressOffset::new(0x1678)), PhysicalAddress::new(0x1_5678));
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage<S: PageSize> {
    id: PageId,
    _size: PhantomData<S>,
}

impl<S: PageSize> PhysicalPage<S> {
    #[inline]
    #[must_use]
    pub const fn from_id(id: PageId) -> Self {
        Self {
            id,
            _size: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn id(self) -> PageId {
        self.id
    }

    /// Arena offset of the first byte.
    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.id.as_u64() << S::SHIFT)
    }

    /// Address of byte `off` inside this page.
    #[inline]
    #[must_use]
    pub const fn join(self, off: MemoryAddressOffset<S>) -> PhysicalAddress {
        PhysicalAddress::new((self.id.as_u64() << S::SHIFT) + off.as_u64())
    }
}

impl<S: PageSize> fmt::Debug for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage<{}>({})", S::as_str(), self.id)
    }
}
