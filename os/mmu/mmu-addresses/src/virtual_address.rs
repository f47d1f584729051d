use crate::{MemoryAddress, MemoryAddressOffset, PageSize};
use core::fmt;
use core::ops::Add;

/// Address in the emulated virtual range.
///
/// Carries no validity guarantee: whether it lies inside the managed range,
/// and whether its page is mapped, is for the MMU to decide. Address `0` is
/// never handed out and serves as the null address.
///
/// ```rust
/// # use mmu_addresses::*;
/// let va = VirtualAddress::new(0x40_1234);
/// assert_eq!(va.offset::<Size4K>().as_u64(), 0x234);
/// assert_eq!(va.checked_add(u64::MAX), None);
/// assert_eq!(format!("{va:?}"), "VA(0x401234)");
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(MemoryAddress);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(MemoryAddress::new(v))
    }

    /// The null address.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0.as_u64()
    }

    #[inline]
    #[must_use]
    pub const fn offset<S: PageSize>(self) -> MemoryAddressOffset<S> {
        self.0.offset::<S>()
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u64) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA({})", self.0)
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Add<u64> for VirtualAddress {
    type Output = Self;

    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}
