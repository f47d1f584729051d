use crate::PageSize;
use core::fmt;
use core::marker::PhantomData;

/// Byte position inside a page of size `S`, always below `S::SIZE`.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MemoryAddressOffset<S: PageSize> {
    value: u64,
    _size: PhantomData<S>,
}

impl<S: PageSize> MemoryAddressOffset<S> {
    /// Wrap `value`, discarding bits above the page size.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        debug_assert!(value < S::SIZE, "offset must be < page size");
        Self {
            value: value & (S::SIZE - 1),
            _size: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.value
    }

    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn as_usize(self) -> usize {
        self.value as usize
    }

    /// Bytes from here to the end of the page; at least 1.
    #[inline]
    #[must_use]
    pub const fn remaining(self) -> u64 {
        S::SIZE - self.value
    }
}

impl<S: PageSize> fmt::Debug for MemoryAddressOffset<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{:#x}/{}", self.value, S::as_str())
    }
}
