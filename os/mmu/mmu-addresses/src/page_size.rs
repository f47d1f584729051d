use core::fmt;
use core::hash::Hash;

/// Sealed trait pattern to restrict `PageSize` impls to our markers.
mod sealed {
    pub trait Sealed {}
}

/// Marker trait for supported page sizes.
///
/// The size is a compile-time property of an MMU instance; everything that
/// depends on it (offset width, entries per table node, arena layout) is
/// derived from [`SIZE`](PageSize::SIZE) and [`SHIFT`](PageSize::SHIFT).
pub trait PageSize:
    sealed::Sealed
    + Clone
    + Copy
    + Eq
    + PartialEq
    + Ord
    + PartialOrd
    + Hash
    + Send
    + Sync
    + fmt::Display
    + fmt::Debug
    + 'static
{
    /// Page size in bytes (power of two).
    const SIZE: u64;
    /// log2(SIZE), i.e., number of low bits used for the offset.
    const SHIFT: u32;

    fn as_str() -> &'static str;
}

macro_rules! page_size {
    ($(#[$meta:meta])* $name:ident, $shift:literal, $label:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name;

        impl sealed::Sealed for $name {}

        impl PageSize for $name {
            const SIZE: u64 = 1 << $shift;
            const SHIFT: u32 = $shift;

            fn as_str() -> &'static str {
                $label
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(Self::as_str())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                fmt::Display::fmt(&self, f)
            }
        }
    };
}

page_size!(
    /// 4 KiB page (4096 bytes).
    Size4K, 12, "4K"
);

page_size!(
    /// 16 KiB page (`16_384` bytes).
    Size16K, 14, "16K"
);

page_size!(
    /// 64 KiB page (`65_536` bytes).
    Size64K, 16, "64K"
);

const _: () = {
    assert!(Size4K::SIZE == 4096);
    assert!(Size16K::SIZE == 16 * 1024);
    assert!(Size64K::SIZE == 64 * 1024);
};
