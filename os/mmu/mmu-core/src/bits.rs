//! # Bit Primitives
//!
//! Bit-field extraction for splitting virtual page numbers into table and TLB
//! indices, single-bit operations on byte-addressed bitmaps, and the owned
//! [`Bitmap`] both page allocators are built on.
//!
//! Bit `i` of a bitmap is bit `i % 8` of byte `i / 8`. All inputs are
//! caller-guaranteed in range; nothing here fails.

use core::fmt;

#[inline]
const fn mask(n: u32) -> u64 {
    if n >= u64::BITS {
        u64::MAX
    } else {
        (1 << n) - 1
    }
}

/// The high `n` bits of a `width`-bit `value`, right-justified.
///
/// ```rust
/// # use mmu_core::bits::top_bits;
/// assert_eq!(top_bits(0xABCD_1234, 32, 8), 0xAB);
/// assert_eq!(top_bits(0b1011, 4, 2), 0b10);
/// ```
#[inline]
#[must_use]
pub const fn top_bits(value: u64, width: u32, n: u32) -> u64 {
    if n == 0 {
        return 0;
    }
    (value >> (width - n)) & mask(n)
}

/// `n` bits of `value` starting at bit offset `low`.
///
/// ```rust
/// # use mmu_core::bits::mid_bits;
/// assert_eq!(mid_bits(0xABCD_1234, 8, 12), 0xD1);
/// ```
#[inline]
#[must_use]
pub const fn mid_bits(value: u64, n: u32, low: u32) -> u64 {
    if low >= u64::BITS {
        return 0;
    }
    (value >> low) & mask(n)
}

/// The low `n` bits of `value`.
#[inline]
#[must_use]
pub const fn low_bits(value: u64, n: u32) -> u64 {
    value & mask(n)
}

#[inline]
pub fn set_bit(bitmap: &mut [u8], index: usize) {
    bitmap[index / 8] |= 1 << (index % 8);
}

#[inline]
pub fn clear_bit(bitmap: &mut [u8], index: usize) {
    bitmap[index / 8] &= !(1 << (index % 8));
}

#[inline]
#[must_use]
pub fn test_bit(bitmap: &[u8], index: usize) -> bool {
    (bitmap[index / 8] >> (index % 8)) & 1 == 1
}

/// A fixed-length bitmap; a set bit means "in use".
pub struct Bitmap {
    bytes: Box<[u8]>,
    bits: usize,
}

impl Bitmap {
    /// A bitmap of `bits` clear bits.
    #[must_use]
    pub fn new(bits: usize) -> Self {
        Self {
            bytes: vec![0; bits.div_ceil(8)].into_boxed_slice(),
            bits,
        }
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.bits
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }

    #[inline]
    pub fn set(&mut self, index: usize) {
        debug_assert!(index < self.bits, "bit {index} out of range");
        set_bit(&mut self.bytes, index);
    }

    #[inline]
    pub fn clear(&mut self, index: usize) {
        debug_assert!(index < self.bits, "bit {index} out of range");
        clear_bit(&mut self.bytes, index);
    }

    #[inline]
    pub fn assign(&mut self, index: usize, value: bool) {
        if value {
            self.set(index);
        } else {
            self.clear(index);
        }
    }

    #[inline]
    #[must_use]
    pub fn test(&self, index: usize) -> bool {
        debug_assert!(index < self.bits, "bit {index} out of range");
        test_bit(&self.bytes, index)
    }

    /// Lowest clear bit. Fully set bytes are skipped without looking at
    /// individual bits.
    #[must_use]
    pub fn first_clear(&self) -> Option<usize> {
        let (byte, _) = self
            .bytes
            .iter()
            .enumerate()
            .find(|(_, b)| **b != u8::MAX)?;
        let base = byte * 8;
        (base..(base + 8).min(self.bits)).find(|&i| !test_bit(&self.bytes, i))
    }

    /// Lowest start of `n` consecutive clear bits.
    #[must_use]
    pub fn find_clear_run(&self, n: usize) -> Option<usize> {
        if n == 0 || n > self.bits {
            return None;
        }

        let mut run = 0;
        for (byte, &value) in self.bytes.iter().enumerate() {
            if value == u8::MAX {
                run = 0;
                continue;
            }
            let base = byte * 8;
            for index in base..(base + 8).min(self.bits) {
                if test_bit(&self.bytes, index) {
                    run = 0;
                    continue;
                }
                run += 1;
                if run == n {
                    return Some(index + 1 - n);
                }
            }
        }
        None
    }

    /// Number of set bits.
    #[must_use]
    pub fn count_set(&self) -> usize {
        self.bytes.iter().map(|b| b.count_ones() as usize).sum()
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const SHOWN: usize = 64;
        write!(f, "Bitmap({}/{} set, ", self.count_set(), self.bits)?;
        for i in 0..self.bits.min(SHOWN) {
            f.write_str(if self.test(i) { "1" } else { "0" })?;
        }
        if self.bits > SHOWN {
            f.write_str("…")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_extraction() {
        let v = 0xDEAD_BEEF_u64;
        assert_eq!(top_bits(v, 32, 4), 0xD);
        assert_eq!(top_bits(v, 32, 0), 0);
        assert_eq!(top_bits(u64::MAX, 64, 64), u64::MAX);
        assert_eq!(mid_bits(v, 8, 8), 0xBE);
        assert_eq!(mid_bits(v, 4, 64), 0);
        assert_eq!(low_bits(v, 12), 0xEEF);
        assert_eq!(low_bits(v, 64), v);
    }

    #[test]
    fn single_bits_address_byte_then_bit() {
        let mut raw = [0_u8; 2];
        set_bit(&mut raw, 0);
        set_bit(&mut raw, 9);
        assert_eq!(raw, [0b0000_0001, 0b0000_0010]);
        assert!(test_bit(&raw, 9));
        clear_bit(&mut raw, 9);
        assert!(!test_bit(&raw, 9));
        assert!(test_bit(&raw, 0));
    }

    #[test]
    fn first_clear_skips_full_bytes() {
        let mut map = Bitmap::new(20);
        for i in 0..11 {
            map.set(i);
        }
        assert_eq!(map.first_clear(), Some(11));
        map.clear(3);
        assert_eq!(map.first_clear(), Some(3));
    }

    #[test]
    fn first_clear_ignores_padding_bits() {
        let mut map = Bitmap::new(10);
        for i in 0..10 {
            map.set(i);
        }
        assert_eq!(map.first_clear(), None);
        assert_eq!(map.count_set(), 10);
    }

    #[test]
    fn clear_runs_are_lowest_first() {
        let mut map = Bitmap::new(32);
        map.set(2);
        map.set(5);
        assert_eq!(map.find_clear_run(2), Some(0));
        assert_eq!(map.find_clear_run(3), Some(6));
        for i in 8..16 {
            map.set(i);
        }
        assert_eq!(map.find_clear_run(4), Some(16));
        assert_eq!(map.find_clear_run(16), Some(16));
        assert_eq!(map.find_clear_run(17), None);
        assert_eq!(map.find_clear_run(0), None);
    }

    #[test]
    fn debug_shows_a_bit_string() {
        let mut map = Bitmap::new(4);
        map.assign(1, true);
        assert_eq!(format!("{map:?}"), "Bitmap(1/4 set, 0100)");
    }
}
