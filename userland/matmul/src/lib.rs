//! # Matrix Multiply over Virtual Memory
//!
//! Square `i32` matrices stored row-major in MMU-managed virtual memory,
//! little-endian, four bytes per element. Every element access goes through
//! [`MemoryManager::read`] and [`MemoryManager::write`], so a multiply walks
//! the TLB in a strided pattern: rows of the left operand, columns of the
//! right one.

use log::debug;
use mmu_core::{MemoryManager, MmuError, PageSize, VirtualAddress};

const ELEMENT: u64 = size_of::<i32>() as u64;

/// An `n × n` matrix placed at `base`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Matrix {
    pub base: VirtualAddress,
    pub n: usize,
}

impl Matrix {
    /// Bytes occupied by an `n × n` matrix.
    #[must_use]
    pub const fn bytes(n: usize) -> u64 {
        (n * n) as u64 * ELEMENT
    }

    /// Allocate an uninitialized (zeroed) `n × n` matrix.
    ///
    /// # Errors
    /// Whatever [`MemoryManager::allocate`] reports.
    pub fn allocate<S: PageSize>(mm: &MemoryManager<S>, n: usize) -> Result<Self, MmuError> {
        let base = mm.allocate(Self::bytes(n))?;
        Ok(Self { base, n })
    }

    /// Allocate an `n × n` matrix and fill it from `values` (row-major).
    ///
    /// # Errors
    /// Whatever [`MemoryManager::allocate`] or [`MemoryManager::write`] report.
    pub fn store<S: PageSize>(
        mm: &MemoryManager<S>,
        n: usize,
        values: &[i32],
    ) -> Result<Self, MmuError> {
        debug_assert_eq!(values.len(), n * n);
        let matrix = Self::allocate(mm, n)?;
        for (i, value) in values.iter().enumerate() {
            mm.write(matrix.at_index(i), &value.to_le_bytes())?;
        }
        Ok(matrix)
    }

    /// Read the whole matrix back (row-major).
    ///
    /// # Errors
    /// Whatever [`MemoryManager::read`] reports.
    pub fn load<S: PageSize>(&self, mm: &MemoryManager<S>) -> Result<Vec<i32>, MmuError> {
        (0..self.n * self.n)
            .map(|i| get(mm, self.at_index(i)))
            .collect()
    }

    /// Return the matrix's pages to the MMU.
    ///
    /// # Errors
    /// Whatever [`MemoryManager::release`] reports.
    pub fn release<S: PageSize>(self, mm: &MemoryManager<S>) -> Result<(), MmuError> {
        mm.release(self.base, Self::bytes(self.n))
    }

    /// Address of element `(row, col)`.
    #[must_use]
    pub fn at(&self, row: usize, col: usize) -> VirtualAddress {
        self.at_index(row * self.n + col)
    }

    fn at_index(&self, index: usize) -> VirtualAddress {
        self.base + index as u64 * ELEMENT
    }
}

/// Read one element at `va`.
///
/// # Errors
/// Whatever [`MemoryManager::read`] reports.
pub fn get<S: PageSize>(mm: &MemoryManager<S>, va: VirtualAddress) -> Result<i32, MmuError> {
    let mut raw = [0; size_of::<i32>()];
    mm.read(va, &mut raw)?;
    Ok(i32::from_le_bytes(raw))
}

/// Store one element at `va`.
///
/// # Errors
/// Whatever [`MemoryManager::write`] reports.
pub fn put<S: PageSize>(mm: &MemoryManager<S>, va: VirtualAddress, value: i32) -> Result<(), MmuError> {
    mm.write(va, &value.to_le_bytes())
}

/// `answer = lhs × rhs`, element by element through the MMU. Sums wrap on
/// overflow.
///
/// # Errors
/// The first read or write failure; `answer` may be partially written.
pub fn mat_mult<S: PageSize>(
    mm: &MemoryManager<S>,
    lhs: &Matrix,
    rhs: &Matrix,
    answer: &Matrix,
) -> Result<(), MmuError> {
    let n = lhs.n;
    debug_assert!(rhs.n == n && answer.n == n, "dimension mismatch");

    for i in 0..n {
        for j in 0..n {
            let mut sum = 0_i32;
            for k in 0..n {
                let a = get(mm, lhs.at(i, k))?;
                let b = get(mm, rhs.at(k, j))?;
                sum = sum.wrapping_add(a.wrapping_mul(b));
            }
            put(mm, answer.at(i, j), sum)?;
        }
    }

    debug!("multiplied {n}x{n} matrices, {}", mm.tlb_stats());
    Ok(())
}
