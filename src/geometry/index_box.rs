//! Axis-aligned integer-index boxes tagged with a mesh block.

use super::int_vec::IntVec;

/// Identifier of a top-level mesh block. Clustering runs independently per
/// block; boxes only interact with boxes and patches of the same block.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct BlockId(pub u32);

/// An axis-aligned integer-index rectangle `[lo, hi]` (inclusive corners) on
/// one block.
///
/// A box with any `hi[d] < lo[d]` is empty; `cells` and `volume` report zero
/// for it.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct IndexBox {
    block: BlockId,
    lo: IntVec,
    hi: IntVec,
}

impl IndexBox {
    pub fn new(block: BlockId, lo: IntVec, hi: IntVec) -> Self {
        assert_eq!(lo.dim(), hi.dim(), "corner dimensions differ");
        Self { block, lo, hi }
    }

    #[inline]
    pub fn block(&self) -> BlockId {
        self.block
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.lo.dim()
    }

    #[inline]
    pub fn lo(&self) -> &IntVec {
        &self.lo
    }

    #[inline]
    pub fn hi(&self) -> &IntVec {
        &self.hi
    }

    /// Number of cells along axis `d` (zero if empty along `d`).
    #[inline]
    pub fn cells(&self, d: usize) -> i32 {
        (self.hi[d] - self.lo[d] + 1).max(0)
    }

    /// Cell counts along every axis.
    pub fn cell_sizes(&self) -> IntVec {
        let mut v = IntVec::uniform(self.dim(), 0);
        for d in 0..self.dim() {
            v.set(d, self.cells(d));
        }
        v
    }

    pub fn is_empty(&self) -> bool {
        (0..self.dim()).any(|d| self.hi[d] < self.lo[d])
    }

    /// Total cell count.
    pub fn volume(&self) -> i64 {
        if self.is_empty() {
            return 0;
        }
        (0..self.dim()).map(|d| self.cells(d) as i64).product()
    }

    pub fn contains(&self, point: &IntVec) -> bool {
        (0..self.dim()).all(|d| self.lo[d] <= point[d] && point[d] <= self.hi[d])
    }

    /// `other` lies entirely inside `self`.
    pub fn contains_box(&self, other: &IndexBox) -> bool {
        self.block == other.block
            && (0..self.dim()).all(|d| self.lo[d] <= other.lo[d] && other.hi[d] <= self.hi[d])
    }

    /// Intersection with `other`; `None` when the blocks differ or the
    /// overlap is empty.
    pub fn intersect(&self, other: &IndexBox) -> Option<IndexBox> {
        if self.block != other.block {
            return None;
        }
        let mut lo = self.lo;
        let mut hi = self.hi;
        for d in 0..self.dim() {
            lo.set(d, self.lo[d].max(other.lo[d]));
            hi.set(d, self.hi[d].min(other.hi[d]));
            if hi[d] < lo[d] {
                return None;
            }
        }
        Some(IndexBox::new(self.block, lo, hi))
    }

    /// Grow by `width` cells on both sides of every axis.
    pub fn grown(&self, width: i32) -> IndexBox {
        let mut lo = self.lo;
        let mut hi = self.hi;
        for d in 0..self.dim() {
            lo.set(d, lo[d] - width);
            hi.set(d, hi[d] + width);
        }
        IndexBox::new(self.block, lo, hi)
    }

    /// Split along `axis` so the lower part keeps `left_cells` cells.
    ///
    /// `left_cells` must leave at least one cell on each side.
    pub fn split(&self, axis: usize, left_cells: i32) -> (IndexBox, IndexBox) {
        debug_assert!(left_cells >= 1 && left_cells < self.cells(axis));
        let plane = self.lo[axis] + left_cells;
        let mut l_hi = self.hi;
        l_hi.set(axis, plane - 1);
        let mut r_lo = self.lo;
        r_lo.set(axis, plane);
        (
            IndexBox::new(self.block, self.lo, l_hi),
            IndexBox::new(self.block, r_lo, self.hi),
        )
    }

    /// Smallest box containing both `self` and `other` (same block).
    pub fn bounding_union(&self, other: &IndexBox) -> IndexBox {
        assert_eq!(self.block, other.block, "union across blocks");
        let mut lo = self.lo;
        let mut hi = self.hi;
        for d in 0..self.dim() {
            lo.set(d, self.lo[d].min(other.lo[d]));
            hi.set(d, self.hi[d].max(other.hi[d]));
        }
        IndexBox::new(self.block, lo, hi)
    }
}
