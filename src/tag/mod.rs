//! The tag source: local patches of integer cell data in which certain
//! cells are marked for clustering.
//!
//! This is the narrow input interface of the clustering engine. A patch is
//! an index box plus one integer value per cell (x-fastest ordering); a tag
//! is any cell whose value equals the configured tag value.

use crate::geometry::IndexBox;

/// One locally owned patch of cell-centered integer data.
#[derive(Clone, Debug)]
pub struct TagPatch {
    bounds: IndexBox,
    values: Vec<i32>,
}

impl TagPatch {
    /// A patch from raw cell data; `values.len()` must equal the box volume.
    pub fn new(bounds: IndexBox, values: Vec<i32>) -> Self {
        assert_eq!(
            values.len() as i64,
            bounds.volume(),
            "cell data does not match patch box"
        );
        Self { bounds, values }
    }

    /// A patch holding `fill` everywhere.
    pub fn filled(bounds: IndexBox, fill: i32) -> Self {
        let n = bounds.volume() as usize;
        Self::new(bounds, vec![fill; n])
    }

    #[inline]
    pub fn bounds(&self) -> &IndexBox {
        &self.bounds
    }

    fn offset_of(&self, point: &[i32]) -> usize {
        let mut offset = 0usize;
        let mut stride = 1usize;
        for d in 0..self.bounds.dim() {
            offset += (point[d] - self.bounds.lo()[d]) as usize * stride;
            stride *= self.bounds.cells(d) as usize;
        }
        offset
    }

    pub fn value_at(&self, point: &[i32]) -> i32 {
        self.values[self.offset_of(point)]
    }

    pub fn set_value(&mut self, point: &[i32], value: i32) {
        let off = self.offset_of(point);
        self.values[off] = value;
    }
}

/// The set of patches owned by the local process, plus the value that marks
/// a tagged cell.
#[derive(Clone, Debug)]
pub struct TagLevel {
    dim: usize,
    patches: Vec<TagPatch>,
}

impl TagLevel {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            patches: Vec::new(),
        }
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn add_patch(&mut self, patch: TagPatch) {
        assert_eq!(patch.bounds().dim(), self.dim, "patch dimension mismatch");
        self.patches.push(patch);
    }

    pub fn patches(&self) -> &[TagPatch] {
        &self.patches
    }

    /// Accumulate the per-axis tag histogram of `bounds` into `hist`.
    ///
    /// `hist[d]` has one bin per cell of `bounds` along axis `d`; a tagged
    /// cell increments one bin on every axis.
    pub fn accumulate_histogram(&self, bounds: &IndexBox, tag_val: i32, hist: &mut [Vec<i32>]) {
        debug_assert_eq!(hist.len(), self.dim);
        for patch in &self.patches {
            let Some(isect) = patch.bounds().intersect(bounds) else {
                continue;
            };
            // Odometer walk over the intersection, x fastest.
            let mut point: Vec<i32> = isect.lo().as_slice().to_vec();
            'cells: loop {
                if patch.value_at(&point) == tag_val {
                    for d in 0..self.dim {
                        hist[d][(point[d] - bounds.lo()[d]) as usize] += 1;
                    }
                }
                let mut d = 0;
                loop {
                    point[d] += 1;
                    if point[d] <= isect.hi()[d] {
                        break;
                    }
                    point[d] = isect.lo()[d];
                    d += 1;
                    if d == self.dim {
                        break 'cells;
                    }
                }
            }
        }
    }

    /// Total cells of local patches inside `bounds`.
    pub fn overlap_cells(&self, bounds: &IndexBox) -> i64 {
        self.patches
            .iter()
            .filter_map(|p| p.bounds().intersect(bounds))
            .map(|b| b.volume())
            .sum()
    }

    /// Total tagged cells of local patches inside `bounds`.
    pub fn count_tags_in(&self, bounds: &IndexBox, tag_val: i32) -> i64 {
        let mut hist: Vec<Vec<i32>> = (0..self.dim)
            .map(|d| vec![0; bounds.cells(d) as usize])
            .collect();
        self.accumulate_histogram(bounds, tag_val, &mut hist);
        hist[0].iter().map(|&c| c as i64).sum()
    }
}
