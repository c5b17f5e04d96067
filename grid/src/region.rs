//! Canonical axis-aligned region algebra over 3-D integer index space.
//!
//! A [`GridRegion`] is an ordered set of non-overlapping half-open boxes.
//! All constructors funnel through the same canonicalisation: boxes are
//! dissected on the union of their cut planes, the resulting cells are
//! coalesced along axis 2, then 1, then 0, and the survivors are sorted
//! lexicographically by lower corner. The canonical form depends only on
//! the contained point set, which makes equality structural and box
//! iteration deterministic.

use std::collections::BTreeSet;

/// A half-open axis-aligned box `[min, max)` in 3-D index space.
///
/// Empty iff `min[d] >= max[d]` for any dimension. Boxes order
/// lexicographically by lower corner, then upper corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GridBox {
    pub min: [usize; 3],
    pub max: [usize; 3],
}

impl GridBox {
    pub fn new(min: [usize; 3], max: [usize; 3]) -> Self {
        Self { min, max }
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|d| self.min[d] >= self.max[d])
    }

    /// Number of indices contained in the box.
    pub fn area(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        (0..3).map(|d| self.max[d] - self.min[d]).product()
    }

    /// The (possibly empty) overlap of two boxes.
    pub fn intersection(&self, other: &Self) -> Self {
        let mut min = [0; 3];
        let mut max = [0; 3];
        for d in 0..3 {
            min[d] = self.min[d].max(other.min[d]);
            max[d] = self.max[d].min(other.max[d]);
        }
        Self { min, max }
    }

    pub fn intersects(&self, other: &Self) -> bool {
        !self.intersection(other).is_empty()
    }

    /// Whether `other` is fully contained in this box.
    pub fn covers(&self, other: &Self) -> bool {
        other.is_empty() || (0..3).all(|d| self.min[d] <= other.min[d] && other.max[d] <= self.max[d])
    }
}

impl std::fmt::Display for GridBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{},{},{}) - [{},{},{})",
            self.min[0], self.min[1], self.min[2], self.max[0], self.max[1], self.max[2]
        )
    }
}

/// An ordered set of non-overlapping boxes in canonical form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GridRegion {
    boxes: Vec<GridBox>,
}

impl GridRegion {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Number of indices contained in the region.
    pub fn area(&self) -> usize {
        self.boxes.iter().map(GridBox::area).sum()
    }

    /// Maximal boxes in lexicographic lower-corner order.
    pub fn boxes(&self) -> &[GridBox] {
        &self.boxes
    }

    /// Set union of two regions.
    pub fn merge(a: &Self, b: &Self) -> Self {
        let all: Vec<GridBox> = a.boxes.iter().chain(&b.boxes).copied().collect();
        let cuts = cut_planes(&all);
        Self { boxes: assemble(dissect(&all, &cuts)) }
    }

    /// The maximal region contained in `a` and disjoint from `b`.
    pub fn subtract(a: &Self, b: &Self) -> Self {
        let all: Vec<GridBox> = a.boxes.iter().chain(&b.boxes).copied().collect();
        let cuts = cut_planes(&all);
        let cells_b = dissect(&b.boxes, &cuts);
        let cells: BTreeSet<GridBox> =
            dissect(&a.boxes, &cuts).into_iter().filter(|c| !cells_b.contains(c)).collect();
        Self { boxes: assemble(cells) }
    }

    /// Set intersection of two regions.
    pub fn intersect(a: &Self, b: &Self) -> Self {
        let all: Vec<GridBox> = a.boxes.iter().chain(&b.boxes).copied().collect();
        let cuts = cut_planes(&all);
        let cells_b = dissect(&b.boxes, &cuts);
        let cells: BTreeSet<GridBox> =
            dissect(&a.boxes, &cuts).into_iter().filter(|c| cells_b.contains(c)).collect();
        Self { boxes: assemble(cells) }
    }

    /// Whether every index of `other` is contained in this region.
    pub fn covers(&self, other: &Self) -> bool {
        Self::subtract(other, self).is_empty()
    }
}

impl From<GridBox> for GridRegion {
    fn from(b: GridBox) -> Self {
        if b.is_empty() { Self::empty() } else { Self { boxes: vec![b] } }
    }
}

impl std::fmt::Display for GridRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, b) in self.boxes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{b}")?;
        }
        write!(f, "}}")
    }
}

/// Sorted, deduplicated cut coordinates per axis from all box bounds.
fn cut_planes(boxes: &[GridBox]) -> [Vec<usize>; 3] {
    let mut cuts: [Vec<usize>; 3] = Default::default();
    for d in 0..3 {
        for b in boxes {
            if !b.is_empty() {
                cuts[d].push(b.min[d]);
                cuts[d].push(b.max[d]);
            }
        }
        cuts[d].sort_unstable();
        cuts[d].dedup();
    }
    cuts
}

/// Split every box into atomic cells on the cut grid. The set dedupes
/// cells produced by overlapping input boxes.
fn dissect(boxes: &[GridBox], cuts: &[Vec<usize>; 3]) -> BTreeSet<GridBox> {
    let mut cells = BTreeSet::new();
    for b in boxes {
        if b.is_empty() {
            continue;
        }
        let segment = |d: usize| -> Vec<(usize, usize)> {
            let lo = cuts[d].partition_point(|&c| c < b.min[d]);
            let hi = cuts[d].partition_point(|&c| c < b.max[d]);
            cuts[d][lo..=hi].windows(2).map(|w| (w[0], w[1])).collect()
        };
        for &(x0, x1) in &segment(0) {
            for &(y0, y1) in &segment(1) {
                for &(z0, z1) in &segment(2) {
                    cells.insert(GridBox::new([x0, y0, z0], [x1, y1, z1]));
                }
            }
        }
    }
    cells
}

/// Coalesce cells along axis 2, then 1, then 0, and sort.
///
/// The fixed axis order makes the result depend only on the cell point
/// set, not on which input boxes produced which cells.
fn assemble(cells: BTreeSet<GridBox>) -> Vec<GridBox> {
    let mut out: Vec<GridBox> = cells.into_iter().collect();
    for axis in [2, 1, 0] {
        out = coalesce(out, axis);
    }
    out.sort_unstable();
    out
}

/// Merge runs of boxes adjacent along `axis` with identical extents on
/// the other two axes.
fn coalesce(mut boxes: Vec<GridBox>, axis: usize) -> Vec<GridBox> {
    let profile = |b: &GridBox| {
        let others: Vec<usize> = (0..3).filter(|&d| d != axis).collect();
        (
            [b.min[others[0]], b.max[others[0]]],
            [b.min[others[1]], b.max[others[1]]],
        )
    };
    boxes.sort_unstable_by_key(|b| (profile(b), b.min[axis]));

    let mut out: Vec<GridBox> = Vec::with_capacity(boxes.len());
    for b in boxes {
        if let Some(last) = out.last_mut()
            && profile(last) == profile(&b)
            && last.max[axis] == b.min[axis]
        {
            last.max[axis] = b.max[axis];
            continue;
        }
        out.push(b);
    }
    out
}
