//! Offset/range windows into a global iteration space.

use crate::region::{GridBox, GridRegion};

/// A rectangular window into a `D`-dimensional global index space.
///
/// `offset` and `range` select the window; `global_size` is the extent of
/// the space the window lives in. Kernels iterate subranges, range
/// mappers translate kernel subranges into buffer subranges, and chunking
/// partitions a task's subrange along its outermost dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subrange<const D: usize> {
    pub offset: [usize; D],
    pub range: [usize; D],
    pub global_size: [usize; D],
}

impl<const D: usize> Subrange<D> {
    pub fn new(offset: [usize; D], range: [usize; D], global_size: [usize; D]) -> Self {
        Self { offset, range, global_size }
    }

    /// The window covering an entire global space.
    pub fn whole(global_size: [usize; D]) -> Self {
        Self { offset: [0; D], range: global_size, global_size }
    }

    /// Number of indices contained in the window.
    pub fn area(&self) -> usize {
        self.range.iter().product()
    }

    /// Widen to three dimensions, padding trailing dimensions with
    /// offset 0 and extent 1.
    pub fn promote(&self) -> Subrange<3> {
        let mut offset = [0; 3];
        let mut range = [1; 3];
        let mut global_size = [1; 3];
        for d in 0..D {
            offset[d] = self.offset[d];
            range[d] = self.range[d];
            global_size[d] = self.global_size[d];
        }
        Subrange { offset, range, global_size }
    }
}

impl Subrange<3> {
    /// The region covered by this subrange, clamped to the global size in
    /// every dimension.
    ///
    /// Clamping lets callers that do not know (or care about) the global
    /// extent pass `usize::MAX` and still get a well-formed box.
    pub fn to_region(&self) -> GridRegion {
        let mut min = [0; 3];
        let mut max = [0; 3];
        for d in 0..3 {
            min[d] = self.offset[d].min(self.global_size[d]);
            max[d] = self.offset[d].saturating_add(self.range[d]).min(self.global_size[d]);
        }
        GridRegion::from(GridBox::new(min, max))
    }
}

impl From<Subrange<1>> for Subrange<3> {
    fn from(sr: Subrange<1>) -> Self {
        sr.promote()
    }
}

impl From<Subrange<2>> for Subrange<3> {
    fn from(sr: Subrange<2>) -> Self {
        sr.promote()
    }
}
