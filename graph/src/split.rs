//! Equal chunking of task iteration spaces.
//!
//! Tasks split along the outermost dimension into equal chunks; the last
//! chunk absorbs the remainder. 2-D spaces split by rows. 3-D splitting
//! is not supported and fails loudly.

use chorus_grid::Subrange;

use crate::error::{Result, UnsupportedSplitSnafu};

/// Split a 1-D subrange into `num_chunks` equal pieces.
pub fn split_equal_1d(sr: &Subrange<1>, num_chunks: usize) -> Vec<Subrange<1>> {
    assert!(num_chunks > 0, "cannot split into zero chunks");
    let base = sr.range[0] / num_chunks;
    let remainder = sr.range[0] % num_chunks;

    (0..num_chunks)
        .map(|i| {
            let range = if i == num_chunks - 1 { base + remainder } else { base };
            Subrange::new([sr.offset[0] + i * base], [range], sr.global_size)
        })
        .collect()
}

/// Split a 2-D subrange into `num_chunks` row bands.
pub fn split_equal_2d(sr: &Subrange<2>, num_chunks: usize) -> Vec<Subrange<2>> {
    let rows = split_equal_1d(
        &Subrange::new([sr.offset[0]], [sr.range[0]], [sr.global_size[0]]),
        num_chunks,
    );
    rows.into_iter()
        .map(|row| {
            Subrange::new([row.offset[0], sr.offset[1]], [row.range[0], sr.range[1]], sr.global_size)
        })
        .collect()
}

/// Chunk a task's whole iteration space, promoted to 3-D.
pub fn split_task(
    dimensions: u8,
    global_size: [usize; 3],
    num_chunks: usize,
) -> Result<Vec<Subrange<3>>> {
    match dimensions {
        1 => {
            let sr = Subrange::whole([global_size[0]]);
            Ok(split_equal_1d(&sr, num_chunks).iter().map(Subrange::promote).collect())
        }
        2 => {
            let sr = Subrange::whole([global_size[0], global_size[1]]);
            Ok(split_equal_2d(&sr, num_chunks).iter().map(Subrange::promote).collect())
        }
        dimensions => UnsupportedSplitSnafu { dimensions }.fail(),
    }
}
