//! Splitting an index range across ranks
//!
//! `block_range()` hands out contiguous blocks of `0..n`. When `n` does not divide evenly, the
//! first `n % size` ranks get one index more than the rest, so block lengths differ by at most
//! one and together cover `0..n` exactly.

use std::ops::Range;

use crate::topology::{rank_count, Rank};

/// The block of `0..n` owned by `rank` out of `size` ranks.
///
/// # Panics
///
/// If `rank` is not in `[0, size)`.
///
/// # Examples
///
/// ```
/// use fanout::partition::block_range;
///
/// assert_eq!(block_range(10, 0, 4), 0..3);
/// assert_eq!(block_range(10, 1, 4), 3..6);
/// assert_eq!(block_range(10, 2, 4), 6..8);
/// assert_eq!(block_range(10, 3, 4), 8..10);
/// ```
pub fn block_range(n: usize, rank: Rank, size: Rank) -> Range<usize> {
    assert!(
        0 <= rank && rank < size,
        "rank {} outside of a communicator of size {}",
        rank,
        size
    );
    let (index, parts) = (rank_count(rank), rank_count(size));
    let base = n / parts;
    let extra = n % parts;
    let start = index * base + index.min(extra);
    let len = base + usize::from(index < extra);
    start..start + len
}

/// The blocks of all `size` ranks, in rank order.
pub fn block_ranges(n: usize, size: Rank) -> impl Iterator<Item = Range<usize>> {
    (0..size.max(0)).map(move |rank| block_range(n, rank, size))
}
