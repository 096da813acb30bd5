//! Block range arithmetic.
//!
//! All ranges are inclusive on both ends, matching `eth_getLogs`
//! `fromBlock`/`toBlock` semantics.

use std::fmt;

/// Inclusive block range `[from, to]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    /// Returns None when `from > to`.
    pub fn new(from: u64, to: u64) -> Option<Self> {
        (from <= to).then_some(Self { from, to })
    }

    pub fn len(&self) -> u64 {
        self.to - self.from + 1
    }

    pub fn contains(&self, block: u64) -> bool {
        self.from <= block && block <= self.to
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.from, self.to)
    }
}

/// Split `range` into consecutive, non-overlapping chunks of at most `size`
/// blocks. A `size` of 0 is treated as 1.
pub fn block_chunks(range: BlockRange, size: u64) -> impl Iterator<Item = BlockRange> {
    let size = size.max(1);
    let mut next = Some(range.from);

    std::iter::from_fn(move || {
        let start = next?;
        let end = start.saturating_add(size - 1).min(range.to);
        next = if end >= range.to { None } else { Some(end + 1) };
        Some(BlockRange {
            from: start,
            to: end,
        })
    })
}

/// Statically partition `range` into at most `parts` contiguous sub-ranges.
///
/// Every part gets `len / parts` blocks and the last one absorbs the
/// remainder. Never returns more parts than blocks.
pub fn partition_range(range: BlockRange, parts: usize) -> Vec<BlockRange> {
    let parts = (parts.max(1) as u64).min(range.len());
    let per_part = range.len() / parts;

    let mut result = Vec::with_capacity(parts as usize);
    let mut start = range.from;

    for i in 0..parts {
        let end = if i == parts - 1 {
            range.to
        } else {
            start + per_part - 1
        };
        result.push(BlockRange {
            from: start,
            to: end,
        });
        start = end + 1;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_exact_cover(range: BlockRange, pieces: &[BlockRange]) {
        assert_eq!(pieces.first().map(|r| r.from), Some(range.from));
        assert_eq!(pieces.last().map(|r| r.to), Some(range.to));
        for pair in pieces.windows(2) {
            assert_eq!(pair[0].to + 1, pair[1].from, "gap or overlap in {:?}", pair);
        }
        assert_eq!(pieces.iter().map(|r| r.len()).sum::<u64>(), range.len());
    }

    #[test]
    fn test_chunks_cover_range_without_overlap() {
        let range = BlockRange::new(100, 5_099).unwrap();
        let chunks: Vec<_> = block_chunks(range, 2_000).collect();

        assert_eq!(
            chunks,
            vec![
                BlockRange { from: 100, to: 2_099 },
                BlockRange { from: 2_100, to: 4_099 },
                BlockRange { from: 4_100, to: 5_099 },
            ]
        );
        assert_exact_cover(range, &chunks);
    }

    #[test]
    fn test_single_block_range_is_one_chunk() {
        let range = BlockRange::new(42, 42).unwrap();
        let chunks: Vec<_> = block_chunks(range, 2_000).collect();
        assert_eq!(chunks, vec![range]);
    }

    #[test]
    fn test_chunks_near_u64_max_terminate() {
        let range = BlockRange::new(u64::MAX - 2, u64::MAX).unwrap();
        let chunks: Vec<_> = block_chunks(range, 2).collect();
        assert_eq!(chunks.len(), 2);
        assert_exact_cover(range, &chunks);
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        assert!(BlockRange::new(10, 9).is_none());
    }

    #[test]
    fn test_partition_last_part_takes_remainder() {
        let range = BlockRange::new(1_000, 1_010).unwrap();
        let parts = partition_range(range, 3);

        assert_eq!(
            parts,
            vec![
                BlockRange { from: 1_000, to: 1_002 },
                BlockRange { from: 1_003, to: 1_005 },
                BlockRange { from: 1_006, to: 1_010 },
            ]
        );
        assert_exact_cover(range, &parts);
    }

    #[test]
    fn test_partition_never_exceeds_block_count() {
        let range = BlockRange::new(5, 6).unwrap();
        let parts = partition_range(range, 8);
        assert_eq!(parts.len(), 2);
        assert_exact_cover(range, &parts);
    }
}
