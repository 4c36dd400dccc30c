//! UCSC hierarchical binning and index lookups.
//!
//! Bins form a five-level tree below bin 0 covering 512 Mbp. Level `l` bins
//! are `2^(29 - 3l)` bp wide and numbered from `(8^l - 1) / 7`:
//!
//! | level | first bin | width    |
//! |-------|-----------|----------|
//! | 0     | 0         | 512 Mbp  |
//! | 1     | 1         | 64 Mbp   |
//! | 2     | 9         | 8 Mbp    |
//! | 3     | 73        | 1 Mbp    |
//! | 4     | 585       | 128 Kbp  |
//! | 5     | 4681      | 16 Kbp   |

use crate::formats::{Index, VirtualOffset};

/// Largest coordinate addressable by the binning scheme.
pub const MAX_POSITION: u64 = 1 << 29;

/// Width of a linear-index tile, as a shift.
pub const LINEAR_SHIFT: u32 = 14;

const LEVELS: [(u32, u32); 5] = [(4681, 14), (585, 17), (73, 20), (9, 23), (1, 26)];

/// Smallest bin fully containing `[begin, end)`.
pub fn reg2bin(begin: u64, end: u64) -> u32 {
    let begin = begin.min(MAX_POSITION);
    let end = end.min(MAX_POSITION).max(begin + 1) - 1;

    for (offset, shift) in LEVELS {
        if begin >> shift == end >> shift {
            return offset + (begin >> shift) as u32;
        }
    }
    0
}

/// Every bin that may hold a record overlapping `[begin, end)`, bin 0 first.
pub fn reg2bins(begin: u64, end: u64) -> Vec<u32> {
    let begin = begin.min(MAX_POSITION);
    let end = end.min(MAX_POSITION).max(begin + 1) - 1;

    let mut bins = vec![0];
    for &(offset, shift) in LEVELS.iter().rev() {
        let first = offset + (begin >> shift) as u32;
        let last = offset + (end >> shift) as u32;
        bins.extend(first..=last);
    }
    bins
}

/// Linear-index entry for the tile containing `begin`.
///
/// Returns `None` for an unknown reference and offset zero when the tile lies
/// past the end of the linear index.
pub fn linear_offset(index: &Index, reference_id: usize, begin: u64) -> Option<VirtualOffset> {
    let reference = index.reference(reference_id)?;
    let tile = (begin >> LINEAR_SHIFT) as usize;
    Some(
        reference
            .linear_index
            .get(tile)
            .copied()
            .unwrap_or(VirtualOffset::MIN),
    )
}

/// Virtual offset at which to start reading records for `[begin, end)`.
///
/// The smallest chunk start among the overlapping bins whose chunk does not
/// end before the linear-index offset. `None` means the region is not indexed.
pub fn region_start_offset(
    index: &Index,
    reference_id: usize,
    begin: u64,
    end: u64,
) -> Option<VirtualOffset> {
    let min_offset = linear_offset(index, reference_id, begin)?;
    let reference = index.reference(reference_id)?;

    reg2bins(begin, end)
        .into_iter()
        .filter_map(|bin| reference.bins.get(&bin))
        .flatten()
        .filter(|chunk| chunk.end >= min_offset)
        .map(|chunk| chunk.start)
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::{Chunk, ReferenceIndex};

    #[test]
    fn test_reg2bin_first_tile() {
        assert_eq!(reg2bin(0, 16384), 4681);
        assert_eq!(reg2bin(0, 1), 4681);
        assert_eq!(reg2bin(16383, 16384), 4681);
        assert_eq!(reg2bin(16384, 16385), 4682);
    }

    #[test]
    fn test_reg2bin_level_boundaries() {
        assert_eq!(reg2bin(0, 16385), 585);
        assert_eq!(reg2bin(0, 1 << 17), 585);
        assert_eq!(reg2bin(0, (1 << 17) + 1), 73);
        assert_eq!(reg2bin(0, 1 << 20), 73);
        assert_eq!(reg2bin(0, (1 << 20) + 1), 9);
        assert_eq!(reg2bin(0, 1 << 23), 9);
        assert_eq!(reg2bin(0, (1 << 23) + 1), 1);
        assert_eq!(reg2bin(0, 1 << 26), 1);
        assert_eq!(reg2bin(0, (1 << 26) + 1), 0);
    }

    #[test]
    fn test_reg2bin_straddling_tile() {
        assert_eq!(reg2bin(16383, 16385), 585);
        assert_eq!(reg2bin(1 << 17, (1 << 17) + 10), 4681 + 8);
    }

    #[test]
    fn test_reg2bin_clamps_large_positions() {
        assert_eq!(reg2bin(u64::MAX - 1, u64::MAX), reg2bin(MAX_POSITION, MAX_POSITION + 1));
    }

    #[test]
    fn test_reg2bins_first_tile() {
        assert_eq!(reg2bins(0, 16384), vec![0, 1, 9, 73, 585, 4681]);
    }

    #[test]
    fn test_reg2bins_spans_tiles() {
        let bins = reg2bins(16000, 40000);
        assert_eq!(bins, vec![0, 1, 9, 73, 585, 4681, 4682, 4683]);
    }

    #[test]
    fn test_reg2bins_always_has_bin_zero() {
        for (begin, end) in [(0, 0), (5, 5), (1 << 28, 1 << 29), (10, 3)] {
            assert_eq!(reg2bins(begin, end)[0], 0);
        }
    }

    #[test]
    fn test_reg2bins_contains_reg2bin() {
        for (begin, end) in [(0, 100), (16000, 17000), (1 << 20, (1 << 21) + 5)] {
            assert!(reg2bins(begin, end).contains(&reg2bin(begin, end)));
        }
    }

    fn index() -> Index {
        let mut reference = ReferenceIndex::default();
        reference.bins.insert(
            4681,
            vec![Chunk::new(VirtualOffset::new(100, 0), VirtualOffset::new(100, 800))],
        );
        reference.bins.insert(
            4682,
            vec![Chunk::new(VirtualOffset::new(100, 800), VirtualOffset::new(300, 20))],
        );
        reference.bins.insert(
            585,
            vec![Chunk::new(VirtualOffset::new(100, 400), VirtualOffset::new(100, 600))],
        );
        reference.linear_index = vec![VirtualOffset::new(100, 0), VirtualOffset::new(100, 800)];
        Index {
            references: vec![reference],
            unplaced_count: None,
            mapped_end: VirtualOffset::new(300, 20),
        }
    }

    #[test]
    fn test_linear_offset() {
        let index = index();
        assert_eq!(linear_offset(&index, 0, 0), Some(VirtualOffset::new(100, 0)));
        assert_eq!(linear_offset(&index, 0, 20000), Some(VirtualOffset::new(100, 800)));
        assert_eq!(linear_offset(&index, 0, 1 << 20), Some(VirtualOffset::MIN));
        assert_eq!(linear_offset(&index, 1, 0), None);
    }

    #[test]
    fn test_region_start_offset() {
        let index = index();
        assert_eq!(
            region_start_offset(&index, 0, 0, 100),
            Some(VirtualOffset::new(100, 0))
        );
        // The 585 chunk ends before the second tile's linear offset.
        assert_eq!(
            region_start_offset(&index, 0, 20000, 21000),
            Some(VirtualOffset::new(100, 800))
        );
    }

    #[test]
    fn test_region_not_indexed() {
        let index = index();
        assert_eq!(region_start_offset(&index, 0, 1 << 24, (1 << 24) + 10), None);
        assert_eq!(region_start_offset(&index, 3, 0, 10), None);
    }
}
