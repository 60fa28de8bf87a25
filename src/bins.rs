//! Fixed-width genomic bins.
//!
//! A [`Resolution`] maps base-pair coordinates to bin indices. Bin ranges are
//! half-open, like BED intervals: `[start, end)`.

use crate::error::{MatrixError, Result};
use std::fmt;

/// Base pairs per bin. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution(u64);

impl Resolution {
    /// Create a resolution, rejecting zero.
    pub fn new(bp: u64) -> Result<Self> {
        if bp == 0 {
            return Err(MatrixError::Config(
                "Resolution must be a positive number of base pairs".to_string(),
            ));
        }
        Ok(Self(bp))
    }

    /// Base pairs per bin.
    #[inline]
    pub fn bp(&self) -> u64 {
        self.0
    }

    /// Bin containing a base-pair position.
    #[inline]
    pub fn bin_of(&self, pos: u64) -> u64 {
        pos / self.0
    }

    /// Number of bins needed to cover `length` base pairs.
    #[inline]
    pub fn bins_for_length(&self, length: u64) -> u64 {
        length.div_ceil(self.0)
    }

    /// Resolution in whole kilobases, as used in output file names.
    ///
    /// Integer division: 500 bp reports as 0 kb, 2500 bp as 2 kb.
    #[inline]
    pub fn kb(&self) -> u64 {
        self.0 / 1000
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bp", self.0)
    }
}

/// Half-open range of bin indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BinRange {
    pub start: u64,
    pub end: u64,
}

impl BinRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    #[inline]
    pub fn contains(&self, bin: u64) -> bool {
        bin >= self.start && bin < self.end
    }

    /// Map a global bin to its index within this range.
    #[inline]
    pub fn to_local(&self, bin: u64) -> Option<u64> {
        if self.contains(bin) {
            Some(bin - self.start)
        } else {
            None
        }
    }
}

impl fmt::Display for BinRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// The bin window of a region, per matrix axis, in global bin indices.
///
/// Chunk tuples carry bins local to these ranges; adding `row.start` and
/// `col.start` yields run-wide coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinBounds {
    pub row: BinRange,
    pub col: BinRange,
}

impl BinBounds {
    /// Both axes span the whole chromosome section.
    pub fn whole(section: BinRange) -> Self {
        Self {
            row: section,
            col: section,
        }
    }

    /// Restrict a chromosome section to base-pair windows on each axis.
    ///
    /// Missing bounds default to the section edges. Windows are clipped to the
    /// section and must not be empty.
    pub fn window(
        section: BinRange,
        resolution: Resolution,
        row_bp: (Option<u64>, Option<u64>),
        col_bp: (Option<u64>, Option<u64>),
    ) -> Result<Self> {
        let row = Self::axis(section, resolution, row_bp, "row")?;
        let col = Self::axis(section, resolution, col_bp, "column")?;
        Ok(Self { row, col })
    }

    fn axis(
        section: BinRange,
        resolution: Resolution,
        (start_bp, end_bp): (Option<u64>, Option<u64>),
        axis: &str,
    ) -> Result<BinRange> {
        let start = match start_bp {
            Some(bp) => section.start + resolution.bin_of(bp),
            None => section.start,
        };
        let end = match end_bp {
            Some(bp) => section.start + resolution.bins_for_length(bp),
            None => section.end,
        };
        let range = BinRange::new(start, end.min(section.end));
        if range.is_empty() {
            return Err(MatrixError::Config(format!(
                "Empty {} window {} within section {}",
                axis, range, section
            )));
        }
        Ok(range)
    }
}
