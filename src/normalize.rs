//! Contact normalization.
//!
//! Each raw contact between local bins `j` (row) and `k` (column) is mapped to
//! global bins `row = j + row_offset` and `col = k + col_offset`, then filtered
//! and corrected in this order:
//!
//! 1. lower triangle (`col < row`): dropped, the upper triangle holds the pair
//! 2. bad row bin `j` or bad column bin `k`: dropped
//! 3. zero count: dropped
//! 4. pass-through mode: `normalized = raw`
//! 5. otherwise `raw / bias_row[j] / bias_col[k] / decay[chrom][col - row]`,
//!    dropped when any factor is missing, non-finite or not positive
//!
//! For a self matrix the global comparison equals the local one. Windows with
//! different axes stay in one global upper triangle.

use std::fmt;

use crate::bins::BinBounds;
use crate::chunks::RawContact;
use crate::correction::RegionCorrection;

/// One cell of the output matrix, in global bins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatrixEntry {
    pub row: u64,
    pub col: u64,
    pub raw: u64,
    pub normalized: f64,
}

/// Why contacts were dropped, and how many were kept.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NormalizeStats {
    pub seen: usize,
    pub lower_triangle: usize,
    pub bad_bin: usize,
    pub zero: usize,
    pub unsupported: usize,
    pub emitted: usize,
}

impl fmt::Display for NormalizeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Seen: {}, Emitted: {}, Lower: {}, Bad: {}, Zero: {}, Unsupported: {}",
            self.seen, self.emitted, self.lower_triangle, self.bad_bin, self.zero, self.unsupported
        )
    }
}

/// Applies the triangle, bad-bin and correction policy for one region.
pub struct Normalizer<'a> {
    correction: &'a RegionCorrection<'a>,
    row_offset: u64,
    col_offset: u64,
    stats: NormalizeStats,
}

impl<'a> Normalizer<'a> {
    pub fn new(correction: &'a RegionCorrection<'a>, bounds: &BinBounds) -> Self {
        Self {
            correction,
            row_offset: bounds.row.start,
            col_offset: bounds.col.start,
            stats: NormalizeStats::default(),
        }
    }

    pub fn stats(&self) -> &NormalizeStats {
        &self.stats
    }

    pub fn into_stats(self) -> NormalizeStats {
        self.stats
    }

    /// Filter and correct one contact. `None` means the contact is dropped.
    pub fn normalize(&mut self, contact: &RawContact) -> Option<MatrixEntry> {
        self.stats.seen += 1;
        let (j, k) = (contact.row, contact.col);
        let row = j + self.row_offset;
        let col = k + self.col_offset;

        if col < row {
            self.stats.lower_triangle += 1;
            return None;
        }
        if self.correction.bad_row.contains(&j) || self.correction.bad_col.contains(&k) {
            self.stats.bad_bin += 1;
            return None;
        }
        if contact.count == 0 {
            self.stats.zero += 1;
            return None;
        }

        let normalized = match self.correction.decay {
            None => contact.count as f64,
            Some(decay) => {
                let factors = self.correction.row_bias(j).and_then(|b1| {
                    let b2 = self.correction.col_bias(k)?;
                    let d = decay.factor(&contact.chrom, col - row)?;
                    Some((b1, b2, d))
                });
                let Some((b1, b2, d)) = factors else {
                    self.stats.unsupported += 1;
                    return None;
                };
                let n = contact.count as f64 / b1 / b2 / d;
                if !n.is_finite() {
                    self.stats.unsupported += 1;
                    return None;
                }
                n
            }
        };

        self.stats.emitted += 1;
        Some(MatrixEntry {
            row,
            col,
            raw: contact.count,
            normalized,
        })
    }
}
