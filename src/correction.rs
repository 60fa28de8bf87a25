//! Bias and decay correction data.
//!
//! A persisted [`CorrectionModel`] holds per-bin biases keyed by global bin,
//! per-chromosome decay factors keyed by distance in bins, and the set of bad
//! bins. [`CorrectionContext`] wraps an optional model for one run and hands
//! out [`RegionCorrection`] views rebased onto a region's local bins.
//!
//! Model format (JSON):
//!
//! ```json
//! {
//!   "resolution": 10000,
//!   "biases": { "0": 1.02, "1": 0.97, "2": null },
//!   "decay": { "chr1": { "0": 1.0, "1": 0.5 } },
//!   "badcol": { "2": true }
//! }
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::bins::{BinBounds, BinRange, Resolution};
use crate::error::{MatrixError, Result};

/// Persisted correction model, as written by the bias estimation step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrectionModel {
    pub resolution: u64,
    /// Bias per global bin; `None` marks a NaN bias.
    #[serde(default)]
    pub biases: HashMap<u64, Option<f64>>,
    /// Decay factor per chromosome and distance in bins.
    #[serde(default)]
    pub decay: HashMap<String, HashMap<u64, f64>>,
    /// Bad bins keyed by global bin.
    #[serde(default)]
    pub badcol: HashMap<u64, bool>,
}

impl CorrectionModel {
    pub fn new(resolution: u64) -> Self {
        Self {
            resolution,
            ..Default::default()
        }
    }

    /// Load a model from a JSON file.
    ///
    /// Unreadable or malformed files are data-load errors: the run cannot
    /// correct any region with them.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            MatrixError::data_load("*", format!("cannot open {}: {}", path.display(), e))
        })?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        serde_json::from_reader(reader)
            .map_err(|e| MatrixError::data_load("*", format!("malformed correction model: {}", e)))
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer(writer, self)
            .map_err(|e| MatrixError::Io(std::io::Error::other(e)))
    }

    pub fn set_bias(&mut self, bin: u64, bias: f64) {
        let value = if bias.is_nan() { None } else { Some(bias) };
        self.biases.insert(bin, value);
    }

    pub fn set_decay(&mut self, chrom: &str, factors: &[f64]) {
        let table = self.decay.entry(chrom.to_string()).or_default();
        for (distance, &factor) in factors.iter().enumerate() {
            table.insert(distance as u64, factor);
        }
    }

    pub fn mark_bad(&mut self, bin: u64) {
        self.badcol.insert(bin, true);
    }

    /// Bias of a global bin, NaN when absent or null.
    #[inline]
    fn bias(&self, bin: u64) -> f64 {
        self.biases.get(&bin).copied().flatten().unwrap_or(f64::NAN)
    }
}

/// Decay factors per chromosome, keyed by distance in bins.
///
/// Sparse: distances are taken as given by the model, however large.
#[derive(Debug, Clone, Default)]
pub struct DecayTable {
    factors: FxHashMap<String, FxHashMap<u64, f64>>,
}

impl DecayTable {
    fn from_model(model: &CorrectionModel) -> Self {
        let factors = model
            .decay
            .iter()
            .map(|(chrom, by_distance)| {
                let table = by_distance.iter().map(|(&d, &f)| (d, f)).collect();
                (chrom.clone(), table)
            })
            .collect();
        Self { factors }
    }

    pub fn has_chrom(&self, chrom: &str) -> bool {
        self.factors.contains_key(chrom)
    }

    /// Decay factor for a chromosome and distance, if the model supports it.
    #[inline]
    pub fn factor(&self, chrom: &str, distance: u64) -> Option<f64> {
        usable(self.factors.get(chrom)?.get(&distance).copied())
    }
}

/// Correction data scoped to one region's bin window, in local bins.
#[derive(Debug, Clone, Default)]
pub struct RegionCorrection<'a> {
    pub bias_row: Vec<f64>,
    pub bias_col: Vec<f64>,
    /// `None` in pass-through mode.
    pub decay: Option<&'a DecayTable>,
    pub bad_row: FxHashSet<u64>,
    pub bad_col: FxHashSet<u64>,
}

impl RegionCorrection<'_> {
    /// Empty correction: no biases, no bad bins, raw counts pass through.
    pub fn pass_through() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_pass_through(&self) -> bool {
        self.decay.is_none()
    }

    /// Row bias of a local bin, if usable as a divisor.
    #[inline]
    pub fn row_bias(&self, bin: u64) -> Option<f64> {
        usable(self.bias_row.get(bin as usize).copied())
    }

    /// Column bias of a local bin, if usable as a divisor.
    #[inline]
    pub fn col_bias(&self, bin: u64) -> Option<f64> {
        usable(self.bias_col.get(bin as usize).copied())
    }
}

#[inline]
fn usable(factor: Option<f64>) -> Option<f64> {
    factor.filter(|f| f.is_finite() && *f > 0.0)
}

/// Read-only correction context for one run.
#[derive(Debug, Clone)]
pub enum CorrectionContext {
    /// No model supplied; counts are written unmodified.
    PassThrough,
    Model {
        model: CorrectionModel,
        decay: DecayTable,
        resolution: Resolution,
    },
}

impl CorrectionContext {
    /// Wrap a model for a run at `resolution`.
    pub fn with_model(model: CorrectionModel, resolution: Resolution) -> Self {
        let decay = DecayTable::from_model(&model);
        CorrectionContext::Model {
            model,
            decay,
            resolution,
        }
    }

    /// Load the model at `path`, or pass through when no path is given.
    pub fn open(path: Option<&Path>, resolution: Resolution) -> Result<Self> {
        match path {
            Some(path) => Ok(Self::with_model(CorrectionModel::from_file(path)?, resolution)),
            None => Ok(CorrectionContext::PassThrough),
        }
    }

    pub fn is_pass_through(&self) -> bool {
        matches!(self, CorrectionContext::PassThrough)
    }

    /// Biases, decay and bad bins for `region` within `bounds`.
    ///
    /// Bin bounds are global; the returned vectors and sets are indexed by bins
    /// local to each axis.
    pub fn load(&self, region: &str, bounds: &BinBounds) -> Result<RegionCorrection<'_>> {
        let (model, decay, resolution) = match self {
            CorrectionContext::PassThrough => return Ok(RegionCorrection::pass_through()),
            CorrectionContext::Model {
                model,
                decay,
                resolution,
            } => (model, decay, resolution),
        };

        if model.resolution != resolution.bp() {
            return Err(MatrixError::data_load(
                region,
                format!(
                    "model resolution {} does not match run resolution {}",
                    model.resolution,
                    resolution.bp()
                ),
            ));
        }
        if !decay.has_chrom(region) {
            return Err(MatrixError::data_load(region, "no decay entry"));
        }

        let bias_row = local_biases(model, bounds.row);
        let bias_col = local_biases(model, bounds.col);
        if bias_row.iter().chain(&bias_col).all(|b| b.is_nan()) {
            return Err(MatrixError::data_load(region, "no bias entries in window"));
        }

        Ok(RegionCorrection {
            bias_row,
            bias_col,
            decay: Some(decay),
            bad_row: local_bad_bins(model, bounds.row),
            bad_col: local_bad_bins(model, bounds.col),
        })
    }
}

fn local_biases(model: &CorrectionModel, range: BinRange) -> Vec<f64> {
    (range.start..range.end).map(|bin| model.bias(bin)).collect()
}

fn local_bad_bins(model: &CorrectionModel, range: BinRange) -> FxHashSet<u64> {
    model
        .badcol
        .iter()
        .filter(|&(_, &bad)| bad)
        .filter_map(|(&bin, _)| range.to_local(bin))
        .collect()
}
