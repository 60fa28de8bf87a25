//! Run configuration for matrix extraction.
//!
//! The CLI builds one [`RunConfig`] value and validates it before any region
//! is touched. Everything downstream reads it; nothing is global.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bins::Resolution;
use crate::chunks::RunId;
use crate::error::{MatrixError, Result};
use crate::filter::FilterMask;
use crate::genome::Genome;

/// Optional base-pair window applied to a single region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
    pub start1: Option<u64>,
    pub end1: Option<u64>,
    pub start2: Option<u64>,
    pub end2: Option<u64>,
}

impl Window {
    pub fn is_whole(&self) -> bool {
        *self == Window::default()
    }

    pub fn row_bp(&self) -> (Option<u64>, Option<u64>) {
        (self.start1, self.end1)
    }

    pub fn col_bp(&self) -> (Option<u64>, Option<u64>) {
        (self.start2, self.end2)
    }

    fn validate(&self) -> Result<()> {
        for (axis, start, end) in [(1, self.start1, self.end1), (2, self.start2, self.end2)] {
            if let (Some(s), Some(e)) = (start, end) {
                if s >= e {
                    return Err(MatrixError::Config(format!(
                        "--start{axis} ({s}) must be less than --end{axis} ({e})"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Everything an extract run needs.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Alignment file the chunked scan read; names the run directory.
    pub alignment: PathBuf,
    pub genome: PathBuf,
    pub resolution: Resolution,
    pub outdir: PathBuf,
    /// Correction model; `None` runs in pass-through mode.
    pub biases: Option<PathBuf>,
    pub tmpdir: PathBuf,
    /// Explicit run identifier; derived per region when absent.
    pub run_id: Option<RunId>,
    /// Regions to extract, in genome order when empty.
    pub regions: Vec<String>,
    pub window: Window,
    pub filter: FilterMask,
    pub keep_temp: bool,
    pub sort: bool,
    pub region_timeout: Option<Duration>,
}

impl RunConfig {
    pub fn new(
        alignment: impl Into<PathBuf>,
        genome: impl Into<PathBuf>,
        resolution: Resolution,
        outdir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            alignment: alignment.into(),
            genome: genome.into(),
            resolution,
            outdir: outdir.into(),
            biases: None,
            tmpdir: PathBuf::from("."),
            run_id: None,
            regions: Vec::new(),
            window: Window::default(),
            filter: FilterMask::default(),
            keep_temp: false,
            sort: true,
            region_timeout: None,
        }
    }

    pub fn with_biases(mut self, path: impl Into<PathBuf>) -> Self {
        self.biases = Some(path.into());
        self
    }

    pub fn with_tmpdir(mut self, path: impl Into<PathBuf>) -> Self {
        self.tmpdir = path.into();
        self
    }

    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn with_regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.regions = regions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_window(mut self, window: Window) -> Self {
        self.window = window;
        self
    }

    pub fn with_filter(mut self, filter: FilterMask) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_keep_temp(mut self, keep: bool) -> Self {
        self.keep_temp = keep;
        self
    }

    pub fn with_sort(mut self, sort: bool) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_region_timeout(mut self, timeout: Duration) -> Self {
        self.region_timeout = Some(timeout);
        self
    }

    /// Run identifier for `region`.
    pub fn run_id_for(&self, region: &str) -> RunId {
        match &self.run_id {
            Some(id) => id.clone(),
            None => RunId::derive(&self.alignment, self.resolution, self.filter, region),
        }
    }

    /// Check paths and options, load the genome, and resolve the region list.
    ///
    /// Returns the genome and the regions to process, in order.
    pub fn validate(&self) -> Result<(Genome, Vec<String>)> {
        if !self.genome.is_file() {
            return Err(MatrixError::Config(format!(
                "Genome file not found: {}",
                self.genome.display()
            )));
        }
        ensure_not_file(&self.outdir, "Output directory")?;
        if !self.tmpdir.is_dir() {
            return Err(MatrixError::Config(format!(
                "Temp directory not found: {}",
                self.tmpdir.display()
            )));
        }
        self.window.validate()?;

        let genome = Genome::from_file(&self.genome)?;
        if genome.is_empty() {
            return Err(MatrixError::Config(format!(
                "Genome file has no chromosomes: {}",
                self.genome.display()
            )));
        }

        let regions: Vec<String> = if self.regions.is_empty() {
            genome.chromosomes().cloned().collect()
        } else {
            for region in &self.regions {
                if !genome.has_chrom(region) {
                    return Err(MatrixError::Config(format!(
                        "Region '{}' not found in genome file",
                        region
                    )));
                }
            }
            self.regions.clone()
        };

        if !self.window.is_whole() && regions.len() != 1 {
            return Err(MatrixError::Config(
                "A coordinate window needs exactly one --region".to_string(),
            ));
        }

        Ok((genome, regions))
    }
}

fn ensure_not_file(path: &Path, what: &str) -> Result<()> {
    if path.exists() && !path.is_dir() {
        return Err(MatrixError::Config(format!(
            "{} is not a directory: {}",
            what,
            path.display()
        )));
    }
    Ok(())
}
