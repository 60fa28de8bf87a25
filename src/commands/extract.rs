//! Per-region matrix extraction.
//!
//! For each region: compute its bin window, load its correction data, merge
//! its chunk files, normalize every contact, and write the region's matrix.
//! A region that fails is recorded and the next one proceeds. The chunk
//! directory of a region is removed only after its matrix is on disk.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::bins::{BinBounds, Resolution};
use crate::chunks::{ChunkRun, CompletedRun, ContactSource, MergeStats};
use crate::commands::sort::MatrixSortCommand;
use crate::config::RunConfig;
use crate::correction::{CorrectionContext, RegionCorrection};
use crate::error::{MatrixError, Result};
use crate::genome::GenomeIndex;
use crate::normalize::{NormalizeStats, Normalizer};
use crate::output::MatrixWriter;
use crate::report::{RunSummary, SortFailure};

/// Contacts between time-budget checks.
const DEADLINE_CHECK_INTERVAL: usize = 1024;

/// Wall-clock budget for one region.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    fn check(&self, region: &str) -> Result<()> {
        if Instant::now() >= self.at {
            return Err(MatrixError::Timeout {
                region: region.to_string(),
                budget: self.budget,
            });
        }
        Ok(())
    }
}

/// Statistics from one extracted region.
#[derive(Debug, Clone)]
pub struct RegionStats {
    pub path: PathBuf,
    pub merge: MergeStats,
    pub normalize: NormalizeStats,
}

/// Normalize every contact of `source` into `writer`.
///
/// Stops at the first source error, at a contact outside the window's local
/// bins, or when the deadline passes. The writer
/// is left unfinished, so the caller decides whether the file is kept.
pub fn stream_contacts<S: ContactSource>(
    source: S,
    region: &str,
    correction: &RegionCorrection<'_>,
    bounds: &BinBounds,
    writer: &mut MatrixWriter,
    deadline: Option<Deadline>,
) -> Result<NormalizeStats> {
    let mut normalizer = Normalizer::new(correction, bounds);

    for (i, contact) in source.enumerate() {
        if i % DEADLINE_CHECK_INTERVAL == 0 {
            if let Some(deadline) = &deadline {
                deadline.check(region)?;
            }
        }
        let contact = contact?;
        if contact.row >= bounds.row.len() || contact.col >= bounds.col.len() {
            return Err(MatrixError::merge(
                writer.path(),
                format!(
                    "bin ({}, {}) outside region window of {}x{} bins",
                    contact.row,
                    contact.col,
                    bounds.row.len(),
                    bounds.col.len()
                ),
            ));
        }
        if let Some(entry) = normalizer.normalize(&contact) {
            writer.write_entry(&entry)?;
        }
    }

    Ok(normalizer.into_stats())
}

/// Write a region's matrix from any contact source and move it into place.
///
/// Used for in-memory sources, which have no temp artifacts to clean up.
pub fn write_region<S: ContactSource>(
    source: S,
    region: &str,
    correction: &RegionCorrection<'_>,
    bounds: &BinBounds,
    outdir: &Path,
    resolution: Resolution,
) -> Result<(PathBuf, NormalizeStats)> {
    let mut writer = MatrixWriter::create(outdir, region, resolution)?;
    let stats = stream_contacts(source, region, correction, bounds, &mut writer, None)?;
    let path = writer.finish()?;
    Ok((path, stats))
}

/// Remove a finished region's chunks unless asked to keep them.
///
/// The matrix is already on disk, so a failed removal is only logged.
/// Returns whether the chunks were removed.
fn release_chunks(completed: CompletedRun, keep_temp: bool) -> bool {
    let dir = completed.run().dir().to_path_buf();
    if keep_temp {
        debug!("Keeping {}", dir.display());
        return false;
    }
    match completed.cleanup() {
        Ok(()) => true,
        Err(e) => {
            warn!("Cleanup of {} failed: {}", dir.display(), e);
            false
        }
    }
}

/// Extract command over a validated run configuration.
pub struct ExtractCommand {
    config: RunConfig,
}

impl ExtractCommand {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Extract every region, then sort the output files.
    ///
    /// Only configuration errors are returned; region and sort failures are
    /// recorded in the summary.
    pub fn run(&self) -> Result<RunSummary> {
        let config = &self.config;
        let (genome, regions) = config.validate()?;
        let index = GenomeIndex::from_genome(config.resolution, &genome)?;
        let mut summary = RunSummary::new();

        info!(
            "Resolution {}, {} regions, filter mask {}",
            config.resolution,
            regions.len(),
            config.filter
        );

        if config.biases.is_some() {
            info!("Getting biases...");
        }
        let ctx = match CorrectionContext::open(config.biases.as_deref(), config.resolution) {
            Ok(ctx) => ctx,
            Err(e) if e.is_skip() => {
                error!("{}", e);
                for region in &regions {
                    summary.record_error(region, &e);
                }
                return Ok(summary);
            }
            Err(e) => return Err(e),
        };
        if ctx.is_pass_through() {
            info!("No correction model, writing raw counts");
        }

        for region in &regions {
            info!("Writing matrix: {}", region);
            match self.extract_region(&ctx, &index, region) {
                Ok(stats) => {
                    debug!("{}: {}", region, stats.merge);
                    debug!("{}: {}", region, stats.normalize);
                    summary.succeeded(region, stats.path, stats.normalize.emitted);
                }
                Err(e) if e.is_skip() => {
                    warn!("Skipping {}: {}", region, e);
                    summary.record_error(region, &e);
                }
                Err(e) => {
                    error!("Region {} failed: {}", region, e);
                    summary.record_error(region, &e);
                }
            }
        }

        if config.sort {
            self.sort_outputs(&mut summary);
        }

        Ok(summary)
    }

    /// Run the sort pass over the output directory.
    pub fn sort_outputs(&self, summary: &mut RunSummary) {
        let config = &self.config;
        if !config.outdir.is_dir() {
            return;
        }
        match MatrixSortCommand::new().sort_outputs(&config.outdir, config.resolution) {
            Ok(outcomes) => summary.record_sort(&outcomes),
            Err(e) => {
                error!("Cannot list {}: {}", config.outdir.display(), e);
                summary.sort_failures.push(SortFailure {
                    path: config.outdir.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Extract one region.
    pub fn extract_region(
        &self,
        ctx: &CorrectionContext,
        index: &GenomeIndex,
        region: &str,
    ) -> Result<RegionStats> {
        let config = &self.config;
        let section = index.section(region).ok_or_else(|| {
            MatrixError::Config(format!("Region '{}' not found in genome file", region))
        })?;
        let bounds = if config.window.is_whole() {
            BinBounds::whole(section)
        } else {
            BinBounds::window(
                section,
                config.resolution,
                config.window.row_bp(),
                config.window.col_bp(),
            )?
        };

        let correction = ctx.load(region, &bounds)?;

        let run = ChunkRun::discover(&config.tmpdir, config.run_id_for(region), region)?;
        debug!(
            "{}: {} chunks in {}",
            region,
            run.chunks().len(),
            run.dir().display()
        );

        let mut merger = run.merge(bounds);
        let mut writer = MatrixWriter::create(&config.outdir, region, config.resolution)?;
        let deadline = config.region_timeout.map(Deadline::after);
        let normalize = stream_contacts(
            &mut merger,
            region,
            &correction,
            &bounds,
            &mut writer,
            deadline,
        )?;

        let completed = merger.complete()?;
        let path = writer.finish()?;

        let merge = completed.stats().clone();
        release_chunks(completed, config.keep_temp);

        Ok(RegionStats {
            path,
            merge,
            normalize,
        })
    }
}
