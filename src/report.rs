//! Per-run outcome summary.

use std::fmt;
use std::path::PathBuf;

use crate::commands::sort::SortOutcome;
use crate::error::MatrixError;

/// What happened to one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionStatus {
    Succeeded { path: PathBuf, entries: usize },
    Skipped { reason: String },
    Failed { kind: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionOutcome {
    pub region: String,
    pub status: RegionStatus,
}

/// A file the sort pass could not sort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcomes of every region and of the sort pass.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub regions: Vec<RegionOutcome>,
    pub sorted: usize,
    pub sort_failures: Vec<SortFailure>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeeded(&mut self, region: &str, path: PathBuf, entries: usize) {
        self.push(region, RegionStatus::Succeeded { path, entries });
    }

    /// Record a region error: data-load errors skip, everything else fails.
    pub fn record_error(&mut self, region: &str, err: &MatrixError) {
        let status = if err.is_skip() {
            RegionStatus::Skipped {
                reason: err.to_string(),
            }
        } else {
            RegionStatus::Failed {
                kind: err.kind(),
                reason: err.to_string(),
            }
        };
        self.push(region, status);
    }

    pub fn record_sort(&mut self, outcomes: &[SortOutcome]) {
        for outcome in outcomes {
            match &outcome.result {
                Ok(_) => self.sorted += 1,
                Err(e) => self.sort_failures.push(SortFailure {
                    path: outcome.path.clone(),
                    reason: e.to_string(),
                }),
            }
        }
    }

    fn push(&mut self, region: &str, status: RegionStatus) {
        self.regions.push(RegionOutcome {
            region: region.to_string(),
            status,
        });
    }

    pub fn count_succeeded(&self) -> usize {
        self.count(|s| matches!(s, RegionStatus::Succeeded { .. }))
    }

    pub fn count_skipped(&self) -> usize {
        self.count(|s| matches!(s, RegionStatus::Skipped { .. }))
    }

    pub fn count_failed(&self) -> usize {
        self.count(|s| matches!(s, RegionStatus::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&RegionStatus) -> bool) -> usize {
        self.regions.iter().filter(|r| pred(&r.status)).count()
    }

    /// True when every region succeeded and every file was sorted.
    pub fn is_success(&self) -> bool {
        self.count_succeeded() == self.regions.len() && self.sort_failures.is_empty()
    }

    pub fn status(&self, region: &str) -> Option<&RegionStatus> {
        self.regions
            .iter()
            .find(|r| r.region == region)
            .map(|r| &r.status)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.regions.is_empty() {
            writeln!(
                f,
                "Regions: {} succeeded, {} skipped, {} failed",
                self.count_succeeded(),
                self.count_skipped(),
                self.count_failed()
            )?;
        }
        for outcome in &self.regions {
            match &outcome.status {
                RegionStatus::Succeeded { path, entries } => writeln!(
                    f,
                    "  ok       {}: {} entries -> {}",
                    outcome.region,
                    entries,
                    path.display()
                )?,
                RegionStatus::Skipped { reason } => {
                    writeln!(f, "  skipped  {}: {}", outcome.region, reason)?
                }
                RegionStatus::Failed { kind, reason } => {
                    writeln!(f, "  failed   {} [{}]: {}", outcome.region, kind, reason)?
                }
            }
        }
        write!(
            f,
            "Sorted: {} files, {} failed",
            self.sorted,
            self.sort_failures.len()
        )?;
        for failure in &self.sort_failures {
            write!(f, "\n  unsorted {}: {}", failure.path.display(), failure.reason)?;
        }
        Ok(())
    }
}
