//! Temp-directory layout shared with the chunked scan.
//!
//! ```text
//! <tmpdir>/_tmp_<run_id>/<region>:<start>-<end>.tsv
//! ```
//!
//! `start` and `end` are the base-pair bounds of the slice of the region each
//! scan worker handled.

use std::fmt;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHasher;

use crate::bins::{BinBounds, Resolution};
use crate::error::{MatrixError, Result};
use crate::filter::FilterMask;

use super::merger::ChunkMerger;

/// Identifier of one scan run; names its temp directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunId(String);

impl RunId {
    /// Use an identifier chosen by the scan.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(MatrixError::Config(format!("Invalid run identifier: '{}'", id)));
        }
        Ok(Self(id))
    }

    /// Derive the identifier the scan uses for a region of an alignment file.
    ///
    /// Deterministic for the same inputs and build, so the scan and the merge
    /// agree on the directory without passing it around.
    pub fn derive(
        alignment: &Path,
        resolution: Resolution,
        mask: FilterMask,
        region: &str,
    ) -> Self {
        let mut hasher = FxHasher::default();
        alignment.to_string_lossy().hash(&mut hasher);
        resolution.bp().hash(&mut hasher);
        mask.bits().hash(&mut hasher);
        region.hash(&mut hasher);
        Self(format!("{:016x}", hasher.finish()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Run directory under `tmpdir`.
    pub fn dir(&self, tmpdir: &Path) -> PathBuf {
        tmpdir.join(format!("_tmp_{}", self.0))
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A slice of a region handled by one scan worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkDescriptor {
    pub region: String,
    pub start: u64,
    pub end: u64,
}

impl ChunkDescriptor {
    pub fn new(region: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            region: region.into(),
            start,
            end,
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}:{}-{}.tsv", self.region, self.start, self.end)
    }

    /// Parse `<region>:<start>-<end>.tsv`.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".tsv")?;
        let (region, span) = stem.rsplit_once(':')?;
        let (start, end) = span.split_once('-')?;
        if region.is_empty() {
            return None;
        }
        Some(Self::new(region, start.parse().ok()?, end.parse().ok()?))
    }
}

/// The chunk files of one region, as left by the scan.
#[derive(Debug, Clone)]
pub struct ChunkRun {
    run_id: RunId,
    dir: PathBuf,
    region: Arc<str>,
    chunks: Vec<ChunkDescriptor>,
}

impl ChunkRun {
    /// Use an explicit descriptor list, in the given order.
    pub fn new(tmpdir: &Path, run_id: RunId, region: &str, chunks: Vec<ChunkDescriptor>) -> Self {
        Self {
            dir: run_id.dir(tmpdir),
            run_id,
            region: Arc::from(region),
            chunks,
        }
    }

    /// List the run directory and keep the chunks of `region`, ordered by start.
    ///
    /// A missing run directory is a merge error: there is nothing to merge and
    /// nothing to diagnose.
    pub fn discover(tmpdir: &Path, run_id: RunId, region: &str) -> Result<Self> {
        let dir = run_id.dir(tmpdir);
        let entries = fs::read_dir(&dir).map_err(|e| {
            MatrixError::merge(&dir, format!("cannot list chunk directory: {}", e))
        })?;

        let mut chunks = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(desc) = name.to_str().and_then(ChunkDescriptor::from_file_name) else {
                continue;
            };
            if desc.region == region {
                chunks.push(desc);
            }
        }
        chunks.sort();

        Ok(Self {
            dir,
            run_id,
            region: Arc::from(region),
            chunks,
        })
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn chunks(&self) -> &[ChunkDescriptor] {
        &self.chunks
    }

    pub fn chunk_path(&self, chunk: &ChunkDescriptor) -> PathBuf {
        self.dir.join(chunk.file_name())
    }

    /// Start a lazy merge of this run's chunks over the region's bin window.
    pub fn merge(self, bounds: BinBounds) -> ChunkMerger {
        ChunkMerger::new(self, bounds)
    }

    pub(crate) fn region_arc(&self) -> Arc<str> {
        Arc::clone(&self.region)
    }
}
