//! Lazy merge of a region's chunk files.
//!
//! Chunks are read one after another, one line at a time, so memory use is
//! bounded by the read buffer regardless of region size. Chunks are not
//! interleaved or re-sorted: each unordered bin pair lives in exactly one
//! chunk, which is all the triangle filter downstream relies on.
//!
//! The first error ends the stream. A merger that ended in error, or that was
//! dropped before its last chunk, can never be turned into a
//! [`CompletedRun`], so its temp directory stays on disk for diagnosis.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use crate::bins::BinBounds;
use crate::error::{MatrixError, Result};

use super::layout::ChunkRun;
use super::parsing::{parse_chunk_line, should_skip_line};
use super::RawContact;

/// Read buffer per open chunk (256KB).
const BUF_SIZE: usize = 256 * 1024;

/// Statistics from a chunk merge.
#[derive(Debug, Default, Clone)]
pub struct MergeStats {
    pub chunks_read: usize,
    pub lines_read: usize,
    pub contacts: usize,
}

impl fmt::Display for MergeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Chunks: {}, Lines: {}, Contacts: {}",
            self.chunks_read, self.lines_read, self.contacts
        )
    }
}

struct OpenChunk {
    reader: BufReader<File>,
    path: PathBuf,
    line_number: usize,
}

/// Iterator over the raw contacts of one region.
pub struct ChunkMerger {
    run: ChunkRun,
    rows: u64,
    cols: u64,
    next_chunk: usize,
    current: Option<OpenChunk>,
    line: Vec<u8>,
    region: Arc<str>,
    /// Last chromosome name seen that differs from the region, reused across lines.
    foreign: Option<Arc<str>>,
    failed: bool,
    exhausted: bool,
    stats: MergeStats,
}

impl ChunkMerger {
    pub(crate) fn new(run: ChunkRun, bounds: BinBounds) -> Self {
        let region = run.region_arc();
        Self {
            run,
            rows: bounds.row.len(),
            cols: bounds.col.len(),
            next_chunk: 0,
            current: None,
            line: Vec::with_capacity(128),
            region,
            foreign: None,
            failed: false,
            exhausted: false,
            stats: MergeStats::default(),
        }
    }

    pub fn stats(&self) -> &MergeStats {
        &self.stats
    }

    pub fn run(&self) -> &ChunkRun {
        &self.run
    }

    /// Confirm every chunk was merged.
    ///
    /// Fails if the merge hit an error or was not driven to the end.
    pub fn complete(self) -> Result<CompletedRun> {
        if self.failed {
            return Err(MatrixError::merge(
                self.run.dir(),
                "merge failed; chunks kept for diagnosis",
            ));
        }
        if !self.exhausted {
            return Err(MatrixError::merge(
                self.run.dir(),
                format!(
                    "merge stopped after {} of {} chunks",
                    self.stats.chunks_read,
                    self.run.chunks().len()
                ),
            ));
        }
        Ok(CompletedRun {
            run: self.run,
            stats: self.stats,
        })
    }

    fn fail(&mut self, err: MatrixError) -> Option<Result<RawContact>> {
        self.failed = true;
        self.current = None;
        Some(Err(err))
    }

    fn open_next(&mut self) -> Result<bool> {
        let Some(chunk) = self.run.chunks().get(self.next_chunk) else {
            return Ok(false);
        };
        let path = self.run.chunk_path(chunk);
        self.next_chunk += 1;
        let file = File::open(&path)
            .map_err(|e| MatrixError::merge(&path, format!("cannot open chunk: {}", e)))?;
        self.current = Some(OpenChunk {
            reader: BufReader::with_capacity(BUF_SIZE, file),
            path,
            line_number: 0,
        });
        Ok(true)
    }

    /// End the stream with an error located in the current chunk.
    fn fail_at(&mut self, line_number: usize, message: String) -> Option<Result<RawContact>> {
        let path = self
            .current
            .as_ref()
            .map(|c| c.path.clone())
            .unwrap_or_else(|| self.run.dir().to_path_buf());
        self.fail(MatrixError::merge(
            path,
            format!("line {}: {}", line_number, message),
        ))
    }
}

/// Shared name for a chunk line's chromosome field.
fn resolve_chrom(
    region: &Arc<str>,
    foreign: &mut Option<Arc<str>>,
    name: &[u8],
) -> std::result::Result<Arc<str>, String> {
    if name == region.as_bytes() {
        return Ok(Arc::clone(region));
    }
    if let Some(known) = foreign.as_ref() {
        if name == known.as_bytes() {
            return Ok(Arc::clone(known));
        }
    }
    let name =
        std::str::from_utf8(name).map_err(|_| "chromosome name is not valid UTF-8".to_string())?;
    let chrom: Arc<str> = Arc::from(name);
    *foreign = Some(Arc::clone(&chrom));
    Ok(chrom)
}

impl Iterator for ChunkMerger {
    type Item = Result<RawContact>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.failed || self.exhausted {
                return None;
            }

            if self.current.is_none() {
                match self.open_next() {
                    Ok(true) => {}
                    Ok(false) => {
                        self.exhausted = true;
                        return None;
                    }
                    Err(e) => return self.fail(e),
                }
            }

            let Some(chunk) = self.current.as_mut() else {
                continue;
            };
            self.line.clear();
            let read = chunk.reader.read_until(b'\n', &mut self.line);
            match read {
                Ok(0) => {
                    self.current = None;
                    self.stats.chunks_read += 1;
                    continue;
                }
                Ok(_) => {
                    chunk.line_number += 1;
                    self.stats.lines_read += 1;
                }
                Err(e) => {
                    let path = chunk.path.clone();
                    return self.fail(MatrixError::merge(path, format!("read failed: {}", e)));
                }
            }

            if should_skip_line(&self.line) {
                continue;
            }

            let line_number = chunk.line_number;
            let Some(parsed) = parse_chunk_line(&self.line) else {
                let message = format!(
                    "expected row, col, count: '{}'",
                    String::from_utf8_lossy(&self.line).trim_end()
                );
                return self.fail_at(line_number, message);
            };

            if parsed.row >= self.rows || parsed.col >= self.cols {
                let message = format!(
                    "bin ({}, {}) outside region window of {}x{} bins",
                    parsed.row, parsed.col, self.rows, self.cols
                );
                return self.fail_at(line_number, message);
            }

            let (row, col, count) = (parsed.row, parsed.col, parsed.count);
            let chrom = match parsed.chrom {
                None => Arc::clone(&self.region),
                Some(name) => match resolve_chrom(&self.region, &mut self.foreign, name) {
                    Ok(chrom) => chrom,
                    Err(message) => return self.fail_at(line_number, message),
                },
            };

            self.stats.contacts += 1;
            return Some(Ok(RawContact::new(chrom, row, col, count)));
        }
    }
}

/// A fully merged run whose temp artifacts may now be removed.
#[derive(Debug)]
pub struct CompletedRun {
    run: ChunkRun,
    stats: MergeStats,
}

impl CompletedRun {
    pub fn stats(&self) -> &MergeStats {
        &self.stats
    }

    pub fn run(&self) -> &ChunkRun {
        &self.run
    }

    /// Remove this region's chunk files, then the run directory once empty.
    ///
    /// Chunks of other regions sharing the directory are left alone. Files or
    /// a directory that are already gone are fine.
    pub fn cleanup(self) -> Result<()> {
        for chunk in self.run.chunks() {
            ignore_missing(fs::remove_file(self.run.chunk_path(chunk)))?;
        }
        let dir = self.run.dir();
        let empty = match fs::read_dir(dir) {
            Ok(mut entries) => entries.next().is_none(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(MatrixError::Io(e)),
        };
        if empty {
            ignore_missing(fs::remove_dir(dir))?;
        }
        Ok(())
    }
}

fn ignore_missing(result: io::Result<()>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(MatrixError::Io(e)),
    }
}
