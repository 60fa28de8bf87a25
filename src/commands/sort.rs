//! In-place numeric sort of matrix files by (row, col).
//!
//! Optimizations:
//! - Memory-mapped file I/O for zero-copy access
//! - Zero-allocation key parsing (byte slices, no String allocation)
//! - LSD Radix Sort on (row, col) - O(n)
//! - Parallel key parsing with Rayon
//! - External merge sort for files above the memory budget
//!
//! Sort order matches `sort -k1,1n -k2,2n` with input order kept for ties.
//!
//! Every file is rewritten through a temp file in the same directory and
//! renamed over the original only after the sorted copy is complete, so
//! readers see either the old file or the sorted one, and a failed sort leaves
//! the original untouched.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use memchr::memchr;
use memmap2::Mmap;
use rayon::prelude::*;
use tempfile::NamedTempFile;

use crate::bins::Resolution;
use crate::chunks::parse_u64_fast;
use crate::error::{MatrixError, Result};
use crate::output::matrix_suffix;

/// Buffer size for I/O operations (256KB)
const BUF_SIZE: usize = 256 * 1024;

/// Minimum file size to use mmap (smaller files use buffered I/O)
const MMAP_THRESHOLD: usize = 64 * 1024;

/// Minimum records to trigger parallel parsing
const PARALLEL_THRESHOLD: usize = 10_000;

/// Minimum records to use radix sort (smaller uses comparison sort)
const RADIX_THRESHOLD: usize = 256;

/// Files at or above this size are sorted externally (1GB).
const DEFAULT_MEMORY_LIMIT: u64 = 1024 * 1024 * 1024;

/// Lines per sorted run in external mode.
const DEFAULT_RUN_LINES: usize = 5_000_000;

/// Sort key and line location.
#[derive(Clone, Copy, Debug)]
struct SortEntry {
    row: u64,
    col: u64,
    line_start: usize,
    line_len: usize,
}

/// Statistics from sorting one file.
#[derive(Debug, Default, Clone)]
pub struct MatrixSortStats {
    pub records_read: usize,
    pub used_radix_sort: bool,
    pub used_mmap: bool,
    pub external_runs: usize,
}

impl fmt::Display for MatrixSortStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Records: {}, Radix: {}, Mmap: {}, Runs: {}",
            self.records_read,
            if self.used_radix_sort { "yes" } else { "no" },
            if self.used_mmap { "yes" } else { "no" },
            self.external_runs
        )
    }
}

/// Result of sorting one file during the post-pass.
#[derive(Debug)]
pub struct SortOutcome {
    pub path: PathBuf,
    pub result: Result<MatrixSortStats>,
}

impl SortOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Sort command for matrix files.
#[derive(Debug, Clone)]
pub struct MatrixSortCommand {
    /// Use radix sort (default: true for large inputs)
    pub use_radix: bool,
    /// Files at or above this many bytes use external merge sort
    pub memory_limit: u64,
    /// Lines per spilled run in external mode
    pub run_lines: usize,
}

impl Default for MatrixSortCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl MatrixSortCommand {
    pub fn new() -> Self {
        Self {
            use_radix: true,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            run_lines: DEFAULT_RUN_LINES,
        }
    }

    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit = bytes;
        self
    }

    pub fn with_run_lines(mut self, lines: usize) -> Self {
        self.run_lines = lines.max(1);
        self
    }

    /// Sort every matrix file of `resolution` in `outdir`, in parallel.
    ///
    /// Failures are logged and reported per file; they never stop other files.
    pub fn sort_outputs(&self, outdir: &Path, resolution: Resolution) -> Result<Vec<SortOutcome>> {
        let paths = matrix_files(outdir, resolution)?;
        let outcomes = paths
            .into_par_iter()
            .map(|path| {
                info!("Sorting matrix: {}", path.display());
                let result = self.sort_file(&path);
                match &result {
                    Ok(stats) => debug!("Sorted {}: {}", path.display(), stats),
                    Err(e) => warn!("Sort failed, left unsorted: {}", e),
                }
                SortOutcome { path, result }
            })
            .collect();
        Ok(outcomes)
    }

    /// Sort one file in place.
    pub fn sort_file(&self, path: &Path) -> Result<MatrixSortStats> {
        self.sort_file_inner(path).map_err(|e| match e {
            MatrixError::Sort { .. } => e,
            other => MatrixError::Sort {
                path: path.to_path_buf(),
                message: other.to_string(),
            },
        })
    }

    fn sort_file_inner(&self, path: &Path) -> Result<MatrixSortStats> {
        let file = File::open(path)?;
        let metadata = file.metadata()?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut staged = NamedTempFile::new_in(dir)?;

        let stats = if metadata.len() >= self.memory_limit {
            let reader = BufReader::with_capacity(BUF_SIZE, file);
            self.sort_external(reader, staged.as_file_mut(), dir)
        } else if metadata.len() as usize >= MMAP_THRESHOLD {
            // Safety: the file is only read; concurrent writers are not expected
            // while the post-pass runs.
            let mmap = unsafe { Mmap::map(&file)? };
            let mut stats = self.sort_bytes(&mmap, staged.as_file_mut())?;
            stats.used_mmap = true;
            Ok(stats)
        } else {
            self.sort_buffered(file, staged.as_file_mut())
        }?;

        staged.as_file().sync_all()?;
        fs::set_permissions(staged.path(), metadata.permissions())?;
        staged.persist(path).map_err(|e| MatrixError::Io(e.error))?;
        Ok(stats)
    }

    /// Sort using buffered I/O (for small files or any reader).
    pub fn sort_buffered<R: Read, W: Write>(
        &self,
        mut reader: R,
        output: &mut W,
    ) -> Result<MatrixSortStats> {
        let mut data = Vec::with_capacity(BUF_SIZE);
        reader.read_to_end(&mut data)?;
        self.sort_bytes(&data, output)
    }

    /// Sort an in-memory buffer of lines.
    fn sort_bytes<W: Write>(&self, data: &[u8], output: &mut W) -> Result<MatrixSortStats> {
        let mut stats = MatrixSortStats::default();

        let line_offsets = find_line_offsets(data);
        if line_offsets.is_empty() {
            return Ok(stats);
        }

        let entries = if line_offsets.len() >= PARALLEL_THRESHOLD {
            parse_entries_parallel(data, &line_offsets)?
        } else {
            parse_entries_sequential(data, &line_offsets)?
        };
        stats.records_read = entries.len();

        let sorted = if self.use_radix && entries.len() >= RADIX_THRESHOLD {
            stats.used_radix_sort = true;
            radix_sort_lsd(entries)
        } else {
            comparison_sort_entries(entries)
        };

        let mut writer = BufWriter::with_capacity(BUF_SIZE, output);
        for entry in &sorted {
            writer.write_all(&data[entry.line_start..entry.line_start + entry.line_len])?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        Ok(stats)
    }

    /// External merge sort: spill sorted runs under `spill_in`, then k-way merge them.
    fn sort_external<R: BufRead, W: Write>(
        &self,
        mut reader: R,
        output: &mut W,
        spill_in: &Path,
    ) -> Result<MatrixSortStats> {
        let mut stats = MatrixSortStats::default();
        let spill_dir = tempfile::Builder::new().prefix(".sort").tempdir_in(spill_in)?;
        let mut run_paths = Vec::new();
        let mut run: Vec<((u64, u64), Vec<u8>)> = Vec::with_capacity(self.run_lines.min(1 << 20));
        let mut line = Vec::new();
        let mut line_number = 0;

        loop {
            line.clear();
            let read = reader.read_until(b'\n', &mut line)?;
            if read > 0 {
                line_number += 1;
                let content = trim_eol(&line);
                if !content.is_empty() {
                    let key = parse_key(content).ok_or_else(|| bad_line(line_number))?;
                    run.push((key, content.to_vec()));
                    stats.records_read += 1;
                }
            }

            if (read == 0 && !run.is_empty()) || run.len() >= self.run_lines {
                // Stable: equal keys keep input order within the run
                run.sort_by_key(|(key, _)| *key);
                let run_path = spill_dir.path().join(format!("run_{}.tsv", run_paths.len()));
                let mut writer = BufWriter::with_capacity(BUF_SIZE, File::create(&run_path)?);
                for (_, content) in run.drain(..) {
                    writer.write_all(&content)?;
                    writer.write_all(b"\n")?;
                }
                writer.flush()?;
                run_paths.push(run_path);
            }

            if read == 0 {
                break;
            }
        }

        stats.external_runs = run_paths.len();
        k_way_merge(&run_paths, output)?;
        Ok(stats)
    }
}

/// Matrix files of a resolution in `outdir`, in name order.
pub fn matrix_files(outdir: &Path, resolution: Resolution) -> Result<Vec<PathBuf>> {
    let suffix = matrix_suffix(resolution);
    let mut paths = Vec::new();
    for entry in fs::read_dir(outdir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if name.to_str().is_some_and(|n| n.ends_with(&suffix)) {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}

/// K-way merge of sorted run files.
///
/// Ties go to the lower run index, which holds earlier input lines.
fn k_way_merge<W: Write>(run_paths: &[PathBuf], output: &mut W) -> Result<()> {
    let mut readers = run_paths
        .iter()
        .map(|p| File::open(p).map(|f| BufReader::with_capacity(BUF_SIZE, f)))
        .collect::<io::Result<Vec<_>>>()?;

    let mut heap: BinaryHeap<Reverse<((u64, u64), usize, Vec<u8>)>> = BinaryHeap::new();

    for (idx, reader) in readers.iter_mut().enumerate() {
        if let Some((key, line)) = next_run_line(reader)? {
            heap.push(Reverse((key, idx, line)));
        }
    }

    let mut writer = BufWriter::with_capacity(BUF_SIZE, output);
    while let Some(Reverse((_key, run_idx, line))) = heap.pop() {
        writer.write_all(&line)?;
        writer.write_all(b"\n")?;

        if let Some((key, next)) = next_run_line(&mut readers[run_idx])? {
            heap.push(Reverse((key, run_idx, next)));
        }
    }
    writer.flush()?;
    Ok(())
}

fn next_run_line<R: BufRead>(reader: &mut R) -> Result<Option<((u64, u64), Vec<u8>)>> {
    let mut line = Vec::new();
    if reader.read_until(b'\n', &mut line)? == 0 {
        return Ok(None);
    }
    let len = trim_eol(&line).len();
    line.truncate(len);
    let key = parse_key(&line).ok_or_else(|| bad_line(0))?;
    Ok(Some((key, line)))
}

/// Find all non-empty line start/end offsets in the data.
fn find_line_offsets(data: &[u8]) -> Vec<(usize, usize)> {
    let mut offsets = Vec::with_capacity(data.len() / 24); // Estimate ~24 bytes per line
    let mut pos = 0;

    while pos < data.len() {
        let line_start = pos;
        let (line_end, next) = match memchr(b'\n', &data[pos..]) {
            Some(offset) => (pos + offset, pos + offset + 1),
            None => (data.len(), data.len()),
        };
        let line_len = trim_eol(&data[line_start..line_end]).len();
        if line_len > 0 {
            offsets.push((line_start, line_start + line_len));
        }
        pos = next;
    }

    offsets
}

/// Parse the (row, col) key from the first two fields.
#[inline(always)]
fn parse_key(line: &[u8]) -> Option<(u64, u64)> {
    let tab1 = memchr(b'\t', line)?;
    let row = parse_u64_fast(&line[..tab1])?;
    let rest = &line[tab1 + 1..];
    let col_end = memchr(b'\t', rest).unwrap_or(rest.len());
    let col = parse_u64_fast(&rest[..col_end])?;
    Some((row, col))
}

#[inline(always)]
fn trim_eol(mut line: &[u8]) -> &[u8] {
    while let [rest @ .., b'\n' | b'\r'] = line {
        line = rest;
    }
    line
}

fn bad_line(line_number: usize) -> MatrixError {
    MatrixError::Parse {
        line: line_number,
        message: "expected numeric row and col in the first two columns".to_string(),
    }
}

fn entry_at(
    data: &[u8],
    (line_start, line_end): (usize, usize),
    index: usize,
) -> Result<SortEntry> {
    let (row, col) =
        parse_key(&data[line_start..line_end]).ok_or_else(|| bad_line(index + 1))?;
    Ok(SortEntry {
        row,
        col,
        line_start,
        line_len: line_end - line_start,
    })
}

/// Parse entries sequentially.
fn parse_entries_sequential(
    data: &[u8],
    line_offsets: &[(usize, usize)],
) -> Result<Vec<SortEntry>> {
    line_offsets
        .iter()
        .enumerate()
        .map(|(i, &offsets)| entry_at(data, offsets, i))
        .collect()
}

/// Parse entries in parallel chunks, preserving input order.
fn parse_entries_parallel(data: &[u8], line_offsets: &[(usize, usize)]) -> Result<Vec<SortEntry>> {
    let num_threads = rayon::current_num_threads();
    let chunk_size = (line_offsets.len() / num_threads).max(1000);

    let chunks: Vec<Result<Vec<SortEntry>>> = line_offsets
        .par_chunks(chunk_size)
        .enumerate()
        .map(|(chunk_idx, chunk)| {
            chunk
                .iter()
                .enumerate()
                .map(|(i, &offsets)| entry_at(data, offsets, chunk_idx * chunk_size + i))
                .collect()
        })
        .collect();

    let mut entries = Vec::with_capacity(line_offsets.len());
    for chunk in chunks {
        entries.extend(chunk?);
    }
    Ok(entries)
}

/// Comparison-based stable sort (for smaller datasets).
fn comparison_sort_entries(mut entries: Vec<SortEntry>) -> Vec<SortEntry> {
    entries.sort_by_key(|e| (e.row, e.col));
    entries
}

/// LSD Radix Sort for SortEntry.
///
/// Sorts by (row, col), least significant byte first: passes 1-8 on col,
/// passes 9-16 on row. Each pass is stable, so entries with equal keys keep
/// input order. Passes where every entry has the same byte are skipped.
fn radix_sort_lsd(entries: Vec<SortEntry>) -> Vec<SortEntry> {
    if entries.len() < RADIX_THRESHOLD {
        return comparison_sort_entries(entries);
    }

    let mut src = entries;
    let mut dst = src.clone();

    for shift in (0u32..64).step_by(8) {
        if radix_pass(&src, &mut dst, shift, |e| e.col) {
            std::mem::swap(&mut src, &mut dst);
        }
    }
    for shift in (0u32..64).step_by(8) {
        if radix_pass(&src, &mut dst, shift, |e| e.row) {
            std::mem::swap(&mut src, &mut dst);
        }
    }

    src
}

/// Single radix pass over one byte of a key. Returns false if all bytes are
/// the same (pass skipped, `dst` untouched).
#[inline]
fn radix_pass<F>(src: &[SortEntry], dst: &mut [SortEntry], shift: u32, key: F) -> bool
where
    F: Fn(&SortEntry) -> u64,
{
    let mut count = [0usize; 257];

    for entry in src {
        let byte = ((key(entry) >> shift) & 0xFF) as usize;
        count[byte + 1] += 1;
    }

    if count[1..].iter().filter(|&&c| c > 0).count() <= 1 {
        return false;
    }

    for i in 1..257 {
        count[i] += count[i - 1];
    }

    for entry in src {
        let byte = ((key(entry) >> shift) & 0xFF) as usize;
        dst[count[byte]] = *entry;
        count[byte] += 1;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sort_str(cmd: &MatrixSortCommand, input: &str) -> String {
        let mut output = Vec::new();
        cmd.sort_buffered(input.as_bytes(), &mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key(b"12\t34\t5\t1.0"), Some((12, 34)));
        assert_eq!(parse_key(b"12\t34"), Some((12, 34)));
        assert_eq!(parse_key(b"12"), None);
        assert_eq!(parse_key(b"a\t1\t1\t1"), None);
    }

    #[test]
    fn test_numeric_not_lexicographic() {
        let cmd = MatrixSortCommand::new();
        let out = sort_str(&cmd, "10\t2\t1\t1.0\n9\t3\t1\t1.0\n9\t10\t1\t1.0\n9\t2\t1\t1.0\n");
        assert_eq!(out, "9\t2\t1\t1.0\n9\t3\t1\t1.0\n9\t10\t1\t1.0\n10\t2\t1\t1.0\n");
    }

    #[test]
    fn test_scenario_order() {
        let cmd = MatrixSortCommand::new();
        let out = sort_str(&cmd, "1\t1\t5\t5.0\n0\t2\t10\t5.0\n");
        assert_eq!(out, "0\t2\t10\t5.0\n1\t1\t5\t5.0\n");
    }

    #[test]
    fn test_ties_keep_input_order() {
        let cmd = MatrixSortCommand::new();
        let out = sort_str(&cmd, "1\t1\t1\tb\n0\t0\t1\tz\n1\t1\t1\ta\n");
        assert_eq!(out, "0\t0\t1\tz\n1\t1\t1\tb\n1\t1\t1\ta\n");
    }

    #[test]
    fn test_blank_lines_and_crlf() {
        let cmd = MatrixSortCommand::new();
        let out = sort_str(&cmd, "\n3\t4\t1\t1.0\r\n\n1\t2\t1\t1.0");
        assert_eq!(out, "1\t2\t1\t1.0\n3\t4\t1\t1.0\n");
    }

    #[test]
    fn test_empty_input() {
        let cmd = MatrixSortCommand::new();
        let mut output = Vec::new();
        let stats = cmd.sort_buffered(&b""[..], &mut output).unwrap();
        assert_eq!(stats.records_read, 0);
        assert!(output.is_empty());
    }

    #[test]
    fn test_malformed_line_is_error() {
        let cmd = MatrixSortCommand::new();
        let mut output = Vec::new();
        let err = cmd
            .sort_buffered(&b"1\t2\t1\t1.0\nnot\ta\tnumber\n"[..], &mut output)
            .unwrap_err();
        assert!(matches!(err, MatrixError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_radix_matches_comparison() {
        let mut input = String::new();
        let mut state: u64 = 12345;
        for i in 0..2000 {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let row = (state >> 33) % 700;
            let col = row + (state >> 40) % 3000;
            input.push_str(&format!("{}\t{}\t{}\t1.0\n", row, col, i));
        }

        let radix = MatrixSortCommand::new();
        let mut plain = MatrixSortCommand::new();
        plain.use_radix = false;

        let mut out_radix = Vec::new();
        let stats = radix.sort_buffered(input.as_bytes(), &mut out_radix).unwrap();
        assert!(stats.used_radix_sort);
        let mut out_plain = Vec::new();
        plain.sort_buffered(input.as_bytes(), &mut out_plain).unwrap();
        assert_eq!(out_radix, out_plain);

        let keys: Vec<_> = String::from_utf8(out_radix)
            .unwrap()
            .lines()
            .map(|l| parse_key(l.as_bytes()).unwrap())
            .collect();
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_external_matches_in_memory() {
        let mut input = String::new();
        for i in (0..500u64).rev() {
            input.push_str(&format!("{}\t{}\t{}\t0.5\n", i % 37, i % 11, i));
        }

        let tmp = tempfile::tempdir().unwrap();
        let in_memory_path = tmp.path().join("a_bam_10kb.tsv");
        let external_path = tmp.path().join("b_bam_10kb.tsv");
        fs::write(&in_memory_path, &input).unwrap();
        fs::write(&external_path, &input).unwrap();

        MatrixSortCommand::new().sort_file(&in_memory_path).unwrap();
        let stats = MatrixSortCommand::new()
            .with_memory_limit(0)
            .with_run_lines(64)
            .sort_file(&external_path)
            .unwrap();

        assert_eq!(stats.external_runs, 8);
        assert_eq!(
            fs::read(&in_memory_path).unwrap(),
            fs::read(&external_path).unwrap()
        );
    }

    #[test]
    fn test_sort_twice_is_identical() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("chr1_bam_10kb.tsv");
        fs::write(&path, "2\t3\t1\t1.0\n0\t5\t2\t2.0\n0\t1\t3\t0.25\n").unwrap();

        let cmd = MatrixSortCommand::new();
        cmd.sort_file(&path).unwrap();
        let first = fs::read(&path).unwrap();
        cmd.sort_file(&path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), first);
    }

    #[test]
    fn test_failed_sort_leaves_file_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("chr1_bam_10kb.tsv");
        let content = "2\t3\t1\t1.0\nbroken line\n0\t1\t3\t0.25\n";
        fs::write(&path, content).unwrap();

        let err = MatrixSortCommand::new().sort_file(&path).unwrap_err();
        assert_eq!(err.kind(), "sort");
        assert_eq!(fs::read_to_string(&path).unwrap(), content);
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_sort_outputs_isolates_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let res = Resolution::new(10_000).unwrap();
        fs::write(tmp.path().join("chr1_bam_10kb.tsv"), "1\t1\t1\t1.0\n0\t0\t1\t1.0\n").unwrap();
        fs::write(tmp.path().join("chr2_bam_10kb.tsv"), "garbage\n").unwrap();
        fs::write(tmp.path().join("chr1_bam_5kb.tsv"), "1\t1\t1\t1.0\n0\t0\t1\t1.0\n").unwrap();

        let outcomes = MatrixSortCommand::new().sort_outputs(tmp.path(), res).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].is_ok());
        assert!(!outcomes[1].is_ok());

        assert_eq!(
            fs::read_to_string(tmp.path().join("chr1_bam_10kb.tsv")).unwrap(),
            "0\t0\t1\t1.0\n1\t1\t1\t1.0\n"
        );
        // Other resolutions are not touched
        assert_eq!(
            fs::read_to_string(tmp.path().join("chr1_bam_5kb.tsv")).unwrap(),
            "1\t1\t1\t1.0\n0\t0\t1\t1.0\n"
        );
    }
}
