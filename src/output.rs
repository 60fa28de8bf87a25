//! Matrix output files.
//!
//! One file per region, named `<region>_bam_<kb>kb.tsv`, with one
//! `row\tcol\traw\tnormalized` line per entry. Integers are formatted with
//! itoa and normalized values with ryu, whose shortest representation
//! round-trips to the same `f64`.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::bins::Resolution;
use crate::error::{MatrixError, Result};
use crate::normalize::MatrixEntry;

/// Output buffer size (2MB).
const BUF_SIZE: usize = 2 * 1024 * 1024;

/// Suffix shared by every matrix file of a resolution.
pub fn matrix_suffix(resolution: Resolution) -> String {
    format!("_bam_{}kb.tsv", resolution.kb())
}

/// File name of a region's matrix.
pub fn matrix_file_name(region: &str, resolution: Resolution) -> String {
    format!("{}{}", region, matrix_suffix(resolution))
}

/// Entry formatter over any writer.
pub struct EntryWriter<W: Write> {
    writer: BufWriter<W>,
    itoa_buf: itoa::Buffer,
    ryu_buf: ryu::Buffer,
    entries: usize,
}

impl<W: Write> EntryWriter<W> {
    pub fn new(output: W) -> Self {
        Self::with_capacity(BUF_SIZE, output)
    }

    pub fn with_capacity(capacity: usize, output: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(capacity, output),
            itoa_buf: itoa::Buffer::new(),
            ryu_buf: ryu::Buffer::new(),
            entries: 0,
        }
    }

    /// Write one `row\tcol\traw\tnormalized` line.
    #[inline]
    pub fn write_entry(&mut self, entry: &MatrixEntry) -> Result<()> {
        self.writer.write_all(self.itoa_buf.format(entry.row).as_bytes())?;
        self.writer.write_all(b"\t")?;
        self.writer.write_all(self.itoa_buf.format(entry.col).as_bytes())?;
        self.writer.write_all(b"\t")?;
        self.writer.write_all(self.itoa_buf.format(entry.raw).as_bytes())?;
        self.writer.write_all(b"\t")?;
        self.writer
            .write_all(self.ryu_buf.format(entry.normalized).as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.entries += 1;
        Ok(())
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| MatrixError::Io(e.into_error()))
    }
}

/// Writer for one region's matrix file.
///
/// Entries go to a temp file in the output directory, renamed over the final
/// path by [`finish`](Self::finish). Dropping the writer without finishing
/// leaves no file behind.
pub struct MatrixWriter {
    inner: EntryWriter<NamedTempFile>,
    path: PathBuf,
}

impl MatrixWriter {
    /// Open the matrix file of `region`, creating `outdir` if needed.
    pub fn create(outdir: &Path, region: &str, resolution: Resolution) -> Result<Self> {
        fs::create_dir_all(outdir)?;
        let path = outdir.join(matrix_file_name(region, resolution));
        let staged = NamedTempFile::new_in(outdir)?;
        Ok(Self {
            inner: EntryWriter::new(staged),
            path,
        })
    }

    #[inline]
    pub fn write_entry(&mut self, entry: &MatrixEntry) -> Result<()> {
        self.inner.write_entry(entry)
    }

    pub fn entries(&self) -> usize {
        self.inner.entries()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and move the file into place. Returns the final path.
    pub fn finish(self) -> Result<PathBuf> {
        let staged = self.inner.into_inner()?;
        staged.as_file().sync_all()?;
        staged
            .persist(&self.path)
            .map_err(|e| MatrixError::Io(e.error))?;
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(row: u64, col: u64, raw: u64, normalized: f64) -> MatrixEntry {
        MatrixEntry {
            row,
            col,
            raw,
            normalized,
        }
    }

    #[test]
    fn test_file_names() {
        let res = Resolution::new(100_000).unwrap();
        assert_eq!(matrix_file_name("chr1", res), "chr1_bam_100kb.tsv");
        assert_eq!(matrix_suffix(Resolution::new(500).unwrap()), "_bam_0kb.tsv");
    }

    #[test]
    fn test_entry_format() {
        let mut writer = EntryWriter::new(Vec::new());
        writer.write_entry(&entry(0, 2, 10, 5.0)).unwrap();
        writer.write_entry(&entry(1, 1, 5, 0.123456789)).unwrap();
        assert_eq!(writer.entries(), 2);
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(out, "0\t2\t10\t5.0\n1\t1\t5\t0.123456789\n");
    }

    #[test]
    fn test_normalized_round_trips() {
        let values = [1.0 / 3.0, 2.5e-12, 12345.678901234567, f64::MIN_POSITIVE];
        let mut writer = EntryWriter::new(Vec::new());
        for (i, &v) in values.iter().enumerate() {
            writer.write_entry(&entry(i as u64, i as u64, 1, v)).unwrap();
        }
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        for (line, &v) in out.lines().zip(values.iter()) {
            let parsed: f64 = line.rsplit('\t').next().unwrap().parse().unwrap();
            assert_eq!(parsed, v);
        }
    }

    #[test]
    fn test_matrix_writer_creates_dir_and_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let outdir = tmp.path().join("nested").join("out");
        let res = Resolution::new(10_000).unwrap();

        let mut writer = MatrixWriter::create(&outdir, "chr1", res).unwrap();
        writer.write_entry(&entry(0, 2, 10, 5.0)).unwrap();
        let path = writer.finish().unwrap();

        assert_eq!(path, outdir.join("chr1_bam_10kb.tsv"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "0\t2\t10\t5.0\n");
        assert_eq!(fs::read_dir(&outdir).unwrap().count(), 1);
    }

    #[test]
    fn test_unfinished_writer_leaves_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let res = Resolution::new(10_000).unwrap();
        {
            let mut writer = MatrixWriter::create(tmp.path(), "chr2", res).unwrap();
            writer.write_entry(&entry(0, 0, 1, 1.0)).unwrap();
        }
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_create_fails_when_outdir_is_file() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("out");
        fs::write(&blocker, "").unwrap();
        let res = Resolution::new(10_000).unwrap();
        assert!(matches!(
            MatrixWriter::create(&blocker, "chr1", res),
            Err(MatrixError::Io(_))
        ));
    }
}
