//! Error taxonomy for matrix extraction.
//!
//! Each variant maps to one failure policy of the run:
//! configuration errors abort before any region is touched, data-load
//! errors skip a region, merge and I/O errors abort a region, and sort
//! errors only flag the post-pass for one file. A region over its time budget
//! is aborted like a failed merge.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while extracting a contact matrix.
#[derive(Error, Debug)]
pub enum MatrixError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Correction model error for region '{region}': {message}")]
    DataLoad { region: String, message: String },

    #[error("Merge error in {}: {message}", path.display())]
    Merge { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Sort error on {}: {message}", path.display())]
    Sort { path: PathBuf, message: String },

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Region '{region}' exceeded its time budget of {}s", budget.as_secs_f64())]
    Timeout { region: String, budget: Duration },
}

impl MatrixError {
    /// Short category name used in run summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            MatrixError::Config(_) => "config",
            MatrixError::DataLoad { .. } => "data-load",
            MatrixError::Merge { .. } => "merge",
            MatrixError::Io(_) => "io",
            MatrixError::Sort { .. } => "sort",
            MatrixError::Parse { .. } => "parse",
            MatrixError::Timeout { .. } => "timeout",
        }
    }

    /// Whether this error means the region was skipped rather than aborted.
    ///
    /// A region whose correction data cannot be loaded never reaches the merge,
    /// so nothing was attempted on its chunks.
    pub fn is_skip(&self) -> bool {
        matches!(self, MatrixError::DataLoad { .. })
    }

    pub(crate) fn merge(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        MatrixError::Merge {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn data_load(region: &str, message: impl Into<String>) -> Self {
        MatrixError::DataLoad {
            region: region.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MatrixError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MatrixError::merge("/tmp/_tmp_ab/chr1:0-100.tsv", "bad line 3");
        assert_eq!(
            err.to_string(),
            "Merge error in /tmp/_tmp_ab/chr1:0-100.tsv: bad line 3"
        );

        let err = MatrixError::data_load("chr2", "no decay entry");
        assert_eq!(
            err.to_string(),
            "Correction model error for region 'chr2': no decay entry"
        );
    }

    #[test]
    fn test_skip_classification() {
        assert!(MatrixError::data_load("chr1", "x").is_skip());
        assert!(!MatrixError::merge("a", "b").is_skip());
        assert!(!MatrixError::Config("bad".into()).is_skip());
        assert_eq!(MatrixError::Config("bad".into()).kind(), "config");

        let timeout = MatrixError::Timeout {
            region: "chr1".into(),
            budget: Duration::from_secs(2),
        };
        assert!(!timeout.is_skip());
        assert_eq!(timeout.to_string(), "Region 'chr1' exceeded its time budget of 2s");
    }
}
