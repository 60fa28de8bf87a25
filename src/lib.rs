// Clippy allows for the whole crate
#![allow(clippy::too_many_arguments)]

//! hicmat: normalized Hi-C contact matrices from chunked scan output
//!
//! This library merges the per-chunk contact files left by a parallel scan of
//! an alignment file, applies bias and distance-decay correction, and writes
//! one sparse upper-triangle matrix per region, sorted by `(row, col)`.
//!
//! # Features
//!
//! - **Lazy merging**: chunk files are streamed line by line
//! - **Per-region isolation**: one failing region never stops the others
//! - **Safe cleanup**: chunk directories are removed only after the matrix is written
//! - **Parallel sort pass**: radix sort over mmapped files, external merge for large ones
//!
//! # Example
//!
//! ```rust,no_run
//! use hicmat::{bins::Resolution, commands::ExtractCommand, config::RunConfig};
//!
//! let config = RunConfig::new(
//!     "sample.bam",
//!     "genome.txt",
//!     Resolution::new(100_000).unwrap(),
//!     "matrices/",
//! )
//! .with_biases("biases.json");
//!
//! let summary = ExtractCommand::new(config).run().unwrap();
//! eprintln!("{}", summary);
//! ```

pub mod bins;
pub mod chunks;
pub mod commands;
pub mod config;
pub mod correction;
pub mod error;
pub mod filter;
pub mod genome;
pub mod normalize;
pub mod output;
pub mod report;

// Re-export commonly used types
pub use bins::{BinBounds, BinRange, Resolution};
pub use error::{MatrixError, Result};
pub use genome::{Genome, GenomeIndex};
pub use normalize::MatrixEntry;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::bins::{BinBounds, BinRange, Resolution};
    pub use crate::chunks::{ChannelSource, ChunkRun, ContactSource, RawContact, RunId};
    pub use crate::commands::{ExtractCommand, MatrixSortCommand};
    pub use crate::config::{RunConfig, Window};
    pub use crate::correction::{CorrectionContext, CorrectionModel};
    pub use crate::error::{MatrixError, Result};
    pub use crate::filter::{FilterCategory, FilterMask};
    pub use crate::genome::{Genome, GenomeIndex};
    pub use crate::normalize::{MatrixEntry, Normalizer};
    pub use crate::output::MatrixWriter;
    pub use crate::report::RunSummary;
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_basic_workflow() {
        use crate::prelude::*;

        let genome = Genome::from_reader("chr1\t35000\nchr2\t20000\n".as_bytes()).unwrap();
        let index = GenomeIndex::from_genome(Resolution::new(10_000).unwrap(), &genome).unwrap();
        let section = index.section("chr2").unwrap();
        assert_eq!(section, BinRange::new(4, 6));

        let correction = CorrectionContext::PassThrough;
        let bounds = BinBounds::whole(section);
        let region = correction.load("chr2", &bounds).unwrap();
        let mut normalizer = Normalizer::new(&region, &bounds);

        let contact = RawContact::new("chr2".into(), 0, 1, 3);
        let entry = normalizer.normalize(&contact).unwrap();
        assert_eq!(
            entry,
            MatrixEntry {
                row: 4,
                col: 5,
                raw: 3,
                normalized: 3.0
            }
        );
    }
}
