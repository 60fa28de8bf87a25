//! Command implementations for hicmat.

pub mod extract;
pub mod sort;

pub use extract::{stream_contacts, write_region, Deadline, ExtractCommand, RegionStats};
pub use sort::{matrix_files, MatrixSortCommand, MatrixSortStats, SortOutcome};
