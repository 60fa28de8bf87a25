//! Chunked contact input.
//!
//! The chunked scan writes each region's raw contacts into several chunk
//! files under `<tmpdir>/_tmp_<run_id>/`. This module locates those files,
//! parses them without allocation, and merges them lazily into one stream of
//! [`RawContact`]s. An in-memory channel source offers the same stream without
//! temp files.
//!
//! Temp artifacts are removed only through [`CompletedRun::cleanup`], which is
//! reachable only after a merge consumed every chunk without error.

pub mod channel;
pub mod layout;
pub mod merger;
pub mod parsing;

use std::sync::Arc;

use crate::error::Result;

pub use channel::{ChannelSource, ContactSender};
pub use layout::{ChunkDescriptor, ChunkRun, RunId};
pub use merger::{ChunkMerger, CompletedRun, MergeStats};
pub use parsing::{parse_chunk_line, parse_u64_fast, should_skip_line, ChunkLine};

/// One raw contact count between two region-local bins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawContact {
    pub chrom: Arc<str>,
    pub row: u64,
    pub col: u64,
    pub count: u64,
}

impl RawContact {
    pub fn new(chrom: Arc<str>, row: u64, col: u64, count: u64) -> Self {
        Self {
            chrom,
            row,
            col,
            count,
        }
    }
}

/// Any stream of raw contacts for one region.
///
/// Implemented by [`ChunkMerger`], [`ChannelSource`], and any other iterator
/// with the same item type.
pub trait ContactSource: Iterator<Item = Result<RawContact>> {}

impl<T: Iterator<Item = Result<RawContact>>> ContactSource for T {}
