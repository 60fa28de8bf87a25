//! Chromosome sizes and the run-wide bin index.
//!
//! Parses .genome files (tab-delimited: chrom\tsize) and lays chromosomes out
//! as contiguous sections of global bin indices.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::bins::{BinRange, Resolution};
use crate::error::{MatrixError, Result};

/// Genome information containing chromosome sizes.
/// Preserves chromosome declaration order.
#[derive(Debug, Clone, Default)]
pub struct Genome {
    /// Map of chromosome name to size
    sizes: HashMap<String, u64>,
    /// Chromosome order (preserves input file order)
    order: Vec<String>,
}

impl Genome {
    /// Create an empty genome.
    pub fn new() -> Self {
        Self {
            sizes: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Load genome from a file.
    /// Format: tab-delimited with chrom\tsize per line
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Load genome from any buffered reader.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut genome = Self::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            let line = line.trim();

            // Skip empty lines and comments
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 2 {
                return Err(MatrixError::Parse {
                    line: line_num + 1,
                    message: "Genome file requires two columns: chrom and size".to_string(),
                });
            }

            let size: u64 = fields[1].parse().map_err(|_| MatrixError::Parse {
                line: line_num + 1,
                message: format!("Invalid chromosome size: {}", fields[1]),
            })?;

            genome.insert(fields[0].to_string(), size);
        }

        Ok(genome)
    }

    /// Get the size of a chromosome.
    #[inline]
    pub fn chrom_size(&self, chrom: &str) -> Option<u64> {
        self.sizes.get(chrom).copied()
    }

    /// Check if a chromosome exists.
    #[inline]
    pub fn has_chrom(&self, chrom: &str) -> bool {
        self.sizes.contains_key(chrom)
    }

    /// Get all chromosome names in order.
    pub fn chromosomes(&self) -> impl Iterator<Item = &String> {
        self.order.iter()
    }

    /// Chromosomes and sizes in declaration order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, u64)> {
        self.order
            .iter()
            .map(|chrom| (chrom.as_str(), self.sizes[chrom]))
    }

    /// Get number of chromosomes.
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Insert a chromosome size (appends to order if new).
    pub fn insert(&mut self, chrom: String, size: u64) {
        if !self.sizes.contains_key(&chrom) {
            self.order.push(chrom.clone());
        }
        self.sizes.insert(chrom, size);
    }
}

/// Global bin layout: one contiguous section per chromosome.
///
/// Section `i` starts where section `i - 1` ends, in declaration order, and
/// spans `ceil(length / resolution)` bins.
#[derive(Debug, Clone)]
pub struct GenomeIndex {
    resolution: Resolution,
    sections: Vec<(String, BinRange)>,
    lookup: HashMap<String, usize>,
    total_bins: u64,
}

impl GenomeIndex {
    /// Build the index from ordered `(name, length)` pairs.
    pub fn new<'a, I>(resolution: Resolution, chromosomes: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, u64)>,
    {
        let mut sections = Vec::new();
        let mut lookup = HashMap::new();
        let mut total = 0u64;

        for (name, length) in chromosomes {
            if lookup.contains_key(name) {
                return Err(MatrixError::Config(format!(
                    "Chromosome '{}' declared twice",
                    name
                )));
            }
            let bins = resolution.bins_for_length(length);
            lookup.insert(name.to_string(), sections.len());
            sections.push((name.to_string(), BinRange::new(total, total + bins)));
            total += bins;
        }

        Ok(Self {
            resolution,
            sections,
            lookup,
            total_bins: total,
        })
    }

    /// Build the index from a loaded genome file.
    pub fn from_genome(resolution: Resolution, genome: &Genome) -> Result<Self> {
        Self::new(resolution, genome.entries())
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Section of global bins for a chromosome.
    #[inline]
    pub fn section(&self, chrom: &str) -> Option<BinRange> {
        self.lookup.get(chrom).map(|&i| self.sections[i].1)
    }

    /// All sections in declaration order.
    pub fn sections(&self) -> impl Iterator<Item = (&str, BinRange)> {
        self.sections.iter().map(|(name, range)| (name.as_str(), *range))
    }

    /// Total number of bins across all chromosomes.
    #[inline]
    pub fn total_bins(&self) -> u64 {
        self.total_bins
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}
