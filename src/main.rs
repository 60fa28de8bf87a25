//! hicmat: normalized Hi-C contact matrices from chunked scan output
//!
//! Usage: hicmat <COMMAND> [OPTIONS]

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::info;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use hicmat::bins::Resolution;
use hicmat::chunks::RunId;
use hicmat::commands::{ExtractCommand, MatrixSortCommand};
use hicmat::config::{RunConfig, Window};
use hicmat::error::Result;
use hicmat::filter::FilterMask;
use hicmat::report::RunSummary;

#[derive(Parser)]
#[command(name = "hicmat")]
#[command(version)]
#[command(
    about = "Normalized Hi-C contact matrices from chunked alignment scans",
    long_about = None
)]
struct Cli {
    /// Number of threads to use (default: number of CPUs)
    #[arg(long, short = 't', global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge chunk files, normalize, and write one matrix per region
    Extract {
        /// Alignment file the chunked scan read
        #[arg(long = "bam")]
        bam: PathBuf,

        /// Genome file (chrom<TAB>length) in alignment header order
        #[arg(short = 'g', long)]
        genome: PathBuf,

        /// Bin width in base pairs
        #[arg(short, long)]
        resolution: u64,

        /// Output directory
        #[arg(short, long = "out")]
        out: PathBuf,

        /// Correction model (JSON); raw counts are written without it
        #[arg(short, long)]
        biases: Option<PathBuf>,

        /// Directory holding the _tmp_<run_id> chunk directories
        #[arg(long, default_value = ".")]
        tmpdir: PathBuf,

        /// Run identifier of the chunked scan (derived per region if omitted)
        #[arg(long)]
        run_id: Option<String>,

        /// Region to extract (repeatable; default: every chromosome)
        #[arg(long = "region")]
        regions: Vec<String>,

        /// Row window start (bp)
        #[arg(long)]
        start1: Option<u64>,

        /// Row window end (bp)
        #[arg(long)]
        end1: Option<u64>,

        /// Column window start (bp)
        #[arg(long)]
        start2: Option<u64>,

        /// Column window end (bp)
        #[arg(long)]
        end2: Option<u64>,

        /// Excluded filter categories: names or numbers, comma-separated, or mask:<int>
        #[arg(long, value_parser = FilterMask::parse_list)]
        filter_exclude: Option<FilterMask>,

        /// Keep chunk directories after a successful region
        #[arg(long)]
        keep_temp: bool,

        /// Skip the sort pass
        #[arg(long)]
        no_sort: bool,

        /// Wall-clock budget per region, in seconds
        #[arg(long)]
        region_timeout: Option<u64>,
    },

    /// Sort every matrix of a resolution in place by (row, col)
    Sort {
        /// Output directory holding the matrices
        #[arg(short, long = "out")]
        out: PathBuf,

        /// Bin width in base pairs
        #[arg(short, long)]
        resolution: u64,

        /// Files at or above this many MB are sorted externally
        #[arg(long, default_value = "1024")]
        memory_mb: u64,
    },
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Configure thread pool if --threads specified
    if let Some(n) = cli.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
        {
            eprintln!("Error: Failed to initialize thread pool: {}", e);
            process::exit(1);
        }
    }

    let result = match cli.command {
        Commands::Extract {
            bam,
            genome,
            resolution,
            out,
            biases,
            tmpdir,
            run_id,
            regions,
            start1,
            end1,
            start2,
            end2,
            filter_exclude,
            keep_temp,
            no_sort,
            region_timeout,
        } => run_extract(
            bam,
            genome,
            resolution,
            out,
            biases,
            tmpdir,
            run_id,
            regions,
            Window {
                start1,
                end1,
                start2,
                end2,
            },
            filter_exclude,
            keep_temp,
            no_sort,
            region_timeout,
        ),

        Commands::Sort {
            out,
            resolution,
            memory_mb,
        } => run_sort(out, resolution, memory_mb),
    };

    match result {
        Ok(summary) => {
            eprintln!("{}", summary);
            if !summary.is_success() {
                process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run_extract(
    bam: PathBuf,
    genome: PathBuf,
    resolution: u64,
    out: PathBuf,
    biases: Option<PathBuf>,
    tmpdir: PathBuf,
    run_id: Option<String>,
    regions: Vec<String>,
    window: Window,
    filter_exclude: Option<FilterMask>,
    keep_temp: bool,
    no_sort: bool,
    region_timeout: Option<u64>,
) -> Result<RunSummary> {
    let mut config = RunConfig::new(bam, genome, Resolution::new(resolution)?, out)
        .with_tmpdir(tmpdir)
        .with_regions(regions)
        .with_window(window)
        .with_filter(filter_exclude.unwrap_or_default())
        .with_keep_temp(keep_temp)
        .with_sort(!no_sort);

    if let Some(path) = biases {
        config = config.with_biases(path);
    }
    if let Some(id) = run_id {
        config = config.with_run_id(RunId::new(id)?);
    }
    if let Some(secs) = region_timeout {
        config = config.with_region_timeout(Duration::from_secs(secs));
    }

    ExtractCommand::new(config).run()
}

fn run_sort(out: PathBuf, resolution: u64, memory_mb: u64) -> Result<RunSummary> {
    let resolution = Resolution::new(resolution)?;
    let cmd = MatrixSortCommand::new().with_memory_limit(memory_mb.saturating_mul(1024 * 1024));

    info!("Sorting matrices in {}", out.display());
    let outcomes = cmd.sort_outputs(&out, resolution)?;

    let mut summary = RunSummary::new();
    summary.record_sort(&outcomes);
    Ok(summary)
}
