//! Integration tests for the extract pipeline.
//!
//! Tests verify:
//! 1. Corrected, upper-triangle, sorted output for a known region
//! 2. Chunk directories are removed after success and kept after a failed merge
//! 3. Pass-through mode writes every surviving contact once with normalized == raw
//! 4. A failing region does not stop the others
//! 5. The CLI exit code reflects region failures

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use hicmat::prelude::*;
use hicmat::report::RegionStatus;
use tempfile::TempDir;

const RUN: &str = "a1b2c3";

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("genome.txt"), "chr1\t35000\nchr2\t20000\n").unwrap();
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn run_dir(&self) -> PathBuf {
        self.path().join(format!("_tmp_{}", RUN))
    }

    fn out(&self) -> PathBuf {
        self.path().join("out")
    }

    fn chunk(&self, name: &str, content: &str) {
        fs::create_dir_all(self.run_dir()).unwrap();
        fs::write(self.run_dir().join(name), content).unwrap();
    }

    fn model(&self, json: &str) -> PathBuf {
        let path = self.path().join("biases.json");
        fs::write(&path, json).unwrap();
        path
    }

    fn config(&self) -> RunConfig {
        RunConfig::new(
            self.path().join("sample.bam"),
            self.path().join("genome.txt"),
            Resolution::new(10_000).unwrap(),
            self.out(),
        )
        .with_tmpdir(self.path())
        .with_run_id(RunId::new(RUN).unwrap())
    }

    fn matrix(&self, region: &str) -> String {
        fs::read_to_string(self.out().join(format!("{}_bam_10kb.tsv", region))).unwrap()
    }
}

const SCENARIO_MODEL: &str = r#"{
    "resolution": 10000,
    "biases": {"0": 1.0, "1": 1.0, "2": 1.0, "3": 1.0},
    "decay": {"chr1": {"0": 1.0, "2": 2.0}},
    "badcol": {"3": true}
}"#;

#[test]
fn test_scenario_output() {
    let fx = Fixture::new();
    // Deliberately out of order across chunks; the sort pass fixes it
    fx.chunk("chr1:0-20000.tsv", "1\t1\t5\n2\t0\t10\n");
    fx.chunk("chr1:20000-35000.tsv", "0\t2\t10\n0\t3\t8\n");
    let model = fx.model(SCENARIO_MODEL);

    let summary = ExtractCommand::new(fx.config().with_regions(["chr1"]).with_biases(&model))
        .run()
        .unwrap();

    assert!(summary.is_success(), "{}", summary);
    assert_eq!(summary.sorted, 1);
    assert_eq!(fx.matrix("chr1"), "0\t2\t10\t5.0\n1\t1\t5\t5.0\n");
}

#[test]
fn test_cleanup_after_success() {
    let fx = Fixture::new();
    fx.chunk("chr1:0-35000.tsv", "0\t1\t2\n");

    let summary = ExtractCommand::new(fx.config().with_regions(["chr1"]))
        .run()
        .unwrap();

    assert!(summary.is_success(), "{}", summary);
    assert!(!fx.run_dir().exists());
}

#[test]
fn test_chunks_kept_after_failed_merge() {
    let fx = Fixture::new();
    fx.chunk("chr1:0-20000.tsv", "0\t1\t2\n");
    fx.chunk("chr1:20000-35000.tsv", "0\tnot-a-bin\t2\n");

    let summary = ExtractCommand::new(fx.config().with_regions(["chr1"]))
        .run()
        .unwrap();

    assert!(matches!(
        summary.status("chr1"),
        Some(RegionStatus::Failed { kind: "merge", .. })
    ));
    assert!(fx.run_dir().join("chr1:0-20000.tsv").exists());
    assert!(fx.run_dir().join("chr1:20000-35000.tsv").exists());
    assert!(!fx.out().join("chr1_bam_10kb.tsv").exists());
}

#[test]
fn test_pass_through_every_contact_once() {
    let fx = Fixture::new();
    let mut chunk = String::new();
    let mut expected = Vec::new();
    for j in 0..4u64 {
        for k in 0..4u64 {
            let count = j * 4 + k + 1;
            chunk.push_str(&format!("{}\t{}\t{}\n", j, k, count));
            if k >= j {
                expected.push(format!("{}\t{}\t{}\t{}.0", j, k, count, count));
            }
        }
    }
    fx.chunk("chr1:0-35000.tsv", &chunk);

    let summary = ExtractCommand::new(fx.config().with_regions(["chr1"]))
        .run()
        .unwrap();
    assert!(summary.is_success(), "{}", summary);

    let lines: Vec<String> = fx.matrix("chr1").lines().map(String::from).collect();
    assert_eq!(lines, expected);
}

#[test]
fn test_failing_region_does_not_stop_others() {
    let fx = Fixture::new();
    // chr1's chunk has a column bin outside its 4-bin window
    fx.chunk("chr1:0-35000.tsv", "0\t9\t1\n");
    fx.chunk("chr2:0-20000.tsv", "0\t1\t3\n");

    let summary = ExtractCommand::new(fx.config()).run().unwrap();

    assert_eq!(summary.count_failed(), 1);
    assert_eq!(summary.count_succeeded(), 1);
    assert!(!summary.is_success());
    assert_eq!(fx.matrix("chr2"), "4\t5\t3\t3.0\n");
    // chr2's cleanup leaves chr1's chunks in the shared run directory
    assert!(fx.run_dir().join("chr1:0-35000.tsv").exists());
}

#[test]
fn test_region_without_decay_is_skipped() {
    let fx = Fixture::new();
    fx.chunk("chr1:0-35000.tsv", "0\t0\t1\n");
    fx.chunk("chr2:0-20000.tsv", "0\t1\t3\n");
    let model = fx.model(SCENARIO_MODEL);

    let summary = ExtractCommand::new(fx.config().with_biases(&model))
        .run()
        .unwrap();

    assert!(matches!(summary.status("chr1"), Some(RegionStatus::Succeeded { .. })));
    assert!(matches!(summary.status("chr2"), Some(RegionStatus::Skipped { .. })));
    assert!(fx.run_dir().join("chr2:0-20000.tsv").exists());
}

#[test]
fn test_resolution_mismatch_skips() {
    let fx = Fixture::new();
    fx.chunk("chr1:0-35000.tsv", "0\t0\t1\n");
    let model =
        fx.model(r#"{"resolution": 5000, "biases": {"0": 1.0}, "decay": {"chr1": {"0": 1.0}}}"#);

    let summary = ExtractCommand::new(fx.config().with_regions(["chr1"]).with_biases(&model))
        .run()
        .unwrap();

    assert_eq!(summary.count_skipped(), 1);
}

#[test]
fn test_config_error_is_fatal() {
    let fx = Fixture::new();
    let err = ExtractCommand::new(fx.config().with_regions(["chrUn"]))
        .run()
        .unwrap_err();
    assert_eq!(err.kind(), "config");
}

#[test]
fn test_cli_exit_codes() {
    let fx = Fixture::new();
    fx.chunk("chr1:0-35000.tsv", "0\t1\t2\n");

    let ok = Command::new(env!("CARGO_BIN_EXE_hicmat"))
        .arg("extract")
        .arg("--bam")
        .arg(fx.path().join("sample.bam"))
        .arg("--genome")
        .arg(fx.path().join("genome.txt"))
        .args(["--resolution", "10000", "--region", "chr1", "--run-id", RUN])
        .arg("--out")
        .arg(fx.out())
        .arg("--tmpdir")
        .arg(fx.path())
        .output()
        .unwrap();
    assert!(ok.status.success(), "{}", String::from_utf8_lossy(&ok.stderr));
    assert!(String::from_utf8_lossy(&ok.stderr).contains("Regions: 1 succeeded"));

    // chr2 has no chunks: the run directory is gone, so the merge fails
    let failed = Command::new(env!("CARGO_BIN_EXE_hicmat"))
        .arg("extract")
        .arg("--bam")
        .arg(fx.path().join("sample.bam"))
        .arg("--genome")
        .arg(fx.path().join("genome.txt"))
        .args(["--resolution", "10000", "--region", "chr2", "--run-id", RUN])
        .arg("--out")
        .arg(fx.out())
        .arg("--tmpdir")
        .arg(fx.path())
        .output()
        .unwrap();
    assert_eq!(failed.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&failed.stderr).contains("failed"));

    let bad_config = Command::new(env!("CARGO_BIN_EXE_hicmat"))
        .args(["sort", "--resolution", "0", "--out"])
        .arg(fx.out())
        .output()
        .unwrap();
    assert_eq!(bad_config.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&bad_config.stderr).starts_with("Error:"));
}
