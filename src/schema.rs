use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default program benchmarked when the caller does not name one.
pub const DEFAULT_SOURCE_FILE: &str = "summation.c";

fn default_source_file() -> PathBuf {
    PathBuf::from(DEFAULT_SOURCE_FILE)
}

/// One benchmark session as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkRequest {
    #[serde(default = "default_source_file")]
    pub source_file: PathBuf,
    pub problem_size: u64,
    pub worker_counts: Vec<u32>,
}

impl BenchmarkRequest {
    pub fn new(source_file: impl Into<PathBuf>, problem_size: u64, worker_counts: Vec<u32>) -> Self {
        Self {
            source_file: source_file.into(),
            problem_size,
            worker_counts,
        }
    }
}

/// Captured stdout of a single launch, plus what the driver observed around it.
#[derive(Debug, Clone, Default)]
pub struct RawRunOutput {
    pub stdout: String,
    pub stderr: String,
    pub wall_time: Duration,
}

/// Parsed result of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Elapsed seconds keyed by worker rank.
    pub per_worker_time: BTreeMap<u32, f64>,
    pub serial_time: Option<f64>,
    pub total_computed_value: Option<i64>,
}

impl Measurement {
    /// Straggler-bound completion time: the slowest worker's elapsed time.
    pub fn completion_time(&self) -> Option<f64> {
        self.per_worker_time.values().copied().reduce(f64::max)
    }
}

/// Derived scaling statistics for one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub speedup: f64,
    pub efficiency: f64,
    pub fraction_parallel: f64,
    pub fraction_serial: f64,
}

impl Metrics {
    /// "No evidence of parallelism": used for the serial baseline and for
    /// parallel runs that produced no usable timing.
    pub const NO_PARALLELISM: Metrics = Metrics {
        speedup: 1.0,
        efficiency: 1.0,
        fraction_parallel: 0.0,
        fraction_serial: 1.0,
    };
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    pub worker_count: u32,
    pub measurement: Measurement,
    pub metrics: Metrics,
    /// Wall-clock seconds of the whole launch as seen by the driver.
    pub wall_time_s: f64,
    /// Embeddable chart markup with this run overlaid on the reference curves.
    pub chart: String,
}

/// A worker count dropped under the `skip` execution policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedRun {
    pub worker_count: u32,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub schema_version: u32,
    pub bench_version: String,
    pub timestamp_utc: String,
    pub git_sha: Option<String>,
    pub source_file: PathBuf,
    pub source_sha256: Option<String>,
    pub executable: PathBuf,
    pub problem_size: u64,
    /// Worker counts in the order they were (or were to be) measured.
    pub worker_counts: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub run: RunMeta,
    pub serial_time_reference: Option<f64>,
    pub entries: Vec<ReportEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedRun>,
}

impl AnalysisReport {
    pub fn completed_worker_counts(&self) -> Vec<u32> {
        self.entries.iter().map(|e| e.worker_count).collect()
    }
}
