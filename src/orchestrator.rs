//! Benchmark session: build once, serial baseline, then each parallel count.
//!
//! Runs are strictly sequential. Concurrent launches would compete for the
//! cores being measured, and every parallel metric needs the serial time.

use crate::build::{build, Compiler};
use crate::chart::ChartRenderer;
use crate::config::{BenchConfig, ExecutionPolicy};
use crate::curve::{reference_chart, with_measured_overlay};
use crate::driver::Launcher;
use crate::error::BenchError;
use crate::metrics::compute_metrics;
use crate::parser::OutputParser;
use crate::schema::{AnalysisReport, BenchmarkRequest, ReportEntry, RunMeta, SkippedRun};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{info, warn};

pub const SCHEMA_VERSION: u32 = 1;

/// Worker count of the serial baseline.
pub const SERIAL_WORKERS: u32 = 1;

/// Puts the serial baseline first, keeps the rest in request order and drops
/// repeats.
pub fn normalize_worker_counts(counts: &[u32]) -> Result<Vec<u32>, BenchError> {
    if counts.is_empty() {
        return Err(BenchError::InvalidRequest(
            "worker_counts must not be empty".to_string(),
        ));
    }
    if counts.contains(&0) {
        return Err(BenchError::InvalidRequest(
            "worker_counts must be positive".to_string(),
        ));
    }

    let mut out = Vec::with_capacity(counts.len() + 1);
    out.push(SERIAL_WORKERS);
    for &n in counts {
        if !out.contains(&n) {
            out.push(n);
        }
    }
    Ok(out)
}

fn now_utc() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("unix:{secs}")
}

fn git_sha_short() -> Option<String> {
    // Best-effort: read from environment set by CI/build scripts.
    std::env::var("GIT_SHA")
        .ok()
        .or_else(|| std::env::var("GITHUB_SHA").ok())
        .map(|s| s.chars().take(12).collect())
}

fn sha256_hex(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    let digest: [u8; 32] = Sha256::digest(&bytes).into();
    Some(digest.iter().map(|b| format!("{b:02x}")).collect())
}

pub struct Orchestrator<'a, C: ?Sized, L: ?Sized, R: ?Sized> {
    compiler: &'a C,
    launcher: &'a L,
    renderer: &'a R,
    parser: OutputParser,
    source_extension: String,
    policy: ExecutionPolicy,
}

impl<'a, C, L, R> Orchestrator<'a, C, L, R>
where
    C: Compiler + ?Sized,
    L: Launcher + ?Sized,
    R: ChartRenderer + ?Sized,
{
    pub fn new(cfg: &BenchConfig, compiler: &'a C, launcher: &'a L, renderer: &'a R) -> Self {
        Self {
            compiler,
            launcher,
            renderer,
            parser: OutputParser::new(&cfg.parser),
            source_extension: cfg.build.source_extension.clone(),
            policy: cfg.session.on_execution_failure,
        }
    }

    pub fn with_policy(mut self, policy: ExecutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn run_session(&self, request: &BenchmarkRequest) -> Result<AnalysisReport, BenchError> {
        if request.problem_size == 0 {
            return Err(BenchError::InvalidRequest(
                "problem_size must be positive".to_string(),
            ));
        }
        let worker_counts = normalize_worker_counts(&request.worker_counts)?;
        info!(
            source = %request.source_file.display(),
            problem_size = request.problem_size,
            ?worker_counts,
            "starting benchmark session"
        );

        let executable = build(self.compiler, &request.source_file, &self.source_extension)?;

        let mut report = AnalysisReport {
            run: RunMeta {
                schema_version: SCHEMA_VERSION,
                bench_version: env!("CARGO_PKG_VERSION").to_string(),
                timestamp_utc: now_utc(),
                git_sha: git_sha_short(),
                source_file: request.source_file.clone(),
                source_sha256: sha256_hex(&request.source_file),
                executable: executable.clone(),
                problem_size: request.problem_size,
                worker_counts: worker_counts.clone(),
            },
            serial_time_reference: None,
            entries: Vec::with_capacity(worker_counts.len()),
            skipped: Vec::new(),
        };

        for &workers in &worker_counts {
            let raw = match self.launcher.launch(&executable, request.problem_size, workers) {
                Ok(raw) => raw,
                Err(failure) if workers != SERIAL_WORKERS && self.policy == ExecutionPolicy::Skip => {
                    warn!(
                        workers,
                        exit_code = ?failure.exit_code,
                        timed_out = failure.timed_out,
                        "run failed, skipping worker count"
                    );
                    report.skipped.push(SkippedRun {
                        worker_count: workers,
                        error: failure.to_string(),
                    });
                    continue;
                }
                Err(failure) => {
                    warn!(workers, completed = report.entries.len(), "run failed, aborting session");
                    return Err(BenchError::Execution {
                        failure,
                        partial: Box::new(report),
                    });
                }
            };

            let measurement = self.parser.parse(&raw.stdout, workers);
            let metrics = compute_metrics(&measurement, workers, report.serial_time_reference);

            // Captured once after the baseline; later runs never overwrite it.
            if workers == SERIAL_WORKERS {
                report.serial_time_reference =
                    measurement.serial_time.or_else(|| measurement.completion_time());
                if report.serial_time_reference.is_none() {
                    warn!("serial run reported no timing; parallel metrics will use defaults");
                }
            }

            let chart = with_measured_overlay(
                reference_chart(),
                metrics.fraction_parallel,
                (workers, metrics.speedup),
            );

            info!(
                workers,
                ranks_reported = measurement.per_worker_time.len(),
                speedup = metrics.speedup,
                efficiency = metrics.efficiency,
                fraction_parallel = metrics.fraction_parallel,
                "run complete"
            );

            report.entries.push(ReportEntry {
                worker_count: workers,
                measurement,
                metrics,
                wall_time_s: raw.wall_time.as_secs_f64(),
                chart: self.renderer.render(&chart),
            });
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::Chart;
    use crate::error::{BuildFailure, ExecutionFailure};
    use crate::schema::{Metrics, RawRunOutput};
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::path::PathBuf;

    #[derive(Default)]
    struct FakeCompiler {
        fail: bool,
        calls: Cell<usize>,
    }

    impl Compiler for FakeCompiler {
        fn compile(&self, _source: &Path, _executable: &Path) -> Result<(), BuildFailure> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(BuildFailure {
                    command: "mpicc summation.c -o summation".to_string(),
                    exit_code: Some(1),
                    stdout: String::new(),
                    stderr: "summation.c:12: error: 'rank' undeclared".to_string(),
                });
            }
            Ok(())
        }
    }

    /// Replays canned stdout per worker count; counts without output fail.
    #[derive(Default)]
    struct ScriptedLauncher {
        outputs: HashMap<u32, String>,
        launched: RefCell<Vec<(PathBuf, u64, u32)>>,
    }

    impl ScriptedLauncher {
        fn with(mut self, workers: u32, stdout: &str) -> Self {
            self.outputs.insert(workers, stdout.to_string());
            self
        }
    }

    impl Launcher for ScriptedLauncher {
        fn launch(
            &self,
            executable: &Path,
            problem_size: u64,
            worker_count: u32,
        ) -> Result<RawRunOutput, ExecutionFailure> {
            self.launched
                .borrow_mut()
                .push((executable.to_path_buf(), problem_size, worker_count));
            match self.outputs.get(&worker_count) {
                Some(stdout) => Ok(RawRunOutput {
                    stdout: stdout.clone(),
                    ..Default::default()
                }),
                None => Err(ExecutionFailure {
                    command: format!("mpirun -np {worker_count} ./summation {problem_size}"),
                    worker_count,
                    exit_code: Some(1),
                    stdout: String::new(),
                    stderr: "There are not enough slots available".to_string(),
                    timed_out: false,
                }),
            }
        }
    }

    struct LabelRenderer;

    impl ChartRenderer for LabelRenderer {
        fn render(&self, chart: &Chart) -> String {
            chart
                .series
                .iter()
                .map(|s| s.label.as_str())
                .collect::<Vec<_>>()
                .join("|")
        }
    }

    const SERIAL: &str = "Total Sum from 1 to 1000000: 500000500000\nSerial Run Time (seconds): 2.000000\n";
    const TWO: &str = "\
MPI run time for rank 0: 1.100000 seconds
Summation from 1 to 1000000 is: 500000500000
MPI run time for rank 1: 1.000000 seconds
";
    const FOUR: &str = "\
MPI run time for rank 2: 0.550000 seconds
MPI run time for rank 0: 0.600000 seconds
MPI run time for rank 3: 0.510000 seconds
MPI run time for rank 1: 0.590000 seconds
Summation from 1 to 1000000 is: 500000500000
";

    fn launcher() -> ScriptedLauncher {
        ScriptedLauncher::default()
            .with(1, SERIAL)
            .with(2, TWO)
            .with(4, FOUR)
    }

    fn request(workers: Vec<u32>) -> BenchmarkRequest {
        BenchmarkRequest::new("summation.c", 1_000_000, workers)
    }

    #[test]
    fn normalize_moves_serial_first() {
        assert_eq!(normalize_worker_counts(&[4, 1, 8]).unwrap(), vec![1, 4, 8]);
    }

    #[test]
    fn normalize_inserts_missing_serial() {
        assert_eq!(normalize_worker_counts(&[4, 8]).unwrap(), vec![1, 4, 8]);
    }

    #[test]
    fn normalize_keeps_order_and_drops_repeats() {
        assert_eq!(normalize_worker_counts(&[8, 2, 8, 1, 2, 4]).unwrap(), vec![1, 8, 2, 4]);
        assert_eq!(normalize_worker_counts(&[1]).unwrap(), vec![1]);
    }

    #[test]
    fn normalize_rejects_empty_and_zero() {
        assert!(matches!(normalize_worker_counts(&[]), Err(BenchError::InvalidRequest(_))));
        assert!(matches!(normalize_worker_counts(&[2, 0]), Err(BenchError::InvalidRequest(_))));
    }

    #[test]
    fn end_to_end_summation_session() {
        let compiler = FakeCompiler::default();
        let launcher = launcher();
        let cfg = BenchConfig::default();
        let orch = Orchestrator::new(&cfg, &compiler, &launcher, &LabelRenderer);

        let report = orch.run_session(&request(vec![1, 2, 4])).unwrap();

        assert_eq!(compiler.calls.get(), 1);
        assert_eq!(report.completed_worker_counts(), vec![1, 2, 4]);
        assert_eq!(report.serial_time_reference, Some(2.0));
        assert_eq!(report.run.executable, PathBuf::from("summation"));
        assert_eq!(report.run.worker_counts, vec![1, 2, 4]);

        let serial = &report.entries[0];
        assert_eq!(serial.metrics, Metrics::NO_PARALLELISM);
        assert_eq!(serial.measurement.serial_time, Some(2.0));

        let two = &report.entries[1].metrics;
        assert_eq!(two.speedup, 1.818182);
        assert_eq!(two.efficiency, 0.909091);

        let four = &report.entries[2].metrics;
        assert_eq!(four.speedup, 3.333333);
        assert_eq!(four.efficiency, 0.833333);

        for e in &report.entries {
            assert_eq!(e.measurement.total_computed_value, Some(500_000_500_000));
            assert!(e.chart.contains("Provided Program"));
            assert!(e.chart.contains(&format!("Measured (P={}", e.worker_count)));
        }

        let launched = launcher.launched.borrow();
        assert_eq!(
            launched.iter().map(|(_, _, n)| *n).collect::<Vec<_>>(),
            vec![1, 2, 4]
        );
        assert!(launched
            .iter()
            .all(|(exe, size, _)| exe == Path::new("summation") && *size == 1_000_000));
    }

    #[test]
    fn serial_baseline_runs_first_even_when_requested_last() {
        let compiler = FakeCompiler::default();
        let launcher = launcher();
        let cfg = BenchConfig::default();
        let report = Orchestrator::new(&cfg, &compiler, &launcher, &LabelRenderer)
            .run_session(&request(vec![4, 2]))
            .unwrap();

        assert_eq!(report.completed_worker_counts(), vec![1, 4, 2]);
        assert_eq!(report.entries[1].metrics.speedup, 3.333333);
    }

    #[test]
    fn build_failure_runs_nothing() {
        let compiler = FakeCompiler {
            fail: true,
            ..Default::default()
        };
        let launcher = launcher();
        let cfg = BenchConfig::default();
        let err = Orchestrator::new(&cfg, &compiler, &launcher, &LabelRenderer)
            .run_session(&request(vec![1, 2]))
            .unwrap_err();

        assert!(matches!(err, BenchError::Build(_)));
        assert!(launcher.launched.borrow().is_empty());
    }

    #[test]
    fn execution_failure_aborts_with_partial_report() {
        let compiler = FakeCompiler::default();
        let launcher = launcher();
        let cfg = BenchConfig::default();
        let err = Orchestrator::new(&cfg, &compiler, &launcher, &LabelRenderer)
            .run_session(&request(vec![1, 2, 16, 4]))
            .unwrap_err();

        match err {
            BenchError::Execution { failure, partial } => {
                assert_eq!(failure.worker_count, 16);
                assert_eq!(partial.completed_worker_counts(), vec![1, 2]);
            }
            other => panic!("unexpected error: {other}"),
        }
        // 4 is never attempted after the failure.
        assert_eq!(launcher.launched.borrow().len(), 3);
    }

    #[test]
    fn skip_policy_continues_past_failed_count() {
        let compiler = FakeCompiler::default();
        let launcher = launcher();
        let cfg = BenchConfig::default();
        let report = Orchestrator::new(&cfg, &compiler, &launcher, &LabelRenderer)
            .with_policy(ExecutionPolicy::Skip)
            .run_session(&request(vec![2, 16, 4]))
            .unwrap();

        assert_eq!(report.completed_worker_counts(), vec![1, 2, 4]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].worker_count, 16);
        assert!(report.skipped[0].error.contains("not enough slots"));
    }

    #[test]
    fn failed_serial_run_aborts_even_when_skipping() {
        let compiler = FakeCompiler::default();
        let launcher = ScriptedLauncher::default().with(2, TWO);
        let cfg = BenchConfig::default();
        let err = Orchestrator::new(&cfg, &compiler, &launcher, &LabelRenderer)
            .with_policy(ExecutionPolicy::Skip)
            .run_session(&request(vec![2]))
            .unwrap_err();

        assert!(matches!(err, BenchError::Execution { ref failure, .. } if failure.worker_count == 1));
        assert!(err.partial_report().unwrap().entries.is_empty());
    }

    #[test]
    fn parallel_run_without_timings_gets_fallback_metrics() {
        let compiler = FakeCompiler::default();
        let launcher = ScriptedLauncher::default()
            .with(1, SERIAL)
            .with(2, "Segmentation fault in rank 1\n");
        let cfg = BenchConfig::default();
        let report = Orchestrator::new(&cfg, &compiler, &launcher, &LabelRenderer)
            .run_session(&request(vec![2]))
            .unwrap();

        assert!(report.entries[1].measurement.per_worker_time.is_empty());
        assert_eq!(report.entries[1].metrics, Metrics::NO_PARALLELISM);
    }

    #[test]
    fn serial_reference_falls_back_to_rank_timing() {
        let compiler = FakeCompiler::default();
        let launcher = ScriptedLauncher::default()
            .with(1, "MPI run time for rank 0: 2.000000 seconds\n")
            .with(2, TWO);
        let cfg = BenchConfig::default();
        let report = Orchestrator::new(&cfg, &compiler, &launcher, &LabelRenderer)
            .run_session(&request(vec![2]))
            .unwrap();

        assert_eq!(report.serial_time_reference, Some(2.0));
        assert_eq!(report.entries[1].metrics.speedup, 1.818182);
    }

    #[test]
    fn serial_reference_is_not_overwritten_by_later_runs() {
        let compiler = FakeCompiler::default();
        let launcher = ScriptedLauncher::default()
            .with(1, SERIAL)
            .with(2, "Serial Run Time (seconds): 9.0\nMPI run time for rank 0: 1.0 seconds\n")
            .with(4, FOUR);
        let cfg = BenchConfig::default();
        let report = Orchestrator::new(&cfg, &compiler, &launcher, &LabelRenderer)
            .run_session(&request(vec![2, 4]))
            .unwrap();

        assert_eq!(report.serial_time_reference, Some(2.0));
        assert_eq!(report.entries[2].metrics.speedup, 3.333333);
    }

    #[test]
    fn invalid_requests_are_rejected_before_build() {
        let compiler = FakeCompiler::default();
        let launcher = launcher();
        let cfg = BenchConfig::default();
        let orch = Orchestrator::new(&cfg, &compiler, &launcher, &LabelRenderer);

        let zero_size = BenchmarkRequest::new("summation.c", 0, vec![1]);
        assert!(matches!(orch.run_session(&zero_size), Err(BenchError::InvalidRequest(_))));

        let no_ext = BenchmarkRequest::new("summation", 10, vec![1]);
        assert!(matches!(orch.run_session(&no_ext), Err(BenchError::InvalidRequest(_))));

        assert_eq!(compiler.calls.get(), 0);
    }

    #[test]
    fn sessions_are_repeatable() {
        let compiler = FakeCompiler::default();
        let launcher = launcher();
        let cfg = BenchConfig::default();
        let orch = Orchestrator::new(&cfg, &compiler, &launcher, &LabelRenderer);

        let a = orch.run_session(&request(vec![1, 2, 4])).unwrap();
        let b = orch.run_session(&request(vec![1, 2, 4])).unwrap();
        for (x, y) in a.entries.iter().zip(&b.entries) {
            assert_eq!(x.measurement, y.measurement);
            assert_eq!(x.metrics, y.metrics);
            assert_eq!(x.chart, y.chart);
        }
    }
}
