use amdahl_scaling_bench::chart::{ChartRenderer, SvgRenderer};
use amdahl_scaling_bench::config::{BenchConfig, CliOverrides, ExecutionPolicy};
use amdahl_scaling_bench::curve;
use amdahl_scaling_bench::error::{BenchError, ErrorKind, ErrorResponse};
use amdahl_scaling_bench::host;
use amdahl_scaling_bench::run_benchmark;
use amdahl_scaling_bench::schema::{BenchmarkRequest, DEFAULT_SOURCE_FILE};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "AMDAHL_BENCH_LOG";

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a program and measure it at each worker count.
    Analyze {
        /// Source file to compile; the executable is named after it.
        #[arg(long, short, value_name = "FILE", default_value = DEFAULT_SOURCE_FILE)]
        source: PathBuf,

        /// Workload parameter passed to the executable.
        #[arg(long, short = 'n', default_value_t = 10_000_000)]
        problem_size: u64,

        /// Worker counts to measure. The serial baseline (1) always runs first.
        #[arg(long, short, value_delimiter = ',', num_args = 1.., default_values_t = [1u32, 2, 4])]
        workers: Vec<u32>,

        /// Compiler to invoke instead of the configured one.
        #[arg(long)]
        compiler: Option<String>,

        /// Launcher to invoke instead of the configured one.
        #[arg(long)]
        launcher: Option<String>,

        /// Per-launch timeout in seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// What to do when a parallel run fails.
        #[arg(long, value_enum)]
        on_failure: Option<ExecutionPolicy>,
    },

    /// Number of usable worker slots on this host.
    Cores,

    /// Render the generic Amdahl's Law curve family without running anything.
    Curve,
}

#[derive(Parser, Debug)]
#[command(name = "amdahl-scaling-bench")]
#[command(about = "Strong-scaling benchmark runner with Amdahl's Law analysis (JSON output)")]
struct Args {
    /// TOML config file.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Where to write the output. If omitted, prints to stdout.
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    cmd: Command,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn emit(out: &Option<PathBuf>, body: &str) -> io::Result<()> {
    match out {
        Some(path) => fs::write(path, body),
        None => {
            println!("{body}");
            Ok(())
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> io::Result<String> {
    serde_json::to_string_pretty(value).map_err(io::Error::other)
}

fn fail(out: &Option<PathBuf>, err: &BenchError) -> ExitCode {
    error!(kind = %err.kind(), "{err}");
    let body = to_json(&ErrorResponse::from(err));
    if let Err(e) = body.and_then(|b| emit(out, &b)) {
        error!("failed to write error response: {e}");
    }
    match err.kind() {
        ErrorKind::Config | ErrorKind::InvalidRequest => ExitCode::from(2),
        ErrorKind::BuildFailure | ErrorKind::ExecutionFailure => ExitCode::from(1),
    }
}

#[derive(Serialize)]
struct CoresResponse {
    cores: usize,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_json);

    let result = match args.cmd {
        Command::Cores => to_json(&CoresResponse {
            cores: host::available_worker_slots(),
        }),
        Command::Curve => Ok(SvgRenderer::default().render(&curve::reference_chart())),
        Command::Analyze {
            source,
            problem_size,
            workers,
            compiler,
            launcher,
            timeout_secs,
            on_failure,
        } => {
            let cli = CliOverrides {
                compiler,
                launcher,
                timeout_secs,
                on_execution_failure: on_failure,
            };
            let cfg = match BenchConfig::load(args.config.as_deref(), Some(&cli)) {
                Ok(cfg) => cfg,
                Err(e) => return fail(&args.out, &BenchError::from(e)),
            };
            let request = BenchmarkRequest::new(source, problem_size, workers);
            match run_benchmark(&cfg, &request) {
                Ok(report) => to_json(&report),
                Err(e) => return fail(&args.out, &e),
            }
        }
    };

    match result.and_then(|body| emit(&args.out, &body)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("failed to write output: {e}");
            ExitCode::FAILURE
        }
    }
}
