pub mod build;
pub mod chart;
pub mod config;
pub mod curve;
pub mod driver;
pub mod error;
pub mod host;
pub mod metrics;
pub mod orchestrator;
pub mod parser;
pub mod process;
pub mod schema;

use build::MpiCompiler;
use chart::SvgRenderer;
use config::BenchConfig;
use driver::MpiLauncher;
use error::BenchError;
use orchestrator::Orchestrator;
use schema::{AnalysisReport, BenchmarkRequest};

/// Runs one session with the MPI toolchain adapters and SVG charts.
pub fn run_benchmark(
    cfg: &BenchConfig,
    request: &BenchmarkRequest,
) -> Result<AnalysisReport, BenchError> {
    let compiler = MpiCompiler::new(&cfg.build);
    let launcher = MpiLauncher::new(&cfg.launch);
    let renderer = SvgRenderer::default();
    Orchestrator::new(cfg, &compiler, &launcher, &renderer).run_session(request)
}
