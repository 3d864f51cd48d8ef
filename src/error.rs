//! Failure taxonomy for a benchmark session.
//!
//! Only build and execution failures abort work. Malformed program output is
//! never an error: the parser degrades to a partial measurement instead.

use crate::schema::AnalysisReport;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Stable error kind reported at the request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    BuildFailure,
    ExecutionFailure,
    InvalidRequest,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::BuildFailure => "BuildFailure",
            ErrorKind::ExecutionFailure => "ExecutionFailure",
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::Config => "Config",
        };
        f.write_str(s)
    }
}

fn format_exit(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

fn timeout_note(timed_out: &bool) -> &'static str {
    if *timed_out {
        " (timed out)"
    } else {
        ""
    }
}

/// The compiler collaborator could not produce an executable.
#[derive(Debug, Clone, thiserror::Error)]
#[error(
    "Build failed: {command}\nExit code: {}\n\n--- STDOUT ---\n{stdout}\n--- STDERR ---\n{stderr}\n",
    format_exit(.exit_code)
)]
pub struct BuildFailure {
    pub command: String,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// A single launch exited non-zero, could not be spawned, or timed out.
#[derive(Debug, Clone, thiserror::Error)]
#[error(
    "Command failed: {command}\nWorkers: {worker_count}\nExit code: {}{}\n\n--- STDOUT ---\n{stdout}\n--- STDERR ---\n{stderr}\n",
    format_exit(.exit_code),
    timeout_note(.timed_out)
)]
pub struct ExecutionFailure {
    pub command: String,
    pub worker_count: u32,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid config value for {field}: {message}")]
    Invalid { field: String, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Build(#[from] BuildFailure),

    /// Carries every entry measured before the failing worker count.
    #[error("{failure}")]
    Execution {
        failure: ExecutionFailure,
        partial: Box<AnalysisReport>,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BenchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BenchError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            BenchError::Build(_) => ErrorKind::BuildFailure,
            BenchError::Execution { .. } => ErrorKind::ExecutionFailure,
            BenchError::Config(_) => ErrorKind::Config,
        }
    }

    pub fn partial_report(&self) -> Option<&AnalysisReport> {
        match self {
            BenchError::Execution { partial, .. } => Some(partial.as_ref()),
            _ => None,
        }
    }
}

/// Structured failure payload handed back across the request boundary.
#[derive(Debug, Serialize)]
pub struct ErrorResponse<'a> {
    pub kind: ErrorKind,
    pub message: String,
    pub completed_worker_counts: Vec<u32>,
    pub partial_report: Option<&'a AnalysisReport>,
}

impl<'a> From<&'a BenchError> for ErrorResponse<'a> {
    fn from(err: &'a BenchError) -> Self {
        let partial_report = err.partial_report();
        Self {
            kind: err.kind(),
            message: err.to_string(),
            completed_worker_counts: partial_report
                .map(AnalysisReport::completed_worker_counts)
                .unwrap_or_default(),
            partial_report,
        }
    }
}
