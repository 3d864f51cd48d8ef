//! Tool configuration.
//!
//! Resolution order (highest priority first):
//! 1. CLI flags (applied by the binary via [`CliOverrides`])
//! 2. Environment variables (`AMDAHL_BENCH_*`)
//! 3. `--config` TOML file
//! 4. Compiled defaults

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_COMPILER: &str = "AMDAHL_BENCH_COMPILER";
pub const ENV_LAUNCHER: &str = "AMDAHL_BENCH_LAUNCHER";
pub const ENV_TIMEOUT_SECS: &str = "AMDAHL_BENCH_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub compiler: String,
    /// Extra flags placed before the source file.
    pub flags: Vec<String>,
    /// Extension stripped from the source file to name the executable.
    pub source_extension: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            compiler: "mpicc".to_string(),
            flags: Vec::new(),
            source_extension: "c".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    pub launcher: String,
    /// Flags placed before the worker-count flag.
    pub args: Vec<String>,
    pub worker_flag: String,
    pub timeout_secs: u64,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            launcher: "mpirun".to_string(),
            args: vec!["--use-hwthread-cpus".to_string()],
            worker_flag: "-np".to_string(),
            timeout_secs: 600,
        }
    }
}

impl LaunchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Markers the output parser looks for. Matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub timing_marker: String,
    pub distributed_marker: String,
    pub serial_marker: String,
    pub total_markers: Vec<String>,
    /// Whitespace token position holding the worker rank on per-worker lines.
    pub rank_token_index: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            timing_marker: "time".to_string(),
            distributed_marker: "mpi".to_string(),
            serial_marker: "serial".to_string(),
            total_markers: vec!["summation".to_string(), "total sum".to_string()],
            rank_token_index: 5,
        }
    }
}

/// What the session does when a parallel launch fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPolicy {
    /// Stop at the first failed launch and return the partial report with the error.
    #[default]
    Abort,
    /// Log the failure, record it in the report, and move to the next worker count.
    Skip,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub on_execution_failure: ExecutionPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub build: BuildConfig,
    pub launch: LaunchConfig,
    pub parser: ParserConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub compiler: Option<String>,
    pub launcher: Option<String>,
    pub timeout_secs: Option<u64>,
    pub on_execution_failure: Option<ExecutionPolicy>,
}

impl BenchConfig {
    /// Defaults, then the file at `path`, then `AMDAHL_BENCH_*` variables,
    /// then `cli`. Validated once all layers are applied.
    pub fn load(path: Option<&Path>, cli: Option<&CliOverrides>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, cli, |key| std::env::var(key).ok())
    }

    /// [`BenchConfig::load`] with an explicit environment.
    pub fn load_with_env(
        path: Option<&Path>,
        cli: Option<&CliOverrides>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env_overrides(env)?;

        if let Some(cli) = cli {
            config.apply_cli_overrides(cli);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::Parse {
            path: "<string>".to_string(),
            message: e.to_string(),
        })
    }

    /// `lookup` abstracts the environment so tests don't mutate process state.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(compiler) = lookup(ENV_COMPILER) {
            self.build.compiler = compiler;
        }
        if let Some(launcher) = lookup(ENV_LAUNCHER) {
            self.launch.launcher = launcher;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            self.launch.timeout_secs = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                field: ENV_TIMEOUT_SECS.to_string(),
                message: format!("expected a whole number of seconds, got {raw:?}"),
            })?;
        }
        Ok(())
    }

    pub fn apply_cli_overrides(&mut self, cli: &CliOverrides) {
        if let Some(compiler) = &cli.compiler {
            self.build.compiler = compiler.clone();
        }
        if let Some(launcher) = &cli.launcher {
            self.launch.launcher = launcher.clone();
        }
        if let Some(secs) = cli.timeout_secs {
            self.launch.timeout_secs = secs;
        }
        if let Some(policy) = cli.on_execution_failure {
            self.session.on_execution_failure = policy;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, message: &str| ConfigError::Invalid {
            field: field.to_string(),
            message: message.to_string(),
        };

        if self.build.compiler.trim().is_empty() {
            return Err(invalid("build.compiler", "must not be empty"));
        }
        if self.build.source_extension.trim().is_empty() {
            return Err(invalid("build.source_extension", "must not be empty"));
        }
        if self.launch.launcher.trim().is_empty() {
            return Err(invalid("launch.launcher", "must not be empty"));
        }
        if self.launch.timeout_secs == 0 {
            return Err(invalid("launch.timeout_secs", "must be greater than zero"));
        }
        let p = &self.parser;
        if p.timing_marker.is_empty() || p.distributed_marker.is_empty() || p.serial_marker.is_empty() {
            return Err(invalid("parser", "markers must not be empty"));
        }
        if p.total_markers.iter().any(String::is_empty) {
            return Err(invalid("parser.total_markers", "markers must not be empty"));
        }
        Ok(())
    }
}
