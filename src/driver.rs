//! Launching the compiled program under N workers.

use crate::config::LaunchConfig;
use crate::error::ExecutionFailure;
use crate::process::{render_command, run_captured};
use crate::schema::RawRunOutput;
use std::path::{Component, Path};
use std::time::Duration;
use tracing::debug;

/// The launch collaborator. Blocks until the run finishes; never retries.
pub trait Launcher {
    fn launch(
        &self,
        executable: &Path,
        problem_size: u64,
        worker_count: u32,
    ) -> Result<RawRunOutput, ExecutionFailure>;
}

/// `mpirun`-style launcher: `<launcher> <args..> <worker_flag> N <exe> <size>`.
#[derive(Debug, Clone)]
pub struct MpiLauncher {
    launcher: String,
    args: Vec<String>,
    worker_flag: String,
    timeout: Duration,
}

/// Bare names like `summation` would be looked up on `PATH`; anchor them to
/// the working directory.
fn runnable(executable: &Path) -> String {
    let mut components = executable.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => format!("./{}", executable.display()),
        _ => executable.display().to_string(),
    }
}

impl MpiLauncher {
    pub fn new(cfg: &LaunchConfig) -> Self {
        Self {
            launcher: cfg.launcher.clone(),
            args: cfg.args.clone(),
            worker_flag: cfg.worker_flag.clone(),
            timeout: cfg.timeout(),
        }
    }

    fn args(&self, executable: &Path, problem_size: u64, worker_count: u32) -> Vec<String> {
        let mut args = self.args.clone();
        args.push(self.worker_flag.clone());
        args.push(worker_count.to_string());
        args.push(runnable(executable));
        args.push(problem_size.to_string());
        args
    }
}

impl Launcher for MpiLauncher {
    fn launch(
        &self,
        executable: &Path,
        problem_size: u64,
        worker_count: u32,
    ) -> Result<RawRunOutput, ExecutionFailure> {
        let args = self.args(executable, problem_size, worker_count);
        let command = render_command(&self.launcher, &args);
        debug!(%command, timeout_s = self.timeout.as_secs(), "launching");

        let out = run_captured(&self.launcher, &args, self.timeout).map_err(|e| ExecutionFailure {
            command: command.clone(),
            worker_count,
            exit_code: None,
            stdout: String::new(),
            stderr: e.to_string(),
            timed_out: false,
        })?;

        if !out.success() {
            return Err(ExecutionFailure {
                command,
                worker_count,
                exit_code: out.exit_code(),
                timed_out: out.timed_out(),
                stdout: out.stdout,
                stderr: out.stderr,
            });
        }

        Ok(RawRunOutput {
            stdout: out.stdout,
            stderr: out.stderr,
            wall_time: out.elapsed,
        })
    }
}
