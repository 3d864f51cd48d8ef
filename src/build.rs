//! Compiling the program under test.

use crate::config::BuildConfig;
use crate::error::{BenchError, BuildFailure};
use crate::process::{render_command, run_captured};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const BUILD_TIMEOUT: Duration = Duration::from_secs(300);

/// The compiler collaborator: turns `source` into a runnable `executable`.
pub trait Compiler {
    fn compile(&self, source: &Path, executable: &Path) -> Result<(), BuildFailure>;
}

/// Runs an `mpicc`-compatible compiler as `<compiler> <flags..> <source> -o <executable>`.
#[derive(Debug, Clone)]
pub struct MpiCompiler {
    compiler: String,
    flags: Vec<String>,
}

impl MpiCompiler {
    pub fn new(cfg: &BuildConfig) -> Self {
        Self {
            compiler: cfg.compiler.clone(),
            flags: cfg.flags.clone(),
        }
    }

    fn args(&self, source: &Path, executable: &Path) -> Vec<String> {
        let mut args = self.flags.clone();
        args.push(source.display().to_string());
        args.push("-o".to_string());
        args.push(executable.display().to_string());
        args
    }
}

impl Compiler for MpiCompiler {
    fn compile(&self, source: &Path, executable: &Path) -> Result<(), BuildFailure> {
        let args = self.args(source, executable);
        let command = render_command(&self.compiler, &args);
        debug!(%command, "invoking compiler");

        let out = run_captured(&self.compiler, &args, BUILD_TIMEOUT).map_err(|e| BuildFailure {
            command: command.clone(),
            exit_code: None,
            stdout: String::new(),
            stderr: e.to_string(),
        })?;

        if out.success() {
            Ok(())
        } else {
            Err(BuildFailure {
                command,
                exit_code: out.exit_code(),
                stdout: out.stdout,
                stderr: out.stderr,
            })
        }
    }
}

/// Executable path for `source`: the same path with `extension` stripped.
///
/// A source without that extension is rejected, since the artifact would
/// overwrite it.
pub fn executable_path(source: &Path, extension: &str) -> Result<PathBuf, BenchError> {
    let ext = extension.trim_start_matches('.');
    match source.extension() {
        Some(found) if found == ext && source.file_stem().is_some() => Ok(source.with_extension("")),
        _ => Err(BenchError::InvalidRequest(format!(
            "source file {} does not have a .{ext} extension",
            source.display()
        ))),
    }
}

/// Compiles `source` once and returns the executable to launch.
pub fn build<C: Compiler + ?Sized>(
    compiler: &C,
    source: &Path,
    extension: &str,
) -> Result<PathBuf, BenchError> {
    let executable = executable_path(source, extension)?;
    info!(source = %source.display(), executable = %executable.display(), "building");
    compiler.compile(source, &executable)?;
    Ok(executable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingCompiler {
        calls: RefCell<Vec<(PathBuf, PathBuf)>>,
        fail: bool,
    }

    impl Compiler for RecordingCompiler {
        fn compile(&self, source: &Path, executable: &Path) -> Result<(), BuildFailure> {
            self.calls
                .borrow_mut()
                .push((source.to_path_buf(), executable.to_path_buf()));
            if self.fail {
                return Err(BuildFailure {
                    command: "cc".to_string(),
                    exit_code: Some(1),
                    stdout: String::new(),
                    stderr: "syntax error".to_string(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn executable_name_strips_extension() {
        assert_eq!(
            executable_path(Path::new("summation.c"), "c").unwrap(),
            PathBuf::from("summation")
        );
        assert_eq!(
            executable_path(Path::new("kernels/jacobi.c"), ".c").unwrap(),
            PathBuf::from("kernels/jacobi")
        );
        assert_eq!(
            executable_path(Path::new("stencil.v2.c"), "c").unwrap(),
            PathBuf::from("stencil.v2")
        );
    }

    #[test]
    fn executable_name_requires_extension() {
        for bad in ["summation", "summation.cpp", ".c"] {
            let err = executable_path(Path::new(bad), "c").unwrap_err();
            assert!(matches!(err, BenchError::InvalidRequest(_)), "{bad}");
        }
    }

    #[test]
    fn build_passes_derived_name_to_compiler() {
        let compiler = RecordingCompiler::default();
        let exe = build(&compiler, Path::new("summation.c"), "c").unwrap();
        assert_eq!(exe, PathBuf::from("summation"));
        assert_eq!(
            compiler.calls.borrow().as_slice(),
            &[(PathBuf::from("summation.c"), PathBuf::from("summation"))]
        );
    }

    #[test]
    fn build_failure_is_surfaced() {
        let compiler = RecordingCompiler {
            fail: true,
            ..Default::default()
        };
        let err = build(&compiler, Path::new("summation.c"), "c").unwrap_err();
        assert!(matches!(err, BenchError::Build(ref f) if f.stderr == "syntax error"));
    }

    #[test]
    fn compiler_command_line() {
        let compiler = MpiCompiler::new(&BuildConfig {
            flags: vec!["-O2".to_string()],
            ..Default::default()
        });
        assert_eq!(
            compiler.args(Path::new("summation.c"), Path::new("summation")),
            vec!["-O2", "summation.c", "-o", "summation"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn failing_compiler_reports_exit_code() {
        let compiler = MpiCompiler::new(&BuildConfig {
            compiler: "false".to_string(),
            ..Default::default()
        });
        let err = compiler
            .compile(Path::new("summation.c"), Path::new("summation"))
            .unwrap_err();
        assert_eq!(err.exit_code, Some(1));
        assert_eq!(err.command, "false summation.c -o summation");
    }

    #[test]
    fn missing_compiler_is_build_failure() {
        let compiler = MpiCompiler::new(&BuildConfig {
            compiler: "no-such-compiler-xyz".to_string(),
            ..Default::default()
        });
        let err = compiler
            .compile(Path::new("summation.c"), Path::new("summation"))
            .unwrap_err();
        assert_eq!(err.exit_code, None);
        assert!(!err.stderr.is_empty());
    }
}
