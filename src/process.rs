//! Blocking child-process execution with captured output and a deadline.

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long pipe readers get after the child is gone before their output is
/// abandoned.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub struct Captured {
    /// `None` when the child was killed at the deadline.
    pub status: Option<ExitStatus>,
    pub stdout: String,
    pub stderr: String,
    /// Total time spent in the call, pipe draining included.
    pub elapsed: Duration,
}

impl Captured {
    pub fn success(&self) -> bool {
        self.status.is_some_and(|s| s.success())
    }

    pub fn timed_out(&self) -> bool {
        self.status.is_none()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }
}

/// Shell-ish rendering of a command line for error messages.
pub fn render_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>, stream: Stream, tx: Sender<(Stream, String)>) {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_end(&mut buf) {
                debug!(?stream, error = %e, bytes = buf.len(), "pipe read failed, output may be truncated");
            }
        }
        // The receiver is gone if the caller already gave up on this stream.
        let _ = tx.send((stream, String::from_utf8_lossy(&buf).into_owned()));
    });
}

/// Collects both streams, abandoning whichever is still open at `until`.
/// A descendant that escaped the kill can keep a pipe open indefinitely.
fn collect(rx: &Receiver<(Stream, String)>, until: Instant) -> (String, String) {
    let (mut stdout, mut stderr) = (None, None);
    while stdout.is_none() || stderr.is_none() {
        let wait = until.saturating_duration_since(Instant::now());
        match rx.recv_timeout(wait) {
            Ok((Stream::Stdout, s)) => stdout = Some(s),
            Ok((Stream::Stderr, s)) => stderr = Some(s),
            Err(_) => {
                debug!(
                    stdout_open = stdout.is_none(),
                    stderr_open = stderr.is_none(),
                    "abandoning output pipes still held open"
                );
                break;
            }
        }
    }
    (stdout.unwrap_or_default(), stderr.unwrap_or_default())
}

#[cfg(unix)]
fn isolate(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    // Own process group, so a timeout can take down launcher and ranks together.
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn isolate(_cmd: &mut Command) {}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: plain syscall on a process group we created; no memory is shared.
        let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
        if rc != 0 {
            debug!(pgid, error = %io::Error::last_os_error(), "killing process group failed");
        }
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

fn wait_until(child: &mut Child, deadline: Instant) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            // The child may exit between try_wait and kill.
            kill_tree(child);
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Runs `program args...` to completion or until `timeout` elapses.
///
/// Pipes are drained on helper threads so a child writing more than the pipe
/// buffer cannot stall. On timeout the child's whole process group is killed,
/// and the call returns within [`DRAIN_GRACE`] of the deadline even if some
/// descendant keeps a pipe open. `Err` only for failures to spawn or wait.
pub fn run_captured(program: &str, args: &[String], timeout: Duration) -> io::Result<Captured> {
    let start = Instant::now();
    let deadline = start + timeout;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    isolate(&mut cmd);
    let mut child = cmd.spawn()?;

    let (tx, rx) = mpsc::channel();
    drain(child.stdout.take(), Stream::Stdout, tx.clone());
    drain(child.stderr.take(), Stream::Stderr, tx);

    let status = match wait_until(&mut child, deadline) {
        Ok(status) => status,
        Err(e) => {
            kill_tree(&mut child);
            return Err(e);
        }
    };
    let (stdout, stderr) = collect(&rx, deadline.max(Instant::now()) + DRAIN_GRACE);

    Ok(Captured {
        status,
        stdout,
        stderr,
        elapsed: start.elapsed(),
    })
}
