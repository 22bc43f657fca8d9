//! External command execution
//!
//! Every version-control operation goes through [`run`], which starts a child
//! process from an argument vector, captures its standard output and standard
//! error as text and waits for it with a deadline.
//!
//! A child that outlives its deadline is killed together with its process
//! group and reaped; the returned [`CommandResult`] is then marked
//! `timed_out` and never counts as a success. Output pipes still held open by
//! stray processes are abandoned shortly after the child is gone.
//! Failing to start the child, or losing the ability to talk to it, is an
//! [`Error::CommandLaunch`] and ends the run.

use std::ffi::OsStr;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::error::{Error, Result};

/// Ten minutes, enough for a fetch of a large repository over a slow link.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long output pipes may stay open after the child is gone.
const OUTPUT_GRACE: Duration = Duration::from_secs(1);

/// Outcome of a single external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Exit code reported by the process, `-1` when it was ended by a signal.
    pub exit_code: i32,
    /// Everything the process wrote to standard output.
    pub stdout: String,
    /// Everything the process wrote to standard error.
    pub stderr: String,
    /// Whether the process was killed for exceeding its timeout.
    pub timed_out: bool,
}

impl CommandResult {
    /// Returns `true` if the process exited with code 0 before its deadline.
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// A one-line explanation suitable for logging a failed command.
    pub fn failure_reason(&self) -> String {
        if self.timed_out {
            return "timed out".to_string();
        }
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        format!("exit code {}", self.exit_code)
    }
}

/// Run `argv` in `dir` (or the current directory) and wait up to `timeout`.
///
/// On Unix the child leads its own process group, so helpers it starts
/// (`ssh`, `git-remote-https`) are killed with it on timeout.
pub fn run<S: AsRef<OsStr>>(
    argv: &[S],
    dir: Option<&Path>,
    timeout: Duration,
) -> Result<CommandResult> {
    let command = render(argv);
    let launch_error = |source: io::Error| Error::CommandLaunch {
        command: command.clone(),
        source,
    };

    let (program, args) = argv.split_first().ok_or_else(|| {
        launch_error(io::Error::new(
            io::ErrorKind::InvalidInput,
            "empty command line",
        ))
    })?;

    match dir {
        Some(dir) => debug!("Running `{}` in {}", command, dir.display()),
        None => debug!("Running `{}`", command),
    }

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = cmd.spawn().map_err(launch_error)?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let (status, timed_out) = loop {
        if let Some(status) = child.try_wait().map_err(launch_error)? {
            break (status, false);
        }
        if Instant::now() >= deadline {
            warn!(
                "`{}` exceeded its {}s timeout, killing it",
                command,
                timeout.as_secs()
            );
            kill_tree(&mut child);
            let status = child.wait().map_err(launch_error)?;
            break (status, true);
        }
        thread::sleep(POLL_INTERVAL);
    };

    // A background process may still hold the pipes.
    let output_deadline = Instant::now() + OUTPUT_GRACE;
    let (stdout, stdout_complete) = collect(&stdout, output_deadline);
    let (stderr, stderr_complete) = collect(&stderr, output_deadline);
    if !(stdout_complete && stderr_complete) {
        warn!(
            "Output of `{}` was still open after it exited, keeping what was read",
            command
        );
    }

    Ok(CommandResult {
        exit_code: status.code().unwrap_or(-1),
        stdout,
        stderr,
        timed_out,
    })
}

/// Kill the child and, on Unix, every process in its group.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let pgid = Pid::from_raw(child.id() as i32);
        if let Err(e) = killpg(pgid, Signal::SIGKILL) {
            debug!("Failed to kill process group {}: {}", pgid, e);
            // The child may have exited between try_wait and kill.
            let _ = child.kill();
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child.kill();
    }
}

/// Read `pipe` on a helper thread, forwarding chunks as they arrive. The
/// channel disconnects at end of file.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    if let Some(mut pipe) = pipe {
        thread::spawn(move || {
            let mut buf = [0u8; 8192];
            loop {
                match pipe.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        debug!("Stopped reading command output: {}", e);
                        break;
                    }
                }
            }
        });
    }
    rx
}

/// Gather chunks until end of file or `until`, whichever comes first.
/// The flag is `false` when the pipe was still open.
fn collect(output: &Receiver<Vec<u8>>, until: Instant) -> (String, bool) {
    let mut buf = Vec::new();
    let complete = loop {
        let remaining = until.saturating_duration_since(Instant::now());
        match output.recv_timeout(remaining) {
            Ok(chunk) => buf.extend_from_slice(&chunk),
            Err(RecvTimeoutError::Disconnected) => break true,
            Err(RecvTimeoutError::Timeout) => break false,
        }
    };
    (String::from_utf8_lossy(&buf).into_owned(), complete)
}

fn render<S: AsRef<OsStr>>(argv: &[S]) -> String {
    argv.iter()
        .map(|arg| arg.as_ref().to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}
