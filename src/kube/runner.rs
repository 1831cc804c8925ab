//! Spawning the external CLI: captured runs and PTY-backed interactive runs.

use anyhow::Result;
use std::fs::File;
use std::io::{self, Read};
use std::os::unix::io::{FromRawFd, OwnedFd};
use std::os::unix::process::CommandExt;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::error::{RelayError, RelayResult};
use crate::pty_session::PtyChild;

const WAIT_POLL: Duration = Duration::from_millis(20);

/// Result of a captured run. Stdout and stderr share one pipe, so `combined` keeps the
/// order the process wrote them in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub combined: Vec<u8>,
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

pub trait CommandRunner: Send + Sync {
    /// Run to completion. A non-zero exit is reported through [`CommandOutput::code`], not as
    /// an error; errors mean the process could not run (spawn failure, cancel, timeout).
    fn run(
        &self,
        args: &[String],
        cancel: &CancelToken,
        timeout: Option<Duration>,
    ) -> RelayResult<CommandOutput>;

    /// Start the CLI under a pseudo-terminal of `rows` x `cols`.
    fn spawn_pty(
        &self,
        args: &[String],
        env: &[(String, String)],
        rows: u16,
        cols: u16,
    ) -> Result<PtyChild>;
}

/// Runs a fixed binary (kubectl by default).
#[derive(Debug, Clone)]
pub struct KubectlRunner {
    binary: String,
}

impl KubectlRunner {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }
}

fn cloexec_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0; 2];
    // SAFETY: fds is a valid two-element buffer for pipe() to fill.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: both descriptors were just created and are owned exclusively here.
    let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    for fd in fds {
        // SAFETY: fd is open for the lifetime of the OwnedFd values above.
        if unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) } < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok((read, write))
}

fn execution_error(args: &[String], message: impl Into<String>) -> RelayError {
    RelayError::Execution {
        command: args.join(" "),
        message: message.into(),
    }
}

impl CommandRunner for KubectlRunner {
    fn run(
        &self,
        args: &[String],
        cancel: &CancelToken,
        timeout: Option<Duration>,
    ) -> RelayResult<CommandOutput> {
        let io_error = |err: io::Error| execution_error(args, err.to_string());
        let (reader, writer) = cloexec_pipe().map_err(io_error)?;
        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(writer.try_clone().map_err(io_error)?))
            .stderr(Stdio::from(writer))
            .process_group(0);
        let mut child = command.spawn().map_err(|err| {
            execution_error(args, format!("failed to start {}: {err}", self.binary))
        })?;
        // Release the parent's copies of the write end so the reader sees EOF.
        drop(command);

        let collector = thread::spawn(move || {
            let mut combined = Vec::new();
            let result = File::from(reader).read_to_end(&mut combined);
            (combined, result)
        });

        let started = Instant::now();
        let mut stopped: Option<&str> = None;
        let status: ExitStatus = loop {
            if let Some(status) = child.try_wait().map_err(io_error)? {
                break status;
            }
            if cancel.wait_timeout(WAIT_POLL) {
                stopped = Some("cancelled");
            } else if timeout.is_some_and(|limit| started.elapsed() >= limit) {
                stopped = Some("timed out");
            }
            if stopped.is_some() {
                // The child leads its own process group; take any helpers down with it.
                // SAFETY: signalling a process group we created has no memory-safety impact.
                unsafe { libc::kill(-(child.id() as i32), libc::SIGKILL) };
                break child.wait().map_err(io_error)?;
            }
        };

        let (combined, read_result) = collector
            .join()
            .map_err(|_| execution_error(args, "output collector panicked"))?;
        if let Err(err) = read_result {
            tracing::debug!(error = %err, "reading command output failed");
        }
        if let Some(reason) = stopped {
            return Err(execution_error(args, reason));
        }
        Ok(CommandOutput {
            combined,
            code: status.code(),
        })
    }

    fn spawn_pty(
        &self,
        args: &[String],
        env: &[(String, String)],
        rows: u16,
        cols: u16,
    ) -> Result<PtyChild> {
        PtyChild::spawn(&self.binary, args, env, rows, cols)
    }
}
