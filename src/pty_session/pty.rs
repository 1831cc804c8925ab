//! Pseudo-terminal child processes.
//!
//! Spawns the wrapped CLI under a PTY sized to the remote terminal so full-screen tools
//! (editors, `exec -it` shells, `logs -f`) behave as in a local terminal. Output is drained
//! by a reader thread; cleanup escalates SIGTERM to SIGKILL.

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver};
use std::env;
use std::ffi::CString;
use std::fs;
use std::io;
use std::mem;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::RawFd;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::ExitStatus;
use std::ptr;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use super::io::{spawn_reader_thread, write_all};
use crate::lock::lock_or_recover;

const TERM_GRACE: Duration = Duration::from_millis(500);
const FALLBACK_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// A child process attached to the slave side of a PTY.
pub struct PtyChild {
    pub(super) master_fd: RawFd,
    pub(super) child_pid: i32,
    status: Mutex<Option<ExitStatus>>,
    /// Raw output chunks; disconnects once the slave side is closed.
    pub output_rx: Receiver<Vec<u8>>,
    _output_thread: thread::JoinHandle<()>,
}

fn to_cstring(value: &str, what: &str) -> Result<CString> {
    CString::new(value).with_context(|| format!("{what} contains NUL byte: {value}"))
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

/// Resolve `program` against `PATH` in the parent; the forked child only calls `execve`.
pub(super) fn resolve_program(program: &str) -> Result<CString> {
    if program.contains('/') {
        return to_cstring(program, "program");
    }
    let search = env::var_os("PATH").unwrap_or_else(|| FALLBACK_PATH.into());
    env::split_paths(&search)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
        .ok_or_else(|| anyhow!("{program}: command not found"))
        .and_then(|found| {
            CString::new(found.into_os_string().into_vec())
                .context("resolved program path contains NUL byte")
        })
}

/// `KEY=VALUE` entries for the child: this process's environment with `overrides` applied.
pub(super) fn child_environment(overrides: &[(String, String)]) -> Result<Vec<CString>> {
    let mut entries = Vec::new();
    for (key, value) in env::vars_os() {
        if overrides.iter().any(|(name, _)| name.as_bytes() == key.as_bytes()) {
            continue;
        }
        let mut entry = key.into_vec();
        entry.push(b'=');
        entry.extend_from_slice(value.as_bytes());
        // Entries with interior NULs cannot be passed to execve.
        if let Ok(entry) = CString::new(entry) {
            entries.push(entry);
        }
    }
    for (key, value) in overrides {
        to_cstring(key, "env key")?;
        to_cstring(value, "env value")?;
        entries.push(to_cstring(&format!("{key}={value}"), "env entry")?);
    }
    Ok(entries)
}

impl PtyChild {
    /// Start `program` with `args` under a PTY of `rows` x `cols`, exporting `env` to the child.
    pub fn spawn(
        program: &str,
        args: &[String],
        env: &[(String, String)],
        rows: u16,
        cols: u16,
    ) -> Result<Self> {
        let mut argv: Vec<CString> = Vec::with_capacity(args.len() + 1);
        argv.push(to_cstring(program, "program")?);
        for arg in args {
            argv.push(to_cstring(arg, "argument")?);
        }
        let envp = child_environment(env)?;
        let path = resolve_program(program)?;

        // SAFETY: path/argv/envp are valid CStrings built above; spawn_pty_child returns an
        // owned master fd and set_nonblocking only touches that fd.
        unsafe {
            let (master_fd, child_pid) = spawn_pty_child(&path, &argv, &envp, rows, cols)?;
            if let Err(err) = set_nonblocking(master_fd) {
                close_fd(master_fd);
                let _ = libc::kill(child_pid, libc::SIGKILL);
                let mut status = 0;
                let _ = libc::waitpid(child_pid, &mut status, 0);
                return Err(err);
            }
            let (tx, rx) = bounded(100);
            let output_thread = spawn_reader_thread(master_fd, tx);
            tracing::debug!(program, child_pid, rows, cols, "pty child started");
            Ok(Self {
                master_fd,
                child_pid,
                status: Mutex::new(None),
                output_rx: rx,
                _output_thread: output_thread,
            })
        }
    }

    /// Write raw bytes to the PTY master.
    pub fn send_bytes(&self, bytes: &[u8]) -> Result<()> {
        write_all(self.master_fd, bytes)
    }

    /// Non-blocking exit check; reaps the child once.
    pub fn try_wait(&self) -> Option<ExitStatus> {
        let mut status = lock_or_recover(&self.status, "pty child status");
        if status.is_some() {
            return *status;
        }
        let mut raw = 0;
        // SAFETY: child_pid is owned by this session; WNOHANG never blocks.
        let ret = unsafe { libc::waitpid(self.child_pid, &mut raw, libc::WNOHANG) };
        if ret > 0 {
            *status = Some(ExitStatus::from_raw(raw));
        } else if ret < 0 {
            tracing::debug!(
                child_pid = self.child_pid,
                error = %io::Error::last_os_error(),
                "waitpid failed"
            );
            *status = Some(ExitStatus::from_raw(0));
        }
        *status
    }

    pub fn is_alive(&self) -> bool {
        self.try_wait().is_none()
    }

    /// Stop the child: SIGTERM, then SIGKILL after a short grace period.
    pub fn terminate(&self) -> Option<ExitStatus> {
        if let Some(status) = self.try_wait() {
            return Some(status);
        }
        // SAFETY: signals target the child pid owned by this session.
        unsafe {
            if libc::kill(self.child_pid, libc::SIGTERM) != 0 {
                tracing::debug!(
                    error = %io::Error::last_os_error(),
                    "SIGTERM to pty child failed"
                );
            }
        }
        if let Some(status) = self.wait_for_exit(TERM_GRACE) {
            return Some(status);
        }
        // SAFETY: as above; the blocking waitpid reaps the killed child.
        unsafe {
            if libc::kill(self.child_pid, libc::SIGKILL) != 0 {
                tracing::debug!(
                    error = %io::Error::last_os_error(),
                    "SIGKILL to pty child failed"
                );
            }
            let mut raw = 0;
            let ret = libc::waitpid(self.child_pid, &mut raw, 0);
            let mut status = lock_or_recover(&self.status, "pty child status");
            if ret > 0 {
                *status = Some(ExitStatus::from_raw(raw));
            }
            *status
        }
    }

    /// Poll for exit until `timeout` passes.
    pub fn wait_for_exit(&self, timeout: Duration) -> Option<ExitStatus> {
        let start = Instant::now();
        loop {
            if let Some(status) = self.try_wait() {
                return Some(status);
            }
            if start.elapsed() >= timeout {
                return None;
            }
            thread::sleep(Duration::from_millis(20));
        }
    }
}

impl Drop for PtyChild {
    fn drop(&mut self) {
        if self.is_alive() {
            self.terminate();
        }
        // SAFETY: master_fd comes from spawn_pty_child and is closed exactly once here.
        unsafe { close_fd(self.master_fd) };
    }
}

/// Forks and execs a child process under a new PTY.
///
/// # Safety
///
/// `argv` must be non-empty and `path` an absolute or relative file path (no `PATH` search
/// happens after fork). The returned master fd must eventually be closed. The child calls
/// `_exit(1)` on any setup failure and never returns into Rust code.
pub(super) unsafe fn spawn_pty_child(
    path: &CString,
    argv: &[CString],
    envp: &[CString],
    rows: u16,
    cols: u16,
) -> Result<(RawFd, i32)> {
    let mut master_fd: RawFd = -1;
    let mut slave_fd: RawFd = -1;

    // SAFETY: libc::winsize is a plain C struct; zeroed is a valid baseline.
    let mut winsize: libc::winsize = mem::zeroed();
    winsize.ws_row = rows.max(1);
    winsize.ws_col = cols.max(1);

    #[allow(clippy::unnecessary_mut_passed)]
    if libc::openpty(
        &mut master_fd,
        &mut slave_fd,
        ptr::null_mut(),
        ptr::null_mut(),
        &mut winsize,
    ) != 0
    {
        return Err(errno_error("openpty failed"));
    }

    // Built before fork so the child only calls async-signal-safe functions.
    let mut argv_ptrs: Vec<*const libc::c_char> = argv.iter().map(|s| s.as_ptr()).collect();
    argv_ptrs.push(ptr::null());
    let mut envp_ptrs: Vec<*const libc::c_char> = envp.iter().map(|s| s.as_ptr()).collect();
    envp_ptrs.push(ptr::null());

    let pid = libc::fork();
    if pid < 0 {
        close_fd(master_fd);
        close_fd(slave_fd);
        return Err(errno_error("fork failed"));
    }

    if pid == 0 {
        close_fd(master_fd);
        child_exec(slave_fd, path, &argv_ptrs, &envp_ptrs);
    }

    close_fd(slave_fd);
    Ok((master_fd, pid))
}

/// Child side after `fork()`: attach the PTY as controlling terminal and exec.
///
/// # Safety
///
/// Must only be called in the forked child. Never returns.
unsafe fn child_exec(
    slave_fd: RawFd,
    path: &CString,
    argv_ptrs: &[*const libc::c_char],
    envp_ptrs: &[*const libc::c_char],
) -> ! {
    let fail = |context: &[u8]| -> ! {
        // SAFETY: write is async-signal-safe and stderr is a valid fd in the child.
        let _ = libc::write(
            libc::STDERR_FILENO,
            context.as_ptr() as *const libc::c_void,
            context.len(),
        );
        libc::_exit(1);
    };

    if libc::setsid() == -1 {
        fail(b"child_exec setsid failed\n");
    }
    if libc::ioctl(slave_fd, libc::TIOCSCTTY as libc::c_ulong, 0) == -1 {
        fail(b"child_exec ioctl(TIOCSCTTY) failed\n");
    }
    if libc::dup2(slave_fd, libc::STDIN_FILENO) < 0
        || libc::dup2(slave_fd, libc::STDOUT_FILENO) < 0
        || libc::dup2(slave_fd, libc::STDERR_FILENO) < 0
    {
        fail(b"child_exec dup2 failed\n");
    }
    if slave_fd > libc::STDERR_FILENO {
        close_fd(slave_fd);
    }

    libc::execve(path.as_ptr(), argv_ptrs.as_ptr(), envp_ptrs.as_ptr());
    fail(b"child_exec execve failed\n");
}

/// Configure the PTY master for non-blocking reads.
///
/// # Safety
///
/// `fd` must be a valid, open file descriptor.
pub(super) unsafe fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = libc::fcntl(fd, libc::F_GETFL, 0);
    if flags < 0 {
        return Err(errno_error("fcntl(F_GETFL) failed"));
    }
    if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
        return Err(errno_error("fcntl(F_SETFL) failed"));
    }
    Ok(())
}

pub(super) fn errno_error(context: &str) -> anyhow::Error {
    anyhow!("{context}: {}", io::Error::last_os_error())
}

/// Close a file descriptor while ignoring errors.
///
/// # Safety
///
/// `fd` must be a valid, open file descriptor (or negative to ignore).
pub(super) unsafe fn close_fd(fd: RawFd) {
    if fd >= 0 {
        let _ = libc::close(fd);
    }
}
