use super::io::*;
use super::pty::*;
use super::*;
use crate::cancel::CancelToken;
use crate::prompt::ConsoleInput;
use crossbeam_channel::bounded;
use std::collections::VecDeque;
use std::io::{self, ErrorKind};
use std::os::unix::io::RawFd;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

fn pipe_pair() -> (RawFd, RawFd) {
    let mut fds = [0; 2];
    let result = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(
        result,
        0,
        "pipe() failed with errno {}",
        io::Error::last_os_error()
    );
    (fds[0], fds[1])
}

fn sh(script: &str) -> PtyChild {
    PtyChild::spawn(
        "/bin/sh",
        &["-c".to_string(), script.to_string()],
        &[("KUBE_EDITOR".to_string(), "vim".to_string())],
        24,
        80,
    )
    .expect("spawn /bin/sh under a pty")
}

/// Input source that replays chunks, then reports idle.
struct ScriptedInput {
    chunks: Mutex<VecDeque<Vec<u8>>>,
    delay: Duration,
}

impl ScriptedInput {
    fn new(chunks: &[&[u8]], delay: Duration) -> Self {
        Self {
            chunks: Mutex::new(chunks.iter().map(|c| c.to_vec()).collect()),
            delay,
        }
    }
}

impl ConsoleInput for ScriptedInput {
    fn read_chunk(&self, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
        thread::sleep(self.delay.min(timeout));
        Ok(self.chunks.lock().unwrap().pop_front())
    }
}

struct ClosedInput;

impl ConsoleInput for ClosedInput {
    fn read_chunk(&self, _timeout: Duration) -> io::Result<Option<Vec<u8>>> {
        Err(io::Error::new(ErrorKind::ConnectionAborted, "closed"))
    }
}

#[test]
fn should_retry_read_error_reports_expected_kinds() {
    assert!(should_retry_read_error(&io::Error::from(ErrorKind::Interrupted)));
    assert!(should_retry_read_error(&io::Error::from(ErrorKind::WouldBlock)));
    assert!(!should_retry_read_error(&io::Error::from(ErrorKind::Other)));
}

#[test]
fn write_all_writes_bytes() {
    let (read_fd, write_fd) = pipe_pair();
    write_all(write_fd, b"get pods").unwrap();
    let mut buf = [0u8; 16];
    let n = unsafe { libc::read(read_fd, buf.as_mut_ptr() as *mut _, buf.len()) };
    assert_eq!(&buf[..n as usize], b"get pods");
    unsafe {
        close_fd(read_fd);
        close_fd(write_fd);
    }
}

#[test]
fn spawn_reader_thread_forwards_output_until_eof() {
    let (read_fd, write_fd) = pipe_pair();
    let (tx, rx) = bounded(4);
    let handle = spawn_reader_thread(read_fd, tx);
    write_all(write_fd, b"chunk").unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), b"chunk");
    unsafe { close_fd(write_fd) };
    handle.join().unwrap();
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    unsafe { close_fd(read_fd) };
}

#[test]
fn spawn_rejects_nul_bytes() {
    let err = PtyChild::spawn("/bin/sh", &["a\0b".to_string()], &[], 24, 80)
        .err()
        .expect("nul byte rejected");
    assert!(err.to_string().contains("NUL"));
}

#[test]
fn child_environment_inherits_and_applies_overrides() {
    let overrides = [("TERM".to_string(), "xterm-256color".to_string())];
    let entries: Vec<String> = child_environment(&overrides)
        .unwrap()
        .into_iter()
        .map(|entry| entry.into_string().unwrap())
        .collect();
    let terms: Vec<&String> = entries.iter().filter(|e| e.starts_with("TERM=")).collect();
    assert_eq!(terms, vec!["TERM=xterm-256color"]);
    if std::env::var_os("PATH").is_some() {
        assert!(entries.iter().any(|e| e.starts_with("PATH=")));
    }
}

#[test]
fn programs_are_resolved_before_fork() {
    let resolved = resolve_program("sh").unwrap();
    assert!(resolved.to_bytes().starts_with(b"/"), "resolved {resolved:?}");
    assert_eq!(resolve_program("/bin/sh").unwrap().to_bytes(), b"/bin/sh");

    let err = PtyChild::spawn("kubeprompt-no-such-binary", &[], &[], 24, 80)
        .err()
        .expect("missing program rejected");
    assert!(err.to_string().contains("command not found"));
}

#[test]
fn child_keeps_inherited_environment() {
    let child = PtyChild::spawn(
        "sh",
        &["-c".to_string(), "echo path=${PATH:+set} term=$TERM".to_string()],
        &[("TERM".to_string(), "xterm-256color".to_string())],
        24,
        80,
    )
    .expect("spawn sh via PATH");
    let mut output = Vec::new();
    bridge_pty(
        &child,
        &ScriptedInput::new(&[], Duration::from_millis(10)),
        &mut output,
        &CancelToken::new(),
    );
    let text = String::from_utf8_lossy(&output);
    assert!(text.contains("path=set"), "output was {text:?}");
    assert!(text.contains("term=xterm-256color"), "output was {text:?}");
}

#[test]
fn child_sees_pty_size_and_env() {
    let child = sh("stty size; echo $KUBE_EDITOR");
    let mut output = Vec::new();
    let outcome = bridge_pty(
        &child,
        &ScriptedInput::new(&[], Duration::from_millis(10)),
        &mut output,
        &CancelToken::new(),
    );
    let text = String::from_utf8_lossy(&output);
    assert!(text.contains("24 80"), "output was {text:?}");
    assert!(text.contains("vim"), "output was {text:?}");
    assert!(!outcome.interrupted);
}

#[test]
fn bridge_reports_exit_status() {
    let child = sh("echo done; exit 3");
    let mut output = Vec::new();
    let outcome = bridge_pty(
        &child,
        &ScriptedInput::new(&[], Duration::from_millis(10)),
        &mut output,
        &CancelToken::new(),
    );
    assert_eq!(outcome.exit_status.and_then(|s| s.code()), Some(3));
    assert!(String::from_utf8_lossy(&output).contains("done"));
}

#[test]
fn bridge_copies_input_to_child() {
    let child = sh("read line; echo got:$line");
    let mut output = Vec::new();
    let input = ScriptedInput::new(&[b"pods\r"], Duration::from_millis(10));
    let outcome = bridge_pty(&child, &input, &mut output, &CancelToken::new());
    assert!(String::from_utf8_lossy(&output).contains("got:pods"));
    assert_eq!(outcome.exit_status.and_then(|s| s.code()), Some(0));
}

#[test]
fn cancellation_stops_long_running_child() {
    let child = sh("sleep 30");
    let cancel = CancelToken::new();
    let remote = cancel.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        remote.cancel();
    });
    let start = Instant::now();
    let mut output = Vec::new();
    let outcome = bridge_pty(
        &child,
        &ScriptedInput::new(&[], Duration::from_millis(10)),
        &mut output,
        &cancel,
    );
    canceller.join().unwrap();
    assert!(outcome.interrupted);
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(!child.is_alive());
}

#[test]
fn closed_transport_stops_child() {
    let child = sh("sleep 30");
    let mut output = Vec::new();
    let outcome = bridge_pty(&child, &ClosedInput, &mut output, &CancelToken::new());
    assert!(outcome.interrupted);
    assert!(!child.is_alive());
}
