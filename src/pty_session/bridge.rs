//! Full-duplex copy between the remote transport and a PTY child.

use crossbeam_channel::RecvTimeoutError;
use std::io::Write;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use super::pty::PtyChild;
use crate::cancel::CancelToken;
use crate::prompt::ConsoleInput;

const INPUT_POLL: Duration = Duration::from_millis(50);
const OUTPUT_DRAIN: Duration = Duration::from_millis(50);
const EXIT_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeOutcome {
    pub exit_status: Option<ExitStatus>,
    /// The child was stopped early (cancellation or a dead transport).
    pub interrupted: bool,
}

/// Copy `input` into the child and child output into `output` until the child exits or
/// `cancel` fires. Returns only after both copy threads have finished.
pub fn bridge_pty(
    child: &PtyChild,
    input: &dyn ConsoleInput,
    output: &mut (dyn Write + Send),
    cancel: &CancelToken,
) -> BridgeOutcome {
    let stop = AtomicBool::new(false);
    let child_done = AtomicBool::new(false);

    thread::scope(|scope| {
        scope.spawn(|| copy_inbound(child, input, cancel, &stop, &child_done));
        scope.spawn(|| copy_outbound(child, output, cancel, &stop, &child_done));

        let mut interrupted = false;
        let exit_status = loop {
            if let Some(status) = child.try_wait() {
                break Some(status);
            }
            if stop.load(Ordering::Acquire) || cancel.wait_timeout(EXIT_POLL) {
                interrupted = true;
                break child.terminate();
            }
        };
        child_done.store(true, Ordering::Release);
        tracing::debug!(?exit_status, interrupted, "pty bridge finished");
        BridgeOutcome {
            exit_status,
            interrupted,
        }
    })
}

fn copy_inbound(
    child: &PtyChild,
    input: &dyn ConsoleInput,
    cancel: &CancelToken,
    stop: &AtomicBool,
    child_done: &AtomicBool,
) {
    while !child_done.load(Ordering::Acquire) && !cancel.is_cancelled() {
        match input.read_chunk(INPUT_POLL) {
            Ok(Some(chunk)) => {
                if let Err(err) = child.send_bytes(&chunk) {
                    tracing::debug!(error = %err, "pty input copy stopped");
                    return;
                }
            }
            Ok(None) => {}
            Err(err) => {
                tracing::debug!(error = %err, "transport closed during pty bridge");
                stop.store(true, Ordering::Release);
                return;
            }
        }
    }
}

fn copy_outbound(
    child: &PtyChild,
    output: &mut (dyn Write + Send),
    cancel: &CancelToken,
    stop: &AtomicBool,
    child_done: &AtomicBool,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }
        match child.output_rx.recv_timeout(OUTPUT_DRAIN) {
            Ok(chunk) => {
                if let Err(err) = output.write_all(&chunk).and_then(|()| output.flush()) {
                    tracing::debug!(error = %err, "pty output copy stopped");
                    stop.store(true, Ordering::Release);
                    return;
                }
            }
            // The child exited and its output has gone quiet (a grandchild may keep the
            // slave side open forever).
            Err(RecvTimeoutError::Timeout) if child_done.load(Ordering::Acquire) => return,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}
