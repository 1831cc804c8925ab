//! Per-session cancellation shared by the editing loop, the transport and the PTY copy threads.
//!
//! A [`CancelToken`] behaves like a closable broadcast: every clone observes the same state,
//! and [`CancelToken::done`] hands out a receiver that turns ready (disconnected) once the
//! token is cancelled, so it composes with `crossbeam_channel::select!`.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::lock::lock_or_recover;

struct CancelState {
    cancelled: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
}

#[derive(Clone)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            state: Arc::new(CancelState {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(tx)),
                done: rx,
            }),
        }
    }

    /// Cancel the token. Returns `true` only for the call that performed the cancellation.
    pub fn cancel(&self) -> bool {
        if self.state.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        // Dropping the only sender disconnects every receiver handed out by `done()`.
        lock_or_recover(&self.state.trigger, "cancel trigger").take();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Receiver that becomes ready once the token is cancelled. Never yields a value.
    pub fn done(&self) -> &Receiver<()> {
        &self.state.done
    }

    /// Sleep for up to `timeout`, waking early on cancellation. Returns `true` if cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        let _ = self.state.done.recv_timeout(timeout);
        self.is_cancelled()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
