//! PTY passthrough for commands that need a live terminal (exec, edit, logs -f, watches).

mod bridge;
mod io;
mod pty;

#[cfg(test)]
mod tests;

pub use bridge::{bridge_pty, BridgeOutcome};
pub use pty::PtyChild;
