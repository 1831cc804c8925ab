//! Error taxonomy for a relay session.
//!
//! Undecodable keyboard input has no variant: it degrades to literal text inside the editor
//! and never reaches a caller.

use std::io;

use thiserror::Error;

/// Which provisioning step failed before the editing loop could start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    Identity,
    Credentials,
    SessionDirectory,
    Request,
}

impl SetupStage {
    pub fn label(self) -> &'static str {
        match self {
            SetupStage::Identity => "identity",
            SetupStage::Credentials => "credentials",
            SetupStage::SessionDirectory => "session directory",
            SetupStage::Request => "request",
        }
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    /// Frame read/write failure, idle deadline or keepalive timeout. Terminates the session.
    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),

    /// Credential retrieval or temp-directory provisioning failed; the session never starts.
    #[error("setup failed while resolving {}: {message}", stage.label())]
    Setup { stage: SetupStage, message: String },

    /// The external command could not be started or exited non-zero.
    #[error("command `{command}` failed: {message}")]
    Execution { command: String, message: String },

    /// A live lookup used for completion failed. Always absorbed as an empty list.
    #[error("lookup of {what} failed: {message}")]
    Lookup { what: String, message: String },

    /// An audit record could not be written. Logged; the command still runs.
    #[error("audit write failed: {0}")]
    Audit(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RelayError {
    pub fn setup(stage: SetupStage, err: impl std::fmt::Display) -> Self {
        RelayError::Setup {
            stage,
            message: err.to_string(),
        }
    }

    pub fn lookup(what: impl Into<String>, err: impl std::fmt::Display) -> Self {
        RelayError::Lookup {
            what: what.into(),
            message: err.to_string(),
        }
    }

    /// Whether the error ends the session (as opposed to being reported and absorbed).
    pub fn is_fatal(&self) -> bool {
        matches!(self, RelayError::Transport(_) | RelayError::Setup { .. })
    }
}

pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_error_names_the_stage() {
        let err = RelayError::setup(SetupStage::Credentials, "sentry unreachable");
        assert_eq!(
            err.to_string(),
            "setup failed while resolving credentials: sentry unreachable"
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn lookup_and_execution_errors_are_not_fatal() {
        assert!(!RelayError::lookup("namespaces", "forbidden").is_fatal());
        let exec = RelayError::Execution {
            command: "get pods".to_string(),
            message: "exit status 1".to_string(),
        };
        assert!(!exec.is_fatal());
        let transport = RelayError::from(io::Error::new(io::ErrorKind::TimedOut, "idle"));
        assert!(transport.is_fatal());
    }
}
