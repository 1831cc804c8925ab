pub mod audit;
pub mod cancel;
pub mod config;
pub mod error;
pub mod kube;
mod lock;
pub mod prompt;
pub mod pty_session;
pub mod relay;
mod telemetry;
pub mod transport;

pub use telemetry::{content_logging_enabled, init_tracing};
