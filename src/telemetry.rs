use crate::config::AppConfig;
use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use tracing_subscriber::fmt::time::UtcTime;

static TRACING_INIT: OnceLock<()> = OnceLock::new();
static LOG_CONTENT: AtomicBool = AtomicBool::new(false);

pub(crate) fn tracing_log_path(config: &AppConfig) -> PathBuf {
    config
        .trace_log
        .clone()
        .unwrap_or_else(|| env::temp_dir().join("kubeprompt_trace.jsonl"))
}

/// Install the JSON subscriber once. A missing or unwritable log file leaves tracing disabled.
pub fn init_tracing(config: &AppConfig) {
    LOG_CONTENT.store(
        config.log_content && config.logs && !config.no_logs,
        Ordering::Relaxed,
    );
    if !config.logs || config.no_logs {
        return;
    }

    let _ = TRACING_INIT.get_or_init(|| {
        if config.log_stderr {
            let subscriber = tracing_subscriber::fmt()
                .json()
                .with_timer(UtcTime::rfc_3339())
                .with_writer(std::io::stderr)
                .with_current_span(false)
                .with_span_list(false)
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
            return;
        }

        let path = tracing_log_path(config);
        let file = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => file,
            Err(_) => return,
        };
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_timer(UtcTime::rfc_3339())
            .with_writer(file)
            .with_current_span(false)
            .with_span_list(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Command text and keystrokes may only reach the log when this returns true.
pub fn content_logging_enabled() -> bool {
    LOG_CONTENT.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn trace_log_defaults_to_temp_dir() {
        let cfg = AppConfig::parse_from(["test-app"]);
        assert_eq!(
            tracing_log_path(&cfg),
            env::temp_dir().join("kubeprompt_trace.jsonl")
        );
        let cfg = AppConfig::parse_from(["test-app", "--trace-log", "/var/tmp/kp.jsonl"]);
        assert_eq!(tracing_log_path(&cfg), PathBuf::from("/var/tmp/kp.jsonl"));
    }
}
