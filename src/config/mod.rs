//! Command-line parsing and validation helpers.

mod defaults;
#[cfg(test)]
mod tests;
mod validation;

use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::time::Duration;

use crate::kube::InteractiveMatch;
use crate::prompt::KeyBindMode;

pub use defaults::{
    DEFAULT_AUDIT_LOG, DEFAULT_BIND, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_KEEPALIVE_SECS,
    DEFAULT_KUBECONFIG_DIR, DEFAULT_KUBECTL_BIN, DEFAULT_MAX_SUGGESTIONS, DEFAULT_NAMESPACE,
    DEFAULT_PORT, DEFAULT_PRUNE_INTERVAL_SECS, DEFAULT_TEMP_PATH, DEFAULT_VIEW_MAX_AGE_HOURS,
};

/// CLI options for the kubeprompt relay server. Validated values keep spawned kubectl calls safe.
#[derive(Debug, Parser, Clone)]
#[command(
    about = "Interactive kubectl prompt served over websockets",
    author,
    version
)]
pub struct AppConfig {
    /// Port the websocket listener binds to
    #[arg(long, env = "API_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address the websocket listener binds to
    #[arg(long, env = "BIND_ADDR", default_value = DEFAULT_BIND)]
    pub bind: String,

    /// Root directory for per-session kubeconfig and cache directories
    #[arg(long = "temp-path", env = "TEMP_PATH", default_value = DEFAULT_TEMP_PATH)]
    pub temp_path: PathBuf,

    /// Path to the kubectl binary
    #[arg(long = "kubectl-bin", env = "KUBECTL_BIN", default_value = DEFAULT_KUBECTL_BIN)]
    pub kubectl_bin: String,

    /// Extra arguments appended to every kubectl invocation (shell-quoted)
    #[arg(
        long = "kubectl-extra-args",
        env = "KUBECTL_EXTRA_ARGS",
        default_value = "",
        allow_hyphen_values = true
    )]
    pub kubectl_extra_args: String,

    /// Directory holding one kubeconfig per cluster (`<cluster>.yaml`)
    #[arg(
        long = "kubeconfig-dir",
        env = "KUBECONFIG_DIR",
        default_value = DEFAULT_KUBECONFIG_DIR
    )]
    pub kubeconfig_dir: PathBuf,

    /// JSON-lines audit log destination
    #[arg(long = "audit-log", env = "AUDIT_LOG_FILE", default_value = DEFAULT_AUDIT_LOG)]
    pub audit_log: PathBuf,

    /// Development mode: every request is attributed to --user-name
    #[arg(long, env = "DEV", default_value_t = false)]
    pub dev: bool,

    /// Identity used in development mode
    #[arg(long = "user-name", env = "USER_NAME", default_value = "")]
    pub user_name: String,

    /// Request header carrying the authenticated user
    #[arg(long = "auth-user-header", default_value = "X-Forwarded-User")]
    pub auth_user_header: String,

    /// Request header carrying the authenticated user's groups (comma separated)
    #[arg(long = "auth-groups-header", default_value = "X-Forwarded-Groups")]
    pub auth_groups_header: String,

    /// YAML file that overlays or extends the built-in flag tables
    #[arg(long = "flag-catalog", env = "FLAG_CATALOG")]
    pub flag_catalog: Option<PathBuf>,

    /// Namespace used for completion when the request names none
    #[arg(long = "default-namespace", default_value = DEFAULT_NAMESPACE)]
    pub default_namespace: String,

    /// Idle read deadline for a websocket session (seconds)
    #[arg(long = "idle-timeout-secs", default_value_t = DEFAULT_IDLE_TIMEOUT_SECS)]
    pub idle_timeout_secs: u64,

    /// Keepalive window; pings go out every half window (seconds)
    #[arg(long = "keepalive-secs", default_value_t = DEFAULT_KEEPALIVE_SECS)]
    pub keepalive_secs: u64,

    /// How often stale long-lived session directories are swept (seconds)
    #[arg(long = "prune-interval-secs", default_value_t = DEFAULT_PRUNE_INTERVAL_SECS)]
    pub prune_interval_secs: u64,

    /// Age after which an untouched long-lived session directory is removed (hours)
    #[arg(long = "view-max-age-hours", default_value_t = DEFAULT_VIEW_MAX_AGE_HOURS)]
    pub view_max_age_hours: u64,

    /// Maximum number of completion rows drawn under the prompt
    #[arg(long = "max-suggestions", default_value_t = DEFAULT_MAX_SUGGESTIONS)]
    pub max_suggestions: u16,

    /// Key binding set applied on top of the common bindings
    #[arg(long = "key-bind-mode", value_enum, default_value_t = KeyBindMode::Common)]
    pub key_bind_mode: KeyBindMode,

    /// How commands are classified as interactive (PTY passthrough)
    #[arg(
        long = "interactive-match",
        value_enum,
        default_value_t = InteractiveMatch::Substring
    )]
    pub interactive_match: InteractiveMatch,

    /// Enable structured logging
    #[arg(long = "logs", env = "KUBEPROMPT_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all logging (overrides --logs)
    #[arg(long = "no-logs", env = "KUBEPROMPT_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow command text to appear in debug logs
    #[arg(
        long = "log-content",
        env = "KUBEPROMPT_LOG_CONTENT",
        default_value_t = false
    )]
    pub log_content: bool,

    /// Write logs to stderr instead of the trace file
    #[arg(long = "log-stderr", action = ArgAction::SetTrue)]
    pub log_stderr: bool,

    /// Trace log path (defaults to $TMPDIR/kubeprompt_trace.jsonl)
    #[arg(long = "trace-log", env = "KUBEPROMPT_TRACE_LOG")]
    pub trace_log: Option<PathBuf>,

    /// Parsed form of --kubectl-extra-args, filled in by `validate`.
    #[arg(skip)]
    pub kubectl_args: Vec<String>,
}

impl AppConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }

    pub fn view_max_age(&self) -> Duration {
        Duration::from_secs(self.view_max_age_hours * 60 * 60)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
