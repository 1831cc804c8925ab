pub const DEFAULT_PORT: u16 = 7009;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_TEMP_PATH: &str = "/tmp";
pub const DEFAULT_KUBECTL_BIN: &str = "/usr/local/bin/kubectl";
pub const DEFAULT_KUBECONFIG_DIR: &str = "/etc/kubeprompt/clusters";
pub const DEFAULT_AUDIT_LOG: &str = "/var/log/kubeprompt/audit.log";
pub const DEFAULT_NAMESPACE: &str = "default";

pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 20 * 60;
pub const DEFAULT_KEEPALIVE_SECS: u64 = 60;
pub const MIN_KEEPALIVE_SECS: u64 = 2;
pub const DEFAULT_PRUNE_INTERVAL_SECS: u64 = 5 * 60;
pub const DEFAULT_VIEW_MAX_AGE_HOURS: u64 = 24;

pub const DEFAULT_MAX_SUGGESTIONS: u16 = 6;
pub const MAX_SUGGESTIONS_LIMIT: u16 = 20;

/// Characters that must never appear in the kubectl binary path.
pub(super) const FORBIDDEN_BINARY_CHARS: &[char] = &[
    ';', '|', '&', '$', '`', '<', '>', '(', ')', '{', '}', '*', '?', '!', '\'', '"', '\\', ' ',
    '\n', '\r', '\t',
];
