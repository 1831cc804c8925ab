use super::validation::sanitize_binary;
use super::AppConfig;
use crate::kube::InteractiveMatch;
use crate::prompt::KeyBindMode;
use clap::Parser;
use std::time::Duration;

#[test]
fn defaults_validate() {
    let mut cfg = AppConfig::parse_from(["test-app"]);
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.port, 7009);
    assert_eq!(cfg.idle_timeout(), Duration::from_secs(1200));
    assert_eq!(cfg.keepalive(), Duration::from_secs(60));
    assert_eq!(cfg.view_max_age(), Duration::from_secs(24 * 3600));
    assert_eq!(cfg.key_bind_mode, KeyBindMode::Common);
    assert_eq!(cfg.interactive_match, InteractiveMatch::Substring);
    assert!(cfg.kubectl_args.is_empty());
}

#[test]
fn rejects_zero_port() {
    let mut cfg = AppConfig::parse_from(["test-app", "--port", "0"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_keepalive_not_below_idle_timeout() {
    let mut cfg = AppConfig::parse_from([
        "test-app",
        "--keepalive-secs",
        "30",
        "--idle-timeout-secs",
        "30",
    ]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--keepalive-secs", "1"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from([
        "test-app",
        "--keepalive-secs",
        "2",
        "--idle-timeout-secs",
        "3",
    ]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn rejects_max_suggestions_out_of_bounds() {
    let mut cfg = AppConfig::parse_from(["test-app", "--max-suggestions", "0"]);
    assert!(cfg.validate().is_err());
    let mut cfg = AppConfig::parse_from(["test-app", "--max-suggestions", "21"]);
    assert!(cfg.validate().is_err());
    let mut cfg = AppConfig::parse_from(["test-app", "--max-suggestions", "20"]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn rejects_zero_prune_and_age() {
    let mut cfg = AppConfig::parse_from(["test-app", "--prune-interval-secs", "0"]);
    assert!(cfg.validate().is_err());
    let mut cfg = AppConfig::parse_from(["test-app", "--view-max-age-hours", "0"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn splits_extra_kubectl_args() {
    let mut cfg = AppConfig::parse_from([
        "test-app",
        "--kubectl-extra-args",
        "--request-timeout=30s --user 'ops admin'",
    ]);
    cfg.validate().expect("valid config");
    assert_eq!(
        cfg.kubectl_args,
        vec!["--request-timeout=30s", "--user", "ops admin"]
    );
}

#[test]
fn rejects_unbalanced_extra_args() {
    let mut cfg = AppConfig::parse_from(["test-app", "--kubectl-extra-args", "--user 'ops"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn dev_mode_requires_user_name() {
    let mut cfg = AppConfig::parse_from(["test-app", "--dev"]);
    assert!(cfg.validate().is_err());
    let mut cfg = AppConfig::parse_from(["test-app", "--dev", "--user-name", "alice"]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn parses_value_enums() {
    let cfg = AppConfig::parse_from([
        "test-app",
        "--key-bind-mode",
        "emacs",
        "--interactive-match",
        "verb",
    ]);
    assert_eq!(cfg.key_bind_mode, KeyBindMode::Emacs);
    assert_eq!(cfg.interactive_match, InteractiveMatch::Verb);
}

#[test]
fn sanitize_binary_rejects_metacharacters() {
    assert!(sanitize_binary("kubectl; rm -rf /", "--kubectl-bin").is_err());
    assert!(sanitize_binary("$(whoami)", "--kubectl-bin").is_err());
    assert!(sanitize_binary("  ", "--kubectl-bin").is_err());
    assert_eq!(
        sanitize_binary(" /usr/bin/kubectl ", "--kubectl-bin").unwrap(),
        "/usr/bin/kubectl"
    );
}
