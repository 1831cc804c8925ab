use super::defaults::{FORBIDDEN_BINARY_CHARS, MAX_SUGGESTIONS_LIMIT, MIN_KEEPALIVE_SECS};
use super::AppConfig;
use anyhow::{bail, Context, Result};
use clap::Parser;

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and derive the parsed kubectl argument list.
    pub fn validate(&mut self) -> Result<()> {
        if self.port == 0 {
            bail!("--port must be non-zero");
        }
        if self.keepalive_secs < MIN_KEEPALIVE_SECS {
            bail!(
                "--keepalive-secs must be at least {MIN_KEEPALIVE_SECS}, got {}",
                self.keepalive_secs
            );
        }
        if self.keepalive_secs >= self.idle_timeout_secs {
            bail!(
                "--keepalive-secs ({}) must be less than --idle-timeout-secs ({})",
                self.keepalive_secs,
                self.idle_timeout_secs
            );
        }
        if self.prune_interval_secs == 0 {
            bail!("--prune-interval-secs must be at least 1");
        }
        if self.view_max_age_hours == 0 {
            bail!("--view-max-age-hours must be at least 1");
        }
        if !(1..=MAX_SUGGESTIONS_LIMIT).contains(&self.max_suggestions) {
            bail!(
                "--max-suggestions must be between 1 and {MAX_SUGGESTIONS_LIMIT}, got {}",
                self.max_suggestions
            );
        }
        if self.default_namespace.trim().is_empty() {
            bail!("--default-namespace must not be empty");
        }

        self.kubectl_bin = sanitize_binary(&self.kubectl_bin, "--kubectl-bin")?;
        self.kubectl_args = shell_words::split(&self.kubectl_extra_args)
            .with_context(|| {
                format!(
                    "failed to parse --kubectl-extra-args '{}'",
                    self.kubectl_extra_args
                )
            })?;

        if self.dev && self.user_name.trim().is_empty() {
            bail!("--dev requires --user-name");
        }

        Ok(())
    }
}

/// The binary is exec'd directly, but the value also lands in audit records and logs, so keep
/// it to a plain path.
pub(super) fn sanitize_binary(value: &str, flag: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("{flag} cannot be empty");
    }
    if trimmed.len() > 4096 || trimmed.chars().any(|ch| FORBIDDEN_BINARY_CHARS.contains(&ch)) {
        bail!("{flag} must be a plain path without shell metacharacters");
    }
    Ok(trimmed.to_string())
}
