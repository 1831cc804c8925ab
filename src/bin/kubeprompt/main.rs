//! kubeprompt - interactive kubectl prompt served over websockets.
//!
//! Each websocket connection gets its own kubeconfig, a line editor with kubectl-aware
//! completion, and PTY passthrough for interactive commands such as `exec` and `edit`.

use anyhow::Result;
use kubeprompt::config::AppConfig;
use kubeprompt::{init_tracing, relay};

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;
    init_tracing(&config);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.listen_addr(),
        kubectl = %config.kubectl_bin,
        dev = config.dev,
        "starting kubeprompt"
    );
    relay::serve(&config)
}
