use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::cancel::CancelToken;

use super::WsTransport;

/// Ping every half interval. The transport is closed when a ping fails, when no pong has been
/// seen for a full interval, or when the idle deadline passes. Stops when `cancel` fires.
pub fn spawn_keepalive(
    transport: WsTransport,
    interval: Duration,
    cancel: CancelToken,
) -> io::Result<JoinHandle<()>> {
    let tick = interval / 2;
    thread::Builder::new()
        .name("kubeprompt-keepalive".into())
        .spawn(move || loop {
            if cancel.wait_timeout(tick) || transport.is_closed() {
                return;
            }
            if let Err(err) = transport.pump() {
                tracing::debug!(error = %err, "keepalive stopped: transport failed");
                return;
            }
            if transport.since_last_pong() > interval {
                tracing::warn!(
                    interval_secs = interval.as_secs_f64(),
                    "keepalive timeout; closing transport"
                );
                transport.close();
                return;
            }
            if transport.idle_expired() {
                tracing::info!("idle deadline exceeded; closing transport");
                transport.close();
                return;
            }
            if let Err(err) = transport.ping() {
                tracing::debug!(error = %err, "keepalive ping failed");
                return;
            }
        })
}
