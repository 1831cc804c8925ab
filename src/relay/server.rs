//! Blocking websocket listener: one thread per connection.

use anyhow::{Context, Result};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::{HeaderMap, HeaderValue, StatusCode};
use tungstenite::accept_hdr;

use super::handler::{PreparedSession, Relay};
use super::session_dir::SessionDirs;
use crate::audit::AuditClient;
use crate::cancel::CancelToken;
use crate::config::AppConfig;
use crate::error::RelayError;

const SUBPROTOCOL: &str = "binary";
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Bind, start the stale-directory sweeper, and accept forever.
pub fn serve(config: &AppConfig) -> Result<()> {
    let relay = Arc::new(Relay::from_config(config)?);
    let addr = config.listen_addr();
    let listener =
        TcpListener::bind(&addr).with_context(|| format!("failed to bind {addr}"))?;
    let _pruner = spawn_pruner(
        relay.dirs().clone(),
        config.prune_interval(),
        config.view_max_age(),
        CancelToken::new(),
    )
    .context("failed to start session directory sweeper")?;
    tracing::info!(addr = %addr, "kubeprompt listening");
    serve_listener(listener, relay)
}

/// Accept loop over an already bound listener.
pub fn serve_listener(listener: TcpListener, relay: Arc<Relay>) -> Result<()> {
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(error = %err, "accept failed");
                continue;
            }
        };
        let relay = Arc::clone(&relay);
        let spawned = thread::Builder::new()
            .name("kubeprompt-session".into())
            .spawn(move || handle_connection(stream, &relay));
        if let Err(err) = spawned {
            tracing::error!(error = %err, "unable to start session thread");
        }
    }
    Ok(())
}

/// Remove stale long-lived view directories every `interval` until `cancel` fires.
pub fn spawn_pruner(
    dirs: SessionDirs,
    interval: Duration,
    max_age: Duration,
    cancel: CancelToken,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("kubeprompt-prune".into())
        .spawn(move || {
            while !cancel.wait_timeout(interval) {
                let removed = dirs.prune_stale(max_age);
                if removed > 0 {
                    tracing::info!(removed, "pruned stale view directories");
                }
            }
        })
}

fn header_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn audit_client(request: &Request, peer: Option<SocketAddr>) -> AuditClient {
    let headers = request.headers();
    let forwarded = header_value(headers, "X-Forwarded-For");
    let ip = match forwarded.split(',').next().map(str::trim) {
        Some(first) if !first.is_empty() => first.to_string(),
        _ => peer.map(|addr| addr.ip().to_string()).unwrap_or_default(),
    };
    AuditClient {
        ip,
        user_agent: header_value(headers, "User-Agent"),
        host: header_value(headers, "Host"),
    }
}

fn wants_subprotocol(headers: &HeaderMap) -> bool {
    headers
        .get_all("Sec-WebSocket-Protocol")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|protocol| protocol.trim() == SUBPROTOCOL)
}

pub(crate) fn rejection(err: &RelayError) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(err.to_string()));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

/// Pair the upgraded socket with its prepared session, releasing the session when the
/// handshake failed after setup already ran.
fn complete_upgrade<S>(
    relay: &Relay,
    handshake: Result<S, String>,
    prepared: Option<PreparedSession>,
) -> Option<(S, PreparedSession)> {
    match (handshake, prepared) {
        (Ok(socket), Some(prepared)) => Some((socket, prepared)),
        (Ok(_), None) => None,
        (Err(err), prepared) => {
            tracing::info!(error = %err, "websocket handshake failed");
            if let Some(prepared) = prepared {
                relay.abandon(&prepared);
            }
            None
        }
    }
}

fn handle_connection(stream: TcpStream, relay: &Relay) {
    let peer = stream.peer_addr().ok();
    if let Err(err) = stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT)) {
        tracing::debug!(error = %err, "unable to set handshake timeout");
    }

    let mut prepared: Option<PreparedSession> = None;
    let callback = |request: &Request, mut response: Response| {
        let client = audit_client(request, peer);
        match relay.prepare(
            request.uri().path(),
            request.uri().query(),
            request.headers(),
            client,
        ) {
            Ok(session) => {
                prepared = Some(session);
                if wants_subprotocol(request.headers()) {
                    response.headers_mut().insert(
                        "Sec-WebSocket-Protocol",
                        HeaderValue::from_static(SUBPROTOCOL),
                    );
                }
                Ok(response)
            }
            Err(err) => {
                tracing::info!(path = request.uri().path(), error = %err, "rejecting session");
                Err(rejection(&err))
            }
        }
    };

    // The handshake error owns the callback; flatten it so `prepared` is free again.
    let handshake = accept_hdr(stream, callback).map_err(|err| err.to_string());
    let Some((socket, prepared)) = complete_upgrade(relay, handshake, prepared) else {
        return;
    };

    let configured = socket
        .get_ref()
        .set_read_timeout(None)
        .and_then(|()| socket.get_ref().set_nonblocking(true));
    if let Err(err) = configured {
        tracing::warn!(error = %err, "unable to configure websocket stream");
        relay.abandon(&prepared);
        return;
    }
    relay.run_session(prepared, socket);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::kube::{FlagCatalog, InteractiveMatch, KubectlRunner};
    use crate::prompt::KeyBindMode;
    use crate::relay::{DevAuth, KubeconfigDirProvider, SessionSettings};

    fn request(headers: &[(&str, &str)]) -> Request {
        let mut builder = Request::builder().uri("/v2/debug/prompt/project/p/cluster/c");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn audit_client_prefers_forwarded_address() {
        let req = request(&[
            ("X-Forwarded-For", "203.0.113.9, 10.0.0.1"),
            ("User-Agent", "Mozilla/5.0"),
            ("Host", "console.example.com"),
        ]);
        let client = audit_client(&req, "127.0.0.1:5000".parse().ok());
        assert_eq!(client.ip, "203.0.113.9");
        assert_eq!(client.user_agent, "Mozilla/5.0");
        assert_eq!(client.host, "console.example.com");

        let bare = audit_client(&request(&[]), "127.0.0.1:5000".parse().ok());
        assert_eq!(bare.ip, "127.0.0.1");
    }

    #[test]
    fn subprotocol_is_matched_in_lists() {
        let req = request(&[("Sec-WebSocket-Protocol", "tty, binary")]);
        assert!(wants_subprotocol(req.headers()));
        assert!(!wants_subprotocol(request(&[]).headers()));
    }

    fn relay_over(root: &std::path::Path) -> Relay {
        let clusters = root.join("clusters");
        std::fs::create_dir_all(&clusters).unwrap();
        std::fs::write(clusters.join("prod-eu.yaml"), "apiVersion: v1\nkind: Config\n").unwrap();
        Relay::new(
            Arc::new(DevAuth::new("ada")),
            Arc::new(KubeconfigDirProvider::new(&clusters)),
            SessionDirs::new(root.join("sessions")),
            Arc::new(KubectlRunner::new("kubectl")),
            Arc::new(FlagCatalog::builtin().unwrap()),
            Arc::new(MemoryAuditSink::default()),
            SessionSettings {
                extra_args: Vec::new(),
                default_namespace: "default".to_string(),
                idle_timeout: Duration::from_secs(600),
                keepalive: Duration::from_secs(60),
                max_suggestions: 6,
                key_bind_mode: KeyBindMode::Common,
                interactive_match: InteractiveMatch::Substring,
            },
        )
    }

    fn prepare(relay: &Relay, path: &str) -> PreparedSession {
        relay
            .prepare(path, Some("rows=24&cols=80"), &HeaderMap::new(), AuditClient::default())
            .unwrap()
    }

    #[test]
    fn failed_handshake_removes_ephemeral_directory() {
        let root = tempfile::tempdir().unwrap();
        let relay = relay_over(root.path());
        let prepared = prepare(&relay, "/v2/debug/prompt/project/shop/cluster/prod-eu");
        let path = prepared.dir.path.clone();
        assert!(path.exists());

        let upgraded = complete_upgrade::<()>(&relay, Err("connection reset".to_string()), Some(prepared));
        assert!(upgraded.is_none());
        assert!(!path.exists());
    }

    #[test]
    fn failed_handshake_keeps_view_directory() {
        let root = tempfile::tempdir().unwrap();
        let relay = relay_over(root.path());
        let prepared = prepare(&relay, "/v2/debug/prompt/view/project/shop/cluster/prod-eu");
        let path = prepared.dir.path.clone();

        assert!(complete_upgrade::<()>(&relay, Err("eof".to_string()), Some(prepared)).is_none());
        assert!(path.exists());
    }

    #[test]
    fn successful_handshake_hands_back_the_session() {
        let root = tempfile::tempdir().unwrap();
        let relay = relay_over(root.path());
        let prepared = prepare(&relay, "/v2/debug/prompt/project/shop/cluster/prod-eu");
        let path = prepared.dir.path.clone();

        let (socket, session) = complete_upgrade(&relay, Ok(7u8), Some(prepared)).unwrap();
        assert_eq!(socket, 7);
        assert_eq!(session.dir.path, path);
        assert!(path.exists());
    }

    #[test]
    fn setup_errors_become_internal_server_errors() {
        let response = rejection(&RelayError::setup(
            crate::error::SetupStage::Credentials,
            "no kubeconfig",
        ));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.body().as_deref().unwrap().contains("no kubeconfig"));
    }
}
