//! One websocket session: request parsing, provisioning, and the prompt loop.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tungstenite::http::HeaderMap;

use super::auth::{AuthContext, DevAuth, HeaderAuth, Identity};
use super::credentials::{
    ClusterCredentialProvider, CredentialRequest, KubeconfigDirProvider, SessionKind,
};
use super::session_dir::{SessionDir, SessionDirs};
use crate::audit::{AuditActor, AuditClient, AuditContext, AuditSink, FileAuditSink};
use crate::cancel::CancelToken;
use crate::config::AppConfig;
use crate::error::{RelayError, RelayResult, SetupStage};
use crate::kube::{
    CachedLister, CommandRunner, FlagCatalog, InteractiveMatch, KubeCompleter, KubectlExecutor,
    KubectlLister, KubectlRunner, DEFAULT_CACHE_TTL, EXIT_COMMAND,
};
use crate::prompt::{
    Color, CompletionManager, ConsoleInput, ExitReason, KeyBindMode, PathCompleter, Prompt,
    RenderStyle, Renderer, FILE_PATH_SEPARATOR,
};
use crate::transport::{spawn_keepalive, FrameConn, WsTransport};

pub const PROMPT_ROUTE: &str = "/v2/debug/prompt/";
pub const PROMPT_PREFIX: &str = "kubectl ";
pub const PROMPT_TITLE: &str = "kubeprompt: interactive kubernetes client";
const PRIME_TIMEOUT: Duration = Duration::from_secs(60);

/// What the client asked for, decoded from the upgrade URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub project: String,
    pub cluster: String,
    pub kind: SessionKind,
    pub rows: u16,
    pub cols: u16,
    pub namespace: Option<String>,
    /// Command executed before the first keystroke (`cargs`, base64).
    pub preset: Option<String>,
}

fn request_error(message: impl std::fmt::Display) -> RelayError {
    RelayError::setup(SetupStage::Request, message)
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        let byte = bytes[index];
        let escaped = (byte == b'%')
            .then(|| raw.get(index + 1..index + 3))
            .flatten()
            .and_then(|hex| u8::from_str_radix(hex, 16).ok());
        match escaped {
            Some(value) => {
                decoded.push(value);
                index += 3;
            }
            None => {
                decoded.push(if byte == b'+' { b' ' } else { byte });
                index += 1;
            }
        }
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

pub(crate) fn query_param(query: &str, key: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        (name == key).then(|| percent_decode(value))
    })
}

fn dimension(query: &str, key: &str) -> RelayResult<u16> {
    let raw = query_param(query, key).ok_or_else(|| request_error(format!("missing {key}")))?;
    raw.parse::<u16>()
        .map_err(|err| request_error(format!("invalid {key} {raw:?}: {err}")))
}

fn decode_preset(encoded: &str) -> Option<String> {
    match STANDARD.decode(encoded.trim()) {
        Ok(bytes) => String::from_utf8(bytes)
            .ok()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty()),
        Err(err) => {
            tracing::info!(error = %err, "ignoring undecodable preset command");
            None
        }
    }
}

impl SessionRequest {
    /// `path` is `/v2/debug/prompt/[view/]project/{project}/cluster/{cluster}`.
    pub fn parse(path: &str, query: Option<&str>) -> RelayResult<Self> {
        let rest = path
            .strip_prefix(PROMPT_ROUTE)
            .ok_or_else(|| request_error(format!("unknown route {path}")))?;
        let (kind, rest) = match rest.strip_prefix("view/") {
            Some(rest) => (SessionKind::View, rest),
            None => (SessionKind::Ephemeral, rest),
        };
        let segments: Vec<&str> = rest.trim_end_matches('/').split('/').collect();
        let (project, cluster) = match segments.as_slice() {
            ["project", project, "cluster", cluster] if !project.is_empty() && !cluster.is_empty() => {
                (*project, *cluster)
            }
            _ => return Err(request_error(format!("unknown route {path}"))),
        };

        let query = query.unwrap_or_default();
        Ok(Self {
            project: percent_decode(project),
            cluster: percent_decode(cluster),
            kind,
            rows: dimension(query, "rows")?,
            cols: dimension(query, "cols")?,
            namespace: query_param(query, "namespace").filter(|ns| !ns.is_empty()),
            preset: query_param(query, "cargs").and_then(|encoded| decode_preset(&encoded)),
        })
    }
}

/// Per-session knobs taken from the command line.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub extra_args: Vec<String>,
    pub default_namespace: String,
    pub idle_timeout: Duration,
    pub keepalive: Duration,
    pub max_suggestions: u16,
    pub key_bind_mode: KeyBindMode,
    pub interactive_match: InteractiveMatch,
}

impl SessionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            extra_args: config.kubectl_args.clone(),
            default_namespace: config.default_namespace.clone(),
            idle_timeout: config.idle_timeout(),
            keepalive: config.keepalive(),
            max_suggestions: config.max_suggestions,
            key_bind_mode: config.key_bind_mode,
            interactive_match: config.interactive_match,
        }
    }
}

/// A provisioned session waiting for its websocket.
#[derive(Debug)]
pub struct PreparedSession {
    pub request: SessionRequest,
    pub identity: Identity,
    pub dir: SessionDir,
    pub client: AuditClient,
}

/// Shared services behind every connection.
pub struct Relay {
    auth: Arc<dyn AuthContext>,
    credentials: Arc<dyn ClusterCredentialProvider>,
    dirs: SessionDirs,
    runner: Arc<dyn CommandRunner>,
    catalog: Arc<FlagCatalog>,
    audit: Arc<dyn AuditSink>,
    settings: SessionSettings,
}

impl Relay {
    pub fn new(
        auth: Arc<dyn AuthContext>,
        credentials: Arc<dyn ClusterCredentialProvider>,
        dirs: SessionDirs,
        runner: Arc<dyn CommandRunner>,
        catalog: Arc<FlagCatalog>,
        audit: Arc<dyn AuditSink>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            auth,
            credentials,
            dirs,
            runner,
            catalog,
            audit,
            settings,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let auth: Arc<dyn AuthContext> = if config.dev {
            tracing::warn!(user = %config.user_name, "development mode: requests are not authenticated");
            Arc::new(DevAuth::new(config.user_name.clone()))
        } else {
            Arc::new(HeaderAuth::new(
                config.auth_user_header.clone(),
                config.auth_groups_header.clone(),
            ))
        };
        let catalog = FlagCatalog::load(config.flag_catalog.as_deref())
            .context("failed to load flag catalog")?;
        fs::create_dir_all(&config.temp_path).with_context(|| {
            format!("failed to create temp path {}", config.temp_path.display())
        })?;
        if let Some(parent) = config.audit_log.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), error = %err, "audit log directory unavailable");
            }
        }
        Ok(Self::new(
            auth,
            Arc::new(KubeconfigDirProvider::new(config.kubeconfig_dir.clone())),
            SessionDirs::new(config.temp_path.clone()),
            Arc::new(KubectlRunner::new(config.kubectl_bin.clone())),
            Arc::new(catalog),
            Arc::new(FileAuditSink::new(config.audit_log.clone())),
            SessionSettings::from_config(config),
        ))
    }

    pub fn dirs(&self) -> &SessionDirs {
        &self.dirs
    }

    /// Identity, request, credentials, then the session directory. Runs inside the handshake
    /// so any failure rejects the upgrade.
    pub fn prepare(
        &self,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        client: AuditClient,
    ) -> RelayResult<PreparedSession> {
        let identity = self.auth.identify(headers)?;
        let request = SessionRequest::parse(path, query)?;
        let kubeconfig = self.credentials.kubeconfig(&CredentialRequest {
            identity: &identity,
            project: &request.project,
            cluster: &request.cluster,
            namespace: request.namespace.as_deref(),
            kind: request.kind,
        })?;
        let dir = self
            .dirs
            .create(request.kind, &request.project, &request.cluster, &kubeconfig)?;
        tracing::info!(
            session_id = %dir.id,
            user = %identity.username,
            project = %request.project,
            cluster = %request.cluster,
            kind = ?request.kind,
            "session prepared"
        );
        Ok(PreparedSession {
            request,
            identity,
            dir,
            client,
        })
    }

    /// Release a prepared session whose websocket never opened.
    pub fn abandon(&self, prepared: &PreparedSession) {
        if prepared.dir.kind == SessionKind::Ephemeral {
            self.dirs.teardown(&prepared.dir);
        }
    }

    fn kubectl_args(&self, dir: &SessionDir) -> Vec<String> {
        let mut args = dir.kubectl_args();
        args.extend(self.settings.extra_args.iter().cloned());
        args
    }

    fn prime_cache(&self, args: &[String], cancel: &CancelToken) {
        let runner = Arc::clone(&self.runner);
        let cancel = cancel.clone();
        let mut args = args.to_vec();
        args.push("api-resources".to_string());
        let spawned = thread::Builder::new()
            .name("kubeprompt-prime".into())
            .spawn(move || match runner.run(&args, &cancel, Some(PRIME_TIMEOUT)) {
                Ok(output) if output.success() => tracing::debug!("discovery cache primed"),
                Ok(output) => tracing::debug!(exit_code = output.code, "discovery priming failed"),
                Err(err) => tracing::debug!(error = %err, "discovery priming failed"),
            });
        if let Err(err) = spawned {
            tracing::warn!(error = %err, "unable to start discovery priming");
        }
    }

    /// Drive the prompt over `conn` until the client leaves. Teardown has run when this returns.
    pub fn run_session(&self, prepared: PreparedSession, conn: impl FrameConn + 'static) -> ExitReason {
        let PreparedSession {
            request,
            identity,
            dir,
            client,
        } = prepared;
        let transport = WsTransport::new(conn, self.settings.idle_timeout);
        let session = TransportSession {
            transport: transport.clone(),
            cancel: CancelToken::new(),
            dirs: self.dirs.clone(),
            dir,
            torn_down: AtomicBool::new(false),
        };
        let cancel = session.cancel.clone();
        let args = self.kubectl_args(&session.dir);
        self.prime_cache(&args, &cancel);

        let keepalive = match spawn_keepalive(transport.clone(), self.settings.keepalive, cancel.clone()) {
            Ok(handle) => handle,
            Err(err) => {
                tracing::error!(session_id = %session.dir.id, error = %err, "unable to start keepalive");
                session.teardown();
                return ExitReason::TransportClosed;
            }
        };

        let namespace = request
            .namespace
            .clone()
            .unwrap_or_else(|| self.settings.default_namespace.clone());
        let lister = CachedLister::new(
            KubectlLister::new(Arc::clone(&self.runner), args.clone()).with_cancel(cancel.clone()),
            DEFAULT_CACHE_TTL,
        );
        let completer = KubeCompleter::new(
            Arc::clone(&self.catalog),
            Arc::new(lister),
            PathCompleter::hidden(session.dir.path.clone()),
            namespace,
        );
        let completion = CompletionManager::new(Box::new(completer), self.settings.max_suggestions)
            .with_word_separator(FILE_PATH_SEPARATOR);
        let renderer = Renderer::new(transport.clone(), request.rows, request.cols)
            .with_prefix(PROMPT_PREFIX)
            .with_title(PROMPT_TITLE)
            .with_style(RenderStyle {
                prefix: Color::Green,
                input: Color::Yellow,
                ..RenderStyle::default()
            });

        let input: Arc<dyn ConsoleInput> = Arc::new(transport.clone());
        let audit = AuditContext {
            actor: AuditActor {
                username: identity.username.clone(),
                groups: identity.groups.clone(),
                account: String::new(),
            },
            client,
            project: request.project.clone(),
            cluster: request.cluster.clone(),
        };
        let executor = KubectlExecutor::new(
            transport.clone(),
            Arc::clone(&input),
            Arc::clone(&self.runner),
            args,
            request.rows,
            request.cols,
        )
        .with_interactive_match(self.settings.interactive_match)
        .with_audit(Arc::clone(&self.audit), audit);

        let mut prompt = Prompt::new(input, renderer, executor, completion)
            .with_key_bind_mode(self.settings.key_bind_mode)
            .with_exit_checker(|text, breakline| breakline && text.trim() == EXIT_COMMAND);

        tracing::info!(session_id = %session.dir.id, "session started");
        let reason = match request.preset.as_deref() {
            Some(command) => prompt.run_preset(&cancel, command),
            None => prompt.run(&cancel),
        };
        tracing::info!(session_id = %session.dir.id, ?reason, "session ended");

        session.teardown();
        if keepalive.join().is_err() {
            tracing::warn!(session_id = %session.dir.id, "keepalive thread panicked");
        }
        reason
    }
}

/// Owns everything a session must release. Teardown runs once, on first call or on drop.
struct TransportSession {
    transport: WsTransport,
    cancel: CancelToken,
    dirs: SessionDirs,
    dir: SessionDir,
    torn_down: AtomicBool,
}

impl TransportSession {
    fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        self.transport.close();
        if self.dir.kind == SessionKind::Ephemeral {
            self.dirs.teardown(&self.dir);
        }
        tracing::debug!(session_id = %self.dir.id, "session torn down");
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
