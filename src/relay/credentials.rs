//! Cluster credentials handed to kubectl through a per-session kubeconfig.

use serde_yaml::Value;
use std::fs;
use std::path::PathBuf;

use super::auth::Identity;
use crate::error::{RelayError, RelayResult, SetupStage};

/// Ephemeral sessions get a fresh directory that dies with the connection; long-lived views
/// reuse one directory per tenant and cluster so kubectl's discovery cache survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Ephemeral,
    View,
}

#[derive(Debug, Clone, Copy)]
pub struct CredentialRequest<'a> {
    pub identity: &'a Identity,
    pub project: &'a str,
    pub cluster: &'a str,
    pub namespace: Option<&'a str>,
    pub kind: SessionKind,
}

pub trait ClusterCredentialProvider: Send + Sync {
    /// Kubeconfig bytes for the requested cluster.
    fn kubeconfig(&self, request: &CredentialRequest<'_>) -> RelayResult<Vec<u8>>;
}

/// Serves `<dir>/<cluster>.yaml`, pinning every context to the requested namespace.
#[derive(Debug, Clone)]
pub struct KubeconfigDirProvider {
    dir: PathBuf,
}

impl KubeconfigDirProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

fn credentials_error(message: impl std::fmt::Display) -> RelayError {
    RelayError::setup(SetupStage::Credentials, message)
}

/// Cluster names become file names; keep them to one plain path segment.
fn valid_cluster_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
}

fn pin_namespace(config: &mut Value, namespace: &str) {
    let Some(contexts) = config.get_mut("contexts").and_then(Value::as_sequence_mut) else {
        return;
    };
    for entry in contexts {
        if let Some(Value::Mapping(context)) = entry.get_mut("context") {
            context.insert(
                Value::from("namespace"),
                Value::from(namespace.to_string()),
            );
        }
    }
}

impl ClusterCredentialProvider for KubeconfigDirProvider {
    fn kubeconfig(&self, request: &CredentialRequest<'_>) -> RelayResult<Vec<u8>> {
        if !valid_cluster_name(request.cluster) {
            return Err(credentials_error(format!(
                "invalid cluster name {:?}",
                request.cluster
            )));
        }
        let path = self.dir.join(format!("{}.yaml", request.cluster));
        let source = fs::read_to_string(&path)
            .map_err(|err| credentials_error(format!("{}: {err}", path.display())))?;
        let mut config: Value = serde_yaml::from_str(&source)
            .map_err(|err| credentials_error(format!("{}: {err}", path.display())))?;
        if !config.is_mapping() {
            return Err(credentials_error(format!(
                "{}: kubeconfig is not a mapping",
                path.display()
            )));
        }
        if let Some(namespace) = request.namespace.filter(|ns| !ns.is_empty()) {
            pin_namespace(&mut config, namespace);
        }
        tracing::debug!(
            user = %request.identity.username,
            project = request.project,
            cluster = request.cluster,
            kind = ?request.kind,
            "issued cluster credentials"
        );
        serde_yaml::to_string(&config)
            .map(String::into_bytes)
            .map_err(credentials_error)
    }
}
