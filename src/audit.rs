//! Audit trail of executed commands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{RelayError, RelayResult};
use crate::lock::lock_or_recover;

pub const COMMAND_EVENT_KIND: &str = "kubectl.command.detail";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuditActor {
    pub username: String,
    pub groups: Vec<String>,
    /// Service account or tenant account the user acted through, when known.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub account: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuditClient {
    pub ip: String,
    pub user_agent: String,
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: String,
    pub portal: String,
    pub actor: AuditActor,
    pub client: AuditClient,
    pub project: String,
    pub cluster: String,
    pub message: String,
}

/// Session-wide audit fields; each executed command stamps a fresh record from it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuditContext {
    pub actor: AuditActor,
    pub client: AuditClient,
    pub project: String,
    pub cluster: String,
}

impl AuditContext {
    pub fn command_record(&self, command: &str) -> AuditRecord {
        AuditRecord {
            timestamp: Utc::now(),
            kind: COMMAND_EVENT_KIND.to_string(),
            portal: "ADMIN".to_string(),
            actor: self.actor.clone(),
            client: self.client.clone(),
            project: self.project.clone(),
            cluster: self.cluster.clone(),
            message: strip_ansi_escapes::strip_str(format!("kubectl {command}")),
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord) -> RelayResult<()>;
}

/// Appends one JSON object per line.
#[derive(Debug)]
pub struct FileAuditSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, record: &AuditRecord) -> RelayResult<()> {
        let mut line = serde_json::to_vec(record)
            .map_err(|err| RelayError::Audit(format!("unable to encode record: {err}")))?;
        line.push(b'\n');
        let _guard = lock_or_recover(&self.write_lock, "audit file");
        OpenOptions::new()
            .create(true)
            .append(true)
            .mode(0o644)
            .open(&self.path)
            .and_then(|mut file| file.write_all(&line))
            .map_err(|err| RelayError::Audit(format!("{}: {err}", self.path.display())))
    }
}

/// Keeps records in memory; used where no audit file is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn records(&self) -> Vec<AuditRecord> {
        lock_or_recover(&self.records, "audit memory").clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: &AuditRecord) -> RelayResult<()> {
        lock_or_recover(&self.records, "audit memory").push(record.clone());
        Ok(())
    }
}
