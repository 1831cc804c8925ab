//! Per-session working directories holding the kubeconfig and kubectl's cache.

use sha2::{Digest, Sha256};
use std::fs::{self, DirBuilder, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use super::credentials::SessionKind;
use crate::error::{RelayError, RelayResult, SetupStage};

pub const VIEW_PREFIX: &str = "kubectlview-";
pub const KUBECONFIG_FILE: &str = "kubeconfig.yaml";

/// Random for ephemeral sessions; stable per tenant and cluster for long-lived views.
pub fn session_id(kind: SessionKind, tenant: &str, cluster: &str) -> String {
    match kind {
        SessionKind::Ephemeral => Uuid::new_v4().to_string(),
        SessionKind::View => {
            let digest = Sha256::digest(format!("{tenant}/{cluster}").as_bytes());
            let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
            format!("{VIEW_PREFIX}{}", &hex[..16])
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDir {
    pub id: String,
    pub path: PathBuf,
    pub kind: SessionKind,
}

impl SessionDir {
    pub fn kubeconfig_path(&self) -> PathBuf {
        self.path.join(KUBECONFIG_FILE)
    }

    /// Flags prepended to every kubectl call made for this session.
    pub fn kubectl_args(&self) -> Vec<String> {
        vec![
            format!("--cache-dir={}", self.path.display()),
            format!("--kubeconfig={}", self.kubeconfig_path().display()),
        ]
    }
}

/// Root under which session directories are created.
#[derive(Debug, Clone)]
pub struct SessionDirs {
    root: PathBuf,
}

impl SessionDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create (or reuse, for views) the directory and write the kubeconfig into it.
    pub fn create(
        &self,
        kind: SessionKind,
        tenant: &str,
        cluster: &str,
        kubeconfig: &[u8],
    ) -> RelayResult<SessionDir> {
        let id = session_id(kind, tenant, cluster);
        let path = self.root.join(&id);
        let dir_error = |err: std::io::Error| {
            RelayError::setup(
                SetupStage::SessionDirectory,
                format!("{}: {err}", path.display()),
            )
        };
        DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(&path)
            .map_err(dir_error)?;
        let dir = SessionDir { id, path: path.clone(), kind };
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o644)
            .open(dir.kubeconfig_path())
            .and_then(|mut file| file.write_all(kubeconfig))
            .map_err(dir_error)?;
        tracing::debug!(session_dir = %dir.path.display(), kind = ?kind, "session directory ready");
        Ok(dir)
    }

    /// Remove the directory. Missing directories are not an error.
    pub fn teardown(&self, dir: &SessionDir) {
        match fs::remove_dir_all(&dir.path) {
            Ok(()) => tracing::debug!(session_dir = %dir.path.display(), "session directory removed"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(session_dir = %dir.path.display(), error = %err, "unable to remove session directory")
            }
        }
    }

    /// Delete view directories untouched for longer than `max_age`. Returns how many went.
    pub fn prune_stale(&self, max_age: Duration) -> usize {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::info!(root = %self.root.display(), error = %err, "unable to scan session root");
                return 0;
            }
        };
        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries.filter_map(Result::ok) {
            if !entry.file_name().to_string_lossy().starts_with(VIEW_PREFIX) {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_dir() {
                continue;
            }
            let stale = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age > max_age);
            if !stale {
                continue;
            }
            let path = entry.path();
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    removed += 1;
                    tracing::info!(session_dir = %path.display(), "removed stale view directory");
                }
                Err(err) => {
                    tracing::info!(session_dir = %path.display(), error = %err, "unable to remove stale view directory")
                }
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::os::unix::fs::PermissionsExt;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn age(path: &Path, by: Duration) {
        let file = File::open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    #[test]
    fn view_ids_are_stable_and_ephemeral_ids_are_not() {
        let view = session_id(SessionKind::View, "acme", "prod-eu");
        assert_eq!(view, session_id(SessionKind::View, "acme", "prod-eu"));
        assert_ne!(view, session_id(SessionKind::View, "acme", "prod-us"));
        assert!(view.starts_with(VIEW_PREFIX));
        assert_eq!(view.len(), VIEW_PREFIX.len() + 16);

        let first = session_id(SessionKind::Ephemeral, "acme", "prod-eu");
        assert_ne!(first, session_id(SessionKind::Ephemeral, "acme", "prod-eu"));
        assert!(Uuid::parse_str(&first).is_ok());
    }

    #[test]
    fn create_writes_kubeconfig_and_builds_args() {
        let root = tempfile::tempdir().unwrap();
        let dirs = SessionDirs::new(root.path());
        let dir = dirs
            .create(SessionKind::Ephemeral, "acme", "prod-eu", b"apiVersion: v1\n")
            .unwrap();
        assert_eq!(fs::read(dir.kubeconfig_path()).unwrap(), b"apiVersion: v1\n");
        let mode = fs::metadata(dir.kubeconfig_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o022, 0);
        assert_eq!(
            dir.kubectl_args(),
            vec![
                format!("--cache-dir={}", dir.path.display()),
                format!("--kubeconfig={}/kubeconfig.yaml", dir.path.display()),
            ]
        );

        dirs.teardown(&dir);
        assert!(!dir.path.exists());
        dirs.teardown(&dir);
    }

    #[test]
    fn view_directory_is_reused_and_rewritten() {
        let root = tempfile::tempdir().unwrap();
        let dirs = SessionDirs::new(root.path());
        let first = dirs.create(SessionKind::View, "acme", "prod-eu", b"old").unwrap();
        let second = dirs.create(SessionKind::View, "acme", "prod-eu", b"new").unwrap();
        assert_eq!(first.path, second.path);
        assert_eq!(fs::read(second.kubeconfig_path()).unwrap(), b"new");
    }

    #[test]
    fn create_reports_unusable_root() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("not-a-dir");
        File::create(&blocker).unwrap();
        let err = SessionDirs::new(&blocker)
            .create(SessionKind::Ephemeral, "acme", "prod-eu", b"")
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::Setup {
                stage: SetupStage::SessionDirectory,
                ..
            }
        ));
    }

    #[test]
    fn prune_removes_only_stale_view_directories() {
        let root = tempfile::tempdir().unwrap();
        let dirs = SessionDirs::new(root.path());
        let stale = dirs.create(SessionKind::View, "acme", "old", b"").unwrap();
        let fresh = dirs.create(SessionKind::View, "acme", "new", b"").unwrap();
        let ephemeral = dirs.create(SessionKind::Ephemeral, "acme", "old", b"").unwrap();
        age(&stale.path, DAY * 2);
        age(&ephemeral.path, DAY * 2);

        assert_eq!(dirs.prune_stale(DAY), 1);
        assert!(!stale.path.exists());
        assert!(fresh.path.exists());
        assert!(ephemeral.path.exists());
    }
}
