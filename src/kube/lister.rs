//! Live name lookups used by completion, with a short-lived cache in front.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::arguments::lookup_kind;
use super::runner::CommandRunner;
use crate::cancel::CancelToken;
use crate::error::{RelayError, RelayResult};
use crate::lock::lock_or_recover;
use crate::prompt::Suggestion;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Lookup {
    Namespaces,
    /// Names of `kind` (canonical plural); `namespace` is ignored for cluster-scoped kinds.
    Resources { kind: String, namespace: String },
    /// Containers of one pod, or of every pod in the namespace.
    Containers {
        namespace: String,
        pod: Option<String>,
    },
}

impl Lookup {
    pub fn describe(&self) -> String {
        match self {
            Lookup::Namespaces => "namespaces".to_string(),
            Lookup::Resources { kind, namespace } => format!("{kind} in {namespace}"),
            Lookup::Containers {
                namespace,
                pod: Some(pod),
            } => format!("containers of {namespace}/{pod}"),
            Lookup::Containers {
                namespace,
                pod: None,
            } => format!("containers in {namespace}"),
        }
    }
}

pub trait ResourceLister: Send + Sync {
    fn list(&self, lookup: &Lookup) -> RelayResult<Vec<Suggestion>>;
}

/// Memoizes lookups for `ttl`. Failures are cached as empty lists so a denied query is not
/// retried on every keystroke.
pub struct CachedLister<L> {
    inner: L,
    ttl: Duration,
    entries: Mutex<HashMap<Lookup, (Instant, Vec<Suggestion>)>>,
}

impl<L: ResourceLister> CachedLister<L> {
    pub fn new(inner: L, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<L: ResourceLister> ResourceLister for CachedLister<L> {
    fn list(&self, lookup: &Lookup) -> RelayResult<Vec<Suggestion>> {
        {
            let entries = lock_or_recover(&self.entries, "lister cache");
            if let Some((fetched, suggestions)) = entries.get(lookup) {
                if fetched.elapsed() < self.ttl {
                    return Ok(suggestions.clone());
                }
            }
        }
        let suggestions = match self.inner.list(lookup) {
            Ok(suggestions) => suggestions,
            Err(err) => {
                tracing::debug!(error = %err, "completion lookup failed");
                Vec::new()
            }
        };
        lock_or_recover(&self.entries, "lister cache")
            .insert(lookup.clone(), (Instant::now(), suggestions.clone()));
        Ok(suggestions)
    }
}

/// Answers lookups by running `get ... -o jsonpath=...` through the CLI.
pub struct KubectlLister {
    runner: Arc<dyn CommandRunner>,
    base_args: Vec<String>,
    cancel: CancelToken,
}

fn description_path(kind: &str) -> &'static str {
    match kind {
        "pods" | "namespaces" | "persistentvolumeclaims" | "persistentvolumes" => "{.status.phase}",
        "services" => "{.spec.type}",
        "nodes" => "{.status.nodeInfo.kubeletVersion}",
        _ => "{.metadata.creationTimestamp}",
    }
}

fn name_listing(kind: &str) -> String {
    format!(
        "jsonpath={{range .items[*]}}{{.metadata.name}}{{\"\\t\"}}{}{{\"\\n\"}}{{end}}",
        description_path(kind)
    )
}

fn parse_rows(output: &str) -> Vec<Suggestion> {
    output
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once('\t') {
            Some((name, description)) => Suggestion::new(name, description),
            None => Suggestion::new(line, ""),
        })
        .collect()
}

fn parse_containers(output: &str, pod: Option<&str>) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();
    for line in output.lines().filter(|line| !line.trim().is_empty()) {
        let (owner, names) = match (pod, line.split_once('\t')) {
            (Some(pod), _) => (pod, line),
            (None, Some((owner, names))) => (owner, names),
            (None, None) => continue,
        };
        for name in names.split_whitespace() {
            suggestions.push(Suggestion::new(name, owner));
        }
    }
    suggestions
}

impl KubectlLister {
    /// `base_args` carries the session's `--kubeconfig`/`--cache-dir` flags.
    pub fn new(runner: Arc<dyn CommandRunner>, base_args: Vec<String>) -> Self {
        Self {
            runner,
            base_args,
            cancel: CancelToken::new(),
        }
    }

    /// Tie lookups to the session: once `cancel` fires, running lookups are killed and new
    /// ones fail immediately.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn query(&self, lookup: &Lookup, args: &[&str]) -> RelayResult<String> {
        if self.cancel.is_cancelled() {
            return Err(RelayError::lookup(lookup.describe(), "session cancelled"));
        }
        let mut full = self.base_args.clone();
        full.extend(args.iter().map(|arg| arg.to_string()));
        let output = self
            .runner
            .run(&full, &self.cancel, Some(LOOKUP_TIMEOUT))
            .map_err(|err| RelayError::lookup(lookup.describe(), err))?;
        let text = String::from_utf8_lossy(&output.combined).into_owned();
        if !output.success() {
            return Err(RelayError::lookup(lookup.describe(), text.trim()));
        }
        Ok(text)
    }
}

impl ResourceLister for KubectlLister {
    fn list(&self, lookup: &Lookup) -> RelayResult<Vec<Suggestion>> {
        match lookup {
            Lookup::Namespaces => {
                let format = name_listing("namespaces");
                let text = self.query(lookup, &["get", "namespaces", "-o", &format])?;
                Ok(parse_rows(&text))
            }
            Lookup::Resources { kind, namespace } => {
                let format = name_listing(kind);
                let namespaced = lookup_kind(kind).map_or(true, |k| k.namespaced);
                let mut args = vec!["get", kind.as_str(), "-o", format.as_str()];
                if namespaced {
                    args.extend(["--namespace", namespace.as_str()]);
                }
                Ok(parse_rows(&self.query(lookup, &args)?))
            }
            Lookup::Containers {
                namespace,
                pod: Some(pod),
            } => {
                let args = [
                    "get",
                    "pod",
                    pod.as_str(),
                    "--namespace",
                    namespace.as_str(),
                    "-o",
                    "jsonpath={.spec.containers[*].name}",
                ];
                Ok(parse_containers(&self.query(lookup, &args)?, Some(pod)))
            }
            Lookup::Containers {
                namespace,
                pod: None,
            } => {
                let args = [
                    "get",
                    "pods",
                    "--namespace",
                    namespace.as_str(),
                    "-o",
                    "jsonpath={range .items[*]}{.metadata.name}{\"\\t\"}{.spec.containers[*].name}{\"\\n\"}{end}",
                ];
                Ok(parse_containers(&self.query(lookup, &args)?, None))
            }
        }
    }
}
