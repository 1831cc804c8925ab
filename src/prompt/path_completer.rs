use std::collections::HashMap;
use std::fs::{self, DirEntry};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::completion::{filter_has_prefix, Completer, Suggestion};
use super::document::Document;
use crate::lock::lock_or_recover;

/// Separators that end a path segment when replacing the word before the cursor.
pub const FILE_PATH_SEPARATOR: &str = " /";

type EntryFilter = Box<dyn Fn(&DirEntry) -> bool + Send + Sync>;

/// Completes filesystem paths relative to a fixed base directory.
pub struct PathCompleter {
    base_dir: PathBuf,
    filter: Option<EntryFilter>,
    ignore_case: bool,
    cache: Mutex<HashMap<PathBuf, Vec<Suggestion>>>,
}

impl PathCompleter {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            filter: None,
            ignore_case: false,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_filter(mut self, filter: impl Fn(&DirEntry) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn ignore_case(mut self, ignore_case: bool) -> Self {
        self.ignore_case = ignore_case;
        self
    }

    /// Completer that lists nothing. Used where server-side paths must stay hidden.
    pub fn hidden(base_dir: impl Into<PathBuf>) -> Self {
        Self::new(base_dir).with_filter(|_| false).ignore_case(true)
    }

    /// Split the typed word into the directory to list and the basename prefix.
    fn split_path(&self, typed: &str) -> (PathBuf, String) {
        if typed.is_empty() {
            return (self.base_dir.clone(), String::new());
        }
        let (dir, base) = match typed.rfind('/') {
            Some(idx) => (&typed[..=idx], &typed[idx + 1..]),
            None => ("", typed),
        };
        let dir_path = Path::new(dir);
        let resolved = if dir_path.is_absolute() {
            dir_path.to_path_buf()
        } else {
            self.base_dir.join(dir_path)
        };
        (resolved, base.to_string())
    }

    fn list_dir(&self, dir: &Path) -> Vec<Suggestion> {
        let mut cache = lock_or_recover(&self.cache, "path completer cache");
        if let Some(cached) = cache.get(dir) {
            return cached.clone();
        }
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::debug!(dir = %dir.display(), error = %err, "path completion listing failed");
                return Vec::new();
            }
        };
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| self.filter.as_ref().map_or(true, |keep| keep(entry)))
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        let suggestions: Vec<Suggestion> = names
            .into_iter()
            .map(|name| Suggestion::new(name, ""))
            .collect();
        cache.insert(dir.to_path_buf(), suggestions.clone());
        suggestions
    }
}

impl Completer for PathCompleter {
    fn complete(&self, doc: &Document<'_>) -> Vec<Suggestion> {
        let (dir, base) = self.split_path(doc.get_word_before_cursor());
        filter_has_prefix(self.list_dir(&dir), &base, self.ignore_case)
    }
}
