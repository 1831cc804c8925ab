//! Context-aware kubectl completion.

use std::sync::Arc;

use super::arguments::{
    kinds_for, lookup_kind, resource_type_suggestions, subcommands, verb_suggestions,
};
use super::catalog::{global_options, help_options, FlagCatalog};
use super::lister::{Lookup, ResourceLister};
use crate::prompt::{
    filter_contains, filter_has_prefix, Completer, Document, PathCompleter, Suggestion,
};

/// Options whose value is the following token unless given as `--flag=value`.
const VALUE_OPTIONS: &[&str] = &[
    "-f",
    "--filename",
    "-n",
    "--namespace",
    "-s",
    "--server",
    "--kubeconfig",
    "--cluster",
    "--user",
    "-o",
    "--output",
    "-c",
    "--container",
];

const FILENAME_VERBS: &[&str] = &[
    "get",
    "describe",
    "create",
    "delete",
    "replace",
    "patch",
    "edit",
    "apply",
    "expose",
    "rolling-update",
    "rollout",
    "label",
    "annotate",
    "scale",
    "convert",
    "autoscale",
    "top",
];

const CONTAINER_VERBS: &[&str] = &["exec", "logs", "run", "attach", "port-forward", "cp"];

/// `Some(consumes_next)` when `token` is a value-taking option, in either `name` or
/// `name=value` form.
fn value_option(verb: &str, token: &str) -> Option<bool> {
    if verb == "logs" && token == "-f" {
        return None;
    }
    VALUE_OPTIONS.iter().find_map(|name| {
        if token == *name {
            Some(true)
        } else if token.strip_prefix(name)?.starts_with('=') {
            Some(false)
        } else {
            None
        }
    })
}

/// Strip options and their values, leaving positional tokens.
///
/// The second value reports whether the last token was an option still waiting for its
/// value. For `logs`, `-f` means follow and takes no value. Empty tokens from repeated
/// spaces are dropped, except a trailing one, which stands for the word being typed.
pub fn exclude_options<S: AsRef<str>>(args: &[S]) -> (Vec<String>, bool) {
    let Some(first) = args.first() else {
        return (Vec::new(), false);
    };
    let verb = first.as_ref();
    let last = args.len() - 1;
    let mut positional = Vec::with_capacity(args.len());
    let mut skip_next = false;
    for (index, token) in args.iter().enumerate() {
        let token = token.as_ref();
        if skip_next {
            skip_next = false;
            continue;
        }
        if let Some(consumes) = value_option(verb, token) {
            skip_next = consumes;
            continue;
        }
        if token.starts_with('-') || (token.is_empty() && index != last) {
            continue;
        }
        positional.push(token.to_string());
    }
    (positional, skip_next)
}

/// The verb and the option right before the word under the cursor, if that token is an option.
pub fn previous_option<'a>(args: &[&'a str]) -> Option<(&'a str, &'a str)> {
    let option = *args.len().checked_sub(2).and_then(|index| args.get(index))?;
    option.starts_with('-').then(|| (args[0], option))
}

/// Explicit `-n`/`--namespace` value anywhere in the full text.
pub fn namespace_arg(text: &str) -> Option<&str> {
    let mut tokens = text.split(' ');
    while let Some(token) = tokens.next() {
        if token == "-n" || token == "--namespace" {
            return tokens.next().filter(|value| !value.is_empty());
        }
        if let Some(value) = token
            .strip_prefix("--namespace=")
            .or_else(|| token.strip_prefix("-n="))
        {
            return Some(value).filter(|value| !value.is_empty());
        }
    }
    None
}

pub struct KubeCompleter {
    catalog: Arc<FlagCatalog>,
    lister: Arc<dyn ResourceLister>,
    files: PathCompleter,
    namespace: String,
}

impl KubeCompleter {
    /// `files` completes `-f` values; `namespace` is the session default.
    pub fn new(
        catalog: Arc<FlagCatalog>,
        lister: Arc<dyn ResourceLister>,
        files: PathCompleter,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            lister,
            files,
            namespace: namespace.into(),
        }
    }

    fn lookup(&self, lookup: Lookup) -> Vec<Suggestion> {
        match self.lister.list(&lookup) {
            Ok(suggestions) => suggestions,
            Err(err) => {
                tracing::debug!(error = %err, "completion lookup failed");
                Vec::new()
            }
        }
    }

    fn option_completer(&self, args: &[&str], long: bool) -> Vec<Suggestion> {
        if args.len() <= 1 {
            let help = help_options();
            return if long {
                filter_has_prefix(help, "--", false)
            } else {
                help
            };
        }
        let (positional, _) = exclude_options(args);
        let key = match positional.as_slice() {
            [config, sub] if config == "config" => format!("config {sub}"),
            [verb, ..] => verb.clone(),
            [] => String::new(),
        };
        let mut suggestions = self
            .catalog
            .options(&key)
            .map(<[Suggestion]>::to_vec)
            .unwrap_or_else(help_options);
        suggestions.extend(global_options());
        let typed = args.last().copied().unwrap_or_default().trim_start_matches('-');
        if long {
            filter_contains(filter_has_prefix(suggestions, "--", false), typed, true)
        } else {
            filter_contains(suggestions, typed, true)
        }
    }

    fn complete_option_arguments(
        &self,
        doc: &Document<'_>,
        args: &[&str],
    ) -> Option<Vec<Suggestion>> {
        let (verb, option) = previous_option(args)?;
        let word = doc.get_word_before_cursor();

        if option == "-n" || option == "--namespace" {
            return Some(filter_has_prefix(self.lookup(Lookup::Namespaces), word, true));
        }
        if FILENAME_VERBS.contains(&verb) && (option == "-f" || option == "--filename") {
            return Some(self.files.complete(doc));
        }
        if CONTAINER_VERBS.contains(&verb) && (option == "-c" || option == "--container") {
            let (positional, _) = exclude_options(args);
            let namespace = namespace_arg(doc.text()).unwrap_or(&self.namespace);
            let lookup = Lookup::Containers {
                namespace: namespace.to_string(),
                pod: positional.get(1).cloned(),
            };
            return Some(filter_has_prefix(self.lookup(lookup), word, true));
        }
        // `get pod -o ` waits for an output format, not a resource name.
        if value_option(verb, option) == Some(true) {
            return Some(Vec::new());
        }
        None
    }

    fn names(&self, kind: &str, namespace: &str, typed: &str) -> Vec<Suggestion> {
        let Some(kind) = lookup_kind(kind) else {
            return Vec::new();
        };
        let lookup = if kind.name == "namespaces" {
            Lookup::Namespaces
        } else {
            Lookup::Resources {
                kind: kind.name.to_string(),
                namespace: namespace.to_string(),
            }
        };
        filter_contains(self.lookup(lookup), typed, true)
    }

    fn arguments_completer(&self, namespace: &str, args: &[String]) -> Vec<Suggestion> {
        let typed = args.last().map(String::as_str).unwrap_or_default();
        if args.len() <= 1 {
            return filter_has_prefix(verb_suggestions(), typed, true);
        }
        let verb = args[0].as_str();
        match (verb, args.len()) {
            ("get" | "describe" | "delete" | "edit" | "label" | "annotate" | "explain", 2) => {
                filter_has_prefix(resource_type_suggestions(), typed, true)
            }
            ("get" | "describe" | "delete" | "edit" | "label" | "annotate", 3) => {
                self.names(&args[1], namespace, typed)
            }
            ("create" | "config" | "cluster-info", 2) => {
                filter_has_prefix(subcommands(verb).unwrap_or_default(), typed, true)
            }
            ("rollout" | "top", 2) => {
                filter_has_prefix(subcommands(verb).unwrap_or_default(), typed, true)
            }
            ("rollout", 3) | ("scale" | "autoscale" | "expose", 2) => {
                let kinds = kinds_for(verb).unwrap_or_default();
                let suggestions = kinds.iter().map(|kind| Suggestion::new(*kind, "")).collect();
                filter_has_prefix(suggestions, typed, true)
            }
            ("rollout", 4) => self.names(&args[2], namespace, typed),
            ("scale" | "autoscale" | "expose" | "top", 3) => self.names(&args[1], namespace, typed),
            ("logs" | "exec" | "attach" | "port-forward", 2) => self.names("pods", namespace, typed),
            ("cordon" | "uncordon" | "drain", 2) => self.names("nodes", namespace, typed),
            _ => Vec::new(),
        }
    }
}

impl Completer for KubeCompleter {
    fn complete(&self, doc: &Document<'_>) -> Vec<Suggestion> {
        let before = doc.text_before_cursor();
        if before.is_empty() {
            return Vec::new();
        }
        let args: Vec<&str> = before.split(' ').collect();
        if args.contains(&"|") {
            return Vec::new();
        }
        let word = doc.get_word_before_cursor();
        if word.starts_with('-') {
            return self.option_completer(&args, word.starts_with("--"));
        }
        if let Some(suggestions) = self.complete_option_arguments(doc, &args) {
            return suggestions;
        }
        let namespace = namespace_arg(doc.text()).unwrap_or(&self.namespace);
        let (positional, pending_skip) = exclude_options(&args);
        if pending_skip {
            return Vec::new();
        }
        self.arguments_completer(namespace, &positional)
    }
}
