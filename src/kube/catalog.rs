//! Per-verb flag tables used when the word being typed starts with `-`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::prompt::Suggestion;

const BUILTIN_FLAGS: &str = include_str!("flags.yaml");

#[derive(Debug, Deserialize)]
struct FlagEntry {
    text: String,
    #[serde(default)]
    description: String,
}

/// Flag name/description tables keyed by verb (`"logs"`) or verb plus subcommand
/// (`"config view"`).
#[derive(Debug, Clone, Default)]
pub struct FlagCatalog {
    tables: HashMap<String, Vec<Suggestion>>,
}

impl FlagCatalog {
    pub fn from_yaml(source: &str) -> Result<Self> {
        let raw: HashMap<String, Vec<FlagEntry>> =
            serde_yaml::from_str(source).context("flag catalog is not valid YAML")?;
        let tables = raw
            .into_iter()
            .map(|(command, entries)| {
                let flags = entries
                    .into_iter()
                    .map(|entry| Suggestion::new(entry.text, entry.description))
                    .collect();
                (command, flags)
            })
            .collect();
        Ok(Self { tables })
    }

    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN_FLAGS).context("built-in flag catalog")
    }

    /// Built-in tables extended by an optional YAML overlay file.
    pub fn load(overlay: Option<&Path>) -> Result<Self> {
        let mut catalog = Self::builtin()?;
        if let Some(path) = overlay {
            let source = fs::read_to_string(path)
                .with_context(|| format!("failed to read flag catalog {}", path.display()))?;
            let extra = Self::from_yaml(&source)
                .with_context(|| format!("failed to parse flag catalog {}", path.display()))?;
            catalog.merge(extra);
        }
        Ok(catalog)
    }

    /// Overlay `other`: entries with a known flag name replace the description, new flags and
    /// new commands are appended.
    pub fn merge(&mut self, other: FlagCatalog) {
        for (command, flags) in other.tables {
            let table = self.tables.entry(command).or_default();
            for flag in flags {
                match table.iter_mut().find(|existing| existing.text == flag.text) {
                    Some(existing) => existing.description = flag.description,
                    None => table.push(flag),
                }
            }
        }
    }

    pub fn options(&self, command: &str) -> Option<&[Suggestion]> {
        self.tables.get(command).map(Vec::as_slice)
    }
}

/// Offered when the verb has no table (or nothing has been typed yet).
pub fn help_options() -> Vec<Suggestion> {
    vec![
        Suggestion::new("-h", "help for this command"),
        Suggestion::new("--help", "help for this command"),
    ]
}

/// Appended to every verb's table.
pub fn global_options() -> Vec<Suggestion> {
    vec![Suggestion::new(
        "--namespace",
        "temporarily set the namespace for a request",
    )]
}
