//! kubectl knowledge: flag tables, vocabulary, live lookups, completion and execution.

mod arguments;
mod catalog;
mod completer;
mod executor;
mod lister;
mod runner;

pub use arguments::{
    kinds_for, lookup_kind, resource_type_suggestions, subcommands, verb_suggestions,
    ResourceKind, RESOURCE_KINDS,
};
pub use catalog::{global_options, help_options, FlagCatalog};
pub use completer::{exclude_options, namespace_arg, previous_option, KubeCompleter};
pub use executor::{
    is_clear, is_interactive, is_sensitive, to_crlf, InteractiveMatch, KubectlExecutor,
    CLEAR_SCREEN, EXIT_COMMAND,
};
pub use lister::{CachedLister, KubectlLister, Lookup, ResourceLister, DEFAULT_CACHE_TTL};
pub use runner::{CommandOutput, CommandRunner, KubectlRunner};
