//! Error types for condarc-core

use crate::resolver::SourceFailure;
use crate::source::Scope;

/// Result type for condarc-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in condarc-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The schema table is inconsistent
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A write was refused or failed
    #[error(transparent)]
    Write(#[from] WriteError),

    /// One or more sources could not be read or parsed
    #[error("Unable to read configuration sources:\n{}", format_failures(.failures))]
    Unreadable { failures: Vec<SourceFailure> },

    #[error("Unknown configuration key: {key}")]
    UnknownKey { key: String },

    #[error("Configuration key {key} holds {found}, expected {expected}")]
    TypeMismatch {
        key: String,
        expected: String,
        found: String,
    },

    // Transparent wrappers for underlying crate errors
    /// Filesystem error from condarc-fs
    #[error(transparent)]
    Fs(#[from] condarc_fs::Error),

    /// Document error from condarc-content
    #[error(transparent)]
    Content(#[from] condarc_content::Error),
}

/// Problems found while building a [`SchemaRegistry`](crate::SchemaRegistry)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("Schema key {key} is declared twice")]
    DuplicateKey { key: String },

    #[error("Default for {key} is {found}, but the key is declared as {expected}")]
    DefaultTypeMismatch {
        key: String,
        expected: String,
        found: String,
    },

    #[error("Schema key {key} uses the {strategy} strategy, which does not fit type {value_type}")]
    StrategyMismatch {
        key: String,
        strategy: String,
        value_type: String,
    },

    #[error("Nested schema key {key} needs a map-merge parent entry {parent}")]
    OrphanNested { key: String, parent: String },

    #[error("Alias {alias} points at unknown key {target}")]
    UnknownAliasTarget { alias: String, target: String },

    #[error("Alias {alias} shadows a declared key")]
    AliasShadowsKey { alias: String },
}

/// Reasons a write to a configuration file was refused
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("Configuration file {path} is not writable")]
    NotWritable {
        path: String,
        #[source]
        source: Option<condarc_fs::Error>,
    },

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },

    #[error("Unknown configuration key: {key}")]
    UnknownKey { key: String },

    #[error("No configuration file is associated with the {scope} scope")]
    NoPathForScope { scope: Scope },

    #[error("The {scope} scope cannot be written to")]
    ReadOnlyScope { scope: Scope },

    #[error("Target file {path} is malformed: {message}")]
    MalformedTarget { path: String, message: String },

    #[error("Key {key} is not set in {path}")]
    KeyNotFound { key: String, path: String },

    #[error("Configuration key {key} is not a list")]
    NotAList { key: String },

    #[error("Item {item} is not present in {key}")]
    ItemNotFound { key: String, item: String },
}

fn format_failures(failures: &[SourceFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("  {f}"))
        .collect::<Vec<_>>()
        .join("\n")
}
