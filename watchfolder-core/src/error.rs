//! Error types for watchfolder-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while configuring roots, definitions and actions.
///
/// These are operator mistakes: they surface synchronously at configuration
/// time and are never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The root is missing, not a directory, or not readable and writable.
    #[error("root must be a readable and writable folder: {path}")]
    InvalidRoot { path: PathBuf },

    /// An instance asked for the root of a definition that never set one.
    #[error("no root configured for definition '{definition}'")]
    NoRoot { definition: String },

    /// `folders` was called with an empty list.
    #[error("define at least one folder")]
    NoFolders,

    #[error("unsupported event '{event}'; only these events are supported: added, modified, removed")]
    UnsupportedEvent { event: String },

    #[error("delay must be defined as a positive number of seconds, got {value}")]
    InvalidDelay { value: String },

    #[error("invalid ignore pattern '{pattern}': {source}")]
    InvalidIgnore {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("invalid path mapping pattern '{pattern}': {source}")]
    InvalidPathMapping {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown action '{name}'")]
    UnknownAction { name: String },

    #[error("command action '{name}' needs a program")]
    EmptyCommand { name: String },

    #[error("action '{name}' is already registered")]
    DuplicateAction { name: String },

    #[error("unknown watch definition '{name}'")]
    UnknownDefinition { name: String },

    #[error("watch definition '{name}' is already registered")]
    DuplicateDefinition { name: String },

    #[error("invalid instance id '{id}'; use letters, digits, '-' and '_'")]
    InvalidInstanceId { id: String },

    /// Teardown refused to remove a path that resolves too close to `/`.
    #[error("{path} is too short! Refusing to remove it")]
    PathTooShort { path: PathBuf },

    /// The configuration file could not be read.
    #[error("cannot read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load, with the file path for context.
    #[error("failed to parse configuration at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None` while expanding `~`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

/// Errors from the instance store and instance lifecycle hooks.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse instance record at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("no watch folder instance with id '{id}'")]
    InstanceNotFound { id: String },

    #[error("watch folder instance '{id}' already exists")]
    AlreadyExists { id: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors returned by callback actions.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}")]
    Exit { program: String, status: String },

    #[error("{0}")]
    Failed(String),
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
