//! Error types for watchfolder-dispatch.

use thiserror::Error;

use watchfolder_core::{ActionError, ConfigError, StoreError};

/// Errors from routing a path or settling a rule.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("configuration error")]
    Config(#[from] ConfigError),

    #[error("instance store error")]
    Store(#[from] StoreError),

    #[error("action '{action}' failed")]
    Action {
        action: String,
        #[source]
        source: ActionError,
    },

    #[error("task queue error")]
    Queue(#[from] QueueError),
}

/// Errors from the task queue contract.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Mirrors job validation: id, path and checksum are mandatory.
    #[error("provide instance id, event, path, checksum, and an optional delay")]
    InvalidTask,

    #[error("task queue lock poisoned")]
    Poisoned,
}

/// Render an error and its whole `source()` chain on one line.
///
/// A cause whose message already ends the rendered text (an error that
/// prints its source inline) is not repeated.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let message = cause.to_string();
        if !rendered.ends_with(&message) {
            rendered.push_str(": ");
            rendered.push_str(&message);
        }
        source = cause.source();
    }
    rendered
}
