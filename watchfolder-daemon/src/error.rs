use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the daemon runtime and its control protocol.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Watching started without a single registered root.
    #[error("No folders to watch!")]
    NoRoots,

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error")]
    Notify(#[from] notify::Error),

    #[error("configuration error")]
    Config(#[from] watchfolder_core::ConfigError),

    #[error("instance store error")]
    Store(#[from] watchfolder_core::StoreError),

    #[error("dispatch error")]
    Dispatch(#[from] watchfolder_dispatch::DispatchError),

    #[error("task queue error")]
    Queue(#[from] watchfolder_dispatch::QueueError),

    #[error("JSON error")]
    Json(#[from] serde_json::Error),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
