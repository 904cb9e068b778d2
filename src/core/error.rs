use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the directory watcher.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The watch root does not exist or is not a directory.
    #[error("Invalid path: {} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// The underlying watch primitive failed.
    #[error("watch backend failure: {0}")]
    Backend(#[from] notify::Error),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The watch service was closed while waiting for events. This is the
    /// graceful shutdown signal, not a failure.
    #[error("watch service closed")]
    Closed,

    /// An operation was attempted on a watch service that has been closed.
    #[error("watch service is disposed")]
    Disposed,

    #[error("watcher thread panicked")]
    WorkerPanicked,
}

impl WatchError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is the graceful close signal.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}
