//! Error types for the core systems.

use std::io;
use std::path::PathBuf;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Top-level error for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Thread pool error.
    #[error(transparent)]
    ThreadPool(#[from] ThreadPoolError),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised by [`ThreadPool`](crate::threadpool::ThreadPool).
#[derive(Debug, thiserror::Error)]
pub enum ThreadPoolError {
    /// The pool has been shut down and no longer accepts work.
    #[error("thread pool has been shut down")]
    ShutDown,

    /// More workers were asked to stop than the pool currently has.
    #[error("attempted to remove {requested} worker(s) but only {available} exist")]
    RemoveTooMany { requested: usize, available: usize },

    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Errors raised while loading configuration sources.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The backing file could not be read.
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file contents are not valid for the source format.
    #[error("failed to parse config '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    /// The file parsed but does not have the expected section layout.
    #[error("invalid structure in config '{path}': {message}")]
    InvalidStructure { path: PathBuf, message: String },

    /// A section or key asked to be saved does not exist.
    #[error("config '{path}' has no entry '{entry}'")]
    Missing { path: PathBuf, entry: String },
}

impl ConfigError {
    /// Create an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a parse error.
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a structure error.
    pub fn invalid_structure(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a missing-entry error.
    pub fn missing(path: impl Into<PathBuf>, entry: impl Into<String>) -> Self {
        Self::Missing {
            path: path.into(),
            entry: entry.into(),
        }
    }
}
