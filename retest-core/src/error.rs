/// Top-level retest error type.
///
/// All fallible operations in `retest-core` return [`Result<T, RetestError>`](Result).
/// Most of them never reach the engine's callers: the engine recovers store,
/// checksum and collaborator failures into an over-selecting outcome. Only
/// configuration errors are meant to abort a run.
#[derive(thiserror::Error, Debug)]
pub enum RetestError {
    /// Error in configuration parsing or validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error reading or writing persisted run state.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Error computing a class checksum.
    #[error("Checksum error: {0}")]
    Checksum(#[from] ChecksumError),

    /// Error from a class or edge collaborator.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Error from the graph engine (edge parsing, class names).
    #[error("Graph error: {0}")]
    Graph(#[from] retest_graph::GraphError),
}

/// Errors in retest configuration parsing and validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist at the expected path.
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Configuration values are present but semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Configuration file syntax could not be parsed (TOML error).
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Errors from the on-disk state store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Filesystem I/O failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted file exists but cannot be trusted.
    #[error("Corrupt {file}: {reason}")]
    Corrupt {
        /// File name within the artifacts directory.
        file: String,
        /// What the reader tripped over.
        reason: String,
    },

    /// Moving a fully written temp file over its target failed.
    #[error("Atomic replace of {path} failed: {source}")]
    Persist {
        /// Target path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn corrupt(file: &str, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            file: file.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors while computing class checksums.
#[derive(thiserror::Error, Debug)]
pub enum ChecksumError {
    /// Class bytes could not be parsed by the normalizer.
    #[error("Malformed class file: {0}")]
    MalformedClass(String),
}

/// Errors from the class-bytes and edge collaborators.
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    /// Reading an edge file or class directory failed.
    #[error("IO error on {path}: {source}")]
    Io {
        /// Path being read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The edge provider could not produce edges.
    #[error("Edge provider failed: {0}")]
    Edges(String),

    /// An invalid glob pattern was built from a class directory path.
    #[error("Invalid scan pattern: {0}")]
    Pattern(String),
}

/// Convenience alias for `Result<T, RetestError>`.
pub type Result<T> = std::result::Result<T, RetestError>;
