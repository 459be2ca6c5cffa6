//! Error types for SpamGuard

use std::path::PathBuf;

/// Result type alias using SpamGuard's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for SpamGuard operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The featurizer was fitted on zero documents
    #[error("cannot fit featurizer on an empty corpus")]
    EmptyCorpus,

    /// The training set does not contain both classes
    #[error("insufficient training data: need 2 distinct labels, found {distinct_labels}")]
    InsufficientData { distinct_labels: usize },

    /// A model artifact could not be written
    #[error("cannot write '{}': {source}", path.display())]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A model artifact or dataset file does not exist
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// A model artifact failed integrity or schema checks
    #[error("model artifact is corrupt: {0}")]
    ModelCorrupt(String),

    /// Prediction was requested before any model was fitted or loaded
    #[error("no model has been trained or loaded")]
    ModelNotLoaded,

    /// Evaluation was requested on a dataset with zero examples
    #[error("cannot evaluate on an empty dataset")]
    EmptyDataset,

    /// Malformed dataset rows or a header that does not match the schema
    #[error("dataset error: {0}")]
    Dataset(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Other IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Timeout errors
    #[error("operation timed out")]
    Timeout,

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new dataset error
    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    /// Create a new model-corrupt error
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::ModelCorrupt(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a write error for the given path
    pub fn io_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoWrite {
            path: path.into(),
            source,
        }
    }

    /// Short machine-friendly name, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyCorpus => "empty_corpus",
            Self::InsufficientData { .. } => "insufficient_data",
            Self::IoWrite { .. } => "io_write",
            Self::FileNotFound(_) => "file_not_found",
            Self::ModelCorrupt(_) => "model_corrupt",
            Self::ModelNotLoaded => "model_not_loaded",
            Self::EmptyDataset => "empty_dataset",
            Self::Dataset(_) => "dataset",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Timeout => "timeout",
            Self::Internal(_) => "internal",
        }
    }
}
