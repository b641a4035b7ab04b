//! Error taxonomy for corpus loading, indexing and retrieval.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Debug, Error)]
pub enum RagError {
    /// Corpus directory missing, unreadable, or without a single valid record.
    #[error("Cannot read corpus at {path}: {reason}")]
    CorpusRead { path: PathBuf, reason: String },

    /// One record file is unusable. Skipped by the corpus loader.
    #[error("Malformed record {path}: {reason}")]
    MalformedRecord { path: PathBuf, reason: String },

    #[error("Embedding provider failed: {0}")]
    EmbeddingProvider(String),

    #[error("No persisted index at {0}")]
    IndexNotFound(PathBuf),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Catalog request failed: {0}")]
    Catalog(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Index storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RagError {
    /// Only a missing persisted index can be repaired by rebuilding.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RagError::IndexNotFound(_))
    }
}

impl From<figment::Error> for RagError {
    fn from(e: figment::Error) -> Self {
        RagError::Config(e.to_string())
    }
}

impl From<reqwest::Error> for RagError {
    fn from(e: reqwest::Error) -> Self {
        RagError::Catalog(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_missing_index_is_recoverable() {
        assert!(RagError::IndexNotFound(PathBuf::from("x.db")).is_recoverable());
        assert!(!RagError::Query("boom".into()).is_recoverable());
        assert!(!RagError::EmbeddingProvider("down".into()).is_recoverable());
    }
}
