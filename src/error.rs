//! Error taxonomy.
//!
//! One `thiserror` enum per subsystem, aggregated into [`Error`] at the
//! facade boundary via `#[from]`.

use thiserror::Error;

/// Errors from the embedding model / service.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding model failed to load: {0}")]
    ModelLoad(String),
    #[error("embeddings feature not enabled; build with `--features embeddings`")]
    ModelUnavailable,
    #[error("embedding generation failed: {0}")]
    Inference(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Errors from the shared embedding index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error("id already present in index: {0}")]
    DuplicateId(String),
    #[error("index dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("corrupt index data: {0}")]
    Corrupt(String),
}

/// Errors from the conversation store.
#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors from the knowledge store.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Aggregated facade-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Conversation(#[from] ConversationError),
    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("another process holds the project lock at {0}")]
    Locked(String),
}

pub type Result<T> = std::result::Result<T, Error>;
