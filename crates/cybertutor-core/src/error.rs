//! Engine and store error types.
//!
//! Engine operations return an explicit [`EngineError`] instead of panicking
//! so callers can keep navigation state consistent. Store implementations
//! report failures through [`StoreError`].

use thiserror::Error;

/// Errors raised by a [`crate::traits::DocumentStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A field holds a value of the wrong type for the operation.
    #[error("type mismatch on {collection}/{id}.{field}: {message}")]
    TypeMismatch {
        collection: String,
        id: String,
        field: String,
        message: String,
    },

    /// The store could not be read from or written to disk.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A document or snapshot could not be (de)serialized.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by the progression engine, content authoring, and presentation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("topic not found: {0}")]
    TopicNotFound(String),

    #[error("chapter not found: {0}")]
    ChapterNotFound(String),

    /// No chapter follows the current one in its topic.
    #[error("end of topic {topic_id} after chapter order {order}")]
    EndOfTopic { topic_id: String, order: i64 },

    /// The user's level is below the chapter's threshold.
    #[error("chapter locked: requires level {required}, user has {current}")]
    Locked { required: u32, current: u32 },

    /// A stored document does not match the expected record shape.
    #[error("invalid document {collection}/{id}: {message}")]
    InvalidDocument {
        collection: String,
        id: String,
        message: String,
    },

    #[error("invalid question {id}: {message}")]
    InvalidQuestion { id: String, message: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("no signed-in user")]
    Unauthenticated,

    #[error("user {0} is not allowed to perform this action")]
    Forbidden(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
