use std::error::Error as StdError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MentorError>;

#[derive(Debug, Error)]
pub enum MentorError {
    #[error("storage error: {source}")]
    Storage {
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("conversation '{0}' not found")]
    NotFound(String),

    #[error("conversation '{id}' is corrupt: {reason}")]
    CorruptRecord { id: String, reason: String },

    #[error("external service error: {0}")]
    ExternalService(String),

    /// `partial` holds whatever text was already delivered before the failure.
    #[error("response stream interrupted: {reason}")]
    StreamInterrupted { reason: String, partial: String },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("message is empty")]
    EmptyMessage,
}

impl MentorError {
    pub fn storage<E>(err: E) -> Self where E: Into<Box<dyn StdError + Send + Sync>> {
        MentorError::Storage { source: err.into() }
    }

    pub fn interrupted(reason: impl Into<String>) -> Self {
        MentorError::StreamInterrupted {
            reason: reason.into(),
            partial: String::new(),
        }
    }
}

impl From<std::io::Error> for MentorError {
    fn from(err: std::io::Error) -> Self {
        MentorError::storage(err)
    }
}

impl From<redis::RedisError> for MentorError {
    fn from(err: redis::RedisError) -> Self {
        MentorError::storage(err)
    }
}

impl From<reqwest::Error> for MentorError {
    fn from(err: reqwest::Error) -> Self {
        MentorError::ExternalService(err.to_string())
    }
}
