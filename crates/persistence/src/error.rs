//! Persistence errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Turn {step} of conversation {conversation_id} already exists")]
    DuplicateTurn { conversation_id: i64, step: i64 },

    #[error("Step {step} of conversation {conversation_id} does not follow step {latest}")]
    StepOutOfOrder {
        conversation_id: i64,
        step: i64,
        latest: i64,
    },

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(err: rusqlite::Error) -> Self {
        PersistenceError::Database(err.to_string())
    }
}

impl From<tokio::task::JoinError> for PersistenceError {
    fn from(err: tokio::task::JoinError) -> Self {
        PersistenceError::Task(err.to_string())
    }
}

impl From<PersistenceError> for voice_buddy_core::Error {
    fn from(err: PersistenceError) -> Self {
        voice_buddy_core::Error::Persistence(err.to_string())
    }
}
