//! Errors surfaced by the chat services

use crate::gateway::AdapterFailure;
use crate::infrastructure::traits::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// Missing or malformed caller input; nothing was written.
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Audio input could not be turned into text; no turn was recorded.
    #[error("Failed to transcribe audio: {0}")]
    TranscriptionFailed(AdapterFailure),

    #[error(transparent)]
    Adapter(#[from] AdapterFailure),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ChatError {
    pub fn validation(message: impl Into<String>) -> Self {
        ChatError::Validation(message.into())
    }

    pub fn chat_not_found() -> Self {
        ChatError::NotFound("Chat".to_owned())
    }

    pub fn history_not_found() -> Self {
        ChatError::NotFound("History".to_owned())
    }
}
