//! DI "Interfaces"

use crate::core::errors::ChatError;
use crate::core::models::{ChatRef, HistoryPage, TurnInput, TurnOptions, TurnResult};
use crate::infrastructure::entities;
use async_trait::async_trait;

#[async_trait]
pub trait TurnService: Send + Sync {
    /// Runs one request/response cycle against a new or existing chat.
    ///
    /// The user's input is stored before any model is called. A failed text
    /// generation still returns `Ok` with a `Failed` status and the partial
    /// history entry; `Err` means nothing usable happened (bad input, unknown
    /// chat, failed transcription) or storage broke.
    async fn run_turn(
        &self,
        chat: ChatRef,
        input: TurnInput,
        options: TurnOptions,
    ) -> Result<TurnResult, ChatError>;

    /// Re-runs generation for an existing turn with new input text.
    ///
    /// Media attached to the turn is replaced, not appended to.
    async fn update_turn(&self, history_id: i64, new_input: String)
    -> Result<TurnResult, ChatError>;
}

#[async_trait]
pub trait HistoryService: Send + Sync {
    /// Creates an empty chat, usable before any turn.
    async fn create_chat(&self, title: Option<String>) -> Result<entities::Chat, ChatError>;

    /// Lists all chats, most recently active first.
    async fn list_chats(&self) -> Result<Vec<entities::Chat>, ChatError>;

    async fn rename_chat(&self, code: &str, title: String) -> Result<entities::Chat, ChatError>;

    /// One page of a chat's turns, newest first. Pages are 1-based.
    ///
    /// Pages past the end are empty, not an error.
    async fn get_history(
        &self,
        code: &str,
        page: u32,
        per_page: Option<u32>,
    ) -> Result<HistoryPage, ChatError>;

    /// Deletes a chat with its turns, files, error records and stored media.
    async fn delete_chat(&self, code: &str) -> Result<(), ChatError>;

    /// Error audit trail, newest first.
    async fn list_errors(&self, code: Option<&str>)
    -> Result<Vec<entities::ErrorRecord>, ChatError>;
}
