//! Infrastructure traits, used for DI on higher levels

use crate::infrastructure::entities;
use crate::infrastructure::entities::MediaKind;
use async_trait::async_trait;
use thiserror::Error;

/// Failure of the relational store or the blob store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("media store error: {0}")]
    Media(#[from] std::io::Error),

    #[error("invalid media key `{0}`")]
    InvalidKey(String),

    #[error("row vanished during update: {0}")]
    Missing(String),
}

#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn create_chat(&self, chat: entities::Chat) -> Result<entities::Chat, StorageError>;

    async fn find_chat(&self, code: &str) -> Result<Option<entities::Chat>, StorageError>;

    /// All chats, most recently active first.
    async fn list_chats(&self) -> Result<Vec<entities::Chat>, StorageError>;

    async fn set_chat_title(&self, code: &str, title: &str)
    -> Result<entities::Chat, StorageError>;

    /// Bumps `updated_at` of the chat.
    async fn touch_chat(&self, code: &str) -> Result<(), StorageError>;

    /// Removes the chat rows children first: files, histories, errors, chat.
    ///
    /// Media blobs are not touched; callers delete them beforehand.
    async fn delete_chat(&self, code: &str) -> Result<(), StorageError>;

    async fn create_history(
        &self,
        chat_code: &str,
        input_text: &str,
    ) -> Result<entities::History, StorageError>;

    async fn find_history(&self, id: i64) -> Result<Option<entities::History>, StorageError>;

    /// Replaces the input of a turn and clears its output.
    async fn reset_history_input(
        &self,
        id: i64,
        input_text: &str,
    ) -> Result<entities::History, StorageError>;

    async fn set_history_output(
        &self,
        id: i64,
        output_text: &str,
    ) -> Result<entities::History, StorageError>;

    async fn count_history(&self, chat_code: &str) -> Result<i64, StorageError>;

    /// Turns of a chat, newest first.
    async fn list_history(
        &self,
        chat_code: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<entities::History>, StorageError>;

    async fn create_file(
        &self,
        history_id: i64,
        kind: MediaKind,
        key: &str,
    ) -> Result<entities::FileRecord, StorageError>;

    async fn list_files(&self, history_id: i64) -> Result<Vec<entities::FileRecord>, StorageError>;

    async fn delete_files(&self, history_id: i64) -> Result<(), StorageError>;

    async fn record_error(
        &self,
        chat_code: &str,
        message: &str,
    ) -> Result<entities::ErrorRecord, StorageError>;

    /// Error audit trail, newest first, optionally for a single chat.
    async fn list_errors(
        &self,
        chat_code: Option<&str>,
    ) -> Result<Vec<entities::ErrorRecord>, StorageError>;
}

/// Blob storage for generated media.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Stores `bytes` for a turn and returns the key to reference it by.
    async fn put(
        &self,
        kind: MediaKind,
        history_id: i64,
        bytes: Vec<u8>,
    ) -> Result<String, StorageError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Removes a blob. Removing a missing blob succeeds.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}
