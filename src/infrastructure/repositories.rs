//! DB Repository abstractions

use crate::infrastructure::database::DatabaseConnection;
use crate::infrastructure::entities::{Chat, ErrorRecord, FileRecord, History, MediaKind};
use crate::infrastructure::traits::{ChatRepository, StorageError};
use async_trait::async_trait;
use chrono::Utc;
use di::{Ref, injectable};
use log::error;

#[injectable(ChatRepository)]
pub struct DbChatRepository {
    connection: Ref<DatabaseConnection>,
}

impl DbChatRepository {
    pub fn new(connection: Ref<DatabaseConnection>) -> Self {
        Self { connection }
    }
}

fn db_error(e: sqlx::Error) -> StorageError {
    error!("{e}");
    StorageError::Database(e)
}

#[async_trait]
impl ChatRepository for DbChatRepository {
    async fn create_chat(&self, chat: Chat) -> Result<Chat, StorageError> {
        sqlx::query_as(
            "INSERT INTO chats (code, title, created_at, updated_at) VALUES (?, ?, ?, ?) RETURNING *",
        )
        .bind(chat.code)
        .bind(chat.title)
        .bind(chat.created_at)
        .bind(chat.updated_at)
        .fetch_one(&**self.connection)
        .await
        .map_err(db_error)
    }

    async fn find_chat(&self, code: &str) -> Result<Option<Chat>, StorageError> {
        sqlx::query_as("SELECT * FROM chats WHERE code = ?")
            .bind(code)
            .fetch_optional(&**self.connection)
            .await
            .map_err(db_error)
    }

    async fn list_chats(&self) -> Result<Vec<Chat>, StorageError> {
        sqlx::query_as("SELECT * FROM chats ORDER BY updated_at DESC, created_at DESC")
            .fetch_all(&**self.connection)
            .await
            .map_err(db_error)
    }

    async fn set_chat_title(&self, code: &str, title: &str) -> Result<Chat, StorageError> {
        sqlx::query_as("UPDATE chats SET title = ?, updated_at = ? WHERE code = ? RETURNING *")
            .bind(title)
            .bind(Utc::now())
            .bind(code)
            .fetch_optional(&**self.connection)
            .await
            .map_err(db_error)?
            .ok_or_else(|| StorageError::Missing(format!("chat {code}")))
    }

    async fn touch_chat(&self, code: &str) -> Result<(), StorageError> {
        sqlx::query("UPDATE chats SET updated_at = ? WHERE code = ?")
            .bind(Utc::now())
            .bind(code)
            .execute(&**self.connection)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn delete_chat(&self, code: &str) -> Result<(), StorageError> {
        let mut tx = self.connection.begin().await.map_err(db_error)?;

        sqlx::query(
            "DELETE FROM files WHERE history_id IN (SELECT id FROM histories WHERE chat_code = ?)",
        )
        .bind(code)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        sqlx::query("DELETE FROM histories WHERE chat_code = ?")
            .bind(code)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        sqlx::query("DELETE FROM chat_errors WHERE chat_code = ?")
            .bind(code)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        sqlx::query("DELETE FROM chats WHERE code = ?")
            .bind(code)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        tx.commit().await.map_err(db_error)
    }

    async fn create_history(&self, chat_code: &str, input_text: &str) -> Result<History, StorageError> {
        let now = Utc::now();
        sqlx::query_as(
            "INSERT INTO histories (chat_code, input_text, output_text, created_at, updated_at) VALUES (?, ?, '', ?, ?) RETURNING *",
        )
            .bind(chat_code)
            .bind(input_text)
            .bind(now)
            .bind(now)
            .fetch_one(&**self.connection)
            .await
            .map_err(db_error)
    }

    async fn find_history(&self, id: i64) -> Result<Option<History>, StorageError> {
        sqlx::query_as("SELECT * FROM histories WHERE id = ?")
            .bind(id)
            .fetch_optional(&**self.connection)
            .await
            .map_err(db_error)
    }

    async fn reset_history_input(&self, id: i64, input_text: &str) -> Result<History, StorageError> {
        sqlx::query_as(
            "UPDATE histories SET input_text = ?, output_text = '', updated_at = ? WHERE id = ? RETURNING *",
        )
            .bind(input_text)
            .bind(Utc::now())
            .bind(id)
            .fetch_optional(&**self.connection)
            .await
            .map_err(db_error)?
            .ok_or_else(|| StorageError::Missing(format!("history {id}")))
    }

    async fn set_history_output(&self, id: i64, output_text: &str) -> Result<History, StorageError> {
        sqlx::query_as(
            "UPDATE histories SET output_text = ?, updated_at = ? WHERE id = ? RETURNING *",
        )
        .bind(output_text)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&**self.connection)
        .await
        .map_err(db_error)?
        .ok_or_else(|| StorageError::Missing(format!("history {id}")))
    }

    async fn count_history(&self, chat_code: &str) -> Result<i64, StorageError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM histories WHERE chat_code = ?")
            .bind(chat_code)
            .fetch_one(&**self.connection)
            .await
            .map_err(db_error)?;
        Ok(count)
    }

    async fn list_history(
        &self,
        chat_code: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<History>, StorageError> {
        sqlx::query_as(
            "SELECT * FROM histories WHERE chat_code = ? ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        )
            .bind(chat_code)
            .bind(limit)
            .bind(offset)
            .fetch_all(&**self.connection)
            .await
            .map_err(db_error)
    }

    async fn create_file(
        &self,
        history_id: i64,
        kind: MediaKind,
        key: &str,
    ) -> Result<FileRecord, StorageError> {
        let (audio, image) = match kind {
            MediaKind::Audio => (Some(key), None),
            MediaKind::Image => (None, Some(key)),
        };
        let now = Utc::now();

        sqlx::query_as(
            "INSERT INTO files (history_id, output_audio, output_image, created_at, updated_at) VALUES (?, ?, ?, ?, ?) RETURNING *",
        )
            .bind(history_id)
            .bind(audio)
            .bind(image)
            .bind(now)
            .bind(now)
            .fetch_one(&**self.connection)
            .await
            .map_err(db_error)
    }

    async fn list_files(&self, history_id: i64) -> Result<Vec<FileRecord>, StorageError> {
        sqlx::query_as("SELECT * FROM files WHERE history_id = ? ORDER BY id ASC")
            .bind(history_id)
            .fetch_all(&**self.connection)
            .await
            .map_err(db_error)
    }

    async fn delete_files(&self, history_id: i64) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM files WHERE history_id = ?")
            .bind(history_id)
            .execute(&**self.connection)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn record_error(&self, chat_code: &str, message: &str) -> Result<ErrorRecord, StorageError> {
        sqlx::query_as(
            "INSERT INTO chat_errors (chat_code, error, created_at) VALUES (?, ?, ?) RETURNING *",
        )
        .bind(chat_code)
        .bind(message)
        .bind(Utc::now())
        .fetch_one(&**self.connection)
        .await
        .map_err(db_error)
    }

    async fn list_errors(&self, chat_code: Option<&str>) -> Result<Vec<ErrorRecord>, StorageError> {
        match chat_code {
            Some(code) => sqlx::query_as(
                "SELECT * FROM chat_errors WHERE chat_code = ? ORDER BY created_at DESC, id DESC",
            )
            .bind(code)
            .fetch_all(&**self.connection)
            .await
            .map_err(db_error),
            None => sqlx::query_as("SELECT * FROM chat_errors ORDER BY created_at DESC, id DESC")
                .fetch_all(&**self.connection)
                .await
                .map_err(db_error),
        }
    }
}
