//! Chat bookkeeping: listing, paging, renaming and deleting chats.

use crate::core::errors::ChatError;
use crate::core::locks::ChatLocks;
use crate::core::models::{HistoryPage, Turn, page_count};
use crate::core::orchestrator::new_chat_code;
use crate::core::traits::HistoryService;
use crate::infrastructure::entities::{Chat, ErrorRecord, FileRecord};
use crate::infrastructure::settings::Settings;
use crate::infrastructure::traits::{ChatRepository, MediaStore};
use async_trait::async_trait;
use chrono::Utc;
use di::{Ref, injectable};
use log::{debug, info};

const MAX_TITLE_CHARS: usize = 255;

#[injectable(HistoryService)]
pub struct ChatHistoryService {
    repo: Ref<dyn ChatRepository>,
    media: Ref<dyn MediaStore>,
    locks: Ref<ChatLocks>,
    settings: Ref<Settings>,
}

impl ChatHistoryService {
    pub fn new(
        repo: Ref<dyn ChatRepository>,
        media: Ref<dyn MediaStore>,
        locks: Ref<ChatLocks>,
        settings: Ref<Settings>,
    ) -> Self {
        Self {
            repo,
            media,
            locks,
            settings,
        }
    }

    async fn require_chat(&self, code: &str) -> Result<Chat, ChatError> {
        self.repo
            .find_chat(code)
            .await?
            .ok_or_else(ChatError::chat_not_found)
    }
}

fn clean_title(title: &str) -> Result<String, ChatError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ChatError::validation("Title must not be empty"));
    }
    Ok(title.chars().take(MAX_TITLE_CHARS).collect())
}

#[async_trait]
impl HistoryService for ChatHistoryService {
    async fn create_chat(&self, title: Option<String>) -> Result<Chat, ChatError> {
        let title = match title.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(title) => Some(clean_title(title)?),
        };

        let now = Utc::now();
        let chat = self
            .repo
            .create_chat(Chat {
                code: new_chat_code(),
                title,
                created_at: now,
                updated_at: now,
            })
            .await?;
        info!("created empty chat {}", chat.code);
        Ok(chat)
    }

    async fn list_chats(&self) -> Result<Vec<Chat>, ChatError> {
        Ok(self.repo.list_chats().await?)
    }

    async fn rename_chat(&self, code: &str, title: String) -> Result<Chat, ChatError> {
        let title = clean_title(&title)?;
        self.require_chat(code).await?;
        Ok(self.repo.set_chat_title(code, &title).await?)
    }

    async fn get_history(
        &self,
        code: &str,
        page: u32,
        per_page: Option<u32>,
    ) -> Result<HistoryPage, ChatError> {
        if page < 1 {
            return Err(ChatError::validation("Page must be at least 1"));
        }
        let per_page = per_page.unwrap_or(self.settings.default_per_page);
        if per_page < 1 {
            return Err(ChatError::validation("Per page must be at least 1"));
        }
        if per_page > self.settings.max_per_page {
            return Err(ChatError::validation(format!(
                "Per page must be at most {}",
                self.settings.max_per_page
            )));
        }

        let chat = self.require_chat(code).await?;
        let total = self.repo.count_history(code).await?;
        let offset = i64::from(page - 1) * i64::from(per_page);

        let entries = self
            .repo
            .list_history(code, i64::from(per_page), offset)
            .await?;
        let mut turns = Vec::with_capacity(entries.len());
        for history in entries {
            let files = self.repo.list_files(history.id).await?;
            turns.push(Turn { history, files });
        }
        debug!(
            "page {page} of chat {code}: {} of {total} turns",
            turns.len()
        );

        Ok(HistoryPage {
            chat,
            turns,
            total_pages: page_count(total.max(0) as u64, per_page),
            current_page: page,
        })
    }

    async fn delete_chat(&self, code: &str) -> Result<(), ChatError> {
        let _guard = self.locks.acquire(code).await;
        self.require_chat(code).await?;

        // blobs first, a failure here leaves every row in place
        let total = self.repo.count_history(code).await?;
        let entries = self.repo.list_history(code, total.max(1), 0).await?;
        let mut removed = 0;
        for history in entries {
            let files = self.repo.list_files(history.id).await?;
            for key in files.iter().flat_map(FileRecord::media_keys) {
                self.media.delete(key).await?;
                removed += 1;
            }
        }

        self.repo.delete_chat(code).await?;
        info!("deleted chat {code} and {removed} media blobs");
        Ok(())
    }

    async fn list_errors(&self, code: Option<&str>) -> Result<Vec<ErrorRecord>, ChatError> {
        if let Some(code) = code {
            self.require_chat(code).await?;
        }
        Ok(self.repo.list_errors(code).await?)
    }
}
