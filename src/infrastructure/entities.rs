//! Database entities

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Title given to chats created without one; replaced by the first reply.
pub const PLACEHOLDER_TITLE: &str = "New chat";

#[derive(Debug, Clone, FromRow)]
pub struct Chat {
    pub code: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    /// True while the chat still waits for a title derived from a reply.
    pub fn needs_title(&self) -> bool {
        match self.title.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(title) => title == PLACEHOLDER_TITLE,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct History {
    pub id: i64,
    pub chat_code: String,
    pub input_text: String,
    /// Empty until text generation succeeded for this turn.
    pub output_text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl History {
    pub fn has_output(&self) -> bool {
        !self.output_text.is_empty()
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct FileRecord {
    pub id: i64,
    pub history_id: i64,
    pub output_audio: Option<String>,
    pub output_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    /// Media keys referenced by this row.
    pub fn media_keys(&self) -> impl Iterator<Item = &str> {
        self.output_audio
            .as_deref()
            .into_iter()
            .chain(self.output_image.as_deref())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ErrorRecord {
    pub id: i64,
    pub chat_code: String,
    pub error: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Image,
}

impl MediaKind {
    pub fn directory(self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Image => "images",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            MediaKind::Audio => "wav",
            MediaKind::Image => "jpg",
        }
    }
}
