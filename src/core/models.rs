//! Inputs and results of the chat services

use crate::gateway::AudioUpload;
use crate::infrastructure::entities::{Chat, FileRecord, History};

/// Which chat a turn goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatRef {
    New,
    Existing(String),
}

#[derive(Debug, Clone)]
pub enum TurnInput {
    Text(String),
    Audio(AudioUpload),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TurnOptions {
    pub want_image: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    /// Reply generated and every attempted enhancement stored.
    Complete,
    /// Reply generated, but an image or audio enhancement failed.
    Partial,
    /// No reply; only the input was kept.
    Failed,
}

impl TurnStatus {
    pub fn is_success(self) -> bool {
        !matches!(self, TurnStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TurnStatus::Complete => "complete",
            TurnStatus::Partial => "partial",
            TurnStatus::Failed => "failed",
        }
    }
}

/// A history entry with the media attached to it.
#[derive(Debug, Clone)]
pub struct Turn {
    pub history: History,
    pub files: Vec<FileRecord>,
}

impl Turn {
    pub fn image_count(&self) -> usize {
        self.files.iter().filter(|f| f.output_image.is_some()).count()
    }

    pub fn audio_count(&self) -> usize {
        self.files.iter().filter(|f| f.output_audio.is_some()).count()
    }
}

#[derive(Debug, Clone)]
pub struct TurnResult {
    pub chat: Chat,
    pub turn: Turn,
    pub status: TurnStatus,
    /// Why text generation failed, for failed turns.
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HistoryPage {
    pub chat: Chat,
    pub turns: Vec<Turn>,
    pub total_pages: u32,
    pub current_page: u32,
}

/// Number of pages needed for `total` items; an empty chat still has one page.
pub fn page_count(total: u64, per_page: u32) -> u32 {
    let per_page = u64::from(per_page.max(1));
    total.div_ceil(per_page).max(1) as u32
}
