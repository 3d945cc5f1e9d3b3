//! Turn pipeline: input → reply → optional illustration → speech → history.
//!
//! Every step commits what it produced before the next one starts, so a
//! failure late in the pipeline never loses earlier work. Text generation is
//! mandatory; image and audio are enhancements whose adapter failures only
//! downgrade the turn to `Partial` and leave an error record behind. Storage
//! failures are never absorbed.

use crate::core::errors::ChatError;
use crate::core::locks::ChatLocks;
use crate::core::models::{ChatRef, Turn, TurnInput, TurnOptions, TurnResult, TurnStatus};
use crate::core::text::{clean_generated_text, derive_title, image_prompt, text_prompt};
use crate::core::traits::TurnService;
use crate::gateway::{
    AdapterFailure, AudioUpload, IMAGE_GENERATION, ModelGateway, TEXT_GENERATION, TRANSCRIPTION,
};
use crate::infrastructure::entities::{Chat, FileRecord, History, MediaKind};
use crate::infrastructure::settings::Settings;
use crate::infrastructure::traits::{ChatRepository, MediaStore, StorageError};
use async_trait::async_trait;
use chrono::Utc;
use di::{Ref, injectable};
use log::{debug, error, info, warn};
use uuid::Uuid;

const CHAT_CODE_LEN: usize = 20;

/// Outcome of an optional pipeline step.
enum Enhancement {
    Stored,
    Skipped,
    Failed(AdapterFailure),
}

#[injectable(TurnService)]
pub struct TurnOrchestrator {
    repo: Ref<dyn ChatRepository>,
    media: Ref<dyn MediaStore>,
    models: Ref<ModelGateway>,
    locks: Ref<ChatLocks>,
    settings: Ref<Settings>,
}

impl TurnOrchestrator {
    pub fn new(
        repo: Ref<dyn ChatRepository>,
        media: Ref<dyn MediaStore>,
        models: Ref<ModelGateway>,
        locks: Ref<ChatLocks>,
        settings: Ref<Settings>,
    ) -> Self {
        Self {
            repo,
            media,
            models,
            locks,
            settings,
        }
    }

    async fn transcribe(&self, chat: &Chat, upload: AudioUpload) -> Result<String, ChatError> {
        let transcription = self
            .models
            .transcriber
            .transcribe(upload)
            .await
            .and_then(|text| {
                if text.trim().is_empty() {
                    Err(AdapterFailure::new(TRANSCRIPTION, "no speech recognized"))
                } else {
                    Ok(text)
                }
            });

        match transcription {
            Ok(text) => {
                debug!("transcribed audio for chat {}: {} chars", chat.code, text.len());
                Ok(text)
            }
            Err(failure) => {
                error!("transcription failed for chat {}: {failure}", chat.code);
                self.repo
                    .record_error(&chat.code, &failure.to_string())
                    .await?;
                Err(ChatError::TranscriptionFailed(failure))
            }
        }
    }

    /// Steps after the input is stored: reply, title, image, speech, result.
    async fn complete_turn(
        &self,
        chat: Chat,
        history: History,
        want_image: bool,
    ) -> Result<TurnResult, ChatError> {
        let output = match self.generate_reply(&history.input_text).await {
            Ok(output) => output,
            Err(failure) => {
                error!("text generation failed for chat {}: {failure}", chat.code);
                self.repo
                    .record_error(&chat.code, &failure.to_string())
                    .await?;
                let files = self.repo.list_files(history.id).await?;

                return Ok(TurnResult {
                    chat,
                    turn: Turn { history, files },
                    status: TurnStatus::Failed,
                    error: Some(failure.to_string()),
                });
            }
        };

        let history = self.repo.set_history_output(history.id, &output).await?;
        info!(
            "generated {} chars for history {} in chat {}",
            output.len(),
            history.id,
            chat.code
        );
        self.assign_title(&chat, &output).await?;

        let mut status = TurnStatus::Complete;

        if want_image && output.chars().count() > self.settings.image_min_chars {
            let outcome = self.illustrate(&history).await?;
            status = self.settle(&chat, status, "image", outcome).await?;
        } else if want_image {
            debug!("reply too short for an illustration, skipping image");
        }

        let outcome = self.speak(&history).await?;
        status = self.settle(&chat, status, "audio", outcome).await?;

        let files = self.repo.list_files(history.id).await?;
        let chat = self.repo.find_chat(&chat.code).await?.unwrap_or(chat);

        Ok(TurnResult {
            chat,
            turn: Turn { history, files },
            status,
            error: None,
        })
    }

    async fn generate_reply(&self, input: &str) -> Result<String, AdapterFailure> {
        let prompt =
            text_prompt(input).map_err(|e| AdapterFailure::new(TEXT_GENERATION, e.to_string()))?;
        let raw = self.models.text.generate(&prompt).await?;

        let output = clean_generated_text(&raw, &prompt);
        if output.is_empty() {
            return Err(AdapterFailure::new(TEXT_GENERATION, "model returned no text"));
        }
        Ok(output)
    }

    async fn assign_title(&self, chat: &Chat, output: &str) -> Result<(), StorageError> {
        if !chat.needs_title() {
            return Ok(());
        }
        if let Some(title) = derive_title(output, self.settings.title_words) {
            self.repo.set_chat_title(&chat.code, &title).await?;
            info!("set chat {} title: {title}", chat.code);
        }
        Ok(())
    }

    async fn illustrate(&self, history: &History) -> Result<Enhancement, StorageError> {
        let summary = match self.models.summarizer.summarize(&history.output_text).await {
            Ok(summary) => summary,
            Err(failure) => return Ok(Enhancement::Failed(failure)),
        };
        if summary.trim().is_empty() {
            warn!("no summary generated for history {}, skipping image", history.id);
            return Ok(Enhancement::Skipped);
        }

        let prompt = match image_prompt(&summary) {
            Ok(prompt) => prompt,
            Err(e) => {
                return Ok(Enhancement::Failed(AdapterFailure::new(
                    IMAGE_GENERATION,
                    e.to_string(),
                )));
            }
        };
        let image = match self.models.images.generate_image(&prompt).await {
            Ok(image) => image,
            Err(failure) => return Ok(Enhancement::Failed(failure)),
        };

        self.attach(history.id, MediaKind::Image, image).await?;
        info!("image generated and saved for history {}", history.id);
        Ok(Enhancement::Stored)
    }

    async fn speak(&self, history: &History) -> Result<Enhancement, StorageError> {
        if !history.has_output() {
            return Ok(Enhancement::Skipped);
        }

        let params = self.models.speech.default_params();
        let audio = match self
            .models
            .speech
            .synthesize(&history.output_text, &params)
            .await
        {
            Ok(audio) => audio,
            Err(failure) => return Ok(Enhancement::Failed(failure)),
        };

        self.attach(history.id, MediaKind::Audio, audio).await?;
        info!("audio generated and saved for history {}", history.id);
        Ok(Enhancement::Stored)
    }

    /// Stores a blob and the file row pointing at it.
    async fn attach(
        &self,
        history_id: i64,
        kind: MediaKind,
        bytes: Vec<u8>,
    ) -> Result<FileRecord, StorageError> {
        let key = self.media.put(kind, history_id, bytes).await?;

        match self.repo.create_file(history_id, kind, &key).await {
            Ok(file) => Ok(file),
            Err(e) => {
                // no row will ever reference the blob
                if let Err(cleanup) = self.media.delete(&key).await {
                    warn!("could not remove unreferenced blob {key}: {cleanup}");
                }
                Err(e)
            }
        }
    }

    /// Logs and audits a failed enhancement; the turn itself still succeeds.
    async fn settle(
        &self,
        chat: &Chat,
        status: TurnStatus,
        step: &str,
        outcome: Enhancement,
    ) -> Result<TurnStatus, StorageError> {
        match outcome {
            Enhancement::Stored | Enhancement::Skipped => Ok(status),
            Enhancement::Failed(failure) => {
                warn!("{step} enhancement failed for chat {}: {failure}", chat.code);
                self.repo
                    .record_error(&chat.code, &failure.to_string())
                    .await?;
                Ok(TurnStatus::Partial)
            }
        }
    }

    /// Deletes blobs first, then the rows referencing them.
    async fn discard_files(&self, history_id: i64, files: &[FileRecord]) -> Result<(), StorageError> {
        for key in files.iter().flat_map(FileRecord::media_keys) {
            self.media.delete(key).await?;
        }
        self.repo.delete_files(history_id).await
    }
}

/// Fresh, unguessable chat code.
pub fn new_chat_code() -> String {
    Uuid::new_v4().simple().to_string()[..CHAT_CODE_LEN].to_owned()
}

#[async_trait]
impl TurnService for TurnOrchestrator {
    async fn run_turn(
        &self,
        chat: ChatRef,
        input: TurnInput,
        options: TurnOptions,
    ) -> Result<TurnResult, ChatError> {
        match &input {
            TurnInput::Text(text) if text.trim().is_empty() => {
                return Err(ChatError::validation("No text provided"));
            }
            TurnInput::Audio(upload) if upload.bytes.is_empty() => {
                return Err(ChatError::validation("No audio file provided"));
            }
            _ => {}
        }

        let (chat, _guard) = match chat {
            ChatRef::New => {
                let now = Utc::now();
                let chat = self
                    .repo
                    .create_chat(Chat {
                        code: new_chat_code(),
                        title: None,
                        created_at: now,
                        updated_at: now,
                    })
                    .await?;
                info!("created new chat with code: {}", chat.code);
                let guard = self.locks.acquire(&chat.code).await;
                (chat, guard)
            }
            ChatRef::Existing(code) => {
                let guard = self.locks.acquire(&code).await;
                let chat = self
                    .repo
                    .find_chat(&code)
                    .await?
                    .ok_or_else(ChatError::chat_not_found)?;
                debug!("retrieved existing chat with code: {}", chat.code);
                (chat, guard)
            }
        };

        let input_text = match input {
            TurnInput::Text(text) => text,
            TurnInput::Audio(upload) => self.transcribe(&chat, upload).await?,
        };

        let history = self.repo.create_history(&chat.code, &input_text).await?;
        info!("created history {} in chat {}", history.id, chat.code);
        self.repo.touch_chat(&chat.code).await?;

        self.complete_turn(chat, history, options.want_image).await
    }

    async fn update_turn(
        &self,
        history_id: i64,
        new_input: String,
    ) -> Result<TurnResult, ChatError> {
        if new_input.trim().is_empty() {
            return Err(ChatError::validation("No text provided"));
        }

        let code = self
            .repo
            .find_history(history_id)
            .await?
            .ok_or_else(ChatError::history_not_found)?
            .chat_code;
        let _guard = self.locks.acquire(&code).await;

        // the chat may have been deleted while waiting
        self.repo
            .find_history(history_id)
            .await?
            .ok_or_else(ChatError::history_not_found)?;
        let chat = self
            .repo
            .find_chat(&code)
            .await?
            .ok_or_else(ChatError::chat_not_found)?;

        let previous = self.repo.list_files(history_id).await?;
        let had_image = previous.iter().any(|f| f.output_image.is_some());

        let history = self.repo.reset_history_input(history_id, &new_input).await?;
        self.discard_files(history_id, &previous).await?;
        self.repo.touch_chat(&chat.code).await?;
        info!("updated input of history {history_id} in chat {code}");

        self.complete_turn(chat, history, had_image).await
    }
}
