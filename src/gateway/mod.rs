//! External model gateway.
//!
//! One thin adapter per hosted model. Every adapter hands the orchestrator
//! plain values and reports transport problems and unexpected response shapes
//! the same way, as an [`AdapterFailure`].

use async_trait::async_trait;
use di::{Ref, injectable};
use std::path::Path;
use thiserror::Error;

pub mod audio;
pub mod client;
pub mod huggingface;
pub mod speech;
pub mod transcription;

pub const TEXT_GENERATION: &str = "text-generation";
pub const SUMMARIZATION: &str = "summarization";
pub const IMAGE_GENERATION: &str = "image-generation";
pub const SPEECH_SYNTHESIS: &str = "speech-synthesis";
pub const TRANSCRIPTION: &str = "transcription";

#[derive(Debug, Clone, Error)]
#[error("{service} failed: {reason}")]
pub struct AdapterFailure {
    pub service: &'static str,
    pub reason: String,
}

impl AdapterFailure {
    pub fn new(service: &'static str, reason: impl Into<String>) -> Self {
        Self {
            service,
            reason: reason.into(),
        }
    }
}

/// Voice settings for speech synthesis.
#[derive(Debug, Clone)]
pub struct SpeechParams {
    pub model: String,
    pub speaker: Option<String>,
    pub speed: f32,
    pub language: Option<String>,
}

impl SpeechParams {
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            speaker: None,
            speed: 1.0,
            language: None,
        }
    }

    pub fn is_multilingual(&self) -> bool {
        self.model.contains("multilingual") || self.model.contains("multi-dataset")
    }

    /// Language to send along; single-language models never get one.
    pub fn effective_language(&self) -> Option<&str> {
        if self.is_multilingual() {
            Some(self.language.as_deref().unwrap_or("en"))
        } else {
            None
        }
    }
}

/// An uploaded recording in whatever container the client sent.
#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub bytes: Vec<u8>,
    pub file_name: Option<String>,
}

impl AudioUpload {
    pub fn new(bytes: Vec<u8>, file_name: Option<String>) -> Self {
        Self { bytes, file_name }
    }

    /// Lower-cased file extension, used as a decoder hint.
    pub fn extension(&self) -> Option<String> {
        self.file_name
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Raw completion for `prompt`; may echo the prompt back.
    async fn generate(&self, prompt: &str) -> Result<String, AdapterFailure>;
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, AdapterFailure>;
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// JPEG bytes illustrating `prompt`.
    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, AdapterFailure>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// WAV bytes speaking `text`.
    async fn synthesize(&self, text: &str, params: &SpeechParams)
    -> Result<Vec<u8>, AdapterFailure>;

    /// Voice used when the caller does not pick one.
    fn default_params(&self) -> SpeechParams;
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: AudioUpload) -> Result<String, AdapterFailure>;
}

/// The five model adapters, resolved once and shared by every turn.
#[injectable]
pub struct ModelGateway {
    pub text: Ref<dyn TextGenerator>,
    pub summarizer: Ref<dyn Summarizer>,
    pub images: Ref<dyn ImageGenerator>,
    pub speech: Ref<dyn SpeechSynthesizer>,
    pub transcriber: Ref<dyn Transcriber>,
}
