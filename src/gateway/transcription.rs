//! Speech-to-text adapter (Whisper behind a hosted inference endpoint)

use crate::gateway::audio::normalize_upload;
use crate::gateway::client::{InferenceClient, decode};
use crate::gateway::{AdapterFailure, AudioUpload, TRANSCRIPTION, Transcriber};
use crate::infrastructure::settings::Settings;
use async_trait::async_trait;
use di::{Ref, injectable};
use serde::Deserialize;

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[injectable(Transcriber)]
pub struct HttpTranscriber {
    client: Ref<InferenceClient>,
    settings: Ref<Settings>,
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio: AudioUpload) -> Result<String, AdapterFailure> {
        let wav = normalize_upload(audio).await?;

        let body = self
            .client
            .post_bytes(TRANSCRIPTION, &self.settings.transcription_url, "audio/wav", wav)
            .await?;
        parse_transcription(&body)
    }
}

fn parse_transcription(body: &[u8]) -> Result<String, AdapterFailure> {
    let response: TranscriptionResponse = decode(TRANSCRIPTION, body)?;
    Ok(response.text.trim().to_owned())
}
