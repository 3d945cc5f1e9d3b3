//! Speech synthesis adapter for a Coqui-style TTS server.

use crate::gateway::client::InferenceClient;
use crate::gateway::{AdapterFailure, SPEECH_SYNTHESIS, SpeechParams, SpeechSynthesizer};
use crate::infrastructure::settings::Settings;
use async_trait::async_trait;
use di::{Ref, injectable};
use log::debug;
use serde::Serialize;
use std::io::Cursor;

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    speaker: Option<&'a str>,
    speed: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
}

impl<'a> SynthesisRequest<'a> {
    fn new(text: &'a str, params: &'a SpeechParams) -> Self {
        SynthesisRequest {
            text,
            model: &params.model,
            speaker: params.speaker.as_deref(),
            speed: params.speed,
            language: params.effective_language(),
        }
    }
}

#[injectable(SpeechSynthesizer)]
pub struct HttpSpeechSynthesizer {
    client: Ref<InferenceClient>,
    settings: Ref<Settings>,
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        params: &SpeechParams,
    ) -> Result<Vec<u8>, AdapterFailure> {
        if text.trim().is_empty() {
            return Err(AdapterFailure::new(SPEECH_SYNTHESIS, "no text provided"));
        }

        let request = SynthesisRequest::new(text, params);
        let body = self
            .client
            .post_json(SPEECH_SYNTHESIS, &self.settings.tts_url, &request)
            .await?;

        validate_wav(&body)?;
        Ok(body)
    }

    fn default_params(&self) -> SpeechParams {
        SpeechParams::with_model(self.settings.tts_model.clone())
    }
}

fn validate_wav(body: &[u8]) -> Result<(), AdapterFailure> {
    let reader = hound::WavReader::new(Cursor::new(body))
        .map_err(|e| AdapterFailure::new(SPEECH_SYNTHESIS, format!("response is not a WAV file: {e}")))?;
    let spec = reader.spec();
    debug!(
        "synthesized {} samples at {} Hz",
        reader.duration(),
        spec.sample_rate
    );
    Ok(())
}
