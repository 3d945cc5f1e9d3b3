//! Hosted inference adapters: text generation, summarization and images.

use crate::gateway::client::{InferenceClient, decode};
use crate::gateway::{
    AdapterFailure, IMAGE_GENERATION, ImageGenerator, SUMMARIZATION, Summarizer, TEXT_GENERATION,
    TextGenerator,
};
use crate::infrastructure::settings::Settings;
use async_trait::async_trait;
use di::{Ref, injectable};
use image::ImageFormat;
use log::debug;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

#[derive(Serialize)]
struct InferenceRequest<'a, P: Serialize> {
    inputs: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<P>,
}

#[derive(Serialize)]
struct GenerationParameters {
    temperature: f32,
    top_p: f32,
    return_full_text: bool,
}

#[derive(Deserialize)]
struct GeneratedText {
    generated_text: String,
}

#[derive(Deserialize)]
struct SummaryText {
    summary_text: String,
}

#[injectable(TextGenerator)]
pub struct HfTextGenerator {
    client: Ref<InferenceClient>,
    settings: Ref<Settings>,
}

#[async_trait]
impl TextGenerator for HfTextGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, AdapterFailure> {
        let request = InferenceRequest {
            inputs: prompt,
            parameters: Some(GenerationParameters {
                temperature: 0.65,
                top_p: 0.85,
                return_full_text: true,
            }),
        };

        let body = self
            .client
            .post_json(TEXT_GENERATION, &self.settings.text_model_url, &request)
            .await?;
        parse_generated_text(&body)
    }
}

fn parse_generated_text(body: &[u8]) -> Result<String, AdapterFailure> {
    let outputs: Vec<GeneratedText> = decode(TEXT_GENERATION, body)?;
    outputs
        .into_iter()
        .next()
        .map(|output| output.generated_text)
        .ok_or_else(|| AdapterFailure::new(TEXT_GENERATION, "response contained no generations"))
}

#[injectable(Summarizer)]
pub struct HfSummarizer {
    client: Ref<InferenceClient>,
    settings: Ref<Settings>,
}

#[async_trait]
impl Summarizer for HfSummarizer {
    async fn summarize(&self, text: &str) -> Result<String, AdapterFailure> {
        let request = InferenceRequest::<()> {
            inputs: text,
            parameters: None,
        };

        let body = self
            .client
            .post_json(SUMMARIZATION, &self.settings.summary_model_url, &request)
            .await?;
        parse_summary(&body)
    }
}

fn parse_summary(body: &[u8]) -> Result<String, AdapterFailure> {
    let outputs: Vec<SummaryText> = decode(SUMMARIZATION, body)?;
    Ok(outputs
        .into_iter()
        .next()
        .map(|output| output.summary_text.trim().to_owned())
        .unwrap_or_default())
}

#[injectable(ImageGenerator)]
pub struct HfImageGenerator {
    client: Ref<InferenceClient>,
    settings: Ref<Settings>,
}

#[async_trait]
impl ImageGenerator for HfImageGenerator {
    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, AdapterFailure> {
        let request = InferenceRequest::<()> {
            inputs: prompt,
            parameters: None,
        };

        let body = self
            .client
            .post_json(IMAGE_GENERATION, &self.settings.image_model_url, &request)
            .await?;

        tokio::task::spawn_blocking(move || reencode_as_jpeg(&body))
            .await
            .map_err(|e| AdapterFailure::new(IMAGE_GENERATION, e.to_string()))?
    }
}

/// Decodes whatever image format came back and stores it as JPEG.
fn reencode_as_jpeg(body: &[u8]) -> Result<Vec<u8>, AdapterFailure> {
    let decoded = image::load_from_memory(body)
        .map_err(|e| AdapterFailure::new(IMAGE_GENERATION, format!("response is not an image: {e}")))?;
    debug!("generated image is {}x{}", decoded.width(), decoded.height());

    let mut jpeg = Vec::new();
    image::DynamicImage::ImageRgb8(decoded.to_rgb8())
        .write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
        .map_err(|e| AdapterFailure::new(IMAGE_GENERATION, format!("JPEG encoding failed: {e}")))?;

    Ok(jpeg)
}
