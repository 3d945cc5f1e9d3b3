//! Standalone speech endpoints

use crate::api::{error_response, unreadable_body};
use crate::core::errors::ChatError;
use crate::gateway::{AudioUpload, SpeechSynthesizer, Transcriber};
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart};
use axum::http::StatusCode;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use di_axum::Inject;
use log::info;
use serde::{Deserialize, Serialize};

pub fn router(upload_limit: usize) -> Router {
    Router::new().route("/tts", post(text_to_speech)).route(
        "/transcribe",
        post(transcribe).layer(DefaultBodyLimit::max(upload_limit)),
    )
}

#[derive(Deserialize, Debug)]
pub struct SpeechRequest {
    pub text: Option<String>,
    pub model: Option<String>,
    pub speaker: Option<String>,
    pub speed: Option<f32>,
    pub language: Option<String>,
    /// Answer with `{audio_base64}` instead of a WAV body.
    #[serde(default)]
    pub base64: bool,
}

#[derive(Serialize, Debug)]
pub struct EncodedAudio {
    pub audio_base64: String,
}

#[derive(Serialize, Debug)]
pub struct Transcription {
    pub transcription: String,
}

async fn text_to_speech(
    Inject(synthesizer): Inject<dyn SpeechSynthesizer>,
    body: Result<Json<SpeechRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid JSON in request body"),
    };

    let text = match request.text.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => text.to_owned(),
        _ => return ChatError::validation("No text provided").into_response(),
    };

    let mut params = synthesizer.default_params();
    if let Some(model) = request.model {
        params.model = model;
    }
    params.speaker = request.speaker;
    params.language = request.language;
    if let Some(speed) = request.speed {
        params.speed = speed;
    }

    let audio = match synthesizer.synthesize(&text, &params).await {
        Ok(audio) => audio,
        Err(failure) => return ChatError::Adapter(failure).into_response(),
    };
    info!("synthesized {} bytes of speech with {}", audio.len(), params.model);

    if request.base64 {
        Json(EncodedAudio {
            audio_base64: BASE64.encode(audio),
        })
        .into_response()
    } else {
        (
            [
                (CONTENT_TYPE, "audio/wav"),
                (CONTENT_DISPOSITION, "attachment; filename=\"speech.wav\""),
            ],
            audio,
        )
            .into_response()
    }
}

async fn transcribe(
    Inject(transcriber): Inject<dyn Transcriber>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(e) => return unreadable_body(e.status(), e.body_text()),
    };

    let mut upload = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("audio") => {
                let file_name = field.file_name().map(str::to_owned);
                match field.bytes().await {
                    Ok(bytes) => upload = Some(AudioUpload::new(bytes.to_vec(), file_name)),
                    Err(e) => return unreadable_body(e.status(), e.body_text()),
                }
            }
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => return unreadable_body(e.status(), e.body_text()),
        }
    }

    let upload = match upload {
        Some(upload) if !upload.bytes.is_empty() => upload,
        _ => return ChatError::validation("No audio file provided").into_response(),
    };

    match transcriber.transcribe(upload).await {
        Ok(transcription) => Json(Transcription { transcription }).into_response(),
        Err(failure) => ChatError::TranscriptionFailed(failure).into_response(),
    }
}
