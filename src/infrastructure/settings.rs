//! Process-wide settings, read once from the environment

use di::{inject, injectable};
use log::warn;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_TEXT_MODEL_URL: &str =
    "https://api-inference.huggingface.co/models/mistralai/Mistral-Nemo-Instruct-2407";
const DEFAULT_SUMMARY_MODEL_URL: &str =
    "https://api-inference.huggingface.co/models/facebook/bart-large-cnn";
const DEFAULT_IMAGE_MODEL_URL: &str =
    "https://api-inference.huggingface.co/models/black-forest-labs/FLUX.1-dev";
const DEFAULT_TRANSCRIPTION_URL: &str =
    "https://api-inference.huggingface.co/models/openai/whisper-base";

pub const DEFAULT_TTS_MODEL: &str = "tts_models/en/ljspeech/tacotron2-DDC";

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub media_root: PathBuf,
    pub bind_address: String,
    pub allowed_origins: Vec<String>,
    /// Bearer token for the hosted inference endpoints.
    pub inference_token: Option<String>,
    pub text_model_url: String,
    pub summary_model_url: String,
    pub image_model_url: String,
    pub tts_url: String,
    pub tts_model: String,
    pub transcription_url: String,
    pub request_timeout: Duration,
    /// Generated replies must be longer than this to get an illustration.
    pub image_min_chars: usize,
    pub title_words: usize,
    pub default_per_page: u32,
    pub max_per_page: u32,
    /// Largest request body accepted by the routes that take audio.
    pub max_upload_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: "sqlite://chat.db?mode=rwc".to_owned(),
            media_root: PathBuf::from("media"),
            bind_address: "0.0.0.0:3000".to_owned(),
            allowed_origins: vec![
                "http://localhost:3000".to_owned(),
                "http://localhost:5173".to_owned(),
            ],
            inference_token: None,
            text_model_url: DEFAULT_TEXT_MODEL_URL.to_owned(),
            summary_model_url: DEFAULT_SUMMARY_MODEL_URL.to_owned(),
            image_model_url: DEFAULT_IMAGE_MODEL_URL.to_owned(),
            tts_url: "http://localhost:5002/api/tts".to_owned(),
            tts_model: DEFAULT_TTS_MODEL.to_owned(),
            transcription_url: DEFAULT_TRANSCRIPTION_URL.to_owned(),
            request_timeout: Duration::from_secs(120),
            image_min_chars: 200,
            title_words: 4,
            default_per_page: 10,
            max_per_page: 100,
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

#[injectable]
impl Settings {
    #[inject]
    pub fn create() -> Settings {
        Settings::from_env()
    }

    /// Reads `.env` (if present) and the process environment on top of the defaults.
    pub fn from_env() -> Settings {
        dotenvy::dotenv().ok();
        let defaults = Settings::default();

        Settings {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            media_root: env::var("MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.media_root),
            bind_address: env::var("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or(defaults.allowed_origins),
            inference_token: env::var("INFERENCE_API_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
            text_model_url: env::var("TEXT_MODEL_URL").unwrap_or(defaults.text_model_url),
            summary_model_url: env::var("SUMMARY_MODEL_URL").unwrap_or(defaults.summary_model_url),
            image_model_url: env::var("IMAGE_MODEL_URL").unwrap_or(defaults.image_model_url),
            tts_url: env::var("TTS_URL").unwrap_or(defaults.tts_url),
            tts_model: env::var("TTS_MODEL").unwrap_or(defaults.tts_model),
            transcription_url: env::var("TRANSCRIPTION_URL").unwrap_or(defaults.transcription_url),
            request_timeout: Duration::from_secs(parse_var(
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )),
            image_min_chars: parse_var("IMAGE_MIN_CHARS", defaults.image_min_chars),
            title_words: defaults.title_words,
            default_per_page: defaults.default_per_page,
            max_per_page: defaults.max_per_page,
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
        }
    }
}

fn parse_var<T: FromStr + Copy + std::fmt::Display>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => T::from_str(raw.trim()).unwrap_or_else(|_| {
            warn!("ignoring invalid {name}={raw:?}, using {default}");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_pipeline() {
        let settings = Settings::default();
        assert_eq!(settings.image_min_chars, 200);
        assert_eq!(settings.title_words, 4);
        assert_eq!(settings.default_per_page, 10);
        assert_eq!(settings.tts_model, DEFAULT_TTS_MODEL);
        assert!(settings.max_upload_bytes > 2 * 1024 * 1024);
    }

    #[test]
    fn test_parse_var_falls_back_when_unset() {
        assert_eq!(parse_var("CHAT_API_SURELY_UNSET_VARIABLE", 42usize), 42);
    }
}
