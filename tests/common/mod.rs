//! Shared fixtures: in-memory database and fake model adapters.
//!
//! Every fake counts its calls so tests can assert which pipeline steps ran.

#![allow(dead_code)]

use async_trait::async_trait;
use di::{Ref, inject, injectable};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio_multimodal_chat_api::core::locks::ChatLocks;
use tokio_multimodal_chat_api::core::orchestrator::TurnOrchestrator;
use tokio_multimodal_chat_api::core::history::ChatHistoryService;
use tokio_multimodal_chat_api::gateway::{
    AdapterFailure, AudioUpload, IMAGE_GENERATION, ImageGenerator, ModelGateway,
    SPEECH_SYNTHESIS, SUMMARIZATION, SpeechParams, SpeechSynthesizer, Summarizer,
    TEXT_GENERATION, TRANSCRIPTION, TextGenerator, Transcriber,
};
use tokio_multimodal_chat_api::infrastructure::database::DatabaseConnection;
use tokio_multimodal_chat_api::infrastructure::entities::MediaKind;
use tokio_multimodal_chat_api::infrastructure::media::LocalMediaStore;
use tokio_multimodal_chat_api::infrastructure::repositories::DbChatRepository;
use tokio_multimodal_chat_api::infrastructure::settings::Settings;
use tokio_multimodal_chat_api::infrastructure::traits::{
    ChatRepository, MediaStore, StorageError,
};

/// Counter for unique test database URIs
static TEST_DB_COUNTER: AtomicU32 = AtomicU32::new(0);

/// A reply well over the illustration threshold.
pub const LONG_REPLY: &str = "The harbour town wakes before dawn. Fishing boats slip out past the \
    lighthouse while bakers pull the first loaves from stone ovens, and the smell of bread drifts \
    down to the quay where gulls argue over scraps. By noon the market square is loud with traders.";

pub const SHORT_REPLY: &str = "Sure, happy to help with that.";

/// Inputs containing this marker make [`FakeText`] fail.
pub const FAIL_MARKER: &str = "[fail]";

/// Fresh in-memory database with migrations applied.
pub async fn setup_test_db() -> SqlitePool {
    let db_num = TEST_DB_COUNTER.fetch_add(1, Ordering::SeqCst);
    // Use file URI format with shared cache - each test gets a unique DB
    let db_url = format!("sqlite:file:chattest{}?mode=memory&cache=shared", db_num);

    // a single connection keeps the in-memory database alive and avoids table locks
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect(&db_url)
        .await
        .unwrap();
    sqlx::migrate!().run(&pool).await.unwrap();

    pool
}

pub fn test_settings() -> Settings {
    Settings::default()
}

pub fn silent_wav() -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut bytes = Vec::new();
    {
        let mut writer = hound::WavWriter::new(std::io::Cursor::new(&mut bytes), spec).unwrap();
        for _ in 0..160 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    bytes
}

pub struct FakeText {
    reply: Mutex<String>,
    delay: Duration,
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    watched: Mutex<Option<SqlitePool>>,
    /// `(input_text, output_text)` of every history row, read at each call.
    pub histories_seen: Mutex<Vec<Vec<(String, String)>>>,
}

#[injectable(TextGenerator)]
impl FakeText {
    #[inject]
    pub fn create() -> FakeText {
        FakeText::replying(LONG_REPLY)
    }

    pub fn replying(reply: &str) -> FakeText {
        FakeText {
            reply: Mutex::new(reply.to_owned()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            watched: Mutex::new(None),
            histories_seen: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot the `histories` table of `pool` whenever a reply is requested.
    pub fn watch_histories(&self, pool: SqlitePool) {
        *self.watched.lock().unwrap() = Some(pool);
    }

    pub fn with_delay(mut self, delay: Duration) -> FakeText {
        self.delay = delay;
        self
    }

    pub fn set_reply(&self, reply: &str) {
        *self.reply.lock().unwrap() = reply.to_owned();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for FakeText {
    async fn generate(&self, prompt: &str) -> Result<String, AdapterFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_owned());

        let watched = self.watched.lock().unwrap().clone();
        if let Some(pool) = watched {
            let rows: Vec<(String, String)> =
                sqlx::query_as("SELECT input_text, output_text FROM histories ORDER BY id")
                    .fetch_all(&pool)
                    .await
                    .unwrap();
            self.histories_seen.lock().unwrap().push(rows);
        }

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if prompt.contains(FAIL_MARKER) {
            return Err(AdapterFailure::new(TEXT_GENERATION, "HTTP 503: model loading"));
        }
        // completion-style models echo the prompt
        let reply = self.reply.lock().unwrap().clone();
        Ok(format!("{prompt} {reply}"))
    }
}

pub struct FakeSummarizer {
    summary: String,
    fail: bool,
    pub calls: AtomicUsize,
}

#[injectable(Summarizer)]
impl FakeSummarizer {
    #[inject]
    pub fn create() -> FakeSummarizer {
        FakeSummarizer::returning("A harbour town at dawn")
    }

    pub fn returning(summary: &str) -> FakeSummarizer {
        FakeSummarizer {
            summary: summary.to_owned(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> FakeSummarizer {
        FakeSummarizer {
            fail: true,
            ..FakeSummarizer::returning("")
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    async fn summarize(&self, _text: &str) -> Result<String, AdapterFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AdapterFailure::new(SUMMARIZATION, "timed out"));
        }
        Ok(self.summary.clone())
    }
}

pub struct FakeImages {
    fail: bool,
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

#[injectable(ImageGenerator)]
impl FakeImages {
    #[inject]
    pub fn create() -> FakeImages {
        FakeImages::new(false)
    }

    pub fn new(fail: bool) -> FakeImages {
        FakeImages {
            fail,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageGenerator for FakeImages {
    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, AdapterFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_owned());
        if self.fail {
            return Err(AdapterFailure::new(IMAGE_GENERATION, "HTTP 500: out of memory"));
        }
        Ok(vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10])
    }
}

pub struct FakeSpeech {
    fail: bool,
    pub calls: AtomicUsize,
}

#[injectable(SpeechSynthesizer)]
impl FakeSpeech {
    #[inject]
    pub fn create() -> FakeSpeech {
        FakeSpeech::new(false)
    }

    pub fn new(fail: bool) -> FakeSpeech {
        FakeSpeech {
            fail,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn synthesize(
        &self,
        _text: &str,
        _params: &SpeechParams,
    ) -> Result<Vec<u8>, AdapterFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AdapterFailure::new(SPEECH_SYNTHESIS, "connection refused"));
        }
        Ok(silent_wav())
    }

    fn default_params(&self) -> SpeechParams {
        SpeechParams::with_model("tts_models/en/ljspeech/tacotron2-DDC")
    }
}

pub struct FakeTranscriber {
    text: Option<String>,
    pub calls: AtomicUsize,
}

#[injectable(Transcriber)]
impl FakeTranscriber {
    #[inject]
    pub fn create() -> FakeTranscriber {
        FakeTranscriber::hearing("What is the weather like in Helsinki?")
    }

    pub fn hearing(text: &str) -> FakeTranscriber {
        FakeTranscriber {
            text: Some(text.to_owned()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> FakeTranscriber {
        FakeTranscriber {
            text: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, _audio: AudioUpload) -> Result<String, AdapterFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.text
            .clone()
            .ok_or_else(|| AdapterFailure::new(TRANSCRIPTION, "unsupported audio"))
    }
}

/// Blob store kept in memory, for tests that go through the DI container.
#[derive(Default)]
pub struct MemoryMediaStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    counter: AtomicUsize,
}

#[injectable(MediaStore)]
impl MemoryMediaStore {
    #[inject]
    pub fn create() -> MemoryMediaStore {
        MemoryMediaStore::default()
    }
}

#[async_trait]
impl MediaStore for MemoryMediaStore {
    async fn put(
        &self,
        kind: MediaKind,
        history_id: i64,
        bytes: Vec<u8>,
    ) -> Result<String, StorageError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let key = format!(
            "{}/{history_id}_{n}.{}",
            kind.directory(),
            kind.extension()
        );
        self.blobs.lock().unwrap().insert(key.clone(), bytes);
        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.blobs
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::Missing(key.to_owned()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.blobs.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Services wired by hand around one database and one media directory.
pub struct Harness {
    pub pool: SqlitePool,
    pub media_dir: TempDir,
    pub repo: Ref<dyn ChatRepository>,
    pub media: Ref<LocalMediaStore>,
    pub text: Ref<FakeText>,
    pub summarizer: Ref<FakeSummarizer>,
    pub images: Ref<FakeImages>,
    pub speech: Ref<FakeSpeech>,
    pub transcriber: Ref<FakeTranscriber>,
    pub locks: Ref<ChatLocks>,
    pub settings: Ref<Settings>,
}

pub struct HarnessBuilder {
    text: FakeText,
    summarizer: FakeSummarizer,
    images: FakeImages,
    speech: FakeSpeech,
    transcriber: FakeTranscriber,
}

impl HarnessBuilder {
    pub fn text(mut self, text: FakeText) -> Self {
        self.text = text;
        self
    }

    pub fn summarizer(mut self, summarizer: FakeSummarizer) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn images(mut self, images: FakeImages) -> Self {
        self.images = images;
        self
    }

    pub fn speech(mut self, speech: FakeSpeech) -> Self {
        self.speech = speech;
        self
    }

    pub fn transcriber(mut self, transcriber: FakeTranscriber) -> Self {
        self.transcriber = transcriber;
        self
    }

    pub async fn build(self) -> Harness {
        let pool = setup_test_db().await;
        let media_dir = tempfile::tempdir().unwrap();
        let connection = Ref::new(DatabaseConnection::from_pool(pool.clone()));

        Harness {
            repo: Ref::new(DbChatRepository::new(connection)),
            media: Ref::new(LocalMediaStore::new(media_dir.path())),
            pool,
            media_dir,
            text: Ref::new(self.text),
            summarizer: Ref::new(self.summarizer),
            images: Ref::new(self.images),
            speech: Ref::new(self.speech),
            transcriber: Ref::new(self.transcriber),
            locks: Ref::new(ChatLocks::default()),
            settings: Ref::new(test_settings()),
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            text: FakeText::replying(LONG_REPLY),
            summarizer: FakeSummarizer::create(),
            images: FakeImages::new(false),
            speech: FakeSpeech::new(false),
            transcriber: FakeTranscriber::create(),
        }
    }

    pub async fn new() -> Harness {
        Harness::builder().build().await
    }

    pub fn gateway(&self) -> Ref<ModelGateway> {
        Ref::new(ModelGateway {
            text: self.text.clone(),
            summarizer: self.summarizer.clone(),
            images: self.images.clone(),
            speech: self.speech.clone(),
            transcriber: self.transcriber.clone(),
        })
    }

    pub fn orchestrator(&self) -> TurnOrchestrator {
        TurnOrchestrator::new(
            self.repo.clone(),
            self.media.clone(),
            self.gateway(),
            self.locks.clone(),
            self.settings.clone(),
        )
    }

    pub fn history(&self) -> ChatHistoryService {
        ChatHistoryService::new(
            self.repo.clone(),
            self.media.clone(),
            self.locks.clone(),
            self.settings.clone(),
        )
    }

    /// Number of files currently stored under the media root.
    pub fn stored_blobs(&self) -> usize {
        ["audio", "images"]
            .iter()
            .map(|dir| {
                std::fs::read_dir(self.media_dir.path().join(dir))
                    .map(|entries| entries.count())
                    .unwrap_or(0)
            })
            .sum()
    }

    pub async fn count(&self, table: &str) -> i64 {
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .unwrap();
        count
    }
}
