//! Multi-modal chat backend
//!
//! Text or audio in; generated reply, optional illustration and speech out.
//!
//! (c) Softlandia 2025

use tokio_multimodal_chat_api::api;
use tokio_multimodal_chat_api::api::chat::schemas::MEDIA_PREFIX;
use tokio_multimodal_chat_api::core::history::ChatHistoryService;
use tokio_multimodal_chat_api::core::locks::ChatLocks;
use tokio_multimodal_chat_api::core::orchestrator::TurnOrchestrator;
use tokio_multimodal_chat_api::gateway::ModelGateway;
use tokio_multimodal_chat_api::gateway::client::InferenceClient;
use tokio_multimodal_chat_api::gateway::huggingface::{
    HfImageGenerator, HfSummarizer, HfTextGenerator,
};
use tokio_multimodal_chat_api::gateway::speech::HttpSpeechSynthesizer;
use tokio_multimodal_chat_api::gateway::transcription::HttpTranscriber;
use tokio_multimodal_chat_api::infrastructure::database::DatabaseConnection;
use tokio_multimodal_chat_api::infrastructure::media::LocalMediaStore;
use tokio_multimodal_chat_api::infrastructure::repositories::DbChatRepository;
use tokio_multimodal_chat_api::infrastructure::settings::Settings;

use anyhow::Context;
use axum::Router;
use axum::http::{HeaderValue, Method};
use di::{Injectable, ServiceCollection, ServiceProvider};
use di_axum::RouterServiceProviderExtensions;
use log::{info, warn};
use sqlx::sqlite::SqliteConnectOptions;
use std::str::FromStr;
use tokio::runtime::{Builder, Runtime};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;

fn main() -> anyhow::Result<()> {
    // initialize tracing
    tracing_subscriber::fmt::init();

    let settings = Settings::from_env();
    SqliteConnectOptions::from_str(&settings.database_url)
        .with_context(|| format!("invalid DATABASE_URL {}", settings.database_url))?;

    let runtime: Runtime = Builder::new_multi_thread().enable_all().build()?;

    let web_task_handle = runtime.spawn(web_server_task());

    runtime.block_on(async {
        web_task_handle
            .await
            .context("failed to join web_task_handle")?
    })
}

fn build_provider() -> anyhow::Result<ServiceProvider> {
    let provider = ServiceCollection::new()
        .add(Settings::singleton())
        .add(DatabaseConnection::singleton())
        .add(LocalMediaStore::singleton())
        .add(ChatLocks::singleton())
        .add(InferenceClient::singleton())
        .add(HfTextGenerator::singleton())
        .add(HfSummarizer::singleton())
        .add(HfImageGenerator::singleton())
        .add(HttpSpeechSynthesizer::singleton())
        .add(HttpTranscriber::singleton())
        .add(ModelGateway::singleton())
        .add(DbChatRepository::scoped())
        .add(TurnOrchestrator::scoped())
        .add(ChatHistoryService::scoped())
        .build_provider()
        .map_err(|e| anyhow::anyhow!("invalid service configuration: {e:?}"))?;

    Ok(provider)
}

async fn web_server_task() -> anyhow::Result<()> {
    let provider = build_provider()?;
    let settings = provider.get_required::<Settings>();

    let database = provider.get_required::<DatabaseConnection>();
    sqlx::migrate!()
        .run(&**database)
        .await
        .context("failed to apply migrations")?;

    tokio::fs::create_dir_all(&settings.media_root)
        .await
        .with_context(|| format!("cannot create {}", settings.media_root.display()))?;

    let origins: Vec<HeaderValue> = settings
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(origin) => Some(origin),
            Err(_) => {
                warn!("ignoring invalid origin {origin}");
                None
            }
        })
        .collect();

    let app = Router::new()
        .merge(api::router(settings.max_upload_bytes))
        .nest_service(
            MEDIA_PREFIX,
            ServiceBuilder::new().service(ServeDir::new(&settings.media_root)),
        )
        .layer(
            CorsLayer::new()
                .allow_headers(Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                ])
                .allow_origin(AllowOrigin::list(origins)),
        )
        .with_provider(provider);

    let listener = tokio::net::TcpListener::bind(&settings.bind_address)
        .await
        .with_context(|| format!("cannot bind {}", settings.bind_address))?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    info!("Shutting down...");

    Ok(())
}
