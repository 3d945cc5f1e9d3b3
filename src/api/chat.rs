//! Turn endpoints: submit, page through, edit and delete a chat

use crate::api::chat::schemas::{
    ChatCodeQuery, HistoryPage, HistoryQuery, Message, TurnForm, TurnResponse, UpdateTurn,
};
use crate::api::unreadable_body;
use crate::core::errors::ChatError;
use crate::core::models::{ChatRef, TurnInput, TurnOptions, TurnResult};
use crate::core::traits::{HistoryService, TurnService};
use crate::gateway::AudioUpload;
use async_trait::async_trait;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Query, Request};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use di_axum::Inject;
use log::debug;

pub fn router(upload_limit: usize) -> Router {
    Router::new()
        .route(
            "/",
            get(chat_history)
                .post(submit_turn)
                .put(update_turn)
                .delete(delete_chat),
        )
        .layer(DefaultBodyLimit::max(upload_limit))
}

/// A parsed turn request, from either a JSON body or a multipart form.
#[derive(Debug)]
pub struct TurnSubmission {
    pub chat: ChatRef,
    pub input: TurnInput,
    pub options: TurnOptions,
}

#[async_trait]
impl<S> FromRequest<S> for TurnSubmission
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Response> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("multipart/form-data"));

        let form = if is_multipart {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| unreadable_body(e.status(), e.body_text()))?;
            read_form(multipart).await.map_err(bad_multipart)?
        } else {
            let Json(form) = Json::<TurnForm>::from_request(req, state)
                .await
                .map_err(bad_json)?;
            form
        };

        form.into_submission().map_err(IntoResponse::into_response)
    }
}

async fn read_form(mut multipart: Multipart) -> Result<TurnForm, MultipartError> {
    let mut form = TurnForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_owned();

        if name == "audio" || name == "audio_file" {
            let file_name = field.file_name().map(str::to_owned);
            let bytes = field.bytes().await?;
            form.audio = Some(AudioUpload::new(bytes.to_vec(), file_name));
            continue;
        }

        let value = field.text().await?;
        match name.as_str() {
            "new_chat" => form.new_chat = schemas::parse_flag(&value),
            "chat_code" => form.chat_code = Some(value),
            "input_type" => form.input_type = Some(value),
            "input_content" => form.input_content = Some(value),
            "generate_image" => form.generate_image = schemas::parse_flag(&value),
            _ => debug!("ignoring form field {name}"),
        }
    }

    Ok(form)
}

impl TurnForm {
    fn into_submission(self) -> Result<TurnSubmission, ChatError> {
        let chat = if self.new_chat {
            ChatRef::New
        } else {
            match self.chat_code.map(|c| c.trim().to_owned()) {
                Some(code) if !code.is_empty() => ChatRef::Existing(code),
                _ => {
                    return Err(ChatError::validation(
                        "chat_code is required unless new_chat is set",
                    ));
                }
            }
        };

        let input = match self.input_type.as_deref().map(str::trim).unwrap_or("text") {
            "text" => TurnInput::Text(self.input_content.unwrap_or_default()),
            "audio" => {
                let upload = match (self.audio, self.audio_base64) {
                    (Some(upload), _) => upload,
                    (None, Some(encoded)) => {
                        let bytes = BASE64
                            .decode(encoded.trim())
                            .map_err(|_| ChatError::validation("audio_base64 is not valid base64"))?;
                        AudioUpload::new(bytes, self.audio_file_name)
                    }
                    (None, None) => return Err(ChatError::validation("No audio file provided")),
                };
                TurnInput::Audio(upload)
            }
            other => {
                return Err(ChatError::validation(format!(
                    "input_type must be `text` or `audio`, got `{other}`"
                )));
            }
        };

        Ok(TurnSubmission {
            chat,
            input,
            options: TurnOptions {
                want_image: self.generate_image,
            },
        })
    }
}

fn bad_multipart(e: MultipartError) -> Response {
    unreadable_body(e.status(), e.body_text())
}

fn bad_json(e: JsonRejection) -> Response {
    unreadable_body(e.status(), e.body_text())
}

fn bad_query(e: QueryRejection) -> Response {
    unreadable_body(StatusCode::BAD_REQUEST, e.body_text())
}

/// Failed turns still carry the stored input, but answer with a server error.
fn turn_response(success: StatusCode, result: TurnResult) -> Response {
    let status = if result.status.is_success() {
        success
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(TurnResponse::from(result))).into_response()
}

async fn submit_turn(
    Inject(turn_service): Inject<dyn TurnService>,
    submission: TurnSubmission,
) -> Response {
    match turn_service
        .run_turn(submission.chat, submission.input, submission.options)
        .await
    {
        Ok(result) => turn_response(StatusCode::CREATED, result),
        Err(e) => e.into_response(),
    }
}

async fn chat_history(
    Inject(history_service): Inject<dyn HistoryService>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(e) => return bad_query(e),
    };

    match history_service
        .get_history(&query.chat_code, query.page.unwrap_or(1), query.per_page)
        .await
    {
        Ok(page) => (StatusCode::OK, Json(HistoryPage::from(page))).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn update_turn(
    Inject(turn_service): Inject<dyn TurnService>,
    body: Result<Json<UpdateTurn>, JsonRejection>,
) -> Response {
    let Json(update) = match body {
        Ok(body) => body,
        Err(e) => return bad_json(e),
    };

    match turn_service
        .update_turn(update.history_id, update.new_input)
        .await
    {
        Ok(result) => turn_response(StatusCode::OK, result),
        Err(e) => e.into_response(),
    }
}

async fn delete_chat(
    Inject(history_service): Inject<dyn HistoryService>,
    query: Result<Query<ChatCodeQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(e) => return bad_query(e),
    };

    match history_service.delete_chat(&query.chat_code).await {
        Ok(()) => (
            StatusCode::OK,
            Json(Message {
                message: "Chat and associated files deleted successfully".to_owned(),
            }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

pub mod schemas {
    use crate::core::models;
    use crate::infrastructure::entities;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize};

    /// URL prefix the media directory is served under.
    pub const MEDIA_PREFIX: &str = "/media";

    pub fn media_url(key: &str) -> String {
        format!("{MEDIA_PREFIX}/{key}")
    }

    /// Form values arrive as strings, JSON values as booleans; accept both.
    pub fn parse_flag(value: &str) -> bool {
        matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "on")
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(match Option::<Flag>::deserialize(deserializer)? {
            Some(Flag::Bool(value)) => value,
            Some(Flag::Text(value)) => parse_flag(&value),
            None => false,
        })
    }

    #[derive(Deserialize, Debug, Default)]
    pub struct TurnForm {
        #[serde(default, deserialize_with = "flag")]
        pub new_chat: bool,
        pub chat_code: Option<String>,
        pub input_type: Option<String>,
        pub input_content: Option<String>,
        #[serde(default, deserialize_with = "flag")]
        pub generate_image: bool,
        /// Audio input for JSON clients.
        pub audio_base64: Option<String>,
        pub audio_file_name: Option<String>,
        #[serde(skip)]
        pub audio: Option<crate::gateway::AudioUpload>,
    }

    #[derive(Deserialize, Debug)]
    pub struct UpdateTurn {
        pub history_id: i64,
        pub new_input: String,
    }

    #[derive(Deserialize, Debug)]
    pub struct HistoryQuery {
        pub chat_code: String,
        pub page: Option<u32>,
        pub per_page: Option<u32>,
    }

    #[derive(Deserialize, Debug)]
    pub struct ChatCodeQuery {
        pub chat_code: String,
    }

    #[derive(Deserialize, Debug, Default)]
    pub struct CreateChat {
        pub title: Option<String>,
    }

    #[derive(Deserialize, Debug)]
    pub struct RenameChat {
        pub title: String,
    }

    #[derive(Serialize, Debug)]
    pub struct Message {
        pub message: String,
    }

    #[derive(Serialize, Debug)]
    pub struct Chat {
        pub code: String,
        pub title: Option<String>,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
    }

    impl From<entities::Chat> for Chat {
        fn from(chat: entities::Chat) -> Self {
            Chat {
                code: chat.code,
                title: chat.title,
                created_at: chat.created_at,
                updated_at: chat.updated_at,
            }
        }
    }

    #[derive(Serialize, Debug)]
    pub struct ChatList {
        pub chats: Vec<Chat>,
    }

    #[derive(Serialize, Debug)]
    pub struct File {
        pub id: i64,
        pub output_audio: Option<String>,
        pub output_image: Option<String>,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
    }

    impl From<entities::FileRecord> for File {
        fn from(file: entities::FileRecord) -> Self {
            File {
                id: file.id,
                output_audio: file.output_audio.as_deref().map(media_url),
                output_image: file.output_image.as_deref().map(media_url),
                created_at: file.created_at,
                updated_at: file.updated_at,
            }
        }
    }

    #[derive(Serialize, Debug)]
    pub struct History {
        pub id: i64,
        pub input_text: String,
        pub output_text: String,
        pub files: Vec<File>,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
    }

    impl From<models::Turn> for History {
        fn from(turn: models::Turn) -> Self {
            History {
                id: turn.history.id,
                input_text: turn.history.input_text,
                output_text: turn.history.output_text,
                files: turn.files.into_iter().map(File::from).collect(),
                created_at: turn.history.created_at,
                updated_at: turn.history.updated_at,
            }
        }
    }

    #[derive(Serialize, Debug)]
    pub struct TurnResponse {
        pub status: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub error: Option<String>,
        pub chat: Chat,
        pub history: History,
    }

    impl From<models::TurnResult> for TurnResponse {
        fn from(result: models::TurnResult) -> Self {
            TurnResponse {
                status: result.status.as_str(),
                error: result.error,
                chat: result.chat.into(),
                history: result.turn.into(),
            }
        }
    }

    #[derive(Serialize, Debug)]
    pub struct HistoryPage {
        pub chat: Chat,
        pub history: Vec<History>,
        pub total_pages: u32,
        pub current_page: u32,
    }

    impl From<models::HistoryPage> for HistoryPage {
        fn from(page: models::HistoryPage) -> Self {
            HistoryPage {
                chat: page.chat.into(),
                history: page.turns.into_iter().map(History::from).collect(),
                total_pages: page.total_pages,
                current_page: page.current_page,
            }
        }
    }

    #[derive(Serialize, Debug)]
    pub struct ErrorEntry {
        pub id: i64,
        pub chat_code: String,
        pub error: String,
        pub created_at: DateTime<Utc>,
    }

    impl From<entities::ErrorRecord> for ErrorEntry {
        fn from(record: entities::ErrorRecord) -> Self {
            ErrorEntry {
                id: record.id,
                chat_code: record.chat_code,
                error: record.error,
                created_at: record.created_at,
            }
        }
    }

    #[derive(Serialize, Debug)]
    pub struct ErrorList {
        pub errors: Vec<ErrorEntry>,
    }
}
