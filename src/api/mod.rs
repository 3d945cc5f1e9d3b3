use crate::core::errors::ChatError;
use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::error;
use serde::Serialize;

pub mod chat;
pub mod chats;
pub mod speech;

pub const UPLOAD_TOO_LARGE: &str = "Upload exceeds the maximum request size";

/// Every JSON route of the service; media files are mounted separately.
///
/// `upload_limit` caps the request body of the routes that accept audio.
pub fn router(upload_limit: usize) -> Router {
    Router::new()
        .nest("/chat", chat::router(upload_limit))
        .nest("/chats", chats::router())
        .nest("/errors", chats::errors_router())
        .nest("/speech", speech::router(upload_limit))
}

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Answers a body that could not be read: 413 when it hit the upload limit,
/// 400 with the extractor's message otherwise.
pub fn unreadable_body(status: StatusCode, detail: String) -> Response {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        error_response(status, UPLOAD_TOO_LARGE)
    } else {
        error_response(StatusCode::BAD_REQUEST, detail)
    }
}

impl ChatError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ChatError::Validation(_) | ChatError::TranscriptionFailed(_) => {
                StatusCode::BAD_REQUEST
            }
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Adapter(_) | ChatError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("request failed: {self}");
        }
        error_response(status, self.to_string())
    }
}
