//! Chat shells and the error audit trail

use crate::api::chat::schemas::{
    Chat, ChatList, CreateChat, ErrorEntry, ErrorList, RenameChat,
};
use crate::api::error_response;
use crate::core::traits::HistoryService;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch};
use axum::{Json, Router};
use di_axum::Inject;
use serde::Deserialize;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_chats).post(create_chat))
        .route("/:code", patch(rename_chat))
}

pub fn errors_router() -> Router {
    Router::new().route("/", get(list_errors))
}

async fn list_chats(Inject(history_service): Inject<dyn HistoryService>) -> Response {
    match history_service.list_chats().await {
        Ok(chats) => Json(ChatList {
            chats: chats.into_iter().map(Chat::from).collect(),
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn create_chat(
    Inject(history_service): Inject<dyn HistoryService>,
    body: Option<Json<CreateChat>>,
) -> Response {
    let title = body.and_then(|Json(body)| body.title);

    match history_service.create_chat(title).await {
        Ok(chat) => (StatusCode::CREATED, Json(Chat::from(chat))).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn rename_chat(
    Inject(history_service): Inject<dyn HistoryService>,
    Path(code): Path<String>,
    body: Result<Json<RenameChat>, JsonRejection>,
) -> Response {
    let Json(rename) = match body {
        Ok(body) => body,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.body_text()),
    };

    match history_service.rename_chat(&code, rename.title).await {
        Ok(chat) => Json(Chat::from(chat)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize, Debug)]
struct ErrorsQuery {
    chat_code: Option<String>,
}

async fn list_errors(
    Inject(history_service): Inject<dyn HistoryService>,
    query: Result<Query<ErrorsQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.body_text()),
    };

    match history_service.list_errors(query.chat_code.as_deref()).await {
        Ok(errors) => Json(ErrorList {
            errors: errors.into_iter().map(ErrorEntry::from).collect(),
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}
