//! Conversation message handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::storage::{new_entity_id, MessageRow};
use crate::web::config::{DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
use crate::web::state::{SharedState, WsEvent};
use crate::web::utils::{api_error, now_secs, storage_error};

#[derive(Deserialize)]
pub struct ListMessagesQuery {
    conversation: String,
    before: Option<u64>,
    limit: Option<u32>,
}

pub async fn list_messages_handler(
    State(state): State<SharedState>,
    Query(params): Query<ListMessagesQuery>,
) -> Response {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .min(MAX_LIST_LIMIT);

    let st = state.lock().await;
    match st
        .storage
        .list_messages(&params.conversation, params.before, limit)
    {
        Ok(messages) => {
            (StatusCode::OK, axum::Json(serde_json::json!(messages))).into_response()
        }
        Err(e) => storage_error(e),
    }
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    conversation_id: String,
    sender: String,
    recipient: String,
    body: String,
}

pub async fn send_message_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<SendMessageRequest>,
) -> Response {
    if req.body.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "body cannot be empty");
    }
    if req.sender.trim().is_empty() || req.recipient.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "sender and recipient required");
    }

    let now = now_secs();
    let row = MessageRow {
        id: new_entity_id(),
        conversation_id: req.conversation_id.clone(),
        sender: req.sender.clone(),
        recipient: req.recipient.clone(),
        body: req.body.clone(),
        delivered: false,
        delivered_at: None,
        read: false,
        read_at: None,
        deleted: false,
        created_at: now,
    };

    let st = state.lock().await;
    match st.storage.insert_message(&row) {
        Ok(()) => {
            let _ = st.ws_tx.send(WsEvent::NewMessage {
                message_id: row.id.clone(),
                conversation_id: row.conversation_id.clone(),
                sender: row.sender.clone(),
                created_at: now,
            });
            (
                StatusCode::CREATED,
                axum::Json(serde_json::json!({
                    "message_id": row.id,
                    "status": "sent",
                    "created_at": now,
                })),
            )
                .into_response()
        }
        Err(e) => storage_error(e),
    }
}

pub async fn mark_read_handler(
    State(state): State<SharedState>,
    Path(message_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    match st.storage.mark_message_read(&message_id, now_secs()) {
        Ok(true) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({"status": "ok"})),
        )
            .into_response(),
        Ok(false) => api_error(StatusCode::NOT_FOUND, "message not found"),
        Err(e) => storage_error(e),
    }
}

pub async fn delete_message_handler(
    State(state): State<SharedState>,
    Path(message_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    match st.storage.soft_delete_message(&message_id) {
        Ok(true) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({"status": "deleted"})),
        )
            .into_response(),
        Ok(false) => api_error(StatusCode::NOT_FOUND, "message not found"),
        Err(e) => storage_error(e),
    }
}
