//! Emergency contact handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::session::CallerIdentity;
use crate::storage::{new_entity_id, ContactRow};
use crate::web::state::SharedState;
use crate::web::utils::{api_error, now_secs, storage_error};

#[derive(Deserialize)]
pub struct ContactsQuery {
    #[serde(flatten)]
    identity: CallerIdentity,
}

pub async fn list_contacts_handler(
    State(state): State<SharedState>,
    Query(params): Query<ContactsQuery>,
) -> Response {
    if let Err(e) = params.identity.validate() {
        return api_error(StatusCode::BAD_REQUEST, e.to_string());
    }

    let st = state.lock().await;
    match st.storage.list_contacts(params.identity.key()) {
        Ok(contacts) => {
            (StatusCode::OK, axum::Json(serde_json::json!(contacts))).into_response()
        }
        Err(e) => storage_error(e),
    }
}

#[derive(Deserialize)]
pub struct AddContactRequest {
    #[serde(flatten)]
    identity: CallerIdentity,
    name: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    relationship: Option<String>,
    #[serde(default)]
    priority: Option<u32>,
    #[serde(default = "default_true")]
    notify_on_panic: bool,
}

fn default_true() -> bool {
    true
}

pub async fn add_contact_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<AddContactRequest>,
) -> Response {
    if let Err(e) = req.identity.validate() {
        return api_error(StatusCode::BAD_REQUEST, e.to_string());
    }
    if req.name.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "name required");
    }
    if req.phone.trim().is_empty() && req.email.is_none() {
        return api_error(StatusCode::BAD_REQUEST, "phone or email required");
    }

    let row = ContactRow {
        id: new_entity_id(),
        user_id: req.identity.user_id.clone(),
        anonymous_session_id: req.identity.anonymous_session_id.clone(),
        name: req.name.clone(),
        phone: req.phone.clone(),
        email: req.email.clone(),
        relationship: req.relationship.clone(),
        priority: req.priority.unwrap_or(1),
        notify_on_panic: req.notify_on_panic,
        created_at: now_secs(),
    };

    let st = state.lock().await;
    match st.storage.insert_contact(&row) {
        Ok(()) => (StatusCode::CREATED, axum::Json(serde_json::json!(row))).into_response(),
        Err(e) => storage_error(e),
    }
}

pub async fn delete_contact_handler(
    State(state): State<SharedState>,
    Path(contact_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    match st.storage.delete_contact(&contact_id) {
        Ok(true) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({"status": "deleted"})),
        )
            .into_response(),
        Ok(false) => api_error(StatusCode::NOT_FOUND, "contact not found"),
        Err(e) => storage_error(e),
    }
}
