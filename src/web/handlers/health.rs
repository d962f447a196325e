//! Health check endpoint.

use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::web::state::SharedState;

pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let state = state.lock().await;
    let safehouses = state.storage.count_safehouses().unwrap_or(0);
    let active_panics = state.storage.count_active_panics().unwrap_or(0);
    let ws_connections = state.ws_connection_count.load(Ordering::Relaxed);

    let body = serde_json::json!({
        "status": "ok",
        "safehouses": safehouses,
        "active_panics": active_panics,
        "ws_connections": ws_connections,
        "sealing": state.seal_passphrase.is_some(),
    });
    (StatusCode::OK, axum::Json(body))
}
