//! Safehouse booking workflow handlers.
//!
//! Each step validates the current booking status through
//! [`crate::workflow`] and commits the status change together with its bed
//! counter effect in one storage transaction.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::session::CallerIdentity;
use crate::storage::{new_entity_id, BookingRow};
use crate::web::state::{SharedState, WsEvent};
use crate::web::utils::{api_error, booking_to_json, now_secs, workflow_error};
use crate::workflow::{BookingStatus, TransportStatus};

const URGENCIES: &[&str] = &["standard", "urgent", "immediate"];

#[derive(Deserialize)]
pub struct ReserveRequest {
    safehouse_id: String,
    #[serde(flatten)]
    identity: CallerIdentity,
    #[serde(default)]
    urgency: Option<String>,
    #[serde(default)]
    party_size: Option<u32>,
    #[serde(default)]
    special_needs: Option<String>,
    #[serde(default)]
    transport_required: bool,
}

pub async fn reserve_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<ReserveRequest>,
) -> Response {
    if let Err(e) = req.identity.validate() {
        return api_error(StatusCode::BAD_REQUEST, e.to_string());
    }
    let urgency = req.urgency.as_deref().unwrap_or("standard");
    if !URGENCIES.contains(&urgency) {
        return api_error(StatusCode::BAD_REQUEST, format!("invalid urgency: {urgency}"));
    }
    let party_size = req.party_size.unwrap_or(1);
    if party_size == 0 {
        return api_error(StatusCode::BAD_REQUEST, "party_size must be positive");
    }

    let now = now_secs();
    let row = BookingRow {
        id: new_entity_id(),
        safehouse_id: req.safehouse_id.clone(),
        user_id: req.identity.user_id.clone(),
        anonymous_session_id: req.identity.anonymous_session_id.clone(),
        status: "pending".to_string(),
        urgency: urgency.to_string(),
        party_size,
        special_needs: req.special_needs.clone(),
        transport_status: if req.transport_required {
            "requested".to_string()
        } else {
            "not_required".to_string()
        },
        transport: None,
        intake: None,
        assessment: None,
        assessment_completed: false,
        services: None,
        created_at: now,
        updated_at: now,
        decided_at: None,
        checked_in_at: None,
        checked_out_at: None,
        cancel_reason: None,
    };

    let st = state.lock().await;
    match st.storage.reserve_booking(&row) {
        Ok(()) => {
            let _ = st.ws_tx.send(WsEvent::BookingStatusChanged {
                booking_id: row.id.clone(),
                safehouse_id: row.safehouse_id.clone(),
                status: "pending".to_string(),
            });
            crate::svlog!(
                "workflow: booking {} reserved at safehouse {}",
                crate::logging::booking_id(&row.id),
                row.safehouse_id
            );
            (StatusCode::CREATED, axum::Json(booking_to_json(&row))).into_response()
        }
        Err(e) => workflow_error(e),
    }
}

pub async fn get_booking_handler(
    State(state): State<SharedState>,
    Path(booking_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    match st.storage.get_booking(&booking_id) {
        Ok(Some(b)) => (StatusCode::OK, axum::Json(booking_to_json(&b))).into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "booking not found"),
        Err(e) => workflow_error(e.into()),
    }
}

#[derive(Deserialize, Default)]
pub struct TransitionRequest {
    #[serde(default)]
    reason: Option<String>,
}

/// Shared body of the status transition endpoints.
async fn transition(
    state: SharedState,
    booking_id: String,
    to: BookingStatus,
    reason: Option<String>,
) -> Response {
    let st = state.lock().await;
    match st
        .storage
        .transition_booking(&booking_id, to, reason.as_deref(), now_secs())
    {
        Ok(booking) => {
            let _ = st.ws_tx.send(WsEvent::BookingStatusChanged {
                booking_id: booking.id.clone(),
                safehouse_id: booking.safehouse_id.clone(),
                status: booking.status.clone(),
            });
            crate::svlog!(
                "workflow: booking {} -> {}",
                crate::logging::booking_id(&booking.id),
                booking.status
            );
            (StatusCode::OK, axum::Json(booking_to_json(&booking))).into_response()
        }
        Err(e) => workflow_error(e),
    }
}

pub async fn approve_handler(
    State(state): State<SharedState>,
    Path(booking_id): Path<String>,
) -> Response {
    transition(state, booking_id, BookingStatus::Approved, None).await
}

pub async fn reject_handler(
    State(state): State<SharedState>,
    Path(booking_id): Path<String>,
    axum::Json(req): axum::Json<TransitionRequest>,
) -> Response {
    transition(state, booking_id, BookingStatus::Rejected, req.reason).await
}

pub async fn cancel_handler(
    State(state): State<SharedState>,
    Path(booking_id): Path<String>,
    axum::Json(req): axum::Json<TransitionRequest>,
) -> Response {
    transition(state, booking_id, BookingStatus::Cancelled, req.reason).await
}

pub async fn check_in_handler(
    State(state): State<SharedState>,
    Path(booking_id): Path<String>,
) -> Response {
    transition(state, booking_id, BookingStatus::CheckedIn, None).await
}

pub async fn check_out_handler(
    State(state): State<SharedState>,
    Path(booking_id): Path<String>,
) -> Response {
    transition(state, booking_id, BookingStatus::CheckedOut, None).await
}

// -- Admission records --

#[derive(Deserialize)]
pub struct IntakeRequest {
    intake: serde_json::Value,
}

pub async fn intake_handler(
    State(state): State<SharedState>,
    Path(booking_id): Path<String>,
    axum::Json(req): axum::Json<IntakeRequest>,
) -> Response {
    let st = state.lock().await;
    match st
        .storage
        .record_booking_intake(&booking_id, &req.intake.to_string(), now_secs())
    {
        Ok(booking) => (StatusCode::OK, axum::Json(booking_to_json(&booking))).into_response(),
        Err(e) => workflow_error(e),
    }
}

#[derive(Deserialize)]
pub struct AssessmentRequest {
    assessment: serde_json::Value,
    #[serde(default)]
    completed: bool,
}

pub async fn assessment_handler(
    State(state): State<SharedState>,
    Path(booking_id): Path<String>,
    axum::Json(req): axum::Json<AssessmentRequest>,
) -> Response {
    let st = state.lock().await;
    match st.storage.record_booking_assessment(
        &booking_id,
        &req.assessment.to_string(),
        req.completed,
        now_secs(),
    ) {
        Ok(booking) => (StatusCode::OK, axum::Json(booking_to_json(&booking))).into_response(),
        Err(e) => workflow_error(e),
    }
}

#[derive(Deserialize)]
pub struct ServicesRequest {
    services: serde_json::Value,
}

pub async fn services_handler(
    State(state): State<SharedState>,
    Path(booking_id): Path<String>,
    axum::Json(req): axum::Json<ServicesRequest>,
) -> Response {
    let st = state.lock().await;
    match st
        .storage
        .activate_booking_services(&booking_id, &req.services.to_string(), now_secs())
    {
        Ok(booking) => (StatusCode::OK, axum::Json(booking_to_json(&booking))).into_response(),
        Err(e) => workflow_error(e),
    }
}

#[derive(Deserialize)]
pub struct TransportRequest {
    status: String,
    #[serde(default)]
    details: Option<serde_json::Value>,
}

pub async fn transport_handler(
    State(state): State<SharedState>,
    Path(booking_id): Path<String>,
    axum::Json(req): axum::Json<TransportRequest>,
) -> Response {
    let to: TransportStatus = match req.status.parse() {
        Ok(t) => t,
        Err(e) => return api_error(StatusCode::BAD_REQUEST, e),
    };
    let details = req.details.as_ref().map(|d| d.to_string());

    let st = state.lock().await;
    match st.storage.update_booking_transport(
        &booking_id,
        to,
        details.as_deref(),
        now_secs(),
    ) {
        Ok(booking) => (StatusCode::OK, axum::Json(booking_to_json(&booking))).into_response(),
        Err(e) => workflow_error(e),
    }
}
