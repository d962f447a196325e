//! Shared utility functions for the web layer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::storage::{BookingRow, SafehouseRow, StorageError};
use crate::workflow::WorkflowError;

/// Build a standard JSON error response.
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, axum::Json(body)).into_response()
}

/// Map a storage error to its HTTP response.
pub fn storage_error(e: StorageError) -> Response {
    let status = match &e {
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        StorageError::AlreadyExists(_) | StorageError::StateConflict(_) => StatusCode::CONFLICT,
        StorageError::Sqlite(_) | StorageError::Serde(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e.to_string())
}

/// Map a workflow error to its HTTP response.
pub fn workflow_error(e: WorkflowError) -> Response {
    match e {
        WorkflowError::Storage(inner) => storage_error(inner),
        WorkflowError::NotFound(_) => api_error(StatusCode::NOT_FOUND, e.to_string()),
        WorkflowError::InvalidTransition { .. }
        | WorkflowError::InvalidTransportTransition { .. }
        | WorkflowError::NoCapacity
        | WorkflowError::AssessmentRequired
        | WorkflowError::AdmissionClosed(_)
        | WorkflowError::AlreadyBooked => api_error(StatusCode::CONFLICT, e.to_string()),
    }
}

/// Current time as seconds since UNIX epoch.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Public JSON view of a safehouse.  The sealed address is never exposed;
/// callers get the phone number and coarse coordinates instead.
pub fn safehouse_to_json(s: &SafehouseRow) -> serde_json::Value {
    let resources: serde_json::Value =
        serde_json::from_str(&s.resources).unwrap_or(serde_json::json!({}));
    let staff: serde_json::Value =
        serde_json::from_str(&s.staff).unwrap_or(serde_json::json!([]));
    serde_json::json!({
        "id": s.id,
        "ngo_id": s.ngo_id,
        "name": s.name,
        "phone": s.phone,
        "type": s.house_type,
        "lat": s.lat,
        "lon": s.lon,
        "capacity": {
            "total_beds": s.total_beds,
            "available_beds": s.available_beds,
            "reserved_beds": s.reserved_beds,
            "occupied_beds": s.occupied_beds,
        },
        "resources": resources,
        "staff": staff,
        "accepts_children": s.accepts_children,
        "accepts_pets": s.accepts_pets,
        "created_at": s.created_at,
    })
}

/// JSON view of a booking, with stored JSON sub-objects inlined.
pub fn booking_to_json(b: &BookingRow) -> serde_json::Value {
    let parse = |field: &Option<String>| -> serde_json::Value {
        field
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or(serde_json::Value::Null)
    };
    serde_json::json!({
        "id": b.id,
        "safehouse_id": b.safehouse_id,
        "user_id": b.user_id,
        "anonymous_session_id": b.anonymous_session_id,
        "status": b.status,
        "urgency": b.urgency,
        "party_size": b.party_size,
        "special_needs": b.special_needs,
        "transport": {
            "status": b.transport_status,
            "details": parse(&b.transport),
        },
        "intake": parse(&b.intake),
        "assessment": parse(&b.assessment),
        "assessment_completed": b.assessment_completed,
        "services": parse(&b.services),
        "created_at": b.created_at,
        "updated_at": b.updated_at,
        "decided_at": b.decided_at,
        "checked_in_at": b.checked_in_at,
        "checked_out_at": b.checked_out_at,
        "cancel_reason": b.cancel_reason,
    })
}
