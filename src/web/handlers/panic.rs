//! Panic alert activation, tracking, evidence, and resolution handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::session::CallerIdentity;
use crate::storage::{new_entity_id, EvidenceRow, PanicEventRow, PanicLocationRow};
use crate::web::config::{DEFAULT_COUNTDOWN_SECONDS, MAX_COUNTDOWN_SECONDS};
use crate::web::state::{SharedState, WsEvent};
use crate::web::utils::{api_error, now_secs, storage_error};

const TRIGGER_TYPES: &[&str] = &["button", "shake", "voice", "timer"];
const RESOLUTIONS: &[&str] = &["resolved", "false_alarm", "aborted"];
const EVIDENCE_KINDS: &[&str] = &["audio", "video", "photo", "note"];

#[derive(Deserialize)]
pub struct InitialLocation {
    lat: f64,
    lon: f64,
    accuracy_m: Option<f64>,
}

#[derive(Deserialize)]
pub struct ActivateRequest {
    #[serde(flatten)]
    identity: CallerIdentity,
    #[serde(default)]
    trigger_type: Option<String>,
    #[serde(default)]
    countdown_seconds: Option<u32>,
    #[serde(default)]
    risk_level: Option<String>,
    #[serde(default)]
    location: Option<InitialLocation>,
}

pub async fn activate_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<ActivateRequest>,
) -> Response {
    // Anonymous activation with no identity at all gets a fresh session, so
    // the caller can keep feeding locations to the same event.
    let (identity, issued_session) =
        if req.identity.user_id.is_none() && req.identity.anonymous_session_id.is_none() {
            (CallerIdentity::new_anonymous(), true)
        } else {
            if let Err(e) = req.identity.validate() {
                return api_error(StatusCode::BAD_REQUEST, e.to_string());
            }
            (req.identity, false)
        };

    let trigger_type = req.trigger_type.as_deref().unwrap_or("button");
    if !TRIGGER_TYPES.contains(&trigger_type) {
        return api_error(
            StatusCode::BAD_REQUEST,
            format!("invalid trigger_type: {trigger_type}"),
        );
    }
    if let Some(loc) = &req.location {
        if !(-90.0..=90.0).contains(&loc.lat) || !(-180.0..=180.0).contains(&loc.lon) {
            return api_error(StatusCode::BAD_REQUEST, "coordinates out of range");
        }
    }
    let countdown = req
        .countdown_seconds
        .unwrap_or(DEFAULT_COUNTDOWN_SECONDS)
        .min(MAX_COUNTDOWN_SECONDS);
    let risk_level = req.risk_level.as_deref().unwrap_or("high");
    if risk_level.parse::<crate::risk::RiskLevel>().is_err() {
        return api_error(
            StatusCode::BAD_REQUEST,
            format!("invalid risk_level: {risk_level}"),
        );
    }

    let now = now_secs();
    let event_id = new_entity_id();
    let event = PanicEventRow {
        id: event_id.clone(),
        user_id: identity.user_id.clone(),
        anonymous_session_id: identity.anonymous_session_id.clone(),
        status: "active".to_string(),
        trigger_type: trigger_type.to_string(),
        risk_level: risk_level.to_string(),
        countdown_seconds: countdown,
        created_at: now,
        updated_at: now,
        resolved_at: None,
        resolution_note: None,
    };

    let contacts_notified = {
        let st = state.lock().await;

        if let Err(e) = st.storage.insert_panic_event(&event) {
            return storage_error(e);
        }

        if let Some(loc) = &req.location {
            let row = PanicLocationRow {
                event_id: event_id.clone(),
                lat: loc.lat,
                lon: loc.lon,
                accuracy_m: loc.accuracy_m,
                recorded_at: now,
            };
            if let Err(e) = st.storage.append_panic_location(&row) {
                return storage_error(e);
            }
        }

        // Fan out to the caller's emergency contacts.  Delivery itself is an
        // external transport; here each attempt is recorded as queued.
        let contacts = match st.storage.list_notifiable_contacts(identity.key()) {
            Ok(c) => c,
            Err(e) => return storage_error(e),
        };
        for contact in &contacts {
            let method = if contact.email.is_some() && contact.phone.is_empty() {
                "email"
            } else {
                "sms"
            };
            if let Err(e) =
                st.storage
                    .insert_panic_notification(&event_id, &contact.id, method, now)
            {
                return storage_error(e);
            }
        }

        let _ = st.ws_tx.send(WsEvent::PanicActivated {
            event_id: event_id.clone(),
            trigger_type: trigger_type.to_string(),
            risk_level: risk_level.to_string(),
            contacts_notified: contacts.len(),
        });

        contacts.len()
    };

    crate::svlog!(
        "panic: event {} activated (trigger={}, contacts={})",
        crate::logging::event_id(&event_id),
        trigger_type,
        contacts_notified
    );

    let mut json = serde_json::json!({
        "success": true,
        "message": format!(
            "Emergency alert activated. Help is being notified; countdown {countdown}s."
        ),
        "event_id": event_id,
        "status": "active",
        "countdown_seconds": countdown,
        "contacts_notified": contacts_notified,
    });
    if issued_session {
        json["anonymous_session_id"] =
            serde_json::json!(identity.anonymous_session_id);
    }
    (StatusCode::CREATED, axum::Json(json)).into_response()
}

pub async fn get_panic_handler(
    State(state): State<SharedState>,
    Path(event_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    let event = match st.storage.get_panic_event(&event_id) {
        Ok(Some(e)) => e,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "panic event not found"),
        Err(e) => return storage_error(e),
    };
    let locations = match st.storage.list_panic_locations(&event_id) {
        Ok(l) => l,
        Err(e) => return storage_error(e),
    };
    let notifications = match st.storage.list_panic_notifications(&event_id) {
        Ok(n) => n,
        Err(e) => return storage_error(e),
    };
    let evidence = match st.storage.list_evidence(&event_id) {
        Ok(v) => v,
        Err(e) => return storage_error(e),
    };

    let json = serde_json::json!({
        "id": event.id,
        "user_id": event.user_id,
        "anonymous_session_id": event.anonymous_session_id,
        "status": event.status,
        "trigger_type": event.trigger_type,
        "risk_level": event.risk_level,
        "countdown_seconds": event.countdown_seconds,
        "created_at": event.created_at,
        "updated_at": event.updated_at,
        "resolved_at": event.resolved_at,
        "resolution_note": event.resolution_note,
        "current_location": locations.last(),
        "location_history": locations,
        "notifications": notifications,
        "evidence_count": evidence.len(),
    });
    (StatusCode::OK, axum::Json(json)).into_response()
}

#[derive(Deserialize)]
pub struct LocationUpdateRequest {
    lat: f64,
    lon: f64,
    #[serde(default)]
    accuracy_m: Option<f64>,
}

pub async fn location_handler(
    State(state): State<SharedState>,
    Path(event_id): Path<String>,
    axum::Json(req): axum::Json<LocationUpdateRequest>,
) -> Response {
    if !(-90.0..=90.0).contains(&req.lat) || !(-180.0..=180.0).contains(&req.lon) {
        return api_error(StatusCode::BAD_REQUEST, "coordinates out of range");
    }

    let now = now_secs();
    let row = PanicLocationRow {
        event_id: event_id.clone(),
        lat: req.lat,
        lon: req.lon,
        accuracy_m: req.accuracy_m,
        recorded_at: now,
    };

    let st = state.lock().await;
    match st.storage.append_panic_location(&row) {
        Ok(()) => {
            let _ = st.ws_tx.send(WsEvent::PanicLocation {
                event_id,
                lat: req.lat,
                lon: req.lon,
            });
            (
                StatusCode::OK,
                axum::Json(serde_json::json!({"status": "ok", "recorded_at": now})),
            )
                .into_response()
        }
        Err(e) => storage_error(e),
    }
}

#[derive(Deserialize)]
pub struct ResolveRequest {
    resolution: String,
    #[serde(default)]
    note: Option<String>,
}

pub async fn resolve_handler(
    State(state): State<SharedState>,
    Path(event_id): Path<String>,
    axum::Json(req): axum::Json<ResolveRequest>,
) -> Response {
    if !RESOLUTIONS.contains(&req.resolution.as_str()) {
        return api_error(
            StatusCode::BAD_REQUEST,
            format!("invalid resolution: {}", req.resolution),
        );
    }

    let st = state.lock().await;
    match st
        .storage
        .resolve_panic_event(&event_id, &req.resolution, req.note.as_deref(), now_secs())
    {
        Ok(event) => {
            let _ = st.ws_tx.send(WsEvent::PanicClosed {
                event_id: event.id.clone(),
                resolution: event.status.clone(),
            });
            crate::svlog!(
                "panic: event {} closed as {}",
                crate::logging::event_id(&event.id),
                event.status
            );
            (StatusCode::OK, axum::Json(serde_json::json!({
                "id": event.id,
                "status": event.status,
                "resolved_at": event.resolved_at,
            })))
                .into_response()
        }
        Err(e) => storage_error(e),
    }
}

// -- Evidence --

#[derive(Deserialize)]
pub struct EvidenceRequest {
    event_id: String,
    kind: String,
    #[serde(default)]
    content_ref: Option<String>,
    #[serde(default)]
    note: Option<String>,
}

pub async fn attach_evidence_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<EvidenceRequest>,
) -> Response {
    if !EVIDENCE_KINDS.contains(&req.kind.as_str()) {
        return api_error(StatusCode::BAD_REQUEST, format!("invalid kind: {}", req.kind));
    }
    if req.content_ref.is_none() && req.note.is_none() {
        return api_error(StatusCode::BAD_REQUEST, "content_ref or note required");
    }

    let st = state.lock().await;

    // Seal the note when an operator passphrase is configured.
    let (note, sealed) = match (&req.note, &st.seal_passphrase) {
        (Some(n), Some(passphrase)) => match crate::crypto::seal(n, passphrase) {
            Ok(sealed) => (Some(sealed), true),
            Err(e) => {
                return api_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("failed to seal note: {e}"),
                )
            }
        },
        (note, _) => (note.clone(), false),
    };

    let row = EvidenceRow {
        id: new_entity_id(),
        event_id: req.event_id.clone(),
        kind: req.kind.clone(),
        content_ref: req.content_ref.clone(),
        note,
        sealed,
        created_at: now_secs(),
    };

    match st.storage.insert_evidence(&row) {
        Ok(()) => {
            crate::svlog!(
                "panic: evidence {} attached to {}",
                row.id,
                crate::logging::event_id(&req.event_id)
            );
            (
                StatusCode::CREATED,
                axum::Json(serde_json::json!({
                    "id": row.id,
                    "event_id": row.event_id,
                    "kind": row.kind,
                    "sealed": row.sealed,
                })),
            )
                .into_response()
        }
        Err(e) => storage_error(e),
    }
}
