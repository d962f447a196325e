//! Incident report submission, risk analysis, and case workflow handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::risk::{self, RiskLevel};
use crate::session::CallerIdentity;
use crate::storage::{new_entity_id, ReportRow};
use crate::web::config::{DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
use crate::web::state::SharedState;
use crate::web::utils::{api_error, now_secs, storage_error};

const REPORT_STATUSES: &[&str] = &[
    "submitted",
    "under_review",
    "assigned",
    "in_progress",
    "resolved",
    "archived",
];
const PRIORITIES: &[&str] = &["low", "normal", "high"];

/// Initial case priority derived from the automated risk level.
fn priority_for_level(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Critical | RiskLevel::High => "high",
        RiskLevel::Moderate => "normal",
        RiskLevel::Low => "low",
    }
}

fn report_to_json(r: &ReportRow) -> serde_json::Value {
    let parse = |field: &Option<String>| -> serde_json::Value {
        field
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or(serde_json::Value::Null)
    };
    serde_json::json!({
        "id": r.id,
        "user_id": r.user_id,
        "anonymous_session_id": r.anonymous_session_id,
        "content": r.content,
        "status": r.status,
        "priority": r.priority,
        "assignee": r.assignee,
        "risk": parse(&r.risk_json),
        "location": parse(&r.location_json),
        "created_at": r.created_at,
        "updated_at": r.updated_at,
    })
}

#[derive(Deserialize)]
pub struct SubmitReportRequest {
    #[serde(flatten)]
    identity: CallerIdentity,
    content: String,
    #[serde(default)]
    location: Option<serde_json::Value>,
}

pub async fn submit_report_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<SubmitReportRequest>,
) -> Response {
    if let Err(e) = req.identity.validate() {
        return api_error(StatusCode::BAD_REQUEST, e.to_string());
    }
    if req.content.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "content required");
    }

    // Score at submission time so case workers triage on it immediately.
    let assessment = risk::analyze(&req.content);
    let risk_json = match serde_json::to_string(&assessment) {
        Ok(j) => j,
        Err(e) => return storage_error(e.into()),
    };

    let now = now_secs();
    let row = ReportRow {
        id: new_entity_id(),
        user_id: req.identity.user_id.clone(),
        anonymous_session_id: req.identity.anonymous_session_id.clone(),
        content: req.content.clone(),
        status: "submitted".to_string(),
        priority: priority_for_level(assessment.level).to_string(),
        assignee: None,
        risk_json: Some(risk_json),
        location_json: req.location.as_ref().map(|l| l.to_string()),
        created_at: now,
        updated_at: now,
    };

    let st = state.lock().await;
    match st.storage.insert_report(&row) {
        Ok(()) => {
            crate::svlog!(
                "report: {} submitted (risk={} score={})",
                row.id,
                assessment.level,
                assessment.score
            );
            (StatusCode::CREATED, axum::Json(report_to_json(&row))).into_response()
        }
        Err(e) => storage_error(e),
    }
}

pub async fn get_report_handler(
    State(state): State<SharedState>,
    Path(report_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    let report = match st.storage.get_report(&report_id) {
        Ok(Some(r)) => r,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "report not found"),
        Err(e) => return storage_error(e),
    };
    let notes = match st.storage.list_report_notes(&report_id) {
        Ok(n) => n,
        Err(e) => return storage_error(e),
    };

    let mut json = report_to_json(&report);
    json["notes"] = serde_json::json!(notes);
    (StatusCode::OK, axum::Json(json)).into_response()
}

#[derive(Deserialize)]
pub struct ListReportsQuery {
    status: Option<String>,
    limit: Option<u32>,
}

pub async fn list_reports_handler(
    State(state): State<SharedState>,
    Query(params): Query<ListReportsQuery>,
) -> Response {
    if let Some(s) = params.status.as_deref() {
        if !REPORT_STATUSES.contains(&s) {
            return api_error(StatusCode::BAD_REQUEST, format!("invalid status: {s}"));
        }
    }
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .min(MAX_LIST_LIMIT);

    let st = state.lock().await;
    match st.storage.list_reports(params.status.as_deref(), limit) {
        Ok(reports) => {
            let json: Vec<serde_json::Value> = reports.iter().map(report_to_json).collect();
            (StatusCode::OK, axum::Json(serde_json::json!(json))).into_response()
        }
        Err(e) => storage_error(e),
    }
}

#[derive(Deserialize)]
pub struct ReportStatusRequest {
    status: String,
    #[serde(default)]
    assignee: Option<String>,
    #[serde(default)]
    priority: Option<String>,
}

pub async fn report_status_handler(
    State(state): State<SharedState>,
    Path(report_id): Path<String>,
    axum::Json(req): axum::Json<ReportStatusRequest>,
) -> Response {
    if !REPORT_STATUSES.contains(&req.status.as_str()) {
        return api_error(StatusCode::BAD_REQUEST, format!("invalid status: {}", req.status));
    }
    if let Some(p) = req.priority.as_deref() {
        if !PRIORITIES.contains(&p) {
            return api_error(StatusCode::BAD_REQUEST, format!("invalid priority: {p}"));
        }
    }

    let st = state.lock().await;
    match st.storage.update_report_status(
        &report_id,
        &req.status,
        req.assignee.as_deref(),
        req.priority.as_deref(),
        now_secs(),
    ) {
        Ok(report) => {
            crate::svlog!("report: {} -> {}", report.id, report.status);
            (StatusCode::OK, axum::Json(report_to_json(&report))).into_response()
        }
        Err(e) => storage_error(e),
    }
}

#[derive(Deserialize)]
pub struct ReportNoteRequest {
    author: String,
    body: String,
}

pub async fn report_note_handler(
    State(state): State<SharedState>,
    Path(report_id): Path<String>,
    axum::Json(req): axum::Json<ReportNoteRequest>,
) -> Response {
    if req.author.trim().is_empty() || req.body.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "author and body required");
    }

    let st = state.lock().await;
    match st
        .storage
        .insert_report_note(&report_id, &req.author, &req.body, now_secs())
    {
        Ok(()) => (
            StatusCode::CREATED,
            axum::Json(serde_json::json!({"status": "ok"})),
        )
            .into_response(),
        Err(e) => storage_error(e),
    }
}
