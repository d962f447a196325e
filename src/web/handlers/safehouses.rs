//! Safehouse directory and NGO registration handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::storage::{new_entity_id, NgoRow, SafehouseRow};
use crate::web::config::{DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
use crate::web::state::SharedState;
use crate::web::utils::{
    api_error, booking_to_json, now_secs, safehouse_to_json, storage_error,
};

const HOUSE_TYPES: &[&str] = &["emergency", "transitional", "long_term"];
const PLANS: &[&str] = &["free", "standard", "plus"];

#[derive(Deserialize)]
pub struct ListSafehousesQuery {
    #[serde(rename = "type")]
    house_type: Option<String>,
    #[serde(default)]
    available: Option<bool>,
    limit: Option<u32>,
}

pub async fn list_safehouses_handler(
    State(state): State<SharedState>,
    Query(params): Query<ListSafehousesQuery>,
) -> Response {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .min(MAX_LIST_LIMIT);
    let st = state.lock().await;
    match st.storage.list_safehouses(
        params.house_type.as_deref(),
        params.available.unwrap_or(false),
        limit,
    ) {
        Ok(houses) => {
            let json: Vec<serde_json::Value> =
                houses.iter().map(safehouse_to_json).collect();
            (StatusCode::OK, axum::Json(serde_json::json!(json))).into_response()
        }
        Err(e) => storage_error(e),
    }
}

pub async fn get_safehouse_handler(
    State(state): State<SharedState>,
    Path(safehouse_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    let house = match st.storage.get_safehouse(&safehouse_id) {
        Ok(Some(h)) => h,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "safehouse not found"),
        Err(e) => return storage_error(e),
    };
    let bookings = match st.storage.list_live_bookings(&safehouse_id) {
        Ok(b) => b,
        Err(e) => return storage_error(e),
    };

    let mut json = safehouse_to_json(&house);
    json["live_bookings"] = serde_json::json!(bookings
        .iter()
        .map(booking_to_json)
        .collect::<Vec<_>>());
    (StatusCode::OK, axum::Json(json)).into_response()
}

#[derive(Deserialize)]
pub struct CreateSafehouseRequest {
    ngo_id: String,
    name: String,
    phone: String,
    #[serde(rename = "type")]
    house_type: String,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    total_beds: u32,
    #[serde(default)]
    resources: Option<serde_json::Value>,
    #[serde(default)]
    staff: Option<serde_json::Value>,
    #[serde(default = "default_true")]
    accepts_children: bool,
    #[serde(default)]
    accepts_pets: bool,
}

fn default_true() -> bool {
    true
}

pub async fn create_safehouse_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<CreateSafehouseRequest>,
) -> Response {
    if req.name.trim().is_empty() || req.phone.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "name and phone required");
    }
    if !HOUSE_TYPES.contains(&req.house_type.as_str()) {
        return api_error(
            StatusCode::BAD_REQUEST,
            format!("invalid type: {}", req.house_type),
        );
    }
    if req.total_beds == 0 {
        return api_error(StatusCode::BAD_REQUEST, "total_beds must be positive");
    }

    let st = state.lock().await;

    let sealed_address = match (&req.address, &st.seal_passphrase) {
        (Some(addr), Some(passphrase)) => match crate::crypto::seal(addr, passphrase) {
            Ok(sealed) => Some(sealed),
            Err(e) => {
                return api_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("failed to seal address: {e}"),
                )
            }
        },
        // Without a sealing passphrase the address is dropped rather than
        // stored in clear.
        (Some(_), None) => None,
        (None, _) => None,
    };

    let row = SafehouseRow {
        id: new_entity_id(),
        ngo_id: req.ngo_id.clone(),
        name: req.name.clone(),
        phone: req.phone.clone(),
        house_type: req.house_type.clone(),
        sealed_address,
        lat: req.lat,
        lon: req.lon,
        total_beds: req.total_beds,
        available_beds: req.total_beds,
        reserved_beds: 0,
        occupied_beds: 0,
        resources: req
            .resources
            .as_ref()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "{}".to_string()),
        staff: req
            .staff
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "[]".to_string()),
        accepts_children: req.accepts_children,
        accepts_pets: req.accepts_pets,
        created_at: now_secs(),
    };

    match st.storage.insert_safehouse(&row) {
        Ok(()) => {
            crate::svlog!("safehouse: {} registered ({} beds)", row.name, row.total_beds);
            (StatusCode::CREATED, axum::Json(safehouse_to_json(&row))).into_response()
        }
        Err(e) => storage_error(e),
    }
}

#[derive(Deserialize)]
pub struct CreateNgoRequest {
    name: String,
    contact_email: String,
    #[serde(default)]
    contact_phone: Option<String>,
    #[serde(default)]
    plan: Option<String>,
}

pub async fn create_ngo_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<CreateNgoRequest>,
) -> Response {
    if req.name.trim().is_empty() || !req.contact_email.contains('@') {
        return api_error(StatusCode::BAD_REQUEST, "name and valid contact_email required");
    }
    let plan = req.plan.as_deref().unwrap_or("free");
    if !PLANS.contains(&plan) {
        return api_error(StatusCode::BAD_REQUEST, format!("invalid plan: {plan}"));
    }

    let row = NgoRow {
        id: new_entity_id(),
        name: req.name.clone(),
        contact_email: req.contact_email.clone(),
        contact_phone: req.contact_phone.clone(),
        plan: plan.to_string(),
        active: true,
        created_at: now_secs(),
    };

    let st = state.lock().await;
    match st.storage.insert_ngo(&row) {
        Ok(()) => {
            crate::svlog!("ngo: {} registered (plan={})", row.name, row.plan);
            (
                StatusCode::CREATED,
                axum::Json(serde_json::json!({
                    "id": row.id,
                    "name": row.name,
                    "plan": row.plan,
                    "active": row.active,
                })),
            )
                .into_response()
        }
        Err(e) => storage_error(e),
    }
}
