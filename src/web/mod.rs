//! SafeVoice web server.
//!
//! Provides the REST API + WebSocket event stream for panic alerts,
//! incident reports, safehouse bookings, contacts, and messaging, with
//! state persisted in SQLite.

pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod utils;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;

use crate::storage::{NgoRow, SafehouseRow, Storage};

use config::{Cli, Config, WS_CHANNEL_CAPACITY};
use state::{AppState, SharedState};

/// Entry point: parse CLI, open storage, start server.
pub async fn run() {
    let cli = Cli::parse();
    let config = Config::from_cli_and_env(cli);

    crate::logging::init();

    crate::svlog!("safevoice starting");
    crate::svlog!("  data directory: {}", config.data_dir.display());

    std::fs::create_dir_all(&config.data_dir).expect("failed to create data directory");

    let db_path = config.data_dir.join("safevoice.db");
    let storage = Storage::open(&db_path).expect("failed to open database");
    crate::svlog!("  database: {}", db_path.display());

    match &config.seal_passphrase {
        Some(_) => crate::svlog!("  address sealing: enabled"),
        None => crate::svlog!("  address sealing: disabled (addresses will not be stored)"),
    }

    if config.seed_demo_data {
        match seed_demo_data(&storage) {
            Ok(true) => crate::svlog!("  demo data: seeded"),
            Ok(false) => crate::svlog!("  demo data: already present"),
            Err(e) => crate::svlog!("  WARNING: demo data seeding failed: {}", e),
        }
    }

    let (ws_tx, _) = broadcast::channel(WS_CHANNEL_CAPACITY);
    let ws_connection_count = Arc::new(AtomicUsize::new(0));

    let state: SharedState = Arc::new(tokio::sync::Mutex::new(AppState {
        storage,
        seal_passphrase: config.seal_passphrase.clone(),
        ws_tx,
        ws_connection_count,
    }));

    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind");
    crate::svlog!("safevoice listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await.expect("server error");
}

const DEMO_NGO_ID: &str = "demo-ngo";

/// Seed a demo NGO plus a pair of safehouses so the directory endpoints
/// return data out of the box. Returns `Ok(false)` when already seeded.
pub fn seed_demo_data(storage: &Storage) -> Result<bool, crate::storage::StorageError> {
    if storage.get_ngo(DEMO_NGO_ID)?.is_some() {
        return Ok(false);
    }

    let now = utils::now_secs();
    storage.insert_ngo(&NgoRow {
        id: DEMO_NGO_ID.to_string(),
        name: "Haven Network (demo)".to_string(),
        contact_email: "contact@haven.example".to_string(),
        contact_phone: Some("+1-555-0100".to_string()),
        plan: "standard".to_string(),
        active: true,
        created_at: now,
    })?;

    let houses = [
        ("demo-house-1", "Harbour Lights Shelter", "+1-555-0101", "emergency", 12),
        ("demo-house-2", "Cedar Grove House", "+1-555-0102", "transitional", 8),
    ];
    for (id, name, phone, house_type, beds) in houses {
        storage.insert_safehouse(&SafehouseRow {
            id: id.to_string(),
            ngo_id: DEMO_NGO_ID.to_string(),
            name: name.to_string(),
            phone: phone.to_string(),
            house_type: house_type.to_string(),
            sealed_address: None,
            lat: None,
            lon: None,
            total_beds: beds,
            available_beds: beds,
            reserved_beds: 0,
            occupied_beds: 0,
            resources: "{}".to_string(),
            staff: "[]".to_string(),
            accepts_children: true,
            accepts_pets: false,
            created_at: now,
        })?;
    }

    Ok(true)
}
