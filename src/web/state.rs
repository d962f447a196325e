//! Shared application state and WebSocket event types.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};

use crate::storage::Storage;

/// Events broadcast to connected WebSocket clients.
#[derive(Clone, Debug, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    PanicActivated {
        event_id: String,
        trigger_type: String,
        risk_level: String,
        contacts_notified: usize,
    },
    PanicLocation {
        event_id: String,
        lat: f64,
        lon: f64,
    },
    PanicClosed {
        event_id: String,
        resolution: String,
    },
    BookingStatusChanged {
        booking_id: String,
        safehouse_id: String,
        status: String,
    },
    NewMessage {
        message_id: String,
        conversation_id: String,
        sender: String,
        created_at: u64,
    },
}

pub struct AppState {
    pub storage: Storage,
    /// When set, evidence notes and safehouse addresses are sealed with it.
    pub seal_passphrase: Option<String>,
    pub ws_tx: broadcast::Sender<WsEvent>,
    pub ws_connection_count: Arc<AtomicUsize>,
}

pub type SharedState = Arc<Mutex<AppState>>;
