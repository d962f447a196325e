//! WebSocket event stream for panic alerts, bookings, and messages.

use std::sync::atomic::Ordering;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::broadcast;

use crate::web::config::MAX_WS_CONNECTIONS;
use crate::web::state::{SharedState, WsEvent};
use crate::web::utils::api_error;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> Response {
    let ws_count = {
        let st = state.lock().await;
        st.ws_connection_count.clone()
    };

    // Refuse before upgrading; dashboards are few, this is not a fan-out
    // surface for end users.
    if ws_count.load(Ordering::Relaxed) >= MAX_WS_CONNECTIONS {
        return api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            format!(
                "too many WebSocket connections (max {})",
                MAX_WS_CONNECTIONS
            ),
        );
    }

    ws.on_upgrade(|socket| ws_connection(socket, state))
        .into_response()
}

async fn ws_connection(mut socket: WebSocket, state: SharedState) {
    // Register the connection and snapshot the number of open panic events
    // under one lock, so the greeting is consistent with what the broadcast
    // channel will deliver from here on.
    let (mut rx, ws_count, active_panics) = {
        let st = state.lock().await;
        let active = match st.storage.count_active_panics() {
            Ok(n) => n,
            Err(e) => {
                crate::svlog!("ws: dropping connection, panic snapshot failed: {}", e);
                return;
            }
        };
        let count = st.ws_connection_count.clone();
        count.fetch_add(1, Ordering::Relaxed);
        (st.ws_tx.subscribe(), count, active)
    };

    // Greeting frame: a client joining mid-incident learns how many panic
    // events are still open and can fetch their details over REST.
    let greeting = serde_json::json!({
        "type": "connected",
        "active_panics": active_panics,
    });
    let connected = match serde_json::to_string(&greeting) {
        Ok(text) => socket.send(WsMessage::Text(text)).await.is_ok(),
        Err(_) => false,
    };

    if connected {
        pump_events(&mut socket, &mut rx).await;
    }

    ws_count.fetch_sub(1, Ordering::Relaxed);
}

/// Forward broadcast events to one client until either side disconnects.
async fn pump_events(socket: &mut WebSocket, rx: &mut broadcast::Receiver<WsEvent>) {
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if let Ok(json) = serde_json::to_string(&event) {
                            if socket.send(WsMessage::Text(json)).await.is_err() {
                                break; // client disconnected
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        crate::svlog!("ws client lagged, skipped {n} events");
                        // Tell the client to re-sync over REST.
                        let lag_msg = serde_json::json!({
                            "type": "events_missed",
                            "count": n,
                        });
                        if let Ok(json) = serde_json::to_string(&lag_msg) {
                            if socket.send(WsMessage::Text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = socket.send(WsMessage::Pong(data)).await;
                    }
                    // The stream is one-way; other client frames are ignored.
                    _ => {}
                }
            }
        }
    }
}
