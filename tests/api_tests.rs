use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use axum::Router;
use futures_util::StreamExt as _;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot};
use tokio_tungstenite::tungstenite::protocol::Message as WsFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use safevoice::storage::Storage;
use safevoice::web::router::build_router;
use safevoice::web::seed_demo_data;
use safevoice::web::state::{AppState, SharedState};

async fn start_server(seed: bool, seal_passphrase: Option<&str>) -> (String, oneshot::Sender<()>) {
    let storage = Storage::open_in_memory().expect("open storage");
    if seed {
        seed_demo_data(&storage).expect("seed demo data");
    }

    let (ws_tx, _) = broadcast::channel(64);
    let state: SharedState = Arc::new(tokio::sync::Mutex::new(AppState {
        storage,
        seal_passphrase: seal_passphrase.map(str::to_string),
        ws_tx,
        ws_connection_count: Arc::new(AtomicUsize::new(0)),
    }));

    let app: Router = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind server");
    let addr = listener.local_addr().expect("server addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        let _ = shutdown_rx.await;
    });
    tokio::spawn(async move {
        let _ = server.await;
    });

    (format!("http://{}", addr), shutdown_tx)
}

fn unpack(result: Result<ureq::Response, ureq::Error>) -> (u16, Value) {
    let response = match result {
        Ok(r) => r,
        Err(ureq::Error::Status(_, r)) => r,
        Err(e) => panic!("transport error: {e}"),
    };
    let status = response.status();
    let body = response.into_json().unwrap_or(Value::Null);
    (status, body)
}

fn get(base: &str, path: &str) -> (u16, Value) {
    unpack(ureq::get(&format!("{base}{path}")).call())
}

fn post(base: &str, path: &str, body: Value) -> (u16, Value) {
    unpack(ureq::post(&format!("{base}{path}")).send_json(body))
}

fn delete(base: &str, path: &str) -> (u16, Value) {
    unpack(ureq::delete(&format!("{base}{path}")).call())
}

fn create_ngo(base: &str) -> String {
    let (status, body) = post(
        base,
        "/api/ngos",
        json!({"name": "Test NGO", "contact_email": "ngo@test.example", "plan": "plus"}),
    );
    assert_eq!(status, 201, "create ngo: {body}");
    body["id"].as_str().expect("ngo id").to_string()
}

fn create_safehouse(base: &str, ngo_id: &str, beds: u32) -> String {
    let (status, body) = post(
        base,
        "/api/safehouses",
        json!({
            "ngo_id": ngo_id,
            "name": "Test House",
            "phone": "+1-555-0199",
            "type": "emergency",
            "total_beds": beds,
        }),
    );
    assert_eq!(status, 201, "create safehouse: {body}");
    body["id"].as_str().expect("safehouse id").to_string()
}

fn capacity(base: &str, safehouse_id: &str) -> (u64, u64, u64, u64) {
    let (status, body) = get(base, &format!("/api/safehouses/{safehouse_id}"));
    assert_eq!(status, 200, "get safehouse: {body}");
    let c = &body["capacity"];
    (
        c["total_beds"].as_u64().unwrap(),
        c["available_beds"].as_u64().unwrap(),
        c["reserved_beds"].as_u64().unwrap(),
        c["occupied_beds"].as_u64().unwrap(),
    )
}

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn ws_connect(base: &str) -> WsClient {
    let url = format!("{}/api/ws", base.replacen("http", "ws", 1));
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("ws connect");
    ws
}

async fn next_json(ws: &mut WsClient) -> Value {
    loop {
        match ws.next().await {
            Some(Ok(WsFrame::Text(text))) => {
                return serde_json::from_str(&text).expect("ws frame json")
            }
            Some(Ok(_)) => continue,
            other => panic!("ws stream ended unexpectedly: {other:?}"),
        }
    }
}

fn reserve(base: &str, safehouse_id: &str, user_id: &str) -> (u16, Value) {
    post(
        base,
        "/api/bookings",
        json!({"safehouse_id": safehouse_id, "user_id": user_id}),
    )
}

#[tokio::test]
async fn health_endpoint_reports_counts() {
    let (base, shutdown) = start_server(true, None).await;
    tokio::task::spawn_blocking(move || {
        let (status, body) = get(&base, "/api/health");
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["safehouses"], 2);
        assert_eq!(body["active_panics"], 0);
        assert_eq!(body["sealing"], false);
    })
    .await
    .expect("test task");
    let _ = shutdown.send(());
}

#[tokio::test]
async fn seeded_directory_lists_contact_details() {
    let (base, shutdown) = start_server(true, None).await;
    tokio::task::spawn_blocking(move || {
        let (status, body) = get(&base, "/api/safehouses");
        assert_eq!(status, 200);
        let houses = body.as_array().expect("array of safehouses");
        assert!(!houses.is_empty());
        for house in houses {
            assert!(house["phone"].as_str().is_some_and(|p| !p.is_empty()));
            assert!(house["type"].as_str().is_some_and(|t| !t.is_empty()));
            assert!(house.get("sealed_address").is_none());
        }
    })
    .await
    .expect("test task");
    let _ = shutdown.send(());
}

#[tokio::test]
async fn panic_activation_issues_anonymous_session() {
    let (base, shutdown) = start_server(false, None).await;
    tokio::task::spawn_blocking(move || {
        let (status, body) = post(
            &base,
            "/api/panic",
            json!({"trigger_type": "shake", "location": {"lat": 51.5, "lon": -0.12}}),
        );
        assert_eq!(status, 201, "activate: {body}");
        assert_eq!(body["success"], true);
        assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));
        assert!(body["anonymous_session_id"].as_str().is_some());
        let event_id = body["event_id"].as_str().expect("event id").to_string();

        let (status, body) = get(&base, &format!("/api/panic/{event_id}"));
        assert_eq!(status, 200);
        assert_eq!(body["status"], "active");
        assert_eq!(body["trigger_type"], "shake");
        assert_eq!(body["location_history"].as_array().unwrap().len(), 1);
    })
    .await
    .expect("test task");
    let _ = shutdown.send(());
}

#[tokio::test]
async fn activation_rejects_out_of_range_location() {
    let (base, shutdown) = start_server(false, None).await;
    tokio::task::spawn_blocking(move || {
        let (status, body) = post(
            &base,
            "/api/panic",
            json!({"user_id": "u-1", "location": {"lat": 500.0, "lon": 10.0}}),
        );
        assert_eq!(status, 400, "bad lat: {body}");

        let (status, _) = post(
            &base,
            "/api/panic",
            json!({"user_id": "u-1", "location": {"lat": 10.0, "lon": -181.0}}),
        );
        assert_eq!(status, 400);

        // Boundary values are valid.
        let (status, body) = post(
            &base,
            "/api/panic",
            json!({"user_id": "u-1", "location": {"lat": 90.0, "lon": -180.0}}),
        );
        assert_eq!(status, 201, "boundary location: {body}");
    })
    .await
    .expect("test task");
    let _ = shutdown.send(());
}

#[tokio::test]
async fn ws_stream_announces_panic_lifecycle() {
    let (base, shutdown) = start_server(false, None).await;
    let mut ws = ws_connect(&base).await;

    let greeting = next_json(&mut ws).await;
    assert_eq!(greeting["type"], "connected");
    assert_eq!(greeting["active_panics"], 0);

    let http = base.clone();
    let event_id = tokio::task::spawn_blocking(move || {
        let (status, body) = post(
            &http,
            "/api/panic",
            json!({"user_id": "u-1", "trigger_type": "voice"}),
        );
        assert_eq!(status, 201, "activate: {body}");
        body["event_id"].as_str().expect("event id").to_string()
    })
    .await
    .expect("test task");

    let event = next_json(&mut ws).await;
    assert_eq!(event["type"], "panic_activated");
    assert_eq!(event["event_id"], event_id.as_str());
    assert_eq!(event["trigger_type"], "voice");

    let http = base.clone();
    let resolve_id = event_id.clone();
    tokio::task::spawn_blocking(move || {
        let (status, body) = post(
            &http,
            &format!("/api/panic/{resolve_id}/resolve"),
            json!({"resolution": "resolved"}),
        );
        assert_eq!(status, 200, "resolve: {body}");
    })
    .await
    .expect("test task");

    let event = next_json(&mut ws).await;
    assert_eq!(event["type"], "panic_closed");
    assert_eq!(event["event_id"], event_id.as_str());
    assert_eq!(event["resolution"], "resolved");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn ws_connections_capped_and_slots_freed() {
    let (base, shutdown) = start_server(false, None).await;

    // Fill every slot. The greeting confirms the server has registered the
    // connection before the next one is attempted.
    let mut held = Vec::new();
    for _ in 0..8 {
        let mut ws = ws_connect(&base).await;
        let greeting = next_json(&mut ws).await;
        assert_eq!(greeting["type"], "connected");
        held.push(ws);
    }

    let url = format!("{}/api/ws", base.replacen("http", "ws", 1));
    let err = tokio_tungstenite::connect_async(url.as_str())
        .await
        .expect_err("connection over the cap");
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status().as_u16(), 503);
        }
        other => panic!("unexpected handshake error: {other}"),
    }

    // Dropping a client frees its slot once the server notices.
    drop(held.pop());
    let mut reconnected = None;
    for _ in 0..50 {
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((ws, _)) => {
                reconnected = Some(ws);
                break;
            }
            Err(_) => tokio::time::sleep(std::time::Duration::from_millis(20)).await,
        }
    }
    assert!(reconnected.is_some(), "slot was not freed after disconnect");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn resolved_panic_rejects_further_updates() {
    let (base, shutdown) = start_server(false, None).await;
    tokio::task::spawn_blocking(move || {
        let (status, body) = post(&base, "/api/panic", json!({"user_id": "u-1"}));
        assert_eq!(status, 201, "activate: {body}");
        let event_id = body["event_id"].as_str().expect("event id").to_string();

        let (status, _) = post(
            &base,
            &format!("/api/panic/{event_id}/location"),
            json!({"lat": 40.7, "lon": -74.0}),
        );
        assert_eq!(status, 200);

        let (status, body) = post(
            &base,
            &format!("/api/panic/{event_id}/resolve"),
            json!({"resolution": "false_alarm"}),
        );
        assert_eq!(status, 200, "resolve: {body}");
        assert_eq!(body["status"], "false_alarm");

        // Already closed: resolving again or appending locations conflicts.
        let (status, _) = post(
            &base,
            &format!("/api/panic/{event_id}/resolve"),
            json!({"resolution": "resolved"}),
        );
        assert_eq!(status, 409);
        let (status, _) = post(
            &base,
            &format!("/api/panic/{event_id}/location"),
            json!({"lat": 40.7, "lon": -74.0}),
        );
        assert_eq!(status, 409);
    })
    .await
    .expect("test task");
    let _ = shutdown.send(());
}

#[tokio::test]
async fn panic_notifies_opted_in_contacts_only() {
    let (base, shutdown) = start_server(false, None).await;
    tokio::task::spawn_blocking(move || {
        let (status, _) = post(
            &base,
            "/api/contacts",
            json!({"user_id": "u-7", "name": "Ana", "phone": "+1-555-0001"}),
        );
        assert_eq!(status, 201);
        let (status, _) = post(
            &base,
            "/api/contacts",
            json!({
                "user_id": "u-7",
                "name": "Ben",
                "phone": "+1-555-0002",
                "notify_on_panic": false,
            }),
        );
        assert_eq!(status, 201);

        let (status, body) = post(&base, "/api/panic", json!({"user_id": "u-7"}));
        assert_eq!(status, 201, "activate: {body}");
        assert_eq!(body["contacts_notified"], 1);

        let event_id = body["event_id"].as_str().expect("event id").to_string();
        let (status, body) = get(&base, &format!("/api/panic/{event_id}"));
        assert_eq!(status, 200);
        assert_eq!(body["notifications"].as_array().unwrap().len(), 1);
    })
    .await
    .expect("test task");
    let _ = shutdown.send(());
}

#[tokio::test]
async fn contact_requires_exactly_one_identity() {
    let (base, shutdown) = start_server(false, None).await;
    tokio::task::spawn_blocking(move || {
        let (status, _) = post(
            &base,
            "/api/contacts",
            json!({
                "user_id": "u-1",
                "anonymous_session_id": "s-1",
                "name": "Ana",
                "phone": "+1-555-0001",
            }),
        );
        assert_eq!(status, 400);

        let (status, _) = post(
            &base,
            "/api/contacts",
            json!({"name": "Ana", "phone": "+1-555-0001"}),
        );
        assert_eq!(status, 400);
    })
    .await
    .expect("test task");
    let _ = shutdown.send(());
}

#[tokio::test]
async fn booking_lifecycle_keeps_bed_counts_consistent() {
    let (base, shutdown) = start_server(false, None).await;
    tokio::task::spawn_blocking(move || {
        let ngo = create_ngo(&base);
        let house = create_safehouse(&base, &ngo, 3);
        assert_eq!(capacity(&base, &house), (3, 3, 0, 0));

        let (status, body) = reserve(&base, &house, "u-1");
        assert_eq!(status, 201, "reserve: {body}");
        assert_eq!(body["status"], "pending");
        let booking = body["id"].as_str().expect("booking id").to_string();
        assert_eq!(capacity(&base, &house), (3, 2, 1, 0));

        let (status, body) = get(&base, &format!("/api/safehouses/{house}"));
        assert_eq!(status, 200);
        let live = body["live_bookings"].as_array().expect("live bookings");
        assert_eq!(live.len(), 1);
        assert_eq!(live[0]["id"], booking.as_str());

        let (status, body) = post(&base, &format!("/api/bookings/{booking}/approve"), json!({}));
        assert_eq!(status, 200, "approve: {body}");
        assert_eq!(body["status"], "approved");
        assert_eq!(capacity(&base, &house), (3, 2, 1, 0));

        let (status, _) = post(
            &base,
            &format!("/api/bookings/{booking}/intake"),
            json!({"intake": {"language": "en"}}),
        );
        assert_eq!(status, 200);
        let (status, body) = post(
            &base,
            &format!("/api/bookings/{booking}/assessment"),
            json!({"assessment": {"danger": "high"}, "completed": true}),
        );
        assert_eq!(status, 200, "assessment: {body}");
        assert_eq!(body["assessment_completed"], true);

        let (status, body) = post(
            &base,
            &format!("/api/bookings/{booking}/check-in"),
            json!({}),
        );
        assert_eq!(status, 200, "check-in: {body}");
        assert_eq!(body["status"], "checked_in");
        assert_eq!(capacity(&base, &house), (3, 2, 0, 1));

        let (status, body) = post(
            &base,
            &format!("/api/bookings/{booking}/check-out"),
            json!({}),
        );
        assert_eq!(status, 200, "check-out: {body}");
        assert_eq!(body["status"], "checked_out");
        assert_eq!(capacity(&base, &house), (3, 3, 0, 0));
    })
    .await
    .expect("test task");
    let _ = shutdown.send(());
}

#[tokio::test]
async fn check_in_requires_approval_and_assessment() {
    let (base, shutdown) = start_server(false, None).await;
    tokio::task::spawn_blocking(move || {
        let ngo = create_ngo(&base);
        let house = create_safehouse(&base, &ngo, 2);

        let (_, body) = reserve(&base, &house, "u-1");
        let booking = body["id"].as_str().expect("booking id").to_string();

        // Straight from pending
        let (status, _) = post(&base, &format!("/api/bookings/{booking}/check-in"), json!({}));
        assert_eq!(status, 409);

        let (status, _) = post(&base, &format!("/api/bookings/{booking}/approve"), json!({}));
        assert_eq!(status, 200);

        // Approved but no completed assessment
        let (status, body) = post(&base, &format!("/api/bookings/{booking}/check-in"), json!({}));
        assert_eq!(status, 409, "check-in without assessment: {body}");

        let (status, _) = post(
            &base,
            &format!("/api/bookings/{booking}/assessment"),
            json!({"assessment": {}, "completed": true}),
        );
        assert_eq!(status, 200);
        let (status, _) = post(&base, &format!("/api/bookings/{booking}/check-in"), json!({}));
        assert_eq!(status, 200);
    })
    .await
    .expect("test task");
    let _ = shutdown.send(());
}

#[tokio::test]
async fn rejecting_a_booking_releases_the_bed() {
    let (base, shutdown) = start_server(false, None).await;
    tokio::task::spawn_blocking(move || {
        let ngo = create_ngo(&base);
        let house = create_safehouse(&base, &ngo, 1);

        let (_, body) = reserve(&base, &house, "u-1");
        let booking = body["id"].as_str().expect("booking id").to_string();
        assert_eq!(capacity(&base, &house), (1, 0, 1, 0));

        let (status, body) = post(
            &base,
            &format!("/api/bookings/{booking}/reject"),
            json!({"reason": "no suitable space"}),
        );
        assert_eq!(status, 200, "reject: {body}");
        assert_eq!(body["status"], "rejected");
        assert_eq!(body["cancel_reason"], "no suitable space");
        assert_eq!(capacity(&base, &house), (1, 1, 0, 0));

        // Terminal: no further transitions
        let (status, _) = post(&base, &format!("/api/bookings/{booking}/approve"), json!({}));
        assert_eq!(status, 409);
    })
    .await
    .expect("test task");
    let _ = shutdown.send(());
}

#[tokio::test]
async fn reservations_stop_at_capacity() {
    let (base, shutdown) = start_server(false, None).await;
    tokio::task::spawn_blocking(move || {
        let ngo = create_ngo(&base);
        let house = create_safehouse(&base, &ngo, 1);

        let (status, _) = reserve(&base, &house, "u-1");
        assert_eq!(status, 201);
        let (status, body) = reserve(&base, &house, "u-2");
        assert_eq!(status, 409, "over-capacity reserve: {body}");
        assert_eq!(capacity(&base, &house), (1, 0, 1, 0));
    })
    .await
    .expect("test task");
    let _ = shutdown.send(());
}

#[tokio::test]
async fn duplicate_live_booking_rejected() {
    let (base, shutdown) = start_server(false, None).await;
    tokio::task::spawn_blocking(move || {
        let ngo = create_ngo(&base);
        let house = create_safehouse(&base, &ngo, 4);

        let (status, _) = reserve(&base, &house, "u-1");
        assert_eq!(status, 201);
        let (status, body) = reserve(&base, &house, "u-1");
        assert_eq!(status, 409, "duplicate reserve: {body}");
    })
    .await
    .expect("test task");
    let _ = shutdown.send(());
}

#[tokio::test]
async fn transport_status_only_moves_forward() {
    let (base, shutdown) = start_server(false, None).await;
    tokio::task::spawn_blocking(move || {
        let ngo = create_ngo(&base);
        let house = create_safehouse(&base, &ngo, 2);

        let (status, body) = post(
            &base,
            "/api/bookings",
            json!({"safehouse_id": house, "user_id": "u-1", "transport_required": true}),
        );
        assert_eq!(status, 201, "reserve: {body}");
        assert_eq!(body["transport"]["status"], "requested");
        let booking = body["id"].as_str().expect("booking id").to_string();

        let (status, body) = post(
            &base,
            &format!("/api/bookings/{booking}/transport"),
            json!({"status": "arranged", "details": {"driver": "volunteer-3"}}),
        );
        assert_eq!(status, 200, "transport: {body}");
        assert_eq!(body["transport"]["status"], "arranged");
        assert_eq!(body["transport"]["details"]["driver"], "volunteer-3");

        // Backwards is refused
        let (status, _) = post(
            &base,
            &format!("/api/bookings/{booking}/transport"),
            json!({"status": "requested"}),
        );
        assert_eq!(status, 409);
    })
    .await
    .expect("test task");
    let _ = shutdown.send(());
}

#[tokio::test]
async fn report_submission_scores_risk() {
    let (base, shutdown) = start_server(false, None).await;
    tokio::task::spawn_blocking(move || {
        let (status, body) = post(
            &base,
            "/api/reports",
            json!({
                "user_id": "u-9",
                "content": "He grabbed a knife and threatened to kill me. I am terrified and trapped.",
            }),
        );
        assert_eq!(status, 201, "submit: {body}");
        assert_eq!(body["status"], "submitted");
        assert_eq!(body["priority"], "high");
        assert_eq!(body["risk"]["level"], "critical");
        assert!(body["risk"]["score"].as_u64().unwrap() >= 75);
        assert!(!body["risk"]["keywords"].as_array().unwrap().is_empty());

        let (status, body) = post(
            &base,
            "/api/reports",
            json!({"user_id": "u-9", "content": "We talked about the weather yesterday."}),
        );
        assert_eq!(status, 201);
        assert_eq!(body["priority"], "low");
        assert_eq!(body["risk"]["level"], "low");
    })
    .await
    .expect("test task");
    let _ = shutdown.send(());
}

#[tokio::test]
async fn report_case_workflow_moves_forward_only() {
    let (base, shutdown) = start_server(false, None).await;
    tokio::task::spawn_blocking(move || {
        let (status, body) = post(
            &base,
            "/api/reports",
            json!({"user_id": "u-2", "content": "He keeps yelling and shoving me."}),
        );
        assert_eq!(status, 201, "submit: {body}");
        let report = body["id"].as_str().expect("report id").to_string();

        // Cannot jump straight to resolved
        let (status, _) = post(
            &base,
            &format!("/api/reports/{report}/status"),
            json!({"status": "resolved"}),
        );
        assert_eq!(status, 409);

        for next in ["under_review", "assigned", "in_progress", "resolved"] {
            let (status, body) = post(
                &base,
                &format!("/api/reports/{report}/status"),
                json!({"status": next, "assignee": "caseworker-1"}),
            );
            assert_eq!(status, 200, "to {next}: {body}");
            assert_eq!(body["status"], next);
        }

        let (status, _) = post(
            &base,
            &format!("/api/reports/{report}/notes"),
            json!({"author": "caseworker-1", "body": "followed up by phone"}),
        );
        assert_eq!(status, 201);

        let (status, body) = get(&base, &format!("/api/reports/{report}"));
        assert_eq!(status, 200);
        assert_eq!(body["assignee"], "caseworker-1");
        assert_eq!(body["notes"].as_array().unwrap().len(), 1);
    })
    .await
    .expect("test task");
    let _ = shutdown.send(());
}

#[tokio::test]
async fn evidence_note_is_sealed_when_passphrase_configured() {
    let (base, shutdown) = start_server(false, Some("test passphrase")).await;
    tokio::task::spawn_blocking(move || {
        let (status, body) = post(&base, "/api/panic", json!({"user_id": "u-1"}));
        assert_eq!(status, 201, "activate: {body}");
        let event_id = body["event_id"].as_str().expect("event id").to_string();

        let (status, body) = post(
            &base,
            "/api/evidence",
            json!({"event_id": event_id, "kind": "note", "note": "license plate ABC-123"}),
        );
        assert_eq!(status, 201, "evidence: {body}");
        assert_eq!(body["sealed"], true);
    })
    .await
    .expect("test task");
    let _ = shutdown.send(());
}

#[tokio::test]
async fn messages_roundtrip_and_soft_delete() {
    let (base, shutdown) = start_server(false, None).await;
    tokio::task::spawn_blocking(move || {
        let (status, body) = post(
            &base,
            "/api/messages",
            json!({
                "conversation_id": "conv-1",
                "sender": "u-1",
                "recipient": "caseworker-1",
                "body": "Is the shelter open tonight?",
            }),
        );
        assert_eq!(status, 201, "send: {body}");
        let message = body["message_id"].as_str().expect("message id").to_string();

        let (status, body) = get(&base, "/api/messages?conversation=conv-1");
        assert_eq!(status, 200);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, _) = post(&base, &format!("/api/messages/{message}/read"), json!({}));
        assert_eq!(status, 200);

        let (status, _) = delete(&base, &format!("/api/messages/{message}"));
        assert_eq!(status, 200);

        let (status, body) = get(&base, "/api/messages?conversation=conv-1");
        assert_eq!(status, 200);
        assert!(body.as_array().unwrap().is_empty());

        let (status, _) = delete(&base, &format!("/api/messages/{message}"));
        assert_eq!(status, 404);
    })
    .await
    .expect("test task");
    let _ = shutdown.send(());
}
