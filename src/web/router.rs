//! Axum router construction.

use axum::routing::{get, post};
use axum::Router;

use crate::web::handlers;
use crate::web::state::SharedState;

/// Build the complete Axum router with all API routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(handlers::health::health_handler))
        // Panic API
        .route("/api/panic", post(handlers::panic::activate_handler))
        .route(
            "/api/panic/:event_id",
            get(handlers::panic::get_panic_handler),
        )
        .route(
            "/api/panic/:event_id/location",
            post(handlers::panic::location_handler),
        )
        .route(
            "/api/panic/:event_id/resolve",
            post(handlers::panic::resolve_handler),
        )
        .route(
            "/api/evidence",
            post(handlers::panic::attach_evidence_handler),
        )
        // Emergency contacts API
        .route(
            "/api/contacts",
            get(handlers::contacts::list_contacts_handler)
                .post(handlers::contacts::add_contact_handler),
        )
        .route(
            "/api/contacts/:contact_id",
            axum::routing::delete(handlers::contacts::delete_contact_handler),
        )
        // Reports API
        .route(
            "/api/reports",
            get(handlers::reports::list_reports_handler)
                .post(handlers::reports::submit_report_handler),
        )
        .route(
            "/api/reports/:report_id",
            get(handlers::reports::get_report_handler),
        )
        .route(
            "/api/reports/:report_id/status",
            post(handlers::reports::report_status_handler),
        )
        .route(
            "/api/reports/:report_id/notes",
            post(handlers::reports::report_note_handler),
        )
        // Safehouse directory API
        .route(
            "/api/safehouses",
            get(handlers::safehouses::list_safehouses_handler)
                .post(handlers::safehouses::create_safehouse_handler),
        )
        .route(
            "/api/safehouses/:safehouse_id",
            get(handlers::safehouses::get_safehouse_handler),
        )
        .route("/api/ngos", post(handlers::safehouses::create_ngo_handler))
        // Booking workflow API
        .route("/api/bookings", post(handlers::bookings::reserve_handler))
        .route(
            "/api/bookings/:booking_id",
            get(handlers::bookings::get_booking_handler),
        )
        .route(
            "/api/bookings/:booking_id/approve",
            post(handlers::bookings::approve_handler),
        )
        .route(
            "/api/bookings/:booking_id/reject",
            post(handlers::bookings::reject_handler),
        )
        .route(
            "/api/bookings/:booking_id/intake",
            post(handlers::bookings::intake_handler),
        )
        .route(
            "/api/bookings/:booking_id/transport",
            post(handlers::bookings::transport_handler),
        )
        .route(
            "/api/bookings/:booking_id/assessment",
            post(handlers::bookings::assessment_handler),
        )
        .route(
            "/api/bookings/:booking_id/services",
            post(handlers::bookings::services_handler),
        )
        .route(
            "/api/bookings/:booking_id/check-in",
            post(handlers::bookings::check_in_handler),
        )
        .route(
            "/api/bookings/:booking_id/check-out",
            post(handlers::bookings::check_out_handler),
        )
        .route(
            "/api/bookings/:booking_id/cancel",
            post(handlers::bookings::cancel_handler),
        )
        // Messaging API
        .route(
            "/api/messages",
            get(handlers::messages::list_messages_handler)
                .post(handlers::messages::send_message_handler),
        )
        .route(
            "/api/messages/:message_id/read",
            post(handlers::messages::mark_read_handler),
        )
        .route(
            "/api/messages/:message_id",
            axum::routing::delete(handlers::messages::delete_message_handler),
        )
        // WebSocket
        .route("/api/ws", get(handlers::websocket::ws_handler))
        .with_state(state)
}
