//! HTTP request handlers, one module per API area.

pub mod bookings;
pub mod contacts;
pub mod health;
pub mod messages;
pub mod panic;
pub mod reports;
pub mod safehouses;
pub mod websocket;
