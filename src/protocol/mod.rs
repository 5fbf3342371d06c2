//! Realtime wire protocol: outbound client events, inbound server events, shared models.

pub mod client_events;
pub mod models;
pub mod server_events;
