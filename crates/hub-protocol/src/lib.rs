//! Drone Hub protocol
//!
//! Shared types for communication between the hub server, the admin CLI,
//! and the HTTP/WebSocket surface. These types are serialized as JSON.

use uuid::Uuid;

pub mod api;
pub mod model;
pub mod terminal;

pub use model::*;

/// Generate a new opaque id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
