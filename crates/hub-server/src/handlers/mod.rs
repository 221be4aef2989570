//! HTTP handler surface (§6): one module per resource family, wired into
//! the router in `main.rs`. Every handler returns `Result<impl IntoResponse,
//! ApiError>` so `?` propagates straight to the canonical error envelope.

pub mod archive;
pub mod chats;
pub mod drones;
pub mod fs;
pub mod groups;
pub mod preview;
pub mod repo;
pub mod settings;
pub mod terminal;

use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::app_state::SharedState;
use crate::error::ApiError;
use drone_hub_protocol::api::Envelope;
use drone_hub_protocol::Registry;

/// Wrap a response body in the `{ok:true, ...}` envelope with
/// `cache-control: no-store` (§4.10).
pub fn ok<T: Serialize>(body: T) -> Response {
    let mut resp = Json(Envelope::ok(body)).into_response();
    resp.headers_mut()
        .insert(axum::http::header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    resp
}

/// Resolve `id_or_name` to a live drone, cloning its record out of the
/// registry snapshot. Every route resolves drones this way (§4.10).
pub fn require_live_drone(reg: &Registry, id_or_name: &str) -> Result<drone_hub_protocol::Drone, ApiError> {
    let id = crate::lookup::require_live_drone_id(reg, id_or_name)?;
    reg.drones
        .get(&id)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("drone {id_or_name}")))
}

/// Load the current registry snapshot. Thin wrapper kept for readability at
/// call sites that immediately resolve a drone out of it.
pub fn load(state: &SharedState) -> Registry {
    state.registry.load()
}
