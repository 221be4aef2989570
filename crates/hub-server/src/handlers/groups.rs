//! Group management (§12 "Group management"): a flat set of strings
//! referenced by `drone.group`. Deleting a group un-sets it on every member
//! rather than deleting drones.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use drone_hub_protocol::api::{CreateGroupRequest, RenameGroupRequest};

use crate::app_state::SharedState;
use crate::error::ApiError;

const UNGROUPED: &str = "Ungrouped";

/// `GET /groups`.
pub async fn list(State(state): State<SharedState>) -> Response {
    let reg = state.registry.load();
    super::ok(reg.groups.clone()).into_response()
}

/// `POST /groups`.
pub async fn create(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<CreateGroupRequest>,
) -> Result<Response, ApiError> {
    if req.name.is_empty() || req.name == UNGROUPED {
        return Err(ApiError::Validation(format!("\"{UNGROUPED}\" is reserved")));
    }
    state.registry.update::<_, _, ApiError>(|reg| {
        if !reg.groups.iter().any(|g| g == &req.name) {
            reg.groups.push(req.name.clone());
        }
        Ok(())
    })?;
    Ok(super::ok(serde_json::json!({})).into_response())
}

/// `POST /groups/:name/rename`.
pub async fn rename(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    axum::Json(req): axum::Json<RenameGroupRequest>,
) -> Result<Response, ApiError> {
    if req.name.is_empty() || req.name == UNGROUPED {
        return Err(ApiError::Validation(format!("\"{UNGROUPED}\" is reserved")));
    }
    state.registry.update::<_, _, ApiError>(|reg| {
        let Some(slot) = reg.groups.iter_mut().find(|g| **g == name) else {
            return Err(ApiError::NotFound(format!("group {name}")));
        };
        *slot = req.name.clone();
        for drone in reg.drones.values_mut() {
            if drone.group.as_deref() == Some(name.as_str()) {
                drone.group = Some(req.name.clone());
            }
        }
        for pending in reg.pending.values_mut() {
            if pending.group.as_deref() == Some(name.as_str()) {
                pending.group = Some(req.name.clone());
            }
        }
        Ok(())
    })?;
    Ok(super::ok(serde_json::json!({})).into_response())
}

/// `DELETE /groups/:name`: un-sets the group on every member, falling back
/// to the synthetic `"Ungrouped"` (§12).
pub async fn delete(State(state): State<SharedState>, Path(name): Path<String>) -> Result<Response, ApiError> {
    state.registry.update::<_, _, ApiError>(|reg| {
        reg.groups.retain(|g| g != &name);
        for drone in reg.drones.values_mut() {
            if drone.group.as_deref() == Some(name.as_str()) {
                drone.group = None;
            }
        }
        for pending in reg.pending.values_mut() {
            if pending.group.as_deref() == Some(name.as_str()) {
                pending.group = None;
            }
        }
        Ok(())
    })?;
    Ok(super::ok(serde_json::json!({})).into_response())
}
