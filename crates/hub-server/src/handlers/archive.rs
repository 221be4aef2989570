//! Archive routes (§6 "Archive"): list, restore, and hard-delete archived
//! drones. The TTL sweep that reaps expired archives lives in `archive.rs`
//! at the crate root — these are the operator-triggered counterparts.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};

use crate::app_state::SharedState;
use crate::error::ApiError;

/// `GET /archive/drones`.
pub async fn list(State(state): State<SharedState>) -> Response {
    let reg = state.registry.load();
    let entries: Vec<_> = reg.archived.values().cloned().collect();
    super::ok(entries).into_response()
}

/// `POST /archive/drones/:id/restore`: moves an archived drone back into
/// `drones`, dropping the archive bookkeeping. Does not restart the
/// container — a stopped one must be started separately.
pub async fn restore(State(state): State<SharedState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let drone_id = {
        let reg = state.registry.load();
        reg.archived
            .get(&id)
            .map(|a| a.drone.id.clone())
            .or_else(|| reg.archived.values().find(|a| a.drone.name == id).map(|a| a.drone.id.clone()))
            .ok_or_else(|| ApiError::NotFound(format!("archived drone {id}")))?
    };

    state.registry.update::<_, _, ApiError>(|reg| {
        let Some(archived) = reg.archived.remove(&drone_id) else {
            return Err(ApiError::NotFound(format!("archived drone {drone_id}")));
        };
        if crate::lookup::name_taken(reg, &archived.drone.name) {
            reg.archived.insert(drone_id.clone(), archived);
            return Err(ApiError::Validation("a drone with this name already exists".to_string()));
        }
        reg.drones.insert(drone_id.clone(), archived.drone);
        Ok(())
    })?;

    if let Some(drone) = state.registry.load().drones.get(&drone_id) {
        let _ = state.container.start(&drone.container_name).await;
    }

    Ok(super::ok(serde_json::json!({"id": drone_id})).into_response())
}

/// `DELETE /archive/drones/:id`: removes the container outright and drops
/// the archive record, ignoring retention.
pub async fn delete(State(state): State<SharedState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let drone_id = {
        let reg = state.registry.load();
        reg.archived
            .get(&id)
            .map(|a| a.drone.id.clone())
            .or_else(|| reg.archived.values().find(|a| a.drone.name == id).map(|a| a.drone.id.clone()))
            .ok_or_else(|| ApiError::NotFound(format!("archived drone {id}")))?
    };

    let container_name = state
        .registry
        .load()
        .archived
        .get(&drone_id)
        .map(|a| a.drone.container_name.clone());

    state.registry.update::<_, _, ApiError>(|reg| {
        reg.archived.remove(&drone_id);
        Ok(())
    })?;

    if let Some(container_name) = container_name {
        state.container.remove(&container_name, false).await?;
    }

    Ok(super::ok(serde_json::json!({})).into_response())
}
