//! Drone lifecycle routes (§6 "Drones"): create, list, rename, archive,
//! delete, base-image refresh, group reassignment.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use drone_hub_protocol::api::{
    ArchiveDroneRequest, BatchCreateDroneRequest, CreateDroneRequest, CreateDroneResponse, DroneListEntry,
    DroneOrPending, SetGroupRequest,
};
use drone_hub_protocol::{ArchivedDrone, HubPhase, PendingDrone, PendingPhase};

use crate::app_state::SharedState;
use crate::error::ApiError;
use crate::lookup;
use crate::time;

const MAX_NAME_LEN: usize = 80;
const MIN_CONTAINER_PORT: u16 = 1024;

fn validate_port(port: Option<u16>) -> Result<u16, ApiError> {
    match port {
        Some(p) if p >= MIN_CONTAINER_PORT => Ok(p),
        Some(p) => Err(ApiError::Validation(format!("container port {p} must be >= {MIN_CONTAINER_PORT}"))),
        None => Ok(3000),
    }
}

fn validate_name(name: &str) -> Result<(), ApiError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(ApiError::Validation(format!(
            "name must be 1-{MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn generate_name() -> String {
    format!("drone-{}", &uuid::Uuid::new_v4().to_string()[..8])
}

/// `POST /drones` (§3 "Pending drone", §4.5): inserts a `PendingDrone` and
/// enqueues it on the provisioning worker pool, returning 202 immediately —
/// provisioning itself never blocks the HTTP response.
pub async fn create(
    State(state): State<SharedState>,
    Json(req): Json<CreateDroneRequest>,
) -> Result<Response, ApiError> {
    let id = create_one(&state, req).await?;
    state.provisioning.enqueue(id.clone()).await;
    Ok((StatusCode::ACCEPTED, super::ok(CreateDroneResponse { id, phase: PendingPhase::Starting })).into_response())
}

/// `POST /drones/batch`: same as `create`, repeated per entry; partial
/// success is possible (each drone id/phase is reported independently).
pub async fn batch_create(
    State(state): State<SharedState>,
    Json(req): Json<BatchCreateDroneRequest>,
) -> Result<Response, ApiError> {
    let mut created = Vec::with_capacity(req.drones.len());
    for drone_req in req.drones {
        let id = create_one(&state, drone_req).await?;
        state.provisioning.enqueue(id.clone()).await;
        created.push(CreateDroneResponse { id, phase: PendingPhase::Starting });
    }
    Ok((StatusCode::ACCEPTED, super::ok(created)).into_response())
}

async fn create_one(state: &SharedState, req: CreateDroneRequest) -> Result<String, ApiError> {
    let name = if req.name.is_empty() { generate_name() } else { req.name };
    validate_name(&name)?;
    let container_port = validate_port(req.container_port)?;

    let id = drone_hub_protocol::new_id();
    let now = time::now_iso();
    let pending = PendingDrone {
        id: id.clone(),
        name: name.clone(),
        group: req.group,
        repo_path: req.repo_path,
        container_port,
        build: !req.no_build.unwrap_or(false),
        phase: PendingPhase::Starting,
        message: "Queued…".to_string(),
        error: None,
        created_at: now.clone(),
        updated_at: now,
        clone_from: req.clone_from,
        clone_chats: req.clone_chats,
        seed: req.seed,
    };

    state.registry.update::<_, _, ApiError>(|reg| {
        if lookup::name_taken(reg, &name) {
            return Err(ApiError::Validation(format!("name {name} already in use")));
        }
        reg.pending.insert(id.clone(), pending.clone());
        Ok(())
    })?;

    Ok(id)
}

/// `GET /drones`: merges live and pending drones into one list, each
/// carrying a cheap `statusOk` flag derived from hub/pending phase rather
/// than a live daemon probe (§5 "Shared resource policy" favors cheap reads).
pub async fn list(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let reg = state.registry.load();
    let mut entries: Vec<DroneListEntry> = Vec::with_capacity(reg.drones.len() + reg.pending.len());

    for drone in reg.drones.values() {
        let status_ok = !matches!(drone.hub.as_ref().map(|h| h.phase), Some(HubPhase::Error));
        entries.push(DroneListEntry { drone: DroneOrPending::Live(drone.clone()), status_ok });
    }
    for pending in reg.pending.values() {
        let status_ok = pending.phase != PendingPhase::Error;
        entries.push(DroneListEntry { drone: DroneOrPending::Pending(pending.clone()), status_ok });
    }

    Ok(super::ok(entries).into_response())
}

/// Legacy rename path, pre-dating the current `rename` endpoint name
/// (§13 decision c): returns 410 Gone unconditionally. Display names are
/// otherwise immutable over HTTP in this build.
pub async fn rename(Path(_id): Path<String>) -> Response {
    (
        StatusCode::GONE,
        Json(serde_json::json!({"ok": false, "error": "this rename path is no longer supported"})),
    )
        .into_response()
}

/// `POST /drones/:id/hub/error/clear`: clears a stuck `hub.phase=error`
/// without touching anything else on the drone.
pub async fn clear_hub_error(State(state): State<SharedState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let reg = state.registry.load();
    let drone_id = lookup::require_live_drone_id(&reg, &id)?;
    state.registry.update::<_, _, ApiError>(|reg| {
        if let Some(d) = reg.drones.get_mut(&drone_id) {
            d.hub = None;
        }
        Ok(())
    })?;
    Ok(super::ok(serde_json::json!({})).into_response())
}

/// `POST /drones/:id/archive` (§3 "Archived drone"): snapshots the live
/// drone into `archived`, removing it from `drones`. The container itself
/// is left running unless `runtimePolicy=stop` is later enforced by the
/// archive sweeper on deletion.
pub async fn archive(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    body: Option<Json<ArchiveDroneRequest>>,
) -> Result<Response, ApiError> {
    let req = body.map(|Json(r)| r).unwrap_or(ArchiveDroneRequest { retention: None, runtime_policy: None });
    let retention = req.retention.unwrap_or(drone_hub_protocol::ArchiveRetention::OneDay);
    let runtime_policy = req.runtime_policy.unwrap_or(drone_hub_protocol::ArchiveRuntimePolicy::KeepRunning);

    let reg = state.registry.load();
    let drone_id = lookup::require_live_drone_id(&reg, &id)?;
    let now = time::now_iso();
    let delete_at = time::format_ms(time::parse_ms(&now) + retention.duration_secs() * 1000);

    state.registry.update::<_, _, ApiError>(|reg| {
        let Some(drone) = reg.drones.remove(&drone_id) else {
            return Err(ApiError::NotFound(format!("drone {drone_id}")));
        };
        reg.archived.insert(
            drone_id.clone(),
            ArchivedDrone {
                drone,
                archived_at: now.clone(),
                delete_at: delete_at.clone(),
                archive_retention: retention,
                archive_runtime_policy: runtime_policy,
            },
        );
        Ok(())
    })?;

    if runtime_policy == drone_hub_protocol::ArchiveRuntimePolicy::Stop {
        if let Some(archived) = state.registry.load().archived.get(&drone_id) {
            let _ = state.container.stop(&archived.drone.container_name).await;
        }
    }

    Ok(super::ok(serde_json::json!({"id": drone_id})).into_response())
}

#[derive(serde::Deserialize)]
pub struct DeleteQuery {
    #[serde(default, rename = "keepVolume")]
    keep_volume: bool,
    #[serde(default)]
    forget: bool,
}

/// `DELETE /drones/:id?keepVolume&forget`: removes the container and drops
/// the record. `forget=true` skips archiving even if the drone was live;
/// otherwise a live drone is archived first via the same path as `archive`.
pub async fn delete(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<Response, ApiError> {
    let reg = state.registry.load();

    let container_name = if let Some(d) = reg.drones.get(&id).or_else(|| reg.drones.values().find(|d| d.name == id)) {
        let name = d.container_name.clone();
        let drone_id = d.id.clone();
        state.registry.update::<_, _, ApiError>(|reg| {
            reg.drones.remove(&drone_id);
            Ok(())
        })?;
        Some(name)
    } else if let Some(a) = reg.archived.get(&id).or_else(|| reg.archived.values().find(|a| a.drone.name == id)) {
        let name = a.drone.container_name.clone();
        let drone_id = a.drone.id.clone();
        state.registry.update::<_, _, ApiError>(|reg| {
            reg.archived.remove(&drone_id);
            Ok(())
        })?;
        Some(name)
    } else if let Some(p) = reg.pending.get(&id).or_else(|| reg.pending.values().find(|p| p.name == id)) {
        let drone_id = p.id.clone();
        state.registry.update::<_, _, ApiError>(|reg| {
            reg.pending.remove(&drone_id);
            Ok(())
        })?;
        None
    } else {
        return Err(ApiError::NotFound(format!("drone {id}")));
    };

    // `forget` skips container teardown entirely — useful when the
    // container is already gone and removal would just error.
    if !query.forget {
        if let Some(container_name) = container_name {
            state.container.remove(&container_name, query.keep_volume).await?;
        }
    }

    Ok(super::ok(serde_json::json!({})).into_response())
}

/// `POST /drones/:id/base-image`: re-pins the container's `dvm.baseSha` to
/// its current repo HEAD, used after a manual host-side rebase.
pub async fn base_image(State(state): State<SharedState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let reg = state.registry.load();
    let drone = super::require_live_drone(&reg, &id)?;
    let head = state.container.repo_head_sha(&drone.container_name).await?;
    state.container.repo_set_base_sha(&drone.container_name, &head).await?;
    Ok(super::ok(serde_json::json!({"baseSha": head})).into_response())
}

/// `POST /drones/group-set`: bulk-assigns `group` across a set of ids.
pub async fn group_set(
    State(state): State<SharedState>,
    Json(req): Json<SetGroupRequest>,
) -> Result<Response, ApiError> {
    state.registry.update::<_, _, ApiError>(|reg| {
        let mut missing: Vec<String> = Vec::new();
        for id in &req.ids {
            if let Some(d) = reg.drones.get_mut(id) {
                d.group = req.group.clone();
            } else if let Some(p) = reg.pending.get_mut(id) {
                p.group = req.group.clone();
            } else {
                missing.push(id.clone());
            }
        }
        if !missing.is_empty() {
            return Err(ApiError::NotFound(format!("drones not found: {}", missing.join(", "))));
        }
        Ok(())
    })?;
    Ok(super::ok(serde_json::json!({})).into_response())
}
