//! Filesystem proxy (§12 "Filesystem proxy"): list/read/write/thumbnail of
//! files inside a drone's container, built entirely on the Container CLI
//! Adapter's `exec`/`copy_to` — there is no dedicated file-transfer RPC.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::app_state::SharedState;
use crate::error::ApiError;
use drone_hub_connector_core::shell_quote::{normalize_container_path, quote};

const THUMB_MAX_BYTES: u64 = 8 * 1024 * 1024;
const FILE_MAX_BYTES: u64 = 8 * 1024 * 1024;
const EXEC_TIMEOUT_MS: u64 = 15_000;

#[derive(Deserialize)]
pub struct PathQuery {
    #[serde(default)]
    path: String,
}

#[derive(Serialize)]
struct FsEntry {
    name: String,
    is_dir: bool,
    size: u64,
}

/// `GET /drones/:id/fs/list?path=`.
pub async fn list(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<PathQuery>,
) -> Result<Response, ApiError> {
    let reg = state.registry.load();
    let drone = super::require_live_drone(&reg, &id)?;
    let path = normalize_container_path(&query.path);

    let script = format!(
        "find {} -mindepth 1 -maxdepth 1 -printf '%y\\t%s\\t%f\\n' 2>/dev/null | sort",
        quote(&path)
    );
    let out = state
        .container
        .exec(&drone.container_name, "sh", &["-c".to_string(), script], Some(EXEC_TIMEOUT_MS))
        .await?;

    let entries: Vec<FsEntry> = out
        .stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, '\t');
            let kind = parts.next()?;
            let size: u64 = parts.next()?.parse().ok()?;
            let name = parts.next()?.to_string();
            Some(FsEntry { name, is_dir: kind == "d", size })
        })
        .collect();

    Ok(super::ok(entries).into_response())
}

#[derive(Serialize)]
struct FileContent {
    path: String,
    content_base64: String,
}

/// `GET /drones/:id/fs/file?path=`: reads the file as base64 so binary
/// content survives the JSON round-trip intact.
pub async fn get_file(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<PathQuery>,
) -> Result<Response, ApiError> {
    let reg = state.registry.load();
    let drone = super::require_live_drone(&reg, &id)?;
    let content_base64 = read_base64(&state, &drone, &query.path, FILE_MAX_BYTES).await?;
    Ok(super::ok(FileContent { path: query.path, content_base64 }).into_response())
}

#[derive(Deserialize)]
pub struct WriteFileRequest {
    content_base64: String,
}

/// `POST /drones/:id/fs/file`: writes a host temp file then `copyTo`s it
/// into the container at `path`, matching how the seed pipeline copies
/// attachments (`attachments.rs` + `ContainerAdapter::copy_to`).
pub async fn put_file(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<PathQuery>,
    axum::Json(req): axum::Json<WriteFileRequest>,
) -> Result<Response, ApiError> {
    let reg = state.registry.load();
    let drone = super::require_live_drone(&reg, &id)?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(req.content_base64.as_bytes())
        .map_err(|e| ApiError::Validation(format!("invalid base64: {e}")))?;
    if bytes.len() as u64 > FILE_MAX_BYTES {
        return Err(ApiError::PayloadTooLarge(format!("file exceeds {FILE_MAX_BYTES} bytes")));
    }

    let tmp_dir = std::env::temp_dir().join(format!("drone-hub-fs-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&tmp_dir).map_err(|e| ApiError::Internal(e.to_string()))?;
    let tmp_path = tmp_dir.join("payload");
    std::fs::write(&tmp_path, &bytes).map_err(|e| ApiError::Internal(e.to_string()))?;

    let dest = normalize_container_path(&query.path);
    let result = state.container.copy_to(&drone.container_name, &tmp_path.to_string_lossy(), &dest).await;
    let _ = std::fs::remove_dir_all(&tmp_dir);
    result?;

    Ok(super::ok(serde_json::json!({"path": query.path})).into_response())
}

/// `GET /drones/:id/fs/thumb?path=`: image/* only, ≤8 MiB (§6).
pub async fn thumb(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<PathQuery>,
) -> Result<Response, ApiError> {
    let reg = state.registry.load();
    let drone = super::require_live_drone(&reg, &id)?;
    let path = normalize_container_path(&query.path);

    let mime_out = state
        .container
        .exec(&drone.container_name, "sh", &["-c".to_string(), format!("file -b --mime-type {}", quote(&path))], Some(EXEC_TIMEOUT_MS))
        .await?;
    let mime = mime_out.stdout.trim().to_string();
    if !mime.starts_with("image/") {
        return Err(ApiError::Validation(format!("{path} is not an image (mime={mime})")));
    }

    let content_base64 = read_base64(&state, &drone, &query.path, THUMB_MAX_BYTES).await?;
    Ok(super::ok(serde_json::json!({"path": query.path, "mime": mime, "contentBase64": content_base64})).into_response())
}

async fn read_base64(
    state: &SharedState,
    drone: &drone_hub_protocol::Drone,
    path: &str,
    max_bytes: u64,
) -> Result<String, ApiError> {
    let normalized = normalize_container_path(path);
    let size_out = state
        .container
        .exec(&drone.container_name, "sh", &["-c".to_string(), format!("wc -c < {}", quote(&normalized))], Some(EXEC_TIMEOUT_MS))
        .await?;
    let size: u64 = size_out.stdout.trim().parse().unwrap_or(u64::MAX);
    if size > max_bytes {
        return Err(ApiError::PayloadTooLarge(format!("{path} exceeds {max_bytes} bytes")));
    }

    let out = state
        .container
        .exec(&drone.container_name, "sh", &["-c".to_string(), format!("base64 {}", quote(&normalized))], Some(EXEC_TIMEOUT_MS))
        .await?;
    Ok(out.stdout.split_whitespace().collect::<String>())
}
