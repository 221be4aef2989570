//! Repo routes (§6 "Repo", §4.9): host working-tree inspection plus the
//! drone/host sync operations backed by `repo_pull.rs` and
//! `provisioning::seed_repo`.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use drone_hub_protocol::api::NameStatusEntry;
use serde::Deserialize;

use crate::app_state::SharedState;
use crate::error::ApiError;
use crate::{git, provisioning, repo_pull};

fn repo_root(drone: &drone_hub_protocol::Drone) -> Result<String, ApiError> {
    drone
        .repo_path
        .clone()
        .ok_or_else(|| ApiError::conflict("repo_unavailable", "drone has no seeded repo"))
}

/// `GET /drones/:id/repo/changes`: host working-tree status, tracked and
/// untracked, via `git status --porcelain=v1`.
pub async fn changes(State(state): State<SharedState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let reg = state.registry.load();
    let drone = super::require_live_drone(&reg, &id)?;
    let root = repo_root(&drone)?;

    let out = git::status_porcelain(&root).await;
    let entries: Vec<NameStatusEntry> = out
        .stdout
        .lines()
        .filter_map(|line| {
            if line.len() < 4 {
                return None;
            }
            let status = line[..2].trim().to_string();
            let path = line[3..].to_string();
            Some(NameStatusEntry { path, status: if status.is_empty() { "??".to_string() } else { status } })
        })
        .collect();

    Ok(super::ok(entries).into_response())
}

#[derive(Deserialize)]
pub struct DiffQuery {
    path: String,
    #[serde(default)]
    kind: DiffKind,
}

#[derive(Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    #[default]
    Unstaged,
    Staged,
}

/// `GET /drones/:id/repo/diff?path=&kind=staged|unstaged`: raw unified diff
/// for one host working-tree path.
pub async fn diff(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<DiffQuery>,
) -> Result<Response, ApiError> {
    let reg = state.registry.load();
    let drone = super::require_live_drone(&reg, &id)?;
    let root = repo_root(&drone)?;

    let out = git::diff_patch_for_path(&root, &query.path, query.kind == DiffKind::Staged).await;
    Ok(super::ok(serde_json::json!({"path": query.path, "diff": out.stdout})).into_response())
}

/// `GET /drones/:id/repo/pull/changes`: the cached drone-range preview
/// (`repo_pull::pull_preview`).
pub async fn pull_changes(State(state): State<SharedState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let reg = state.registry.load();
    let drone = super::require_live_drone(&reg, &id)?;
    let entries = repo_pull::pull_preview(&state, &drone.id).await?;
    Ok(super::ok(entries).into_response())
}

#[derive(Deserialize)]
pub struct PullDiffQuery {
    path: String,
}

/// `GET /drones/:id/repo/pull/diff?path=`: the container-side diff for one
/// path in the pending pull range, run live (not cached — a single path is
/// cheap and the preview list may be stale by the time a user opens it).
pub async fn pull_diff(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<PullDiffQuery>,
) -> Result<Response, ApiError> {
    let reg = state.registry.load();
    let drone = super::require_live_drone(&reg, &id)?;
    let repo = drone
        .repo
        .clone()
        .ok_or_else(|| ApiError::conflict("repo_unavailable", "drone has no seeded repo"))?;
    let base = repo.base_ref.clone().unwrap_or_else(|| "HEAD".to_string());

    let out = state
        .container
        .exec(
            &drone.container_name,
            "git",
            &["diff".to_string(), format!("{base}..HEAD"), "--".to_string(), query.path.clone()],
            Some(15_000),
        )
        .await?;

    Ok(super::ok(serde_json::json!({"path": query.path, "diff": out.stdout})).into_response())
}

/// `POST /drones/:id/repo/reseed`: re-runs the provisioning seed step
/// against the drone's existing `repoPath`, resetting `dvm.baseSha` and
/// `branch` the same way first-time provisioning does.
pub async fn reseed(State(state): State<SharedState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let reg = state.registry.load();
    let drone = super::require_live_drone(&reg, &id)?;
    let repo_path = repo_root(&drone)?;
    provisioning::seed_repo(&state, &drone, &repo_path)
        .await
        .map_err(ApiError::Internal)?;
    Ok(super::ok(serde_json::json!({})).into_response())
}

/// `POST /drones/:id/repo/pull` (§4.9): export/import/merge the container
/// repo onto the host working tree.
pub async fn pull(State(state): State<SharedState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let reg = state.registry.load();
    let drone = super::require_live_drone(&reg, &id)?;
    let result = repo_pull::pull(&state, &drone.id).await?;
    Ok(super::ok(result).into_response())
}
