//! Repo Pull Engine (§4.9): exports the container repo as a git bundle,
//! imports it onto a temporary host ref, and merges it into the host
//! working tree — the host-side half of the drone/host repo sync loop.

use drone_hub_connector_core::container::RepoExportArgs;
use drone_hub_protocol::api::{NameStatusEntry, PullResult};
use drone_hub_protocol::{Drone, LastPull, PullMode};

use crate::app_state::SharedState;
use crate::error::ApiError;
use crate::git;
use crate::oplock::DroneOpLock;
use crate::time;

fn repo_root(drone: &Drone) -> Result<String, ApiError> {
    drone
        .repo_path
        .clone()
        .ok_or_else(|| ApiError::conflict("repo_unavailable", "drone has no seeded repo"))
}

/// `POST /drones/:id/repo/pull` (§4.9 steps 1-7): runs under the drone op
/// lock so no other container-affecting operation races the export/import.
pub async fn pull(state: &SharedState, drone_id: &str) -> Result<PullResult, ApiError> {
    let key = DroneOpLock::drone_key(drone_id);
    let state = state.clone();
    let drone_id = drone_id.to_string();
    state
        .oplock
        .with_lock(&key, move || async move { run_pull(&state, &drone_id).await })
        .await
}

async fn run_pull(state: &SharedState, drone_id: &str) -> Result<PullResult, ApiError> {
    let reg = state.registry.load();
    let drone = reg
        .drones
        .get(drone_id)
        .ok_or_else(|| ApiError::NotFound(format!("drone {drone_id}")))?
        .clone();
    let repo_root = repo_root(&drone)?;

    if !git::is_clean(&repo_root).await {
        return Err(ApiError::conflict("dirty_host_repo", "host has local changes"));
    }

    recover_from_prior_pull(state, &drone, &repo_root).await?;

    let exported_head_sha = state.container.repo_head_sha(&drone.container_name).await?;

    let out_dir = crate::paths::repo_imports_dir();
    std::fs::create_dir_all(&out_dir).map_err(|e| ApiError::Internal(e.to_string()))?;
    let export = state
        .container
        .repo_export(
            &drone.container_name,
            RepoExportArgs {
                repo_path_in_container: drone.repo.as_ref().map(|r| r.dest.clone()).unwrap_or_default(),
                out_dir: out_dir.to_string_lossy().to_string(),
                base: None,
            },
        )
        .await;

    let export = match export {
        Ok(e) => e,
        Err(e) if e.to_string().contains("refusing to create empty bundle") => {
            record_last_pull(
                state,
                drone_id,
                PullMode::NoChanges,
                &exported_head_sha,
                None,
                false,
            )?;
            state.container.repo_set_base_sha(&drone.container_name, &exported_head_sha).await?;
            return Ok(PullResult {
                mode: PullMode::NoChanges,
                no_changes: Some(true),
                base_advanced: true,
            });
        }
        Err(e) => return Err(e.into()),
    };

    let result = import_and_merge(state, &drone, &repo_root, &export.exported_path, &exported_head_sha).await;
    let _ = std::fs::remove_file(&export.exported_path);
    result
}

/// §4.9 step 2: recover a base-sha state left behind by a prior pull before
/// starting this one.
async fn recover_from_prior_pull(state: &SharedState, drone: &Drone, repo_root: &str) -> Result<(), ApiError> {
    let Some(repo) = &drone.repo else { return Ok(()) };
    let Some(last_pull) = &repo.last_pull else { return Ok(()) };
    let Some(host_head) = git::head_sha(repo_root).await else { return Ok(()) };

    match last_pull.mode {
        PullMode::HostConflictsReady => {
            if let Some(exported) = &last_pull.exported_head_sha {
                if git::is_ancestor(repo_root, exported, &host_head).await {
                    state.container.repo_set_base_sha(&drone.container_name, exported).await?;
                }
            }
        }
        PullMode::BundleMergeNoCommit => {
            if let Some(exported) = &last_pull.exported_head_sha {
                if exported != &host_head {
                    if let Some(recovery_base) = git::merge_base(repo_root, &host_head, exported).await {
                        state.container.repo_set_base_sha(&drone.container_name, &recovery_base).await?;
                    }
                }
            }
        }
        PullMode::NoChanges => {}
    }
    Ok(())
}

async fn import_and_merge(
    state: &SharedState,
    drone: &Drone,
    repo_root: &str,
    bundle_path: &str,
    exported_head_sha: &str,
) -> Result<PullResult, ApiError> {
    let run_id = uuid::Uuid::new_v4().to_string();
    let drone_slug = drone.id.clone();
    let ref_name = format!("refs/drone/imports/{drone_slug}/{run_id}");

    let fetch = git::fetch_bundle_to_ref(repo_root, bundle_path, &ref_name).await;
    if !fetch.success {
        return Err(ApiError::conflict(
            "bundle_missing_prereq",
            format!("import failed, re-seed the repo: {}", fetch.stderr.trim()),
        ));
    }

    let merge = git::merge_no_commit(repo_root, &ref_name).await;
    let _ = git::update_ref_delete(repo_root, &ref_name).await;

    if merge.success {
        record_last_pull(
            state,
            &drone.id,
            PullMode::BundleMergeNoCommit,
            exported_head_sha,
            None,
            true,
        )?;
        state.container.repo_set_base_sha(&drone.container_name, exported_head_sha).await?;
        return Ok(PullResult {
            mode: PullMode::BundleMergeNoCommit,
            no_changes: None,
            base_advanced: true,
        });
    }

    let combined = format!("{}{}", merge.stdout, merge.stderr);
    let is_conflict = combined.contains("CONFLICT") || combined.contains("Automatic merge failed");
    if is_conflict {
        let status = git::diff_name_status(repo_root, "--diff-filter=U").await;
        let conflict_files: Vec<String> = status
            .stdout
            .lines()
            .filter_map(|l| l.split('\t').nth(1).map(str::to_string))
            .collect();

        record_last_pull(
            state,
            &drone.id,
            PullMode::HostConflictsReady,
            exported_head_sha,
            Some(conflict_files.clone()),
            false,
        )?;
        write_hub_error(state, &drone.id, "host repo has merge conflicts ready to resolve")?;

        return Err(ApiError::conflict_with_files(
            "host_conflicts_ready",
            "merge produced conflicts — resolve them in the host working tree, then commit",
            conflict_files,
        ));
    }

    let _ = git::merge_abort(repo_root).await;
    Err(ApiError::Internal(format!("merge failed: {}", merge.stderr.trim())))
}

fn record_last_pull(
    state: &SharedState,
    drone_id: &str,
    mode: PullMode,
    exported_head_sha: &str,
    conflict_files: Option<Vec<String>>,
    base_advanced: bool,
) -> Result<(), ApiError> {
    let now = time::now_iso();
    let drone_id = drone_id.to_string();
    let exported_head_sha = exported_head_sha.to_string();
    state.registry.update::<_, _, ApiError>(|reg| {
        if let Some(drone) = reg.drones.get_mut(&drone_id) {
            if let Some(repo) = &mut drone.repo {
                repo.last_pull = Some(LastPull {
                    mode,
                    at: now.clone(),
                    exported_head_sha: Some(exported_head_sha.clone()),
                    conflict_files: conflict_files.clone(),
                    base_advanced,
                });
            }
        }
        Ok(())
    })
}

fn write_hub_error(state: &SharedState, drone_id: &str, message: &str) -> Result<(), ApiError> {
    let now = time::now_iso();
    let drone_id = drone_id.to_string();
    let message = message.to_string();
    state.registry.update::<_, _, ApiError>(|reg| {
        if let Some(d) = reg.drones.get_mut(&drone_id) {
            d.hub = Some(drone_hub_protocol::HubMeta {
                phase: drone_hub_protocol::HubPhase::Error,
                message: message.clone(),
                prompt_id: None,
                updated_at: now.clone(),
            });
        }
        Ok(())
    })
}

/// Background poller: auto-clears a `host-conflicts-ready` hub error once
/// the host repo has no conflicted paths left (§4.9 last paragraph).
pub async fn clear_resolved_conflicts(state: &SharedState) {
    let reg = state.registry.load();
    let candidates: Vec<(String, String)> = reg
        .drones
        .values()
        .filter(|d| d.hub.as_ref().map(|h| h.phase == drone_hub_protocol::HubPhase::Error).unwrap_or(false))
        .filter_map(|d| d.repo_path.clone().map(|p| (d.id.clone(), p)))
        .collect();

    for (drone_id, repo_root) in candidates {
        let status = git::diff_counts(&repo_root).await;
        let conflicted = status
            .stdout
            .lines()
            .any(|l| l.starts_with('U') || l.contains("UU") || l.contains("AA"));
        if !conflicted {
            let _ = state.registry.update::<_, _, ApiError>(|reg| {
                if let Some(d) = reg.drones.get_mut(&drone_id) {
                    d.hub = None;
                }
                Ok(())
            });
        }
    }
}

/// `GET /drones/:id/repo/pull/changes` preview (§4.9 last paragraph): the
/// drone-range `base..HEAD` diff inside the container, augmented with a
/// host-side merge-tree preview when a merge is pending — cached 25s.
pub async fn pull_preview(state: &SharedState, drone_id: &str) -> Result<Vec<NameStatusEntry>, ApiError> {
    let reg = state.registry.load();
    let drone = reg
        .drones
        .get(drone_id)
        .ok_or_else(|| ApiError::NotFound(format!("drone {drone_id}")))?
        .clone();
    let repo = drone
        .repo
        .clone()
        .ok_or_else(|| ApiError::conflict("repo_unavailable", "drone has no seeded repo"))?;
    let repo_root = repo_root(&drone)?;
    let base = repo.base_ref.clone().unwrap_or_else(|| "HEAD".to_string());
    let host_head = git::head_sha(&repo_root).await.unwrap_or_default();

    let cache_key = format!("{drone_id}:{repo_root}:{host_head}:{base}");
    if let Some(cached) = state.pull_preview_cache.get(&cache_key) {
        return serde_json::from_value(cached).map_err(|e| ApiError::Internal(e.to_string()));
    }

    let out = state.container.exec(&drone.container_name, "git", &container_range_diff_args(&base), Some(15_000)).await?;
    let mut entries: Vec<NameStatusEntry> = parse_name_status(&out.stdout);

    if let Some(last_pull) = &repo.last_pull {
        if last_pull.mode == PullMode::BundleMergeNoCommit {
            if let Ok(export) = state
                .container
                .repo_export(
                    &drone.container_name,
                    RepoExportArgs {
                        repo_path_in_container: repo.dest.clone(),
                        out_dir: crate::paths::repo_imports_dir().to_string_lossy().to_string(),
                        base: None,
                    },
                )
                .await
            {
                let tmp_ref = format!("refs/drone/preview/{drone_id}");
                if git::fetch_bundle_to_ref(&repo_root, &export.exported_path, &tmp_ref).await.success {
                    let write_tree = git::merge_tree_write_tree(&repo_root, "HEAD", &tmp_ref).await;
                    if write_tree.success {
                        let tree = write_tree.stdout.trim();
                        let diff = git::diff_name_status(&repo_root, &format!("HEAD..{tree}")).await;
                        entries = parse_name_status(&diff.stdout);
                    }
                }
                let _ = git::update_ref_delete(&repo_root, &tmp_ref).await;
                let _ = std::fs::remove_file(&export.exported_path);
            }
        }
    }

    let value = serde_json::to_value(&entries).map_err(|e| ApiError::Internal(e.to_string()))?;
    state.pull_preview_cache.insert(cache_key, value);
    Ok(entries)
}

fn container_range_diff_args(base: &str) -> Vec<String> {
    vec![
        "diff".to_string(),
        "--name-status".to_string(),
        format!("{base}..HEAD"),
    ]
}

fn parse_name_status(raw: &str) -> Vec<NameStatusEntry> {
    raw.lines()
        .filter_map(|l| {
            let mut parts = l.splitn(2, '\t');
            let status = parts.next()?.trim().to_string();
            let path = parts.next()?.trim().to_string();
            if path.is_empty() {
                None
            } else {
                Some(NameStatusEntry { path, status })
            }
        })
        .collect()
}
