//! Provisioning Pipeline (§4.5): a bounded worker pool that turns a
//! `PendingDrone` into a live `Drone` — create/import the container, seed
//! its repo, clone chats from a source drone, and apply the seed's
//! agent/model/prompt.

use std::collections::HashMap;

use drone_hub_connector_core::container::{CreateArgs, RepoSeedArgs};
use drone_hub_connector_core::error::ConnectorError;
use drone_hub_protocol::{Chat, Drone, HubMeta, HubPhase, RepoMeta, SeedSpec};
use tracing::{info, warn};
use uuid::Uuid;

use crate::app_state::SharedState;
use crate::chat_registry;
use crate::error::ApiError;
use crate::oplock::DroneOpLock;
use crate::prompt_pipeline::{self, EnqueuePromptRequest};
use crate::time;

/// Stable, never-renamed container name derived from the drone's opaque id
/// (§3 "`containerName` is immutable for a drone's lifetime").
fn container_name_for(id: &str) -> String {
    format!("drone-hub-{id}")
}

/// Entry point for the provisioning worker pool. Never propagates an error —
/// failures are recorded on the pending/live record itself (§4.5 step 8) and
/// observed by polling, not by a return value.
pub async fn provision_drone_from_pending(state: SharedState, id: String) {
    let key = DroneOpLock::drone_key(&id);
    let state2 = state.clone();
    let id2 = id.clone();
    state
        .oplock
        .with_lock(&key, move || async move {
            if let Err(e) = run(&state2, &id2).await {
                warn!(component = "provisioning", event = "provisioning.failed", id = %id2, error = %e);
            }
        })
        .await;
}

/// Self-heal on startup (§4.5 "Self-heal"): re-queue every pending entry not
/// already in `error` phase.
pub async fn enqueue_provisioning_for_all_pending(state: &SharedState) {
    let reg = state.registry.load();
    for pending in reg.pending.values() {
        if pending.phase == drone_hub_protocol::PendingPhase::Error {
            continue;
        }
        state.provisioning.enqueue(pending.id.clone()).await;
    }
}

async fn run(state: &SharedState, id: &str) -> Result<(), String> {
    let Some(pending) = state.registry.load().pending.get(id).cloned() else {
        return Ok(());
    };

    write_pending_phase(
        state,
        id,
        drone_hub_protocol::PendingPhase::Creating,
        "Creating container…",
    )
    .map_err(|e| e.to_string())?;

    let container_name = container_name_for(id);
    let create_args = CreateArgs {
        name: container_name.clone(),
        container_port: pending.container_port,
        group: pending.group.clone(),
        repo_path: pending.repo_path.clone(),
        cwd: None,
        mkdir: false,
        build: pending.build,
    };

    match state.container.create(create_args.clone()).await {
        Ok(()) => {}
        Err(ConnectorError::AlreadyRunning(_)) => {
            info!(component = "provisioning", event = "provisioning.retry_as_import", id);
            state
                .container
                .import(create_args)
                .await
                .map_err(|e| e.to_string())?;
        }
        Err(e) => {
            write_pending_error(state, id, &e.to_string()).map_err(|e| e.to_string())?;
            return Err(e.to_string());
        }
    }

    let host_port = match discover_host_port(state, &container_name, pending.container_port).await {
        Ok(p) => p,
        Err(e) => {
            write_pending_error(state, id, &e).map_err(|e| e.to_string())?;
            return Err(e);
        }
    };

    let (drone, seed, clone_from, clone_chats) =
        move_pending_to_live(state, id, &container_name, host_port).map_err(|e| e.to_string())?;

    if let Some(repo_path) = &pending.repo_path {
        if let Err(e) = seed_repo(state, &drone, repo_path).await {
            write_hub_error(state, &drone.id, &e).ok();
            return Err(e);
        }
    }

    if let Some(source_id) = clone_from {
        if clone_chats != Some(false) {
            clone_chats_from(state, &source_id, &drone.id).map_err(|e| e.to_string())?;
        }
    }

    if let Some(seed) = seed {
        if let Err(e) = apply_seed(state, &drone.id, &seed).await {
            write_hub_error(state, &drone.id, &e).ok();
            return Err(e);
        }
    }

    clear_hub_status(state, &drone.id).map_err(|e| e.to_string())?;
    Ok(())
}

fn write_pending_phase(
    state: &SharedState,
    id: &str,
    phase: drone_hub_protocol::PendingPhase,
    message: &str,
) -> Result<(), ApiError> {
    let now = time::now_iso();
    state.registry.update::<_, _, ApiError>(|reg| {
        if let Some(p) = reg.pending.get_mut(id) {
            p.phase = phase;
            p.message = message.to_string();
            p.updated_at = now.clone();
        }
        Ok(())
    })
}

/// §4.5 step 8: "do not clear pending on non-container failures" — a
/// creation failure leaves the pending entry in place, marked `error`, so
/// the operator can retry or inspect it instead of losing the request.
fn write_pending_error(state: &SharedState, id: &str, message: &str) -> Result<(), ApiError> {
    let now = time::now_iso();
    state.registry.update::<_, _, ApiError>(|reg| {
        if let Some(p) = reg.pending.get_mut(id) {
            p.phase = drone_hub_protocol::PendingPhase::Error;
            p.message = message.to_string();
            p.error = Some(message.to_string());
            p.updated_at = now.clone();
        }
        Ok(())
    })
}

async fn discover_host_port(state: &SharedState, container_name: &str, container_port: u16) -> Result<u16, String> {
    let ports = state
        .container
        .ports(container_name)
        .await
        .map_err(|e| e.to_string())?;
    ports
        .iter()
        .find(|p| p.container_port == container_port)
        .map(|p| p.host_port)
        .ok_or_else(|| format!("container {container_name} did not publish port {container_port}"))
}

/// §4.5 steps 4-5 folded into one atomic registry update: insert the live
/// `Drone` (with `hub` already reflecting whether a repo seed is coming) and
/// remove the pending entry, returning its `seed`/`cloneFrom`/`cloneChats`
/// payload for the caller's subsequent steps.
#[allow(clippy::type_complexity)]
fn move_pending_to_live(
    state: &SharedState,
    id: &str,
    container_name: &str,
    host_port: u16,
) -> Result<(Drone, Option<SeedSpec>, Option<String>, Option<bool>), ApiError> {
    let now = time::now_iso();
    let container_name = container_name.to_string();
    let pending_id = id.to_string();
    state.registry.update::<_, _, ApiError>(|reg| {
        let p = reg
            .pending
            .remove(&pending_id)
            .ok_or_else(|| ApiError::NotFound(format!("pending drone {pending_id}")))?;

        let hub = if p.repo_path.is_some() {
            Some(HubMeta {
                phase: HubPhase::Seeding,
                message: "Seeding repo…".to_string(),
                prompt_id: None,
                updated_at: now.clone(),
            })
        } else {
            None
        };

        let drone = Drone {
            id: pending_id.clone(),
            name: p.name.clone(),
            group: p.group.clone(),
            container_name: container_name.clone(),
            container_port: p.container_port,
            host_port,
            token: Uuid::new_v4().to_string(),
            repo_path: None,
            repo: None,
            cwd: "/work".to_string(),
            chats: HashMap::new(),
            hub,
            created_at: p.created_at.clone(),
        };
        reg.drones.insert(pending_id.clone(), drone.clone());
        Ok((drone, p.seed.clone(), p.clone_from.clone(), p.clone_chats))
    })
}

pub async fn seed_repo(state: &SharedState, drone: &Drone, repo_path: &str) -> Result<(), String> {
    let repo_path = repo_path.to_string();
    let dest = "/work/repo".to_string();
    let branch = "dvm/work".to_string();
    let base_ref = "HEAD".to_string();

    state
        .container
        .repo_seed(
            &drone.container_name,
            RepoSeedArgs {
                host_path: repo_path.clone(),
                dest: dest.clone(),
                base_ref: base_ref.clone(),
                branch: branch.clone(),
                clean: true,
                timeout_ms: state.config.repo_seed_timeout_ms,
            },
        )
        .await
        .map_err(|e| e.to_string())?;

    let now = time::now_iso();
    let drone_id = drone.id.clone();
    state
        .registry
        .update::<_, _, ApiError>(|reg| {
            if let Some(d) = reg.drones.get_mut(&drone_id) {
                d.repo_path = Some(repo_path.clone());
                d.cwd = dest.clone();
                d.repo = Some(RepoMeta {
                    dest: dest.clone(),
                    branch: branch.clone(),
                    base_ref: Some(base_ref.clone()),
                    seeded_at: Some(now.clone()),
                    last_pull: None,
                });
            }
            Ok(())
        })
        .map_err(|e| e.to_string())
}

/// Copy `createdAt`/`agent`/`model`/`turns` from `source_id`'s chats onto
/// `dest_id` — never session/continuation ids, so the cloned drone starts
/// each agent's session discipline fresh (§4.5 step 6).
fn clone_chats_from(state: &SharedState, source_id: &str, dest_id: &str) -> Result<(), ApiError> {
    let source_id = source_id.to_string();
    let dest_id = dest_id.to_string();
    state.registry.update::<_, _, ApiError>(|reg| {
        let Some(source_chats) = reg.drones.get(&source_id).map(|d| d.chats.clone()) else {
            return Ok(());
        };
        let Some(dest) = reg.drones.get_mut(&dest_id) else {
            return Ok(());
        };
        for (name, chat) in source_chats {
            let cloned = Chat {
                created_at: chat.created_at,
                agent: chat.agent,
                model: chat.model,
                chat_id: None,
                codex_thread_id: None,
                claude_session_id: None,
                open_code_session_id: None,
                turns: chat.turns,
                pending_prompts: Vec::new(),
            };
            dest.chats.insert(name, cloned);
        }
        Ok(())
    })
}

async fn apply_seed(state: &SharedState, drone_id: &str, seed: &SeedSpec) -> Result<(), String> {
    if seed.agent.is_some() || seed.model.is_some() {
        let now = time::now_iso();
        let drone_id_owned = drone_id.to_string();
        let seed = seed.clone();
        state
            .registry
            .update::<_, _, ApiError>(|reg| {
                let Some(d) = reg.drones.get_mut(&drone_id_owned) else {
                    return Ok(());
                };
                let chat = chat_registry::ensure_chat(&mut d.chats, &seed.chat_name, &now);
                chat_registry::set_chat_agent_config(chat, seed.agent.clone(), seed.model.is_some(), seed.model.clone())?;
                Ok(())
            })
            .map_err(|e| e.to_string())?;
    }

    if let Some(prompt) = &seed.prompt {
        let req = EnqueuePromptRequest {
            prompt: prompt.clone(),
            prompt_id: seed.prompt_id.clone(),
            attachments: Vec::new(),
            cwd: seed.cwd.clone(),
        };
        prompt_pipeline::enqueue_seed_prompt(
            state,
            drone_id,
            &seed.chat_name,
            req,
            state.config.seed_prompt_ready_timeout_ms,
        )
        .await
        .map_err(|e| e.to_string())?;
    }

    Ok(())
}

fn write_hub_error(state: &SharedState, drone_id: &str, message: &str) -> Result<(), ApiError> {
    let now = time::now_iso();
    let drone_id = drone_id.to_string();
    let message = message.to_string();
    state.registry.update::<_, _, ApiError>(|reg| {
        if let Some(d) = reg.drones.get_mut(&drone_id) {
            d.hub = Some(HubMeta {
                phase: HubPhase::Error,
                message: message.clone(),
                prompt_id: None,
                updated_at: now.clone(),
            });
        }
        Ok(())
    })
}

fn clear_hub_status(state: &SharedState, drone_id: &str) -> Result<(), ApiError> {
    let drone_id = drone_id.to_string();
    state.registry.update::<_, _, ApiError>(|reg| {
        if let Some(d) = reg.drones.get_mut(&drone_id) {
            d.hub = None;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_name_is_stable_and_prefixed() {
        assert_eq!(container_name_for("d1"), "drone-hub-d1");
        assert_eq!(container_name_for("d1"), container_name_for("d1"));
    }
}
