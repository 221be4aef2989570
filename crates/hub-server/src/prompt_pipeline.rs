//! Prompt Pipeline (§4.6): turns an HTTP prompt request into a queued or
//! in-flight daemon job, enforcing the session-continuity defer policy and
//! driving per-agent command construction.

use drone_hub_connector_core::container::ContainerAdapter;
use drone_hub_connector_core::daemon::{wait_for_daemon_ready, PromptEnqueueArgs};
use drone_hub_connector_core::error::ConnectorError;
use drone_hub_protocol::api::{AttachmentInput, PromptResponse};
use drone_hub_protocol::{Agent, BuiltinAgent, PendingPrompt, PromptState};
use uuid::Uuid;

use crate::agents;
use crate::app_state::SharedState;
use crate::attachments;
use crate::chat_registry;
use crate::error::ApiError;
use crate::oplock::DroneOpLock;
use crate::time;
use crate::transitions;

/// Maximum number of `PendingPrompt`s retained per chat (§3): a rolling
/// window, oldest entries dropped first.
const MAX_PENDING_PROMPTS_PER_CHAT: usize = 60;

const ATTACHMENTS_CONTAINER_DIR: &str = "/tmp/drone-hub-attachments";

#[derive(Debug, Default)]
pub struct EnqueuePromptRequest {
    pub prompt: String,
    pub prompt_id: Option<String>,
    pub attachments: Vec<AttachmentInput>,
    pub cwd: Option<String>,
}

/// `enqueuePrompt` (§4.6 steps 1-5): validates/generates the id, writes and
/// copies attachments, appends the `PendingPrompt`, and — if the defer policy
/// allows it — sends immediately.
pub async fn enqueue_prompt(
    state: &SharedState,
    drone_ref: &str,
    chat_name: &str,
    req: EnqueuePromptRequest,
) -> Result<PromptResponse, ApiError> {
    enqueue_prompt_with_ready_timeout(state, drone_ref, chat_name, req, None).await
}

/// Used by provisioning's seed-prompt step (§4.5 step 7), which needs an
/// extended daemon-ready wait (≥ 120s) because the container has only just
/// been created.
pub async fn enqueue_seed_prompt(
    state: &SharedState,
    drone_ref: &str,
    chat_name: &str,
    req: EnqueuePromptRequest,
    ready_timeout_ms: u64,
) -> Result<PromptResponse, ApiError> {
    enqueue_prompt_with_ready_timeout(state, drone_ref, chat_name, req, Some(ready_timeout_ms)).await
}

async fn enqueue_prompt_with_ready_timeout(
    state: &SharedState,
    drone_ref: &str,
    chat_name: &str,
    req: EnqueuePromptRequest,
    ready_timeout_ms: Option<u64>,
) -> Result<PromptResponse, ApiError> {
    let prompt_id = match req.prompt_id {
        Some(id) => {
            chat_registry::validate_prompt_id(&id)?;
            id
        }
        None => Uuid::new_v4().to_string(),
    };

    let snapshot = state.registry.load();
    let drone_id = crate::lookup::require_live_drone_id(&snapshot, drone_ref)?;
    let container_name = snapshot
        .drones
        .get(&drone_id)
        .map(|d| d.container_name.clone())
        .ok_or_else(|| ApiError::NotFound(format!("drone {drone_id}")))?;

    let written = if req.attachments.is_empty() {
        Vec::new()
    } else {
        let pairs: Vec<(String, String)> = req
            .attachments
            .iter()
            .map(|a| (a.filename.clone(), a.data_url.clone()))
            .collect();
        let written = attachments::write_attachments(&prompt_id, &pairs)
            .map_err(|e| ApiError::Validation(e.to_string()))?;
        for a in &written {
            let dest = container_attachment_path(&prompt_id, &a.filename);
            state
                .container
                .copy_to(&container_name, &a.host_path.to_string_lossy(), &dest)
                .await?;
        }
        written
    };
    let effective_prompt = format!("{}{}", req.prompt, attachments::footer(&written));

    let now = time::now_iso();
    let prompt_state = state.registry.update::<_, _, ApiError>(|reg| {
        let drone = reg
            .drones
            .get_mut(&drone_id)
            .ok_or_else(|| ApiError::NotFound(format!("drone {drone_id}")))?;
        let chat = chat_registry::ensure_chat(&mut drone.chats, chat_name, &now);

        let defer = transitions::should_defer_queued(chat);
        let prompt_state = if defer { PromptState::Queued } else { PromptState::Sending };

        chat.pending_prompts.push(PendingPrompt {
            id: prompt_id.clone(),
            at: now.clone(),
            prompt: effective_prompt.clone(),
            cwd: req.cwd.clone(),
            state: prompt_state,
            error: None,
            updated_at: now.clone(),
        });
        if chat.pending_prompts.len() > MAX_PENDING_PROMPTS_PER_CHAT {
            let excess = chat.pending_prompts.len() - MAX_PENDING_PROMPTS_PER_CHAT;
            chat.pending_prompts.drain(0..excess);
        }
        Ok(prompt_state)
    })?;

    if prompt_state == PromptState::Sending {
        if let Err(e) =
            send_prompt_to_chat_with_ready_timeout(state, &drone_id, chat_name, &prompt_id, ready_timeout_ms).await
        {
            mark_prompt_failed(state, &drone_id, chat_name, &prompt_id, &e.to_string())?;
        }
    }

    Ok(PromptResponse { id: prompt_id, state: prompt_state })
}

fn container_attachment_path(prompt_id: &str, filename: &str) -> String {
    format!("{ATTACHMENTS_CONTAINER_DIR}/{prompt_id}/{filename}")
}

fn mark_prompt_failed(
    state: &SharedState,
    drone_id: &str,
    chat_name: &str,
    prompt_id: &str,
    message: &str,
) -> Result<(), ApiError> {
    let now = time::now_iso();
    state.registry.update::<_, _, ApiError>(|reg| {
        if let Some(drone) = reg.drones.get_mut(drone_id) {
            if let Some(chat) = drone.chats.get_mut(chat_name) {
                if let Some(p) = chat.pending_prompts.iter_mut().find(|p| p.id == prompt_id) {
                    p.state = PromptState::Failed;
                    p.error = Some(message.to_string());
                    p.updated_at = now.clone();
                }
            }
        }
        Ok(())
    })
}

/// `sendPromptToChat` (§4.6 step 6-7): runs under the drone op lock, builds
/// the per-agent command, and submits it to the in-container daemon.
pub async fn send_prompt_to_chat(
    state: &SharedState,
    drone_id: &str,
    chat_name: &str,
    prompt_id: &str,
) -> Result<(), ApiError> {
    send_prompt_to_chat_with_ready_timeout(state, drone_id, chat_name, prompt_id, None).await
}

async fn send_prompt_to_chat_with_ready_timeout(
    state: &SharedState,
    drone_id: &str,
    chat_name: &str,
    prompt_id: &str,
    ready_timeout_ms: Option<u64>,
) -> Result<(), ApiError> {
    let key = DroneOpLock::drone_key(drone_id);
    let drone_id = drone_id.to_string();
    let chat_name = chat_name.to_string();
    let prompt_id = prompt_id.to_string();
    let state = state.clone();

    state
        .oplock
        .with_lock(&key, move || async move {
            let reg = state.registry.load();
            let drone = reg
                .drones
                .get(&drone_id)
                .ok_or_else(|| ApiError::NotFound(format!("drone {drone_id}")))?;
            let chat = drone
                .chats
                .get(&chat_name)
                .ok_or_else(|| ApiError::NotFound(format!("chat {chat_name}")))?;
            let pending = chat
                .pending_prompts
                .iter()
                .find(|p| p.id == prompt_id)
                .ok_or_else(|| ApiError::NotFound(format!("prompt {prompt_id}")))?
                .clone();

            if let Agent::Custom { command, .. } = &chat.agent {
                agents::custom::send(
                    &*state.container,
                    &drone.container_name,
                    &chat_name,
                    command,
                    &pending.prompt,
                )
                .await?;
                return Ok(());
            }

            let agent_kind = chat.inferred_agent_kind();
            let (bin, args) = match agent_kind {
                BuiltinAgent::Cursor => {
                    let bin = state.config.agent_cmd_overrides.resolve(BuiltinAgent::Cursor);
                    let chat_id = match chat.chat_id.clone() {
                        Some(id) => id,
                        None => {
                            let id = ensure_cursor_chat_id(&state, &drone.container_name, &bin).await?;
                            state.registry.update::<_, _, ApiError>(|reg| {
                                if let Some(d) = reg.drones.get_mut(&drone_id) {
                                    if let Some(c) = d.chats.get_mut(&chat_name) {
                                        chat_registry::set_chat_id_if_absent(c, id.clone());
                                    }
                                }
                                Ok(())
                            })?;
                            id
                        }
                    };
                    agents::cursor::build_command(&bin, &chat_id, &pending.prompt)
                }
                BuiltinAgent::Codex => {
                    drone_hub_connector_codex::build_command(
                        chat.codex_thread_id.as_deref(),
                        &pending.prompt,
                    )
                }
                BuiltinAgent::Claude => {
                    let session_id = match chat.claude_session_id.clone() {
                        Some(id) => id,
                        None => {
                            let id = drone_hub_connector_claude::new_session_id();
                            state.registry.update::<_, _, ApiError>(|reg| {
                                if let Some(d) = reg.drones.get_mut(&drone_id) {
                                    if let Some(c) = d.chats.get_mut(&chat_name) {
                                        chat_registry::set_claude_session_id_if_absent(c, id.clone());
                                    }
                                }
                                Ok(())
                            })?;
                            id
                        }
                    };
                    drone_hub_connector_claude::build_command(
                        &session_id,
                        &pending.prompt,
                        chat.model.as_deref(),
                    )
                }
                BuiltinAgent::Opencode => {
                    let bin = state.config.agent_cmd_overrides.resolve(BuiltinAgent::Opencode);
                    let title = transitions::opencode_session_title(&drone.name, &chat_name);
                    agents::opencode::build_command(
                        &bin,
                        &title,
                        chat.open_code_session_id.as_deref(),
                        &pending.prompt,
                    )
                }
            };

            let daemon = state.daemon_client_for(drone);
            enqueue_transcript_prompt(
                &state,
                &daemon,
                &drone.container_name,
                &prompt_id,
                bin,
                args,
                ready_timeout_ms,
            )
            .await?;
            Ok(())
        })
        .await
}

/// `agent create-chat` synchronously inside the container; the session id is
/// needed before the turn can be built, so this runs as a direct `exec`
/// rather than a daemon job.
async fn ensure_cursor_chat_id(
    state: &SharedState,
    container: &str,
    bin: &str,
) -> Result<String, ApiError> {
    let (cmd, args) = agents::cursor::build_create_chat_command(bin);
    let outcome = state.container.exec(container, &cmd, &args, Some(15_000)).await?;
    agents::cursor::parse_chat_id(&outcome.stdout)
        .ok_or_else(|| ApiError::Internal("cursor create-chat produced no chat id".to_string()))
}

/// `enqueueTranscriptPrompt` (§4.6 step 7): submit, and on a stale-daemon 404
/// reinstall the daemon and retry exactly once.
async fn enqueue_transcript_prompt(
    state: &SharedState,
    daemon: &crate::daemon_client::HttpDaemonClient,
    container: &str,
    prompt_id: &str,
    cmd: String,
    args: Vec<String>,
    ready_timeout_ms: Option<u64>,
) -> Result<(), ApiError> {
    let enqueue_args = PromptEnqueueArgs {
        id: prompt_id.to_string(),
        kind: "exec".to_string(),
        cmd,
        args,
    };

    let ready_timeout_ms = ready_timeout_ms.unwrap_or(state.config.daemon_ready_timeout_ms);
    wait_for_daemon_ready(daemon, ready_timeout_ms).await?;
    match daemon.prompt_enqueue(enqueue_args.clone()).await {
        Ok(()) => Ok(()),
        Err(ConnectorError::DaemonStale) => {
            upgrade_daemon(&*state.container, container).await?;
            wait_for_daemon_ready(daemon, state.config.daemon_ready_timeout_after_upgrade_ms).await?;
            daemon.prompt_enqueue(enqueue_args).await?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Hub-queued-prompt pumper (§4.6 last paragraph): processes `queued`
/// PendingPrompts for one chat, promoting each to `sending` as soon as the
/// defer policy allows it, up to `MAX_PUMP_ATTEMPTS` per invocation. Always
/// re-triggered after reconciliation changes session ids or finalizes a
/// prior prompt.
const MAX_PUMP_ATTEMPTS: u32 = 50;

pub async fn pump_pending_prompts(state: &SharedState, drone_id: &str, chat_name: &str) {
    for _ in 0..MAX_PUMP_ATTEMPTS {
        let snapshot = state.registry.load();
        let Some(chat) = snapshot.drones.get(drone_id).and_then(|d| d.chats.get(chat_name)) else {
            return;
        };
        let Some(candidate_id) = chat
            .pending_prompts
            .iter()
            .find(|p| p.state == PromptState::Queued && !transitions::should_defer_queued_excluding(chat, &p.id))
            .map(|p| p.id.clone())
        else {
            return;
        };

        let now = time::now_iso();
        let candidate_id_for_update = candidate_id.clone();
        let promoted = state
            .registry
            .update::<_, _, ApiError>(|reg| {
                let Some(drone) = reg.drones.get_mut(drone_id) else {
                    return Ok(false);
                };
                let Some(chat) = drone.chats.get_mut(chat_name) else {
                    return Ok(false);
                };
                let Some(p) = chat.pending_prompts.iter_mut().find(|p| p.id == candidate_id_for_update) else {
                    return Ok(false);
                };
                if p.state != PromptState::Queued {
                    return Ok(false);
                }
                p.state = PromptState::Sending;
                p.updated_at = now.clone();
                Ok(true)
            })
            .unwrap_or(false);

        if !promoted {
            continue;
        }

        if let Err(e) = send_prompt_to_chat(state, drone_id, chat_name, &candidate_id).await {
            let _ = mark_prompt_failed(state, drone_id, chat_name, &candidate_id, &e.to_string());
        }
    }
}

/// Reinstalling a stale in-container daemon (§4.4) is modeled as restarting
/// the container, which the production `dvm` tool re-provisions the daemon
/// binary on.
pub async fn upgrade_daemon(adapter: &dyn ContainerAdapter, container: &str) -> Result<(), ConnectorError> {
    adapter.start(container).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_attachment_path_is_namespaced_by_prompt() {
        assert_eq!(
            container_attachment_path("p1", "a.png"),
            "/tmp/drone-hub-attachments/p1/a.png"
        );
    }
}
