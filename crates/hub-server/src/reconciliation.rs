//! Reconciliation Pipeline (§4.7): a bounded worker pool that reads back
//! daemon job status for in-flight prompts and turns them into transcript
//! `Turn`s, the same way the provisioning pool turns a `PendingDrone` into a
//! `Drone`.

use drone_hub_connector_core::daemon::JobStatus;
use drone_hub_protocol::{BuiltinAgent, JobState, PendingPrompt, PromptState, Turn};
use tracing::warn;

use crate::agents;
use crate::app_state::SharedState;
use crate::chat_registry;
use crate::error::ApiError;
use crate::prompt_pipeline;
use crate::time;
use crate::transitions;

/// Entry point for the reconcile worker pool (`state.reconcile`).
pub async fn reconcile_chat(state: SharedState, key: (String, String)) {
    let (drone_id, chat_name) = key;
    if let Err(e) = run(&state, &drone_id, &chat_name).await {
        warn!(component = "reconciliation", event = "reconciliation.failed", drone_id = %drone_id, chat = %chat_name, error = %e);
    }
}

/// Periodic driver (§2, §4.7): scans the registry for chats with any
/// pending prompt already submitted to the daemon (`Sending`/`Sent`) and
/// enqueues them onto the reconcile pool. Without this, a prompt that's been
/// handed to the daemon has no path back into a transcript `Turn` short of a
/// human hitting `/unstick` on that exact chat.
pub async fn enqueue_reconcile_for_in_flight_prompts(state: &SharedState) {
    let snapshot = state.registry.load();
    for (drone_id, drone) in snapshot.drones.iter() {
        for (chat_name, chat) in drone.chats.iter() {
            if matches!(chat.agent, drone_hub_protocol::Agent::Custom { .. }) {
                continue;
            }
            let has_in_flight = chat.pending_prompts.iter().any(|p| {
                matches!(p.state, PromptState::Sending | PromptState::Sent) && !chat.turns.iter().any(|t| t.id == p.id)
            });
            if has_in_flight {
                state.reconcile.enqueue((drone_id.clone(), chat_name.clone())).await;
            }
        }
    }
}

async fn run(state: &SharedState, drone_id: &str, chat_name: &str) -> Result<(), ApiError> {
    let snapshot = state.registry.load();
    let Some(drone) = snapshot.drones.get(drone_id) else {
        return Ok(());
    };
    let Some(chat) = drone.chats.get(chat_name) else {
        return Ok(());
    };
    if matches!(chat.agent, drone_hub_protocol::Agent::Custom { .. }) {
        return Ok(());
    }

    let candidates: Vec<PendingPrompt> = chat
        .pending_prompts
        .iter()
        .filter(|p| p.state != PromptState::Queued && !chat.turns.iter().any(|t| t.id == p.id))
        .cloned()
        .collect();
    if candidates.is_empty() {
        return Ok(());
    }

    let daemon = state.daemon_client_for(drone);
    let agent_kind = chat.inferred_agent_kind();
    let drone_name = drone.name.clone();
    let container_name = drone.container_name.clone();
    let mut any_changed = false;

    for p in candidates {
        let outcome = daemon.prompt_get(&p.id).await;
        let now = time::now_iso();
        let now_ms = time::now_ms();

        let update_result = match outcome {
            Err(_) => {
                let updated_at_ms = time::parse_ms(&p.updated_at);
                if transitions::stale_pending_prompt_state(
                    p.state,
                    updated_at_ms,
                    state.config.prompt_enqueue_timeout_ms as i64,
                    now_ms,
                ) {
                    Some(PendingUpdate::Fail(transitions::stale_failure_message(p.state)))
                } else {
                    None
                }
            }
            Ok(job) => reconcile_job(state, &agent_kind, &drone_name, &container_name, chat_name, job, &p).await,
        };

        let Some(update) = update_result else { continue };
        any_changed = true;
        apply_update(state, drone_id, chat_name, &p.id, &now, update)?;
    }

    if any_changed {
        prompt_pipeline::pump_pending_prompts(state, drone_id, chat_name).await;
    }
    Ok(())
}

enum PendingUpdate {
    Sent,
    Fail(String),
    Complete { output: String, session_id: Option<(SessionField, String)> },
}

#[derive(Clone, Copy)]
enum SessionField {
    CodexThread,
    OpenCodeSession,
}

#[allow(clippy::too_many_arguments)]
async fn reconcile_job(
    state: &SharedState,
    agent_kind: &BuiltinAgent,
    drone_name: &str,
    container_name: &str,
    chat_name: &str,
    job: JobStatus,
    pending: &PendingPrompt,
) -> Option<PendingUpdate> {
    match job.state {
        JobState::Queued | JobState::Running => Some(PendingUpdate::Sent),
        JobState::Done => {
            let stdout = job.stdout.unwrap_or_default();
            match agent_kind {
                BuiltinAgent::Codex => {
                    let parsed = drone_hub_connector_codex::parse_completed(&stdout);
                    match parsed.message {
                        Some(message) => Some(PendingUpdate::Complete {
                            output: message,
                            session_id: parsed.thread_id.map(|id| (SessionField::CodexThread, id)),
                        }),
                        None => Some(PendingUpdate::Fail(
                            "codex finished but no message was parsed.".to_string(),
                        )),
                    }
                }
                BuiltinAgent::Opencode => {
                    let title = transitions::opencode_session_title(drone_name, chat_name);
                    let session_id = discover_opencode_session(state, container_name, &title).await;
                    Some(PendingUpdate::Complete {
                        output: transitions::extract_builtin_output(Some(&stdout), job.stderr.as_deref()),
                        session_id: session_id.map(|id| (SessionField::OpenCodeSession, id)),
                    })
                }
                _ => Some(PendingUpdate::Complete {
                    output: transitions::extract_builtin_output(Some(&stdout), job.stderr.as_deref()),
                    session_id: None,
                }),
            }
        }
        JobState::Failed => match agent_kind {
            BuiltinAgent::Codex => {
                let stdout = job.stdout.clone().unwrap_or_default();
                let parsed = drone_hub_connector_codex::parse_completed(&stdout);
                match parsed.message {
                    Some(message) => Some(PendingUpdate::Complete {
                        output: message,
                        session_id: parsed.thread_id.map(|id| (SessionField::CodexThread, id)),
                    }),
                    None => {
                        let jsonl = job.stderr.unwrap_or(stdout);
                        Some(PendingUpdate::Fail(drone_hub_connector_codex::format_job_failure(&jsonl)))
                    }
                }
            }
            _ => Some(PendingUpdate::Fail(
                job.error
                    .or(job.stderr)
                    .unwrap_or_else(|| format!("prompt {} failed", pending.id)),
            )),
        },
    }
}

async fn discover_opencode_session(state: &SharedState, container_name: &str, title: &str) -> Option<String> {
    let bin = state.config.agent_cmd_overrides.resolve(BuiltinAgent::Opencode);
    let (cmd, args) = agents::opencode::build_session_list_command(&bin, 30);
    let outcome = state.container.exec(container_name, &cmd, &args, Some(10_000)).await.ok()?;
    agents::opencode::discover_session_id(&outcome.stdout, title)
}

fn apply_update(
    state: &SharedState,
    drone_id: &str,
    chat_name: &str,
    prompt_id: &str,
    now: &str,
    update: PendingUpdate,
) -> Result<(), ApiError> {
    let drone_id = drone_id.to_string();
    let chat_name = chat_name.to_string();
    let prompt_id = prompt_id.to_string();
    let now = now.to_string();
    state.registry.update::<_, _, ApiError>(|reg| {
        let Some(drone) = reg.drones.get_mut(&drone_id) else {
            return Ok(());
        };
        let Some(chat) = drone.chats.get_mut(&chat_name) else {
            return Ok(());
        };
        let Some(p) = chat.pending_prompts.iter_mut().find(|p| p.id == prompt_id) else {
            return Ok(());
        };

        match &update {
            PendingUpdate::Sent => {
                p.state = PromptState::Sent;
                p.updated_at = now.clone();
            }
            PendingUpdate::Fail(message) => {
                p.state = PromptState::Failed;
                p.error = Some(message.clone());
                p.updated_at = now.clone();
            }
            PendingUpdate::Complete { output, session_id } => {
                let prompt_at = p.at.clone();
                let prompt_text = p.prompt.clone();
                p.state = PromptState::Sent;
                p.updated_at = now.clone();
                chat.turns.push(Turn {
                    at: now.clone(),
                    prompt_at: Some(prompt_at),
                    completed_at: Some(now.clone()),
                    id: prompt_id.clone(),
                    prompt: prompt_text,
                    ok: true,
                    output: output.clone(),
                    error: None,
                });
                if let Some((field, id)) = session_id {
                    match field {
                        SessionField::CodexThread => chat_registry::set_codex_thread_id_if_absent(chat, id.clone()),
                        SessionField::OpenCodeSession => {
                            chat_registry::set_open_code_session_id_if_absent(chat, id.clone())
                        }
                    }
                }
            }
        }
        Ok(())
    })
}
