//! Chat routes (§6 "Chats", §4.6, §4.7): per-chat config, prompt submission,
//! pending-prompt inspection/unstick, transcript/log views, model discovery.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use drone_hub_protocol::api::{ChatConfigRequest, PromptRequest};
use drone_hub_protocol::BuiltinAgent;
use serde::Deserialize;

use crate::app_state::SharedState;
use crate::chat_registry;
use crate::error::ApiError;
use crate::prompt_pipeline::{self, EnqueuePromptRequest};
use crate::reconciliation;
use crate::time;
use crate::transitions::custom_agent_tmux_session;

/// `GET /drones/:id/chats`.
pub async fn list(State(state): State<SharedState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let reg = state.registry.load();
    let drone = super::require_live_drone(&reg, &id)?;
    Ok(super::ok(drone.chats).into_response())
}

/// `GET /drones/:id/chats/:chat`.
pub async fn get(
    State(state): State<SharedState>,
    Path((id, chat)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let reg = state.registry.load();
    let drone = super::require_live_drone(&reg, &id)?;
    let chat = drone.chats.get(&chat).cloned().ok_or_else(|| ApiError::NotFound(format!("chat {chat}")))?;
    Ok(super::ok(chat).into_response())
}

/// `POST /drones/:id/chats/:chat/config` (§4.8).
pub async fn config(
    State(state): State<SharedState>,
    Path((id, chat_name)): Path<(String, String)>,
    Json(req): Json<ChatConfigRequest>,
) -> Result<Response, ApiError> {
    let reg = state.registry.load();
    let drone_id = crate::lookup::require_live_drone_id(&reg, &id)?;
    let now = time::now_iso();

    state.registry.update::<_, _, ApiError>(|reg| {
        let drone = reg.drones.get_mut(&drone_id).ok_or_else(|| ApiError::NotFound(format!("drone {drone_id}")))?;
        let chat = chat_registry::ensure_chat(&mut drone.chats, &chat_name, &now);
        chat_registry::set_chat_agent_config(chat, req.agent.clone(), req.set_model.unwrap_or(false), req.model.clone())
    })?;

    Ok(super::ok(serde_json::json!({})).into_response())
}

/// `POST /drones/:id/chats/:chat/prompt` (§4.6).
pub async fn prompt(
    State(state): State<SharedState>,
    Path((id, chat_name)): Path<(String, String)>,
    Json(req): Json<PromptRequest>,
) -> Result<Response, ApiError> {
    let response = prompt_pipeline::enqueue_prompt(
        &state,
        &id,
        &chat_name,
        EnqueuePromptRequest {
            prompt: req.prompt,
            prompt_id: req.prompt_id,
            attachments: req.attachments.unwrap_or_default(),
            cwd: req.cwd,
        },
    )
    .await?;
    Ok(super::ok(response).into_response())
}

/// `GET /drones/:id/chats/:chat/pending`: the chat's `pendingPrompts` list.
pub async fn pending(
    State(state): State<SharedState>,
    Path((id, chat_name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let reg = state.registry.load();
    let drone = super::require_live_drone(&reg, &id)?;
    let chat = drone.chats.get(&chat_name).ok_or_else(|| ApiError::NotFound(format!("chat {chat_name}")))?;
    Ok(super::ok(chat.pending_prompts.clone()).into_response())
}

/// `POST /drones/:id/chats/:chat/pending/:promptId/unstick` (§12): kills the
/// chat's tmux session so a wedged agent process is forced to exit, then
/// runs one reconciliation pass to pick up whatever the daemon now reports.
pub async fn unstick(
    State(state): State<SharedState>,
    Path((id, chat_name, prompt_id)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    let reg = state.registry.load();
    let drone = super::require_live_drone(&reg, &id)?;
    let chat = drone.chats.get(&chat_name).ok_or_else(|| ApiError::NotFound(format!("chat {chat_name}")))?;
    if !chat.pending_prompts.iter().any(|p| p.id == prompt_id) {
        return Err(ApiError::NotFound(format!("prompt {prompt_id}")));
    }

    let session = custom_agent_tmux_session(&chat_name);
    let _ = state
        .container
        .exec(&drone.container_name, "tmux", &["kill-session".to_string(), "-t".to_string(), session], Some(10_000))
        .await;

    reconciliation::reconcile_chat(state.clone(), (drone.id.clone(), chat_name)).await;
    Ok(super::ok(serde_json::json!({})).into_response())
}

#[derive(Deserialize)]
pub struct TranscriptQuery {
    #[serde(default = "default_turn")]
    turn: String,
}

fn default_turn() -> String {
    "all".to_string()
}

/// `GET /drones/:id/chats/:chat/transcript?turn=last|all|N`: turns sorted by
/// `promptAt` ascending; `sort_by` is stable, so turns sharing a `promptAt`
/// keep their append order rather than being reordered by completion time
/// (§4.7/§8 ordering guarantee).
pub async fn transcript(
    State(state): State<SharedState>,
    Path((id, chat_name)): Path<(String, String)>,
    Query(query): Query<TranscriptQuery>,
) -> Result<Response, ApiError> {
    let reg = state.registry.load();
    let drone = super::require_live_drone(&reg, &id)?;
    let chat = drone.chats.get(&chat_name).ok_or_else(|| ApiError::NotFound(format!("chat {chat_name}")))?;

    let mut turns = chat.turns.clone();
    turns.sort_by(|a, b| a.prompt_at.cmp(&b.prompt_at));

    let selected = match query.turn.as_str() {
        "all" => turns,
        "last" => turns.into_iter().last().into_iter().collect(),
        n => {
            let count: usize = n.parse().map_err(|_| ApiError::Validation(format!("invalid turn selector {n:?}")))?;
            let skip = turns.len().saturating_sub(count);
            turns.into_iter().skip(skip).collect()
        }
    };

    Ok(super::ok(selected).into_response())
}

#[derive(Deserialize)]
pub struct OutputQuery {
    #[serde(default = "default_view")]
    view: String,
}

fn default_view() -> String {
    "log".to_string()
}

/// `GET /drones/:id/chats/:chat/output?view=log|screen`: `log` replays the
/// transcript as plain text; `screen` reads the chat's tmux pane live.
pub async fn output(
    State(state): State<SharedState>,
    Path((id, chat_name)): Path<(String, String)>,
    Query(query): Query<OutputQuery>,
) -> Result<Response, ApiError> {
    let reg = state.registry.load();
    let drone = super::require_live_drone(&reg, &id)?;
    let chat = drone.chats.get(&chat_name).ok_or_else(|| ApiError::NotFound(format!("chat {chat_name}")))?;

    if query.view == "screen" {
        let session = custom_agent_tmux_session(&chat_name);
        let read = state.container.session_read(&drone.container_name, &session, None, None, Some(400)).await?;
        return Ok(super::ok(serde_json::json!({"text": read.text})).into_response());
    }

    let mut turns = chat.turns.clone();
    turns.sort_by(|a, b| a.prompt_at.cmp(&b.prompt_at));
    let text = turns
        .iter()
        .map(|t| format!("> {}\n{}\n", t.prompt, t.output))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(super::ok(serde_json::json!({"text": text})).into_response())
}

#[derive(Deserialize, Default)]
pub struct ModelsQuery {
    #[serde(default)]
    refresh: bool,
}

/// `GET /drones/:id/chats/:chat/models?refresh`: per-agent model discovery,
/// cached 5 minutes (§5). Only Claude and Codex expose a model list; other
/// builtins and custom agents return an empty list (no discovery command).
pub async fn models(
    State(state): State<SharedState>,
    Path((id, chat_name)): Path<(String, String)>,
    Query(query): Query<ModelsQuery>,
) -> Result<Response, ApiError> {
    let reg = state.registry.load();
    let drone = super::require_live_drone(&reg, &id)?;
    let chat = drone.chats.get(&chat_name).ok_or_else(|| ApiError::NotFound(format!("chat {chat_name}")))?;
    let agent_kind = chat.inferred_agent_kind();

    let cache_key = format!("{}:{}", drone.id, agent_kind.as_str());
    if !query.refresh {
        if let Some(models) = state.model_cache.get(&cache_key) {
            return Ok(super::ok(models).into_response());
        }
    }

    let models = discover_models(&state, &drone.container_name, agent_kind).await;
    state.model_cache.insert(cache_key, models.clone());
    Ok(super::ok(models).into_response())
}

async fn discover_models(state: &SharedState, container: &str, agent: BuiltinAgent) -> Vec<String> {
    let script = match agent {
        BuiltinAgent::Claude => "claude models list --json 2>/dev/null",
        BuiltinAgent::Codex => "codex models list --json 2>/dev/null",
        BuiltinAgent::Cursor | BuiltinAgent::Opencode => return Vec::new(),
    };
    let Ok(out) = state.container.exec(container, "sh", &["-c".to_string(), script.to_string()], Some(10_000)).await else {
        return Vec::new();
    };
    serde_json::from_str::<Vec<String>>(out.stdout.trim()).unwrap_or_default()
}
