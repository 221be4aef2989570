//! Terminal REST routes (§6 "Terminal", §4.10): open a session, poll its
//! output, and type input. The resumable streaming half lives in
//! `terminal_bridge.rs`.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use drone_hub_protocol::api::{TerminalInputRequest, TerminalOpenRequest, TerminalOpenResponse};
use serde::Deserialize;

use crate::app_state::SharedState;
use crate::error::ApiError;
use crate::transitions::custom_agent_tmux_session;

const SHELL_SESSION: &str = "shell";

/// Session-name safety (§4.10): `^[A-Za-z0-9._-]{1,64}$`, and only the
/// well-known shell session or a `drone-hub-chat-`-prefixed chat session —
/// never an arbitrary string an attacker could use to address another
/// container's tmux session by name collision.
pub fn validate_session_name(name: &str) -> Result<(), ApiError> {
    let len_ok = !name.is_empty() && name.chars().count() <= 64;
    let chars_ok = name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    let allowed = name == SHELL_SESSION || name.starts_with("drone-hub-chat-");
    if len_ok && chars_ok && allowed {
        Ok(())
    } else {
        Err(ApiError::Validation(format!("invalid terminal session name {name:?}")))
    }
}

/// `POST /drones/:id/terminal/open?mode=shell|agent&chat=`.
pub async fn open(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    body: Option<Json<TerminalOpenRequest>>,
) -> Result<Response, ApiError> {
    let req = body.map(|Json(r)| r).unwrap_or(TerminalOpenRequest { mode: None, chat: None });
    let mode = req.mode.unwrap_or_else(|| "shell".to_string());

    let reg = state.registry.load();
    let drone = super::require_live_drone(&reg, &id)?;

    let session = match mode.as_str() {
        "shell" => SHELL_SESSION.to_string(),
        "agent" => {
            let chat = req.chat.ok_or_else(|| ApiError::Validation("chat is required for mode=agent".to_string()))?;
            custom_agent_tmux_session(&chat)
        }
        other => return Err(ApiError::Validation(format!("unknown terminal mode {other:?}"))),
    };
    validate_session_name(&session)?;

    let cmd = if session == SHELL_SESSION { state.config.shell_cmd.clone() } else { "bash".to_string() };
    state
        .container
        .session_start(&drone.container_name, &session, &cmd, &[], true)
        .await?;

    Ok(super::ok(TerminalOpenResponse { session }).into_response())
}

#[derive(Deserialize)]
pub struct OutputQuery {
    #[serde(default)]
    since: Option<u64>,
    #[serde(default)]
    max_bytes: Option<u64>,
    #[serde(default)]
    tail_lines: Option<u32>,
}

/// `GET /drones/:id/terminal/:session/output?since=&maxBytes=&tailLines=`.
pub async fn output(
    State(state): State<SharedState>,
    Path((id, session)): Path<(String, String)>,
    Query(query): Query<OutputQuery>,
) -> Result<Response, ApiError> {
    validate_session_name(&session)?;
    let reg = state.registry.load();
    let drone = super::require_live_drone(&reg, &id)?;

    let daemon = state.daemon_client_for(&drone);
    let chunk = daemon
        .terminal_output(drone_hub_connector_core::daemon::TerminalOutputArgs {
            session,
            since: query.since,
            max_bytes: query.max_bytes,
            tail_lines: query.tail_lines,
        })
        .await?;

    Ok(super::ok(serde_json::json!({"text": chunk.text, "nextOffset": chunk.next_offset})).into_response())
}

/// `POST /drones/:id/terminal/:session/input`.
pub async fn input(
    State(state): State<SharedState>,
    Path((id, session)): Path<(String, String)>,
    Json(req): Json<TerminalInputRequest>,
) -> Result<Response, ApiError> {
    validate_session_name(&session)?;
    let reg = state.registry.load();
    let drone = super::require_live_drone(&reg, &id)?;

    let daemon = state.daemon_client_for(&drone);
    daemon.terminal_input(&session, &req.data).await?;
    Ok(super::ok(serde_json::json!({})).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_shell_and_chat_sessions() {
        assert!(validate_session_name("shell").is_ok());
        assert!(validate_session_name("drone-hub-chat-main").is_ok());
    }

    #[test]
    fn rejects_unprefixed_or_unsafe_names() {
        assert!(validate_session_name("other-container-session").is_err());
        assert!(validate_session_name("drone-hub-chat-../etc").is_err());
        assert!(validate_session_name("").is_err());
        assert!(validate_session_name(&"x".repeat(65)).is_err());
    }
}
