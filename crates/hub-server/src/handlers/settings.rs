//! Settings routes (§6 "Settings", §2 "Hub Env & Settings"): LLM provider
//! selection, encrypted API keys, the delete-action default, and a raw tail
//! of the hub's own log file for the operator UI.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use drone_hub_protocol::api::{DeleteActionSettingRequest, SettingsUpdateRequest};
use serde::Deserialize;

use crate::app_state::SharedState;
use crate::crypto;
use crate::error::ApiError;
use crate::paths;

/// `GET /api/settings`: the current settings with secrets redacted to a
/// boolean "is a key set" flag rather than decrypted.
pub async fn get(State(state): State<SharedState>) -> Response {
    let reg = state.registry.load();
    let settings = &reg.settings;
    super::ok(serde_json::json!({
        "llmProvider": settings.llm_provider,
        "openaiApiKeySet": settings.openai_api_key.is_some(),
        "geminiApiKeySet": settings.gemini_api_key.is_some(),
        "deleteActionDefault": settings.delete_action_default,
    }))
    .into_response()
}

/// `POST /api/settings/openai`: encrypts and stores the OpenAI API key.
pub async fn set_openai(
    State(state): State<SharedState>,
    Json(req): Json<SettingsUpdateRequest>,
) -> Result<Response, ApiError> {
    let api_key = req.api_key.ok_or_else(|| ApiError::Validation("apiKey is required".to_string()))?;
    state.registry.update::<_, _, ApiError>(|reg| {
        reg.settings.openai_api_key = Some(crypto::encrypt(&api_key));
        Ok(())
    })?;
    Ok(super::ok(serde_json::json!({})).into_response())
}

/// `POST /api/settings/gemini`: encrypts and stores the Gemini API key.
pub async fn set_gemini(
    State(state): State<SharedState>,
    Json(req): Json<SettingsUpdateRequest>,
) -> Result<Response, ApiError> {
    let api_key = req.api_key.ok_or_else(|| ApiError::Validation("apiKey is required".to_string()))?;
    state.registry.update::<_, _, ApiError>(|reg| {
        reg.settings.gemini_api_key = Some(crypto::encrypt(&api_key));
        Ok(())
    })?;
    Ok(super::ok(serde_json::json!({})).into_response())
}

/// `POST /api/settings/llm`: selects which provider's key backs model
/// discovery and naming helpers.
pub async fn set_llm(
    State(state): State<SharedState>,
    Json(req): Json<SettingsUpdateRequest>,
) -> Result<Response, ApiError> {
    let provider = req.provider.ok_or_else(|| ApiError::Validation("provider is required".to_string()))?;
    if provider != "openai" && provider != "gemini" {
        return Err(ApiError::Validation(format!("unknown provider {provider:?}")));
    }
    state.registry.update::<_, _, ApiError>(|reg| {
        reg.settings.llm_provider = Some(provider.clone());
        Ok(())
    })?;
    Ok(super::ok(serde_json::json!({})).into_response())
}

/// `POST /api/settings/delete-action`: default action (`archive` or
/// `delete`) pre-selected in the drone-removal UI.
pub async fn set_delete_action(
    State(state): State<SharedState>,
    Json(req): Json<DeleteActionSettingRequest>,
) -> Result<Response, ApiError> {
    if req.default != "archive" && req.default != "delete" {
        return Err(ApiError::Validation(format!("unknown default {:?}", req.default)));
    }
    state.registry.update::<_, _, ApiError>(|reg| {
        reg.settings.delete_action_default = Some(req.default.clone());
        Ok(())
    })?;
    Ok(super::ok(serde_json::json!({})).into_response())
}

#[derive(Deserialize)]
pub struct LogsQuery {
    #[serde(default = "default_lines")]
    lines: usize,
}

fn default_lines() -> usize {
    200
}

const MAX_LOG_LINES: usize = 5_000;

/// `GET /api/settings/hub/logs?lines=`: the tail of `hub.log`.
pub async fn hub_logs(Query(query): Query<LogsQuery>) -> Result<Response, ApiError> {
    let log_path = paths::log_dir().join("hub.log");
    let content = std::fs::read_to_string(&log_path).unwrap_or_default();
    let take = query.lines.min(MAX_LOG_LINES).max(1);
    let lines: Vec<&str> = content.lines().collect();
    let skip = lines.len().saturating_sub(take);
    let tail = lines[skip..].join("\n");
    Ok(super::ok(serde_json::json!({"text": tail})).into_response())
}
