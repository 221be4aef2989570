//! Chat Registry (§4.8): ensures chat entries exist, infers agent kind from
//! whichever session-id field is populated, and validates chat config
//! updates. Session-id helpers are append-only — once a continuation handle
//! is non-empty it is never overwritten, preserving the teacher's
//! session-continuity discipline.

use drone_hub_protocol::{Agent, Chat};

use crate::error::ApiError;

/// Create `{createdAt, agent:{builtin,cursor}}` on first use; a no-op if the
/// chat already exists.
pub fn ensure_chat<'a>(chats: &'a mut std::collections::HashMap<String, Chat>, chat_name: &str, now: &str) -> &'a mut Chat {
    chats
        .entry(chat_name.to_string())
        .or_insert_with(|| Chat::new(Agent::default(), now))
}

const MAX_MODEL_LEN: usize = 160;

/// `setChatAgentConfig` validation (§4.8): model must be short and free of
/// control characters that would break the generated shell invocation.
pub fn validate_model(model: &str) -> Result<(), ApiError> {
    if model.chars().count() > MAX_MODEL_LEN {
        return Err(ApiError::Validation(format!(
            "model must be at most {MAX_MODEL_LEN} characters"
        )));
    }
    if model.chars().any(|c| c == '\r' || c == '\n' || c == '\t') {
        return Err(ApiError::Validation(
            "model must not contain CR/LF/TAB".to_string(),
        ));
    }
    Ok(())
}

/// Apply a chat config update: optionally replace the agent, optionally set
/// (or clear) the model. Called under the drone op lock by the HTTP handler.
pub fn set_chat_agent_config(
    chat: &mut Chat,
    agent: Option<Agent>,
    set_model: bool,
    model: Option<String>,
) -> Result<(), ApiError> {
    if let Some(agent) = agent {
        chat.agent = agent;
    }
    if set_model {
        if let Some(model) = &model {
            validate_model(model)?;
        }
        chat.model = model;
    }
    Ok(())
}

/// Append-only session-id setters (§4.8): a continuation handle is recorded
/// once and never overwritten, so a racing duplicate "ensure" never clobbers
/// the id another in-flight turn already minted.
pub fn set_chat_id_if_absent(chat: &mut Chat, chat_id: String) {
    if chat.chat_id.is_none() {
        chat.chat_id = Some(chat_id);
    }
}

pub fn set_codex_thread_id_if_absent(chat: &mut Chat, thread_id: String) {
    if chat.codex_thread_id.is_none() {
        chat.codex_thread_id = Some(thread_id);
    }
}

pub fn set_claude_session_id_if_absent(chat: &mut Chat, session_id: String) {
    if chat.claude_session_id.is_none() {
        chat.claude_session_id = Some(session_id);
    }
}

pub fn set_open_code_session_id_if_absent(chat: &mut Chat, session_id: String) {
    if chat.open_code_session_id.is_none() {
        chat.open_code_session_id = Some(session_id);
    }
}

/// Prompt id safety (§3): `^[A-Za-z0-9._-]{1,96}$`.
pub fn validate_prompt_id(id: &str) -> Result<(), ApiError> {
    let len_ok = !id.is_empty() && id.chars().count() <= 96;
    let chars_ok = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if len_ok && chars_ok {
        Ok(())
    } else {
        Err(ApiError::Validation(format!(
            "invalid prompt id: {id:?} (expected [A-Za-z0-9._-]{{1,96}})"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drone_hub_protocol::BuiltinAgent;

    #[test]
    fn ensure_chat_creates_cursor_default_once() {
        let mut chats = std::collections::HashMap::new();
        let c1 = ensure_chat(&mut chats, "main", "2026-01-01T00:00:00Z");
        assert_eq!(c1.inferred_agent_kind(), BuiltinAgent::Cursor);
        assert_eq!(chats.len(), 1);
        ensure_chat(&mut chats, "main", "2026-01-02T00:00:00Z");
        assert_eq!(chats.len(), 1);
        assert_eq!(chats["main"].created_at, "2026-01-01T00:00:00Z");
    }

    #[test]
    fn validate_model_rejects_control_chars() {
        assert!(validate_model("gpt-5").is_ok());
        assert!(validate_model("bad\nmodel").is_err());
        assert!(validate_model(&"x".repeat(161)).is_err());
    }

    #[test]
    fn validate_prompt_id_accepts_safe_ids() {
        assert!(validate_prompt_id("p1-abc_2.3").is_ok());
        assert!(validate_prompt_id("").is_err());
        assert!(validate_prompt_id("has space").is_err());
        assert!(validate_prompt_id(&"x".repeat(97)).is_err());
    }

    #[test]
    fn session_id_setters_never_overwrite() {
        let mut chat = Chat::new(Agent::default(), "2026-01-01T00:00:00Z");
        set_chat_id_if_absent(&mut chat, "c1".to_string());
        set_chat_id_if_absent(&mut chat, "c2".to_string());
        assert_eq!(chat.chat_id.as_deref(), Some("c1"));
    }

    #[test]
    fn set_chat_agent_config_validates_model_before_mutating() {
        let mut chat = Chat::new(Agent::default(), "2026-01-01T00:00:00Z");
        let err = set_chat_agent_config(&mut chat, None, true, Some("bad\ttab".to_string()));
        assert!(err.is_err());
        assert_eq!(chat.model, None);
    }
}
