//! Claude CLI command construction and session-continuity bookkeeping for
//! the Prompt Pipeline (§4.6).
//!
//! Unlike Codex/OpenCode, Claude's session id is a client-generated UUID
//! that is stable from the first turn — there is no defer-until-discovered
//! step, only "ensure a session id exists, reuse it forever."

use uuid::Uuid;

/// Generate a stable session id for a chat's first Claude turn. Call once;
/// afterwards the id is stored as `chat.claude_session_id` and must never
/// be regenerated.
pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Build the `claude` CLI invocation for a single non-interactive turn.
///
/// Mirrors `claude --print --dangerously-skip-permissions --session-id <id>`
/// from the prompt pipeline's per-agent shell script generation (§4.6).
pub fn build_command(session_id: &str, prompt: &str, model: Option<&str>) -> (String, Vec<String>) {
    let mut args = vec![
        "--print".to_string(),
        "--dangerously-skip-permissions".to_string(),
        "--session-id".to_string(),
        session_id.to_string(),
    ];
    if let Some(model) = model {
        args.push("--model".to_string());
        args.push(model.to_string());
    }
    args.push(prompt.to_string());
    ("claude".to_string(), args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_expected_argv() {
        let (bin, args) = build_command("sid-1", "hello", None);
        assert_eq!(bin, "claude");
        assert_eq!(
            args,
            vec!["--print", "--dangerously-skip-permissions", "--session-id", "sid-1", "hello"]
        );
    }

    #[test]
    fn includes_model_flag_when_set() {
        let (_, args) = build_command("sid-1", "hello", Some("opus"));
        assert!(args.contains(&"--model".to_string()));
        assert!(args.contains(&"opus".to_string()));
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(new_session_id(), new_session_id());
    }
}
