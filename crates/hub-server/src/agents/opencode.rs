//! OpenCode CLI command construction and session discovery (§4.6, §4.7).
//!
//! OpenCode's session id is discovered after the fact, by listing recent
//! sessions and matching on a deterministic title the hub itself chose —
//! there is no "create session" round trip the way Cursor has one.

use serde::Deserialize;

/// Build the `opencode run` invocation. The session flag is only included
/// once a session id has been discovered by reconciliation.
pub fn build_command(bin: &str, title: &str, session_id: Option<&str>, prompt: &str) -> (String, Vec<String>) {
    let mut args = vec!["run".to_string(), "--title".to_string(), title.to_string()];
    if let Some(session_id) = session_id {
        args.push("--session".to_string());
        args.push(session_id.to_string());
    }
    args.push(prompt.to_string());
    (bin.to_string(), args)
}

/// Build the `opencode session list` invocation used for post-hoc
/// discovery (§4.7).
pub fn build_session_list_command(bin: &str, max_count: u32) -> (String, Vec<String>) {
    (
        bin.to_string(),
        vec![
            "session".to_string(),
            "list".to_string(),
            "--max-count".to_string(),
            max_count.to_string(),
            "--format".to_string(),
            "json".to_string(),
        ],
    )
}

#[derive(Debug, Clone, Deserialize)]
struct SessionListEntry {
    id: String,
    #[serde(default)]
    title: Option<String>,
}

/// Parse `opencode session list --format json` output, preferring the
/// session whose title matches the deterministic
/// `drone-hub-<drone>-<chat>` title the hub assigned on send.
pub fn discover_session_id(json: &str, preferred_title: &str) -> Option<String> {
    let entries: Vec<SessionListEntry> = serde_json::from_str(json).ok()?;
    entries
        .iter()
        .find(|e| e.title.as_deref() == Some(preferred_title))
        .or_else(|| entries.first())
        .map(|e| e.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_command_without_session() {
        let (bin, args) = build_command("opencode", "drone-hub-d1-main", None, "hi");
        assert_eq!(bin, "opencode");
        assert_eq!(args, vec!["run", "--title", "drone-hub-d1-main", "hi"]);
    }

    #[test]
    fn builds_command_with_session() {
        let (_, args) = build_command("opencode", "drone-hub-d1-main", Some("sess-1"), "hi");
        assert_eq!(
            args,
            vec!["run", "--title", "drone-hub-d1-main", "--session", "sess-1", "hi"]
        );
    }

    #[test]
    fn discovers_session_by_preferred_title() {
        let json = r#"[
            {"id":"s1","title":"other"},
            {"id":"s2","title":"drone-hub-d1-main"}
        ]"#;
        assert_eq!(discover_session_id(json, "drone-hub-d1-main"), Some("s2".to_string()));
    }

    #[test]
    fn falls_back_to_first_entry_when_title_unmatched() {
        let json = r#"[{"id":"s1","title":"other"}]"#;
        assert_eq!(discover_session_id(json, "drone-hub-d1-main"), Some("s1".to_string()));
    }

    #[test]
    fn malformed_json_yields_none() {
        assert_eq!(discover_session_id("not json", "x"), None);
    }
}
