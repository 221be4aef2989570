//! Codex CLI command construction and JSONL reconciliation parsing.
//!
//! The parsing half mirrors the two-pass JSONL walk used elsewhere in this
//! codebase for post-hoc transcript reconstruction: collect the pieces we
//! care about from a stream of heterogeneous JSON objects, one line at a
//! time, without assuming any single schema covers every line.

use serde_json::Value;

/// Build the `codex exec` invocation for a turn. The first turn in a chat
/// has no thread id yet; every subsequent turn resumes it (§4.6).
pub fn build_command(thread_id: Option<&str>, prompt: &str) -> (String, Vec<String>) {
    let mut args = vec!["exec".to_string()];
    if let Some(thread_id) = thread_id {
        args.push("resume".to_string());
        args.push(thread_id.to_string());
    }
    args.push("--json".to_string());
    args.push(prompt.to_string());
    ("codex".to_string(), args)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodexParseResult {
    pub thread_id: Option<String>,
    pub message: Option<String>,
}

/// Parse a completed job's stdout (newline-delimited JSON events) into a
/// thread id and the final assistant message, per §4.7.
pub fn parse_completed(jsonl: &str) -> CodexParseResult {
    let mut thread_id = None;
    let mut message = None;
    let mut streamed = String::new();
    let mut streaming_done = false;

    for line in jsonl.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(event): Result<Value, _> = serde_json::from_str(line) else {
            continue;
        };
        let event_type = event.get("type").and_then(Value::as_str).unwrap_or("");

        match event_type {
            "thread.started" => {
                if let Some(id) = event.get("thread_id").and_then(Value::as_str) {
                    thread_id = Some(id.to_string());
                }
            }
            "item.completed" | "item.started" => {
                if let Some(item) = event.get("item") {
                    let item_type = item.get("type").and_then(Value::as_str).unwrap_or("");
                    if matches!(item_type, "agent_message" | "assistant_message") {
                        if let Some(text) = item.get("text").and_then(Value::as_str) {
                            message = Some(text.to_string());
                        }
                    }
                }
            }
            "response.output_text.delta" => {
                if let Some(delta) = event.get("delta").and_then(Value::as_str) {
                    streamed.push_str(delta);
                }
            }
            "response.output_text.done" => {
                streaming_done = true;
            }
            _ => {}
        }
    }

    if message.is_none() && streaming_done && !streamed.is_empty() {
        message = Some(streamed);
    }

    CodexParseResult { thread_id, message }
}

/// Format a `failed` job's JSONL into a human-readable error, salvaging
/// whatever explicit error/message fields are present (§4.7).
pub fn format_job_failure(jsonl: &str) -> String {
    for line in jsonl.lines().rev() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(event): Result<Value, _> = serde_json::from_str(line) else {
            continue;
        };
        if let Some(err) = event.get("error").and_then(Value::as_str) {
            return err.to_string();
        }
        if let Some(msg) = event.get("message").and_then(Value::as_str) {
            return msg.to_string();
        }
    }
    "Codex turn started but exited before producing a response.".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_turn_has_no_resume() {
        let (bin, args) = build_command(None, "hi");
        assert_eq!(bin, "codex");
        assert_eq!(args, vec!["exec", "--json", "hi"]);
    }

    #[test]
    fn subsequent_turn_resumes_thread() {
        let (_, args) = build_command(Some("t1"), "hi");
        assert_eq!(args, vec!["exec", "resume", "t1", "--json", "hi"]);
    }

    #[test]
    fn parses_thread_id_and_message() {
        let jsonl = r#"{"type":"thread.started","thread_id":"t1"}
{"type":"item.completed","item":{"type":"agent_message","text":"done"}}"#;
        let result = parse_completed(jsonl);
        assert_eq!(result.thread_id.as_deref(), Some("t1"));
        assert_eq!(result.message.as_deref(), Some("done"));
    }

    #[test]
    fn parses_streamed_delta_message() {
        let jsonl = r#"{"type":"response.output_text.delta","delta":"hel"}
{"type":"response.output_text.delta","delta":"lo"}
{"type":"response.output_text.done"}"#;
        let result = parse_completed(jsonl);
        assert_eq!(result.message.as_deref(), Some("hello"));
    }

    #[test]
    fn empty_jsonl_yields_no_message() {
        let result = parse_completed("");
        assert_eq!(result.message, None);
    }

    #[test]
    fn formats_explicit_error() {
        let jsonl = r#"{"type":"thread.started","thread_id":"t1"}
{"type":"error","error":"rate limited"}"#;
        assert_eq!(format_job_failure(jsonl), "rate limited");
    }

    #[test]
    fn falls_back_to_lifecycle_only_message() {
        let jsonl = r#"{"type":"thread.started","thread_id":"t1"}"#;
        assert_eq!(
            format_job_failure(jsonl),
            "Codex turn started but exited before producing a response."
        );
    }
}
