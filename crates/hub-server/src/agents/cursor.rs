//! Cursor CLI command construction (§4.6).
//!
//! Cursor's session id (`chatId`) is created once via `agent create-chat`
//! and then resumed on every subsequent turn — structurally identical to
//! Claude's discipline, but the id is server-minted rather than a
//! client-generated UUID.

/// Build the `agent create-chat` invocation used to mint a new `chatId`.
pub fn build_create_chat_command(bin: &str) -> (String, Vec<String>) {
    (bin.to_string(), vec!["create-chat".to_string()])
}

/// Build the per-turn invocation once a `chatId` is known.
///
/// Mirrors `agent --resume <id> -f --approve-mcps --print <prompt>`.
pub fn build_command(bin: &str, chat_id: &str, prompt: &str) -> (String, Vec<String>) {
    (
        bin.to_string(),
        vec![
            "--resume".to_string(),
            chat_id.to_string(),
            "-f".to_string(),
            "--approve-mcps".to_string(),
            "--print".to_string(),
            prompt.to_string(),
        ],
    )
}

/// Parse a new chat id out of `agent create-chat`'s stdout. The teacher's
/// CLI prints a bare id on the first line; tolerate trailing whitespace and
/// an optional `chatId: ` prefix some cursor-agent versions emit.
pub fn parse_chat_id(stdout: &str) -> Option<String> {
    let first_line = stdout.lines().next()?.trim();
    let id = first_line.strip_prefix("chatId:").map(str::trim).unwrap_or(first_line);
    (!id.is_empty()).then(|| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_create_chat_command() {
        let (bin, args) = build_create_chat_command("agent");
        assert_eq!(bin, "agent");
        assert_eq!(args, vec!["create-chat"]);
    }

    #[test]
    fn builds_resume_command() {
        let (_, args) = build_command("agent", "chat-1", "hello");
        assert_eq!(
            args,
            vec!["--resume", "chat-1", "-f", "--approve-mcps", "--print", "hello"]
        );
    }

    #[test]
    fn parses_bare_chat_id() {
        assert_eq!(parse_chat_id("chat-abc123\n"), Some("chat-abc123".to_string()));
    }

    #[test]
    fn parses_prefixed_chat_id() {
        assert_eq!(parse_chat_id("chatId: chat-abc123"), Some("chat-abc123".to_string()));
    }

    #[test]
    fn empty_stdout_yields_none() {
        assert_eq!(parse_chat_id(""), None);
        assert_eq!(parse_chat_id("\n\n"), None);
    }
}
