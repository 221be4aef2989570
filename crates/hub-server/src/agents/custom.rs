//! Custom agent delivery (§4.6): custom commands have no daemon job to
//! enqueue — the hub types the prompt directly into a dedicated tmux
//! session and trusts the shell on the other end.

use drone_hub_connector_core::container::ContainerAdapter;
use drone_hub_connector_core::error::ConnectorError;

use crate::transitions::custom_agent_tmux_session;

/// Ensure the chat's tmux session is running the custom command, then type
/// the prompt followed by Enter.
pub async fn send(
    adapter: &dyn ContainerAdapter,
    container: &str,
    chat_name: &str,
    command: &str,
    prompt: &str,
) -> Result<(), ConnectorError> {
    let session = custom_agent_tmux_session(chat_name);
    adapter
        .session_start(container, &session, "bash", &["-lc".to_string(), command.to_string()], true)
        .await?;
    adapter
        .session_type(container, &session, Some(prompt), &["Enter".to_string()])
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tmux_session_name_is_prefixed() {
        assert_eq!(custom_agent_tmux_session("main"), "drone-hub-chat-main");
    }
}
