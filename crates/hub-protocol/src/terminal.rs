//! Frame types for the resumable terminal WebSocket bridge (§4.10).

use serde::{Deserialize, Serialize};

/// Frames the hub sends to the WebSocket client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum TerminalServerFrame {
    Ready { offset_bytes: u64 },
    Output { offset_bytes: u64, text: String },
    Error { message: String },
    Pong,
}

/// Frames the WebSocket client sends to the hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum TerminalClientFrame {
    Input { data: String },
    Ping,
}
