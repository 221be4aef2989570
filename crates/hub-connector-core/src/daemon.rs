//! The Daemon Client abstract interface (§4.4): an HTTP client for the
//! in-container daemon that runs jobs in tmux sessions.

use async_trait::async_trait;
use drone_hub_protocol::JobState;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::ConnectorError;

#[derive(Debug, Clone, Serialize)]
pub struct PromptEnqueueArgs {
    pub id: String,
    pub kind: String,
    pub cmd: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobStatus {
    pub state: JobState,
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TerminalOutputArgs {
    pub session: String,
    pub since: Option<u64>,
    pub max_bytes: Option<u64>,
    pub tail_lines: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct TerminalOutputChunk {
    pub text: String,
    pub next_offset: u64,
}

/// One frame off the daemon's `/v1/terminal/output/stream` SSE endpoint
/// (§4.10 Terminal WebSocket Bridge).
#[derive(Debug, Clone)]
pub enum TerminalStreamEvent {
    Ready { offset_bytes: u64 },
    Output { offset_bytes: u64, text: String },
    Error { message: String },
}

#[async_trait]
pub trait DaemonClient: Send + Sync {
    /// Readiness probe used by `wait_for_daemon_ready`.
    async fn status(&self) -> Result<(), ConnectorError>;

    async fn prompt_enqueue(&self, args: PromptEnqueueArgs) -> Result<(), ConnectorError>;

    async fn prompt_get(&self, id: &str) -> Result<JobStatus, ConnectorError>;

    async fn terminal_output(
        &self,
        args: TerminalOutputArgs,
    ) -> Result<TerminalOutputChunk, ConnectorError>;

    async fn terminal_input(&self, session: &str, data: &str) -> Result<(), ConnectorError>;

    /// Open a long-lived SSE stream of terminal output starting at `since`
    /// bytes, used by the terminal WebSocket bridge to relay live output
    /// without repolling (§4.10).
    async fn terminal_output_stream(
        &self,
        session: &str,
        since: u64,
    ) -> Result<BoxStream<'static, TerminalStreamEvent>, ConnectorError>;
}

/// Poll `status()` until ready or `deadline_ms` elapses, sleeping 250ms
/// between attempts, per §4.4.
pub async fn wait_for_daemon_ready(
    client: &dyn DaemonClient,
    deadline_ms: u64,
) -> Result<(), ConnectorError> {
    let start = tokio::time::Instant::now();
    loop {
        if client.status().await.is_ok() {
            return Ok(());
        }
        if start.elapsed().as_millis() as u64 >= deadline_ms {
            return Err(ConnectorError::Timeout(deadline_ms));
        }
        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    }
}
