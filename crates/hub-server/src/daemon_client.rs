//! Production `DaemonClient` (§4.4): a bearer-authenticated HTTP client
//! talking to the in-container daemon that runs jobs in tmux sessions.

use std::time::Duration;

use async_trait::async_trait;
use drone_hub_connector_core::daemon::{
    DaemonClient, JobStatus, PromptEnqueueArgs, TerminalOutputArgs, TerminalOutputChunk,
    TerminalStreamEvent,
};
use drone_hub_connector_core::error::ConnectorError;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::StatusCode;
use tracing::warn;

pub struct HttpDaemonClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpDaemonClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        HttpDaemonClient {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build daemon http client"),
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// 404 from the daemon means it predates an endpoint (stale daemon, §4.4)
    /// and the caller must reinstall it before retrying.
    fn classify_status(status: StatusCode) -> Option<ConnectorError> {
        match status {
            StatusCode::NOT_FOUND => Some(ConnectorError::DaemonStale),
            StatusCode::UNAUTHORIZED => Some(ConnectorError::Unauthorized),
            _ => None,
        }
    }
}

#[async_trait]
impl DaemonClient for HttpDaemonClient {
    async fn status(&self) -> Result<(), ConnectorError> {
        let resp = self
            .client
            .get(self.url("/status"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Self::classify_status(resp.status())
                .unwrap_or_else(|| ConnectorError::Other(format!("daemon status {}", resp.status()))))
        }
    }

    async fn prompt_enqueue(&self, args: PromptEnqueueArgs) -> Result<(), ConnectorError> {
        let resp = self
            .client
            .post(self.url("/prompts"))
            .bearer_auth(&self.token)
            .json(&args)
            .send()
            .await?;
        if resp.status().is_success() {
            return Ok(());
        }
        if let Some(err) = Self::classify_status(resp.status()) {
            if matches!(err, ConnectorError::DaemonStale) {
                warn!(component = "daemon_client", event = "daemon.stale_on_enqueue", prompt_id = %args.id);
            }
            return Err(err);
        }
        Err(ConnectorError::Other(format!(
            "prompt enqueue failed: {}",
            resp.status()
        )))
    }

    async fn prompt_get(&self, id: &str) -> Result<JobStatus, ConnectorError> {
        let resp = self
            .client
            .get(self.url(&format!("/prompts/{id}")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::classify_status(resp.status())
                .unwrap_or_else(|| ConnectorError::Other(format!("prompt get failed: {}", resp.status()))));
        }
        let status: JobStatus = resp.json().await?;
        Ok(status)
    }

    async fn terminal_output(
        &self,
        args: TerminalOutputArgs,
    ) -> Result<TerminalOutputChunk, ConnectorError> {
        let mut req = self
            .client
            .get(self.url(&format!("/terminal/{}/output", args.session)))
            .bearer_auth(&self.token);
        if let Some(since) = args.since {
            req = req.query(&[("since", since)]);
        }
        if let Some(max_bytes) = args.max_bytes {
            req = req.query(&[("maxBytes", max_bytes)]);
        }
        if let Some(tail_lines) = args.tail_lines {
            req = req.query(&[("tailLines", tail_lines)]);
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(Self::classify_status(resp.status())
                .unwrap_or_else(|| ConnectorError::Other(format!("terminal output failed: {}", resp.status()))));
        }

        #[derive(serde::Deserialize)]
        struct Raw {
            text: String,
            next_offset: u64,
        }
        let raw: Raw = resp.json().await?;
        Ok(TerminalOutputChunk {
            text: raw.text,
            next_offset: raw.next_offset,
        })
    }

    async fn terminal_input(&self, session: &str, data: &str) -> Result<(), ConnectorError> {
        let resp = self
            .client
            .post(self.url(&format!("/terminal/{session}/input")))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "data": data }))
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Self::classify_status(resp.status())
                .unwrap_or_else(|| ConnectorError::Other(format!("terminal input failed: {}", resp.status()))))
        }
    }

    async fn terminal_output_stream(
        &self,
        session: &str,
        since: u64,
    ) -> Result<BoxStream<'static, TerminalStreamEvent>, ConnectorError> {
        let resp = self
            .client
            .get(self.url(&format!("/terminal/{session}/output/stream")))
            .bearer_auth(&self.token)
            .query(&[("since", since)])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::classify_status(resp.status())
                .unwrap_or_else(|| ConnectorError::Other(format!("terminal stream failed: {}", resp.status()))));
        }

        let (tx, rx) = futures::channel::mpsc::unbounded();
        let mut bytes = resp.bytes_stream();
        tokio::spawn(async move {
            let mut buf = String::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.unbounded_send(TerminalStreamEvent::Error {
                            message: e.to_string(),
                        });
                        return;
                    }
                };
                buf.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(idx) = buf.find("\n\n") {
                    let frame = buf[..idx].to_string();
                    buf.drain(..idx + 2);
                    if let Some(event) = parse_sse_frame(&frame) {
                        if tx.unbounded_send(event).is_err() {
                            return;
                        }
                    }
                }
            }
        });
        Ok(rx.boxed())
    }
}

/// Parse one `event:`/`data:` SSE frame into a [`TerminalStreamEvent`].
/// Unknown event names and malformed JSON payloads are dropped silently —
/// the bridge only needs `ready`/`output`/`error`.
fn parse_sse_frame(frame: &str) -> Option<TerminalStreamEvent> {
    let mut event_name = None;
    let mut data = String::new();
    for line in frame.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            event_name = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.trim());
        }
    }
    let event_name = event_name?;
    let payload: serde_json::Value = serde_json::from_str(&data).ok()?;
    match event_name.as_str() {
        "ready" => Some(TerminalStreamEvent::Ready {
            offset_bytes: payload.get("offsetBytes")?.as_u64()?,
        }),
        "output" => Some(TerminalStreamEvent::Output {
            offset_bytes: payload.get("offsetBytes")?.as_u64()?,
            text: payload.get("text")?.as_str()?.to_string(),
        }),
        "error" => Some(TerminalStreamEvent::Error {
            message: payload
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("stream error")
                .to_string(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_strips_trailing_slash_on_base() {
        let client = HttpDaemonClient::new("http://127.0.0.1:9000/", "tok");
        assert_eq!(client.url("/status"), "http://127.0.0.1:9000/status");
    }

    #[test]
    fn classify_status_maps_404_to_stale() {
        assert!(matches!(
            HttpDaemonClient::classify_status(StatusCode::NOT_FOUND),
            Some(ConnectorError::DaemonStale)
        ));
    }

    #[test]
    fn classify_status_maps_401_to_unauthorized() {
        assert!(matches!(
            HttpDaemonClient::classify_status(StatusCode::UNAUTHORIZED),
            Some(ConnectorError::Unauthorized)
        ));
    }

    #[test]
    fn classify_status_other_returns_none() {
        assert!(HttpDaemonClient::classify_status(StatusCode::INTERNAL_SERVER_ERROR).is_none());
    }

    #[test]
    fn parses_ready_frame() {
        let event = parse_sse_frame("event:ready\ndata:{\"offsetBytes\":42}").unwrap();
        assert!(matches!(event, TerminalStreamEvent::Ready { offset_bytes: 42 }));
    }

    #[test]
    fn parses_output_frame() {
        let event = parse_sse_frame("event:output\ndata:{\"offsetBytes\":10,\"text\":\"hi\"}").unwrap();
        match event {
            TerminalStreamEvent::Output { offset_bytes, text } => {
                assert_eq!(offset_bytes, 10);
                assert_eq!(text, "hi");
            }
            _ => panic!("expected output event"),
        }
    }

    #[test]
    fn parses_multiline_data() {
        let event = parse_sse_frame("event:output\ndata:{\"offsetBytes\":1,\ndata:\"text\":\"a\"}").unwrap();
        assert!(matches!(event, TerminalStreamEvent::Output { .. }));
    }

    #[test]
    fn unknown_event_name_is_dropped() {
        assert!(parse_sse_frame("event:heartbeat\ndata:{}").is_none());
    }

    #[test]
    fn malformed_json_is_dropped() {
        assert!(parse_sse_frame("event:output\ndata:not json").is_none());
    }
}
