//! Terminal WebSocket Bridge (§4.10): a resumable relay between a browser
//! WebSocket and the in-container daemon's terminal SSE stream.
//!
//! `GET /drones/:id/terminal/:session/stream?since=&maxBytes=&token=`
//!
//! The bridge bootstraps from `since` bytes, sends a `ready` frame with the
//! resume offset, then relays `output`/`error` frames off the daemon's SSE
//! stream. If the upstream stream drops, it reconnects with exponential
//! backoff from the last offset it relayed, so the browser never has to
//! re-request history. Input typed into the socket is coalesced before
//! being forwarded to the daemon, to avoid one HTTP POST per keystroke.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use drone_hub_connector_core::daemon::TerminalStreamEvent;
use drone_hub_protocol::terminal::{TerminalClientFrame, TerminalServerFrame};

use crate::app_state::SharedState;
use crate::error::ApiError;
use crate::handlers::terminal::validate_session_name;

const RECONNECT_MIN: Duration = Duration::from_millis(40);
const RECONNECT_CAP: Duration = Duration::from_millis(1_800);
const RECONNECT_FACTOR: f64 = 1.8;
const RECONNECT_MAX_ATTEMPTS: u32 = 12;

const INPUT_FLUSH_BURST_BYTES: usize = 1024;
const INPUT_IDLE_FLUSH: Duration = Duration::from_millis(24);
const INPUT_MAX_CHUNK_BYTES: usize = 16 * 1024;
const INPUT_MAX_PENDING_BYTES: usize = 128 * 1024;

#[derive(Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    since: u64,
    #[serde(default)]
    max_bytes: Option<u64>,
    // Accepted for parity with the REST auth scheme; the auth middleware
    // already validated it before this handler runs.
    #[serde(default)]
    #[allow(dead_code)]
    token: Option<String>,
}

pub async fn stream(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    Path((id, session)): Path<(String, String)>,
    Query(query): Query<StreamQuery>,
) -> Result<Response, ApiError> {
    validate_session_name(&session)?;
    let reg = state.registry.load();
    let drone = crate::handlers::require_live_drone(&reg, &id)?;
    let _ = query.max_bytes;

    Ok(ws.on_upgrade(move |socket| run_bridge(state, drone, session, query.since, socket)))
}

async fn run_bridge(state: SharedState, drone: drone_hub_protocol::Drone, session: String, since: u64, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let daemon = state.dyn_daemon_client_for(&drone);

    let mut offset = since;
    let mut attempt: u32 = 0;
    let mut input_buf: Vec<u8> = Vec::new();
    let mut idle_deadline: Option<tokio::time::Instant> = None;

    'reconnect: loop {
        let upstream = match daemon.terminal_output_stream(&session, offset).await {
            Ok(s) => s,
            Err(err) => {
                if attempt >= RECONNECT_MAX_ATTEMPTS {
                    send_error(&mut ws_tx, &format!("terminal stream unavailable: {err}")).await;
                    break 'reconnect;
                }
                tokio::time::sleep(backoff_delay(attempt)).await;
                attempt += 1;
                continue 'reconnect;
            }
        };
        tokio::pin!(upstream);
        attempt = 0;

        loop {
            let idle_sleep = async {
                match idle_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;

                frame = upstream.next() => {
                    match frame {
                        Some(TerminalStreamEvent::Ready { offset_bytes }) => {
                            offset = offset_bytes;
                            if send_frame(&mut ws_tx, &TerminalServerFrame::Ready { offset_bytes }).await.is_err() {
                                break 'reconnect;
                            }
                        }
                        Some(TerminalStreamEvent::Output { offset_bytes, text }) => {
                            offset = offset_bytes;
                            if send_frame(&mut ws_tx, &TerminalServerFrame::Output { offset_bytes, text }).await.is_err() {
                                break 'reconnect;
                            }
                        }
                        Some(TerminalStreamEvent::Error { message }) => {
                            send_error(&mut ws_tx, &message).await;
                        }
                        None => {
                            // Upstream SSE closed; reconnect from the last offset we relayed.
                            continue 'reconnect;
                        }
                    }
                }

                client_msg = ws_rx.next() => {
                    match client_msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<TerminalClientFrame>(&text) {
                                Ok(TerminalClientFrame::Input { data }) => {
                                    push_input(&mut input_buf, data.as_bytes(), &mut idle_deadline);
                                    if should_flush_burst(&input_buf) {
                                        flush_input(&state, &drone, &session, &mut input_buf, &mut idle_deadline).await;
                                    }
                                }
                                Ok(TerminalClientFrame::Ping) => {
                                    if send_frame(&mut ws_tx, &TerminalServerFrame::Pong).await.is_err() {
                                        break 'reconnect;
                                    }
                                }
                                Err(_) => {}
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break 'reconnect,
                        Some(Ok(_)) => {}
                        Some(Err(_)) => break 'reconnect,
                    }
                }

                _ = idle_sleep => {
                    flush_input(&state, &drone, &session, &mut input_buf, &mut idle_deadline).await;
                }
            }
        }
    }
}

/// Append `bytes` to the pending input buffer, dropping the oldest overflow
/// if the 128KiB cap would be exceeded (a wedged daemon should not let a
/// browser tab grow this socket's buffer unboundedly), and (re)arm the
/// 24ms idle-flush timer.
fn push_input(buf: &mut Vec<u8>, bytes: &[u8], idle_deadline: &mut Option<tokio::time::Instant>) {
    if buf.len() + bytes.len() > INPUT_MAX_PENDING_BYTES {
        let overflow = buf.len() + bytes.len() - INPUT_MAX_PENDING_BYTES;
        buf.drain(0..overflow.min(buf.len()));
    }
    buf.extend_from_slice(bytes);
    *idle_deadline = Some(tokio::time::Instant::now() + INPUT_IDLE_FLUSH);
}

/// Control characters (CR, LF, TAB, ETX/Ctrl-C, EOT/Ctrl-D, ESC) flush
/// immediately rather than waiting for the idle timer, so interactive
/// control sequences aren't delayed.
fn is_flush_control_byte(b: u8) -> bool {
    matches!(b, b'\r' | b'\n' | b'\t' | 0x03 | 0x04 | 0x1b)
}

fn should_flush_burst(buf: &[u8]) -> bool {
    buf.len() >= INPUT_FLUSH_BURST_BYTES || buf.iter().any(|&b| is_flush_control_byte(b))
}

async fn flush_input(
    state: &SharedState,
    drone: &drone_hub_protocol::Drone,
    session: &str,
    buf: &mut Vec<u8>,
    idle_deadline: &mut Option<tokio::time::Instant>,
) {
    *idle_deadline = None;
    if buf.is_empty() {
        return;
    }
    let daemon = state.daemon_client_for(drone);
    for chunk in buf.chunks(INPUT_MAX_CHUNK_BYTES) {
        let text = String::from_utf8_lossy(chunk).into_owned();
        let _ = daemon.terminal_input(session, &text).await;
    }
    buf.clear();
}

fn backoff_delay(attempt: u32) -> Duration {
    let scaled = RECONNECT_MIN.as_secs_f64() * RECONNECT_FACTOR.powi(attempt as i32);
    Duration::from_secs_f64(scaled).min(RECONNECT_CAP)
}

async fn send_frame(
    ws_tx: &mut futures::stream::SplitSink<WebSocket, Message>,
    frame: &TerminalServerFrame,
) -> Result<(), ()> {
    let Ok(text) = serde_json::to_string(frame) else { return Err(()) };
    ws_tx.send(Message::Text(text.into())).await.map_err(|_| ())
}

async fn send_error(ws_tx: &mut futures::stream::SplitSink<WebSocket, Message>, message: &str) {
    let _ = send_frame(ws_tx, &TerminalServerFrame::Error { message: message.to_string() }).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_geometrically_and_caps() {
        let d0 = backoff_delay(0);
        let d1 = backoff_delay(1);
        assert_eq!(d0, RECONNECT_MIN);
        assert!(d1 > d0);
        assert!(backoff_delay(50) <= RECONNECT_CAP);
    }

    #[test]
    fn control_bytes_force_a_burst_flush() {
        assert!(should_flush_burst(b"hello\r"));
        assert!(!should_flush_burst(b"hello"));
        assert!(should_flush_burst(&vec![b'x'; INPUT_FLUSH_BURST_BYTES]));
    }

    #[test]
    fn pending_buffer_drops_oldest_bytes_past_the_cap() {
        let mut buf = vec![0u8; INPUT_MAX_PENDING_BYTES - 1];
        let mut idle = None;
        push_input(&mut buf, &[1, 2, 3], &mut idle);
        assert_eq!(buf.len(), INPUT_MAX_PENDING_BYTES);
        assert!(idle.is_some());
    }
}
