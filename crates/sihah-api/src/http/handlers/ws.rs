//! WebSocket handler for real-time conversation event streaming.
//!
//! The `/ws/events` endpoint upgrades an HTTP connection to a WebSocket.
//! Once connected, the handler:
//!
//! - **Forwards events:** Subscribes to the [`EventBus`] on [`AppState`] and
//!   pushes every event whose topic starts with the `topic` query parameter
//!   (all events when absent) as a `{"topic": ..., "event": {...}}` frame.
//! - **Receives commands:** Parses incoming text frames as [`WsCommand`].
//!
//! Events are best-effort. A client too slow to keep up receives a
//! `{"type":"lagged","skipped":n}` frame and should re-read the affected
//! conversations over HTTP.
//!
//! [`EventBus`]: sihah_core::event::EventBus

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;

use sihah_core::event::PublishedEvent;

use crate::state::AppState;

/// Subscription parameters.
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Topic prefix, e.g. `conversation.<id>` or `agent.<id>`.
    #[serde(default)]
    pub topic: Option<String>,
}

/// Incoming command from a WebSocket client.
///
/// Unknown or malformed messages are logged and ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsCommand {
    /// Replace the topic prefix filter. `null` receives everything.
    Subscribe { topic: Option<String> },
    /// Keep-alive ping. Server responds with `{"type":"pong"}`.
    Ping,
}

/// Upgrade an HTTP request to a WebSocket connection for conversation events.
///
/// This is mounted at `/ws/events` in the router.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, params.topic))
}

fn matches_topic(filter: Option<&str>, topic: &str) -> bool {
    filter.is_none_or(|prefix| topic.starts_with(prefix))
}

fn event_frame(published: &PublishedEvent) -> serde_json::Result<String> {
    serde_json::to_string(&json!({
        "topic": published.topic,
        "event": published.event,
    }))
}

/// Core WebSocket connection handler.
///
/// Uses `tokio::select!` to multiplex between receiving events from the
/// bus and incoming WebSocket messages from the client, so both directions
/// share one task.
async fn handle_ws_connection(socket: WebSocket, state: AppState, mut filter: Option<String>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut event_rx = state.event_bus.subscribe();

    tracing::debug!(topic = ?filter, "WebSocket subscriber connected");

    loop {
        tokio::select! {
            event_result = event_rx.recv() => {
                match event_result {
                    Ok(published) => {
                        if !matches_topic(filter.as_deref(), &published.topic) {
                            continue;
                        }
                        match event_frame(&published) {
                            Ok(frame) => {
                                if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                                    break;
                                }
                            }
                            Err(err) => {
                                tracing::warn!("Failed to serialize event: {err}");
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "WebSocket subscriber lagged");
                        let notice = json!({ "type": "lagged", "skipped": n }).to_string();
                        if ws_sender.send(Message::Text(notice.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            msg_result = ws_receiver.next() => {
                match msg_result {
                    Some(Ok(Message::Text(text))) => {
                        process_command(&text, &mut ws_sender, &mut filter).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!("WebSocket receive error: {err}");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::debug!("WebSocket connection closed");
}

/// Parse and process a single command from the WebSocket client.
async fn process_command(
    text: &str,
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    filter: &mut Option<String>,
) {
    let cmd: WsCommand = match serde_json::from_str(text) {
        Ok(cmd) => cmd,
        Err(err) => {
            tracing::warn!(raw = %text, error = %err, "Ignoring malformed WebSocket command");
            return;
        }
    };

    match cmd {
        WsCommand::Subscribe { topic } => {
            tracing::debug!(topic = ?topic, "WebSocket subscription changed");
            *filter = topic;
        }
        WsCommand::Ping => {
            let pong = r#"{"type":"pong"}"#;
            if ws_sender.send(Message::Text(pong.into())).await.is_err() {
                tracing::debug!("Failed to send pong (client disconnecting)");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sihah_types::event::ConversationEvent;
    use uuid::Uuid;

    #[test]
    fn topic_prefix_filter() {
        assert!(matches_topic(None, "conversation.abc"));
        assert!(matches_topic(Some("conversation."), "conversation.abc"));
        assert!(!matches_topic(Some("agent."), "conversation.abc"));
    }

    #[test]
    fn frame_carries_topic_and_tagged_event() {
        let conversation_id = Uuid::now_v7();
        let event = ConversationEvent::TurnStarted { conversation_id };
        let published = PublishedEvent {
            topic: event.topic(),
            event,
        };
        let frame: serde_json::Value =
            serde_json::from_str(&event_frame(&published).unwrap()).unwrap();
        assert_eq!(frame["topic"], format!("conversation.{conversation_id}"));
        assert_eq!(frame["event"]["type"], "turn_started");
    }

    #[test]
    fn subscribe_command_parses() {
        let cmd: WsCommand =
            serde_json::from_str(r#"{"type":"subscribe","topic":"agent."}"#).unwrap();
        assert!(matches!(cmd, WsCommand::Subscribe { topic: Some(t) } if t == "agent."));
        let cmd: WsCommand = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(cmd, WsCommand::Ping));
    }
}
