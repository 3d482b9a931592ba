//! Supabase Realtime change channel.
//!
//! Speaks the Phoenix channel JSON protocol (v1) over a websocket: join the
//! table topic with a `postgres_changes` filter, forward every change as a
//! [`ChangeEvent`], heartbeat on the `phoenix` topic, and leave when the
//! [`ChannelHandle`] is released. Any socket failure ends the feed.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{
    ChangeEvent, ChangeFeed, ChangeFilter, ChangeKind, ChannelHandle, StoreError, StoreResult,
    REALTIME_TOPIC_PREFIX,
};
use crate::config::StoreConfig;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const JOIN_REF: &str = "1";
const HEARTBEAT_TOPIC: &str = "phoenix";
const EVENT_BUFFER: usize = 64;

#[derive(Clone)]
pub struct RealtimeClient {
    endpoint: String,
    access_token: String,
    join_timeout: Duration,
    heartbeat_interval: Duration,
}

impl RealtimeClient {
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        let endpoint = config
            .realtime_endpoint()
            .map_err(|error| StoreError::InvalidConfiguration(error.to_string()))?;
        Ok(Self {
            endpoint,
            access_token: config.anon_key.clone(),
            join_timeout: config.request_timeout,
            heartbeat_interval: config.heartbeat_interval,
        })
    }

    /// Connect, join the filtered table topic and wait for the join to be acknowledged.
    pub async fn subscribe(&self, filter: &ChangeFilter) -> StoreResult<ChangeFeed> {
        let topic = filter.realtime_topic();

        let (mut socket, _) = timeout(self.join_timeout, connect_async(self.endpoint.as_str()))
            .await
            .map_err(|_| StoreError::Timeout(self.join_timeout))?
            .map_err(|error| StoreError::Realtime(format!("websocket connect failed: {error}")))?;

        let join = join_message(&topic, filter, &self.access_token);
        socket
            .send(Message::Text(join.to_string()))
            .await
            .map_err(|error| StoreError::Realtime(format!("failed to send join: {error}")))?;

        timeout(self.join_timeout, await_join_reply(&mut socket, &topic))
            .await
            .map_err(|_| StoreError::Timeout(self.join_timeout))??;

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (handle, release) = ChannelHandle::new(topic.clone());
        tracing::info!("Joined realtime topic {}", topic);
        tokio::spawn(run_channel(
            socket,
            topic,
            events_tx,
            release,
            self.heartbeat_interval,
        ));

        Ok(ChangeFeed {
            events: events_rx,
            handle,
        })
    }
}

async fn await_join_reply(socket: &mut Socket, topic: &str) -> StoreResult<()> {
    while let Some(message) = socket.next().await {
        let message = message
            .map_err(|error| StoreError::Realtime(format!("websocket read failed: {error}")))?;
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(frame) = serde_json::from_str::<PhoenixFrame>(&text) else {
            tracing::debug!("Ignoring unparseable realtime frame during join");
            continue;
        };
        if frame.topic != topic {
            continue;
        }
        match frame.event.as_str() {
            "phx_reply" if frame.reference.as_deref() == Some(JOIN_REF) => {
                return match frame.payload.get("status").and_then(Value::as_str) {
                    Some("ok") => Ok(()),
                    _ => Err(StoreError::Realtime(format!(
                        "join rejected: {}",
                        frame.payload.get("response").unwrap_or(&frame.payload)
                    ))),
                };
            }
            "phx_error" | "phx_close" => {
                return Err(StoreError::Realtime(format!(
                    "channel closed during join ({})",
                    frame.event
                )));
            }
            _ => {}
        }
    }
    Err(StoreError::Realtime(
        "websocket closed before join was acknowledged".to_string(),
    ))
}

async fn run_channel(
    mut socket: Socket,
    topic: String,
    events: mpsc::Sender<ChangeEvent>,
    mut release: oneshot::Receiver<()>,
    heartbeat_interval: Duration,
) {
    let mut heartbeat = interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
    let mut next_ref: u64 = 2;
    let mut pending_heartbeat: Option<String> = None;

    loop {
        tokio::select! {
            _ = &mut release => {
                let leave = control_message(&topic, "phx_leave", &next_ref.to_string());
                let _ = socket.send(Message::Text(leave.to_string())).await;
                let _ = socket.close(None).await;
                tracing::info!("Left realtime topic {}", topic);
                break;
            }
            _ = heartbeat.tick() => {
                if pending_heartbeat.is_some() {
                    tracing::warn!("Realtime heartbeat unanswered; dropping channel {}", topic);
                    break;
                }
                let reference = next_ref.to_string();
                next_ref += 1;
                let beat = control_message(HEARTBEAT_TOPIC, "heartbeat", &reference);
                if let Err(error) = socket.send(Message::Text(beat.to_string())).await {
                    tracing::warn!("Realtime heartbeat failed on {}: {}", topic, error);
                    break;
                }
                pending_heartbeat = Some(reference);
            }
            incoming = socket.next() => match incoming {
                Some(Ok(Message::Text(text))) => match classify_frame(&topic, &text) {
                    Incoming::Change(event) => {
                        tracing::debug!("Realtime {:?} on {}", event.kind, event.table);
                        if events.send(event).await.is_err() {
                            tracing::debug!("Change feed receiver dropped; leaving {}", topic);
                            let leave = control_message(&topic, "phx_leave", &next_ref.to_string());
                            let _ = socket.send(Message::Text(leave.to_string())).await;
                            break;
                        }
                    }
                    Incoming::HeartbeatReply(reference) => {
                        if pending_heartbeat.as_deref() == Some(reference.as_str()) {
                            pending_heartbeat = None;
                        }
                    }
                    Incoming::Closed(reason) => {
                        tracing::warn!("Realtime channel {} closed by server: {}", topic, reason);
                        break;
                    }
                    Incoming::Ignored => {}
                },
                Some(Ok(Message::Close(frame))) => {
                    tracing::warn!("Realtime socket closed: {:?}", frame);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    tracing::warn!("Realtime socket error on {}: {}", topic, error);
                    break;
                }
                None => {
                    tracing::warn!("Realtime socket ended on {}", topic);
                    break;
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct PhoenixFrame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(default, rename = "ref")]
    reference: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Incoming {
    Change(ChangeEvent),
    HeartbeatReply(String),
    Closed(String),
    Ignored,
}

fn classify_frame(topic: &str, raw: &str) -> Incoming {
    let Ok(frame) = serde_json::from_str::<PhoenixFrame>(raw) else {
        return Incoming::Ignored;
    };

    if frame.topic == HEARTBEAT_TOPIC && frame.event == "phx_reply" {
        return frame
            .reference
            .map_or(Incoming::Ignored, Incoming::HeartbeatReply);
    }
    if frame.topic != topic {
        return Incoming::Ignored;
    }

    match frame.event.as_str() {
        "postgres_changes" => {
            let data = frame.payload.get("data").unwrap_or(&Value::Null);
            Incoming::Change(ChangeEvent {
                kind: data
                    .get("type")
                    .and_then(Value::as_str)
                    .map_or(ChangeKind::Other, ChangeKind::parse),
                table: table_name(data, topic),
            })
        }
        "INSERT" | "UPDATE" | "DELETE" => Incoming::Change(ChangeEvent {
            kind: ChangeKind::parse(&frame.event),
            table: table_name(&frame.payload, topic),
        }),
        "phx_error" => Incoming::Closed("channel error".to_string()),
        "phx_close" => Incoming::Closed("channel closed".to_string()),
        "system" if frame.payload.get("status").and_then(Value::as_str) == Some("error") => {
            Incoming::Closed(
                frame
                    .payload
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("system error")
                    .to_string(),
            )
        }
        _ => Incoming::Ignored,
    }
}

fn table_name(data: &Value, topic: &str) -> String {
    data.get("table")
        .and_then(Value::as_str)
        .map_or_else(
            || topic.trim_start_matches(REALTIME_TOPIC_PREFIX).to_string(),
            ToString::to_string,
        )
}

fn join_message(topic: &str, filter: &ChangeFilter, access_token: &str) -> Value {
    json!({
        "topic": topic,
        "event": "phx_join",
        "payload": {
            "config": {
                "broadcast": { "ack": false, "self": false },
                "presence": { "key": "" },
                "postgres_changes": [{
                    "event": filter.realtime_event(),
                    "schema": filter.schema,
                    "table": filter.table,
                }],
                "private": false,
            },
            "access_token": access_token,
        },
        "ref": JOIN_REF,
        "join_ref": JOIN_REF,
    })
}

fn control_message(topic: &str, event: &str, reference: &str) -> Value {
    json!({
        "topic": topic,
        "event": event,
        "payload": {},
        "ref": reference,
    })
}
