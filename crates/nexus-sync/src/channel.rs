use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};
use url::Url;

use nexus_api::types::{Pulse, ServiceStatus, TelemetryEntry};

pub const BASE_RECONNECT_DELAY_MS: u64 = 1_000;
pub const MAX_RECONNECT_DELAY_MS: u64 = 30_000;

const EVENT_FANOUT_CAPACITY: usize = 256;
const OUTBOUND_CAPACITY: usize = 64;

// ─── Frames ───────────────────────────────────────────────────────────────

/// A decoded inbound push frame, fanned out to all subscribers.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// Handshake ack from the server; carries no state.
    Connected,
    Pulse(Pulse),
    Health(Vec<ServiceStatus>),
    Telemetry(TelemetryEntry),
    Pong,
}

/// Outbound frames the layer may send. Best-effort: silently dropped when
/// the channel is not currently connected.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    TriggerRun {
        description: String,
        sources: Vec<String>,
    },
    Ping,
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Decode one inbound text frame. Unrecognized types and malformed
/// payloads yield `None`; they must never error the channel.
fn decode_frame(text: &str) -> Option<ChannelEvent> {
    let frame: RawFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(err) => {
            debug!("dropping undecodable push frame: {err}");
            return None;
        }
    };
    match frame.kind.as_str() {
        "connected" => Some(ChannelEvent::Connected),
        "agent_pulse" => match serde_json::from_value::<Pulse>(frame.data) {
            Ok(pulse) => Some(ChannelEvent::Pulse(pulse)),
            Err(err) => {
                debug!("dropping malformed agent_pulse: {err}");
                None
            }
        },
        "health_update" => match serde_json::from_value::<Vec<ServiceStatus>>(frame.data) {
            Ok(entries) => Some(ChannelEvent::Health(entries)),
            Err(err) => {
                debug!("dropping malformed health_update: {err}");
                None
            }
        },
        "telemetry_log" => match serde_json::from_value::<TelemetryEntry>(frame.data) {
            Ok(entry) => Some(ChannelEvent::Telemetry(entry)),
            Err(err) => {
                debug!("dropping malformed telemetry_log: {err}");
                None
            }
        },
        "pong" => Some(ChannelEvent::Pong),
        other => {
            debug!(kind = other, "dropping unrecognized push frame type");
            None
        }
    }
}

// ─── PushChannel ──────────────────────────────────────────────────────────

/// One live duplex connection to the server, scoped to a single workspace.
///
/// A background task owns the socket and reconnects automatically with
/// exponential backoff; the handle fans decoded frames out over a
/// broadcast channel and exposes the connected flag as a `watch` value.
/// The only externally visible failure signal is that flag — transient
/// transport errors self-heal and are never surfaced as error values.
///
/// One `PushChannel` is shared per workspace: consumers hold receivers
/// from [`subscribe`](Self::subscribe) / [`connected`](Self::connected),
/// while the owning shell keeps the handle itself and is alone allowed to
/// tear it down.
pub struct PushChannel {
    ws_base: Url,
    workspace_id: String,
    events_tx: broadcast::Sender<ChannelEvent>,
    connected_tx: Arc<watch::Sender<bool>>,
    outbound_tx: mpsc::Sender<OutboundFrame>,
    task: Option<JoinHandle<()>>,
}

impl PushChannel {
    /// Open the channel for one workspace. Must be called inside a Tokio
    /// runtime; the connection task starts immediately.
    pub fn connect(ws_base: Url, workspace_id: impl Into<String>) -> Self {
        let workspace_id = workspace_id.into();
        let (events_tx, _) = broadcast::channel(EVENT_FANOUT_CAPACITY);
        let (connected_tx, _) = watch::channel(false);
        let connected_tx = Arc::new(connected_tx);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);

        let task = tokio::spawn(run_loop(
            endpoint_for(&ws_base, &workspace_id),
            events_tx.clone(),
            connected_tx.clone(),
            outbound_rx,
        ));

        Self {
            ws_base,
            workspace_id,
            events_tx,
            connected_tx,
            outbound_tx,
            task: Some(task),
        }
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    /// Receive decoded inbound frames. Every subscriber sees every frame
    /// delivered after it subscribed.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events_tx.subscribe()
    }

    /// Observe the connected/disconnected flag.
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected_tx.borrow()
    }

    /// Transmit an outbound frame, best-effort. Dropped silently when the
    /// channel is disconnected or the outbound queue is full.
    pub fn send(&self, frame: OutboundFrame) {
        if !self.is_connected() {
            debug!("outbound frame dropped: channel disconnected");
            return;
        }
        if self.outbound_tx.try_send(frame).is_err() {
            debug!("outbound frame dropped: queue full or channel closing");
        }
    }

    /// Tear down the current connection and open a new one against a
    /// different workspace, with the backoff attempt counter reset.
    pub fn switch_workspace(&mut self, workspace_id: impl Into<String>) {
        self.teardown();
        self.workspace_id = workspace_id.into();
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        self.outbound_tx = outbound_tx;
        self.task = Some(tokio::spawn(run_loop(
            endpoint_for(&self.ws_base, &self.workspace_id),
            self.events_tx.clone(),
            self.connected_tx.clone(),
            outbound_rx,
        )));
    }

    /// Tear down the connection and cancel any pending reconnect timer.
    pub fn disconnect(&mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.connected_tx.send_replace(false);
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn endpoint_for(ws_base: &Url, workspace_id: &str) -> String {
    format!(
        "{}/ws/{workspace_id}",
        ws_base.as_str().trim_end_matches('/')
    )
}

/// Reconnect delay for the given attempt number: 1s doubling up to 30s.
fn reconnect_delay(attempt: u32) -> Duration {
    let ms = (BASE_RECONNECT_DELAY_MS << attempt.min(5)).min(MAX_RECONNECT_DELAY_MS);
    Duration::from_millis(ms)
}

// ─── Connection task ──────────────────────────────────────────────────────

async fn run_loop(
    endpoint: String,
    events_tx: broadcast::Sender<ChannelEvent>,
    connected_tx: Arc<watch::Sender<bool>>,
    mut outbound_rx: mpsc::Receiver<OutboundFrame>,
) {
    let mut attempt: u32 = 0;
    loop {
        let (mut ws, _) = match connect_async(endpoint.as_str()).await {
            Ok(pair) => pair,
            Err(err) => {
                warn!(%endpoint, attempt, "push channel connect failed: {err}");
                tokio::time::sleep(reconnect_delay(attempt)).await;
                attempt = attempt.saturating_add(1);
                continue;
            }
        };
        attempt = 0;
        connected_tx.send_replace(true);
        info!(%endpoint, "push channel connected");

        loop {
            tokio::select! {
                inbound = ws.next() => match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        if let Some(event) = decode_frame(&text) {
                            // No subscribers is fine; the frame is simply dropped.
                            let _ = events_tx.send(event);
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
                frame = outbound_rx.recv() => match frame {
                    Some(frame) => {
                        let text = match serde_json::to_string(&frame) {
                            Ok(text) => text,
                            Err(err) => {
                                debug!("skipping unencodable outbound frame: {err}");
                                continue;
                            }
                        };
                        if ws.send(WsMessage::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    // Handle dropped its sender: the channel is being replaced.
                    None => {
                        let _ = ws.close(None).await;
                        connected_tx.send_replace(false);
                        return;
                    }
                },
            }
        }

        connected_tx.send_replace(false);
        let _ = ws.close(None).await;
        warn!(%endpoint, "push channel disconnected, scheduling reconnect");
        tokio::time::sleep(reconnect_delay(attempt)).await;
        attempt = attempt.saturating_add(1);
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
