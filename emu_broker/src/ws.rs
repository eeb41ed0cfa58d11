//! # WebSocket Control Channel
//!
//! A single `/ws` endpoint (§4.11) carrying a typed JSON request/response
//! protocol plus paired binary frames for bulk data (memory reads,
//! screenshots, watch updates): a text frame describing what the bytes are,
//! immediately followed by one `Message::Binary` frame carrying them. Every
//! client request may carry a `requestId`, echoed back on its response so a
//! caller with several requests in flight can match them up; subscription
//! management (`subscribe`/`unsubscribe`) has no request/response pairing of
//! its own since it only changes which backend events this connection
//! receives going forward.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use tokio::sync::mpsc;

use emu_core::address::Address;
use emu_core::events::BackendEvent;
use emu_core::registers::RegisterFile;
use emu_core::watch::{WatchRequest, WatchState, WatchUpdate};

use crate::state::SharedState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ClientMessage {
    #[serde(rename = "subscribe")]
    Subscribe { channel: String },
    #[serde(rename = "unsubscribe")]
    Unsubscribe { channel: String },
    #[serde(rename = "exec:pause")]
    ExecPause {
        #[serde(rename = "requestId", default)]
        request_id: Option<String>,
    },
    #[serde(rename = "exec:resume")]
    ExecResume {
        #[serde(rename = "requestId", default)]
        request_id: Option<String>,
    },
    #[serde(rename = "exec:step")]
    ExecStep {
        #[serde(rename = "requestId", default)]
        request_id: Option<String>,
    },
    #[serde(rename = "keys:send")]
    KeysSend {
        #[serde(rename = "requestId", default)]
        request_id: Option<String>,
        keys: Vec<String>,
        #[serde(rename = "delayMs", default)]
        delay_ms: Option<u64>,
    },
    #[serde(rename = "memory:watch")]
    MemoryWatch {
        #[serde(rename = "requestId", default)]
        request_id: Option<String>,
        address: String,
        len: usize,
        #[serde(rename = "intervalMs")]
        interval_ms: u64,
    },
    #[serde(rename = "memory:unwatch")]
    MemoryUnwatch {
        #[serde(rename = "requestId", default)]
        request_id: Option<String>,
        id: u64,
    },
    #[serde(rename = "memory:read")]
    MemoryRead {
        #[serde(rename = "requestId", default)]
        request_id: Option<String>,
        address: String,
        len: usize,
    },
    #[serde(rename = "registers:read")]
    RegistersRead {
        #[serde(rename = "requestId", default)]
        request_id: Option<String>,
    },
    #[serde(rename = "screenshot:take")]
    ScreenshotTake {
        #[serde(rename = "requestId", default)]
        request_id: Option<String>,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ServerMessage {
    #[serde(rename = "error")]
    Error {
        #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        message: String,
    },
    #[serde(rename = "exec:ack")]
    ExecAck {
        #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        op: String,
    },
    #[serde(rename = "registers:data")]
    RegistersData {
        #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        registers: RegisterFile,
    },
    #[serde(rename = "memory:data")]
    MemoryData {
        #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        address: String,
        len: usize,
    },
    #[serde(rename = "screenshot:data")]
    ScreenshotData {
        #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        format: String,
    },
    #[serde(rename = "memory:watch:ack")]
    MemoryWatchAck {
        #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        id: u64,
    },
    #[serde(rename = "memory:unwatch:ack")]
    MemoryUnwatchAck {
        #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        id: u64,
    },
    #[serde(rename = "memory:watch:update")]
    MemoryWatchUpdate { id: u64, checksum: String },
    #[serde(rename = "backend-event")]
    BackendEvent {
        channel: String,
        #[serde(flatten)]
        event: BackendEvent,
    },
    #[serde(rename = "lagged")]
    Lagged { channel: String, skipped: u64 },
}

/// Sends one `ServerMessage` as a text frame. Returns `false` if the socket
/// is gone and the caller should stop.
async fn send_json(socket: &mut WebSocket, message: &ServerMessage) -> bool {
    let Ok(payload) = serde_json::to_string(message) else {
        return true;
    };
    socket.send(Message::Text(payload.into())).await.is_ok()
}

/// Sends a text metadata frame immediately followed by a binary frame, the
/// pairing §4.11 uses for bulk data.
async fn send_binary_pair(socket: &mut WebSocket, metadata: &ServerMessage, bytes: Vec<u8>) -> bool {
    if !send_json(socket, metadata).await {
        return false;
    }
    socket.send(Message::Binary(bytes.into())).await.is_ok()
}

async fn handle_socket(mut socket: WebSocket, state: SharedState) {
    let backend = match state.holder.get().await {
        Ok(backend) => backend,
        Err(e) => {
            let _ = send_json(
                &mut socket,
                &ServerMessage::Error {
                    request_id: None,
                    message: e.to_string(),
                },
            )
            .await;
            return;
        }
    };

    let mut subscriptions: HashSet<String> = HashSet::new();
    let mut owned_watch_ids: HashSet<u64> = HashSet::new();
    let mut events = backend.subscribe_events();
    let (watch_tx, mut watch_rx) = mpsc::unbounded_channel::<WatchUpdate>();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let Some(channel) = subscribed_channel_for(&subscriptions, &event) else {
                            continue;
                        };
                        if !send_json(&mut socket, &ServerMessage::BackendEvent { channel, event }).await {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        for channel in subscriptions.iter().cloned().collect::<Vec<_>>() {
                            if !send_json(&mut socket, &ServerMessage::Lagged { channel, skipped }).await {
                                break;
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            update = watch_rx.recv() => {
                let Some(update) = update else { continue };
                let metadata = ServerMessage::MemoryWatchUpdate { id: update.id, checksum: update.checksum };
                if !send_binary_pair(&mut socket, &metadata, update.bytes).await {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_client_message(
                            &mut socket,
                            &state,
                            &backend,
                            &mut subscriptions,
                            &mut owned_watch_ids,
                            &watch_tx,
                            &text,
                        )
                        .await
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => continue,
                }
            }
        }
    }

    let mut watches = state.watches.lock().await;
    for id in owned_watch_ids {
        watches.remove(&id);
    }
}

/// Dispatches one parsed client message, returning `false` if the socket
/// closed while replying and the connection loop should stop.
async fn handle_client_message(
    socket: &mut WebSocket,
    state: &SharedState,
    backend: &std::sync::Arc<dyn emu_core::backend::Backend>,
    subscriptions: &mut HashSet<String>,
    owned_watch_ids: &mut HashSet<u64>,
    watch_tx: &mpsc::UnboundedSender<WatchUpdate>,
    text: &str,
) -> bool {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            return send_json(
                socket,
                &ServerMessage::Error {
                    request_id: None,
                    message: format!("malformed request: {e}"),
                },
            )
            .await;
        }
    };

    match message {
        ClientMessage::Subscribe { channel } => {
            subscriptions.insert(channel);
            true
        }
        ClientMessage::Unsubscribe { channel } => {
            subscriptions.remove(&channel);
            true
        }
        ClientMessage::ExecPause { request_id } => {
            reply_exec(socket, backend.pause().await, request_id, "pause").await
        }
        ClientMessage::ExecResume { request_id } => {
            reply_exec(socket, backend.resume().await, request_id, "resume").await
        }
        ClientMessage::ExecStep { request_id } => match backend.step().await {
            Ok(registers) => send_json(socket, &ServerMessage::RegistersData { request_id, registers }).await,
            Err(e) => send_error(socket, request_id, e).await,
        },
        ClientMessage::KeysSend { request_id, keys, delay_ms } => {
            reply_exec(socket, backend.send_keys_sequence(&keys, delay_ms).await, request_id, "keys:send").await
        }
        ClientMessage::MemoryRead { request_id, address, len } => {
            match Address::parse(&address) {
                Ok(addr) => match backend.read_memory(addr, len).await {
                    Ok(bytes) => {
                        let metadata = ServerMessage::MemoryData { request_id, address, len };
                        send_binary_pair(socket, &metadata, bytes).await
                    }
                    Err(e) => send_error(socket, request_id, e).await,
                },
                Err(e) => send_error(socket, request_id, e).await,
            }
        }
        ClientMessage::RegistersRead { request_id } => match backend.read_registers().await {
            Ok(registers) => send_json(socket, &ServerMessage::RegistersData { request_id, registers }).await,
            Err(e) => send_error(socket, request_id, e).await,
        },
        ClientMessage::ScreenshotTake { request_id } => match backend.screenshot().await {
            Ok((bytes, format)) => {
                let metadata = ServerMessage::ScreenshotData {
                    request_id,
                    format: format.extension().to_string(),
                };
                send_binary_pair(socket, &metadata, bytes).await
            }
            Err(e) => send_error(socket, request_id, e).await,
        },
        ClientMessage::MemoryWatch { request_id, address, len, interval_ms } => {
            match Address::parse(&address) {
                Ok(addr) => {
                    let id = state.next_watch_id.fetch_add(1, Ordering::SeqCst);
                    let request = WatchRequest { id, address: addr, len, interval_ms };
                    state.watches.lock().await.insert(id, WatchState::new(request, watch_tx.clone()));
                    owned_watch_ids.insert(id);
                    send_json(socket, &ServerMessage::MemoryWatchAck { request_id, id }).await
                }
                Err(e) => send_error(socket, request_id, e).await,
            }
        }
        ClientMessage::MemoryUnwatch { request_id, id } => {
            state.watches.lock().await.remove(&id);
            owned_watch_ids.remove(&id);
            send_json(socket, &ServerMessage::MemoryUnwatchAck { request_id, id }).await
        }
    }
}

async fn reply_exec(
    socket: &mut WebSocket,
    result: emu_core::error::Result<()>,
    request_id: Option<String>,
    op: &str,
) -> bool {
    match result {
        Ok(()) => send_json(socket, &ServerMessage::ExecAck { request_id, op: op.to_string() }).await,
        Err(e) => send_error(socket, request_id, e).await,
    }
}

async fn send_error(socket: &mut WebSocket, request_id: Option<String>, error: emu_core::error::EmuError) -> bool {
    send_json(
        socket,
        &ServerMessage::Error {
            request_id,
            message: error.to_string(),
        },
    )
    .await
}

/// `status` gets bare status transitions, `debug` gets everything else
/// (breakpoint/step/snapshot events); a connection only receives an event if
/// it has subscribed to the channel that wants it.
fn subscribed_channel_for(subscriptions: &HashSet<String>, event: &BackendEvent) -> Option<String> {
    let channel = if matches!(event, BackendEvent::Status { .. }) { "status" } else { "debug" };
    subscriptions.contains(channel).then(|| channel.to_string())
}
