//! Per-connection session logic (C5): join handshake, frame routing, the
//! outbound fan-in from the room's broadcast channel, and the cursor-move
//! rate limit. One `run` call owns one WebSocket connection end to end.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::protocol::{
    ClientFrame, CursorData, ErrorData, InitData, JoinRoomData, ServerFrame,
};
use crate::rate_limit::RateLimiter;
use crate::room::actor::Command;
use crate::room::RoomRegistry;

/// How long a freshly accepted socket has to send its `joinRoom` frame.
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);
/// Max frame size accepted from a client, guarding against runaway payloads.
const MAX_FRAME_BYTES: usize = 1024 * 1024;
/// Interval between server-initiated heartbeat pings.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(50);
/// Consecutive missed pongs before the session is closed as unresponsive.
const MAX_MISSED_HEARTBEATS: u32 = 3;
/// Bounded outbox depth; a session that falls this far behind is dropped.
const OUTBOX_CAPACITY: usize = 256;

/// Generates a deterministic per-user cursor color from their id, so the
/// same user gets the same color across reconnects without server-side storage.
fn user_color(user_id: &str) -> String {
    let hash = user_id
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
    let hue = hash % 360;
    format!("hsl({hue}, 70%, 60%)")
}

pub async fn run(
    stream: TcpStream,
    registry: Arc<RoomRegistry>,
    rate_limiter: Arc<RateLimiter>,
    cursor_max: usize,
    cursor_window_secs: u64,
) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "websocket handshake failed");
            return;
        }
    };

    if let Err(e) = handle(ws_stream, &registry, &rate_limiter, cursor_max, cursor_window_secs).await {
        debug!(error = %e, "session ended");
    }
}

async fn handle(
    ws_stream: WebSocketStream<TcpStream>,
    registry: &Arc<RoomRegistry>,
    rate_limiter: &Arc<RateLimiter>,
    cursor_max: usize,
    cursor_window_secs: u64,
) -> Result<(), String> {
    let (mut sink, mut stream) = ws_stream.split();

    // A rejected joinRoom (wrong password) closes only the room binding, not
    // the socket: reply with an error frame and wait for a fresh attempt.
    let (room_handle, user_id, color, join, joined) = loop {
        let join = match tokio::time::timeout(JOIN_TIMEOUT, stream.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => parse_join(&text)?,
            Ok(Some(Ok(_))) => return Err("expected text frame for joinRoom".to_string()),
            Ok(Some(Err(e))) => return Err(e.to_string()),
            Ok(None) => return Err("connection closed before joinRoom".to_string()),
            Err(_) => return Err("timed out waiting for joinRoom".to_string()),
        };

        let room_handle = registry
            .get_or_create(&join.room)
            .await
            .map_err(|e| e.to_string())?;
        let user_id = uuid::Uuid::new_v4().to_string();
        let color = user_color(&user_id);

        let (reply_tx, reply_rx) = oneshot::channel();
        room_handle
            .send(Command::Join {
                user_id: user_id.clone(),
                user_name: join.user_name.clone(),
                color: color.clone(),
                password: join.password.clone(),
                reply: reply_tx,
            })
            .await;
        match reply_rx.await {
            Ok(Ok(joined)) => break (room_handle, user_id, color, join, joined),
            Ok(Err(e)) => {
                registry.release(&join.room).await;
                let _ = sink.send(error_message(&e.to_string())).await;
            }
            Err(_) => {
                registry.release(&join.room).await;
                return Err("room actor did not respond to join".to_string());
            }
        }
    };

    let init = ServerFrame::Init(InitData {
        user_id: user_id.clone(),
        color: color.clone(),
        role: joined.role,
        elements: joined.elements,
        layers: joined.layers,
        camera: joined.camera,
        holders: joined.holders,
    });
    if sink
        .send(Message::Text(serde_json::to_string(&init).unwrap().into()))
        .await
        .is_err()
    {
        registry.release(&join.room).await;
        return Ok(());
    }

    // Bounded outbox: a session that can't keep up gets disconnected rather
    // than letting the queue (and memory) grow without bound.
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOX_CAPACITY);
    let closed = Arc::new(tokio::sync::Notify::new());
    let mut broadcast_rx = room_handle.subscribe();
    let forward_out_tx = out_tx.clone();
    let forward_user_id = user_id.clone();
    let forward_closed = Arc::clone(&closed);
    let forward_task = tokio::spawn(async move {
        loop {
            match broadcast_rx.recv().await {
                Ok(frame) => {
                    let text = serde_json::to_string(&frame).unwrap();
                    match forward_out_tx.try_send(Message::Text(text.into())) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            warn!(user = %forward_user_id, "outbox full, closing slow consumer");
                            forward_closed.notify_one();
                            break;
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => break,
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(user = %forward_user_id, skipped = n, "broadcast receiver lagged, requesting full sync");
                    forward_closed.notify_one();
                    break;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let writer_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let rate_key = format!("cursor:{user_id}");
    let role = joined.role;
    let mut display_name = join.user_name.clone();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await; // first tick fires immediately; consume it
    let mut missed_heartbeats = 0u32;

    loop {
        tokio::select! {
            _ = closed.notified() => {
                break;
            }
            message = stream.next() => {
                let Some(message) = message else { break };
                let message = match message {
                    Ok(m) => m,
                    Err(_) => break,
                };
                match message {
                    Message::Text(text) => {
                        if text.len() > MAX_FRAME_BYTES {
                            let _ = out_tx.send(error_message("frame too large")).await;
                            continue;
                        }
                        if is_pong_frame(&text) {
                            missed_heartbeats = 0;
                            continue;
                        }
                        if let Err(err) = dispatch(
                            &text,
                            &room_handle,
                            &user_id,
                            &mut display_name,
                            role,
                            rate_limiter,
                            &rate_key,
                            cursor_max,
                            cursor_window_secs,
                            &out_tx,
                        )
                        .await
                        {
                            let _ = out_tx.send(error_message(&err)).await;
                        }
                    }
                    Message::Ping(data) => {
                        let _ = out_tx.send(Message::Pong(data)).await;
                    }
                    Message::Pong(_) => {
                        missed_heartbeats = 0;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            _ = heartbeat.tick() => {
                missed_heartbeats += 1;
                if missed_heartbeats >= MAX_MISSED_HEARTBEATS {
                    warn!(user = %user_id, "closing session after missed heartbeats");
                    break;
                }
                let _ = out_tx.send(Message::Text(
                    serde_json::to_string(&ServerFrame::Ping).unwrap().into(),
                )).await;
            }
        }
    }

    forward_task.abort();
    writer_task.abort();
    rate_limiter.forget(&rate_key);
    room_handle.send(Command::Leave { user_id }).await;
    registry.release(&join.room).await;
    info!(room = %join.room, "session closed");
    Ok(())
}

fn error_message(message: &str) -> Message {
    let frame = ServerFrame::Error(ErrorData {
        message: message.to_string(),
    });
    Message::Text(serde_json::to_string(&frame).unwrap().into())
}

fn is_pong_frame(text: &str) -> bool {
    matches!(serde_json::from_str::<ClientFrame>(text), Ok(ClientFrame::Pong))
}

fn parse_join(text: &str) -> Result<JoinRoomData, String> {
    match serde_json::from_str::<ClientFrame>(text) {
        Ok(ClientFrame::JoinRoom(data)) => Ok(data),
        Ok(_) => Err("first frame must be joinRoom".to_string()),
        Err(e) => Err(format!("malformed joinRoom frame: {e}")),
    }
}

#[allow(clippy::too_many_arguments)]
async fn dispatch(
    text: &str,
    room: &crate::room::RoomHandle,
    user_id: &str,
    user_name: &mut String,
    role: crate::models::Role,
    rate_limiter: &RateLimiter,
    rate_key: &str,
    cursor_max: usize,
    cursor_window_secs: u64,
    out_tx: &mpsc::Sender<Message>,
) -> Result<(), String> {
    let frame: ClientFrame = serde_json::from_str(text).map_err(|e| format!("malformed frame: {e}"))?;

    match frame {
        ClientFrame::JoinRoom(_) => {
            return Err("already joined".to_string());
        }
        ClientFrame::AddElement { element } => {
            let (tx, rx) = oneshot::channel();
            room.send(Command::AddElement {
                user_id: user_id.to_string(),
                user_name: user_name.to_string(),
                element,
                role,
                reply: tx,
            })
            .await;
            await_reply(rx).await?;
        }
        ClientFrame::UpdateElement { patch } => {
            let (tx, rx) = oneshot::channel();
            room.send(Command::UpdateElement {
                user_id: user_id.to_string(),
                user_name: user_name.to_string(),
                patch,
                role,
                reply: tx,
            })
            .await;
            await_reply(rx).await?;
        }
        ClientFrame::MoveElement { patch } => {
            let (tx, rx) = oneshot::channel();
            room.send(Command::MoveElement {
                user_id: user_id.to_string(),
                user_name: user_name.to_string(),
                patch,
                role,
                reply: tx,
            })
            .await;
            await_reply(rx).await?;
        }
        ClientFrame::DeleteElement { id } => {
            let (tx, rx) = oneshot::channel();
            room.send(Command::DeleteElement {
                user_id: user_id.to_string(),
                user_name: user_name.to_string(),
                id,
                role,
                reply: tx,
            })
            .await;
            await_reply(rx).await?;
        }
        ClientFrame::AddLayer { layer } => {
            let (tx, rx) = oneshot::channel();
            room.send(Command::AddLayer {
                user_id: user_id.to_string(),
                user_name: user_name.to_string(),
                layer,
                role,
                reply: tx,
            })
            .await;
            await_reply(rx).await?;
        }
        ClientFrame::UpdateLayer { patch } => {
            let (tx, rx) = oneshot::channel();
            room.send(Command::UpdateLayer {
                user_id: user_id.to_string(),
                user_name: user_name.to_string(),
                patch,
                role,
                reply: tx,
            })
            .await;
            await_reply(rx).await?;
        }
        ClientFrame::DeleteLayer { id } => {
            let (tx, rx) = oneshot::channel();
            room.send(Command::DeleteLayer {
                user_id: user_id.to_string(),
                user_name: user_name.to_string(),
                id,
                role,
                reply: tx,
            })
            .await;
            await_reply(rx).await?;
        }
        ClientFrame::ReorderLayers { order } => {
            room.send(Command::ReorderLayers {
                user_id: user_id.to_string(),
                user_name: user_name.to_string(),
                order,
                role,
            })
            .await;
        }
        ClientFrame::UpdateCamera { camera } => {
            room.send(Command::UpdateCamera {
                user_id: user_id.to_string(),
                user_name: user_name.to_string(),
                camera,
            })
            .await;
        }
        ClientFrame::SelectShape { id, action } => {
            room.send(Command::SelectShape {
                user_id: user_id.to_string(),
                user_name: user_name.to_string(),
                id,
                action,
                role,
            })
            .await;
        }
        ClientFrame::DeselectShape { id } => {
            room.send(Command::DeselectShape {
                user_id: user_id.to_string(),
                id,
            })
            .await;
        }
        ClientFrame::CursorMove { x, y, world_x, world_y, action } => {
            if !rate_limiter.check(rate_key, cursor_max, cursor_window_secs) {
                return Ok(());
            }
            let frame = ServerFrame::CursorMoved(CursorData {
                user_id: user_id.to_string(),
                user_name: user_name.to_string(),
                color: user_color(user_id),
                x,
                y,
                world_x,
                world_y,
                action,
            });
            room.publish(frame);
        }
        ClientFrame::UpdateUserName { user_name: new_name } => {
            *user_name = new_name.clone();
            room.send(Command::SetUserName {
                user_id: user_id.to_string(),
                user_name: new_name,
            })
            .await;
        }
        ClientFrame::FullSync { elements, layers } => {
            let (tx, rx) = oneshot::channel();
            room.send(Command::FullSync {
                user_id: user_id.to_string(),
                user_name: user_name.to_string(),
                elements,
                layers,
                role,
                reply: tx,
            })
            .await;
            await_reply(rx).await?;
        }
        ClientFrame::ClearCanvas => {
            let (tx, rx) = oneshot::channel();
            room.send(Command::ClearCanvas {
                user_id: user_id.to_string(),
                user_name: user_name.to_string(),
                role,
                reply: tx,
            })
            .await;
            await_reply(rx).await?;
        }
        ClientFrame::Ping => {
            let _ = out_tx.send(Message::Text(
                serde_json::to_string(&ServerFrame::Pong).unwrap().into(),
            )).await;
        }
        ClientFrame::Pong => {
            // handled before dispatch; reaching here means it raced the
            // heartbeat-reset fast path, which is harmless.
        }
    }
    Ok(())
}

async fn await_reply(
    rx: oneshot::Receiver<Result<(), crate::error::RoomError>>,
) -> Result<(), String> {
    match rx.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("room actor did not respond".to_string()),
    }
}
