//! Push channel worker: a JSON-frame websocket scoped to one room.
//!
//! Frames are `{"event": ..., "data": ...}`. After connecting the client
//! announces itself (`auth`) and joins its room (`join_room`); from then on
//! the server delivers counterpart messages as `room_message` events and
//! accepts `send_room_message` for realtime fan-out. Reconnection is handled
//! here, not by the conversation logic: a bounded number of attempts with a
//! fixed backoff, after which the channel reports itself exhausted and the
//! conversation falls back to polling.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use super::{MessageDto, PushAuth, PushCommand, PushEvent, PushHandle};

pub(crate) const PUSH_RETRY_MAX: u32 = 5;
pub(crate) const PUSH_RETRY_BACKOFF_MS: u64 = 1000;

pub(crate) fn open_push_channel(
    runtime: &tokio::runtime::Handle,
    socket_url: String,
    auth: PushAuth,
    room_id: String,
) -> PushHandle {
    let (event_tx, event_rx) = flume::unbounded();
    let (command_tx, command_rx) = flume::unbounded();
    runtime.spawn(push_worker(socket_url, auth, room_id, event_tx, command_rx));
    PushHandle {
        events: event_rx,
        commands: command_tx,
    }
}

async fn push_worker(
    socket_url: String,
    auth: PushAuth,
    room_id: String,
    events: flume::Sender<PushEvent>,
    commands: flume::Receiver<PushCommand>,
) {
    let mut attempts: u32 = 0;
    loop {
        match tokio_tungstenite::connect_async(socket_url.as_str()).await {
            Ok((mut ws, _)) => {
                if let Err(e) = join_room(&mut ws, &auth, &room_id).await {
                    tracing::warn!(%e, room = %room_id, "push handshake failed");
                } else {
                    attempts = 0;
                    if events.send(PushEvent::Connected).is_err() {
                        let _ = ws.close(None).await;
                        return;
                    }
                    tracing::debug!(room = %room_id, "push channel connected");
                    if pump(&mut ws, &events, &commands).await {
                        // Handle dropped: the conversation is gone.
                        let _ = ws.close(None).await;
                        return;
                    }
                    if events
                        .send(PushEvent::Disconnected { exhausted: false })
                        .is_err()
                    {
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(%e, url = %socket_url, "push connect failed");
            }
        }

        attempts += 1;
        if attempts >= PUSH_RETRY_MAX {
            tracing::warn!(room = %room_id, attempts, "push channel gave up; polling only");
            let _ = events.send(PushEvent::Disconnected { exhausted: true });
            return;
        }
        if commands.is_disconnected() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(PUSH_RETRY_BACKOFF_MS)).await;
    }
}

async fn join_room<S>(
    ws: &mut WebSocketStream<S>,
    auth: &PushAuth,
    room_id: &str,
) -> Result<(), tokio_tungstenite::tungstenite::Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let auth_frame = serde_json::json!({
        "event": "auth",
        "data": { "userId": auth.user_id, "role": auth.role.wire_name() },
    });
    ws.send(Message::text(auth_frame.to_string())).await?;

    let join_frame = serde_json::json!({
        "event": "join_room",
        "data": { "roomId": room_id },
    });
    ws.send(Message::text(join_frame.to_string())).await?;
    Ok(())
}

/// Returns true when the owning handle has been dropped and the worker should
/// shut down for good; false on a connection loss that warrants a retry.
async fn pump<S>(
    ws: &mut WebSocketStream<S>,
    events: &flume::Sender<PushEvent>,
    commands: &flume::Receiver<PushCommand>,
) -> bool
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            frame = ws.next() => {
                match frame {
                    Some(Ok(Message::Text(txt))) => {
                        if let Some(event) = parse_frame(txt.as_str()) {
                            if events.send(event).is_err() {
                                return true;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return false,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(%e, "push socket read failed");
                        return false;
                    }
                }
            }
            cmd = commands.recv_async() => {
                match cmd {
                    Ok(PushCommand::EmitRoomMessage { message, room_id }) => {
                        let mut data = match serde_json::to_value(MessageDto::from_wire(&message)) {
                            Ok(v) => v,
                            Err(e) => {
                                tracing::warn!(%e, "unserializable room message");
                                continue;
                            }
                        };
                        if let Some(obj) = data.as_object_mut() {
                            obj.insert("roomId".into(), serde_json::Value::String(room_id));
                        }
                        let frame = serde_json::json!({
                            "event": "send_room_message",
                            "data": data,
                        });
                        if let Err(e) = ws.send(Message::text(frame.to_string())).await {
                            tracing::warn!(%e, "push send failed");
                            return false;
                        }
                    }
                    Err(_) => return true,
                }
            }
        }
    }
}

fn parse_frame(raw: &str) -> Option<PushEvent> {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(%e, "unparseable push frame");
            return None;
        }
    };
    if value.get("event").and_then(|e| e.as_str()) != Some("room_message") {
        return None;
    }
    let data = value.get("data")?.clone();
    match serde_json::from_value::<MessageDto>(data) {
        Ok(dto) => dto.into_wire().map(PushEvent::Message),
        Err(e) => {
            tracing::debug!(%e, "malformed room_message payload");
            None
        }
    }
}
