use std::time::Duration;

use axum::{
    body::Bytes,
    extract::ws::{Message, WebSocket},
};
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{
    sync::mpsc,
    time::{Instant, interval_at, timeout},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{EventKind, InboundFrame},
    services::auth_service::AuthenticatedUser,
    state::{
        SharedState,
        hub::{ClientHandle, Frame, Hub},
    },
};

/// What the reader does after handling one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Leave,
}

/// Handle the full lifecycle of one duplex connection bound to `session_id`.
///
/// The reader and writer run as separate tasks; whichever stops first ends the connection,
/// and the connection is unregistered exactly once.
pub async fn handle_socket(
    state: SharedState,
    socket: WebSocket,
    session_id: Uuid,
    user: AuthenticatedUser,
) {
    let config = state.config().clone();
    let connection_id = Uuid::new_v4();
    let (sink, stream) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel::<Frame>(config.client_queue_capacity);

    state.hub().register(ClientHandle {
        id: connection_id,
        session_id,
        user_id: user.user_id,
        name: user.name.clone(),
        tx: outbound_tx,
    });
    info!(connection = %connection_id, session = %session_id, user = %user.user_id, "websocket client connected");

    // Only the hub holds the sender: unregistering or evicting the client closes the queue.
    let mut writer_task = tokio::spawn(write_pump(
        sink,
        outbound_rx,
        config.ping_interval,
        config.write_timeout,
    ));
    let mut reader_task = tokio::spawn(read_pump(
        state.clone(),
        stream,
        connection_id,
        session_id,
        user.user_id,
        config.pong_wait,
    ));

    let writer_finished = tokio::select! {
        _ = &mut writer_task => {
            reader_task.abort();
            true
        }
        _ = &mut reader_task => false,
    };

    if state.hub().unregister(connection_id) {
        debug!(connection = %connection_id, "connection unregistered");
    }
    if !writer_finished {
        let _ = writer_task.await;
    }

    info!(connection = %connection_id, session = %session_id, user = %user.user_id, "websocket client disconnected");
}

async fn read_pump(
    state: SharedState,
    mut receiver: SplitStream<WebSocket>,
    connection_id: Uuid,
    session_id: Uuid,
    user_id: Uuid,
    pong_wait: Duration,
) {
    loop {
        // Any inbound frame, pongs included, restarts the deadline.
        let message = match timeout(pong_wait, receiver.next()).await {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(_) => {
                warn!(connection = %connection_id, "no traffic from client within the pong wait; closing");
                break;
            }
        };
        match message {
            Ok(Message::Text(text)) => {
                if handle_frame(state.hub(), session_id, user_id, text.as_str()) == Flow::Leave {
                    info!(connection = %connection_id, "client left the retrospective");
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                debug!(connection = %connection_id, "client closed the connection");
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(connection = %connection_id, error = %err, "websocket read error");
                break;
            }
        }
    }
}

/// Decode one inbound frame, stamp it with the connection's identity and relay it.
pub(crate) fn handle_frame(hub: &Hub, session_id: Uuid, user_id: Uuid, raw: &str) -> Flow {
    let envelope = match InboundFrame::from_json_str(raw) {
        Ok(frame) => frame.stamp(user_id),
        Err(err) => {
            warn!(user = %user_id, error = %err, "failed to parse websocket message");
            return Flow::Continue;
        }
    };

    match envelope.kind {
        EventKind::JoinRetrospective => Flow::Continue,
        EventKind::LeaveRetrospective => Flow::Leave,
        kind if kind.is_relayed() => {
            hub.broadcast_to_room(session_id, &envelope);
            Flow::Continue
        }
        kind => {
            debug!(user = %user_id, kind = ?kind, "ignoring websocket message");
            Flow::Continue
        }
    }
}

async fn write_pump(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<Frame>,
    ping_interval: Duration,
    write_timeout: Duration,
) {
    let mut ping = interval_at(Instant::now() + ping_interval, ping_interval);

    loop {
        tokio::select! {
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else {
                    let _ = timeout(write_timeout, sender.send(Message::Close(None))).await;
                    break;
                };
                let text = coalesce(frame, &mut outbound_rx);
                if !send(&mut sender, Message::Text(text.into()), write_timeout).await {
                    break;
                }
                ping.reset();
            }
            _ = ping.tick() => {
                if !send(&mut sender, Message::Ping(Bytes::new()), write_timeout).await {
                    break;
                }
            }
        }
    }
}

/// Join the frames already waiting behind `first` into one newline-separated payload.
fn coalesce(first: Frame, outbound_rx: &mut mpsc::Receiver<Frame>) -> String {
    let mut text = String::from(&*first);
    while let Ok(next) = outbound_rx.try_recv() {
        text.push('\n');
        text.push_str(&next);
    }
    text
}

async fn send(
    sender: &mut SplitSink<WebSocket, Message>,
    message: Message,
    write_timeout: Duration,
) -> bool {
    match timeout(write_timeout, sender.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            debug!(error = %err, "websocket write failed");
            false
        }
        Err(_) => {
            warn!("websocket write timed out");
            false
        }
    }
}
