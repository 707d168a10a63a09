use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use time::OffsetDateTime;
use tokio::{
    sync::mpsc,
    time::{Instant, interval_at},
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        sse::{PING_EVENT, PingData, ServerEvent},
        ws::{BlurData, ConnectedData, EventKind},
    },
    services::auth_service::AuthenticatedUser,
    state::{SharedState, fanout::Subscription},
};

/// Events every new subscriber receives before live traffic: `connected`, then the blur
/// flag when it is set.
pub fn greeting(
    session_id: Uuid,
    user: &AuthenticatedUser,
    blurred: bool,
) -> serde_json::Result<Vec<ServerEvent>> {
    let mut events = vec![ServerEvent::envelope(
        EventKind::Connected,
        &ConnectedData {
            user_id: user.user_id,
            user_name: user.name.clone(),
            retrospective_id: session_id,
        },
    )?];
    if blurred {
        events.push(ServerEvent::envelope(
            EventKind::BlurToggled,
            &BlurData { blurred: true },
        )?);
    }
    Ok(events)
}

/// Subscribe the caller to the session's push stream and convert it into an SSE response.
///
/// The subscriber is detached once the client goes away or falls behind.
pub fn open_stream(
    state: &SharedState,
    session_id: Uuid,
    user: AuthenticatedUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + use<>> {
    let subscription = state.fanout().subscribe(session_id);
    let initial = match greeting(session_id, &user, state.fanout().is_blurred(session_id)) {
        Ok(events) => events,
        Err(err) => {
            warn!(error = %err, "failed to encode push-stream greeting");
            Vec::new()
        }
    };
    info!(session = %session_id, user = %user.user_id, subscriber = %subscription.id, "push-stream client connected");

    to_sse_stream(
        state.clone(),
        subscription,
        initial,
        state.config().stream_keep_alive,
    )
}

fn to_sse_stream(
    state: SharedState,
    subscription: Subscription,
    initial: Vec<ServerEvent>,
    keep_alive: Duration,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        let Subscription {
            id,
            session_id,
            mut receiver,
        } = subscription;
        let mut ping = interval_at(Instant::now() + keep_alive, keep_alive);

        let mut open = true;
        for payload in initial {
            if tx.send(Ok(to_event(payload))).await.is_err() {
                open = false;
                break;
            }
        }

        while open {
            tokio::select! {
                _ = tx.closed() => break,
                next = receiver.recv() => {
                    // `None` means the fan-out dropped this subscriber for lagging.
                    let Some(payload) = next else { break };
                    if tx.send(Ok(to_event(payload))).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if tx.send(Ok(ping_event())).await.is_err() {
                        break;
                    }
                }
            }
        }

        state.fanout().unsubscribe(session_id, id);
        info!(session = %session_id, subscriber = %id, "push-stream client disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(keep_alive)
            .text("keep-alive"),
    )
}

fn to_event(payload: ServerEvent) -> Event {
    let event = Event::default().data(&*payload.data);
    match payload.event {
        Some(name) => event.event(name),
        None => event,
    }
}

fn ping_event() -> Event {
    let data = PingData {
        timestamp: OffsetDateTime::now_utc().unix_timestamp(),
    };
    match ServerEvent::json(PING_EVENT.to_string(), &data) {
        Ok(payload) => to_event(payload),
        Err(_) => Event::default().event(PING_EVENT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::{sse::MESSAGE_EVENT, ws::Envelope};

    fn user() -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: Uuid::new_v4(),
            email: "ada@example.com".into(),
            name: "Ada".into(),
        }
    }

    #[test]
    fn greeting_starts_with_connected() {
        let session = Uuid::new_v4();
        let user = user();
        let events = greeting(session, &user, false).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some(MESSAGE_EVENT));

        let envelope = Envelope::from_json_str(&events[0].data).unwrap();
        assert_eq!(envelope.kind, EventKind::Connected);
        let data: ConnectedData = envelope.decode_data().unwrap().unwrap();
        assert_eq!(data.user_id, user.user_id);
        assert_eq!(data.user_name, "Ada");
        assert_eq!(data.retrospective_id, session);
    }

    #[test]
    fn blurred_sessions_announce_the_flag_after_connected() {
        let events = greeting(Uuid::new_v4(), &user(), true).unwrap();
        let kinds: Vec<EventKind> = events
            .iter()
            .map(|event| Envelope::from_json_str(&event.data).unwrap().kind)
            .collect();
        assert_eq!(kinds, vec![EventKind::Connected, EventKind::BlurToggled]);
    }
}
