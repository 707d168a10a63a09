use std::sync::Arc;

use serde::Serialize;

use crate::dto::ws::{Envelope, EventKind};

/// SSE event name under which every realtime envelope is delivered.
pub const MESSAGE_EVENT: &str = "message";
/// SSE event name of the periodic keep-alive.
pub const PING_EVENT: &str = "ping";

/// Body of the periodic keep-alive event.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PingData {
    /// Unix seconds.
    pub timestamp: i64,
}

#[derive(Clone, Debug)]
/// Dispatched payload carried across push-stream queues.
///
/// `data` is shared so one serialisation serves every subscriber of a room.
pub struct ServerEvent {
    /// SSE event name, `message` when absent.
    pub event: Option<String>,
    /// Serialized JSON body.
    pub data: Arc<str>,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?.into(),
        })
    }

    /// Wrap an already serialised envelope.
    pub fn message(data: Arc<str>) -> Self {
        Self {
            event: Some(MESSAGE_EVENT.into()),
            data,
        }
    }

    /// Build a `message` event carrying an envelope of `kind` around `payload`.
    pub fn envelope<T: Serialize>(kind: EventKind, payload: &T) -> serde_json::Result<Self> {
        Self::json(MESSAGE_EVENT.to_string(), &Envelope::new(kind, payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::ws::BlurData;

    #[test]
    fn envelope_events_use_the_message_name() {
        let event = ServerEvent::envelope(EventKind::BlurToggled, &BlurData { blurred: true })
            .unwrap();
        assert_eq!(event.event.as_deref(), Some(MESSAGE_EVENT));
        let value: serde_json::Value = serde_json::from_str(&event.data).unwrap();
        assert_eq!(value["type"], "blur_toggled");
        assert_eq!(value["data"]["blurred"], true);
    }
}
