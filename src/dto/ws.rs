//! Realtime event envelope shared by the duplex socket and the push stream.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::value::RawValue;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::retro::{ActionItemSummary, GroupSummary, ItemSummary, SessionSummary};

/// Kind tag carried in the `type` field of every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Client announces it joined its room.
    JoinRetrospective,
    /// Client leaves its room; the connection is closed.
    LeaveRetrospective,
    /// Item posted.
    NewItem,
    /// Item edited.
    UpdateItem,
    /// Item removed.
    DeleteItem,
    /// Vote added to an item.
    VoteItem,
    /// Vote withdrawn from an item.
    UnvoteItem,
    /// Session metadata or status changed.
    UpdateRetrospective,
    /// Action item recorded.
    NewActionItem,
    /// Action item edited.
    UpdateActionItem,
    /// Action item removed.
    DeleteActionItem,
    /// Group created.
    NewGroup,
    /// Vote added to a group.
    VoteGroup,
    /// Vote withdrawn from a group.
    UnvoteGroup,
    /// Group removed.
    DeleteGroup,
    /// One item folded into another.
    ItemsMerged,
    /// Connection admitted to the room.
    UserJoined,
    /// Connection left or was dropped from the room.
    UserLeft,
    /// Recognised on the wire but never relayed; failures are reported over HTTP instead.
    Error,
    /// First event of a push stream.
    Connected,
    /// Keep-alive.
    Ping,
    /// Blur flag changed.
    BlurToggled,
    /// Any tag this server does not know about.
    #[serde(other)]
    Unknown,
}

impl EventKind {
    /// Kinds a client may push that are relayed verbatim to the rest of its room.
    pub fn is_relayed(self) -> bool {
        matches!(
            self,
            EventKind::NewItem
                | EventKind::UpdateItem
                | EventKind::DeleteItem
                | EventKind::VoteItem
                | EventKind::UnvoteItem
                | EventKind::UpdateRetrospective
                | EventKind::NewActionItem
                | EventKind::UpdateActionItem
        )
    }
}

/// Wire envelope: `{type, data?, timestamp, user_id?}`.
///
/// `data` is kept as raw JSON so relayed frames are forwarded without a decode/encode pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Event kind, serialized as `type`.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Payload, kept as raw JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<RawValue>>,
    /// Unix seconds.
    #[serde(default)]
    pub timestamp: i64,
    /// User the event originates from, always set by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
}

impl Envelope {
    /// Build an envelope stamped with the current time.
    pub fn new<T: Serialize>(kind: EventKind, payload: &T) -> serde_json::Result<Self> {
        Ok(Self {
            kind,
            data: Some(serde_json::value::to_raw_value(payload)?),
            timestamp: unix_now(),
            user_id: None,
        })
    }

    /// Envelope without a payload.
    pub fn bare(kind: EventKind) -> Self {
        Self {
            kind,
            data: None,
            timestamp: unix_now(),
            user_id: None,
        }
    }

    /// Attach the identity of the user the event originates from.
    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Parse a serialized envelope.
    pub fn from_json_str(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Decode the payload into a typed structure, `None` when the envelope carries no data.
    pub fn decode_data<T: DeserializeOwned>(&self) -> serde_json::Result<Option<T>> {
        self.data
            .as_deref()
            .map(|raw| serde_json::from_str(raw.get()))
            .transpose()
    }
}

/// Frame pushed by a client over the duplex socket.
///
/// There is no `user_id` field: whatever the client claims is discarded, so a bogus value
/// cannot get the frame rejected. [`InboundFrame::stamp`] attributes it to the connection.
#[derive(Debug, Deserialize)]
pub struct InboundFrame {
    /// Event kind, serialized as `type`.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Payload, relayed untouched.
    #[serde(default)]
    pub data: Option<Box<RawValue>>,
    /// Unix seconds as sent by the client.
    #[serde(default)]
    pub timestamp: i64,
}

impl InboundFrame {
    /// Parse a frame received from a client.
    pub fn from_json_str(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Turn the frame into an envelope originating from `user_id`.
    pub fn stamp(self, user_id: Uuid) -> Envelope {
        Envelope {
            kind: self.kind,
            data: self.data,
            timestamp: self.timestamp,
            user_id: Some(user_id),
        }
    }
}

fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Payload of `user_joined`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserJoinedData {
    /// Connecting user.
    pub user_id: Uuid,
    /// Display name.
    pub name: String,
}

/// Payload of `user_left`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserLeftData {
    /// Departing user.
    pub user_id: Uuid,
}

/// Payload of `new_item`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NewItemData {
    /// Posted item.
    pub item: ItemSummary,
}

/// Payload of `delete_item`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeleteItemData {
    /// Board item this action follows up on.
    pub item_id: Uuid,
}

/// Payload of `vote_item` (vote added) and `unvote_item` (vote removed).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ItemVoteData {
    /// Board item this action follows up on.
    pub item_id: Uuid,
    /// Voter.
    pub user_id: Uuid,
    /// Vote count after the toggle.
    pub votes: u32,
}

/// Payload of `items_merged`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ItemsMergedData {
    /// Deleted source item.
    pub source_item_id: Uuid,
    /// Surviving target item.
    pub target_item_id: Uuid,
    /// Target item after the merge.
    pub item: ItemSummary,
}

/// Payload of `new_group`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NewGroupData {
    /// Created group.
    pub group: GroupSummary,
}

/// Payload of `vote_group` (vote added) and `unvote_group` (vote removed).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GroupVoteData {
    /// Group concerned.
    pub group_id: Uuid,
    /// Voter.
    pub user_id: Uuid,
    /// Vote count after the toggle.
    pub votes: u32,
}

/// Payload of `delete_group`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeleteGroupData {
    /// Group concerned.
    pub group_id: Uuid,
}

/// Payload of `new_action_item` and `update_action_item`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActionItemData {
    /// Action item after the change.
    pub action_item: ActionItemSummary,
}

/// Payload of `delete_action_item`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeleteActionItemData {
    /// Action item concerned.
    pub action_item_id: Uuid,
}

/// Payload of `update_retrospective`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UpdateRetrospectiveData {
    /// Session after the change.
    pub retrospective: SessionSummary,
    /// Present when the update was caused by a participant registering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_count: Option<usize>,
    /// Set when the session was deleted.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

/// Payload of the `connected` greeting.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectedData {
    /// Subscribing user.
    pub user_id: Uuid,
    /// Display name of the subscriber.
    pub user_name: String,
    /// Session the stream is bound to.
    pub retrospective_id: Uuid,
}

/// Payload of `blur_toggled`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BlurData {
    /// Whether item contents are hidden from participants.
    pub blurred: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kinds_parse_as_unknown() {
        let envelope =
            Envelope::from_json_str(r#"{"type":"cursor_moved","timestamp":1}"#).unwrap();
        assert_eq!(envelope.kind, EventKind::Unknown);
        assert!(!envelope.kind.is_relayed());
    }

    #[test]
    fn data_is_forwarded_verbatim() {
        let raw = r#"{"type":"new_item","data":{"item":{"x":[1, 2]}},"timestamp":5}"#;
        let frame = InboundFrame::from_json_str(raw).unwrap();
        let out = serde_json::to_string(&frame.stamp(Uuid::nil())).unwrap();
        assert!(out.contains(r#""data":{"item":{"x":[1, 2]}}"#));
        assert!(out.contains(r#""user_id":"00000000-0000-0000-0000-000000000000""#));
    }

    #[test]
    fn client_claimed_user_id_is_ignored() {
        let user = Uuid::new_v4();
        for raw in [
            r#"{"type":"update_item","user_id":"not-a-uuid"}"#,
            r#"{"type":"update_item","user_id":42}"#,
        ] {
            let envelope = InboundFrame::from_json_str(raw).unwrap().stamp(user);
            assert_eq!(envelope.kind, EventKind::UpdateItem);
            assert_eq!(envelope.user_id, Some(user));
        }
    }

    #[test]
    fn error_kind_is_recognised_but_not_relayed() {
        let frame = InboundFrame::from_json_str(r#"{"type":"error"}"#).unwrap();
        assert_eq!(frame.kind, EventKind::Error);
        assert!(!frame.kind.is_relayed());
    }

    #[test]
    fn typed_payload_decodes_lazily() {
        let item_id = Uuid::new_v4();
        let envelope =
            Envelope::new(EventKind::DeleteItem, &DeleteItemData { item_id }).unwrap();
        let decoded: DeleteItemData = envelope.decode_data().unwrap().unwrap();
        assert_eq!(decoded.item_id, item_id);
        assert!(Envelope::bare(EventKind::Ping)
            .decode_data::<DeleteItemData>()
            .unwrap()
            .is_none());
    }

    #[test]
    fn missing_data_is_omitted() {
        let out = serde_json::to_value(Envelope::bare(EventKind::Ping)).unwrap();
        assert!(out.get("data").is_none());
        assert!(out.get("user_id").is_none());
        assert_eq!(out["type"], "ping");
    }
}
