//! Request and response bodies of the retrospective REST API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{
        ActionItemEntity, ActionStatus, GroupEntity, ItemEntity, ParticipantEntity, SessionEntity,
        SessionStatus, SessionTemplate,
    },
    dto::{
        format_system_time,
        validation::{DUE_DATE_FORMAT, validate_action_status, validate_due_date, validate_rfc3339},
    },
};

/// Payload used to create a retrospective session.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateRetrospectiveRequest {
    /// Short title.
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    /// Optional longer description.
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    /// Board layout; fixes the item categories.
    pub template: SessionTemplate,
    /// RFC 3339 timestamp.
    #[validate(custom(function = "validate_rfc3339"))]
    pub scheduled_at: Option<String>,
}

/// Title and description edits applied by the session creator.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct UpdateRetrospectiveRequest {
    /// Short title.
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    /// Optional longer description.
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    /// RFC 3339 timestamp.
    #[validate(custom(function = "validate_rfc3339"))]
    pub scheduled_at: Option<String>,
}

/// Card posted on the board.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AddItemRequest {
    /// Template category the item is filed under.
    #[validate(length(min = 1, max = 64))]
    pub category: String,
    /// Item text.
    #[validate(length(min = 1, max = 2000))]
    pub content: String,
    /// Hide the author from other participants.
    #[serde(default)]
    pub is_anonymous: bool,
}

/// Folds `source_item_id` into `target_item_id`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct MergeItemsRequest {
    /// Item folded away.
    pub source_item_id: Uuid,
    /// Item that survives the merge.
    pub target_item_id: Uuid,
}

/// Named cluster of existing items.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateGroupRequest {
    /// Group name.
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    /// Optional longer description.
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    /// Items to group; duplicates are ignored.
    #[serde(default)]
    pub item_ids: Vec<Uuid>,
}

/// Follow-up task to record.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateActionItemRequest {
    /// Board item this action follows up on.
    pub item_id: Option<Uuid>,
    /// Short title.
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    /// Optional longer description.
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    /// User responsible for the action.
    pub assigned_to: Option<Uuid>,
    /// Calendar date formatted as `YYYY-MM-DD`.
    #[validate(custom(function = "validate_due_date"))]
    pub due_date: Option<String>,
}

/// Partial update of an action item; absent fields are left untouched.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct UpdateActionItemRequest {
    /// Short title.
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    /// Optional longer description.
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    /// One of `todo`, `in_progress`, `done`.
    #[validate(custom(function = "validate_action_status"))]
    pub status: Option<String>,
    /// User responsible for the action.
    pub assigned_to: Option<Uuid>,
    /// Calendar date formatted as `YYYY-MM-DD`.
    #[validate(custom(function = "validate_due_date"))]
    pub due_date: Option<String>,
}

/// Blur flag requested by the session creator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct BlurRequest {
    /// Hide item contents from participants.
    pub blurred: bool,
}

/// Session as returned by the API.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionSummary {
    /// Unique identifier.
    pub id: Uuid,
    /// Short title.
    pub title: String,
    /// Optional longer description.
    pub description: Option<String>,
    /// Board layout.
    pub template: SessionTemplate,
    /// Current status.
    pub status: SessionStatus,
    /// User who created it.
    pub created_by: Uuid,
    /// Planned start, RFC 3339.
    pub scheduled_at: Option<String>,
    /// When the session became active.
    pub started_at: Option<String>,
    /// When the session was last closed.
    pub ended_at: Option<String>,
    /// Creation time.
    pub created_at: String,
    /// Last modification time.
    pub updated_at: String,
}

impl From<SessionEntity> for SessionSummary {
    fn from(value: SessionEntity) -> Self {
        Self {
            id: value.id,
            title: value.title,
            description: value.description,
            template: value.template,
            status: value.status,
            created_by: value.created_by,
            scheduled_at: value.scheduled_at.map(format_system_time),
            started_at: value.started_at.map(format_system_time),
            ended_at: value.ended_at.map(format_system_time),
            created_at: format_system_time(value.created_at),
            updated_at: format_system_time(value.updated_at),
        }
    }
}

/// Board item as returned by the API.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ItemSummary {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning session.
    pub retrospective_id: Uuid,
    /// Template category the item is filed under.
    pub category: String,
    /// Item text.
    pub content: String,
    /// Null for anonymous items.
    pub author_id: Option<Uuid>,
    /// Hide the author from other participants.
    pub is_anonymous: bool,
    /// Number of votes.
    pub votes: u32,
    /// Creation time.
    pub created_at: String,
    /// Last modification time.
    pub updated_at: String,
}

impl From<ItemEntity> for ItemSummary {
    fn from(value: ItemEntity) -> Self {
        Self {
            id: value.id,
            retrospective_id: value.session_id,
            category: value.category,
            content: value.content,
            author_id: value.author_id,
            is_anonymous: value.is_anonymous,
            votes: value.votes,
            created_at: format_system_time(value.created_at),
            updated_at: format_system_time(value.updated_at),
        }
    }
}

/// Item group as returned by the API.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GroupSummary {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning session.
    pub retrospective_id: Uuid,
    /// Group name.
    pub name: String,
    /// Optional longer description.
    pub description: Option<String>,
    /// Grouped items in insertion order.
    pub item_ids: Vec<Uuid>,
    /// Number of votes.
    pub votes: u32,
    /// User who created it.
    pub created_by: Uuid,
    /// Creation time.
    pub created_at: String,
    /// Last modification time.
    pub updated_at: String,
}

impl From<GroupEntity> for GroupSummary {
    fn from(value: GroupEntity) -> Self {
        Self {
            id: value.id,
            retrospective_id: value.session_id,
            name: value.name,
            description: value.description,
            item_ids: value.item_ids,
            votes: value.votes,
            created_by: value.created_by,
            created_at: format_system_time(value.created_at),
            updated_at: format_system_time(value.updated_at),
        }
    }
}

/// Action item as returned by the API.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActionItemSummary {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning session.
    pub retrospective_id: Uuid,
    /// Board item this action follows up on.
    pub item_id: Option<Uuid>,
    /// Short title.
    pub title: String,
    /// Optional longer description.
    pub description: Option<String>,
    /// Current status.
    pub status: ActionStatus,
    /// User responsible for the action.
    pub assigned_to: Option<Uuid>,
    /// Due date, `YYYY-MM-DD`.
    pub due_date: Option<String>,
    /// When the action was marked done.
    pub completed_at: Option<String>,
    /// User who created it.
    pub created_by: Uuid,
    /// Creation time.
    pub created_at: String,
    /// Last modification time.
    pub updated_at: String,
}

impl From<ActionItemEntity> for ActionItemSummary {
    fn from(value: ActionItemEntity) -> Self {
        Self {
            id: value.id,
            retrospective_id: value.session_id,
            item_id: value.item_id,
            title: value.title,
            description: value.description,
            status: value.status,
            assigned_to: value.assigned_to,
            due_date: value
                .due_date
                .and_then(|date| date.format(DUE_DATE_FORMAT).ok()),
            completed_at: value.completed_at.map(format_system_time),
            created_by: value.created_by,
            created_at: format_system_time(value.created_at),
            updated_at: format_system_time(value.updated_at),
        }
    }
}

/// Registered participant as returned by the API.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ParticipantSummary {
    /// Registered user.
    pub user_id: Uuid,
    /// First registration time.
    pub joined_at: String,
    /// Latest registration time.
    pub last_seen: String,
}

impl From<ParticipantEntity> for ParticipantSummary {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            user_id: value.user_id,
            joined_at: format_system_time(value.joined_at),
            last_seen: format_system_time(value.last_seen),
        }
    }
}

/// Registered participants of a session.
#[derive(Debug, Serialize, ToSchema)]
pub struct ParticipantsResponse {
    /// Participants in join order.
    pub participants: Vec<ParticipantSummary>,
    /// Number of participants.
    pub count: usize,
}

/// Full board of a session.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionDetails {
    /// Session metadata, flattened into the body.
    #[serde(flatten)]
    pub retrospective: SessionSummary,
    /// Board items in creation order.
    pub items: Vec<ItemSummary>,
    /// Groups in creation order.
    pub groups: Vec<GroupSummary>,
    /// Action items in creation order.
    pub action_items: Vec<ActionItemSummary>,
    /// Registered participants.
    pub participants: Vec<ParticipantSummary>,
    /// Whether item contents are hidden from participants.
    pub blurred: bool,
}

/// Result of a vote toggle.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct VoteResponse {
    /// `true` when the call added a vote, `false` when it removed one.
    pub voted: bool,
    /// Vote count after the toggle.
    pub votes: u32,
}

/// One live duplex connection in a session room.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConnectedClient {
    /// Connected user.
    pub user_id: Uuid,
    /// Display name.
    pub name: String,
}

/// Users currently connected to a session room.
#[derive(Debug, Serialize, ToSchema)]
pub struct ConnectedClientsResponse {
    /// Connected users in join order.
    pub participants: Vec<ConnectedClient>,
    /// Number of live connections.
    pub count: usize,
}

/// Column of a board layout.
#[derive(Debug, Serialize, ToSchema)]
pub struct CategorySummary {
    /// Wire id stored on items.
    pub id: String,
    /// Human-readable column title.
    pub name: String,
}

/// Board layout offered when creating a session.
#[derive(Debug, Serialize, ToSchema)]
pub struct TemplateSummary {
    /// Layout id.
    pub id: SessionTemplate,
    /// Display name.
    pub name: String,
    /// One-line summary.
    pub description: String,
    /// Columns in display order.
    pub categories: Vec<CategorySummary>,
}

/// Current blur flag of a session.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct BlurResponse {
    /// Whether item contents are hidden from participants.
    pub blurred: bool,
}
