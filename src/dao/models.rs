use std::{fmt, str::FromStr, time::SystemTime};

use serde::{Deserialize, Serialize};
use time::Date;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle status of a retrospective session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created but not started yet.
    Planned,
    /// Accepting items, votes, groups and merges.
    Active,
    /// Finished; mutations are rejected until reopened.
    Closed,
}

impl SessionStatus {
    /// Wire name used in documents and payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Planned => "planned",
            SessionStatus::Active => "active",
            SessionStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "planned" => Ok(SessionStatus::Planned),
            "active" => Ok(SessionStatus::Active),
            "closed" => Ok(SessionStatus::Closed),
            other => Err(format!("unknown session status `{other}`")),
        }
    }
}

/// Board layout chosen when the session is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum SessionTemplate {
    /// Start / Stop / Continue.
    #[serde(rename = "start_stop_continue")]
    StartStopContinue,
    /// Liked / Learned / Lacked / Longed for.
    #[serde(rename = "4ls")]
    FourLs,
    /// Mad / Sad / Glad.
    #[serde(rename = "mad_sad_glad")]
    MadSadGlad,
    /// Wind / Anchors / Rocks / Destination.
    #[serde(rename = "sailboat")]
    Sailboat,
    /// Went well / To improve.
    #[serde(rename = "went_well_to_improve")]
    WentWellToImprove,
}

impl SessionTemplate {
    /// Every template, in catalogue order.
    pub const ALL: [SessionTemplate; 5] = [
        SessionTemplate::StartStopContinue,
        SessionTemplate::FourLs,
        SessionTemplate::MadSadGlad,
        SessionTemplate::Sailboat,
        SessionTemplate::WentWellToImprove,
    ];

    /// Wire name used in documents and payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionTemplate::StartStopContinue => "start_stop_continue",
            SessionTemplate::FourLs => "4ls",
            SessionTemplate::MadSadGlad => "mad_sad_glad",
            SessionTemplate::Sailboat => "sailboat",
            SessionTemplate::WentWellToImprove => "went_well_to_improve",
        }
    }

    /// Category identifiers items of this template may be filed under.
    pub fn categories(self) -> &'static [&'static str] {
        match self {
            SessionTemplate::StartStopContinue => &["start", "stop", "continue"],
            SessionTemplate::FourLs => &["liked", "learned", "lacked", "longed_for"],
            SessionTemplate::MadSadGlad => &["mad", "sad", "glad"],
            SessionTemplate::Sailboat => &["wind", "anchors", "rocks", "destination"],
            SessionTemplate::WentWellToImprove => &["went_well", "to_improve"],
        }
    }

    /// Whether `category` belongs to this template.
    pub fn has_category(self, category: &str) -> bool {
        self.categories().contains(&category)
    }
}

impl FromStr for SessionTemplate {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        SessionTemplate::ALL
            .into_iter()
            .find(|template| template.as_str() == value)
            .ok_or_else(|| format!("unknown template `{value}`"))
    }
}

/// Persisted retrospective session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEntity {
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
    /// Only the creator may start, end, reopen, delete or blur the session.
    pub created_by: Uuid,
    /// Planned start, RFC 3339.
    pub scheduled_at: Option<SystemTime>,
    /// When the session became active.
    pub started_at: Option<SystemTime>,
    /// When the session was last closed.
    pub ended_at: Option<SystemTime>,
    /// Creation time.
    pub created_at: SystemTime,
    /// Last modification time.
    pub updated_at: SystemTime,
}

/// Card posted on the board under one of the template categories.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemEntity {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning session.
    pub session_id: Uuid,
    /// Template category the item is filed under.
    pub category: String,
    /// Item text.
    pub content: String,
    /// `None` when the item was posted anonymously.
    pub author_id: Option<Uuid>,
    /// Hide the author from other participants.
    pub is_anonymous: bool,
    /// Always equal to the number of live vote rows for this item.
    pub votes: u32,
    /// Creation time.
    pub created_at: SystemTime,
    /// Last modification time.
    pub updated_at: SystemTime,
}

/// Named cluster of items from one session.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupEntity {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning session.
    pub session_id: Uuid,
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
    pub created_at: SystemTime,
    /// Last modification time.
    pub updated_at: SystemTime,
}

/// Progress of an action item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Not started.
    Todo,
    /// Being worked on.
    InProgress,
    /// Completed; `completed_at` is set.
    Done,
}

impl ActionStatus {
    /// Wire name used in documents and payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            ActionStatus::Todo => "todo",
            ActionStatus::InProgress => "in_progress",
            ActionStatus::Done => "done",
        }
    }
}

impl FromStr for ActionStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "todo" => Ok(ActionStatus::Todo),
            "in_progress" => Ok(ActionStatus::InProgress),
            "done" => Ok(ActionStatus::Done),
            other => Err(format!(
                "invalid status `{other}`: must be todo, in_progress or done"
            )),
        }
    }
}

/// Follow-up task agreed on during a retrospective.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionItemEntity {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning session.
    pub session_id: Uuid,
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
    pub due_date: Option<Date>,
    /// Set exactly while `status` is [`ActionStatus::Done`].
    pub completed_at: Option<SystemTime>,
    /// User who created it.
    pub created_by: Uuid,
    /// Creation time.
    pub created_at: SystemTime,
    /// Last modification time.
    pub updated_at: SystemTime,
}

/// Membership record of a user in a session.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantEntity {
    /// Owning session.
    pub session_id: Uuid,
    /// Registered user.
    pub user_id: Uuid,
    /// First registration time.
    pub joined_at: SystemTime,
    /// Latest registration time.
    pub last_seen: SystemTime,
}

/// Result of a vote toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteToggle {
    /// `true` when the toggle inserted a vote, `false` when it removed one.
    pub voted: bool,
    /// Vote count after the toggle.
    pub votes: u32,
}

/// Outcome of a conditional status update.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    /// The session was in the expected status and has been moved.
    Updated(SessionEntity),
    /// The session changed status concurrently.
    Stale(SessionStatus),
    /// The session does not exist.
    Missing,
}

/// Outcome of a merge attempted inside a store transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// Target item after the merge.
    Merged(ItemEntity),
    /// One of the items disappeared before the transaction committed.
    Missing(Uuid),
}

/// Outcome of a group creation attempted inside a store transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupOutcome {
    /// The group and its memberships were written.
    Created(GroupEntity),
    /// An item id did not resolve to an item.
    MissingItem(Uuid),
    /// An item id resolved to an item of a different session.
    ForeignItem(Uuid),
}
