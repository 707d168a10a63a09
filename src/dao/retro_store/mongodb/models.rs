use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use time::{Date, format_description::BorrowedFormatItem, macros::format_description};
use uuid::Uuid;

use super::error::{MongoDaoError, MongoResult};
use crate::dao::models::{
    ActionItemEntity, GroupEntity, ItemEntity, ParticipantEntity, SessionEntity,
};

pub const SESSIONS: &str = "retrospectives";
pub const PARTICIPANTS: &str = "participants";
pub const ITEMS: &str = "items";
pub const ITEM_VOTES: &str = "item_votes";
pub const GROUPS: &str = "groups";
pub const GROUP_VOTES: &str = "group_votes";
pub const ACTION_ITEMS: &str = "action_items";

const DUE_DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

pub fn id_filter(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}

fn parse_uuid(collection: &'static str, id: &str, value: &str) -> MongoResult<Uuid> {
    Uuid::parse_str(value).map_err(|err| MongoDaoError::Corrupt {
        collection,
        id: id.to_owned(),
        reason: err.to_string(),
    })
}

fn parse_optional_uuid(
    collection: &'static str,
    id: &str,
    value: Option<&str>,
) -> MongoResult<Option<Uuid>> {
    value
        .map(|value| parse_uuid(collection, id, value))
        .transpose()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub template: String,
    pub status: String,
    pub created_by: String,
    pub scheduled_at: Option<DateTime>,
    pub started_at: Option<DateTime>,
    pub ended_at: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl From<SessionEntity> for MongoSessionDocument {
    fn from(value: SessionEntity) -> Self {
        Self {
            id: value.id.to_string(),
            title: value.title,
            description: value.description,
            template: value.template.as_str().to_owned(),
            status: value.status.as_str().to_owned(),
            created_by: value.created_by.to_string(),
            scheduled_at: value.scheduled_at.map(DateTime::from_system_time),
            started_at: value.started_at.map(DateTime::from_system_time),
            ended_at: value.ended_at.map(DateTime::from_system_time),
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoSessionDocument> for SessionEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoSessionDocument) -> MongoResult<Self> {
        let corrupt = |reason: String| MongoDaoError::Corrupt {
            collection: SESSIONS,
            id: value.id.clone(),
            reason,
        };
        Ok(Self {
            id: parse_uuid(SESSIONS, &value.id, &value.id)?,
            template: value.template.parse().map_err(corrupt)?,
            status: value.status.parse().map_err(corrupt)?,
            created_by: parse_uuid(SESSIONS, &value.id, &value.created_by)?,
            title: value.title,
            description: value.description,
            scheduled_at: value.scheduled_at.map(DateTime::to_system_time),
            started_at: value.started_at.map(DateTime::to_system_time),
            ended_at: value.ended_at.map(DateTime::to_system_time),
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoParticipantDocument {
    pub session_id: String,
    pub user_id: String,
    pub joined_at: DateTime,
    pub last_seen: DateTime,
}

impl TryFrom<MongoParticipantDocument> for ParticipantEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoParticipantDocument) -> MongoResult<Self> {
        Ok(Self {
            session_id: parse_uuid(PARTICIPANTS, &value.user_id, &value.session_id)?,
            user_id: parse_uuid(PARTICIPANTS, &value.user_id, &value.user_id)?,
            joined_at: value.joined_at.to_system_time(),
            last_seen: value.last_seen.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoItemDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub session_id: String,
    pub category: String,
    pub content: String,
    pub author_id: Option<String>,
    pub is_anonymous: bool,
    pub votes: i64,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl From<ItemEntity> for MongoItemDocument {
    fn from(value: ItemEntity) -> Self {
        Self {
            id: value.id.to_string(),
            session_id: value.session_id.to_string(),
            category: value.category,
            content: value.content,
            author_id: value.author_id.map(|id| id.to_string()),
            is_anonymous: value.is_anonymous,
            votes: i64::from(value.votes),
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoItemDocument> for ItemEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoItemDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_uuid(ITEMS, &value.id, &value.id)?,
            session_id: parse_uuid(ITEMS, &value.id, &value.session_id)?,
            author_id: parse_optional_uuid(ITEMS, &value.id, value.author_id.as_deref())?,
            category: value.category,
            content: value.content,
            is_anonymous: value.is_anonymous,
            votes: u32::try_from(value.votes.max(0)).unwrap_or(u32::MAX),
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoGroupDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub session_id: String,
    pub name: String,
    pub description: Option<String>,
    pub item_ids: Vec<String>,
    pub votes: i64,
    pub created_by: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl From<GroupEntity> for MongoGroupDocument {
    fn from(value: GroupEntity) -> Self {
        Self {
            id: value.id.to_string(),
            session_id: value.session_id.to_string(),
            name: value.name,
            description: value.description,
            item_ids: value.item_ids.iter().map(Uuid::to_string).collect(),
            votes: i64::from(value.votes),
            created_by: value.created_by.to_string(),
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoGroupDocument> for GroupEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoGroupDocument) -> MongoResult<Self> {
        let item_ids = value
            .item_ids
            .iter()
            .map(|item_id| parse_uuid(GROUPS, &value.id, item_id))
            .collect::<MongoResult<Vec<_>>>()?;
        Ok(Self {
            id: parse_uuid(GROUPS, &value.id, &value.id)?,
            session_id: parse_uuid(GROUPS, &value.id, &value.session_id)?,
            created_by: parse_uuid(GROUPS, &value.id, &value.created_by)?,
            item_ids,
            name: value.name,
            description: value.description,
            votes: u32::try_from(value.votes.max(0)).unwrap_or(u32::MAX),
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoActionItemDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub session_id: String,
    pub item_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub assigned_to: Option<String>,
    /// Calendar date formatted as `YYYY-MM-DD`.
    pub due_date: Option<String>,
    pub completed_at: Option<DateTime>,
    pub created_by: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl From<ActionItemEntity> for MongoActionItemDocument {
    fn from(value: ActionItemEntity) -> Self {
        Self {
            id: value.id.to_string(),
            session_id: value.session_id.to_string(),
            item_id: value.item_id.map(|id| id.to_string()),
            title: value.title,
            description: value.description,
            status: value.status.as_str().to_owned(),
            assigned_to: value.assigned_to.map(|id| id.to_string()),
            due_date: value
                .due_date
                .and_then(|date| date.format(DUE_DATE_FORMAT).ok()),
            completed_at: value.completed_at.map(DateTime::from_system_time),
            created_by: value.created_by.to_string(),
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoActionItemDocument> for ActionItemEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoActionItemDocument) -> MongoResult<Self> {
        let corrupt = |reason: String| MongoDaoError::Corrupt {
            collection: ACTION_ITEMS,
            id: value.id.clone(),
            reason,
        };
        let due_date = value
            .due_date
            .as_deref()
            .map(|raw| Date::parse(raw, DUE_DATE_FORMAT).map_err(|err| corrupt(err.to_string())))
            .transpose()?;
        Ok(Self {
            id: parse_uuid(ACTION_ITEMS, &value.id, &value.id)?,
            session_id: parse_uuid(ACTION_ITEMS, &value.id, &value.session_id)?,
            item_id: parse_optional_uuid(ACTION_ITEMS, &value.id, value.item_id.as_deref())?,
            assigned_to: parse_optional_uuid(
                ACTION_ITEMS,
                &value.id,
                value.assigned_to.as_deref(),
            )?,
            created_by: parse_uuid(ACTION_ITEMS, &value.id, &value.created_by)?,
            status: value.status.parse().map_err(corrupt)?,
            due_date,
            title: value.title,
            description: value.description,
            completed_at: value.completed_at.map(DateTime::to_system_time),
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        })
    }
}
