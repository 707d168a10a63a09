pub mod memory;
/// MongoDB backend.
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::SystemTime;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{
    ActionItemEntity, GroupEntity, GroupOutcome, ItemEntity, MergeOutcome, ParticipantEntity,
    SessionEntity, SessionStatus, StatusUpdate, VoteToggle,
};
use crate::dao::storage::StorageResult;

pub use self::memory::MemoryRetroStore;

/// Abstraction over the persistence layer for retrospective sessions and their boards.
///
/// Methods documented as transactional either apply every write or none of them.
pub trait RetroStore: Send + Sync {
    /// Persist a new session.
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch a session by id.
    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Sessions created by or joined by `user_id`, newest first.
    fn list_sessions(&self, user_id: Uuid)
    -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>>;
    /// Replace the title, description and schedule of a session. Returns `false` when missing.
    fn update_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<bool>>;
    /// Move a session from `expected` to `next` if it is still in `expected`.
    ///
    /// Entering `active` from `planned` stamps `started_at`, entering `closed` stamps `ended_at`,
    /// and leaving `closed` clears `ended_at`.
    fn update_session_status(
        &self,
        id: Uuid,
        expected: SessionStatus,
        next: SessionStatus,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<StatusUpdate>>;
    /// Delete a session with every row that belongs to it. Returns `false` when missing.
    fn delete_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;

    /// Record a participant (refreshing `last_seen` when already present) and return the
    /// participant count of the session.
    fn upsert_participant(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<usize>>;
    /// Participants of a session in join order.
    fn list_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>>;

    /// Persist a new item.
    fn insert_item(&self, item: ItemEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch an item by id.
    fn find_item(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<ItemEntity>>>;
    /// Items of a session in creation order.
    fn list_items(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<ItemEntity>>>;
    /// Delete an item with its votes and group memberships. Returns `false` when missing.
    fn delete_item(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    /// Transactional vote toggle. `None` when the item does not exist.
    fn toggle_item_vote(
        &self,
        item_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<VoteToggle>>>;
    /// Transactional merge of `source` into `target`.
    fn merge_items(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<MergeOutcome>>;

    /// Transactional group creation; every item id is checked in order before anything is written.
    fn create_group(&self, group: GroupEntity) -> BoxFuture<'static, StorageResult<GroupOutcome>>;
    /// Fetch a group by id.
    fn find_group(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GroupEntity>>>;
    /// Groups of a session in creation order.
    fn list_groups(&self, session_id: Uuid)
    -> BoxFuture<'static, StorageResult<Vec<GroupEntity>>>;
    /// Delete a group with its votes. Returns `false` when missing.
    fn delete_group(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    /// Transactional vote toggle. `None` when the group does not exist.
    fn toggle_group_vote(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<VoteToggle>>>;

    /// Persist a new action item.
    fn insert_action_item(&self, action: ActionItemEntity)
    -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch an action item by id.
    fn find_action_item(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ActionItemEntity>>>;
    /// Action items of a session in creation order.
    fn list_action_items(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ActionItemEntity>>>;
    /// Replace an action item. Returns `false` when missing.
    fn update_action_item(
        &self,
        action: ActionItemEntity,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Delete an action item. Returns `false` when missing.
    fn delete_action_item(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;

    /// Cheap round trip to the backend.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
