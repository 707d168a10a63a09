//! In-process [`RetroStore`] used when no database is configured and by the test suites.
//!
//! Every operation takes the single table lock for its whole duration, which makes each call
//! serializable with respect to every other call.

use std::{collections::HashSet, sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::RetroStore;
use crate::dao::{
    models::{
        ActionItemEntity, GroupEntity, GroupOutcome, ItemEntity, MergeOutcome, ParticipantEntity,
        SessionEntity, SessionStatus, StatusUpdate, VoteToggle,
    },
    storage::StorageResult,
};

#[derive(Default)]
struct Tables {
    sessions: IndexMap<Uuid, SessionEntity>,
    participants: IndexMap<(Uuid, Uuid), ParticipantEntity>,
    items: IndexMap<Uuid, ItemEntity>,
    item_votes: HashSet<(Uuid, Uuid)>,
    groups: IndexMap<Uuid, GroupEntity>,
    group_votes: HashSet<(Uuid, Uuid)>,
    action_items: IndexMap<Uuid, ActionItemEntity>,
}

impl Tables {
    fn purge_item(&mut self, id: Uuid) -> bool {
        if self.items.shift_remove(&id).is_none() {
            return false;
        }
        self.item_votes.retain(|(item_id, _)| *item_id != id);
        for group in self.groups.values_mut() {
            group.item_ids.retain(|member| *member != id);
        }
        true
    }
}

/// Table-per-entity store kept behind one async lock.
#[derive(Clone, Default)]
pub struct MemoryRetroStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryRetroStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn toggle(votes: &mut HashSet<(Uuid, Uuid)>, key: (Uuid, Uuid), counter: &mut u32) -> VoteToggle {
    let voted = if votes.remove(&key) {
        *counter = counter.saturating_sub(1);
        false
    } else {
        votes.insert(key);
        *counter += 1;
        true
    };
    VoteToggle {
        voted,
        votes: *counter,
    }
}

impl RetroStore for MemoryRetroStore {
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.tables.write().await.sessions.insert(session.id, session);
            Ok(())
        })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.tables.read().await.sessions.get(&id).cloned()) })
    }

    fn list_sessions(
        &self,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.tables.read().await;
            Ok(tables
                .sessions
                .values()
                .rev()
                .filter(|session| {
                    session.created_by == user_id
                        || tables.participants.contains_key(&(session.id, user_id))
                })
                .cloned()
                .collect())
        })
    }

    fn update_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let mut tables = store.tables.write().await;
            let Some(existing) = tables.sessions.get_mut(&session.id) else {
                return Ok(false);
            };
            existing.title = session.title;
            existing.description = session.description;
            existing.scheduled_at = session.scheduled_at;
            existing.updated_at = session.updated_at;
            Ok(true)
        })
    }

    fn update_session_status(
        &self,
        id: Uuid,
        expected: SessionStatus,
        next: SessionStatus,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<StatusUpdate>> {
        let store = self.clone();
        Box::pin(async move {
            let mut tables = store.tables.write().await;
            let Some(session) = tables.sessions.get_mut(&id) else {
                return Ok(StatusUpdate::Missing);
            };
            if session.status != expected {
                return Ok(StatusUpdate::Stale(session.status));
            }
            match (expected, next) {
                (SessionStatus::Planned, SessionStatus::Active) => session.started_at = Some(at),
                (SessionStatus::Closed, _) => session.ended_at = None,
                (_, SessionStatus::Closed) => session.ended_at = Some(at),
                _ => {}
            }
            session.status = next;
            session.updated_at = at;
            Ok(StatusUpdate::Updated(session.clone()))
        })
    }

    fn delete_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let mut tables = store.tables.write().await;
            if tables.sessions.shift_remove(&id).is_none() {
                return Ok(false);
            }
            let item_ids: Vec<Uuid> = tables
                .items
                .values()
                .filter(|item| item.session_id == id)
                .map(|item| item.id)
                .collect();
            for item_id in item_ids {
                tables.purge_item(item_id);
            }
            let group_ids: HashSet<Uuid> = tables
                .groups
                .values()
                .filter(|group| group.session_id == id)
                .map(|group| group.id)
                .collect();
            tables.groups.retain(|group_id, _| !group_ids.contains(group_id));
            tables
                .group_votes
                .retain(|(group_id, _)| !group_ids.contains(group_id));
            tables.action_items.retain(|_, action| action.session_id != id);
            tables
                .participants
                .retain(|(session_id, _), _| *session_id != id);
            Ok(true)
        })
    }

    fn upsert_participant(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<usize>> {
        let store = self.clone();
        Box::pin(async move {
            let mut tables = store.tables.write().await;
            tables
                .participants
                .entry((session_id, user_id))
                .and_modify(|participant| participant.last_seen = at)
                .or_insert(ParticipantEntity {
                    session_id,
                    user_id,
                    joined_at: at,
                    last_seen: at,
                });
            Ok(tables
                .participants
                .keys()
                .filter(|(id, _)| *id == session_id)
                .count())
        })
    }

    fn list_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.tables.read().await;
            Ok(tables
                .participants
                .values()
                .filter(|participant| participant.session_id == session_id)
                .cloned()
                .collect())
        })
    }

    fn insert_item(&self, item: ItemEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.tables.write().await.items.insert(item.id, item);
            Ok(())
        })
    }

    fn find_item(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<ItemEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.tables.read().await.items.get(&id).cloned()) })
    }

    fn list_items(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<ItemEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.tables.read().await;
            Ok(tables
                .items
                .values()
                .filter(|item| item.session_id == session_id)
                .cloned()
                .collect())
        })
    }

    fn delete_item(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.tables.write().await.purge_item(id)) })
    }

    fn toggle_item_vote(
        &self,
        item_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<VoteToggle>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut guard = store.tables.write().await;
            let tables = &mut *guard;
            let Some(item) = tables.items.get_mut(&item_id) else {
                return Ok(None);
            };
            Ok(Some(toggle(
                &mut tables.item_votes,
                (item_id, user_id),
                &mut item.votes,
            )))
        })
    }

    fn merge_items(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<MergeOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            let mut tables = store.tables.write().await;
            let Some(source_content) = tables.items.get(&source_id).map(|s| s.content.clone())
            else {
                return Ok(MergeOutcome::Missing(source_id));
            };
            let Some(target) = tables.items.get_mut(&target_id) else {
                return Ok(MergeOutcome::Missing(target_id));
            };
            target.content = format!("{} | {}", target.content, source_content);
            target.votes = 0;
            target.updated_at = at;
            let merged = target.clone();
            tables.item_votes.retain(|(item_id, _)| *item_id != target_id);
            tables.purge_item(source_id);
            Ok(MergeOutcome::Merged(merged))
        })
    }

    fn create_group(&self, group: GroupEntity) -> BoxFuture<'static, StorageResult<GroupOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            let mut tables = store.tables.write().await;
            for item_id in &group.item_ids {
                match tables.items.get(item_id) {
                    None => return Ok(GroupOutcome::MissingItem(*item_id)),
                    Some(item) if item.session_id != group.session_id => {
                        return Ok(GroupOutcome::ForeignItem(*item_id));
                    }
                    Some(_) => {}
                }
            }
            tables.groups.insert(group.id, group.clone());
            Ok(GroupOutcome::Created(group))
        })
    }

    fn find_group(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GroupEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.tables.read().await.groups.get(&id).cloned()) })
    }

    fn list_groups(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<GroupEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.tables.read().await;
            Ok(tables
                .groups
                .values()
                .filter(|group| group.session_id == session_id)
                .cloned()
                .collect())
        })
    }

    fn delete_group(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let mut tables = store.tables.write().await;
            if tables.groups.shift_remove(&id).is_none() {
                return Ok(false);
            }
            tables.group_votes.retain(|(group_id, _)| *group_id != id);
            Ok(true)
        })
    }

    fn toggle_group_vote(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<VoteToggle>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut guard = store.tables.write().await;
            let tables = &mut *guard;
            let Some(group) = tables.groups.get_mut(&group_id) else {
                return Ok(None);
            };
            Ok(Some(toggle(
                &mut tables.group_votes,
                (group_id, user_id),
                &mut group.votes,
            )))
        })
    }

    fn insert_action_item(
        &self,
        action: ActionItemEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .tables
                .write()
                .await
                .action_items
                .insert(action.id, action);
            Ok(())
        })
    }

    fn find_action_item(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ActionItemEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.tables.read().await.action_items.get(&id).cloned()) })
    }

    fn list_action_items(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ActionItemEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.tables.read().await;
            Ok(tables
                .action_items
                .values()
                .filter(|action| action.session_id == session_id)
                .cloned()
                .collect())
        })
    }

    fn update_action_item(
        &self,
        action: ActionItemEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let mut tables = store.tables.write().await;
            match tables.action_items.get_mut(&action.id) {
                Some(existing) => {
                    *existing = action;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn delete_action_item(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .tables
                .write()
                .await
                .action_items
                .shift_remove(&id)
                .is_some())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::dao::models::SessionTemplate;

    fn session(created_by: Uuid) -> SessionEntity {
        let now = SystemTime::now();
        SessionEntity {
            id: Uuid::new_v4(),
            title: "Sprint 12".into(),
            description: None,
            template: SessionTemplate::StartStopContinue,
            status: SessionStatus::Active,
            created_by,
            scheduled_at: None,
            started_at: Some(now),
            ended_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn item(session_id: Uuid, content: &str) -> ItemEntity {
        let now = SystemTime::now();
        ItemEntity {
            id: Uuid::new_v4(),
            session_id,
            category: "start".into(),
            content: content.into(),
            author_id: None,
            is_anonymous: true,
            votes: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn toggling_twice_restores_the_count() {
        let store = MemoryRetroStore::new();
        let session = session(Uuid::new_v4());
        let item = item(session.id, "pairing");
        store.insert_session(session).await.unwrap();
        store.insert_item(item.clone()).await.unwrap();
        let user = Uuid::new_v4();

        let first = store.toggle_item_vote(item.id, user).await.unwrap().unwrap();
        assert_eq!(first, VoteToggle { voted: true, votes: 1 });
        let second = store.toggle_item_vote(item.id, user).await.unwrap().unwrap();
        assert_eq!(second, VoteToggle { voted: false, votes: 0 });
        assert!(store.tables.read().await.item_votes.is_empty());
    }

    #[tokio::test]
    async fn toggling_unknown_item_returns_none() {
        let store = MemoryRetroStore::new();
        assert!(
            store
                .toggle_item_vote(Uuid::new_v4(), Uuid::new_v4())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn merge_concatenates_and_drops_votes() {
        let store = MemoryRetroStore::new();
        let session = session(Uuid::new_v4());
        let source = item(session.id, "B");
        let target = item(session.id, "A");
        store.insert_session(session).await.unwrap();
        store.insert_item(source.clone()).await.unwrap();
        store.insert_item(target.clone()).await.unwrap();
        store.toggle_item_vote(target.id, Uuid::new_v4()).await.unwrap();
        store.toggle_item_vote(source.id, Uuid::new_v4()).await.unwrap();

        let merged = match store
            .merge_items(source.id, target.id, SystemTime::now())
            .await
            .unwrap()
        {
            MergeOutcome::Merged(item) => item,
            other => panic!("unexpected outcome {other:?}"),
        };
        assert_eq!(merged.content, "A | B");
        assert_eq!(merged.votes, 0);
        assert!(store.find_item(source.id).await.unwrap().is_none());
        assert!(store.tables.read().await.item_votes.is_empty());
    }

    #[tokio::test]
    async fn create_group_rejects_foreign_items_without_writing() {
        let store = MemoryRetroStore::new();
        let first = session(Uuid::new_v4());
        let second = session(Uuid::new_v4());
        let own = item(first.id, "own");
        let foreign = item(second.id, "foreign");
        store.insert_item(own.clone()).await.unwrap();
        store.insert_item(foreign.clone()).await.unwrap();

        let now = SystemTime::now();
        let group = GroupEntity {
            id: Uuid::new_v4(),
            session_id: first.id,
            name: "Process".into(),
            description: None,
            item_ids: vec![own.id, foreign.id],
            votes: 0,
            created_by: first.created_by,
            created_at: now,
            updated_at: now,
        };
        let outcome = store.create_group(group).await.unwrap();
        assert_eq!(outcome, GroupOutcome::ForeignItem(foreign.id));
        assert!(store.list_groups(first.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn status_update_is_conditional() {
        let store = MemoryRetroStore::new();
        let mut planned = session(Uuid::new_v4());
        planned.status = SessionStatus::Planned;
        planned.started_at = None;
        let id = planned.id;
        store.insert_session(planned).await.unwrap();

        let later = SystemTime::now() + Duration::from_secs(1);
        let stale = store
            .update_session_status(id, SessionStatus::Active, SessionStatus::Closed, later)
            .await
            .unwrap();
        assert_eq!(stale, StatusUpdate::Stale(SessionStatus::Planned));

        match store
            .update_session_status(id, SessionStatus::Planned, SessionStatus::Active, later)
            .await
            .unwrap()
        {
            StatusUpdate::Updated(session) => {
                assert_eq!(session.status, SessionStatus::Active);
                assert_eq!(session.started_at, Some(later));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn participant_upsert_counts_distinct_users() {
        let store = MemoryRetroStore::new();
        let session_id = Uuid::new_v4();
        let user = Uuid::new_v4();
        let now = SystemTime::now();
        assert_eq!(store.upsert_participant(session_id, user, now).await.unwrap(), 1);
        assert_eq!(store.upsert_participant(session_id, user, now).await.unwrap(), 1);
        assert_eq!(
            store
                .upsert_participant(session_id, Uuid::new_v4(), now)
                .await
                .unwrap(),
            2
        );
    }
}
