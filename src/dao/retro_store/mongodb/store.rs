use std::{sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    ClientSession, Collection, IndexModel,
    bson::{Bson, DateTime, Document, doc},
    options::{IndexOptions, ReturnDocument},
};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        ACTION_ITEMS, GROUP_VOTES, GROUPS, ITEM_VOTES, ITEMS, MongoActionItemDocument,
        MongoGroupDocument, MongoItemDocument, MongoParticipantDocument, MongoSessionDocument,
        PARTICIPANTS, SESSIONS, id_filter,
    },
};
use crate::dao::{
    models::{
        ActionItemEntity, GroupEntity, GroupOutcome, ItemEntity, MergeOutcome, ParticipantEntity,
        SessionEntity, SessionStatus, StatusUpdate, VoteToggle,
    },
    retro_store::RetroStore,
    storage::StorageResult,
};

/// MongoDB-backed [`RetroStore`]. Multi-document writes run inside transactions, so the
/// deployment must be a replica set.
#[derive(Clone)]
pub struct MongoRetroStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: mongodb::Client,
    database: mongodb::Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.state.read().await.database.clone();
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

/// Parent collection and vote collection touched by a vote toggle.
struct VoteTarget {
    parent: &'static str,
    votes: &'static str,
    key: &'static str,
}

const ITEM_VOTE_TARGET: VoteTarget = VoteTarget {
    parent: ITEMS,
    votes: ITEM_VOTES,
    key: "item_id",
};

const GROUP_VOTE_TARGET: VoteTarget = VoteTarget {
    parent: GROUPS,
    votes: GROUP_VOTES,
    key: "group_id",
};

async fn collect<T, E>(
    collection: &'static str,
    cursor: mongodb::Cursor<T>,
) -> MongoResult<Vec<E>>
where
    T: DeserializeOwned + Send + Sync + Unpin,
    E: TryFrom<T, Error = MongoDaoError>,
{
    let documents: Vec<T> = cursor
        .try_collect()
        .await
        .map_err(|source| MongoDaoError::Read { collection, source })?;
    documents.into_iter().map(E::try_from).collect()
}

fn read_votes(document: &Document) -> u32 {
    let raw = document
        .get_i64("votes")
        .or_else(|_| document.get_i32("votes").map(i64::from))
        .unwrap_or(0);
    u32::try_from(raw.max(0)).unwrap_or(u32::MAX)
}

fn transaction_error(operation: &'static str) -> impl FnOnce(mongodb::error::Error) -> MongoDaoError {
    move |source| MongoDaoError::Transaction { operation, source }
}

impl MongoRetroStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let store = Self {
            inner: Arc::new(MongoInner {
                state: RwLock::new(MongoState { client, database }),
                config,
            }),
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let indexes: [(&'static str, &'static str, Document, bool); 6] = [
            (PARTICIPANTS, "session_user", doc! {"session_id": 1, "user_id": 1}, true),
            (ITEMS, "session", doc! {"session_id": 1, "created_at": 1}, false),
            (ITEM_VOTES, "item_user", doc! {"item_id": 1, "user_id": 1}, true),
            (GROUPS, "session", doc! {"session_id": 1}, false),
            (GROUP_VOTES, "group_user", doc! {"group_id": 1, "user_id": 1}, true),
            (ACTION_ITEMS, "session", doc! {"session_id": 1}, false),
        ];

        for (collection, index, keys, unique) in indexes {
            let model = IndexModel::builder()
                .keys(keys)
                .options(
                    IndexOptions::builder()
                        .name(Some(format!("{collection}_{index}_idx")))
                        .unique(Some(unique))
                        .build(),
                )
                .build();
            self.collection::<Document>(collection)
                .await
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index,
                    source,
                })?;
        }
        Ok(())
    }

    async fn collection<T: Send + Sync>(&self, name: &'static str) -> Collection<T> {
        self.inner.state.read().await.database.collection::<T>(name)
    }

    async fn begin(&self, operation: &'static str) -> MongoResult<ClientSession> {
        let client = self.inner.state.read().await.client.clone();
        let mut session = client
            .start_session()
            .await
            .map_err(transaction_error(operation))?;
        session
            .start_transaction()
            .await
            .map_err(transaction_error(operation))?;
        Ok(session)
    }

    async fn insert<T: Serialize + Send + Sync>(
        &self,
        collection: &'static str,
        document: T,
    ) -> MongoResult<()> {
        self.collection::<T>(collection)
            .await
            .insert_one(document)
            .await
            .map_err(|source| MongoDaoError::write(collection, source))?;
        Ok(())
    }

    async fn find_by_id<T, E>(&self, collection: &'static str, id: Uuid) -> MongoResult<Option<E>>
    where
        T: DeserializeOwned + Send + Sync + Unpin,
        E: TryFrom<T, Error = MongoDaoError>,
    {
        self.collection::<T>(collection)
            .await
            .find_one(id_filter(id))
            .await
            .map_err(|source| MongoDaoError::Read { collection, source })?
            .map(E::try_from)
            .transpose()
    }

    async fn find_by_session<T, E>(
        &self,
        collection: &'static str,
        session_id: Uuid,
    ) -> MongoResult<Vec<E>>
    where
        T: DeserializeOwned + Send + Sync + Unpin,
        E: TryFrom<T, Error = MongoDaoError>,
    {
        let cursor = self
            .collection::<T>(collection)
            .await
            .find(doc! {"session_id": session_id.to_string()})
            .sort(doc! {"created_at": 1})
            .await
            .map_err(|source| MongoDaoError::Read { collection, source })?;
        collect(collection, cursor).await
    }

    async fn delete_by_id(&self, collection: &'static str, id: Uuid) -> MongoResult<bool> {
        let result = self
            .collection::<Document>(collection)
            .await
            .delete_one(id_filter(id))
            .await
            .map_err(|source| MongoDaoError::write(collection, source))?;
        Ok(result.deleted_count > 0)
    }

    async fn list_sessions(&self, user_id: Uuid) -> MongoResult<Vec<SessionEntity>> {
        let user = user_id.to_string();
        let joined: Vec<MongoParticipantDocument> = self
            .collection::<MongoParticipantDocument>(PARTICIPANTS)
            .await
            .find(doc! {"user_id": user.as_str()})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: PARTICIPANTS,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: PARTICIPANTS,
                source,
            })?;
        let joined_ids: Vec<String> = joined.into_iter().map(|p| p.session_id).collect();

        let cursor = self
            .collection::<MongoSessionDocument>(SESSIONS)
            .await
            .find(doc! {"$or": [{"created_by": user.as_str()}, {"_id": {"$in": joined_ids}}]})
            .sort(doc! {"created_at": -1})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: SESSIONS,
                source,
            })?;
        collect(SESSIONS, cursor).await
    }

    async fn update_session(&self, session: SessionEntity) -> MongoResult<bool> {
        let result = self
            .collection::<Document>(SESSIONS)
            .await
            .update_one(
                id_filter(session.id),
                doc! {"$set": {
                    "title": session.title,
                    "description": session.description,
                    "scheduled_at": session.scheduled_at.map(DateTime::from_system_time),
                    "updated_at": DateTime::from_system_time(session.updated_at),
                }},
            )
            .await
            .map_err(|source| MongoDaoError::write(SESSIONS, source))?;
        Ok(result.matched_count > 0)
    }

    async fn update_session_status(
        &self,
        id: Uuid,
        expected: SessionStatus,
        next: SessionStatus,
        at: SystemTime,
    ) -> MongoResult<StatusUpdate> {
        let at = DateTime::from_system_time(at);
        let mut set = doc! {"status": next.as_str(), "updated_at": at};
        match (expected, next) {
            (SessionStatus::Planned, SessionStatus::Active) => {
                set.insert("started_at", at);
            }
            (SessionStatus::Closed, _) => {
                set.insert("ended_at", Bson::Null);
            }
            (_, SessionStatus::Closed) => {
                set.insert("ended_at", at);
            }
            _ => {}
        }

        let sessions = self.collection::<MongoSessionDocument>(SESSIONS).await;
        let mut filter = id_filter(id);
        filter.insert("status", expected.as_str());
        let updated = sessions
            .find_one_and_update(filter, doc! {"$set": set})
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::write(SESSIONS, source))?;
        if let Some(document) = updated {
            return Ok(StatusUpdate::Updated(document.try_into()?));
        }

        match self
            .find_by_id::<MongoSessionDocument, SessionEntity>(SESSIONS, id)
            .await?
        {
            Some(current) => Ok(StatusUpdate::Stale(current.status)),
            None => Ok(StatusUpdate::Missing),
        }
    }

    async fn delete_session(&self, id: Uuid) -> MongoResult<bool> {
        const OPERATION: &str = "delete_session";
        let mut tx = self.begin(OPERATION).await?;
        let session_filter = doc! {"session_id": id.to_string()};

        let removed = self
            .collection::<Document>(SESSIONS)
            .await
            .delete_one(id_filter(id))
            .session(&mut tx)
            .await
            .map_err(transaction_error(OPERATION))?;
        if removed.deleted_count == 0 {
            return Ok(false);
        }

        let item_ids = self
            .ids_in_session(ITEMS, &session_filter, &mut tx, OPERATION)
            .await?;
        let group_ids = self
            .ids_in_session(GROUPS, &session_filter, &mut tx, OPERATION)
            .await?;

        let cascades = [
            (ITEM_VOTES, doc! {"item_id": {"$in": item_ids}}),
            (GROUP_VOTES, doc! {"group_id": {"$in": group_ids}}),
            (ITEMS, session_filter.clone()),
            (GROUPS, session_filter.clone()),
            (ACTION_ITEMS, session_filter.clone()),
            (PARTICIPANTS, session_filter),
        ];
        for (collection, filter) in cascades {
            self.collection::<Document>(collection)
                .await
                .delete_many(filter)
                .session(&mut tx)
                .await
                .map_err(transaction_error(OPERATION))?;
        }

        tx.commit_transaction()
            .await
            .map_err(transaction_error(OPERATION))?;
        Ok(true)
    }

    async fn ids_in_session(
        &self,
        collection: &'static str,
        filter: &Document,
        tx: &mut ClientSession,
        operation: &'static str,
    ) -> MongoResult<Vec<String>> {
        let mut cursor = self
            .collection::<Document>(collection)
            .await
            .find(filter.clone())
            .projection(doc! {"_id": 1})
            .session(&mut *tx)
            .await
            .map_err(transaction_error(operation))?;
        let mut ids = Vec::new();
        while let Some(document) = cursor
            .next(&mut *tx)
            .await
            .transpose()
            .map_err(transaction_error(operation))?
        {
            if let Ok(id) = document.get_str("_id") {
                ids.push(id.to_owned());
            }
        }
        Ok(ids)
    }

    async fn upsert_participant(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        at: SystemTime,
    ) -> MongoResult<usize> {
        let at = DateTime::from_system_time(at);
        let participants = self.collection::<Document>(PARTICIPANTS).await;
        participants
            .update_one(
                doc! {"session_id": session_id.to_string(), "user_id": user_id.to_string()},
                doc! {"$set": {"last_seen": at}, "$setOnInsert": {"joined_at": at}},
            )
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::write(PARTICIPANTS, source))?;
        let count = participants
            .count_documents(doc! {"session_id": session_id.to_string()})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: PARTICIPANTS,
                source,
            })?;
        Ok(usize::try_from(count).unwrap_or(usize::MAX))
    }

    async fn list_participants(&self, session_id: Uuid) -> MongoResult<Vec<ParticipantEntity>> {
        let cursor = self
            .collection::<MongoParticipantDocument>(PARTICIPANTS)
            .await
            .find(doc! {"session_id": session_id.to_string()})
            .sort(doc! {"joined_at": 1})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: PARTICIPANTS,
                source,
            })?;
        collect(PARTICIPANTS, cursor).await
    }

    async fn delete_item(&self, id: Uuid) -> MongoResult<bool> {
        const OPERATION: &str = "delete_item";
        let mut tx = self.begin(OPERATION).await?;
        let removed = self
            .collection::<Document>(ITEMS)
            .await
            .delete_one(id_filter(id))
            .session(&mut tx)
            .await
            .map_err(transaction_error(OPERATION))?;
        if removed.deleted_count == 0 {
            return Ok(false);
        }
        self.detach_item(id, &mut tx, OPERATION).await?;
        tx.commit_transaction()
            .await
            .map_err(transaction_error(OPERATION))?;
        Ok(true)
    }

    /// Drop the votes and group memberships of an item that is being removed.
    async fn detach_item(
        &self,
        id: Uuid,
        tx: &mut ClientSession,
        operation: &'static str,
    ) -> MongoResult<()> {
        self.collection::<Document>(ITEM_VOTES)
            .await
            .delete_many(doc! {"item_id": id.to_string()})
            .session(&mut *tx)
            .await
            .map_err(transaction_error(operation))?;
        self.collection::<Document>(GROUPS)
            .await
            .update_many(
                doc! {"item_ids": id.to_string()},
                doc! {"$pull": {"item_ids": id.to_string()}},
            )
            .session(&mut *tx)
            .await
            .map_err(transaction_error(operation))?;
        Ok(())
    }

    async fn toggle_vote(
        &self,
        target: VoteTarget,
        parent_id: Uuid,
        user_id: Uuid,
    ) -> MongoResult<Option<VoteToggle>> {
        const OPERATION: &str = "toggle_vote";
        let mut tx = self.begin(OPERATION).await?;
        let parents = self.collection::<Document>(target.parent).await;
        let exists = parents
            .find_one(id_filter(parent_id))
            .session(&mut tx)
            .await
            .map_err(transaction_error(OPERATION))?
            .is_some();
        if !exists {
            return Ok(None);
        }

        let mut vote = Document::new();
        vote.insert(target.key, parent_id.to_string());
        vote.insert("user_id", user_id.to_string());
        let votes = self.collection::<Document>(target.votes).await;
        let removed = votes
            .delete_one(vote.clone())
            .session(&mut tx)
            .await
            .map_err(transaction_error(OPERATION))?;
        let voted = removed.deleted_count == 0;
        let delta: i64 = if voted {
            let mut row = vote;
            row.insert("created_at", DateTime::now());
            votes
                .insert_one(row)
                .session(&mut tx)
                .await
                .map_err(transaction_error(OPERATION))?;
            1
        } else {
            -1
        };

        let updated = parents
            .find_one_and_update(id_filter(parent_id), doc! {"$inc": {"votes": delta}})
            .return_document(ReturnDocument::After)
            .session(&mut tx)
            .await
            .map_err(transaction_error(OPERATION))?;
        tx.commit_transaction()
            .await
            .map_err(transaction_error(OPERATION))?;

        debug!(collection = target.parent, %parent_id, %user_id, voted, "vote toggled");
        Ok(updated.map(|document| VoteToggle {
            voted,
            votes: read_votes(&document),
        }))
    }

    async fn merge_items(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        at: SystemTime,
    ) -> MongoResult<MergeOutcome> {
        const OPERATION: &str = "merge_items";
        let mut tx = self.begin(OPERATION).await?;
        let items = self.collection::<MongoItemDocument>(ITEMS).await;

        let Some(source) = items
            .find_one(id_filter(source_id))
            .session(&mut tx)
            .await
            .map_err(transaction_error(OPERATION))?
        else {
            return Ok(MergeOutcome::Missing(source_id));
        };
        let Some(target) = items
            .find_one(id_filter(target_id))
            .session(&mut tx)
            .await
            .map_err(transaction_error(OPERATION))?
        else {
            return Ok(MergeOutcome::Missing(target_id));
        };

        let merged = items
            .find_one_and_update(
                id_filter(target_id),
                doc! {"$set": {
                    "content": format!("{} | {}", target.content, source.content),
                    "votes": 0_i64,
                    "updated_at": DateTime::from_system_time(at),
                }},
            )
            .return_document(ReturnDocument::After)
            .session(&mut tx)
            .await
            .map_err(transaction_error(OPERATION))?;
        let Some(merged) = merged else {
            return Ok(MergeOutcome::Missing(target_id));
        };

        self.collection::<Document>(ITEM_VOTES)
            .await
            .delete_many(doc! {"item_id": target_id.to_string()})
            .session(&mut tx)
            .await
            .map_err(transaction_error(OPERATION))?;
        items
            .delete_one(id_filter(source_id))
            .session(&mut tx)
            .await
            .map_err(transaction_error(OPERATION))?;
        self.detach_item(source_id, &mut tx, OPERATION).await?;

        tx.commit_transaction()
            .await
            .map_err(transaction_error(OPERATION))?;
        Ok(MergeOutcome::Merged(merged.try_into()?))
    }

    async fn create_group(&self, group: GroupEntity) -> MongoResult<GroupOutcome> {
        const OPERATION: &str = "create_group";
        let mut tx = self.begin(OPERATION).await?;
        let items = self.collection::<MongoItemDocument>(ITEMS).await;
        let session_id = group.session_id.to_string();

        for item_id in &group.item_ids {
            let item = items
                .find_one(id_filter(*item_id))
                .session(&mut tx)
                .await
                .map_err(transaction_error(OPERATION))?;
            match item {
                None => return Ok(GroupOutcome::MissingItem(*item_id)),
                Some(item) if item.session_id != session_id => {
                    return Ok(GroupOutcome::ForeignItem(*item_id));
                }
                Some(_) => {}
            }
        }

        self.collection::<MongoGroupDocument>(GROUPS)
            .await
            .insert_one(MongoGroupDocument::from(group.clone()))
            .session(&mut tx)
            .await
            .map_err(transaction_error(OPERATION))?;
        tx.commit_transaction()
            .await
            .map_err(transaction_error(OPERATION))?;
        Ok(GroupOutcome::Created(group))
    }

    async fn delete_group(&self, id: Uuid) -> MongoResult<bool> {
        const OPERATION: &str = "delete_group";
        let mut tx = self.begin(OPERATION).await?;
        let removed = self
            .collection::<Document>(GROUPS)
            .await
            .delete_one(id_filter(id))
            .session(&mut tx)
            .await
            .map_err(transaction_error(OPERATION))?;
        if removed.deleted_count == 0 {
            return Ok(false);
        }
        self.collection::<Document>(GROUP_VOTES)
            .await
            .delete_many(doc! {"group_id": id.to_string()})
            .session(&mut tx)
            .await
            .map_err(transaction_error(OPERATION))?;
        tx.commit_transaction()
            .await
            .map_err(transaction_error(OPERATION))?;
        Ok(true)
    }

    async fn update_action_item(&self, action: ActionItemEntity) -> MongoResult<bool> {
        let id = action.id;
        let result = self
            .collection::<MongoActionItemDocument>(ACTION_ITEMS)
            .await
            .replace_one(id_filter(id), MongoActionItemDocument::from(action))
            .await
            .map_err(|source| MongoDaoError::write(ACTION_ITEMS, source))?;
        Ok(result.matched_count > 0)
    }
}

impl RetroStore for MongoRetroStore {
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .insert(SESSIONS, MongoSessionDocument::from(session))
                .await
                .map_err(Into::into)
        })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_by_id::<MongoSessionDocument, _>(SESSIONS, id)
                .await
                .map_err(Into::into)
        })
    }

    fn list_sessions(
        &self,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_sessions(user_id).await.map_err(Into::into) })
    }

    fn update_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.update_session(session).await.map_err(Into::into) })
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
            store
                .update_session_status(id, expected, next, at)
                .await
                .map_err(Into::into)
        })
    }

    fn delete_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_session(id).await.map_err(Into::into) })
    }

    fn upsert_participant(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<usize>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .upsert_participant(session_id, user_id, at)
                .await
                .map_err(Into::into)
        })
    }

    fn list_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_participants(session_id).await.map_err(Into::into) })
    }

    fn insert_item(&self, item: ItemEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .insert(ITEMS, MongoItemDocument::from(item))
                .await
                .map_err(Into::into)
        })
    }

    fn find_item(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<ItemEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_by_id::<MongoItemDocument, _>(ITEMS, id)
                .await
                .map_err(Into::into)
        })
    }

    fn list_items(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<ItemEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_by_session::<MongoItemDocument, _>(ITEMS, session_id)
                .await
                .map_err(Into::into)
        })
    }

    fn delete_item(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_item(id).await.map_err(Into::into) })
    }

    fn toggle_item_vote(
        &self,
        item_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<VoteToggle>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .toggle_vote(ITEM_VOTE_TARGET, item_id, user_id)
                .await
                .map_err(Into::into)
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
            store
                .merge_items(source_id, target_id, at)
                .await
                .map_err(Into::into)
        })
    }

    fn create_group(&self, group: GroupEntity) -> BoxFuture<'static, StorageResult<GroupOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.create_group(group).await.map_err(Into::into) })
    }

    fn find_group(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GroupEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_by_id::<MongoGroupDocument, _>(GROUPS, id)
                .await
                .map_err(Into::into)
        })
    }

    fn list_groups(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<GroupEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_by_session::<MongoGroupDocument, _>(GROUPS, session_id)
                .await
                .map_err(Into::into)
        })
    }

    fn delete_group(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_group(id).await.map_err(Into::into) })
    }

    fn toggle_group_vote(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<VoteToggle>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .toggle_vote(GROUP_VOTE_TARGET, group_id, user_id)
                .await
                .map_err(Into::into)
        })
    }

    fn insert_action_item(
        &self,
        action: ActionItemEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .insert(ACTION_ITEMS, MongoActionItemDocument::from(action))
                .await
                .map_err(Into::into)
        })
    }

    fn find_action_item(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ActionItemEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_by_id::<MongoActionItemDocument, _>(ACTION_ITEMS, id)
                .await
                .map_err(Into::into)
        })
    }

    fn list_action_items(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ActionItemEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_by_session::<MongoActionItemDocument, _>(ACTION_ITEMS, session_id)
                .await
                .map_err(Into::into)
        })
    }

    fn update_action_item(
        &self,
        action: ActionItemEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.update_action_item(action).await.map_err(Into::into) })
    }

    fn delete_action_item(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_by_id(ACTION_ITEMS, id)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
