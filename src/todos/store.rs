//! Todo store — the single normalized state container.
//!
//! Asynchronous operations call the remote collection first and only touch
//! local state on success. Every applied change is written to the mirror and
//! broadcast to subscribers once the state lock is released.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

use super::api::TodoApi;
use super::mirror::Mirror;
use super::model::{Filter, NewTodo, Status, TodoCollection, TodoId, TodoItem, TodoPatch};
use crate::error::{self, Error, MirrorError, RemoteError, StoreError};

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Change notifications sent to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// A fetch-all started.
    FetchStarted,
    /// The remote collection replaced local state.
    Synced { count: usize },
    /// A create request started.
    AddStarted,
    Created { id: TodoId },
    Updated { id: TodoId },
    Toggled { id: TodoId, completed: bool },
    Deleted { id: TodoId },
    FilterChanged { filter: Filter },
    ClearedCompleted { removed: usize },
    Reordered { count: usize },
    /// A remote operation failed; `message` is the stored error text.
    Failed { message: String },
}

/// Counts shown next to the filter buttons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterCounts {
    pub all: usize,
    pub active: usize,
    pub completed: usize,
}

/// Normalized store state: id-keyed items plus the explicit display order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TodoState {
    items: HashMap<TodoId, TodoItem>,
    all_ids: Vec<TodoId>,
    pub active_filter: Filter,
    pub get_status: Status,
    pub add_status: Status,
    /// Status of the last toggle or delete.
    pub change_status: Status,
    pub error: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl TodoState {
    /// Build state from a persisted collection, keeping its order.
    pub fn from_collection(collection: TodoCollection) -> Self {
        let mut state = Self::default();
        state.replace_all(collection.into_values());
        state
    }

    /// The collection in display order, ready for the mirror.
    pub fn to_collection(&self) -> TodoCollection {
        self.all_ids
            .iter()
            .filter_map(|id| self.items.get(id).map(|item| (*id, item.clone())))
            .collect()
    }

    pub fn all_ids(&self) -> &[TodoId] {
        &self.all_ids
    }

    pub fn get(&self, id: TodoId) -> Option<&TodoItem> {
        self.items.get(&id)
    }

    pub fn len(&self) -> usize {
        self.all_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all_ids.is_empty()
    }

    /// All items in display order.
    pub fn ordered(&self) -> Vec<TodoItem> {
        self.all_ids
            .iter()
            .filter_map(|id| self.items.get(id))
            .cloned()
            .collect()
    }

    /// Items passing the active filter, in display order.
    pub fn filtered(&self) -> Vec<TodoItem> {
        let filter = self.active_filter;
        self.all_ids
            .iter()
            .filter_map(|id| self.items.get(id))
            .filter(|item| filter.matches(item))
            .cloned()
            .collect()
    }

    pub fn counts(&self) -> FilterCounts {
        let completed = self.items.values().filter(|t| t.completed).count();
        FilterCounts {
            all: self.items.len(),
            active: self.items.len() - completed,
            completed,
        }
    }

    /// Replace everything with `items`; later duplicates of an id win but keep
    /// the first position.
    pub fn replace_all(&mut self, items: impl IntoIterator<Item = TodoItem>) {
        self.items.clear();
        self.all_ids.clear();
        for item in items {
            self.insert(item);
        }
    }

    /// Insert or replace an item. New ids are appended to the order.
    pub fn insert(&mut self, item: TodoItem) {
        let id = item.id;
        if self.items.insert(id, item).is_none() {
            self.all_ids.push(id);
        }
    }

    /// Shallow-merge `patch` into an existing item.
    pub fn merge(&mut self, id: TodoId, patch: &TodoPatch) -> bool {
        match self.items.get_mut(&id) {
            Some(item) => {
                patch.apply(item);
                true
            }
            None => false,
        }
    }

    /// Flip the completion flag; returns the new value.
    pub fn toggle(&mut self, id: TodoId) -> Option<bool> {
        let item = self.items.get_mut(&id)?;
        item.completed = !item.completed;
        Some(item.completed)
    }

    pub fn remove(&mut self, id: TodoId) -> Option<TodoItem> {
        let removed = self.items.remove(&id)?;
        self.all_ids.retain(|existing| *existing != id);
        Some(removed)
    }

    /// Drop every completed item; returns how many were removed.
    pub fn clear_completed(&mut self) -> usize {
        let before = self.items.len();
        self.items.retain(|_, item| !item.completed);
        let items = &self.items;
        self.all_ids.retain(|id| items.contains_key(id));
        before - self.items.len()
    }

    /// Key set and order list hold the same ids, without duplicates.
    pub fn is_consistent(&self) -> bool {
        if self.items.len() != self.all_ids.len() {
            return false;
        }
        let mut seen = std::collections::HashSet::with_capacity(self.all_ids.len());
        self.all_ids
            .iter()
            .all(|id| seen.insert(*id) && self.items.contains_key(id))
    }
}

/// Which status flag an operation reports through.
#[derive(Debug, Clone, Copy)]
enum Flag {
    Get,
    Add,
    Change,
}

/// Shared todo store. Hand out as `Arc<TodoStore>`.
pub struct TodoStore {
    state: RwLock<TodoState>,
    api: Arc<dyn TodoApi>,
    mirror: Arc<dyn Mirror>,
    tx: broadcast::Sender<StoreEvent>,
}

impl TodoStore {
    /// Create a store seeded from the mirror. The mirror is read only here.
    pub async fn load(
        api: Arc<dyn TodoApi>,
        mirror: Arc<dyn Mirror>,
    ) -> Result<Arc<Self>, MirrorError> {
        let collection = mirror.read().await?;
        info!(count = collection.len(), "Loaded todos from mirror");
        Ok(Self::with_state(api, mirror, TodoState::from_collection(collection)))
    }

    /// Create a store with explicit initial state, without reading the mirror.
    pub fn with_state(
        api: Arc<dyn TodoApi>,
        mirror: Arc<dyn Mirror>,
        state: TodoState,
    ) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Arc::new(Self {
            state: RwLock::new(state),
            api,
            mirror,
            tx,
        })
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    fn emit(&self, event: StoreEvent) {
        // ok if nobody is listening
        let _ = self.tx.send(event);
    }

    /// Record a remote failure on `flag` and notify subscribers.
    async fn fail(&self, flag: Flag, err: RemoteError) -> Error {
        let message = err.to_string();
        {
            let mut state = self.state.write().await;
            match flag {
                Flag::Get => state.get_status = Status::Failed,
                Flag::Add => state.add_status = Status::Failed,
                Flag::Change => state.change_status = Status::Failed,
            }
            state.error = Some(message.clone());
        }
        warn!(error = %message, "Remote todo operation failed");
        self.emit(StoreEvent::Failed { message });
        err.into()
    }

    async fn mirror_state(&self, state: &TodoState) -> Result<(), MirrorError> {
        let result = self.mirror.write(&state.to_collection()).await;
        if let Err(e) = &result {
            warn!(error = %e, "Failed to write todo mirror");
        }
        result
    }

    // ── Asynchronous operations ─────────────────────────────────────

    /// Replace local state with the remote collection.
    pub async fn fetch_all(&self) -> error::Result<()> {
        self.state.write().await.get_status = Status::Pending;
        self.emit(StoreEvent::FetchStarted);

        let todos = match self.api.list().await {
            Ok(todos) => todos,
            Err(e) => return Err(self.fail(Flag::Get, e).await),
        };

        let (count, mirrored) = {
            let mut state = self.state.write().await;
            state.replace_all(todos);
            state.get_status = Status::Succeeded;
            state.last_synced_at = Some(Utc::now());
            (state.len(), self.mirror_state(&state).await)
        };

        info!(count, "Fetched todos");
        self.emit(StoreEvent::Synced { count });
        Ok(mirrored?)
    }

    /// Create a todo; the server assigns its id.
    pub async fn create(&self, title: &str, user_id: i64) -> error::Result<TodoId> {
        let title = title.trim();
        if title.is_empty() {
            return Err(StoreError::Validation("title must not be empty".into()).into());
        }

        self.state.write().await.add_status = Status::Pending;
        self.emit(StoreEvent::AddStarted);

        let body = NewTodo {
            user_id,
            title: title.to_string(),
        };
        let created = match self.api.create(&body).await {
            Ok(created) => created,
            Err(e) => return Err(self.fail(Flag::Add, e).await),
        };

        let id = created.id;
        let item = TodoItem {
            id,
            user_id: Some(user_id),
            title: created.title,
            completed: false,
        };

        let mirrored = {
            let mut state = self.state.write().await;
            if state.get(id).is_some() {
                warn!(id = %id, "Server returned an existing id, replacing item");
            }
            state.insert(item);
            state.add_status = Status::Succeeded;
            self.mirror_state(&state).await
        };

        info!(id = %id, "Todo created");
        self.emit(StoreEvent::Created { id });
        mirrored?;
        Ok(id)
    }

    /// Send `data` to the server and merge it locally on success.
    pub async fn edit(&self, id: TodoId, data: TodoPatch) -> error::Result<()> {
        if data.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(StoreError::Validation("title must not be empty".into()).into());
        }

        if let Err(e) = self.api.replace(id, &data).await {
            return Err(self.fail(Flag::Add, e).await);
        }

        let mirrored = {
            let mut state = self.state.write().await;
            if !state.merge(id, &data) {
                warn!(id = %id, "Edited todo no longer present, skipping");
                return Ok(());
            }
            self.mirror_state(&state).await
        };

        info!(id = %id, "Todo updated");
        self.emit(StoreEvent::Updated { id });
        Ok(mirrored?)
    }

    /// Flip a todo's completion flag.
    ///
    /// The PATCH body is sent empty; the server is not told the new value.
    pub async fn toggle(&self, id: TodoId) -> error::Result<()> {
        self.state.write().await.change_status = Status::Pending;

        if let Err(e) = self.api.patch(id, &TodoPatch::default()).await {
            return Err(self.fail(Flag::Change, e).await);
        }

        let (completed, mirrored) = {
            let mut state = self.state.write().await;
            state.change_status = Status::Succeeded;
            let Some(completed) = state.toggle(id) else {
                warn!(id = %id, "Toggled todo no longer present, skipping");
                return Ok(());
            };
            (completed, self.mirror_state(&state).await)
        };

        info!(id = %id, completed, "Todo toggled");
        self.emit(StoreEvent::Toggled { id, completed });
        Ok(mirrored?)
    }

    /// Delete a todo remotely, then locally.
    pub async fn delete(&self, id: TodoId) -> error::Result<()> {
        self.state.write().await.change_status = Status::Pending;

        if let Err(e) = self.api.delete(id).await {
            return Err(self.fail(Flag::Change, e).await);
        }

        let mirrored = {
            let mut state = self.state.write().await;
            state.change_status = Status::Succeeded;
            if state.remove(id).is_none() {
                debug!(id = %id, "Deleted todo was not present locally");
                return Ok(());
            }
            self.mirror_state(&state).await
        };

        info!(id = %id, "Todo deleted");
        self.emit(StoreEvent::Deleted { id });
        Ok(mirrored?)
    }

    // ── Synchronous operations ──────────────────────────────────────

    pub async fn change_filter(&self, filter: Filter) {
        self.state.write().await.active_filter = filter;
        debug!(filter = %filter, "Filter changed");
        self.emit(StoreEvent::FilterChanged { filter });
    }

    /// Remove completed todos locally. The remote collection is not told.
    pub async fn clear_completed(&self) -> Result<usize, MirrorError> {
        let (removed, mirrored) = {
            let mut state = self.state.write().await;
            let removed = state.clear_completed();
            (removed, self.mirror_state(&state).await)
        };

        info!(removed, "Cleared completed todos");
        self.emit(StoreEvent::ClearedCompleted { removed });
        mirrored.map(|()| removed)
    }

    /// Replace the collection with `items` in the given order. Local only.
    pub async fn reorder(&self, items: Vec<TodoItem>) -> Result<(), MirrorError> {
        let (count, mirrored) = {
            let mut state = self.state.write().await;
            state.replace_all(items);
            (state.len(), self.mirror_state(&state).await)
        };

        debug!(count, "Todos reordered");
        self.emit(StoreEvent::Reordered { count });
        mirrored
    }

    // ── Selections ──────────────────────────────────────────────────

    pub async fn items(&self) -> Vec<TodoItem> {
        self.state.read().await.ordered()
    }

    pub async fn item(&self, id: TodoId) -> Option<TodoItem> {
        self.state.read().await.get(id).cloned()
    }

    pub async fn filtered(&self) -> Vec<TodoItem> {
        self.state.read().await.filtered()
    }

    pub async fn active_filter(&self) -> Filter {
        self.state.read().await.active_filter
    }

    pub async fn counts(&self) -> FilterCounts {
        self.state.read().await.counts()
    }

    pub async fn get_status(&self) -> Status {
        self.state.read().await.get_status
    }

    pub async fn add_status(&self) -> Status {
        self.state.read().await.add_status
    }

    pub async fn change_status(&self) -> Status {
        self.state.read().await.change_status
    }

    pub async fn error(&self) -> Option<String> {
        self.state.read().await.error.clone()
    }

    /// Clone of the whole state.
    pub async fn snapshot(&self) -> TodoState {
        self.state.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::todos::mirror::MemoryMirror;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    /// In-memory stand-in for the remote collection.
    struct StubApi {
        todos: Mutex<Vec<TodoItem>>,
        next_id: AtomicU64,
        failing: AtomicBool,
        patches: Mutex<Vec<(TodoId, TodoPatch)>>,
    }

    impl StubApi {
        fn new(todos: Vec<TodoItem>) -> Arc<Self> {
            Arc::new(Self {
                todos: Mutex::new(todos),
                next_id: AtomicU64::new(201),
                failing: AtomicBool::new(false),
                patches: Mutex::new(Vec::new()),
            })
        }

        fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        fn check(&self, err: RemoteError) -> Result<(), RemoteError> {
            if self.failing.load(Ordering::SeqCst) {
                Err(err)
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl TodoApi for StubApi {
        async fn list(&self) -> Result<Vec<TodoItem>, RemoteError> {
            self.check(RemoteError::Fetch)?;
            Ok(self.todos.lock().unwrap().clone())
        }

        async fn create(&self, todo: &NewTodo) -> Result<TodoItem, RemoteError> {
            self.check(RemoteError::Add)?;
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            Ok(TodoItem::new(id, todo.title.clone()).with_user(todo.user_id))
        }

        async fn replace(&self, _id: TodoId, _data: &TodoPatch) -> Result<(), RemoteError> {
            self.check(RemoteError::Edit)
        }

        async fn patch(&self, id: TodoId, data: &TodoPatch) -> Result<(), RemoteError> {
            self.check(RemoteError::Toggle)?;
            self.patches.lock().unwrap().push((id, data.clone()));
            Ok(())
        }

        async fn delete(&self, _id: TodoId) -> Result<(), RemoteError> {
            self.check(RemoteError::Delete)
        }
    }

    fn scenario_todos() -> Vec<TodoItem> {
        vec![
            TodoItem::new(1, "a"),
            TodoItem::new(2, "b").with_completed(true),
        ]
    }

    async fn make_store(todos: Vec<TodoItem>) -> (Arc<TodoStore>, Arc<StubApi>, Arc<MemoryMirror>) {
        let api = StubApi::new(todos);
        let mirror = Arc::new(MemoryMirror::new());
        let store = TodoStore::load(api.clone(), mirror.clone()).await.unwrap();
        (store, api, mirror)
    }

    fn ids(items: &[TodoItem]) -> Vec<u64> {
        items.iter().map(|t| t.id.0).collect()
    }

    #[tokio::test]
    async fn fetch_then_filter_scenario() {
        let (store, _api, _mirror) = make_store(scenario_todos()).await;
        store.fetch_all().await.unwrap();
        assert_eq!(store.get_status().await, Status::Succeeded);

        store.change_filter(Filter::Completed).await;
        assert_eq!(ids(&store.filtered().await), vec![2]);

        store.change_filter(Filter::Active).await;
        assert_eq!(ids(&store.filtered().await), vec![1]);

        store.change_filter(Filter::All).await;
        assert_eq!(ids(&store.filtered().await), vec![1, 2]);
    }

    #[tokio::test]
    async fn fetch_writes_mirror_and_sync_time() {
        let (store, _api, mirror) = make_store(scenario_todos()).await;
        store.fetch_all().await.unwrap();
        assert_eq!(mirror.read().await.unwrap().len(), 2);
        assert!(store.snapshot().await.last_synced_at.is_some());
    }

    #[tokio::test]
    async fn fetch_failure_sets_flag_and_keeps_items() {
        let (store, api, _mirror) = make_store(scenario_todos()).await;
        store.fetch_all().await.unwrap();
        api.set_failing(true);

        let err = store.fetch_all().await.unwrap_err();
        assert!(matches!(err, Error::Remote(RemoteError::Fetch)));
        assert_eq!(store.get_status().await, Status::Failed);
        assert_eq!(store.error().await.as_deref(), Some("Error fetching todos"));
        assert_eq!(store.items().await.len(), 2);
    }

    #[tokio::test]
    async fn load_reads_mirror_in_order() {
        let mirror = Arc::new(MemoryMirror::with_text(
            r#"{"5":{"id":5,"title":"five","completed":false},"2":{"id":2,"title":"two","completed":true}}"#,
        ));
        let store = TodoStore::load(StubApi::new(vec![]), mirror).await.unwrap();
        assert_eq!(ids(&store.items().await), vec![5, 2]);
        assert!(store.snapshot().await.is_consistent());
    }

    #[tokio::test]
    async fn create_appends_and_mirrors() {
        let (store, _api, mirror) = make_store(scenario_todos()).await;
        store.fetch_all().await.unwrap();

        let id = store.create("write tests", 1).await.unwrap();
        assert_eq!(id, TodoId(201));
        assert_eq!(store.add_status().await, Status::Succeeded);

        let items = store.items().await;
        assert_eq!(ids(&items), vec![1, 2, 201]);
        assert_eq!(items[2].user_id, Some(1));
        assert!(!items[2].completed);

        let mirrored = mirror.read().await.unwrap();
        assert!(mirrored.contains_key(&TodoId(201)));
    }

    #[tokio::test]
    async fn create_failure_leaves_state_unchanged() {
        let (store, api, mirror) = make_store(scenario_todos()).await;
        store.fetch_all().await.unwrap();
        let before = store.snapshot().await;
        let mirror_before = mirror.text();
        api.set_failing(true);

        let err = store.create("doomed", 1).await.unwrap_err();
        assert!(matches!(err, Error::Remote(RemoteError::Add)));

        let after = store.snapshot().await;
        assert_eq!(after.ordered(), before.ordered());
        assert_eq!(after.all_ids(), before.all_ids());
        assert_eq!(after.add_status, Status::Failed);
        assert_eq!(after.error.as_deref(), Some("Error adding todo"));
        assert_eq!(mirror.text(), mirror_before);
    }

    #[tokio::test]
    async fn create_rejects_blank_title_without_network() {
        let (store, api, _mirror) = make_store(vec![]).await;
        api.set_failing(true);
        let err = store.create("   ", 1).await.unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::Validation(_))));
        assert_eq!(store.add_status().await, Status::Idle);
    }

    #[tokio::test]
    async fn create_with_repeated_server_id_keeps_ids_consistent() {
        let (store, api, _mirror) = make_store(vec![]).await;
        store.create("first", 1).await.unwrap();
        api.next_id.store(201, Ordering::SeqCst);
        store.create("second", 1).await.unwrap();

        let state = store.snapshot().await;
        assert!(state.is_consistent());
        assert_eq!(state.len(), 1);
        assert_eq!(state.get(TodoId(201)).unwrap().title, "second");
    }

    #[tokio::test]
    async fn edit_merges_and_preserves_other_fields() {
        let (store, _api, mirror) = make_store(scenario_todos()).await;
        store.fetch_all().await.unwrap();

        store.edit(TodoId(2), TodoPatch::title("bee")).await.unwrap();
        let item = store.item(TodoId(2)).await.unwrap();
        assert_eq!(item.title, "bee");
        assert!(item.completed);
        assert_eq!(mirror.read().await.unwrap()[&TodoId(2)].title, "bee");
    }

    #[tokio::test]
    async fn edit_failure_sets_add_status() {
        let (store, api, _mirror) = make_store(scenario_todos()).await;
        store.fetch_all().await.unwrap();
        api.set_failing(true);

        assert!(store.edit(TodoId(1), TodoPatch::title("x")).await.is_err());
        assert_eq!(store.item(TodoId(1)).await.unwrap().title, "a");
        assert_eq!(store.add_status().await, Status::Failed);
        assert_eq!(store.error().await.as_deref(), Some("Error editing todo"));
    }

    #[tokio::test]
    async fn toggle_flips_and_sends_empty_patch() {
        let (store, api, _mirror) = make_store(scenario_todos()).await;
        store.fetch_all().await.unwrap();

        store.toggle(TodoId(1)).await.unwrap();
        assert!(store.item(TodoId(1)).await.unwrap().completed);
        store.toggle(TodoId(1)).await.unwrap();
        assert!(!store.item(TodoId(1)).await.unwrap().completed);

        let patches = api.patches.lock().unwrap().clone();
        assert_eq!(patches.len(), 2);
        assert!(patches.iter().all(|(_, p)| p.is_empty()));
    }

    #[tokio::test]
    async fn toggle_after_delete_does_not_recreate_item() {
        let (store, _api, _mirror) = make_store(scenario_todos()).await;
        store.fetch_all().await.unwrap();
        store.delete(TodoId(1)).await.unwrap();

        store.toggle(TodoId(1)).await.unwrap();
        let state = store.snapshot().await;
        assert!(state.get(TodoId(1)).is_none());
        assert!(state.is_consistent());
    }

    #[tokio::test]
    async fn delete_removes_from_items_and_order() {
        let (store, _api, mirror) = make_store(scenario_todos()).await;
        store.fetch_all().await.unwrap();

        store.delete(TodoId(1)).await.unwrap();
        let state = store.snapshot().await;
        assert_eq!(state.all_ids(), &[TodoId(2)]);
        assert!(state.is_consistent());
        assert!(!mirror.read().await.unwrap().contains_key(&TodoId(1)));
    }

    #[tokio::test]
    async fn delete_by_parsed_id_matches_fetched_id() {
        let (store, _api, _mirror) = make_store(scenario_todos()).await;
        store.fetch_all().await.unwrap();

        let id: TodoId = "2".parse().unwrap();
        store.delete(id).await.unwrap();
        let state = store.snapshot().await;
        assert_eq!(state.all_ids(), &[TodoId(1)]);
        assert!(state.is_consistent());
    }

    #[tokio::test]
    async fn delete_failure_sets_change_status() {
        let (store, api, _mirror) = make_store(scenario_todos()).await;
        store.fetch_all().await.unwrap();
        api.set_failing(true);

        assert!(store.delete(TodoId(1)).await.is_err());
        assert_eq!(store.change_status().await, Status::Failed);
        assert_eq!(store.error().await.as_deref(), Some("Error deleting todo"));
        assert_eq!(store.items().await.len(), 2);
    }

    #[tokio::test]
    async fn crud_sequence_keeps_keys_and_order_in_sync() {
        let (store, _api, _mirror) = make_store(scenario_todos()).await;
        store.fetch_all().await.unwrap();

        let a = store.create("x", 1).await.unwrap();
        let b = store.create("y", 1).await.unwrap();
        store.edit(a, TodoPatch::title("x2")).await.unwrap();
        store.delete(TodoId(1)).await.unwrap();
        store.delete(b).await.unwrap();
        store.create("z", 1).await.unwrap();

        let state = store.snapshot().await;
        assert!(state.is_consistent());
        assert_eq!(ids(&state.ordered()), vec![2, 201, 203]);
    }

    #[tokio::test]
    async fn change_filter_is_idempotent() {
        let (store, _api, _mirror) = make_store(scenario_todos()).await;
        store.fetch_all().await.unwrap();

        store.change_filter(Filter::Active).await;
        let once = store.filtered().await;
        store.change_filter(Filter::Active).await;
        assert_eq!(store.filtered().await, once);
        assert_eq!(store.active_filter().await, Filter::Active);
    }

    #[tokio::test]
    async fn clear_completed_keeps_open_items_in_order() {
        let todos = vec![
            TodoItem::new(1, "a"),
            TodoItem::new(2, "b").with_completed(true),
            TodoItem::new(3, "c"),
            TodoItem::new(4, "d").with_completed(true),
            TodoItem::new(5, "e"),
        ];
        let (store, api, mirror) = make_store(todos).await;
        store.fetch_all().await.unwrap();
        api.set_failing(true);

        let removed = store.clear_completed().await.unwrap();
        assert_eq!(removed, 2);

        let state = store.snapshot().await;
        assert_eq!(ids(&state.ordered()), vec![1, 3, 5]);
        assert!(state.all_ids().iter().all(|id| !state.get(*id).unwrap().completed));
        assert!(state.is_consistent());
        assert_eq!(mirror.read().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn reorder_then_items_returns_same_order() {
        let todos = vec![
            TodoItem::new(1, "a"),
            TodoItem::new(2, "b"),
            TodoItem::new(3, "c").with_completed(true),
        ];
        let (store, _api, mirror) = make_store(todos).await;
        store.fetch_all().await.unwrap();

        let mut reordered = store.items().await;
        reordered.rotate_left(1);
        store.reorder(reordered.clone()).await.unwrap();

        assert_eq!(store.items().await, reordered);
        let persisted: Vec<TodoId> = mirror.read().await.unwrap().keys().copied().collect();
        assert_eq!(persisted, vec![TodoId(2), TodoId(3), TodoId(1)]);

        store.change_filter(Filter::Active).await;
        assert_eq!(ids(&store.filtered().await), vec![2, 1]);
    }

    #[tokio::test]
    async fn counts_track_completion() {
        let (store, _api, _mirror) = make_store(scenario_todos()).await;
        store.fetch_all().await.unwrap();
        assert_eq!(
            store.counts().await,
            FilterCounts {
                all: 2,
                active: 1,
                completed: 1
            }
        );
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let (store, api, _mirror) = make_store(scenario_todos()).await;
        let mut rx = store.subscribe();

        store.fetch_all().await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), StoreEvent::FetchStarted);
        assert_eq!(rx.recv().await.unwrap(), StoreEvent::Synced { count: 2 });

        store.toggle(TodoId(1)).await.unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            StoreEvent::Toggled {
                id: TodoId(1),
                completed: true
            }
        );

        api.set_failing(true);
        let _ = store.delete(TodoId(1)).await;
        assert_eq!(
            rx.recv().await.unwrap(),
            StoreEvent::Failed {
                message: "Error deleting todo".into()
            }
        );
    }

    #[tokio::test]
    async fn edit_after_delete_does_not_recreate_item() {
        let (store, _api, mirror) = make_store(scenario_todos()).await;
        store.fetch_all().await.unwrap();
        store.delete(TodoId(1)).await.unwrap();

        store.edit(TodoId(1), TodoPatch::title("ghost")).await.unwrap();
        let state = store.snapshot().await;
        assert!(state.get(TodoId(1)).is_none());
        assert_eq!(state.all_ids(), &[TodoId(2)]);
        assert!(state.is_consistent());
        assert!(!mirror.read().await.unwrap().contains_key(&TodoId(1)));
    }

    /// Remote that records the store's `change_status` while a request is in flight.
    struct ObservingApi {
        store: std::sync::OnceLock<Arc<TodoStore>>,
        seen: Mutex<Vec<Status>>,
    }

    impl ObservingApi {
        async fn observe(&self) {
            let store = self.store.get().expect("store attached");
            let status = store.change_status().await;
            self.seen.lock().unwrap().push(status);
        }
    }

    #[async_trait]
    impl TodoApi for ObservingApi {
        async fn list(&self) -> Result<Vec<TodoItem>, RemoteError> {
            Ok(scenario_todos())
        }

        async fn create(&self, _todo: &NewTodo) -> Result<TodoItem, RemoteError> {
            Err(RemoteError::Add)
        }

        async fn replace(&self, _id: TodoId, _data: &TodoPatch) -> Result<(), RemoteError> {
            Ok(())
        }

        async fn patch(&self, _id: TodoId, _data: &TodoPatch) -> Result<(), RemoteError> {
            self.observe().await;
            Ok(())
        }

        async fn delete(&self, _id: TodoId) -> Result<(), RemoteError> {
            self.observe().await;
            Err(RemoteError::Delete)
        }
    }

    #[tokio::test]
    async fn toggle_and_delete_mark_change_pending_while_in_flight() {
        let api = Arc::new(ObservingApi {
            store: std::sync::OnceLock::new(),
            seen: Mutex::new(Vec::new()),
        });
        let store = TodoStore::with_state(
            api.clone(),
            Arc::new(MemoryMirror::new()),
            TodoState::default(),
        );
        let _ = api.store.set(Arc::clone(&store));
        store.fetch_all().await.unwrap();

        store.toggle(TodoId(1)).await.unwrap();
        assert_eq!(store.change_status().await, Status::Succeeded);

        assert!(store.delete(TodoId(1)).await.is_err());
        assert_eq!(store.change_status().await, Status::Failed);

        assert_eq!(*api.seen.lock().unwrap(), vec![Status::Pending, Status::Pending]);
    }

    #[tokio::test]
    async fn change_status_settles_when_item_already_gone() {
        let (store, _api, _mirror) = make_store(scenario_todos()).await;
        store.fetch_all().await.unwrap();
        store.delete(TodoId(1)).await.unwrap();

        store.toggle(TodoId(1)).await.unwrap();
        assert_eq!(store.change_status().await, Status::Succeeded);
        store.delete(TodoId(1)).await.unwrap();
        assert_eq!(store.change_status().await, Status::Succeeded);
    }

    /// Mirror whose writes always fail, as a full disk or exhausted quota would.
    struct FailingMirror;

    #[async_trait]
    impl Mirror for FailingMirror {
        async fn read(&self) -> Result<TodoCollection, MirrorError> {
            Ok(TodoCollection::new())
        }

        async fn write(&self, _collection: &TodoCollection) -> Result<(), MirrorError> {
            Err(std::io::Error::other("quota").into())
        }
    }

    async fn store_with_failing_mirror() -> (Arc<TodoStore>, broadcast::Receiver<StoreEvent>) {
        let store = TodoStore::load(StubApi::new(scenario_todos()), Arc::new(FailingMirror))
            .await
            .unwrap();
        let rx = store.subscribe();
        (store, rx)
    }

    /// Next event that is not a `*Started` notification.
    async fn next_outcome(rx: &mut broadcast::Receiver<StoreEvent>) -> StoreEvent {
        loop {
            match rx.recv().await.unwrap() {
                StoreEvent::FetchStarted | StoreEvent::AddStarted => continue,
                event => return event,
            }
        }
    }

    #[tokio::test]
    async fn remote_ops_apply_and_report_success_when_mirror_write_fails() {
        let (store, mut rx) = store_with_failing_mirror().await;

        let err = store.fetch_all().await.unwrap_err();
        assert!(matches!(err, Error::Mirror(MirrorError::Io(_))));
        assert_eq!(store.get_status().await, Status::Succeeded);
        assert_eq!(ids(&store.items().await), vec![1, 2]);
        assert_eq!(next_outcome(&mut rx).await, StoreEvent::Synced { count: 2 });

        let err = store.create("c", 1).await.unwrap_err();
        assert!(matches!(err, Error::Mirror(_)));
        assert_eq!(store.add_status().await, Status::Succeeded);
        assert_eq!(ids(&store.items().await), vec![1, 2, 201]);
        assert_eq!(next_outcome(&mut rx).await, StoreEvent::Created { id: TodoId(201) });

        let err = store.edit(TodoId(1), TodoPatch::title("a2")).await.unwrap_err();
        assert!(matches!(err, Error::Mirror(_)));
        assert_eq!(store.item(TodoId(1)).await.unwrap().title, "a2");
        assert_eq!(next_outcome(&mut rx).await, StoreEvent::Updated { id: TodoId(1) });

        let err = store.toggle(TodoId(1)).await.unwrap_err();
        assert!(matches!(err, Error::Mirror(_)));
        assert!(store.item(TodoId(1)).await.unwrap().completed);
        assert_eq!(store.change_status().await, Status::Succeeded);
        assert_eq!(
            next_outcome(&mut rx).await,
            StoreEvent::Toggled {
                id: TodoId(1),
                completed: true
            }
        );

        let err = store.delete(TodoId(201)).await.unwrap_err();
        assert!(matches!(err, Error::Mirror(_)));
        assert!(store.item(TodoId(201)).await.is_none());
        assert_eq!(store.change_status().await, Status::Succeeded);
        assert_eq!(next_outcome(&mut rx).await, StoreEvent::Deleted { id: TodoId(201) });

        assert!(store.error().await.is_none());
        assert!(store.snapshot().await.is_consistent());
    }

    #[tokio::test]
    async fn local_ops_apply_when_mirror_write_fails() {
        let (store, mut rx) = store_with_failing_mirror().await;
        let _ = store.fetch_all().await;
        assert_eq!(next_outcome(&mut rx).await, StoreEvent::Synced { count: 2 });

        let err = store.clear_completed().await.unwrap_err();
        assert!(matches!(err, MirrorError::Io(_)));
        assert_eq!(ids(&store.items().await), vec![1]);
        assert_eq!(next_outcome(&mut rx).await, StoreEvent::ClearedCompleted { removed: 1 });

        let _ = store.create("c", 1).await;
        assert_eq!(next_outcome(&mut rx).await, StoreEvent::Created { id: TodoId(201) });

        let mut reordered = store.items().await;
        reordered.reverse();
        let err = store.reorder(reordered.clone()).await.unwrap_err();
        assert!(matches!(err, MirrorError::Io(_)));
        assert_eq!(store.items().await, reordered);
        assert_eq!(next_outcome(&mut rx).await, StoreEvent::Reordered { count: 2 });
    }

    #[test]
    fn state_insert_replace_keeps_position() {
        let mut state = TodoState::default();
        state.insert(TodoItem::new(1, "a"));
        state.insert(TodoItem::new(2, "b"));
        state.insert(TodoItem::new(1, "a2"));
        assert_eq!(state.all_ids(), &[TodoId(1), TodoId(2)]);
        assert_eq!(state.get(TodoId(1)).unwrap().title, "a2");
        assert!(state.is_consistent());
    }
}
