//! In-Memory Store - A unit of work over process-local tables
//!
//! `InMemoryStore` holds the committed rows, shared between any number of
//! `InMemoryContext`s. Each context tracks its own pending changes and only
//! publishes them on `save_changes`, so queries never observe unsaved work.
//! A save is checked against the committed rows as a whole before anything is
//! written; a rejected save leaves both the store and the pending changes as
//! they were.
//!
//! Queries are evaluated on their filter only. The navigations named in
//! `EntityQuery::includes` are passed through for a host query engine to load;
//! rows come back without related entities attached.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::{EntityState, TrackedEntry, UnitOfWork};
use crate::entity::AnyEntity;
use crate::error::{ModelError, ModelResult};
use crate::options::ContextOptions;
use crate::query::EntityQuery;

/// Ordering wrapper so numeric keys sort numerically
#[derive(Debug, Clone, PartialEq)]
struct StoreKey(Value);

impl Eq for StoreKey {}

impl PartialOrd for StoreKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StoreKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.0, &other.0) {
            (Value::Number(a), Value::Number(b)) => {
                match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                    _ => a.to_string().cmp(&b.to_string()),
                }
            }
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (a, b) => a.to_string().cmp(&b.to_string()),
        }
    }
}

type Table = BTreeMap<StoreKey, Box<dyn AnyEntity>>;

/// Committed rows, one table per entity shape
#[derive(Debug, Default)]
pub struct InMemoryStore {
    name: String,
    tables: DashMap<String, Table>,
    /// Serializes commits so a batch is checked and applied as one step
    commit_lock: Mutex<()>,
}

impl InMemoryStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tables: DashMap::new(),
            commit_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of committed rows for an entity shape
    pub fn len(&self, entity: &str) -> usize {
        self.tables.get(entity).map(|table| table.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, entity: &str) -> bool {
        self.len(entity) == 0
    }

    pub fn contains_key(&self, entity: &str, key: &Value) -> bool {
        self.tables
            .get(entity)
            .map(|table| table.contains_key(&StoreKey(key.clone())))
            .unwrap_or(false)
    }

    /// Field values of the committed row with `key`
    fn fields_of(&self, entity: &str, key: &Value) -> Option<HashMap<String, Value>> {
        self.tables
            .get(entity)?
            .get(&StoreKey(key.clone()))
            .map(|row| row.fields())
    }

    fn query(&self, query: &EntityQuery) -> Vec<Box<dyn AnyEntity>> {
        match self.tables.get(&query.entity) {
            Some(table) => table
                .values()
                .filter(|row| query.matches(row.as_ref()))
                .map(|row| row.clone_entity())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Apply every change or none of them
    fn commit(&self, changes: &[PendingChange]) -> ModelResult<usize> {
        let _guard = self.commit_lock.lock().map_err(|_| {
            ModelError::Store(format!("commit lock of store '{}' poisoned", self.name))
        })?;

        for change in changes {
            self.check(change)?;
        }
        for change in changes {
            self.apply(change);
        }
        Ok(changes.len())
    }

    fn check(&self, change: &PendingChange) -> ModelResult<()> {
        match change {
            PendingChange::Insert(row) => {
                let key = require_key(row.as_ref())?;
                if self.contains_key(row.entity_type(), &key) {
                    return Err(ModelError::Store(format!(
                        "An entity of type '{}' with key {} already exists in store '{}'",
                        row.entity_type(),
                        key,
                        self.name
                    )));
                }
            }
            PendingChange::Update(row) => {
                let key = require_key(row.as_ref())?;
                if !self.contains_key(row.entity_type(), &key) {
                    return Err(ModelError::Store(format!(
                        "The entity of type '{}' with key {} no longer exists in store '{}'",
                        row.entity_type(),
                        key,
                        self.name
                    )));
                }
            }
            PendingChange::Delete { .. } => {}
        }
        Ok(())
    }

    fn apply(&self, change: &PendingChange) {
        match change {
            PendingChange::Insert(row) | PendingChange::Update(row) => {
                if let Some(key) = row.key() {
                    self.tables
                        .entry(row.entity_type().to_string())
                        .or_default()
                        .insert(StoreKey(key), row.clone_entity());
                }
            }
            PendingChange::Delete { entity, key } => {
                if let Some(mut table) = self.tables.get_mut(entity) {
                    table.remove(&StoreKey(key.clone()));
                }
            }
        }
    }
}

#[derive(Debug)]
enum PendingChange {
    Insert(Box<dyn AnyEntity>),
    Update(Box<dyn AnyEntity>),
    Delete { entity: String, key: Value },
}

impl PendingChange {
    fn identity(&self) -> (String, String) {
        match self {
            PendingChange::Insert(row) | PendingChange::Update(row) => (
                row.entity_type().to_string(),
                row.key().map(|k| k.to_string()).unwrap_or_default(),
            ),
            PendingChange::Delete { entity, key } => (entity.clone(), key.to_string()),
        }
    }

    fn row(&self) -> Option<&dyn AnyEntity> {
        match self {
            PendingChange::Insert(row) | PendingChange::Update(row) => Some(row.as_ref()),
            PendingChange::Delete { .. } => None,
        }
    }
}

#[derive(Debug, Default)]
struct ChangeTracker {
    states: HashMap<(String, String), EntityState>,
    pending: Vec<PendingChange>,
}

impl ChangeTracker {
    fn discard_pending(&mut self, identity: &(String, String)) {
        self.pending.retain(|change| &change.identity() != identity);
    }

    /// Whether `entity` differs from the row already queued under `identity`
    fn differs_from_pending(&self, identity: &(String, String), entity: &dyn AnyEntity) -> bool {
        self.pending
            .iter()
            .find(|change| &change.identity() == identity)
            .and_then(PendingChange::row)
            .map_or(true, |row| row.fields() != entity.fields())
    }

    /// Queue `change` in place of whatever was pending under `identity`
    fn requeue(&mut self, identity: &(String, String), change: PendingChange) {
        self.discard_pending(identity);
        self.pending.push(change);
    }
}

/// One unit of work over an `InMemoryStore`
#[derive(Debug)]
pub struct InMemoryContext {
    id: Uuid,
    options: ContextOptions,
    store: Arc<InMemoryStore>,
    tracker: Mutex<ChangeTracker>,
}

impl InMemoryContext {
    pub fn new(store: Arc<InMemoryStore>, options: ContextOptions) -> Self {
        let id = Uuid::new_v4();
        debug!(
            "Creating in-memory unit of work {} over store '{}' {}",
            id,
            store.name(),
            options.log_fragment()
        );
        Self {
            id,
            options,
            store,
            tracker: Mutex::new(ChangeTracker::default()),
        }
    }

    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    /// Number of changes waiting for `save_changes`
    pub fn pending_changes(&self) -> usize {
        self.tracker().map(|tracker| tracker.pending.len()).unwrap_or(0)
    }

    fn tracker(&self) -> ModelResult<MutexGuard<'_, ChangeTracker>> {
        self.tracker
            .lock()
            .map_err(|_| ModelError::Store("change tracker lock poisoned".to_string()))
    }

    fn key_for(&self, key: &Value) -> String {
        if self.options.sensitive_data_logging {
            key.to_string()
        } else {
            "?".to_string()
        }
    }
}

fn require_key(entity: &dyn AnyEntity) -> ModelResult<Value> {
    entity.key().ok_or_else(|| {
        ModelError::Store(format!(
            "Cannot track an entity of type '{}' without a key value",
            entity.entity_type()
        ))
    })
}

impl UnitOfWork for InMemoryContext {
    fn id(&self) -> Uuid {
        self.id
    }

    fn options(&self) -> &ContextOptions {
        &self.options
    }

    fn add(&self, entity: Box<dyn AnyEntity>) -> ModelResult<TrackedEntry> {
        let key = require_key(entity.as_ref())?;
        let name = entity.entity_type().to_string();
        let identity = (name.clone(), key.to_string());
        let mut tracker = self.tracker()?;

        let current = tracker.states.get(&identity).copied();
        let (state, changed) = match current {
            Some(EntityState::Added) => {
                let changed = tracker.differs_from_pending(&identity, entity.as_ref());
                if changed {
                    tracker.requeue(&identity, PendingChange::Insert(entity));
                }
                (EntityState::Added, changed)
            }
            Some(EntityState::Modified) => {
                let changed = tracker.differs_from_pending(&identity, entity.as_ref());
                if changed {
                    tracker.requeue(&identity, PendingChange::Update(entity));
                }
                (EntityState::Modified, changed)
            }
            _ => {
                // re-adding a deleted row cancels the deletion
                let cancelled = current == Some(EntityState::Deleted);
                if cancelled {
                    tracker.discard_pending(&identity);
                }

                match self.store.fields_of(&name, &key) {
                    Some(stored) if stored == entity.fields() => (EntityState::Unchanged, cancelled),
                    Some(_) => {
                        trace!("Pending update of {} with key {}", name, self.key_for(&key));
                        tracker.pending.push(PendingChange::Update(entity));
                        (EntityState::Modified, true)
                    }
                    None => {
                        trace!("Pending insert of {} with key {}", name, self.key_for(&key));
                        tracker.pending.push(PendingChange::Insert(entity));
                        (EntityState::Added, true)
                    }
                }
            }
        };

        tracker.states.insert(identity, state);
        Ok(TrackedEntry {
            entity: name,
            key,
            state,
            changed,
        })
    }

    fn remove(&self, entity: &dyn AnyEntity) -> ModelResult<TrackedEntry> {
        let key = require_key(entity)?;
        let name = entity.entity_type().to_string();
        let identity = (name.clone(), key.to_string());
        let mut tracker = self.tracker()?;

        let current = tracker.states.get(&identity).copied();
        let (state, changed) = match current {
            Some(EntityState::Added) => {
                // never saved, so forgetting it is enough
                tracker.discard_pending(&identity);
                (EntityState::Detached, true)
            }
            Some(EntityState::Deleted) => (EntityState::Deleted, false),
            _ => {
                let dropped_update = current == Some(EntityState::Modified);
                if dropped_update {
                    tracker.discard_pending(&identity);
                }
                if self.store.contains_key(&name, &key) {
                    trace!("Pending delete of {} with key {}", name, self.key_for(&key));
                    tracker.pending.push(PendingChange::Delete {
                        entity: name.clone(),
                        key: key.clone(),
                    });
                    (EntityState::Deleted, true)
                } else {
                    (EntityState::Detached, dropped_update)
                }
            }
        };

        if state == EntityState::Detached {
            tracker.states.remove(&identity);
        } else {
            tracker.states.insert(identity, state);
        }
        Ok(TrackedEntry {
            entity: name,
            key,
            state,
            changed,
        })
    }

    fn entry_state(&self, entity: &dyn AnyEntity) -> EntityState {
        let Some(key) = entity.key() else {
            return EntityState::Detached;
        };
        let identity = (entity.entity_type().to_string(), key.to_string());
        self.tracker()
            .ok()
            .and_then(|tracker| tracker.states.get(&identity).copied())
            .unwrap_or(EntityState::Detached)
    }

    fn execute(&self, query: &EntityQuery) -> ModelResult<Vec<Box<dyn AnyEntity>>> {
        debug!(
            "Executing query {}",
            query.describe(self.options.sensitive_data_logging)
        );
        if !query.includes.is_empty() {
            trace!(
                "Leaving includes [{}] of {} to the host query engine",
                query.includes.join(", "),
                query.entity
            );
        }
        let rows = self.store.query(query);

        // rows read from the store become tracked
        let mut tracker = self.tracker()?;
        for row in &rows {
            if let Some(key) = row.key() {
                tracker
                    .states
                    .entry((row.entity_type().to_string(), key.to_string()))
                    .or_insert(EntityState::Unchanged);
            }
        }

        Ok(rows)
    }

    fn count(&self, query: &EntityQuery) -> ModelResult<usize> {
        debug!(
            "Counting query {}",
            query.describe(self.options.sensitive_data_logging)
        );
        Ok(self.store.query(query).len())
    }

    fn save_changes(&self) -> ModelResult<usize> {
        let mut tracker = self.tracker()?;
        let applied = match self.store.commit(&tracker.pending) {
            Ok(applied) => applied,
            Err(err) => {
                warn!(
                    "Saving {} change(s) to store '{}' failed, nothing was applied: {}",
                    tracker.pending.len(),
                    self.store.name(),
                    err
                );
                return Err(err);
            }
        };

        let pending = std::mem::take(&mut tracker.pending);
        for change in &pending {
            let identity = change.identity();
            match change {
                PendingChange::Insert(_) | PendingChange::Update(_) => {
                    tracker.states.insert(identity, EntityState::Unchanged);
                }
                PendingChange::Delete { .. } => {
                    tracker.states.remove(&identity);
                }
            }
        }

        info!("Saved {} change(s) to store '{}'", applied, self.store.name());
        Ok(applied)
    }
}
