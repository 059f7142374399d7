//! Unit of Work - The change-tracking collaborator navigations delegate to
//!
//! Navigation proxies never touch storage directly. Reads are expressed as
//! `EntityQuery`s and executed by the unit of work; writes are registered with
//! it as pending changes and reach the store on `save_changes`.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::entity::AnyEntity;
use crate::error::ModelResult;
use crate::options::ContextOptions;
use crate::query::EntityQuery;

pub mod memory;

pub use memory::{InMemoryContext, InMemoryStore};

/// Tracking state of an entity within one unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityState {
    /// Not tracked
    Detached,
    /// Tracked and matching the store
    Unchanged,
    /// Pending insertion
    Added,
    /// Stored, with a pending update of its fields
    Modified,
    /// Pending deletion
    Deleted,
}

/// Result of registering an entity with the unit of work
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedEntry {
    pub entity: String,
    pub key: Value,
    pub state: EntityState,
    /// Whether this call queued or cancelled a pending change
    pub changed: bool,
}

/// Change-tracking collaborator bound to one logical operation.
///
/// Implementations are expected to be used by one logical operation at a
/// time; the `Send + Sync` bound only allows the model to hold a reference to
/// it.
pub trait UnitOfWork: Send + Sync + Debug {
    /// Identity of this unit of work, used to cache its model
    fn id(&self) -> Uuid;

    fn options(&self) -> &ContextOptions;

    /// Register an entity as a pending insertion, or as a pending update
    /// when a row with the same key is stored with different fields
    fn add(&self, entity: Box<dyn AnyEntity>) -> ModelResult<TrackedEntry>;

    /// Register an entity as a pending deletion
    fn remove(&self, entity: &dyn AnyEntity) -> ModelResult<TrackedEntry>;

    /// State of the entity in the identity map
    fn entry_state(&self, entity: &dyn AnyEntity) -> EntityState;

    /// Run a query against the store
    fn execute(&self, query: &EntityQuery) -> ModelResult<Vec<Box<dyn AnyEntity>>>;

    fn count(&self, query: &EntityQuery) -> ModelResult<usize> {
        Ok(self.execute(query)?.len())
    }

    fn exists(&self, query: &EntityQuery) -> ModelResult<bool> {
        Ok(self.count(query)? > 0)
    }

    /// Flush pending changes to the store, returning how many were applied.
    ///
    /// Either every pending change is applied or none is; on failure the
    /// pending changes are kept so the save can be retried.
    fn save_changes(&self) -> ModelResult<usize>;
}
