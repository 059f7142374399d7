//! Model Source - Builds and caches one model per unit of work

use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::context::UnitOfWork;
use crate::error::ModelResult;
use crate::metadata::{Model, ModelBuilder, PRODUCT_VERSION_ANNOTATION};

/// Cache of built models keyed by unit-of-work id.
///
/// Each model holds the unit of work it was built for, so a model is never
/// shared between two units of work. Concurrent first requests for the same
/// id may both build; the first model published is the one kept.
///
/// Models are held weakly. A model lives as long as some caller holds it, and
/// once the last holder drops it the unit of work it owns is released too.
/// Dead entries are pruned on the next request.
#[derive(Debug, Default)]
pub struct ModelSource {
    models: DashMap<Uuid, Weak<Model>>,
}

impl ModelSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Model for `context`, built with `customize` the first time
    pub fn get_model<F>(&self, context: &Arc<dyn UnitOfWork>, customize: F) -> ModelResult<Arc<Model>>
    where
        F: FnOnce(&mut ModelBuilder) -> ModelResult<()>,
    {
        self.prune();

        let id = context.id();
        if let Some(model) = self.models.get(&id).and_then(|entry| entry.upgrade()) {
            return Ok(model);
        }

        let model = Self::create_model(context.clone(), customize)?;
        let published = match self.models.entry(id) {
            Entry::Occupied(mut entry) => match entry.get().upgrade() {
                Some(existing) => existing,
                None => {
                    entry.insert(Arc::downgrade(&model));
                    model
                }
            },
            Entry::Vacant(entry) => {
                entry.insert(Arc::downgrade(&model));
                model
            }
        };
        Ok(published)
    }

    fn prune(&self) {
        let before = self.models.len();
        self.models.retain(|_, model| model.strong_count() > 0);
        let pruned = before.saturating_sub(self.models.len());
        if pruned > 0 {
            trace!("Pruned {} model(s) of dropped units of work", pruned);
        }
    }

    fn create_model<F>(context: Arc<dyn UnitOfWork>, customize: F) -> ModelResult<Arc<Model>>
    where
        F: FnOnce(&mut ModelBuilder) -> ModelResult<()>,
    {
        debug!("Creating model for unit of work {}", context.id());
        let mut builder = ModelBuilder::new(context);
        builder.annotate(
            PRODUCT_VERSION_ANNOTATION,
            Value::String(env!("CARGO_PKG_VERSION").to_string()),
        );
        customize(&mut builder)?;
        builder.finish()
    }

    /// Forget the model of a unit of work, returning it if still alive
    pub fn evict(&self, id: &Uuid) -> Option<Arc<Model>> {
        self.models.remove(id).and_then(|(_, model)| model.upgrade())
    }

    /// Number of cached models that are still alive
    pub fn len(&self) -> usize {
        self.models.iter().filter(|entry| entry.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
