//! Navigation Metadata - One relationship field on an entity shape
//!
//! Each navigation owns at most one collection accessor. It is built on first
//! access and published once: concurrent first readers may each build one, but
//! only the first published accessor is kept and every caller gets that one.
//!
//! The inverse link is shared with that accessor, so unlinking a navigation
//! from the model is seen by accessors that were built before the change.

use std::fmt;
use std::sync::{Arc, RwLock};

use once_cell::race::OnceBox;
use tracing::trace;

use crate::context::UnitOfWork;
use crate::error::{ModelError, ModelResult};
use crate::metadata::ForeignKey;
use crate::options::ContextOptions;
use crate::relationships::{CollectionAccessor, CollectionAccessorFactory, MemberBinding};

/// Name of the navigation on the other end of a foreign key
#[derive(Clone, Default)]
pub(crate) struct InverseLink(Arc<RwLock<Option<String>>>);

impl InverseLink {
    pub(crate) fn get(&self) -> Option<String> {
        self.0.read().ok().and_then(|name| name.clone())
    }

    fn replace(&self, name: Option<String>) -> Option<String> {
        match self.0.write() {
            Ok(mut current) => std::mem::replace(&mut *current, name),
            Err(_) => None,
        }
    }
}

impl fmt::Debug for InverseLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.get().fmt(f)
    }
}

pub struct Navigation {
    name: String,
    declaring_entity: String,
    foreign_key: Arc<ForeignKey>,
    points_to_principal: bool,
    /// `None` for shadow navigations with no backing field
    member: Option<Arc<dyn MemberBinding>>,
    inverse: InverseLink,
    context: Arc<dyn UnitOfWork>,
    accessor: OnceBox<Option<Arc<dyn CollectionAccessor>>>,
}

impl Navigation {
    pub(crate) fn new(
        name: &str,
        declaring_entity: &str,
        foreign_key: Arc<ForeignKey>,
        points_to_principal: bool,
        member: Option<Arc<dyn MemberBinding>>,
        context: Arc<dyn UnitOfWork>,
    ) -> Self {
        Self {
            name: name.to_string(),
            declaring_entity: declaring_entity.to_string(),
            foreign_key,
            points_to_principal,
            member,
            inverse: InverseLink::default(),
            context,
            accessor: OnceBox::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declaring_entity(&self) -> &str {
        &self.declaring_entity
    }

    /// `Entity.navigation`, used in logs and errors
    pub fn display_name(&self) -> String {
        format!("{}.{}", self.declaring_entity, self.name)
    }

    pub fn foreign_key(&self) -> &Arc<ForeignKey> {
        &self.foreign_key
    }

    pub fn points_to_principal(&self) -> bool {
        self.points_to_principal
    }

    /// Shape at the other end of the navigation
    pub fn target_entity(&self) -> &str {
        if self.points_to_principal {
            self.foreign_key.principal()
        } else {
            self.foreign_key.dependent()
        }
    }

    /// Dependent-side navigation of a one-to-many relationship
    pub fn is_collection(&self) -> bool {
        !self.points_to_principal && !self.foreign_key.is_unique()
    }

    pub fn is_shadow(&self) -> bool {
        self.member.is_none()
    }

    pub fn member(&self) -> Option<&Arc<dyn MemberBinding>> {
        self.member.as_ref()
    }

    /// Name of the navigation on the other end of the same foreign key
    pub fn inverse_name(&self) -> Option<String> {
        self.inverse.get()
    }

    pub(crate) fn inverse_link(&self) -> &InverseLink {
        &self.inverse
    }

    pub(crate) fn set_inverse(&self, name: &str) {
        if let Some(previous) = self.inverse.replace(Some(name.to_string())) {
            trace!("Inverse of {} relinked from '{}' to '{}'", self.display_name(), previous, name);
        }
    }

    pub(crate) fn clear_inverse(&self) {
        if let Some(previous) = self.inverse.replace(None) {
            trace!("Inverse '{}' of {} unlinked", previous, self.display_name());
        }
    }

    pub fn context(&self) -> &Arc<dyn UnitOfWork> {
        &self.context
    }

    pub fn options(&self) -> &ContextOptions {
        self.context.options()
    }

    /// Collection accessor of this navigation.
    ///
    /// `None` for reference and shadow navigations. Construction errors are
    /// returned on every access and never cached.
    pub fn collection_accessor(&self) -> ModelResult<Option<&Arc<dyn CollectionAccessor>>> {
        let accessor = self
            .accessor
            .get_or_try_init(|| self.build_accessor().map(Box::new))?;
        Ok(accessor.as_ref())
    }

    /// Typed accessor behind the erased one
    pub fn accessor_as<A: CollectionAccessor + 'static>(&self) -> ModelResult<&A> {
        let accessor = self
            .collection_accessor()?
            .ok_or_else(|| ModelError::not_supported("collection access", &self.display_name()))?;
        accessor
            .as_any()
            .downcast_ref::<A>()
            .ok_or_else(ModelError::type_mismatch::<A>)
    }

    fn build_accessor(&self) -> ModelResult<Option<Arc<dyn CollectionAccessor>>> {
        if !self.is_collection() {
            return Ok(None);
        }
        let Some(member) = &self.member else {
            return Ok(None);
        };

        trace!("Building collection accessor for {}", self.display_name());
        CollectionAccessorFactory::new()
            .create(self, member.as_ref())
            .map(Some)
    }
}

impl fmt::Debug for Navigation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Navigation")
            .field("name", &self.name)
            .field("declaring_entity", &self.declaring_entity)
            .field("foreign_key", &self.foreign_key)
            .field("points_to_principal", &self.points_to_principal)
            .field("member", &self.member)
            .field("inverse", &self.inverse)
            .finish()
    }
}
