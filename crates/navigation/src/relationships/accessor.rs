//! Collection Accessors - Bound functions that get, create and attach a
//! navigation's collection for an owning instance
//!
//! `CollectionAccessor` is the type-erased face the navigation caches and
//! shares across threads. The typed accessors behind it are reached with
//! `as_any().downcast_ref()` (or `Navigation::accessor_as`).

use std::any::Any;
use std::fmt::{self, Debug};
use std::marker::PhantomData;

use crate::entity::Entity;
use crate::error::{ModelError, ModelResult};
use crate::relationships::field::{FieldType, NavigationCollection, NavigationFieldType};

/// How a navigation's collection is backed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessorStrategy {
    /// In-memory collection stored in the owning instance
    Materialized,
    /// Lazy filtered query through the unit of work
    Queryable,
}

/// Type-erased collection accessor for one navigation.
///
/// Instances are passed as `&dyn Any` of the owning entity type, items as
/// `Box<dyn Any>` / `&dyn Any` of the element type. Any other type fails with
/// `ModelError::TypeMismatch`.
pub trait CollectionAccessor: Send + Sync + Debug {
    fn navigation_name(&self) -> &str;

    /// Declared type of the navigation field
    fn collection_type(&self) -> &FieldType;

    fn strategy(&self) -> AccessorStrategy;

    fn add(&self, instance: &mut dyn Any, item: Box<dyn Any>) -> ModelResult<bool>;

    /// Adds each item, returning how many were not already present
    fn add_range(&self, instance: &mut dyn Any, items: Vec<Box<dyn Any>>) -> ModelResult<usize> {
        let mut added = 0;
        for item in items {
            if self.add(instance, item)? {
                added += 1;
            }
        }
        Ok(added)
    }

    fn contains(&self, instance: &dyn Any, item: &dyn Any) -> ModelResult<bool>;

    fn remove(&self, instance: &mut dyn Any, item: &dyn Any) -> ModelResult<bool>;

    fn len(&self, instance: &dyn Any) -> ModelResult<usize>;

    /// New collection not attached to any instance
    fn create(&self) -> ModelResult<Box<dyn Any>>;

    /// New collection holding the given items
    fn create_with(&self, items: Vec<Box<dyn Any>>) -> ModelResult<Box<dyn Any>>;

    fn as_any(&self) -> &dyn Any;
}

pub(crate) fn downcast_instance<E: 'static>(instance: &dyn Any) -> ModelResult<&E> {
    instance.downcast_ref::<E>().ok_or_else(ModelError::type_mismatch::<E>)
}

pub(crate) fn downcast_instance_mut<E: 'static>(instance: &mut dyn Any) -> ModelResult<&mut E> {
    instance.downcast_mut::<E>().ok_or_else(ModelError::type_mismatch::<E>)
}

pub(crate) fn downcast_item<T: 'static>(item: Box<dyn Any>) -> ModelResult<T> {
    item.downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| ModelError::type_mismatch::<T>())
}

pub(crate) fn downcast_items<T: 'static>(items: Vec<Box<dyn Any>>) -> ModelResult<Vec<T>> {
    items.into_iter().map(downcast_item::<T>).collect()
}

/// Accessor for navigations stored as in-memory collections on the entity
pub struct MaterializedCollectionAccessor<E, C> {
    navigation: String,
    field_type: FieldType,
    getter: fn(&E) -> Option<&C>,
    getter_mut: fn(&mut E) -> Option<&mut C>,
    setter: fn(&mut E, C),
    _marker: PhantomData<fn() -> (E, C)>,
}

impl<E, C> MaterializedCollectionAccessor<E, C>
where
    E: Entity,
    C: NavigationFieldType,
{
    pub fn new(
        navigation: &str,
        getter: fn(&E) -> Option<&C>,
        getter_mut: fn(&mut E) -> Option<&mut C>,
        setter: fn(&mut E, C),
    ) -> Self {
        Self {
            navigation: navigation.to_string(),
            field_type: FieldType::of::<C>(),
            getter,
            getter_mut,
            setter,
            _marker: PhantomData,
        }
    }

    /// Existing collection, `None` when the field is unset
    pub fn get<'a>(&self, instance: &'a E) -> Option<&'a C> {
        (self.getter)(instance)
    }

    /// Existing collection, creating and attaching an empty one first if unset
    pub fn get_or_create<'a>(&self, instance: &'a mut E) -> ModelResult<&'a mut C> {
        if (self.getter)(instance).is_none() {
            (self.setter)(instance, self.create()?);
        }
        self.attached(instance)
    }

    pub fn create(&self) -> ModelResult<C> {
        C::instantiate().ok_or_else(|| ModelError::not_supported("create", &self.navigation))
    }

    pub fn create_with(&self, items: Vec<C::Element>) -> ModelResult<C> {
        let mut collection = self.create()?;
        {
            let view = self.view_mut(&mut collection)?;
            for item in items {
                view.add(item)?;
            }
        }
        Ok(collection)
    }

    /// Replace the field with a new empty collection
    pub fn create_and_set<'a>(&self, instance: &'a mut E) -> ModelResult<&'a mut C> {
        (self.setter)(instance, self.create()?);
        self.attached(instance)
    }

    pub fn add(&self, instance: &mut E, item: C::Element) -> ModelResult<bool> {
        let collection = self.get_or_create(instance)?;
        self.view_mut(collection)?.add(item)
    }

    pub fn remove(&self, instance: &mut E, item: &C::Element) -> ModelResult<bool> {
        match (self.getter_mut)(instance) {
            Some(collection) => self.view_mut(collection)?.remove(item),
            None => Ok(false),
        }
    }

    pub fn contains(&self, instance: &E, item: &C::Element) -> ModelResult<bool> {
        match self.get(instance) {
            Some(collection) => self.view(collection)?.contains(item),
            None => Ok(false),
        }
    }

    pub fn len(&self, instance: &E) -> ModelResult<usize> {
        match self.get(instance) {
            Some(collection) => self.view(collection)?.len(),
            None => Ok(0),
        }
    }

    fn attached<'a>(&self, instance: &'a mut E) -> ModelResult<&'a mut C> {
        (self.getter_mut)(instance)
            .ok_or_else(|| ModelError::not_supported("attach collection", &self.navigation))
    }

    fn view<'a>(&self, collection: &'a C) -> ModelResult<&'a dyn NavigationCollection<C::Element>> {
        collection
            .as_collection()
            .ok_or_else(|| ModelError::not_supported("read collection", &self.navigation))
    }

    fn view_mut<'a>(
        &self,
        collection: &'a mut C,
    ) -> ModelResult<&'a mut dyn NavigationCollection<C::Element>> {
        collection
            .as_collection_mut()
            .ok_or_else(|| ModelError::not_supported("modify collection", &self.navigation))
    }
}

impl<E, C> Debug for MaterializedCollectionAccessor<E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaterializedCollectionAccessor")
            .field("navigation", &self.navigation)
            .field("field_type", &self.field_type)
            .finish()
    }
}

impl<E, C> CollectionAccessor for MaterializedCollectionAccessor<E, C>
where
    E: Entity,
    C: NavigationFieldType,
{
    fn navigation_name(&self) -> &str {
        &self.navigation
    }

    fn collection_type(&self) -> &FieldType {
        &self.field_type
    }

    fn strategy(&self) -> AccessorStrategy {
        AccessorStrategy::Materialized
    }

    fn add(&self, instance: &mut dyn Any, item: Box<dyn Any>) -> ModelResult<bool> {
        let item = downcast_item::<C::Element>(item)?;
        MaterializedCollectionAccessor::add(self, downcast_instance_mut::<E>(instance)?, item)
    }

    fn contains(&self, instance: &dyn Any, item: &dyn Any) -> ModelResult<bool> {
        let item = downcast_instance::<C::Element>(item)?;
        MaterializedCollectionAccessor::contains(self, downcast_instance::<E>(instance)?, item)
    }

    fn remove(&self, instance: &mut dyn Any, item: &dyn Any) -> ModelResult<bool> {
        let item = downcast_instance::<C::Element>(item)?;
        MaterializedCollectionAccessor::remove(self, downcast_instance_mut::<E>(instance)?, item)
    }

    fn len(&self, instance: &dyn Any) -> ModelResult<usize> {
        MaterializedCollectionAccessor::len(self, downcast_instance::<E>(instance)?)
    }

    fn create(&self) -> ModelResult<Box<dyn Any>> {
        Ok(Box::new(MaterializedCollectionAccessor::create(self)?))
    }

    fn create_with(&self, items: Vec<Box<dyn Any>>) -> ModelResult<Box<dyn Any>> {
        let items = downcast_items::<C::Element>(items)?;
        Ok(Box::new(MaterializedCollectionAccessor::create_with(self, items)?))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
