//! Queryable Collections - Lazy, filtered navigation collections
//!
//! A `QueryableCollection<T>` stands for the rows of `T` whose foreign key
//! equals one owner's principal key. Nothing is loaded up front: every
//! enumeration, count and containment check runs a query through the unit of
//! work, and `add`/`remove` register pending changes with it instead of
//! mutating anything in memory.

use std::any::Any;
use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::context::UnitOfWork;
use crate::entity::{downcast_entity, AnyEntity, Entity};
use crate::error::{ModelError, ModelResult};
use crate::metadata::navigation::InverseLink;
use crate::metadata::Navigation;
use crate::query::{EntityQuery, Predicate};
use crate::relationships::accessor::{
    downcast_instance, downcast_instance_mut, downcast_item, downcast_items, AccessorStrategy,
    CollectionAccessor,
};
use crate::relationships::field::{FieldType, NavigationCollection};

/// Sequence-producing side of a lazy collection
pub trait QuerySource<T> {
    /// Query this source stands for
    fn query(&self) -> &EntityQuery;

    /// Run the query and collect every row
    fn fetch(&self) -> ModelResult<Vec<T>>;

    fn count(&self) -> ModelResult<usize>;

    fn exists(&self) -> ModelResult<bool> {
        Ok(self.count()? > 0)
    }
}

/// Lazy proxy over one filtered view of the store
pub struct QueryableCollection<T> {
    navigation: String,
    query: EntityQuery,
    /// Foreign key property and owner key fixed up on added items
    owner: Option<(String, Value)>,
    context: Arc<dyn UnitOfWork>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> QueryableCollection<T> {
    /// Proxy over every row of `T`
    pub fn unfiltered(navigation: &str, context: Arc<dyn UnitOfWork>) -> Self {
        Self {
            navigation: navigation.to_string(),
            query: EntityQuery::all(T::entity_name()),
            owner: None,
            context,
            _marker: PhantomData,
        }
    }

    /// Proxy over the rows of `T` whose `foreign_key` equals `owner_key`
    pub fn for_owner(
        navigation: &str,
        foreign_key: &str,
        owner_key: Value,
        context: Arc<dyn UnitOfWork>,
    ) -> Self {
        Self {
            navigation: navigation.to_string(),
            query: EntityQuery::filtered(
                T::entity_name(),
                Predicate::field_eq(foreign_key, owner_key.clone()),
            ),
            owner: Some((foreign_key.to_string(), owner_key)),
            context,
            _marker: PhantomData,
        }
    }

    /// Load the named navigation alongside each row
    pub fn include(mut self, navigation: &str) -> Self {
        self.query = self.query.include(navigation);
        self
    }

    pub fn navigation_name(&self) -> &str {
        &self.navigation
    }

    pub fn is_filtered(&self) -> bool {
        !self.query.filter.is_all()
    }

    /// Lazy iterator; the query runs on the first call to `next`
    pub fn iter(&self) -> QueryIter<'_, T> {
        QueryIter {
            source: self,
            rows: None,
            failed: false,
        }
    }

    pub fn contains(&self, item: &T) -> ModelResult<bool> {
        let Some(key) = item.primary_key() else {
            return Ok(false);
        };
        let query = self
            .query
            .clone()
            .and(Predicate::field_eq(T::primary_key_name(), key));
        self.context.exists(&query)
    }

    /// Register `item` as a pending insertion, or as a pending update when a
    /// stored row with its key belongs elsewhere.
    ///
    /// Returns `false` when the item is already present in this view or the
    /// same row is already queued. The item becomes visible to enumeration
    /// once the unit of work saves its changes.
    pub fn add(&self, item: T) -> ModelResult<bool> {
        let item = match &self.owner {
            Some((property, key)) if !key.is_null() => item.with_field(property, key.clone())?,
            _ => item,
        };

        if self.contains(&item)? {
            debug!("{} already contains the added item", self.navigation);
            return Ok(false);
        }

        // false when the same row is already queued or stored
        let entry = self.context.add(Box::new(item))?;
        Ok(entry.changed)
    }

    /// Register `item` as a pending deletion when it is present in this view
    pub fn remove(&self, item: &T) -> ModelResult<bool> {
        if !self.contains(item)? {
            return Ok(false);
        }
        self.context.remove(item)?;
        Ok(true)
    }

    pub fn clear(&self) -> ModelResult<()> {
        Err(ModelError::not_supported("clear", &self.navigation))
    }

    fn execute(&self) -> ModelResult<Vec<Box<dyn AnyEntity>>> {
        self.context.execute(&self.query)
    }
}

impl<T: Entity> QuerySource<T> for QueryableCollection<T> {
    fn query(&self) -> &EntityQuery {
        &self.query
    }

    fn fetch(&self) -> ModelResult<Vec<T>> {
        self.iter().collect()
    }

    fn count(&self) -> ModelResult<usize> {
        self.context.count(&self.query)
    }

    fn exists(&self) -> ModelResult<bool> {
        self.context.exists(&self.query)
    }
}

impl<T: Entity> NavigationCollection<T> for QueryableCollection<T> {
    fn add(&mut self, item: T) -> ModelResult<bool> {
        QueryableCollection::add(self, item)
    }

    fn remove(&mut self, item: &T) -> ModelResult<bool> {
        QueryableCollection::remove(self, item)
    }

    fn contains(&self, item: &T) -> ModelResult<bool> {
        QueryableCollection::contains(self, item)
    }

    fn len(&self) -> ModelResult<usize> {
        QuerySource::count(self)
    }

    fn clear(&mut self) -> ModelResult<()> {
        QueryableCollection::clear(self)
    }

    fn to_vec(&self) -> ModelResult<Vec<T>> {
        self.fetch()
    }
}

impl<T> Debug for QueryableCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryableCollection")
            .field("navigation", &self.navigation)
            .field("query", &self.query)
            .finish()
    }
}

impl<'a, T: Entity> IntoIterator for &'a QueryableCollection<T> {
    type Item = ModelResult<T>;
    type IntoIter = QueryIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One enumeration of a `QueryableCollection`
pub struct QueryIter<'a, T> {
    source: &'a QueryableCollection<T>,
    rows: Option<std::vec::IntoIter<Box<dyn AnyEntity>>>,
    failed: bool,
}

impl<'a, T: Entity> Iterator for QueryIter<'a, T> {
    type Item = ModelResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        if self.rows.is_none() {
            match self.source.execute() {
                Ok(rows) => self.rows = Some(rows.into_iter()),
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }

        let row = self.rows.as_mut()?.next()?;
        Some(downcast_entity::<T>(row))
    }
}

/// Accessor building lazy proxies for a query-shaped navigation
pub struct QueryableCollectionAccessor<E, T> {
    navigation: String,
    field_type: FieldType,
    foreign_key: String,
    principal_key: String,
    inverse: InverseLink,
    context: Arc<dyn UnitOfWork>,
    _marker: PhantomData<fn() -> (E, T)>,
}

impl<E: Entity, T: Entity> QueryableCollectionAccessor<E, T> {
    pub fn new(navigation: &Navigation, field_type: FieldType) -> Self {
        let foreign_key = navigation.foreign_key();
        if foreign_key.is_composite() {
            warn!(
                "Navigation {} uses composite foreign key {}; only '{}' filters the lazy collection",
                navigation.display_name(),
                foreign_key.format_properties(),
                foreign_key.first_property()
            );
        }

        Self {
            navigation: navigation.display_name(),
            field_type,
            foreign_key: foreign_key.first_property().to_string(),
            principal_key: foreign_key.first_principal_key().to_string(),
            inverse: navigation.inverse_link().clone(),
            context: navigation.context().clone(),
            _marker: PhantomData,
        }
    }

    /// Lazy collection of the dependents of `owner`
    pub fn get(&self, owner: &E) -> QueryableCollection<T> {
        let key = owner.field_value(&self.principal_key).unwrap_or(Value::Null);
        let collection =
            QueryableCollection::for_owner(&self.navigation, &self.foreign_key, key, self.context.clone());
        match self.inverse.get() {
            Some(inverse) => collection.include(&inverse),
            None => collection,
        }
    }

    /// Unfiltered proxy over the whole dependent set
    pub fn create(&self) -> QueryableCollection<T> {
        QueryableCollection::unfiltered(&self.navigation, self.context.clone())
    }

    /// Unfiltered proxy after registering each item with the unit of work
    pub fn create_with(&self, items: Vec<T>) -> ModelResult<QueryableCollection<T>> {
        let collection = self.create();
        for item in items {
            collection.add(item)?;
        }
        Ok(collection)
    }

    /// Nothing is stored on the owner, so this is the same as `get`
    pub fn create_and_set(&self, owner: &mut E) -> QueryableCollection<T> {
        self.get(owner)
    }

    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }
}

impl<E, T> Debug for QueryableCollectionAccessor<E, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryableCollectionAccessor")
            .field("navigation", &self.navigation)
            .field("field_type", &self.field_type)
            .field("foreign_key", &self.foreign_key)
            .field("principal_key", &self.principal_key)
            .field("inverse", &self.inverse)
            .finish()
    }
}

impl<E: Entity, T: Entity> CollectionAccessor for QueryableCollectionAccessor<E, T> {
    fn navigation_name(&self) -> &str {
        &self.navigation
    }

    fn collection_type(&self) -> &FieldType {
        &self.field_type
    }

    fn strategy(&self) -> AccessorStrategy {
        AccessorStrategy::Queryable
    }

    fn add(&self, instance: &mut dyn Any, item: Box<dyn Any>) -> ModelResult<bool> {
        let item = downcast_item::<T>(item)?;
        self.get(downcast_instance_mut::<E>(instance)?).add(item)
    }

    fn contains(&self, instance: &dyn Any, item: &dyn Any) -> ModelResult<bool> {
        let item = downcast_instance::<T>(item)?;
        self.get(downcast_instance::<E>(instance)?).contains(item)
    }

    fn remove(&self, instance: &mut dyn Any, item: &dyn Any) -> ModelResult<bool> {
        let item = downcast_instance::<T>(item)?;
        self.get(downcast_instance_mut::<E>(instance)?).remove(item)
    }

    fn len(&self, instance: &dyn Any) -> ModelResult<usize> {
        self.get(downcast_instance::<E>(instance)?).count()
    }

    fn create(&self) -> ModelResult<Box<dyn Any>> {
        Ok(Box::new(QueryableCollectionAccessor::create(self)))
    }

    fn create_with(&self, items: Vec<Box<dyn Any>>) -> ModelResult<Box<dyn Any>> {
        let items = downcast_items::<T>(items)?;
        Ok(Box::new(QueryableCollectionAccessor::create_with(self, items)?))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
