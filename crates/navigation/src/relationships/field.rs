//! Navigation Field Types - Static description of a navigation's declared type
//!
//! `NavigationFieldType` tells the accessor factory what a navigation field
//! can hold: which element type it enumerates, whether an empty in-memory
//! collection can be created for it, and whether it is query-shaped.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

use crate::entity::{short_type_name, Entity, TypeDescriptor};
use crate::error::ModelResult;

/// Broad shape of a navigation field type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldShape {
    /// Growable in-memory collection that can be created empty
    Sequence,
    /// Fixed-size array
    Array { len: usize },
    /// Query-shaped sequence, satisfiable by a lazy proxy
    Queryable,
    /// Enumerable, but neither instantiable nor query-shaped
    Opaque,
    /// Single value
    Scalar,
}

impl FieldShape {
    pub fn is_instantiable(self) -> bool {
        matches!(self, FieldShape::Sequence)
    }

    pub fn is_array(self) -> bool {
        matches!(self, FieldShape::Array { .. })
    }

    pub fn is_query_shaped(self) -> bool {
        matches!(self, FieldShape::Queryable)
    }
}

/// Runtime descriptor of a declared navigation field type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldType {
    type_name: &'static str,
    shape: FieldShape,
    element: Option<TypeDescriptor>,
}

impl FieldType {
    /// Descriptor of a collection field type
    pub fn of<C: NavigationFieldType>() -> Self {
        Self {
            type_name: std::any::type_name::<C>(),
            shape: C::SHAPE,
            element: Some(TypeDescriptor::of::<C::Element>()),
        }
    }

    /// Descriptor of a single-valued field; exposes no element type
    pub fn reference<R: 'static>() -> Self {
        Self {
            type_name: std::any::type_name::<R>(),
            shape: FieldShape::Scalar,
            element: None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn short_name(&self) -> String {
        short_type_name(self.type_name)
    }

    pub fn shape(&self) -> FieldShape {
        self.shape
    }

    pub fn element(&self) -> Option<TypeDescriptor> {
        self.element
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_name())
    }
}

/// Mutable collection capability shared by in-memory collections and
/// queryable proxies.
///
/// Entities are compared by primary key when both sides have one, otherwise
/// by their serialized fields.
pub trait NavigationCollection<T>: Send + Sync {
    /// Returns `false` when the item was already part of the collection
    fn add(&mut self, item: T) -> ModelResult<bool>;

    /// Returns `false` when the item was not part of the collection
    fn remove(&mut self, item: &T) -> ModelResult<bool>;

    fn contains(&self, item: &T) -> ModelResult<bool>;

    fn len(&self) -> ModelResult<usize>;

    fn is_empty(&self) -> ModelResult<bool> {
        Ok(self.len()? == 0)
    }

    fn clear(&mut self) -> ModelResult<()>;

    /// Snapshot of the current items
    fn to_vec(&self) -> ModelResult<Vec<T>>;
}

pub(crate) fn same_entity<T: Entity>(a: &T, b: &T) -> bool {
    match (a.primary_key(), b.primary_key()) {
        (Some(x), Some(y)) => x == y,
        _ => a.to_fields() == b.to_fields(),
    }
}

/// Declared type of a collection navigation field
pub trait NavigationFieldType: Send + Sync + 'static {
    type Element: Entity;

    const SHAPE: FieldShape;

    /// Empty in-memory instance, `None` when the type cannot be created
    fn instantiate() -> Option<Self>
    where
        Self: Sized,
    {
        None
    }

    fn as_collection(&self) -> Option<&dyn NavigationCollection<Self::Element>> {
        None
    }

    fn as_collection_mut(&mut self) -> Option<&mut dyn NavigationCollection<Self::Element>> {
        None
    }
}

/// Marker for a query-shaped navigation field.
///
/// A field of this type holds nothing; reads go through the lazy accessor,
/// which builds a `QueryableCollection` for the owning instance.
pub struct Queryable<T>(PhantomData<fn() -> T>);

impl<T> Queryable<T> {
    pub fn new() -> Self {
        Queryable(PhantomData)
    }
}

impl<T> Default for Queryable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Queryable<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> Copy for Queryable<T> {}

impl<T> PartialEq for Queryable<T> {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl<T> Eq for Queryable<T> {}

impl<T> fmt::Debug for Queryable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Queryable<{}>", short_type_name(std::any::type_name::<T>()))
    }
}

impl<T: Entity> NavigationFieldType for Queryable<T> {
    type Element = T;
    const SHAPE: FieldShape = FieldShape::Queryable;
}

impl<T: Entity, const N: usize> NavigationFieldType for [T; N] {
    type Element = T;
    const SHAPE: FieldShape = FieldShape::Array { len: N };
}

impl<T: Entity> NavigationFieldType for Vec<T> {
    type Element = T;
    const SHAPE: FieldShape = FieldShape::Sequence;

    fn instantiate() -> Option<Self> {
        Some(Vec::new())
    }

    fn as_collection(&self) -> Option<&dyn NavigationCollection<T>> {
        Some(self)
    }

    fn as_collection_mut(&mut self) -> Option<&mut dyn NavigationCollection<T>> {
        Some(self)
    }
}

impl<T: Entity> NavigationCollection<T> for Vec<T> {
    fn add(&mut self, item: T) -> ModelResult<bool> {
        if self.iter().any(|existing| same_entity(existing, &item)) {
            return Ok(false);
        }
        self.push(item);
        Ok(true)
    }

    fn remove(&mut self, item: &T) -> ModelResult<bool> {
        match self.iter().position(|existing| same_entity(existing, item)) {
            Some(index) => {
                Vec::remove(self, index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn contains(&self, item: &T) -> ModelResult<bool> {
        Ok(self.iter().any(|existing| same_entity(existing, item)))
    }

    fn len(&self) -> ModelResult<usize> {
        Ok(Vec::len(self))
    }

    fn clear(&mut self) -> ModelResult<()> {
        Vec::clear(self);
        Ok(())
    }

    fn to_vec(&self) -> ModelResult<Vec<T>> {
        Ok(self.clone())
    }
}

impl<T: Entity> NavigationFieldType for VecDeque<T> {
    type Element = T;
    const SHAPE: FieldShape = FieldShape::Sequence;

    fn instantiate() -> Option<Self> {
        Some(VecDeque::new())
    }

    fn as_collection(&self) -> Option<&dyn NavigationCollection<T>> {
        Some(self)
    }

    fn as_collection_mut(&mut self) -> Option<&mut dyn NavigationCollection<T>> {
        Some(self)
    }
}

impl<T: Entity> NavigationCollection<T> for VecDeque<T> {
    fn add(&mut self, item: T) -> ModelResult<bool> {
        if self.iter().any(|existing| same_entity(existing, &item)) {
            return Ok(false);
        }
        self.push_back(item);
        Ok(true)
    }

    fn remove(&mut self, item: &T) -> ModelResult<bool> {
        match self.iter().position(|existing| same_entity(existing, item)) {
            Some(index) => Ok(VecDeque::remove(self, index).is_some()),
            None => Ok(false),
        }
    }

    fn contains(&self, item: &T) -> ModelResult<bool> {
        Ok(self.iter().any(|existing| same_entity(existing, item)))
    }

    fn len(&self) -> ModelResult<usize> {
        Ok(VecDeque::len(self))
    }

    fn clear(&mut self) -> ModelResult<()> {
        VecDeque::clear(self);
        Ok(())
    }

    fn to_vec(&self) -> ModelResult<Vec<T>> {
        Ok(self.iter().cloned().collect())
    }
}

impl<T: Entity + Ord> NavigationFieldType for BTreeSet<T> {
    type Element = T;
    const SHAPE: FieldShape = FieldShape::Sequence;

    fn instantiate() -> Option<Self> {
        Some(BTreeSet::new())
    }

    fn as_collection(&self) -> Option<&dyn NavigationCollection<T>> {
        Some(self)
    }

    fn as_collection_mut(&mut self) -> Option<&mut dyn NavigationCollection<T>> {
        Some(self)
    }
}

impl<T: Entity + Ord> NavigationCollection<T> for BTreeSet<T> {
    fn add(&mut self, item: T) -> ModelResult<bool> {
        Ok(self.insert(item))
    }

    fn remove(&mut self, item: &T) -> ModelResult<bool> {
        Ok(BTreeSet::remove(self, item))
    }

    fn contains(&self, item: &T) -> ModelResult<bool> {
        Ok(BTreeSet::contains(self, item))
    }

    fn len(&self) -> ModelResult<usize> {
        Ok(BTreeSet::len(self))
    }

    fn clear(&mut self) -> ModelResult<()> {
        BTreeSet::clear(self);
        Ok(())
    }

    fn to_vec(&self) -> ModelResult<Vec<T>> {
        Ok(self.iter().cloned().collect())
    }
}

impl<T: Entity + Eq + Hash> NavigationFieldType for HashSet<T> {
    type Element = T;
    const SHAPE: FieldShape = FieldShape::Sequence;

    fn instantiate() -> Option<Self> {
        Some(HashSet::new())
    }

    fn as_collection(&self) -> Option<&dyn NavigationCollection<T>> {
        Some(self)
    }

    fn as_collection_mut(&mut self) -> Option<&mut dyn NavigationCollection<T>> {
        Some(self)
    }
}

impl<T: Entity + Eq + Hash> NavigationCollection<T> for HashSet<T> {
    fn add(&mut self, item: T) -> ModelResult<bool> {
        Ok(self.insert(item))
    }

    fn remove(&mut self, item: &T) -> ModelResult<bool> {
        Ok(HashSet::remove(self, item))
    }

    fn contains(&self, item: &T) -> ModelResult<bool> {
        Ok(HashSet::contains(self, item))
    }

    fn len(&self) -> ModelResult<usize> {
        Ok(HashSet::len(self))
    }

    fn clear(&mut self) -> ModelResult<()> {
        HashSet::clear(self);
        Ok(())
    }

    fn to_vec(&self) -> ModelResult<Vec<T>> {
        Ok(self.iter().cloned().collect())
    }
}
