//! Member Bindings - Typed access to a navigation field on its owning type
//!
//! A binding is created once, when the navigation is registered, and carries
//! everything the accessor factory needs to know about the field: its declared
//! type, whether it can be written, and how to build a typed accessor for it.

use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::entity::{Entity, TypeDescriptor};
use crate::metadata::Navigation;
use crate::relationships::accessor::{CollectionAccessor, MaterializedCollectionAccessor};
use crate::relationships::field::{FieldType, NavigationFieldType};
use crate::relationships::queryable::QueryableCollectionAccessor;

/// Erased binding of a navigation to a field of its declaring type
pub trait MemberBinding: Send + Sync + Debug {
    /// Field name
    fn name(&self) -> &str;

    fn field_type(&self) -> &FieldType;

    /// Rust type declaring the field
    fn declaring_type(&self) -> TypeDescriptor;

    /// Accessor supplied up front, bypassing the factory
    fn prebuilt_accessor(&self) -> Option<Arc<dyn CollectionAccessor>> {
        None
    }

    /// Whether the field can be read mutably and assigned
    fn has_setter(&self) -> bool;

    fn bind_materialized(&self, navigation: &Navigation) -> Option<Arc<dyn CollectionAccessor>>;

    fn bind_queryable(&self, navigation: &Navigation) -> Option<Arc<dyn CollectionAccessor>>;
}

/// Binding of a collection field of type `C` on entity `E`
pub struct CollectionMember<E, C> {
    name: String,
    field_type: FieldType,
    getter: Option<fn(&E) -> Option<&C>>,
    getter_mut: Option<fn(&mut E) -> Option<&mut C>>,
    setter: Option<fn(&mut E, C)>,
    prebuilt: Option<Arc<dyn CollectionAccessor>>,
    _marker: PhantomData<fn() -> (E, C)>,
}

impl<E: Entity, C: NavigationFieldType> CollectionMember<E, C> {
    /// Binding with no field access; enough for query-shaped navigations
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::of::<C>(),
            getter: None,
            getter_mut: None,
            setter: None,
            prebuilt: None,
            _marker: PhantomData,
        }
    }

    pub fn with_getter(mut self, getter: fn(&E) -> Option<&C>, getter_mut: fn(&mut E) -> Option<&mut C>) -> Self {
        self.getter = Some(getter);
        self.getter_mut = Some(getter_mut);
        self
    }

    pub fn with_setter(mut self, setter: fn(&mut E, C)) -> Self {
        self.setter = Some(setter);
        self
    }

    pub fn with_accessor(mut self, accessor: Arc<dyn CollectionAccessor>) -> Self {
        self.prebuilt = Some(accessor);
        self
    }
}

impl<E, C> Debug for CollectionMember<E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionMember")
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .field("has_getter", &self.getter.is_some())
            .field("has_setter", &self.setter.is_some())
            .finish()
    }
}

impl<E: Entity, C: NavigationFieldType> MemberBinding for CollectionMember<E, C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    fn declaring_type(&self) -> TypeDescriptor {
        TypeDescriptor::of::<E>()
    }

    fn prebuilt_accessor(&self) -> Option<Arc<dyn CollectionAccessor>> {
        self.prebuilt.clone()
    }

    fn has_setter(&self) -> bool {
        self.setter.is_some() && self.getter_mut.is_some()
    }

    fn bind_materialized(&self, navigation: &Navigation) -> Option<Arc<dyn CollectionAccessor>> {
        let accessor = MaterializedCollectionAccessor::<E, C>::new(
            &navigation.display_name(),
            self.getter?,
            self.getter_mut?,
            self.setter?,
        );
        Some(Arc::new(accessor))
    }

    fn bind_queryable(&self, navigation: &Navigation) -> Option<Arc<dyn CollectionAccessor>> {
        let accessor =
            QueryableCollectionAccessor::<E, C::Element>::new(navigation, self.field_type.clone());
        Some(Arc::new(accessor))
    }
}

/// Binding of a single-valued field of type `R` on entity `E`
pub struct ReferenceMember<E, R> {
    name: String,
    field_type: FieldType,
    _marker: PhantomData<fn() -> (E, R)>,
}

impl<E: Entity, R: 'static> ReferenceMember<E, R> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::reference::<R>(),
            _marker: PhantomData,
        }
    }
}

impl<E, R> Debug for ReferenceMember<E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceMember")
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .finish()
    }
}

impl<E: Entity, R: 'static> MemberBinding for ReferenceMember<E, R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    fn declaring_type(&self) -> TypeDescriptor {
        TypeDescriptor::of::<E>()
    }

    fn has_setter(&self) -> bool {
        false
    }

    fn bind_materialized(&self, _navigation: &Navigation) -> Option<Arc<dyn CollectionAccessor>> {
        None
    }

    fn bind_queryable(&self, _navigation: &Navigation) -> Option<Arc<dyn CollectionAccessor>> {
        None
    }
}
