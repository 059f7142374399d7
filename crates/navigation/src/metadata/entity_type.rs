//! Entity Shapes - Per-type metadata containers
//!
//! Properties and navigations are kept in ordered maps so iteration order and
//! error messages are stable. Cross-shape checks (hierarchy name conflicts,
//! foreign key ends) live on `Model`, which can see every shape.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, TypeDescriptor};
use crate::metadata::{ForeignKey, Navigation};

/// What kind of shape this is
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeKind {
    /// Keyed entity
    Entity,
    /// Keyless shape only used for reads
    Query,
    /// Entity owned through a navigation on another shape
    Weak {
        defining_entity: String,
        defining_navigation: String,
    },
}

/// Scalar property of a shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub is_key: bool,
}

#[derive(Debug)]
pub struct EntityShape {
    name: String,
    kind: ShapeKind,
    backing_type: Option<TypeDescriptor>,
    base: Option<String>,
    properties: BTreeMap<String, Property>,
    service_properties: BTreeSet<String>,
    foreign_keys: Vec<Arc<ForeignKey>>,
    navigations: BTreeMap<String, Arc<Navigation>>,
}

impl EntityShape {
    /// Shape with no backing type
    pub fn new(name: &str) -> Self {
        Self::with_kind(name, ShapeKind::Entity)
    }

    /// Shape backed by `E`, with its primary key declared
    pub fn for_entity<E: Entity>() -> Self {
        let mut shape = Self::new(E::entity_name());
        shape.backing_type = Some(TypeDescriptor::of::<E>());
        shape.insert_property(E::primary_key_name(), true);
        shape
    }

    pub fn query_type(name: &str) -> Self {
        Self::with_kind(name, ShapeKind::Query)
    }

    pub fn weak(name: &str, defining_entity: &str, defining_navigation: &str) -> Self {
        Self::with_kind(
            name,
            ShapeKind::Weak {
                defining_entity: defining_entity.to_string(),
                defining_navigation: defining_navigation.to_string(),
            },
        )
    }

    fn with_kind(name: &str, kind: ShapeKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            backing_type: None,
            base: None,
            properties: BTreeMap::new(),
            service_properties: BTreeSet::new(),
            foreign_keys: Vec::new(),
            navigations: BTreeMap::new(),
        }
    }

    pub fn with_backing_type(mut self, backing_type: TypeDescriptor) -> Self {
        self.backing_type = Some(backing_type);
        self
    }

    pub fn with_base(mut self, base: &str) -> Self {
        self.base = Some(base.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name including the defining path for weak shapes
    pub fn display_name(&self) -> String {
        match &self.kind {
            ShapeKind::Weak {
                defining_entity,
                defining_navigation,
            } => format!("{}.{}#{}", defining_entity, defining_navigation, self.name),
            _ => self.name.clone(),
        }
    }

    pub fn kind(&self) -> &ShapeKind {
        &self.kind
    }

    pub fn is_query_type(&self) -> bool {
        self.kind == ShapeKind::Query
    }

    pub fn is_weak(&self) -> bool {
        matches!(self.kind, ShapeKind::Weak { .. })
    }

    /// `(defining entity, defining navigation)` of a weak shape
    pub fn defining_path(&self) -> Option<(&str, &str)> {
        match &self.kind {
            ShapeKind::Weak {
                defining_entity,
                defining_navigation,
            } => Some((defining_entity.as_str(), defining_navigation.as_str())),
            _ => None,
        }
    }

    pub fn backing_type(&self) -> Option<TypeDescriptor> {
        self.backing_type
    }

    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    pub fn find_property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> impl Iterator<Item = &Property> {
        self.properties.values()
    }

    pub fn key_properties(&self) -> impl Iterator<Item = &Property> {
        self.properties.values().filter(|p| p.is_key)
    }

    pub fn has_service_property(&self, name: &str) -> bool {
        self.service_properties.contains(name)
    }

    pub fn service_properties(&self) -> impl Iterator<Item = &str> {
        self.service_properties.iter().map(String::as_str)
    }

    /// Foreign keys declared on this shape as the dependent
    pub fn declared_foreign_keys(&self) -> &[Arc<ForeignKey>] {
        &self.foreign_keys
    }

    pub fn find_declared_navigation(&self, name: &str) -> Option<&Arc<Navigation>> {
        self.navigations.get(name)
    }

    /// Navigations declared on this shape, ordered by name
    pub fn declared_navigations(&self) -> impl Iterator<Item = &Arc<Navigation>> {
        self.navigations.values()
    }

    /// Whether a property, service property or navigation uses `name`
    pub(crate) fn declares_member(&self, name: &str) -> bool {
        self.properties.contains_key(name)
            || self.service_properties.contains(name)
            || self.navigations.contains_key(name)
    }

    pub(crate) fn insert_property(&mut self, name: &str, is_key: bool) {
        self.properties.insert(
            name.to_string(),
            Property {
                name: name.to_string(),
                is_key,
            },
        );
    }

    pub(crate) fn insert_service_property(&mut self, name: &str) {
        self.service_properties.insert(name.to_string());
    }

    /// Returns the already declared key when an equal one exists
    pub(crate) fn insert_foreign_key(&mut self, foreign_key: ForeignKey) -> Arc<ForeignKey> {
        if let Some(existing) = self.foreign_keys.iter().find(|fk| ***fk == foreign_key) {
            return existing.clone();
        }
        let foreign_key = Arc::new(foreign_key);
        self.foreign_keys.push(foreign_key.clone());
        foreign_key
    }

    pub(crate) fn insert_navigation(&mut self, navigation: Arc<Navigation>) {
        self.navigations.insert(navigation.name().to_string(), navigation);
    }

    pub(crate) fn take_navigation(&mut self, name: &str) -> Option<Arc<Navigation>> {
        self.navigations.remove(name)
    }
}
