//! Model - Every entity shape of one mapping context
//!
//! The model is assembled single-threaded by `ModelBuilder` and frozen behind
//! an `Arc` by `ModelBuilder::finish`. Navigations created here carry the
//! unit of work the model was built for, which is how lazy collections reach
//! the store.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::context::UnitOfWork;
use crate::entity::TypeDescriptor;
use crate::error::{MetadataError, ModelResult};
use crate::metadata::{EntityShape, ForeignKey, Navigation, ShapeKind};
use crate::options::ContextOptions;
use crate::relationships::MemberBinding;

/// Annotation holding the version of the crate that built the model
pub const PRODUCT_VERSION_ANNOTATION: &str = "ProductVersion";

type DefiningPath = (String, String);

#[derive(Debug)]
pub struct Model {
    context: Arc<dyn UnitOfWork>,
    entity_types: BTreeMap<String, EntityShape>,
    weak_entity_types: BTreeMap<String, BTreeMap<DefiningPath, EntityShape>>,
    annotations: BTreeMap<String, Value>,
}

impl Model {
    pub fn new(context: Arc<dyn UnitOfWork>) -> Self {
        Self {
            context,
            entity_types: BTreeMap::new(),
            weak_entity_types: BTreeMap::new(),
            annotations: BTreeMap::new(),
        }
    }

    pub fn context(&self) -> &Arc<dyn UnitOfWork> {
        &self.context
    }

    pub fn options(&self) -> &ContextOptions {
        self.context.options()
    }

    pub fn set_annotation(&mut self, name: &str, value: Value) {
        self.annotations.insert(name.to_string(), value);
    }

    pub fn annotation(&self, name: &str) -> Option<&Value> {
        self.annotations.get(name)
    }

    // Shapes

    /// Register a shape, rejecting duplicates and kind clashes
    pub fn add_entity_type(&mut self, shape: EntityShape) -> ModelResult<&mut EntityShape> {
        let name = shape.name().to_string();

        if let Some(base) = shape.base() {
            if !self.entity_types.contains_key(base) {
                return Err(MetadataError::BaseTypeNotFound {
                    entity: name,
                    base: base.to_string(),
                }
                .into());
            }
        }

        match shape.kind().clone() {
            ShapeKind::Weak {
                defining_entity,
                defining_navigation,
            } => {
                if self.entity_types.contains_key(&name) {
                    return Err(MetadataError::ClashingNonWeakEntityType(shape.display_name()).into());
                }
                let group = self.weak_entity_types.entry(name).or_default();
                let path = (defining_entity, defining_navigation);
                if group.contains_key(&path) {
                    return Err(MetadataError::DuplicateEntityType(shape.display_name()).into());
                }
                debug!("Adding weak entity type {}", shape.display_name());
                Ok(group.entry(path).or_insert(shape))
            }
            kind => {
                if self.weak_entity_types.contains_key(&name) {
                    return Err(MetadataError::ClashingWeakEntityType(name).into());
                }
                if let Some(existing) = self.entity_types.get(&name) {
                    let error = match (existing.is_query_type(), kind == ShapeKind::Query) {
                        (true, true) => MetadataError::DuplicateQueryType(name),
                        (true, false) => MetadataError::CannotAccessQueryAsEntity(name),
                        (false, true) => MetadataError::CannotAccessEntityAsQuery(name),
                        (false, false) => MetadataError::DuplicateEntityType(name),
                    };
                    return Err(error.into());
                }
                debug!("Adding entity type {}", name);
                Ok(self.entity_types.entry(name).or_insert(shape))
            }
        }
    }

    pub fn find_entity_type(&self, name: &str) -> Option<&EntityShape> {
        self.entity_types.get(name)
    }

    /// Shape backed by the given Rust type
    pub fn find_entity_type_by_type(&self, backing_type: TypeDescriptor) -> Option<&EntityShape> {
        self.entity_types
            .values()
            .find(|shape| shape.backing_type() == Some(backing_type))
    }

    pub fn find_weak_entity_type(
        &self,
        name: &str,
        defining_entity: &str,
        defining_navigation: &str,
    ) -> Option<&EntityShape> {
        self.weak_entity_types
            .get(name)?
            .get(&(defining_entity.to_string(), defining_navigation.to_string()))
    }

    /// The shape named `name`, or every weak shape sharing that name
    pub fn entity_types_named(&self, name: &str) -> Vec<&EntityShape> {
        match self.entity_types.get(name) {
            Some(shape) => vec![shape],
            None => self
                .weak_entity_types
                .get(name)
                .map(|group| group.values().collect())
                .unwrap_or_default(),
        }
    }

    pub fn has_entity_type_with_defining_navigation(&self, name: &str) -> bool {
        self.weak_entity_types.contains_key(name)
    }

    /// Every shape: non-weak shapes by name, then weak shapes by name and
    /// defining path
    pub fn entity_types(&self) -> impl Iterator<Item = &EntityShape> {
        self.entity_types
            .values()
            .chain(self.weak_entity_types.values().flat_map(|group| group.values()))
    }

    /// Shapes whose base is `name`
    pub fn derived_types<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a EntityShape> + 'a {
        self.entity_types
            .values()
            .filter(move |shape| shape.base() == Some(name))
    }

    pub fn remove_entity_type(&mut self, name: &str) -> ModelResult<Option<EntityShape>> {
        let Some(shape) = self.entity_types.get(name) else {
            return Ok(None);
        };
        self.assert_can_remove(shape)?;
        debug!("Removing entity type {}", name);
        Ok(self.entity_types.remove(name))
    }

    pub fn remove_weak_entity_type(
        &mut self,
        name: &str,
        defining_entity: &str,
        defining_navigation: &str,
    ) -> ModelResult<Option<EntityShape>> {
        let Some(shape) = self.find_weak_entity_type(name, defining_entity, defining_navigation) else {
            return Ok(None);
        };
        self.assert_can_remove(shape)?;

        let path = (defining_entity.to_string(), defining_navigation.to_string());
        let removed = self.weak_entity_types.get_mut(name).and_then(|group| group.remove(&path));
        if self.weak_entity_types.get(name).map_or(false, |group| group.is_empty()) {
            self.weak_entity_types.remove(name);
        }
        debug!("Removing weak entity type {}.{}#{}", defining_entity, defining_navigation, name);
        Ok(removed)
    }

    fn assert_can_remove(&self, shape: &EntityShape) -> Result<(), MetadataError> {
        if let Some(fk) = shape
            .declared_foreign_keys()
            .iter()
            .find(|fk| fk.principal() != shape.name())
        {
            return Err(MetadataError::EntityTypeInUseByForeignKey {
                entity: shape.display_name(),
                principal: fk.principal().to_string(),
                properties: fk.format_properties(),
            });
        }

        if let Some(fk) = self.referencing_foreign_keys(shape.name()).next() {
            return Err(MetadataError::EntityTypeInUseByReferencingForeignKey {
                entity: shape.display_name(),
                properties: fk.format_properties(),
                dependent: fk.dependent().to_string(),
            });
        }

        if let Some(derived) = self.derived_types(shape.name()).next() {
            return Err(MetadataError::EntityTypeInUseByDerived {
                entity: shape.display_name(),
                derived: derived.name().to_string(),
            });
        }

        Ok(())
    }

    /// Foreign keys anywhere in the model whose principal is `name`
    pub fn referencing_foreign_keys<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Arc<ForeignKey>> + 'a {
        self.entity_types()
            .flat_map(|shape| shape.declared_foreign_keys().iter())
            .filter(move |fk| fk.principal() == name)
    }

    /// The shape, its ancestors and its descendants
    fn hierarchy(&self, name: &str) -> Vec<&EntityShape> {
        let mut shapes = Vec::new();

        let mut current = self.entity_types.get(name);
        while let Some(shape) = current {
            shapes.push(shape);
            current = shape.base().and_then(|base| self.entity_types.get(base));
        }

        let mut pending = vec![name.to_string()];
        while let Some(parent) = pending.pop() {
            let children = self
                .entity_types
                .values()
                .filter(|shape| shape.base() == Some(parent.as_str()));
            for derived in children {
                pending.push(derived.name().to_string());
                shapes.push(derived);
            }
        }

        shapes
    }

    fn declares_in_hierarchy(&self, entity: &str, property: &str) -> bool {
        self.hierarchy(entity)
            .iter()
            .any(|shape| shape.find_property(property).is_some())
    }

    fn shape_mut(&mut self, name: &str) -> Result<&mut EntityShape, MetadataError> {
        self.entity_types
            .get_mut(name)
            .ok_or_else(|| MetadataError::EntityTypeNotFound(name.to_string()))
    }

    /// Error for declaring `member` on a shape that is not a non-weak entity type
    fn missing_member_owner(&self, entity: &str, member: &str) -> MetadataError {
        if self.weak_entity_types.contains_key(entity) {
            MetadataError::WeakEntityTypeMember {
                entity: entity.to_string(),
                member: member.to_string(),
            }
        } else {
            MetadataError::EntityTypeNotFound(entity.to_string())
        }
    }

    fn check_member_name(&self, entity: &str, name: &str) -> Result<(), MetadataError> {
        if !self.entity_types.contains_key(entity) {
            return Err(self.missing_member_owner(entity, name));
        }
        if let Some(conflicting) = self.hierarchy(entity).into_iter().find(|s| s.declares_member(name)) {
            return Err(MetadataError::ConflictingName {
                name: name.to_string(),
                entity: entity.to_string(),
                conflicting_entity: conflicting.name().to_string(),
            });
        }
        Ok(())
    }

    // Properties

    pub fn add_property(&mut self, entity: &str, name: &str) -> ModelResult<()> {
        self.check_member_name(entity, name)?;
        self.shape_mut(entity)?.insert_property(name, false);
        Ok(())
    }

    /// Field injected by the framework rather than stored
    pub fn add_service_property(&mut self, entity: &str, name: &str) -> ModelResult<()> {
        self.check_member_name(entity, name)?;
        self.shape_mut(entity)?.insert_service_property(name);
        Ok(())
    }

    // Foreign keys

    /// Declare a foreign key on its dependent shape.
    ///
    /// Both shapes must exist and declare the key properties. An equal key
    /// already declared on the dependent is returned instead of a new one.
    pub fn add_foreign_key(&mut self, foreign_key: ForeignKey) -> ModelResult<Arc<ForeignKey>> {
        self.validate_foreign_key(&foreign_key)?;
        debug!("Adding foreign key {}", foreign_key);
        let dependent = foreign_key.dependent().to_string();
        Ok(self.shape_mut(&dependent)?.insert_foreign_key(foreign_key))
    }

    fn validate_foreign_key(&self, fk: &ForeignKey) -> Result<(), MetadataError> {
        let invalid = |reason: String| MetadataError::InvalidForeignKey {
            dependent: fk.dependent().to_string(),
            principal: fk.principal().to_string(),
            reason,
        };

        for entity in [fk.dependent(), fk.principal()] {
            if !self.entity_types.contains_key(entity) {
                return Err(invalid(format!("entity type '{}' is not in the model", entity)));
            }
        }
        if let Some(property) = fk
            .properties()
            .iter()
            .find(|p| !self.declares_in_hierarchy(fk.dependent(), p))
        {
            return Err(invalid(format!("'{}' is not a property of '{}'", property, fk.dependent())));
        }
        if let Some(property) = fk
            .principal_key()
            .iter()
            .find(|p| !self.declares_in_hierarchy(fk.principal(), p))
        {
            return Err(invalid(format!("'{}' is not a property of '{}'", property, fk.principal())));
        }
        Ok(())
    }

    // Navigations

    /// Register a navigation on `entity` over `foreign_key`.
    ///
    /// Fails when the name is taken anywhere in the shape's hierarchy, when
    /// `entity` is not the end of the key the navigation starts from, or when
    /// the member is bound to other types than the shapes involved. A
    /// navigation on the other end of the same key becomes its inverse.
    pub fn add_navigation(
        &mut self,
        entity: &str,
        name: &str,
        foreign_key: &Arc<ForeignKey>,
        points_to_principal: bool,
        member: Option<Arc<dyn MemberBinding>>,
    ) -> ModelResult<Arc<Navigation>> {
        let shape = self
            .entity_types
            .get(entity)
            .ok_or_else(|| self.missing_member_owner(entity, name))?;

        let hierarchy = self.hierarchy(entity);
        if let Some(duplicate) = hierarchy.iter().find_map(|s| s.find_declared_navigation(name)) {
            if duplicate.foreign_key() != foreign_key {
                return Err(MetadataError::ConflictingForeignKey {
                    navigation: duplicate.name().to_string(),
                    entity: duplicate.declaring_entity().to_string(),
                    foreign_key: foreign_key.format_properties(),
                    existing: duplicate.foreign_key().format_properties(),
                }
                .into());
            }
            return Err(MetadataError::ConflictingName {
                name: name.to_string(),
                entity: entity.to_string(),
                conflicting_entity: duplicate.declaring_entity().to_string(),
            }
            .into());
        }
        if let Some(conflicting) = hierarchy.iter().find(|s| s.declares_member(name)) {
            return Err(MetadataError::ConflictingName {
                name: name.to_string(),
                entity: entity.to_string(),
                conflicting_entity: conflicting.name().to_string(),
            }
            .into());
        }

        let (source, target) = if points_to_principal {
            (foreign_key.dependent(), foreign_key.principal())
        } else {
            (foreign_key.principal(), foreign_key.dependent())
        };
        if source != entity {
            return Err(MetadataError::NavigationEntityMismatch {
                navigation: name.to_string(),
                entity: entity.to_string(),
                foreign_key: foreign_key.format_properties(),
                dependent: foreign_key.dependent().to_string(),
                principal: foreign_key.principal().to_string(),
            }
            .into());
        }

        if let Some(member) = &member {
            self.check_member_types(shape, name, target, member.as_ref())?;
        }

        let navigation = Arc::new(Navigation::new(
            name,
            entity,
            foreign_key.clone(),
            points_to_principal,
            member,
            self.context.clone(),
        ));

        let inverse = self.entity_types.get(target).and_then(|target_shape| {
            target_shape
                .declared_navigations()
                .find(|n| n.foreign_key() == foreign_key && n.points_to_principal() != points_to_principal)
                .cloned()
        });
        if let Some(inverse) = inverse {
            navigation.set_inverse(inverse.name());
            inverse.set_inverse(name);
        }

        info!(
            "Added navigation {} to {} over {}",
            navigation.display_name(),
            target,
            foreign_key
        );
        self.shape_mut(entity)?.insert_navigation(navigation.clone());
        Ok(navigation)
    }

    fn check_member_types(
        &self,
        shape: &EntityShape,
        name: &str,
        target: &str,
        member: &dyn MemberBinding,
    ) -> Result<(), MetadataError> {
        if let Some(backing) = shape.backing_type() {
            if member.declaring_type() != backing {
                return Err(MetadataError::NavigationOwnerMismatch {
                    navigation: name.to_string(),
                    entity: shape.name().to_string(),
                    declared: member.declaring_type().short_name(),
                });
            }
        }

        let target_type = self.entity_types.get(target).and_then(EntityShape::backing_type);
        if let (Some(element), Some(target_type)) = (member.field_type().element(), target_type) {
            if element != target_type {
                return Err(MetadataError::NavigationElementMismatch {
                    navigation: name.to_string(),
                    entity: shape.name().to_string(),
                    declared: element.short_name(),
                    target: target_type.short_name(),
                });
            }
        }
        Ok(())
    }

    pub fn remove_navigation(&mut self, entity: &str, name: &str) -> ModelResult<Option<Arc<Navigation>>> {
        let removed = self.shape_mut(entity)?.take_navigation(name);
        if let Some(navigation) = &removed {
            if let Some(inverse_name) = navigation.inverse_name() {
                let other_end = self
                    .find_navigation(navigation.target_entity(), &inverse_name)
                    .filter(|other| other.foreign_key() == navigation.foreign_key());
                if let Some(other) = other_end {
                    if other.inverse_name().as_deref() == Some(name) {
                        other.clear_inverse();
                    }
                }
            }
            navigation.clear_inverse();
            debug!("Removed navigation {}", navigation.display_name());
        }
        Ok(removed)
    }

    /// Navigation declared on `entity` or one of its ancestors
    pub fn find_navigation(&self, entity: &str, name: &str) -> Option<&Arc<Navigation>> {
        let mut current = self.entity_types.get(entity);
        while let Some(shape) = current {
            if let Some(navigation) = shape.find_declared_navigation(name) {
                return Some(navigation);
            }
            current = shape.base().and_then(|base| self.entity_types.get(base));
        }
        None
    }

    /// Re-check every foreign key and base type before the model is frozen
    pub fn validate(&self) -> ModelResult<()> {
        for shape in self.entity_types() {
            if let Some(base) = shape.base() {
                if !self.entity_types.contains_key(base) {
                    return Err(MetadataError::BaseTypeNotFound {
                        entity: shape.display_name(),
                        base: base.to_string(),
                    }
                    .into());
                }
            }
            for fk in shape.declared_foreign_keys() {
                self.validate_foreign_key(fk)?;
            }
        }
        Ok(())
    }
}
