//! Model Builder - Fluent registration of shapes and relationships
//!
//! ```ignore
//! let mut builder = ModelBuilder::new(context.clone());
//! builder.entity::<Blog>()?.property("name")?;
//! builder.entity::<Post>()?.property("title")?.property("blog_id")?;
//! builder
//!     .has_many::<Blog, Post>(CollectionMember::<Blog, Queryable<Post>>::new("posts"), "blog_id")?
//!     .with_inverse(ReferenceMember::<Post, Blog>::new("blog"))?;
//! let model = builder.finish()?;
//! ```

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::context::UnitOfWork;
use crate::entity::{Entity, TypeDescriptor};
use crate::error::{MetadataError, ModelResult};
use crate::metadata::{EntityShape, ForeignKey, Model, Navigation};
use crate::relationships::MemberBinding;

pub struct ModelBuilder {
    model: Model,
}

impl ModelBuilder {
    pub fn new(context: Arc<dyn UnitOfWork>) -> Self {
        Self {
            model: Model::new(context),
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    pub fn annotate(&mut self, name: &str, value: Value) -> &mut Self {
        self.model.set_annotation(name, value);
        self
    }

    /// Shape backed by `E`, registered on first use
    pub fn entity<E: Entity>(&mut self) -> ModelResult<EntityTypeBuilder<'_>> {
        let existing = self
            .model
            .find_entity_type(E::entity_name())
            .map(EntityShape::backing_type);
        match existing {
            Some(backing) if backing == Some(TypeDescriptor::of::<E>()) => {}
            Some(_) => return Err(MetadataError::DuplicateEntityType(E::entity_name().to_string()).into()),
            None => {
                self.model.add_entity_type(EntityShape::for_entity::<E>())?;
            }
        }
        Ok(EntityTypeBuilder {
            model: &mut self.model,
            name: E::entity_name().to_string(),
        })
    }

    /// Shape backed by `E` deriving from the shape named `base`
    pub fn derived_entity<E: Entity>(&mut self, base: &str) -> ModelResult<EntityTypeBuilder<'_>> {
        self.model
            .add_entity_type(EntityShape::for_entity::<E>().with_base(base))?;
        Ok(EntityTypeBuilder {
            model: &mut self.model,
            name: E::entity_name().to_string(),
        })
    }

    /// Keyless shape used for reads only
    pub fn query_type(&mut self, name: &str) -> ModelResult<EntityTypeBuilder<'_>> {
        self.model.add_entity_type(EntityShape::query_type(name))?;
        Ok(EntityTypeBuilder {
            model: &mut self.model,
            name: name.to_string(),
        })
    }

    /// Weak shape backed by `E`, owned through `defining_entity.defining_navigation`
    pub fn owned_entity<E: Entity>(
        &mut self,
        defining_entity: &str,
        defining_navigation: &str,
    ) -> ModelResult<&mut Self> {
        let shape = EntityShape::weak(E::entity_name(), defining_entity, defining_navigation)
            .with_backing_type(TypeDescriptor::of::<E>());
        self.model.add_entity_type(shape)?;
        Ok(self)
    }

    /// One-to-many relationship from `P` to `D` over `D.foreign_key`, with the
    /// collection navigation bound by `collection` on `P`
    pub fn has_many<P: Entity, D: Entity>(
        &mut self,
        collection: impl MemberBinding + 'static,
        foreign_key: &str,
    ) -> ModelResult<RelationshipBuilder<'_>> {
        let fk = ForeignKey::new(
            D::entity_name(),
            &[foreign_key],
            P::entity_name(),
            &[P::primary_key_name()],
        )?;
        let fk = self.model.add_foreign_key(fk)?;

        let name = collection.name().to_string();
        let collection: Arc<dyn MemberBinding> = Arc::new(collection);
        let navigation = self
            .model
            .add_navigation(P::entity_name(), &name, &fk, false, Some(collection))?;

        Ok(RelationshipBuilder {
            model: &mut self.model,
            foreign_key: fk,
            principal_navigation: Some(navigation),
        })
    }

    /// Relationship over an explicit foreign key, with navigations added
    /// through the returned builder
    pub fn relationship(&mut self, foreign_key: ForeignKey) -> ModelResult<RelationshipBuilder<'_>> {
        let fk = self.model.add_foreign_key(foreign_key)?;
        Ok(RelationshipBuilder {
            model: &mut self.model,
            foreign_key: fk,
            principal_navigation: None,
        })
    }

    /// Validate and freeze the model
    pub fn finish(self) -> ModelResult<Arc<Model>> {
        self.model.validate()?;
        info!(
            "Built model with {} entity type(s) {}",
            self.model.entity_types().count(),
            self.model.options().log_fragment()
        );
        Ok(Arc::new(self.model))
    }
}

pub struct EntityTypeBuilder<'a> {
    model: &'a mut Model,
    name: String,
}

impl<'a> EntityTypeBuilder<'a> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn property(self, name: &str) -> ModelResult<Self> {
        self.model.add_property(&self.name, name)?;
        Ok(self)
    }

    pub fn service_property(self, name: &str) -> ModelResult<Self> {
        self.model.add_service_property(&self.name, name)?;
        Ok(self)
    }
}

pub struct RelationshipBuilder<'a> {
    model: &'a mut Model,
    foreign_key: Arc<ForeignKey>,
    principal_navigation: Option<Arc<Navigation>>,
}

impl<'a> RelationshipBuilder<'a> {
    pub fn foreign_key(&self) -> &Arc<ForeignKey> {
        &self.foreign_key
    }

    pub fn principal_navigation(&self) -> Option<&Arc<Navigation>> {
        self.principal_navigation.as_ref()
    }

    /// Navigation on the dependent pointing back at the principal
    pub fn with_inverse(self, reference: impl MemberBinding + 'static) -> ModelResult<Self> {
        let name = reference.name().to_string();
        let dependent = self.foreign_key.dependent().to_string();
        self.model
            .add_navigation(&dependent, &name, &self.foreign_key, true, Some(Arc::new(reference)))?;
        Ok(self)
    }

    /// Navigation on the principal over the dependents
    pub fn with_collection(mut self, collection: impl MemberBinding + 'static) -> ModelResult<Self> {
        let name = collection.name().to_string();
        let principal = self.foreign_key.principal().to_string();
        let navigation = self.model.add_navigation(
            &principal,
            &name,
            &self.foreign_key,
            false,
            Some(Arc::new(collection)),
        )?;
        self.principal_navigation = Some(navigation);
        Ok(self)
    }

    /// Navigation with no backing field on either end
    pub fn with_shadow_navigation(self, name: &str, points_to_principal: bool) -> ModelResult<Self> {
        let entity = if points_to_principal {
            self.foreign_key.dependent().to_string()
        } else {
            self.foreign_key.principal().to_string()
        };
        self.model
            .add_navigation(&entity, name, &self.foreign_key, points_to_principal, None)?;
        Ok(self)
    }
}
