//! Model integrity tests: shape registration, removal preconditions and
//! navigation conflicts

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::entity::Entity;
use crate::error::{MetadataError, ModelError};
use crate::fixtures::{blog, blog_model, context, register_shapes, Author, Blog, Post};
use crate::metadata::{EntityShape, ForeignKey, ModelBuilder, ModelSource, PRODUCT_VERSION_ANNOTATION};
use crate::relationships::{
    CollectionMember, Queryable, QueryableCollectionAccessor, QuerySource, ReferenceMember,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FeaturedBlog {
    id: i64,
    name: String,
    banner: String,
}

impl Entity for FeaturedBlog {
    fn entity_name() -> &'static str {
        "FeaturedBlog"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Address {
    id: i64,
    city: String,
}

impl Entity for Address {
    fn entity_name() -> &'static str {
        "Address"
    }
}

fn metadata_error(err: ModelError) -> MetadataError {
    match err {
        ModelError::Metadata(err) => err,
        other => panic!("expected metadata error, got {:?}", other),
    }
}

#[test]
fn test_duplicate_and_clashing_shapes() {
    let mut builder = ModelBuilder::new(context(false));
    register_shapes(&mut builder).unwrap();
    let model = builder.model_mut();

    let err = model.add_entity_type(EntityShape::new("Blog")).unwrap_err();
    assert_eq!(metadata_error(err), MetadataError::DuplicateEntityType("Blog".to_string()));

    let err = model.add_entity_type(EntityShape::query_type("Blog")).unwrap_err();
    assert_eq!(metadata_error(err), MetadataError::CannotAccessEntityAsQuery("Blog".to_string()));

    model.add_entity_type(EntityShape::query_type("BlogStats")).unwrap();
    let err = model.add_entity_type(EntityShape::query_type("BlogStats")).unwrap_err();
    assert_eq!(metadata_error(err), MetadataError::DuplicateQueryType("BlogStats".to_string()));

    let err = model.add_entity_type(EntityShape::new("BlogStats")).unwrap_err();
    assert_eq!(metadata_error(err), MetadataError::CannotAccessQueryAsEntity("BlogStats".to_string()));
}

#[test]
fn test_entity_builder_is_idempotent_for_same_type() {
    let mut builder = ModelBuilder::new(context(false));
    register_shapes(&mut builder).unwrap();

    // Second registration of the same type keeps the existing shape
    builder.entity::<Blog>().unwrap();
    assert_eq!(builder.model().entity_types().count(), 3);
    assert!(builder.model().find_entity_type("Blog").unwrap().find_property("name").is_some());
}

#[test]
fn test_weak_shapes_are_grouped_by_defining_path() {
    let mut builder = ModelBuilder::new(context(false));
    register_shapes(&mut builder).unwrap();
    builder
        .owned_entity::<Address>("Author", "home")
        .unwrap()
        .owned_entity::<Address>("Author", "office")
        .unwrap();

    let model = builder.model_mut();
    assert!(model.has_entity_type_with_defining_navigation("Address"));
    assert_eq!(model.entity_types_named("Address").len(), 2);
    assert!(model.find_weak_entity_type("Address", "Author", "office").is_some());

    let err = model.add_entity_type(EntityShape::weak("Address", "Author", "home")).unwrap_err();
    assert!(matches!(metadata_error(err), MetadataError::DuplicateEntityType(_)));

    let err = model.add_entity_type(EntityShape::new("Address")).unwrap_err();
    assert_eq!(metadata_error(err), MetadataError::ClashingWeakEntityType("Address".to_string()));

    let err = model.add_entity_type(EntityShape::weak("Blog", "Author", "blog")).unwrap_err();
    assert!(matches!(metadata_error(err), MetadataError::ClashingNonWeakEntityType(_)));

    // Non-weak shapes come first, then weak shapes in defining-path order
    let order: Vec<String> = model.entity_types().map(|s| s.display_name()).collect();
    assert_eq!(
        order,
        vec!["Author", "Blog", "Post", "Author.home#Address", "Author.office#Address"]
    );

    model.remove_weak_entity_type("Address", "Author", "home").unwrap().unwrap();
    model.remove_weak_entity_type("Address", "Author", "office").unwrap().unwrap();
    assert!(!model.has_entity_type_with_defining_navigation("Address"));
}

#[test]
fn test_weak_shapes_reject_members() {
    let mut builder = ModelBuilder::new(context(false));
    register_shapes(&mut builder).unwrap();
    builder.owned_entity::<Address>("Author", "home").unwrap();

    let model = builder.model_mut();
    let err = model.add_property("Address", "city").unwrap_err();
    assert_eq!(
        metadata_error(err),
        MetadataError::WeakEntityTypeMember {
            entity: "Address".to_string(),
            member: "city".to_string(),
        }
    );
    assert!(matches!(
        model.add_service_property("Address", "geocoder").map_err(metadata_error),
        Err(MetadataError::WeakEntityTypeMember { .. })
    ));

    let err = model.add_property("Missing", "city").unwrap_err();
    assert_eq!(metadata_error(err), MetadataError::EntityTypeNotFound("Missing".to_string()));
}

#[test]
fn test_removal_preconditions() {
    let mut builder = ModelBuilder::new(context(true));
    register_shapes(&mut builder).unwrap();
    builder
        .has_many::<Blog, Post>(CollectionMember::<Blog, Queryable<Post>>::new("posts"), "blog_id")
        .unwrap();
    builder.derived_entity::<FeaturedBlog>("Blog").unwrap();
    let model = builder.model_mut();

    match metadata_error(model.remove_entity_type("Post").unwrap_err()) {
        MetadataError::EntityTypeInUseByForeignKey { entity, principal, properties } => {
            assert_eq!(entity, "Post");
            assert_eq!(principal, "Blog");
            assert_eq!(properties, "{'blog_id'}");
        }
        other => panic!("unexpected error {:?}", other),
    }

    match metadata_error(model.remove_entity_type("Blog").unwrap_err()) {
        MetadataError::EntityTypeInUseByReferencingForeignKey { dependent, .. } => {
            assert_eq!(dependent, "Post")
        }
        other => panic!("unexpected error {:?}", other),
    }

    // Author is unreferenced and has no derived shapes
    assert!(model.remove_entity_type("Author").unwrap().is_some());
    assert!(model.remove_entity_type("Author").unwrap().is_none());
}

#[test]
fn test_shape_with_derived_types_cannot_be_removed() {
    let mut builder = ModelBuilder::new(context(false));
    register_shapes(&mut builder).unwrap();
    builder.derived_entity::<FeaturedBlog>("Author").unwrap();

    let err = builder.model_mut().remove_entity_type("Author").unwrap_err();
    assert_eq!(
        metadata_error(err),
        MetadataError::EntityTypeInUseByDerived {
            entity: "Author".to_string(),
            derived: "FeaturedBlog".to_string(),
        }
    );

    let err = builder.derived_entity::<Address>("Missing").err().unwrap();
    assert!(matches!(metadata_error(err), MetadataError::BaseTypeNotFound { .. }));
}

#[test]
fn test_self_referencing_key_blocks_removal_as_referencing() {
    let mut builder = ModelBuilder::new(context(false));
    builder.entity::<Author>().unwrap().property("mentor_id").unwrap();
    builder
        .relationship(ForeignKey::new("Author", &["mentor_id"], "Author", &["id"]).unwrap())
        .unwrap();

    let err = builder.model_mut().remove_entity_type("Author").unwrap_err();
    assert!(matches!(
        metadata_error(err),
        MetadataError::EntityTypeInUseByReferencingForeignKey { .. }
    ));
}

#[test]
fn test_same_navigation_name_with_other_key_conflicts() {
    let mut builder = ModelBuilder::new(context(true));
    register_shapes(&mut builder).unwrap();
    builder
        .has_many::<Blog, Post>(CollectionMember::<Blog, Queryable<Post>>::new("posts"), "blog_id")
        .unwrap();

    let err = builder
        .has_many::<Blog, Post>(CollectionMember::<Blog, Queryable<Post>>::new("posts"), "author_id")
        .err()
        .unwrap();
    match metadata_error(err) {
        MetadataError::ConflictingForeignKey { navigation, entity, foreign_key, existing } => {
            assert_eq!(navigation, "posts");
            assert_eq!(entity, "Blog");
            assert_eq!(foreign_key, "{'author_id'}");
            assert_eq!(existing, "{'blog_id'}");
        }
        other => panic!("unexpected error {:?}", other),
    }

    // Same name over the same key is a plain name conflict
    let err = builder
        .has_many::<Blog, Post>(CollectionMember::<Blog, Queryable<Post>>::new("posts"), "blog_id")
        .err()
        .unwrap();
    assert!(matches!(metadata_error(err), MetadataError::ConflictingName { .. }));
}

#[test]
fn test_navigation_name_conflicts_with_property_in_hierarchy() {
    let mut builder = ModelBuilder::new(context(true));
    register_shapes(&mut builder).unwrap();
    builder.derived_entity::<FeaturedBlog>("Blog").unwrap().property("banner").unwrap();

    let err = builder
        .has_many::<Blog, Post>(CollectionMember::<Blog, Queryable<Post>>::new("name"), "blog_id")
        .err()
        .unwrap();
    assert_eq!(
        metadata_error(err),
        MetadataError::ConflictingName {
            name: "name".to_string(),
            entity: "Blog".to_string(),
            conflicting_entity: "Blog".to_string(),
        }
    );

    // Declared on a derived shape
    let err = builder
        .has_many::<Blog, Post>(CollectionMember::<Blog, Queryable<Post>>::new("banner"), "blog_id")
        .err()
        .unwrap();
    match metadata_error(err) {
        MetadataError::ConflictingName { conflicting_entity, .. } => {
            assert_eq!(conflicting_entity, "FeaturedBlog")
        }
        other => panic!("unexpected error {:?}", other),
    }

    // And the other way around: a property named like an inherited navigation
    builder
        .has_many::<Blog, Post>(CollectionMember::<Blog, Queryable<Post>>::new("posts"), "blog_id")
        .unwrap();
    let err = builder.model_mut().add_service_property("FeaturedBlog", "posts").unwrap_err();
    assert!(matches!(metadata_error(err), MetadataError::ConflictingName { .. }));
}

#[test]
fn test_navigation_must_start_at_the_right_end() {
    let mut builder = ModelBuilder::new(context(true));
    register_shapes(&mut builder).unwrap();
    let fk = builder
        .model_mut()
        .add_foreign_key(ForeignKey::new("Post", &["blog_id"], "Blog", &["id"]).unwrap())
        .unwrap();

    let err = builder
        .model_mut()
        .add_navigation("Post", "posts", &fk, false, None)
        .unwrap_err();
    assert!(matches!(metadata_error(err), MetadataError::NavigationEntityMismatch { .. }));
}

#[test]
fn test_member_types_must_match_shapes() {
    let mut builder = ModelBuilder::new(context(true));
    register_shapes(&mut builder).unwrap();

    let err = builder
        .has_many::<Blog, Post>(CollectionMember::<Blog, Queryable<Author>>::new("posts"), "blog_id")
        .err()
        .unwrap();
    assert!(matches!(metadata_error(err), MetadataError::NavigationElementMismatch { .. }));

    let err = builder
        .has_many::<Blog, Post>(CollectionMember::<Author, Queryable<Post>>::new("posts"), "blog_id")
        .err()
        .unwrap();
    assert!(matches!(metadata_error(err), MetadataError::NavigationOwnerMismatch { .. }));
}

#[test]
fn test_foreign_key_properties_must_exist() {
    let mut builder = ModelBuilder::new(context(true));
    register_shapes(&mut builder).unwrap();

    let err = builder
        .has_many::<Blog, Post>(CollectionMember::<Blog, Queryable<Post>>::new("posts"), "owner_id")
        .err()
        .unwrap();
    match metadata_error(err) {
        MetadataError::InvalidForeignKey { reason, .. } => assert!(reason.contains("'owner_id'")),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_inverse_navigations_are_linked() {
    let model = blog_model(context(true)).unwrap();

    let posts = model.find_navigation("Blog", "posts").unwrap();
    let blog = model.find_navigation("Post", "blog").unwrap();
    assert_eq!(posts.inverse_name().as_deref(), Some("blog"));
    assert_eq!(blog.inverse_name().as_deref(), Some("posts"));
    assert!(Arc::ptr_eq(posts.foreign_key(), blog.foreign_key()));

    let names: Vec<&str> = model
        .find_entity_type("Blog")
        .unwrap()
        .declared_navigations()
        .map(|n| n.name())
        .collect();
    assert_eq!(names, vec!["posts"]);
}

#[test]
fn test_remove_navigation() {
    let mut builder = ModelBuilder::new(context(true));
    register_shapes(&mut builder).unwrap();
    builder
        .has_many::<Blog, Post>(CollectionMember::<Blog, Queryable<Post>>::new("posts"), "blog_id")
        .unwrap()
        .with_inverse(ReferenceMember::<Post, Blog>::new("blog"))
        .unwrap();

    let model = builder.model_mut();
    assert!(model.remove_navigation("Blog", "posts").unwrap().is_some());
    assert!(model.remove_navigation("Blog", "posts").unwrap().is_none());
    assert!(model.find_entity_type("Blog").unwrap().find_declared_navigation("posts").is_none());
    assert!(matches!(
        model.remove_navigation("Missing", "posts"),
        Err(ModelError::Metadata(MetadataError::EntityTypeNotFound(_)))
    ));
}

#[test]
fn test_removing_a_navigation_unlinks_its_inverse() {
    let mut builder = ModelBuilder::new(context(true));
    register_shapes(&mut builder).unwrap();
    builder
        .has_many::<Blog, Post>(CollectionMember::<Blog, Queryable<Post>>::new("posts"), "blog_id")
        .unwrap()
        .with_inverse(ReferenceMember::<Post, Blog>::new("blog"))
        .unwrap();

    let posts = builder.model_mut().find_navigation("Blog", "posts").unwrap().clone();
    let accessor = posts
        .accessor_as::<QueryableCollectionAccessor<Blog, Post>>()
        .unwrap();
    assert_eq!(accessor.get(&blog(1)).query().includes, vec!["blog".to_string()]);

    let removed = builder.model_mut().remove_navigation("Post", "blog").unwrap().unwrap();
    assert!(removed.inverse_name().is_none());
    assert!(posts.inverse_name().is_none());

    // the accessor was built before the removal and must not include it
    assert!(accessor.get(&blog(1)).query().includes.is_empty());
}

#[test]
fn test_model_source_caches_per_unit_of_work() {
    let source = ModelSource::new();
    let first_context = context(true);
    let first: Arc<dyn crate::context::UnitOfWork> = first_context;
    let second: Arc<dyn crate::context::UnitOfWork> = context(true);

    let mut builds = 0;
    let a = source
        .get_model(&first, |builder| {
            builds += 1;
            register_shapes(builder)
        })
        .unwrap();
    let b = source
        .get_model(&first, |builder| {
            builds += 1;
            register_shapes(builder)
        })
        .unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(builds, 1);

    let c = source.get_model(&second, register_shapes).unwrap();
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(source.len(), 2);
    assert_eq!(
        a.annotation(PRODUCT_VERSION_ANNOTATION),
        Some(&json!(env!("CARGO_PKG_VERSION")))
    );

    assert!(source.evict(&first.id()).is_some());
    assert_eq!(source.len(), 1);
}

#[test]
fn test_dropped_models_release_their_unit_of_work() {
    let source = ModelSource::new();
    let kept: Arc<dyn crate::context::UnitOfWork> = context(true);
    let kept_model = source.get_model(&kept, register_shapes).unwrap();

    let finished = context(true);
    let released = Arc::downgrade(&finished);
    let finished: Arc<dyn crate::context::UnitOfWork> = finished;
    let model = source.get_model(&finished, register_shapes).unwrap();
    assert_eq!(source.len(), 2);

    drop(model);
    drop(finished);
    assert!(released.upgrade().is_none());
    assert_eq!(source.len(), 1);

    // the next request reuses the live entry
    let again = source.get_model(&kept, register_shapes).unwrap();
    assert!(Arc::ptr_eq(&kept_model, &again));
    assert_eq!(source.len(), 1);
}

#[test]
fn test_model_is_rebuilt_after_its_last_holder_drops_it() {
    let source = ModelSource::new();
    let ctx: Arc<dyn crate::context::UnitOfWork> = context(true);

    let mut builds = 0;
    let first = source
        .get_model(&ctx, |builder| {
            builds += 1;
            register_shapes(builder)
        })
        .unwrap();
    drop(first);
    assert!(source.is_empty());
    assert!(source.evict(&ctx.id()).is_none());

    let second = source
        .get_model(&ctx, |builder| {
            builds += 1;
            register_shapes(builder)
        })
        .unwrap();
    assert_eq!(builds, 2);
    assert!(source.evict(&ctx.id()).is_some());
    assert!(source.is_empty());
    drop(second);
}

#[test]
fn test_failed_build_is_not_cached() {
    let source = ModelSource::new();
    let ctx: Arc<dyn crate::context::UnitOfWork> = context(true);

    let result = source.get_model(&ctx, |builder| {
        register_shapes(builder)?;
        builder.entity::<Blog>()?.property("name")?;
        Ok(())
    });
    assert!(result.is_err());
    assert!(source.is_empty());
}
