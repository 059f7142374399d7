//! Model Metadata - Shapes, foreign keys and navigations
//!
//! Metadata is built once per unit of work and is read-only afterwards.
//! Navigations are the only part with runtime state: their lazily built
//! collection accessor.

pub mod builder;
pub mod entity_type;
pub mod foreign_key;
pub mod model;
pub mod navigation;
pub mod source;

pub use builder::{EntityTypeBuilder, ModelBuilder, RelationshipBuilder};
pub use entity_type::{EntityShape, Property, ShapeKind};
pub use foreign_key::ForeignKey;
pub use model::{Model, PRODUCT_VERSION_ANNOTATION};
pub use navigation::Navigation;
pub use source::ModelSource;

#[cfg(test)]
mod model_tests;
