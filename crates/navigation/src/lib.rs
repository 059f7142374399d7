//! # elif-navigation: Lazy navigation collections for elif.rs
//!
//! One-to-many navigations backed by filtered queries instead of
//! materialized collections. Reading a navigation returns a proxy that runs
//! its query through the unit of work on every enumeration; adding to or
//! removing from it registers pending changes with the unit of work.
//!
//! The crate provides the model metadata (shapes, foreign keys,
//! navigations), the collection accessor factory that picks between
//! materialized and lazy collections, the lazy proxy itself, and an
//! in-memory unit of work.

pub mod error;
pub mod options;
pub mod entity;
pub mod query;
pub mod context;
pub mod metadata;
pub mod relationships;

#[cfg(test)]
mod fixtures;

// Re-export core traits and types
pub use error::*;
pub use options::*;
pub use entity::{downcast_entity, AnyEntity, Entity, TypeDescriptor};
pub use query::*;
pub use context::*;
pub use metadata::*;
pub use relationships::*;
