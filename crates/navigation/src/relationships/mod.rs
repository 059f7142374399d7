//! Relationships Module - Collection accessors and lazy navigation collections

pub mod field;
pub mod member;
pub mod accessor;
pub mod factory;
pub mod queryable;



// Re-export main types
pub use field::*;
pub use member::*;
pub use accessor::{AccessorStrategy, CollectionAccessor, MaterializedCollectionAccessor};
pub use factory::*;
pub use queryable::*;
