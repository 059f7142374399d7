//! Entity Trait - Host types persisted through the unit of work
//!
//! Entities expose their fields as `serde_json::Value`s, which is how key
//! values flow into navigation predicates and how the in-memory store
//! evaluates them. `AnyEntity` is the object-safe erasure that crosses the
//! unit-of-work seam.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::hash::{Hash, Hasher};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ModelError, ModelResult};

/// Runtime identity of a Rust type, used where reflection would be needed
#[derive(Clone, Copy)]
pub struct TypeDescriptor {
    id: TypeId,
    name: &'static str,
}

impl TypeDescriptor {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name with module paths stripped, for error messages
    pub fn short_name(&self) -> String {
        short_type_name(self.name)
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeDescriptor {}

impl Hash for TypeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_name())
    }
}

/// Strips module paths from every segment of a type name
/// (`alloc::vec::Vec<app::Post>` becomes `Vec<Post>`).
pub(crate) fn short_type_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut segment = String::new();
    for ch in name.chars() {
        match ch {
            '<' | '>' | ',' | ' ' | '[' | ']' | ';' | '&' | '(' | ')' => {
                out.push_str(segment.rsplit("::").next().unwrap_or(""));
                segment.clear();
                out.push(ch);
            }
            _ => segment.push(ch),
        }
    }
    out.push_str(segment.rsplit("::").next().unwrap_or(""));
    out
}

/// Core trait for persisted entity types
pub trait Entity: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {
    /// Name of the entity shape this type backs
    fn entity_name() -> &'static str;

    /// Primary key field name
    fn primary_key_name() -> &'static str {
        "id"
    }

    /// Field-value pairs of this instance
    fn to_fields(&self) -> HashMap<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            _ => HashMap::new(),
        }
    }

    /// Value of one field, `None` when the field does not exist
    fn field_value(&self, name: &str) -> Option<Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => map.remove(name),
            _ => None,
        }
    }

    /// Primary key value, `None` when unset
    fn primary_key(&self) -> Option<Value> {
        self.field_value(Self::primary_key_name())
            .filter(|value| !value.is_null())
    }

    /// Returns a copy of this instance with one field replaced
    fn with_field(&self, name: &str, value: Value) -> ModelResult<Self> {
        let mut map = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            other => {
                return Err(ModelError::Serialization(format!(
                    "entity '{}' serialized to {} instead of an object",
                    Self::entity_name(),
                    other
                )))
            }
        };
        map.insert(name.to_string(), value);
        Ok(serde_json::from_value(Value::Object(map))?)
    }
}

/// Object-safe view of an entity
pub trait AnyEntity: Any + Debug + Send + Sync {
    /// Name of the entity shape
    fn entity_type(&self) -> &'static str;

    /// Backing Rust type
    fn type_descriptor(&self) -> TypeDescriptor;

    fn field(&self, name: &str) -> Option<Value>;

    /// Every field-value pair, used to detect modified rows
    fn fields(&self) -> HashMap<String, Value>;

    fn key(&self) -> Option<Value>;

    fn clone_entity(&self) -> Box<dyn AnyEntity>;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<E: Entity> AnyEntity for E {
    fn entity_type(&self) -> &'static str {
        E::entity_name()
    }

    fn type_descriptor(&self) -> TypeDescriptor {
        TypeDescriptor::of::<E>()
    }

    fn field(&self, name: &str) -> Option<Value> {
        self.field_value(name)
    }

    fn fields(&self) -> HashMap<String, Value> {
        self.to_fields()
    }

    fn key(&self) -> Option<Value> {
        self.primary_key()
    }

    fn clone_entity(&self) -> Box<dyn AnyEntity> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Recovers a typed entity from its erased form
pub fn downcast_entity<T: Entity>(entity: Box<dyn AnyEntity>) -> ModelResult<T> {
    entity
        .into_any()
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| ModelError::type_mismatch::<T>())
}
