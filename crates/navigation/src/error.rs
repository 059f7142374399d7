//! Error types for the navigation layer
//!
//! Configuration errors surface while the model is being built and abort the
//! build. Accessor construction errors surface on first access to a
//! navigation. Runtime errors come from the proxies and from the unit of work
//! they delegate to.

use thiserror::Error;

/// Result type alias for model and navigation operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Crate-wide error type
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// Model-build configuration error
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// Collection accessor could not be built for a navigation
    #[error(transparent)]
    Navigation(#[from] NavigationError),

    /// Options could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Operation has no meaning on the given navigation collection
    #[error("Operation '{operation}' is not supported on navigation '{navigation}'")]
    NotSupported {
        operation: String,
        navigation: String,
    },

    /// A type-erased value did not have the type the accessor is bound to
    #[error("Type mismatch: expected a value of type '{expected}'")]
    TypeMismatch { expected: String },

    /// Failure reported by the store or the unit of work
    #[error("Store error: {0}")]
    Store(String),

    /// Serialization/deserialization of entity fields failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ModelError {
    pub(crate) fn not_supported(operation: &str, navigation: &str) -> Self {
        ModelError::NotSupported {
            operation: operation.to_string(),
            navigation: navigation.to_string(),
        }
    }

    pub(crate) fn type_mismatch<T: ?Sized>() -> Self {
        ModelError::TypeMismatch {
            expected: std::any::type_name::<T>().to_string(),
        }
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

/// Errors raised while registering shapes, keys and navigations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("The entity type '{0}' cannot be added to the model because an entity type with the same name already exists.")]
    DuplicateEntityType(String),

    #[error("The query type '{0}' cannot be added to the model because a query type with the same name already exists.")]
    DuplicateQueryType(String),

    #[error("Cannot register '{0}' as an entity type because it is already registered as a query type.")]
    CannotAccessQueryAsEntity(String),

    #[error("Cannot register '{0}' as a query type because it is already registered as an entity type.")]
    CannotAccessEntityAsQuery(String),

    #[error("The entity type '{0}' cannot be added to the model because a weak entity type with the same name already exists.")]
    ClashingWeakEntityType(String),

    #[error("The weak entity type '{0}' cannot be added to the model because an entity type with the same name already exists.")]
    ClashingNonWeakEntityType(String),

    #[error("The entity type '{0}' was not found in the model.")]
    EntityTypeNotFound(String),

    #[error("The property or navigation '{member}' cannot be added to the weak entity type '{entity}'; weak entity types only carry the members of their defining navigation.")]
    WeakEntityTypeMember { entity: String, member: String },

    #[error("The base type '{base}' of entity type '{entity}' was not found in the model.")]
    BaseTypeNotFound { entity: String, base: String },

    #[error("Cannot remove entity type '{entity}' because it references '{principal}' by foreign key {properties}.")]
    EntityTypeInUseByForeignKey {
        entity: String,
        principal: String,
        properties: String,
    },

    #[error("Cannot remove entity type '{entity}' because it is referenced by foreign key {properties} from '{dependent}'.")]
    EntityTypeInUseByReferencingForeignKey {
        entity: String,
        properties: String,
        dependent: String,
    },

    #[error("Cannot remove entity type '{entity}' because '{derived}' is derived from it.")]
    EntityTypeInUseByDerived { entity: String, derived: String },

    #[error("The navigation '{navigation}' on '{entity}' cannot be associated with foreign key {foreign_key} because it was created for foreign key {existing}.")]
    ConflictingForeignKey {
        navigation: String,
        entity: String,
        foreign_key: String,
        existing: String,
    },

    #[error("The property or navigation '{name}' cannot be added to '{entity}' because a property or navigation with the same name already exists on '{conflicting_entity}'.")]
    ConflictingName {
        name: String,
        entity: String,
        conflicting_entity: String,
    },

    #[error("The navigation '{navigation}' cannot be added to '{entity}' because foreign key {foreign_key} from '{dependent}' to '{principal}' does not end on that entity type in that direction.")]
    NavigationEntityMismatch {
        navigation: String,
        entity: String,
        foreign_key: String,
        dependent: String,
        principal: String,
    },

    #[error("The navigation '{navigation}' on '{entity}' is declared over element type '{declared}' but targets '{target}'.")]
    NavigationElementMismatch {
        navigation: String,
        entity: String,
        declared: String,
        target: String,
    },

    #[error("The navigation '{navigation}' is bound to a member of '{declared}' but is being added to '{entity}'.")]
    NavigationOwnerMismatch {
        navigation: String,
        entity: String,
        declared: String,
    },

    #[error("Invalid foreign key from '{dependent}' to '{principal}': {reason}")]
    InvalidForeignKey {
        dependent: String,
        principal: String,
        reason: String,
    },
}

/// Errors raised while building a collection accessor for a navigation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigationError {
    #[error("The type of navigation '{navigation}' on '{entity}' is '{field_type}' which does not expose an element type; collection navigations to '{target}' must be enumerable.")]
    BadNavigationType {
        navigation: String,
        entity: String,
        field_type: String,
        target: String,
    },

    #[error("The type of navigation '{navigation}' on '{entity}' is '{field_type}' which is an array type. Collection navigations cannot be arrays.")]
    UnsupportedArrayNavigation {
        navigation: String,
        entity: String,
        field_type: String,
    },

    #[error("The type of navigation '{navigation}' on '{entity}' is '{field_type}' which can neither be instantiated nor backed by a query over '{target}'.")]
    UnsupportedNavigationShape {
        navigation: String,
        entity: String,
        field_type: String,
        target: String,
    },
}

/// Errors raised while loading context options
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Environment variable error: {message}")]
    EnvironmentError { message: String },
}
