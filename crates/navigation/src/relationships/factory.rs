//! Collection Accessor Factory - Chooses and binds the accessor for a
//! collection navigation

use std::sync::Arc;

use tracing::debug;

use crate::error::{ModelResult, NavigationError};
use crate::metadata::Navigation;
use crate::relationships::accessor::CollectionAccessor;
use crate::relationships::member::MemberBinding;

/// Builds collection accessors from a navigation and its member binding.
///
/// Resolution order:
/// 1. an accessor supplied with the binding is returned unchanged
/// 2. the field type must expose an element type and must not be an array
/// 3. writable fields of an instantiable type get a materialized accessor
/// 4. query-shaped fields get a lazy accessor when the context opted in
///
/// Anything else fails with `UnsupportedNavigationShape`. No I/O happens
/// here; the lazy accessor only queries when its collections are enumerated.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionAccessorFactory;

impl CollectionAccessorFactory {
    pub fn new() -> Self {
        Self
    }

    pub fn create(
        &self,
        navigation: &Navigation,
        member: &dyn MemberBinding,
    ) -> ModelResult<Arc<dyn CollectionAccessor>> {
        if let Some(accessor) = member.prebuilt_accessor() {
            return Ok(accessor);
        }

        let field_type = member.field_type();
        let shape = field_type.shape();

        let Some(element) = field_type.element() else {
            return Err(NavigationError::BadNavigationType {
                navigation: navigation.name().to_string(),
                entity: navigation.declaring_entity().to_string(),
                field_type: field_type.short_name(),
                target: navigation.target_entity().to_string(),
            }
            .into());
        };

        if shape.is_array() {
            return Err(NavigationError::UnsupportedArrayNavigation {
                navigation: navigation.name().to_string(),
                entity: navigation.declaring_entity().to_string(),
                field_type: field_type.short_name(),
            }
            .into());
        }

        if member.has_setter() && shape.is_instantiable() {
            if let Some(accessor) = member.bind_materialized(navigation) {
                debug!(
                    "Bound materialized {} accessor for {} over {}",
                    field_type,
                    navigation.display_name(),
                    element
                );
                return Ok(accessor);
            }
        }

        if shape.is_query_shaped() && navigation.options().lazy_queryable {
            if let Some(accessor) = member.bind_queryable(navigation) {
                debug!(
                    "Bound queryable accessor for {} over {}",
                    navigation.display_name(),
                    element
                );
                return Ok(accessor);
            }
        }

        Err(NavigationError::UnsupportedNavigationShape {
            navigation: navigation.name().to_string(),
            entity: navigation.declaring_entity().to_string(),
            field_type: field_type.short_name(),
            target: navigation.target_entity().to_string(),
        }
        .into())
    }
}
