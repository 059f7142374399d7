//! Foreign Key Descriptor - The key-based link between two entity shapes

use std::fmt;

use serde::Serialize;

use crate::error::MetadataError;

/// Relationship between a dependent shape and its principal shape.
///
/// Immutable once constructed. `properties` and `principal_key` are
/// guaranteed non-empty and of equal length.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ForeignKey {
    dependent: String,
    properties: Vec<String>,
    principal: String,
    principal_key: Vec<String>,
    is_unique: bool,
}

impl ForeignKey {
    pub fn new(
        dependent: &str,
        properties: &[&str],
        principal: &str,
        principal_key: &[&str],
    ) -> Result<Self, MetadataError> {
        let invalid = |reason: &str| MetadataError::InvalidForeignKey {
            dependent: dependent.to_string(),
            principal: principal.to_string(),
            reason: reason.to_string(),
        };

        if properties.is_empty() {
            return Err(invalid("no foreign key properties were given"));
        }
        if principal_key.is_empty() {
            return Err(invalid("the principal key is empty"));
        }
        if properties.len() != principal_key.len() {
            return Err(invalid(&format!(
                "{} foreign key properties cannot reference a principal key of {} properties",
                properties.len(),
                principal_key.len()
            )));
        }

        Ok(Self {
            dependent: dependent.to_string(),
            properties: properties.iter().map(|p| p.to_string()).collect(),
            principal: principal.to_string(),
            principal_key: principal_key.iter().map(|p| p.to_string()).collect(),
            is_unique: false,
        })
    }

    /// Mark the relationship as one-to-one
    pub fn unique(mut self, is_unique: bool) -> Self {
        self.is_unique = is_unique;
        self
    }

    /// Shape declaring the foreign key properties
    pub fn dependent(&self) -> &str {
        &self.dependent
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    pub fn principal_key(&self) -> &[String] {
        &self.principal_key
    }

    pub fn is_unique(&self) -> bool {
        self.is_unique
    }

    pub fn is_composite(&self) -> bool {
        self.properties.len() > 1
    }

    pub fn is_self_referencing(&self) -> bool {
        self.dependent == self.principal
    }

    /// First dependent column; the only one used to filter lazy collections
    pub fn first_property(&self) -> &str {
        &self.properties[0]
    }

    pub fn first_principal_key(&self) -> &str {
        &self.principal_key[0]
    }

    /// `{'a', 'b'}` rendering used in error messages
    pub fn format_properties(&self) -> String {
        format_names(&self.properties)
    }

    pub fn format_principal_key(&self) -> String {
        format_names(&self.principal_key)
    }
}

pub(crate) fn format_names(names: &[String]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("'{}'", n)).collect();
    format!("{{{}}}", quoted.join(", "))
}

impl fmt::Display for ForeignKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} {}",
            self.dependent,
            self.format_properties(),
            self.principal,
            self.format_principal_key()
        )
    }
}
