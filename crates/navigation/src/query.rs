//! Entity Queries - Filter expressions handed to the unit of work
//!
//! A navigation never executes anything itself: it describes which rows it
//! stands for with an `EntityQuery` and lets the unit of work run it.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::AnyEntity;

/// Row filter over entity fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Matches every row
    All,
    /// Field equals value; never matches a null or missing field
    Eq { property: String, value: Value },
    /// All inner predicates match
    And(Vec<Predicate>),
}

impl Predicate {
    pub fn field_eq(property: &str, value: impl Into<Value>) -> Self {
        Predicate::Eq {
            property: property.to_string(),
            value: value.into(),
        }
    }

    /// Conjunction that flattens nested `And`s and drops `All`
    pub fn and(self, other: Predicate) -> Self {
        let mut parts = Vec::new();
        for predicate in [self, other] {
            match predicate {
                Predicate::All => {}
                Predicate::And(inner) => parts.extend(inner),
                p => parts.push(p),
            }
        }
        match parts.len() {
            0 => Predicate::All,
            1 => parts.remove(0),
            _ => Predicate::And(parts),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Predicate::All)
    }

    pub fn matches(&self, entity: &dyn AnyEntity) -> bool {
        match self {
            Predicate::All => true,
            Predicate::Eq { property, value } => {
                if value.is_null() {
                    return false;
                }
                entity.field(property).as_ref() == Some(value)
            }
            Predicate::And(parts) => parts.iter().all(|p| p.matches(entity)),
        }
    }

    /// Renders the predicate for logs; values are masked unless `sensitive`
    pub fn describe(&self, sensitive: bool) -> String {
        match self {
            Predicate::All => "true".to_string(),
            Predicate::Eq { property, value } => {
                if sensitive {
                    format!("{} = {}", property, value)
                } else {
                    format!("{} = ?", property)
                }
            }
            Predicate::And(parts) => parts
                .iter()
                .map(|p| p.describe(sensitive))
                .collect::<Vec<_>>()
                .join(" AND "),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe(false))
    }
}

/// Query over the rows of one entity shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityQuery {
    /// Entity shape name
    pub entity: String,
    pub filter: Predicate,
    /// Navigations on the queried entity to load alongside each row
    pub includes: Vec<String>,
}

impl EntityQuery {
    /// Unfiltered query over the whole set
    pub fn all(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            filter: Predicate::All,
            includes: Vec::new(),
        }
    }

    pub fn filtered(entity: &str, filter: Predicate) -> Self {
        Self {
            entity: entity.to_string(),
            filter,
            includes: Vec::new(),
        }
    }

    /// Narrow the query with an additional predicate
    pub fn and(mut self, predicate: Predicate) -> Self {
        let filter = std::mem::replace(&mut self.filter, Predicate::All);
        self.filter = filter.and(predicate);
        self
    }

    pub fn include(mut self, navigation: &str) -> Self {
        if !self.includes.iter().any(|n| n == navigation) {
            self.includes.push(navigation.to_string());
        }
        self
    }

    pub fn matches(&self, entity: &dyn AnyEntity) -> bool {
        entity.entity_type() == self.entity && self.filter.matches(entity)
    }

    pub fn describe(&self, sensitive: bool) -> String {
        let mut out = format!("{} WHERE {}", self.entity, self.filter.describe(sensitive));
        if !self.includes.is_empty() {
            out.push_str(" INCLUDE ");
            out.push_str(&self.includes.join(", "));
        }
        out
    }
}
