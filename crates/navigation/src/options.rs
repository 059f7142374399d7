//! Context Options - Opt-in switches for lazy queryable navigations
//!
//! Options are attached to a unit of work when its model is built. They can be
//! assembled in code with `ContextOptionsBuilder` or loaded from the
//! environment with `ContextOptions::from_env`.

use std::env;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable enabling lazy queryable navigations
pub const LAZY_QUERYABLE_ENV: &str = "ELIF_LAZY_QUERYABLE";

/// Environment variable enabling key values in query logs
pub const SENSITIVE_DATA_LOGGING_ENV: &str = "ELIF_SENSITIVE_DATA_LOGGING";

/// Options for one mapping context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextOptions {
    /// Back query-shaped collection navigations with lazy filtered queries
    pub lazy_queryable: bool,
    /// Render key values in logged predicates instead of `?`
    pub sensitive_data_logging: bool,
}

impl ContextOptions {
    pub fn builder() -> ContextOptionsBuilder {
        ContextOptionsBuilder::new()
    }

    /// Load options from `ELIF_LAZY_QUERYABLE` and `ELIF_SENSITIVE_DATA_LOGGING`.
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut options = Self::default();

        if let Some(value) = read_env(LAZY_QUERYABLE_ENV)? {
            options.lazy_queryable = parse_bool(LAZY_QUERYABLE_ENV, &value)?;
        }

        if let Some(value) = read_env(SENSITIVE_DATA_LOGGING_ENV)? {
            options.sensitive_data_logging = parse_bool(SENSITIVE_DATA_LOGGING_ENV, &value)?;
        }

        Ok(options)
    }

    /// Short description of the active options for diagnostics
    pub fn log_fragment(&self) -> String {
        let mut fragment = String::new();
        if self.lazy_queryable {
            fragment.push_str("using queryable ");
        }
        if self.sensitive_data_logging {
            fragment.push_str("SensitiveDataLoggingEnabled ");
        }
        fragment
    }
}

/// Builder for `ContextOptions`
#[derive(Debug, Clone, Default)]
pub struct ContextOptionsBuilder {
    options: ContextOptions,
}

impl ContextOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable lazy queryable navigations for this context
    pub fn use_lazy_queryable(mut self) -> Self {
        self.options.lazy_queryable = true;
        self
    }

    pub fn enable_sensitive_data_logging(mut self, enabled: bool) -> Self {
        self.options.sensitive_data_logging = enabled;
        self
    }

    pub fn build(self) -> ContextOptions {
        self.options
    }
}

fn read_env(name: &str) -> Result<Option<String>, ConfigError> {
    match env::var(name) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::EnvironmentError {
            message: format!("{} is not valid unicode", name),
        }),
    }
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            expected: "true, false, 1, 0, yes, no, on, or off".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        env::remove_var(LAZY_QUERYABLE_ENV);
        env::remove_var(SENSITIVE_DATA_LOGGING_ENV);
    }

    #[test]
    fn test_builder_enables_lazy_queryable() {
        let options = ContextOptions::builder()
            .use_lazy_queryable()
            .enable_sensitive_data_logging(true)
            .build();

        assert!(options.lazy_queryable);
        assert!(options.sensitive_data_logging);
        assert_eq!(options.log_fragment(), "using queryable SensitiveDataLoggingEnabled ");
    }

    #[test]
    fn test_defaults_are_off() {
        let options = ContextOptions::default();
        assert!(!options.lazy_queryable);
        assert!(!options.sensitive_data_logging);
        assert!(options.log_fragment().is_empty());
    }

    #[test]
    #[serial]
    fn test_from_env_reads_switches() {
        clear_env();
        env::set_var(LAZY_QUERYABLE_ENV, "yes");
        env::set_var(SENSITIVE_DATA_LOGGING_ENV, "0");

        let options = ContextOptions::from_env().unwrap();
        assert!(options.lazy_queryable);
        assert!(!options.sensitive_data_logging);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_without_variables_uses_defaults() {
        clear_env();
        assert_eq!(ContextOptions::from_env().unwrap(), ContextOptions::default());
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_invalid_value() {
        clear_env();
        env::set_var(LAZY_QUERYABLE_ENV, "sometimes");

        match ContextOptions::from_env() {
            Err(ConfigError::InvalidValue { field, value, .. }) => {
                assert_eq!(field, LAZY_QUERYABLE_ENV);
                assert_eq!(value, "sometimes");
            }
            other => panic!("expected invalid value error, got {:?}", other),
        }

        clear_env();
    }
}
