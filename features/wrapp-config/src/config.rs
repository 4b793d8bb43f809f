use std::time::Duration;

use crate::{
    directives::{parse_header, PathElement},
    errors::ConfigError,
};

/// Directive holding the dependency wait timeout in milliseconds
pub const TIMEOUT_DIRECTIVE: &str = "timeout-milliseconds";
/// Directive switching the wait for mandatory dependencies on or off
pub const WAIT_FOR_DEPENDENCIES_DIRECTIVE: &str = "wait-for-dependencies";

/// Default dependency wait timeout: five minutes
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(300_000);

/// Container settings taken from the directives of a module's symbolic name
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use wrapp_config::config::ContainerConfig;
///
/// let config = ContainerConfig::from_header(
///     "com.acme.orders; timeout-milliseconds:=5000; wait-for-dependencies:=false",
/// )
/// .unwrap();
///
/// assert_eq!(config.symbolic_name, "com.acme.orders");
/// assert_eq!(config.timeout, Duration::from_millis(5000));
/// assert!(!config.wait_for_dependencies);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerConfig {
    pub symbolic_name: String,
    /// How long the module may wait for its dependencies before it fails
    pub timeout: Duration,
    /// If false the module is created without waiting for mandatory references
    pub wait_for_dependencies: bool,
}

impl ContainerConfig {
    /// Defaults for a module with the given name
    pub fn new(symbolic_name: impl Into<String>) -> Self {
        Self {
            symbolic_name: symbolic_name.into(),
            timeout: DEFAULT_TIMEOUT,
            wait_for_dependencies: true,
        }
    }

    /// Parses the symbolic name header and applies the directives of its first clause
    pub fn from_header(header: &str) -> Result<Self, ConfigError> {
        let elements = parse_header(header)?;
        // parse_header never returns an empty list
        let Some(first) = elements.first() else {
            return Ok(Self::new(header.trim()));
        };
        Self::from_element(first)
    }

    pub fn from_element(element: &PathElement) -> Result<Self, ConfigError> {
        let mut config = Self::new(element.name.clone());

        if let Some(value) = element.directive(TIMEOUT_DIRECTIVE) {
            tracing::debug!(module = %config.symbolic_name, value, "Timeout directive");
            let millis = value
                .trim()
                .parse::<u64>()
                .map_err(|_| invalid(TIMEOUT_DIRECTIVE, value))?;
            config.timeout = Duration::from_millis(millis);
        }

        if let Some(value) = element.directive(WAIT_FOR_DEPENDENCIES_DIRECTIVE) {
            tracing::debug!(module = %config.symbolic_name, value, "Wait-for-dependencies directive");
            config.wait_for_dependencies = parse_bool(value)
                .ok_or_else(|| invalid(WAIT_FOR_DEPENDENCIES_DIRECTIVE, value))?;
        }

        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_wait_for_dependencies(mut self, wait: bool) -> Self {
        self.wait_for_dependencies = wait;
        self
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        v if v.eq_ignore_ascii_case("true") => Some(true),
        v if v.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

fn invalid(directive: &str, value: &str) -> ConfigError {
    ConfigError::InvalidDirective {
        directive: directive.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_directives() {
        let config = ContainerConfig::from_header("com.acme.orders;version=2").unwrap();

        assert_eq!(config, ContainerConfig::new("com.acme.orders"));
        assert_eq!(config.timeout, Duration::from_secs(300));
        assert!(config.wait_for_dependencies);
    }

    #[test]
    fn boolean_directive_ignores_case() {
        let config = ContainerConfig::from_header("m; wait-for-dependencies:=FALSE").unwrap();
        assert!(!config.wait_for_dependencies);
    }

    #[test]
    fn invalid_values_are_reported() {
        let err = ContainerConfig::from_header("m; timeout-milliseconds:=soon").unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidDirective {
                directive: TIMEOUT_DIRECTIVE.to_string(),
                value: "soon".to_string(),
            }
        );

        assert!(ContainerConfig::from_header("m; wait-for-dependencies:=maybe").is_err());
    }

    #[test]
    fn only_the_first_clause_counts() {
        let config =
            ContainerConfig::from_header("first, second; timeout-milliseconds:=10").unwrap();
        assert_eq!(config.symbolic_name, "first");
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }
}
