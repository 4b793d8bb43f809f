use std::{sync::Arc, time::Duration};

use thiserror::Error;
use wrapp_config::ConfigError;

use crate::types::{DynError, TypeInfo};

/// Everything that can go wrong while a module container runs
///
/// All variants are Clone, so a failure can be logged, sent as an event and returned at the same time.
#[derive(Error, Debug, Clone)]
pub enum ContainerError {
    /// The module descriptor is malformed
    #[error("Invalid module descriptor: {0}")]
    Descriptor(String),
    /// A directive of the module header has an invalid value
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Validation found references to components which do not exist
    #[error(transparent)]
    UnresolvedReferences(#[from] ReferenceErrors),
    /// A reference could not be resolved while creating a component
    #[error(transparent)]
    UnresolvedReference(#[from] UnresolvedReference),
    /// Mandatory dependencies did not show up in time
    #[error("Timed out after {timeout:?} waiting for dependencies {missing:?}")]
    UnsatisfiedDependencyTimeout {
        timeout: Duration,
        missing: Vec<String>,
    },
    /// A lazy module was not activated before its timeout
    #[error("Timed out after {timeout:?} waiting for the module to be activated")]
    ActivationTimeout { timeout: Duration },
    /// Creating a component failed
    #[error("Could not create component '{name}' - error: {error}")]
    ComponentCreation { name: String, error: Arc<DynError> },
    /// The requested component is not known
    #[error("No component named '{0}'")]
    NoSuchComponent(String),
    /// The call is not allowed in the current state or configuration
    #[error("Illegal state: {0}")]
    IllegalState(String),
    /// The host refused an operation
    #[error(transparent)]
    Host(#[from] HostError),
}
impl ContainerError {
    pub(crate) fn creation(name: &str, error: impl Into<DynError>) -> Self {
        ContainerError::ComponentCreation {
            name: name.to_string(),
            error: Arc::new(error.into()),
        }
    }
}

/// A `Ref` or `IdRef` pointing at a component which does not exist
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("'{required_by}' references '{reference}' but it is missing")]
pub struct UnresolvedReference {
    pub reference: String,
    pub required_by: String,
}

/// All unresolved references of one graph
#[derive(Error, Debug, Clone)]
pub struct ReferenceErrors {
    pub errors: Vec<UnresolvedReference>,
}
impl std::fmt::Display for ReferenceErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut display = Vec::new();
        display.push("The component graph had one or more unresolved references:".to_string());
        for error in &self.errors {
            display.push(format!("- {}", error));
        }
        f.write_str(&display.join("\n"))
    }
}

/// Causes wrapped by [`ContainerError::ComponentCreation`]
#[derive(Error, Debug, Clone)]
pub enum CreationError {
    /// The component is already being created further up the call chain
    #[error("Circular reference through {chain:?}")]
    CircularReference { chain: Vec<String> },
    /// A kept instance no longer matches the type its recipe produces
    #[error("Instance is a '{actual}' but the recipe produces '{expected}'")]
    TypeMismatch { expected: TypeInfo, actual: TypeInfo },
    /// A component used in a special role does not implement it
    #[error("Component does not implement the '{role}' role, it is a '{actual}'")]
    RoleMismatch { role: &'static str, actual: &'static str },
    /// A factory argument could not be provided in the requested type
    #[error("Argument '{argument}' is a '{actual}' and cannot be converted into '{requested}'")]
    ArgumentType {
        argument: String,
        requested: &'static str,
        actual: &'static str,
    },
    /// A factory asked for an argument it did not declare
    #[error("Argument '{0}' was not declared")]
    UnknownArgument(String),
}

/// Errors reported by the host module system
#[derive(Error, Debug, Clone)]
pub enum HostError {
    #[error("Publishing {capabilities:?} failed - error: {error}")]
    PublishFailed {
        capabilities: Vec<String>,
        error: Arc<DynError>,
    },
    #[error("Activating the module failed - error: {0}")]
    ActivationFailed(Arc<DynError>),
    #[error("The host has shut down")]
    Closed,
}
