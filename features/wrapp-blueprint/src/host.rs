//! Boundary to the world around a module container
//!
//! The container never talks to a module system directly. Everything it needs from the outside,
//! descriptor parsing, namespace handlers, event delivery and the host's publication facility,
//! is expressed as a trait here and injected when the container is built.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use crate::{
    context::ModuleContext,
    errors::{ContainerError, HostError},
    exposer::TriggerProxy,
    registry::ComponentDefinitionRegistry,
    types::{DynError, Instance},
};

/// Handle to something registered with a collaborator
///
/// `unregister` must be idempotent.
pub trait Registration: Send + Sync {
    fn unregister(&self);
}

/// Parses module descriptors
pub trait MetadataParser: Send + Sync {
    fn parse(&self, sources: &[String]) -> Result<Box<dyn ParsedDescriptor>, ContainerError>;
}

/// A parsed descriptor, ready to fill a registry once all its namespace handlers are present
pub trait ParsedDescriptor: Send + Sync {
    /// Custom namespaces used by the descriptor
    fn namespaces(&self) -> BTreeSet<String>;

    fn populate(
        &self,
        handlers: &dyn NamespaceHandlerDirectory,
        registry: &mut ComponentDefinitionRegistry,
    ) -> Result<(), ContainerError>;
}

/// Turns elements of a custom namespace into component definitions
pub trait NamespaceHandler: Send + Sync {
    fn namespace(&self) -> &str;

    fn parse(&self, element: &str, registry: &mut ComponentDefinitionRegistry) -> Result<(), DynError>;
}

/// Told when handlers come and go
pub trait NamespaceListener: Send + Sync {
    fn handler_registered(&self, namespace: &str);

    fn handler_unregistered(&self, namespace: &str);
}

pub trait NamespaceHandlerDirectory: Send + Sync {
    fn handler(&self, namespace: &str) -> Option<Arc<dyn NamespaceHandler>>;

    /// Adds a listener, unregistering the returned handle removes it again
    fn add_listener(&self, listener: Arc<dyn NamespaceListener>) -> Box<dyn Registration>;
}

/// Lifecycle notifications
///
/// Implementations must not block, they are called while the module is being driven.
pub trait EventSender: Send + Sync {
    fn send_creating(&self, module: &str);
    fn send_waiting(&self, module: &str, missing: &[String]);
    fn send_failure(&self, module: &str, cause: &ContainerError);
    fn send_created(&self, module: &str);
    fn send_destroying(&self, module: &str);
    fn send_destroyed(&self, module: &str);
}

/// What a publication puts into the host
#[derive(Clone)]
pub enum Published {
    /// A created component
    Instance(Instance),
    /// A stand in for a component which is not created yet
    Trigger(Arc<TriggerProxy>),
    /// The module's own context
    Context(ModuleContext),
}
impl std::fmt::Debug for Published {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Published::Instance(instance) => f.debug_tuple("Instance").field(instance).finish(),
            Published::Trigger(trigger) => f.debug_tuple("Trigger").field(&trigger.service()).finish(),
            Published::Context(context) => f.debug_tuple("Context").field(&context.symbolic_name()).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Publication {
    pub capabilities: Vec<String>,
    pub properties: BTreeMap<String, String>,
    pub object: Published,
}

/// Observes whether a capability is currently provided by anyone
pub trait CapabilityWatcher: Send + Sync {
    fn capability_changed(&self, capability: &str, present: bool);
}

/// The module system hosting a container
pub trait ModuleHost: Send + Sync {
    /// Raw symbolic name header, e.g. `orders; timeout-milliseconds:=5000`
    fn symbolic_name_header(&self) -> String;

    fn version(&self) -> String;

    /// Starts the module, `transient` activations are not persisted by the host
    fn activate(&self, transient: bool) -> Result<(), HostError>;

    fn publish(&self, publication: Publication) -> Result<Box<dyn Registration>, HostError>;

    /// Gets an object providing the capability, resolving trigger proxies on the way
    fn lookup(&self, capability: &str) -> Option<Instance>;

    /// Starts watching a capability
    ///
    /// The watcher is called once with the current presence before this returns,
    /// afterwards on every change until the returned handle is unregistered.
    fn watch(&self, capability: &str, watcher: Arc<dyn CapabilityWatcher>) -> Box<dyn Registration>;
}
