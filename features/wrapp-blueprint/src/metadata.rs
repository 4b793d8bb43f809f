//! Declarative description of the components of a module
//!
//! Metadata is what a descriptor parser produces. It is immutable once registered,
//! a [`RegistryProcessor`](crate::processors::RegistryProcessor) replaces whole definitions instead.

use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

use crate::{
    factories::{BeanFactory, DynFactory},
    types::TypeInfo,
};

/// The kinds of components a module can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Bean,
    Service,
    Reference,
}

/// How often a bean is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// Created once, cached for the lifetime of the module
    #[default]
    Singleton,
    /// Created anew on every request
    PerRequest,
}

/// What the container does with a bean besides creating it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BeanRole {
    #[default]
    Component,
    /// Provides `Arc<dyn TypeConverter>`
    TypeConverter,
    /// Provides `Arc<dyn RegistryProcessor>`
    RegistryProcessor,
    /// Provides `Arc<dyn BeanProcessor>`
    BeanProcessor,
}
impl BeanRole {
    pub fn is_bootstrap(&self) -> bool {
        !matches!(self, BeanRole::Component)
    }
}

/// A value injected into a factory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    /// The instance of the named component
    Ref(String),
    /// The name itself, checked to exist
    IdRef(String),
}
impl Dependency {
    pub fn target(&self) -> &str {
        match self {
            Dependency::Ref(name) | Dependency::IdRef(name) => name,
        }
    }
}

/// A component created by a factory
#[derive(Clone)]
pub struct BeanMetadata {
    pub id: String,
    pub scope: Scope,
    pub lazy_init: bool,
    pub role: BeanRole,
    /// Factory arguments, passed by target name
    pub arguments: Vec<Dependency>,
    /// Components which must be created first without being injected
    pub depends_on: Vec<String>,
    pub factory: Arc<dyn DynFactory>,
}
impl Debug for BeanMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeanMetadata")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("lazy_init", &self.lazy_init)
            .field("role", &self.role)
            .field("arguments", &self.arguments)
            .field("depends_on", &self.depends_on)
            .field("provides", &self.factory.supplies().type_name)
            .finish()
    }
}
impl BeanMetadata {
    pub fn new(id: impl Into<String>, factory: impl BeanFactory + 'static) -> Self {
        Self::from_dyn(id, Arc::new(factory))
    }

    pub fn from_dyn(id: impl Into<String>, factory: Arc<dyn DynFactory>) -> Self {
        BeanMetadata {
            id: id.into(),
            scope: Scope::Singleton,
            lazy_init: false,
            role: BeanRole::Component,
            arguments: Vec::new(),
            depends_on: Vec::new(),
            factory,
        }
    }

    pub fn provides(&self) -> TypeInfo {
        self.factory.supplies()
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn lazy(mut self) -> Self {
        self.lazy_init = true;
        self
    }

    pub fn role(mut self, role: BeanRole) -> Self {
        self.role = role;
        self
    }

    pub fn arg_ref(mut self, target: impl Into<String>) -> Self {
        self.arguments.push(Dependency::Ref(target.into()));
        self
    }

    pub fn arg_id_ref(mut self, target: impl Into<String>) -> Self {
        self.arguments.push(Dependency::IdRef(target.into()));
        self
    }

    pub fn depends_on(mut self, target: impl Into<String>) -> Self {
        self.depends_on.push(target.into());
        self
    }
}

/// A component published to the host under one or more capabilities
#[derive(Debug, Clone)]
pub struct ServiceMetadata {
    pub id: String,
    /// The published object
    pub component: Dependency,
    /// Capability names, the trigger proxy is only used when this is not empty
    pub capabilities: Vec<String>,
    pub properties: BTreeMap<String, String>,
    /// Components notified about (un)registration, created with the service
    pub registration_listeners: Vec<String>,
}
impl ServiceMetadata {
    pub fn new(id: impl Into<String>, component: impl Into<String>) -> Self {
        ServiceMetadata {
            id: id.into(),
            component: Dependency::Ref(component.into()),
            capabilities: Vec::new(),
            properties: BTreeMap::new(),
            registration_listeners: Vec::new(),
        }
    }

    pub fn capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn registration_listener(mut self, listener: impl Into<String>) -> Self {
        self.registration_listeners.push(listener.into());
        self
    }

    /// Services without listeners but with explicit capabilities are published lazily
    pub fn is_trigger_eligible(&self) -> bool {
        self.registration_listeners.is_empty() && !self.capabilities.is_empty()
    }
}

/// Whether a reference must be present for its dependents to be satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Availability {
    #[default]
    Mandatory,
    Optional,
}

/// A dependency on a capability published elsewhere in the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceMetadata {
    pub id: String,
    pub capability: String,
    pub availability: Availability,
}
impl ReferenceMetadata {
    pub fn new(id: impl Into<String>, capability: impl Into<String>) -> Self {
        ReferenceMetadata {
            id: id.into(),
            capability: capability.into(),
            availability: Availability::Mandatory,
        }
    }

    pub fn optional(mut self) -> Self {
        self.availability = Availability::Optional;
        self
    }
}

/// One component definition
#[derive(Debug, Clone)]
pub enum ComponentMetadata {
    Bean(BeanMetadata),
    Service(ServiceMetadata),
    Reference(ReferenceMetadata),
}
impl ComponentMetadata {
    pub fn id(&self) -> &str {
        match self {
            ComponentMetadata::Bean(bean) => &bean.id,
            ComponentMetadata::Service(service) => &service.id,
            ComponentMetadata::Reference(reference) => &reference.id,
        }
    }

    pub fn kind(&self) -> ComponentKind {
        match self {
            ComponentMetadata::Bean(_) => ComponentKind::Bean,
            ComponentMetadata::Service(_) => ComponentKind::Service,
            ComponentMetadata::Reference(_) => ComponentKind::Reference,
        }
    }

    /// Names of the components this one refers to directly
    pub fn dependencies(&self) -> Vec<&str> {
        match self {
            ComponentMetadata::Bean(bean) => bean
                .arguments
                .iter()
                .map(Dependency::target)
                .chain(bean.depends_on.iter().map(String::as_str))
                .collect(),
            ComponentMetadata::Service(service) => std::iter::once(service.component.target())
                .chain(service.registration_listeners.iter().map(String::as_str))
                .collect(),
            ComponentMetadata::Reference(_) => Vec::new(),
        }
    }

    pub fn as_bean(&self) -> Option<&BeanMetadata> {
        match self {
            ComponentMetadata::Bean(bean) => Some(bean),
            _ => None,
        }
    }

    pub fn as_service(&self) -> Option<&ServiceMetadata> {
        match self {
            ComponentMetadata::Service(service) => Some(service),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&ReferenceMetadata> {
        match self {
            ComponentMetadata::Reference(reference) => Some(reference),
            _ => None,
        }
    }
}
impl From<BeanMetadata> for ComponentMetadata {
    fn from(bean: BeanMetadata) -> Self {
        ComponentMetadata::Bean(bean)
    }
}
impl From<ServiceMetadata> for ComponentMetadata {
    fn from(service: ServiceMetadata) -> Self {
        ComponentMetadata::Service(service)
    }
}
impl From<ReferenceMetadata> for ComponentMetadata {
    fn from(reference: ReferenceMetadata) -> Self {
        ComponentMetadata::Reference(reference)
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;
    use crate::factories::factory_fn;

    #[test]
    fn dependencies_cover_arguments_and_depends_on() {
        let bean: ComponentMetadata = BeanMetadata::new("a", factory_fn(|_| Ok::<_, Infallible>(1u8)))
            .arg_ref("b")
            .arg_id_ref("c")
            .depends_on("d")
            .into();

        assert_eq!(bean.kind(), ComponentKind::Bean);
        assert_eq!(bean.dependencies(), vec!["b", "c", "d"]);
        assert_eq!(bean.as_bean().unwrap().provides(), TypeInfo::of::<u8>());
    }

    #[test]
    fn trigger_eligibility() {
        let plain = ServiceMetadata::new("s", "a");
        assert!(!plain.is_trigger_eligible());

        let exported = plain.clone().capability("orders.Api");
        assert!(exported.is_trigger_eligible());

        let listened = exported.registration_listener("audit");
        assert!(!listened.is_trigger_eligible());
        assert_eq!(
            ComponentMetadata::from(listened).dependencies(),
            vec!["a", "audit"]
        );
    }
}
