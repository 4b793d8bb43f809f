use std::{fmt::Debug, sync::Arc};

use crate::{
    errors::{ContainerError, CreationError},
    lifecycle::Shared,
    metadata::{BeanMetadata, ComponentMetadata, ReferenceMetadata, ServiceMetadata},
    state::LifecycleState,
    types::{Injectable, Instance, TypeInfo},
};

/// A module's view of its own components
///
/// Published to the host once the module is created. Lookups create components on demand,
/// so a lazy bean is created the first time it is asked for.
#[derive(Clone)]
pub struct ModuleContext(Arc<Shared>);
impl Debug for ModuleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleContext")
            .field("module", &self.symbolic_name())
            .field("state", &self.state())
            .finish()
    }
}

impl ModuleContext {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self(shared)
    }

    pub fn symbolic_name(&self) -> &str {
        self.0.name()
    }

    pub fn state(&self) -> LifecycleState {
        self.0.state()
    }

    pub fn component_names(&self) -> Vec<String> {
        self.0.registry().names().into_iter().collect()
    }

    pub fn get_component(&self, name: &str) -> Result<Instance, ContainerError> {
        self.0.get_component(name)
    }

    /// Gets a component and downcasts it
    pub fn get_component_as<T: Injectable>(&self, name: &str) -> Result<Arc<T>, ContainerError> {
        let instance = self.get_component(name)?;
        instance.downcast::<T>().map_err(|_| {
            ContainerError::creation(
                name,
                CreationError::TypeMismatch {
                    expected: TypeInfo::of::<T>(),
                    actual: instance.info,
                },
            )
        })
    }

    pub fn component_metadata(&self, name: &str) -> Result<ComponentMetadata, ContainerError> {
        self.0
            .registry()
            .get(name)
            .cloned()
            .ok_or_else(|| ContainerError::NoSuchComponent(name.to_string()))
    }

    pub fn bean_metadata(&self) -> Vec<BeanMetadata> {
        self.0.registry().beans().cloned().collect()
    }

    pub fn exported_services_metadata(&self) -> Vec<ServiceMetadata> {
        self.0.registry().services().cloned().collect()
    }

    pub fn referenced_services_metadata(&self) -> Vec<ReferenceMetadata> {
        self.0.registry().references().cloned().collect()
    }
}
