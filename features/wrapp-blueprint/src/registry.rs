use std::collections::{BTreeMap, BTreeSet};

use crate::{
    errors::ContainerError,
    metadata::{BeanMetadata, ComponentMetadata, ReferenceMetadata, ServiceMetadata},
};

/// All component definitions of a module, keyed by id
///
/// Filled by the descriptor parser, possibly changed by registry processors,
/// read by the [`DependencyGraphBuilder`](crate::builder::DependencyGraphBuilder).
#[derive(Debug, Clone, Default)]
pub struct ComponentDefinitionRegistry {
    definitions: BTreeMap<String, ComponentMetadata>,
    type_converters: Vec<String>,
}

impl ComponentDefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a definition, ids must be unique
    pub fn register(&mut self, component: impl Into<ComponentMetadata>) -> Result<(), ContainerError> {
        let component = component.into();
        let id = component.id().to_string();
        if id.is_empty() {
            return Err(ContainerError::Descriptor(
                "A component has an empty id".to_string(),
            ));
        }
        if self.definitions.contains_key(&id) {
            return Err(ContainerError::Descriptor(format!(
                "Component '{id}' is defined twice"
            )));
        }
        self.definitions.insert(id, component);
        Ok(())
    }

    /// Adds or replaces a definition
    pub fn replace(&mut self, component: impl Into<ComponentMetadata>) -> Option<ComponentMetadata> {
        let component = component.into();
        self.definitions.insert(component.id().to_string(), component)
    }

    pub fn remove(&mut self, id: &str) -> Option<ComponentMetadata> {
        self.type_converters.retain(|name| name != id);
        self.definitions.remove(id)
    }

    /// Marks a bean as type converter, it is created during bootstrap
    pub fn register_type_converter(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !self.type_converters.contains(&id) {
            self.type_converters.push(id);
        }
    }

    /// Type converters in registration order, both explicit ones and beans with the converter role
    pub fn type_converters(&self) -> Vec<String> {
        let mut names = self.type_converters.clone();
        for bean in self.beans() {
            if bean.role == crate::metadata::BeanRole::TypeConverter && !names.contains(&bean.id) {
                names.push(bean.id.clone());
            }
        }
        names
    }

    pub fn get(&self, id: &str) -> Option<&ComponentMetadata> {
        self.definitions.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.definitions.contains_key(id)
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.definitions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentMetadata> {
        self.definitions.values()
    }

    pub fn beans(&self) -> impl Iterator<Item = &BeanMetadata> {
        self.iter().filter_map(ComponentMetadata::as_bean)
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceMetadata> {
        self.iter().filter_map(ComponentMetadata::as_service)
    }

    pub fn references(&self) -> impl Iterator<Item = &ReferenceMetadata> {
        self.iter().filter_map(ComponentMetadata::as_reference)
    }
}
