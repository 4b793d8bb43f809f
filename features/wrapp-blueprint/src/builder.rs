use std::sync::Arc;

use crate::{
    host::ModuleHost,
    metadata::ComponentMetadata,
    recipe::Recipe,
    reference::ReferenceRecipe,
    registry::ComponentDefinitionRegistry,
    repository::Repository,
};

/// Turns the definitions of a registry into a fresh [`Repository`]
///
/// One recipe per definition. References get a new [`ReferenceRecipe`] each time,
/// so every generation tracks its own satisfiable set.
pub struct DependencyGraphBuilder {
    host: Arc<dyn ModuleHost>,
}
impl DependencyGraphBuilder {
    pub fn new(host: Arc<dyn ModuleHost>) -> Self {
        Self { host }
    }

    pub fn build(&self, registry: &ComponentDefinitionRegistry) -> Repository {
        let mut repository = Repository::new();
        for component in registry.iter() {
            let recipe = match component {
                ComponentMetadata::Bean(bean) => Recipe::Bean(bean.clone()),
                ComponentMetadata::Service(service) => Recipe::Service(service.clone()),
                ComponentMetadata::Reference(reference) => Recipe::Satisfiable(Arc::new(
                    ReferenceRecipe::new(reference.clone(), self.host.clone()),
                )),
            };
            repository.put_recipe(recipe);
        }

        tracing::debug!(
            recipes = repository.len(),
            "Built repository from {} definitions",
            registry.len()
        );
        repository
    }
}
