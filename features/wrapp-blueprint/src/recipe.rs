use std::{fmt::Debug, sync::Arc};

use crate::{
    exposer::ServiceRegistrationProxy,
    metadata::{BeanMetadata, Dependency, Scope, ServiceMetadata},
    satisfiable::SatisfiableRecipe,
    types::TypeInfo,
};

/// Index of a recipe inside its [`Repository`](crate::repository::Repository)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecipeId(pub(crate) usize);

/// Plan to create exactly one named component
#[derive(Clone)]
pub enum Recipe {
    Bean(BeanMetadata),
    /// Creates a [`ServiceRegistrationProxy`] around the exported component
    Service(ServiceMetadata),
    /// Depends on something outside of the module
    Satisfiable(Arc<dyn SatisfiableRecipe>),
}
impl Debug for Recipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recipe::Bean(bean) => f.debug_tuple("Bean").field(&bean.id).finish(),
            Recipe::Service(service) => f.debug_tuple("Service").field(&service.id).finish(),
            Recipe::Satisfiable(recipe) => f.debug_tuple("Satisfiable").field(&recipe.name()).finish(),
        }
    }
}

impl Recipe {
    pub fn name(&self) -> &str {
        match self {
            Recipe::Bean(bean) => &bean.id,
            Recipe::Service(service) => &service.id,
            Recipe::Satisfiable(recipe) => recipe.name(),
        }
    }

    /// Direct dependencies, `depends_on` and listeners count as references
    pub fn nested(&self) -> Vec<Dependency> {
        match self {
            Recipe::Bean(bean) => bean
                .depends_on
                .iter()
                .map(|target| Dependency::Ref(target.clone()))
                .chain(bean.arguments.iter().cloned())
                .collect(),
            Recipe::Service(service) => std::iter::once(service.component.clone())
                .chain(
                    service
                        .registration_listeners
                        .iter()
                        .map(|listener| Dependency::Ref(listener.clone())),
                )
                .collect(),
            Recipe::Satisfiable(_) => Vec::new(),
        }
    }

    /// Type of the instances this recipe creates
    pub fn produces(&self) -> TypeInfo {
        match self {
            Recipe::Bean(bean) => bean.provides(),
            Recipe::Service(_) => TypeInfo::of::<ServiceRegistrationProxy>(),
            Recipe::Satisfiable(recipe) => recipe.provides(),
        }
    }

    pub fn is_singleton(&self) -> bool {
        match self {
            Recipe::Bean(bean) => bean.scope == Scope::Singleton,
            Recipe::Service(_) | Recipe::Satisfiable(_) => true,
        }
    }

    pub fn as_satisfiable(&self) -> Option<&Arc<dyn SatisfiableRecipe>> {
        match self {
            Recipe::Satisfiable(recipe) => Some(recipe),
            _ => None,
        }
    }
}
