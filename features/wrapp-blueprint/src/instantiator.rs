use std::sync::Arc;

use crate::{
    dependency_graph::DependencyGraph,
    errors::{ContainerError, CreationError, UnresolvedReference},
    exposer::{RegistrationListener, ServiceExposer, ServiceRegistrationProxy},
    factories::Arguments,
    metadata::{BeanMetadata, Dependency, ServiceMetadata},
    processors::{as_role, BeanProcessor, ConversionService},
    recipe::Recipe,
    repository::{Destroyer, Repository},
    types::{DynError, Instance},
};

/// Creates components of one repository generation on demand
pub struct Instantiator {
    repository: Arc<Repository>,
    conversions: Arc<ConversionService>,
    exposer: Arc<ServiceExposer>,
    bean_processors: Vec<Arc<dyn BeanProcessor>>,
}

impl Instantiator {
    pub fn new(
        repository: Arc<Repository>,
        conversions: Arc<ConversionService>,
        exposer: Arc<ServiceExposer>,
        bean_processors: Vec<Arc<dyn BeanProcessor>>,
    ) -> Self {
        Self {
            repository,
            conversions,
            exposer,
            bean_processors,
        }
    }

    pub fn repository(&self) -> &Arc<Repository> {
        &self.repository
    }

    /// Creates the named component, singletons are cached
    pub fn create(&self, name: &str) -> Result<Instance, ContainerError> {
        let recipe = self
            .repository
            .recipe(name)
            .ok_or_else(|| ContainerError::NoSuchComponent(name.to_string()))?;

        let _creation = self.repository.creation_guard();
        if let Some(instance) = self.repository.instance(name) {
            let expected = recipe.produces();
            if instance.info != expected {
                return Err(ContainerError::creation(
                    name,
                    CreationError::TypeMismatch {
                        expected,
                        actual: instance.info,
                    },
                ));
            }
            return Ok(instance);
        }

        self.repository
            .begin_creation(name)
            .map_err(|error| ContainerError::creation(name, error))?;
        let created = self.construct(recipe);
        self.repository.end_creation(name);
        let (instance, destroyer) = created?;

        if !recipe.is_singleton() {
            tracing::debug!(component = name, "Created component");
            return Ok(instance);
        }

        let instance = self.repository.put_instance(name, instance, destroyer);
        tracing::debug!(component = name, "Created component");

        if let Recipe::Service(_) = recipe {
            let proxy = instance
                .downcast::<ServiceRegistrationProxy>()
                .map_err(|_| {
                    ContainerError::creation(
                        name,
                        CreationError::TypeMismatch {
                            expected: recipe.produces(),
                            actual: instance.info,
                        },
                    )
                })?;
            let satisfiables = DependencyGraph::new(&self.repository).satisfiables_under(name);
            self.exposer.publish(name, proxy, satisfiables)?;
        }

        Ok(instance)
    }

    /// Creates all named components, dependencies first
    pub fn create_all(&self, names: &[String]) -> Result<Vec<(String, Instance)>, ContainerError> {
        let order = DependencyGraph::new(&self.repository).dependency_order(names);
        tracing::debug!(components = ?order, "Instantiating components");

        let mut created = Vec::with_capacity(names.len());
        for name in order {
            let instance = self.create(&name)?;
            if names.contains(&name) {
                created.push((name, instance));
            }
        }
        Ok(created)
    }

    fn construct(&self, recipe: &Recipe) -> Result<(Instance, Option<Destroyer>), ContainerError> {
        match recipe {
            Recipe::Bean(bean) => self.construct_bean(bean),
            Recipe::Service(service) => self.construct_service(service),
            Recipe::Satisfiable(satisfiable) => {
                let instance = satisfiable
                    .create()
                    .map_err(|error| ContainerError::creation(satisfiable.name(), error))?;
                Ok((instance, None))
            }
        }
    }

    /// Resolves one dependency of `owner`
    fn resolve(&self, owner: &str, dependency: &Dependency) -> Result<Instance, ContainerError> {
        let target = dependency.target();
        let unresolved = || UnresolvedReference {
            reference: target.to_string(),
            required_by: owner.to_string(),
        };
        match dependency {
            Dependency::Ref(_) => self.create(target).map_err(|error| match error {
                ContainerError::NoSuchComponent(missing) if missing == target => unresolved().into(),
                other => other,
            }),
            Dependency::IdRef(_) if self.repository.contains(target) => {
                Ok(Instance::new(target.to_string()))
            }
            Dependency::IdRef(_) => Err(unresolved().into()),
        }
    }

    fn construct_bean(&self, bean: &BeanMetadata) -> Result<(Instance, Option<Destroyer>), ContainerError> {
        for target in &bean.depends_on {
            self.resolve(&bean.id, &Dependency::Ref(target.clone()))?;
        }

        let mut values = Vec::with_capacity(bean.arguments.len());
        for argument in &bean.arguments {
            let value = self.resolve(&bean.id, argument)?;
            values.push((argument.target().to_string(), value));
        }
        let arguments = Arguments::new(values, self.conversions.clone());

        let fail = |error: DynError| ContainerError::creation(&bean.id, error);
        let mut instance = bean.factory.construct(&arguments).map_err(fail)?;

        if !bean.role.is_bootstrap() {
            for processor in &self.bean_processors {
                instance = processor.before_init(&bean.id, instance).map_err(fail)?;
            }
            for processor in &self.bean_processors {
                instance = processor.after_init(&bean.id, instance).map_err(fail)?;
            }
            if instance.info != bean.provides() {
                return Err(ContainerError::creation(
                    &bean.id,
                    CreationError::TypeMismatch {
                        expected: bean.provides(),
                        actual: instance.info,
                    },
                ));
            }
        }

        let factory = bean.factory.clone();
        let created = instance.clone();
        let destroyer: Destroyer = Box::new(move || factory.destroy(&created));
        Ok((instance, Some(destroyer)))
    }

    fn construct_service(
        &self,
        service: &ServiceMetadata,
    ) -> Result<(Instance, Option<Destroyer>), ContainerError> {
        let exported = self.resolve(&service.id, &service.component)?;

        let mut listeners = Vec::with_capacity(service.registration_listeners.len());
        for name in &service.registration_listeners {
            let instance = self.resolve(&service.id, &Dependency::Ref(name.clone()))?;
            listeners.push(as_role::<dyn RegistrationListener>(
                name,
                &instance,
                "RegistrationListener",
            )?);
        }

        let proxy = Arc::new(ServiceRegistrationProxy::new(service.clone(), exported, listeners));
        let registration = proxy.clone();
        let destroyer: Destroyer = Box::new(move || {
            registration.unregister();
            Ok(())
        });
        Ok((Instance::from_arc(proxy), Some(destroyer)))
    }
}
