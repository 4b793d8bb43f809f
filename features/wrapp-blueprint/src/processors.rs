//! Bootstrap components
//!
//! Beans with a [`BeanRole`](crate::metadata::BeanRole) other than `Component` are created before
//! everything else and extend the container itself. Their factories provide the role as a trait object,
//! e.g. `Arc<dyn TypeConverter>`.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    errors::{ContainerError, CreationError},
    registry::ComponentDefinitionRegistry,
    types::{DynError, Injectable, Instance, TypeInfo},
};

/// Converts values between types when a factory asks for an argument in another type
pub trait TypeConverter: Send + Sync {
    fn can_convert(&self, from: TypeInfo, to: TypeInfo) -> bool;

    fn convert(&self, value: &Instance, to: TypeInfo) -> Result<Instance, DynError>;
}

/// Changes component definitions before the graph is rebuilt
pub trait RegistryProcessor: Send + Sync {
    fn process(&self, registry: &mut ComponentDefinitionRegistry) -> Result<(), DynError>;
}

/// Hooks around the creation of every bean created after bootstrap
pub trait BeanProcessor: Send + Sync {
    fn before_init(&self, name: &str, instance: Instance) -> Result<Instance, DynError> {
        let _ = name;
        Ok(instance)
    }

    fn after_init(&self, name: &str, instance: Instance) -> Result<Instance, DynError> {
        let _ = name;
        Ok(instance)
    }
}

/// Registered type converters, shared by every graph generation of a module
#[derive(Default)]
pub struct ConversionService {
    converters: RwLock<Vec<Arc<dyn TypeConverter>>>,
}
impl ConversionService {
    pub fn register(&self, converter: Arc<dyn TypeConverter>) {
        self.converters.write().push(converter);
    }

    pub fn clear(&self) {
        self.converters.write().clear();
    }

    pub fn len(&self) -> usize {
        self.converters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.read().is_empty()
    }

    /// Converts with the first matching converter
    ///
    /// Returns None if no converter accepts the pair of types
    pub fn convert(&self, value: &Instance, to: TypeInfo) -> Option<Result<Instance, DynError>> {
        let converter = self
            .converters
            .read()
            .iter()
            .find(|c| c.can_convert(value.info, to))
            .cloned()?;
        Some(converter.convert(value, to))
    }
}

/// Extracts a role trait object from an instance whose factory provides `Arc<R>`
pub(crate) fn as_role<R: ?Sized + Send + Sync + 'static>(
    name: &str,
    instance: &Instance,
    role: &'static str,
) -> Result<Arc<R>, ContainerError>
where
    Arc<R>: Injectable,
{
    instance
        .downcast::<Arc<R>>()
        .map(|outer| Arc::clone(outer.as_ref()))
        .map_err(|actual| ContainerError::creation(name, CreationError::RoleMismatch { role, actual }))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;
    impl TypeConverter for Upper {
        fn can_convert(&self, from: TypeInfo, to: TypeInfo) -> bool {
            from == TypeInfo::of::<&'static str>() && to == TypeInfo::of::<String>()
        }

        fn convert(&self, value: &Instance, _to: TypeInfo) -> Result<Instance, DynError> {
            let text = value.downcast::<&'static str>().map_err(|e| e.to_string())?;
            Ok(Instance::new(text.to_uppercase()))
        }
    }

    #[test]
    fn conversion_picks_matching_converter() {
        let service = ConversionService::default();
        let value = Instance::new("abc");
        assert!(service.convert(&value, TypeInfo::of::<String>()).is_none());

        service.register(Arc::new(Upper));
        let converted = service
            .convert(&value, TypeInfo::of::<String>())
            .unwrap()
            .unwrap();
        assert_eq!(*converted.downcast::<String>().unwrap(), "ABC");
        assert!(service.convert(&value, TypeInfo::of::<u8>()).is_none());
    }

    #[test]
    fn role_extraction_checks_the_provided_type() {
        let converter: Arc<dyn TypeConverter> = Arc::new(Upper);
        let instance = Instance::new(converter);

        assert!(as_role::<dyn TypeConverter>("c", &instance, "TypeConverter").is_ok());
        let err = as_role::<dyn RegistryProcessor>("c", &instance, "RegistryProcessor").err().unwrap();
        assert!(matches!(err, ContainerError::ComponentCreation { .. }));
    }
}
