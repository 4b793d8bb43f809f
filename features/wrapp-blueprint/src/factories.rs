use std::{convert::Infallible, marker::PhantomData, sync::Arc};

use crate::{
    errors::CreationError,
    processors::ConversionService,
    types::{DynError, Injectable, Instance, TypeInfo},
};

/// A Factory providing instances of a given type
pub trait BeanFactory: Send + Sync {
    type Provides: Injectable;

    /// Returns the typeinfo about the factory's provided type
    fn supplies() -> TypeInfo {
        TypeInfo::of::<Self::Provides>()
    }

    /// Constructs a new instance from the resolved arguments
    fn construct(
        &self,
        args: &Arguments,
    ) -> Result<Self::Provides, impl Into<DynError>>;

    /// Releases an instance when the module is torn down
    fn destroy(&self, instance: &Self::Provides) -> Result<(), impl Into<DynError>> {
        let _ = instance; // Ignore unused
        Ok::<_, Infallible>(())
    }
}

/// Wrapper Trait for factories, providing instances of Any
pub trait DynFactory: Send + Sync {
    fn supplies(&self) -> TypeInfo;

    fn construct(&self, args: &Arguments) -> Result<Instance, DynError>;

    fn destroy(&self, instance: &Instance) -> Result<(), DynError>;
}
// Impl DynFactory for any BeanFactory
impl<SpecificFactory: BeanFactory> DynFactory for SpecificFactory {
    fn supplies(&self) -> TypeInfo {
        SpecificFactory::supplies()
    }

    fn construct(&self, args: &Arguments) -> Result<Instance, DynError> {
        BeanFactory::construct(self, args)
            .map(Instance::new)
            .map_err(|e| e.into())
    }

    fn destroy(&self, instance: &Instance) -> Result<(), DynError> {
        let typed = instance
            .downcast::<SpecificFactory::Provides>()
            .map_err(|_| CreationError::TypeMismatch {
                expected: SpecificFactory::supplies(),
                actual: instance.info,
            })?;
        BeanFactory::destroy(self, &typed).map_err(|e| e.into())
    }
}

/// Factory built from a closure, see [`factory_fn`]
pub struct FnFactory<F, T> {
    construct: F,
    _marker: PhantomData<fn() -> T>,
}

/// Wraps a closure into a [`BeanFactory`]
///
/// ```rust
/// use wrapp_blueprint::{factories::factory_fn, metadata::BeanMetadata, types::DynError};
///
/// struct Greeter(String);
///
/// let bean = BeanMetadata::new(
///     "greeter",
///     factory_fn(|args| {
///         let name = args.get::<String>("name")?;
///         Ok::<_, DynError>(Greeter(format!("hello {name}")))
///     }),
/// )
/// .arg_ref("name");
/// assert_eq!(bean.arguments.len(), 1);
/// ```
pub fn factory_fn<F, T, E>(construct: F) -> FnFactory<F, T>
where
    F: Fn(&Arguments) -> Result<T, E> + Send + Sync,
    T: Injectable,
    E: Into<DynError>,
{
    FnFactory {
        construct,
        _marker: PhantomData,
    }
}
impl<F, T, E> BeanFactory for FnFactory<F, T>
where
    F: Fn(&Arguments) -> Result<T, E> + Send + Sync,
    T: Injectable,
    E: Into<DynError>,
{
    type Provides = T;

    fn construct(&self, args: &Arguments) -> Result<T, impl Into<DynError>> {
        (self.construct)(args)
    }
}

/// Resolved arguments handed to a factory
pub struct Arguments {
    values: Vec<(String, Instance)>,
    conversions: Arc<ConversionService>,
}
impl Arguments {
    pub(crate) fn new(values: Vec<(String, Instance)>, conversions: Arc<ConversionService>) -> Self {
        Self {
            values,
            conversions,
        }
    }

    /// The raw instance of a declared argument
    pub fn instance(&self, name: &str) -> Result<&Instance, CreationError> {
        self.values
            .iter()
            .find(|(arg, _)| arg == name)
            .map(|(_, instance)| instance)
            .ok_or_else(|| CreationError::UnknownArgument(name.to_string()))
    }

    /// A declared argument as `T`, converted through the registered type converters if needed
    pub fn get<T: Injectable>(&self, name: &str) -> Result<Arc<T>, CreationError> {
        let instance = self.instance(name)?;
        if let Ok(typed) = instance.downcast::<T>() {
            return Ok(typed);
        }

        let mismatch = || CreationError::ArgumentType {
            argument: name.to_string(),
            requested: std::any::type_name::<T>(),
            actual: instance.info.type_name,
        };
        match self.conversions.convert(instance, TypeInfo::of::<T>()) {
            Some(Ok(converted)) => converted.downcast::<T>().map_err(|_| mismatch()),
            Some(Err(error)) => {
                tracing::debug!(argument = name, %error, "Conversion failed");
                Err(mismatch())
            }
            None => Err(mismatch()),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
