//! Publication of exported components
//!
//! A created service component is wrapped in a [`ServiceRegistrationProxy`] which is registered with the host
//! while all satisfiable dependencies beneath it are met. Before the module is activated a [`TriggerProxy`]
//! may stand in for it.

use std::{
    collections::BTreeMap,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;

use crate::{
    errors::{ContainerError, CreationError},
    host::{ModuleHost, Publication, Published, Registration},
    lifecycle::{ActivationCause, Shared},
    metadata::ServiceMetadata,
    satisfiable::SatisfiableRecipe,
    state::LifecycleState,
    types::Instance,
};

/// Property naming the component behind a publication
pub const COMPONENT_NAME_PROPERTY: &str = "component.name";

/// Told whenever the service it was declared on is (un)registered
pub trait RegistrationListener: Send + Sync {
    fn registered(&self, service: &Instance, properties: &BTreeMap<String, String>);

    fn unregistered(&self, service: &Instance, properties: &BTreeMap<String, String>);
}

enum Slot {
    Unregistered,
    /// The host is being called, the lock is not held meanwhile
    Pending,
    Registered(Box<dyn Registration>),
}

/// The created form of a service component
pub struct ServiceRegistrationProxy {
    metadata: ServiceMetadata,
    exported: Instance,
    listeners: Vec<Arc<dyn RegistrationListener>>,
    slot: Mutex<Slot>,
}
impl std::fmt::Debug for ServiceRegistrationProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistrationProxy")
            .field("service", &self.metadata.id)
            .field("exported", &self.exported)
            .field("registered", &self.is_registered())
            .finish()
    }
}

impl ServiceRegistrationProxy {
    pub(crate) fn new(
        metadata: ServiceMetadata,
        exported: Instance,
        listeners: Vec<Arc<dyn RegistrationListener>>,
    ) -> Self {
        Self {
            metadata,
            exported,
            listeners,
            slot: Mutex::new(Slot::Unregistered),
        }
    }

    pub fn metadata(&self) -> &ServiceMetadata {
        &self.metadata
    }

    /// The component published by this service
    pub fn exported(&self) -> &Instance {
        &self.exported
    }

    pub fn is_registered(&self) -> bool {
        !matches!(*self.slot.lock(), Slot::Unregistered)
    }

    fn properties(&self) -> BTreeMap<String, String> {
        let mut properties = self.metadata.properties.clone();
        properties.insert(COMPONENT_NAME_PROPERTY.to_string(), self.metadata.id.clone());
        properties
    }

    /// Returns false if already registered
    pub(crate) fn register(&self, host: &dyn ModuleHost) -> Result<bool, ContainerError> {
        {
            let mut slot = self.slot.lock();
            if !matches!(*slot, Slot::Unregistered) {
                return Ok(false);
            }
            *slot = Slot::Pending;
        }

        let properties = self.properties();
        let published = host.publish(Publication {
            capabilities: self.metadata.capabilities.clone(),
            properties: properties.clone(),
            object: Published::Instance(self.exported.clone()),
        });
        let registration = match published {
            Ok(registration) => registration,
            Err(error) => {
                let mut slot = self.slot.lock();
                if matches!(*slot, Slot::Pending) {
                    *slot = Slot::Unregistered;
                }
                return Err(error.into());
            }
        };

        let revoked = {
            let mut slot = self.slot.lock();
            match *slot {
                Slot::Pending => {
                    *slot = Slot::Registered(registration);
                    None
                }
                // Unregistered while the host was busy
                _ => Some(registration),
            }
        };
        if let Some(registration) = revoked {
            registration.unregister();
            return Ok(false);
        }

        tracing::debug!(service = %self.metadata.id, "Registered service");
        for listener in &self.listeners {
            listener.registered(&self.exported, &properties);
        }
        Ok(true)
    }

    /// Returns false if not registered
    pub(crate) fn unregister(&self) -> bool {
        let previous = std::mem::replace(&mut *self.slot.lock(), Slot::Unregistered);
        let registration = match previous {
            Slot::Unregistered => return false,
            Slot::Pending => return true,
            Slot::Registered(registration) => registration,
        };

        registration.unregister();
        tracing::debug!(service = %self.metadata.id, "Unregistered service");
        let properties = self.properties();
        for listener in &self.listeners {
            listener.unregistered(&self.exported, &properties);
        }
        true
    }
}

/// Stands in for a service until something asks for it
pub struct TriggerProxy {
    service: String,
    capabilities: Vec<String>,
    container: Weak<Shared>,
}
impl TriggerProxy {
    pub(crate) fn new(service: &ServiceMetadata, container: Weak<Shared>) -> Self {
        Self {
            service: service.id.clone(),
            capabilities: service.capabilities.clone(),
            container,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Activates the module synchronously and returns the real exported component
    pub fn resolve(&self) -> Result<Instance, ContainerError> {
        let shared = self
            .container
            .upgrade()
            .ok_or_else(|| ContainerError::IllegalState("The module is gone".to_string()))?;

        tracing::debug!(service = %self.service, "Trigger proxy demanded");
        shared.host().activate(true)?;
        shared.trigger_activation(ActivationCause::ServiceRequest)?;

        let state = shared.state();
        if matches!(state, LifecycleState::Failed | LifecycleState::Destroyed) {
            return Err(ContainerError::IllegalState(format!(
                "Module is {state}, service '{}' is unavailable",
                self.service
            )));
        }

        let component = shared.get_component(&self.service)?;
        let proxy = component
            .downcast::<ServiceRegistrationProxy>()
            .map_err(|actual| {
                ContainerError::creation(
                    &self.service,
                    CreationError::RoleMismatch {
                        role: "ServiceRegistrationProxy",
                        actual,
                    },
                )
            })?;
        Ok(proxy.exported().clone())
    }
}

struct Export {
    proxy: Arc<ServiceRegistrationProxy>,
    satisfiables: Vec<Arc<dyn SatisfiableRecipe>>,
}
impl Export {
    fn satisfied(&self) -> bool {
        self.satisfiables.iter().all(|recipe| recipe.is_satisfied())
    }

    fn depends_on(&self, recipe: &str) -> bool {
        self.satisfiables.iter().any(|r| r.name() == recipe)
    }
}

#[derive(Default)]
struct Exports {
    services: BTreeMap<String, Arc<Export>>,
    triggers: BTreeMap<String, Box<dyn Registration>>,
}

/// Keeps the host's view of a module's services in line with their dependencies
///
/// The internal lock is never held while calling the host.
pub struct ServiceExposer {
    host: Arc<dyn ModuleHost>,
    exports: Mutex<Exports>,
}
impl ServiceExposer {
    pub fn new(host: Arc<dyn ModuleHost>) -> Self {
        Self {
            host,
            exports: Mutex::new(Exports::default()),
        }
    }

    pub(crate) fn register_trigger(&self, proxy: Arc<TriggerProxy>) -> Result<(), ContainerError> {
        let service = proxy.service().to_string();
        let registration = self.host.publish(Publication {
            capabilities: proxy.capabilities().to_vec(),
            properties: BTreeMap::from([(COMPONENT_NAME_PROPERTY.to_string(), service.clone())]),
            object: Published::Trigger(proxy),
        })?;
        tracing::debug!(%service, "Registered trigger proxy");

        let previous = self.exports.lock().triggers.insert(service, registration);
        if let Some(previous) = previous {
            previous.unregister();
        }
        Ok(())
    }

    /// Takes over a created service, replacing its trigger proxy
    ///
    /// The service is registered right away if its dependencies are met.
    pub(crate) fn publish(
        &self,
        name: &str,
        proxy: Arc<ServiceRegistrationProxy>,
        satisfiables: Vec<Arc<dyn SatisfiableRecipe>>,
    ) -> Result<(), ContainerError> {
        let export = Arc::new(Export {
            proxy,
            satisfiables,
        });
        let trigger = {
            let mut exports = self.exports.lock();
            if exports.services.contains_key(name) {
                tracing::warn!(service = name, "Service is already exposed");
            }
            exports.services.insert(name.to_string(), export.clone());
            exports.triggers.remove(name)
        };
        if let Some(trigger) = trigger {
            trigger.unregister();
            tracing::debug!(service = name, "Removed trigger proxy");
        }

        if export.satisfied() {
            export.proxy.register(self.host.as_ref())?;
        } else {
            tracing::debug!(service = name, "Service waits for its dependencies");
        }
        Ok(())
    }

    /// Registers or unregisters every service depending on the changed recipe
    ///
    /// Returns the number of services whose registration changed
    pub(crate) fn reconcile_for(&self, recipe: &str) -> usize {
        let affected: Vec<_> = self
            .exports
            .lock()
            .services
            .values()
            .filter(|export| export.depends_on(recipe))
            .cloned()
            .collect();
        self.reconcile(affected)
    }

    pub(crate) fn reconcile_all(&self) -> usize {
        let all: Vec<_> = self.exports.lock().services.values().cloned().collect();
        self.reconcile(all)
    }

    fn reconcile(&self, exports: Vec<Arc<Export>>) -> usize {
        let mut changed = 0;
        for export in exports {
            let service = &export.proxy.metadata().id;
            let satisfied = export.satisfied();
            let registered = export.proxy.is_registered();
            if satisfied && !registered {
                tracing::debug!(%service, "Registering service due to satisfied references");
                match export.proxy.register(self.host.as_ref()) {
                    Ok(true) => changed += 1,
                    Ok(false) => {}
                    Err(error) => tracing::warn!(%service, %error, "Could not register service"),
                }
            } else if !satisfied && registered {
                tracing::debug!(%service, "Unregistering service due to unsatisfied references");
                if export.proxy.unregister() {
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Unregisters every service and trigger proxy, each at most once
    pub(crate) fn unregister_all(&self) {
        let Exports { services, triggers } = std::mem::take(&mut *self.exports.lock());
        for (service, trigger) in triggers {
            trigger.unregister();
            tracing::debug!(%service, "Removed trigger proxy");
        }
        for export in services.values() {
            export.proxy.unregister();
        }
    }

    pub fn registered_services(&self) -> Vec<String> {
        self.exports
            .lock()
            .services
            .iter()
            .filter(|(_, export)| export.proxy.is_registered())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn trigger_count(&self) -> usize {
        self.exports.lock().triggers.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;
    use crate::{
        mock::MockHost,
        satisfiable::SatisfactionListener,
        types::{DynError, TypeInfo},
    };

    struct Switch {
        name: String,
        on: AtomicBool,
    }
    impl SatisfiableRecipe for Switch {
        fn name(&self) -> &str {
            &self.name
        }
        fn start(&self, _listener: Arc<dyn SatisfactionListener>) {}
        fn stop(&self) {}
        fn is_satisfied(&self) -> bool {
            self.on.load(Ordering::SeqCst)
        }
        fn requirement(&self) -> String {
            self.name.clone()
        }
        fn provides(&self) -> TypeInfo {
            TypeInfo::of::<()>()
        }
        fn create(&self) -> Result<Instance, DynError> {
            Ok(Instance::new(()))
        }
    }

    #[derive(Default)]
    struct Audit {
        registered: AtomicUsize,
        unregistered: AtomicUsize,
    }
    impl RegistrationListener for Audit {
        fn registered(&self, _service: &Instance, properties: &BTreeMap<String, String>) {
            assert_eq!(properties[COMPONENT_NAME_PROPERTY], "orders");
            self.registered.fetch_add(1, Ordering::SeqCst);
        }
        fn unregistered(&self, _service: &Instance, _properties: &BTreeMap<String, String>) {
            self.unregistered.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn proxy(listener: Arc<Audit>) -> Arc<ServiceRegistrationProxy> {
        Arc::new(ServiceRegistrationProxy::new(
            ServiceMetadata::new("orders", "impl").capability("orders.Api"),
            Instance::new(String::from("orders impl")),
            vec![listener as Arc<dyn RegistrationListener>],
        ))
    }

    #[test]
    fn reconcile_follows_satisfaction() {
        let host = MockHost::new("shop");
        let exposer = ServiceExposer::new(host.clone());
        let switch = Arc::new(Switch {
            name: "db".to_string(),
            on: AtomicBool::new(false),
        });
        let audit = Arc::new(Audit::default());

        exposer
            .publish(
                "orders",
                proxy(audit.clone()),
                vec![switch.clone() as Arc<dyn SatisfiableRecipe>],
            )
            .unwrap();
        assert!(exposer.registered_services().is_empty());

        for _ in 0..3 {
            switch.on.store(true, Ordering::SeqCst);
            assert_eq!(exposer.reconcile_for("db"), 1);
            assert_eq!(exposer.reconcile_for("db"), 0);
            switch.on.store(false, Ordering::SeqCst);
            assert_eq!(exposer.reconcile_for("other"), 0);
            assert_eq!(exposer.reconcile_all(), 1);
        }
        assert_eq!(host.publish_count(), 3);
        assert_eq!(host.unregister_count(), 3);
        assert_eq!(audit.registered.load(Ordering::SeqCst), 3);
        assert_eq!(audit.unregistered.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn unregister_all_releases_each_publication_once() {
        let host = MockHost::new("shop");
        let exposer = ServiceExposer::new(host.clone());
        let audit = Arc::new(Audit::default());

        exposer.publish("orders", proxy(audit.clone()), vec![]).unwrap();
        assert_eq!(exposer.registered_services(), vec!["orders"]);
        assert!(host.lookup("orders.Api").is_some());

        exposer.unregister_all();
        exposer.unregister_all();
        assert_eq!(host.unregister_count(), 1);
        assert!(host.lookup("orders.Api").is_none());
        assert_eq!(audit.unregistered.load(Ordering::SeqCst), 1);
    }
}
