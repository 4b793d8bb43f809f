use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::Mutex;

use crate::{
    host::{CapabilityWatcher, ModuleHost, Registration},
    metadata::{Availability, ReferenceMetadata},
    satisfiable::{SatisfactionListener, SatisfiableRecipe},
    types::{DynError, Injectable, Instance, TypeInfo},
};

/// Tracks a capability published elsewhere in the host
pub struct ReferenceRecipe {
    metadata: ReferenceMetadata,
    host: Arc<dyn ModuleHost>,
    presence: Arc<Presence>,
    watch: Mutex<Option<Box<dyn Registration>>>,
}

struct Presence {
    name: String,
    mandatory: bool,
    present: AtomicBool,
    listener: Mutex<Option<Arc<dyn SatisfactionListener>>>,
}
impl CapabilityWatcher for Presence {
    fn capability_changed(&self, capability: &str, present: bool) {
        if self.present.swap(present, Ordering::SeqCst) == present {
            return;
        }
        tracing::debug!(reference = %self.name, capability, present, "Capability changed");
        if !self.mandatory {
            return;
        }
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            listener.notify_satisfaction(&self.name, present);
        }
    }
}

impl ReferenceRecipe {
    pub fn new(metadata: ReferenceMetadata, host: Arc<dyn ModuleHost>) -> Self {
        let presence = Arc::new(Presence {
            name: metadata.id.clone(),
            mandatory: metadata.availability == Availability::Mandatory,
            present: AtomicBool::new(false),
            listener: Mutex::new(None),
        });
        Self {
            metadata,
            host,
            presence,
            watch: Mutex::new(None),
        }
    }

    pub fn metadata(&self) -> &ReferenceMetadata {
        &self.metadata
    }

    pub fn is_present(&self) -> bool {
        self.presence.present.load(Ordering::SeqCst)
    }
}

impl SatisfiableRecipe for ReferenceRecipe {
    fn name(&self) -> &str {
        &self.metadata.id
    }

    fn start(&self, listener: Arc<dyn SatisfactionListener>) {
        if self.watch.lock().is_some() {
            return;
        }
        // Initial presence is reported before the listener is set
        let registration = self
            .host
            .watch(&self.metadata.capability, self.presence.clone());
        *self.presence.listener.lock() = Some(listener);

        let previous = self.watch.lock().replace(registration);
        if let Some(previous) = previous {
            previous.unregister();
        }
    }

    fn stop(&self) {
        self.presence.listener.lock().take();
        let registration = self.watch.lock().take();
        if let Some(registration) = registration {
            registration.unregister();
        }
    }

    fn is_satisfied(&self) -> bool {
        self.metadata.availability == Availability::Optional || self.is_present()
    }

    fn requirement(&self) -> String {
        self.metadata.capability.clone()
    }

    fn provides(&self) -> TypeInfo {
        TypeInfo::of::<ServiceReference>()
    }

    fn create(&self) -> Result<Instance, DynError> {
        Ok(Instance::new(ServiceReference {
            capability: self.metadata.capability.clone(),
            availability: self.metadata.availability,
            host: self.host.clone(),
        }))
    }
}

/// What a reference component injects, the capability is looked up on every call
pub struct ServiceReference {
    capability: String,
    availability: Availability,
    host: Arc<dyn ModuleHost>,
}
impl std::fmt::Debug for ServiceReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceReference")
            .field("capability", &self.capability)
            .field("availability", &self.availability)
            .finish()
    }
}
impl ServiceReference {
    pub fn capability(&self) -> &str {
        &self.capability
    }

    pub fn availability(&self) -> Availability {
        self.availability
    }

    pub fn get(&self) -> Option<Instance> {
        self.host.lookup(&self.capability)
    }

    pub fn get_as<T: Injectable>(&self) -> Option<Arc<T>> {
        self.get().and_then(|instance| instance.downcast::<T>().ok())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::mock::MockHost;

    #[derive(Default)]
    struct Count(AtomicUsize);
    impl SatisfactionListener for Count {
        fn notify_satisfaction(&self, _recipe: &str, _satisfied: bool) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn every_toggle_is_reported_once() {
        let host = MockHost::new("orders");
        let recipe = ReferenceRecipe::new(ReferenceMetadata::new("db", "storage.Database"), host.clone());
        let listener = Arc::new(Count::default());

        recipe.start(listener.clone());
        assert!(!recipe.is_satisfied());

        for _ in 0..3 {
            host.provide("storage.Database", Instance::new(1u8));
            host.provide("storage.Database", Instance::new(2u8));
            host.withdraw("storage.Database");
        }
        assert_eq!(listener.0.load(Ordering::SeqCst), 6);

        recipe.stop();
        host.provide("storage.Database", Instance::new(3u8));
        assert_eq!(listener.0.load(Ordering::SeqCst), 6);
        assert_eq!(host.watcher_count(), 0);
    }

    #[test]
    fn present_at_start_is_satisfied_without_notification() {
        let host = MockHost::new("orders");
        host.provide("storage.Database", Instance::new(5u8));
        let recipe = ReferenceRecipe::new(ReferenceMetadata::new("db", "storage.Database"), host.clone());
        let listener = Arc::new(Count::default());

        recipe.start(listener.clone());
        assert!(recipe.is_satisfied());
        assert_eq!(listener.0.load(Ordering::SeqCst), 0);

        let reference = recipe.create().unwrap().downcast::<ServiceReference>().unwrap();
        assert_eq!(*reference.get_as::<u8>().unwrap(), 5);
        recipe.stop();
    }

    #[test]
    fn optional_references_are_always_satisfied() {
        let host = MockHost::new("orders");
        let recipe = ReferenceRecipe::new(
            ReferenceMetadata::new("cache", "cache.Store").optional(),
            host.clone(),
        );
        let listener = Arc::new(Count::default());
        recipe.start(listener.clone());

        assert!(recipe.is_satisfied());
        host.provide("cache.Store", Instance::new(()));
        host.withdraw("cache.Store");
        assert_eq!(listener.0.load(Ordering::SeqCst), 0);
        recipe.stop();
    }
}
