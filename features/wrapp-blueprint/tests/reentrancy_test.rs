mod common;

use std::{convert::Infallible, sync::Arc, time::Duration};

use common::Fixture;
use parking_lot::Mutex;
use wrapp_blueprint::{
    events::ContainerEvent,
    factories::factory_fn,
    host::EventSender,
    metadata::{BeanMetadata, BeanRole, ReferenceMetadata, ServiceMetadata},
    mock::{MockParser, RecordingEventSender},
    processors::TypeConverter,
    ContainerError, DynError, Instance, LifecycleState, ModuleContainer, TypeInfo,
};

/// Records events and destroys the container from inside the matching callback
struct DestroyOn {
    recorder: Arc<RecordingEventSender>,
    matches: fn(&ContainerEvent) -> bool,
    container: Mutex<Option<ModuleContainer>>,
}
impl DestroyOn {
    fn new(recorder: Arc<RecordingEventSender>, matches: fn(&ContainerEvent) -> bool) -> Arc<Self> {
        Arc::new(Self {
            recorder,
            matches,
            container: Mutex::new(None),
        })
    }

    fn after_send(&self) {
        let last = self.recorder.events().pop();
        if !last.is_some_and(|event| (self.matches)(&event)) {
            return;
        }
        let container = self.container.lock().clone();
        if let Some(container) = container {
            container.destroy();
        }
    }
}
impl EventSender for DestroyOn {
    fn send_creating(&self, module: &str) {
        self.recorder.send_creating(module);
        self.after_send();
    }

    fn send_waiting(&self, module: &str, missing: &[String]) {
        self.recorder.send_waiting(module, missing);
        self.after_send();
    }

    fn send_failure(&self, module: &str, cause: &ContainerError) {
        self.recorder.send_failure(module, cause);
        self.after_send();
    }

    fn send_created(&self, module: &str) {
        self.recorder.send_created(module);
        self.after_send();
    }

    fn send_destroying(&self, module: &str) {
        self.recorder.send_destroying(module);
        self.after_send();
    }

    fn send_destroyed(&self, module: &str) {
        self.recorder.send_destroyed(module);
        self.after_send();
    }
}

fn greeter_module() -> MockParser {
    MockParser::new()
        .component(BeanMetadata::new(
            "greeter-impl",
            factory_fn(|_| Ok::<_, Infallible>("hello".to_string())),
        ))
        .component(ServiceMetadata::new("greeter", "greeter-impl").capability("greeter.Api"))
}

fn with_destroy_on(
    fixture: &Fixture,
    parser: MockParser,
    lazy: bool,
    matches: fn(&ContainerEvent) -> bool,
) -> ModuleContainer {
    let sender = DestroyOn::new(fixture.events.clone(), matches);
    let container = fixture
        .builder(parser)
        .events(sender.clone())
        .lazy_activation(lazy)
        .build()
        .expect("All collaborators are set");
    *sender.container.lock() = Some(container.clone());
    container
}

#[test]
fn destroy_from_timeout_failure_listener_tears_down() {
    let fixture = Fixture::new("com.acme.greeter; timeout-milliseconds:=500");
    let container = with_destroy_on(&fixture, greeter_module(), true, |event| {
        matches!(event, ContainerEvent::Failure { .. })
    });
    fixture.start(&container);
    assert_eq!(container.state(), LifecycleState::WaitForTrigger);
    assert_eq!(fixture.host.publications("greeter.Api").len(), 1);

    fixture.scheduler.advance(Duration::from_millis(500));

    assert_eq!(container.state(), LifecycleState::Destroyed);
    assert!(matches!(
        fixture.last_failure(),
        Some(ContainerError::ActivationTimeout { timeout }) if timeout == Duration::from_millis(500)
    ));
    assert_eq!(fixture.destroyed(), (1, 1));
    assert!(fixture.host.publications("greeter.Api").is_empty());
    assert_eq!(fixture.namespaces.listener_count(), 0);

    container.destroy();
    assert_eq!(fixture.destroyed(), (1, 1));
    assert_eq!(fixture.events.events().len(), 4);
}

#[test]
fn destroy_from_startup_failure_listener_tears_down_once() {
    let fixture = Fixture::new("com.acme.broken");
    let container = with_destroy_on(&fixture, MockParser::new().failing("broken"), false, |event| {
        matches!(event, ContainerEvent::Failure { .. })
    });

    fixture.start(&container);

    assert_eq!(container.state(), LifecycleState::Destroyed);
    assert_eq!(fixture.failures(), 1);
    assert_eq!(fixture.destroyed(), (1, 1));
}

#[test]
fn destroy_from_created_listener_tears_down_once() {
    let fixture = Fixture::new("com.acme.greeter");
    let container = with_destroy_on(&fixture, greeter_module(), false, |event| {
        matches!(event, ContainerEvent::Created { .. })
    });

    fixture.start(&container);

    assert_eq!(container.state(), LifecycleState::Destroyed);
    assert_eq!(fixture.created(), 1);
    assert_eq!(fixture.destroyed(), (1, 1));
    assert!(fixture.host.publications("greeter.Api").is_empty());
    assert!(fixture.host.context().is_none());
}

#[test]
fn destroy_from_a_factory_stops_creation() {
    let fixture = Fixture::new("com.acme.greeter");
    let slot: Arc<Mutex<Option<ModuleContainer>>> = Arc::new(Mutex::new(None));
    let inner = slot.clone();
    let parser = greeter_module().component(BeanMetadata::new(
        "self-destruct",
        factory_fn(move |_| {
            let container = inner.lock().clone();
            if let Some(container) = container {
                container.destroy();
            }
            Ok::<_, Infallible>(0u8)
        }),
    ));
    let container = fixture.container(parser);
    *slot.lock() = Some(container.clone());

    fixture.start(&container);

    assert_eq!(container.state(), LifecycleState::Destroyed);
    assert_eq!(fixture.created(), 0);
    assert_eq!(fixture.failures(), 0);
    assert_eq!(fixture.destroyed(), (1, 1));
    assert!(fixture.host.publications("greeter.Api").is_empty());
    assert!(fixture.host.context().is_none());
    assert_eq!(fixture.scheduler.active_timers(), 0);
}

#[test]
fn reference_appearing_during_a_step_is_picked_up_inline() {
    let fixture = Fixture::new("com.acme.orders");
    let host = fixture.host.clone();
    let sender = Arc::new(ProvideOnWaiting {
        recorder: fixture.events.clone(),
        provide: Box::new(move || host.provide("storage.Database", Instance::new(1u32))),
    });
    let container = fixture
        .builder(MockParser::new().component(ReferenceMetadata::new("db", "storage.Database")))
        .events(sender)
        .build()
        .expect("All collaborators are set");

    container.start();
    // Only the start task ran, the change did not need a task of its own
    assert_eq!(fixture.scheduler.run_pending(), 1);
    assert_eq!(container.state(), LifecycleState::Created);
    assert_eq!(fixture.waiting(), 1);
    assert_eq!(fixture.created(), 1);
}

/// Makes the awaited capability appear while the waiting event is sent
struct ProvideOnWaiting {
    recorder: Arc<RecordingEventSender>,
    provide: Box<dyn Fn() + Send + Sync>,
}
impl EventSender for ProvideOnWaiting {
    fn send_creating(&self, module: &str) {
        self.recorder.send_creating(module);
    }

    fn send_waiting(&self, module: &str, missing: &[String]) {
        self.recorder.send_waiting(module, missing);
        (self.provide)();
    }

    fn send_failure(&self, module: &str, cause: &ContainerError) {
        self.recorder.send_failure(module, cause);
    }

    fn send_created(&self, module: &str) {
        self.recorder.send_created(module);
    }

    fn send_destroying(&self, module: &str) {
        self.recorder.send_destroying(module);
    }

    fn send_destroyed(&self, module: &str) {
        self.recorder.send_destroyed(module);
    }
}

struct Identity;
impl TypeConverter for Identity {
    fn can_convert(&self, from: TypeInfo, to: TypeInfo) -> bool {
        from == to
    }

    fn convert(&self, value: &Instance, _to: TypeInfo) -> Result<Instance, DynError> {
        Ok(value.clone())
    }
}

#[test]
fn timeout_firing_during_a_step_fails_the_module_afterwards() {
    let fixture = Fixture::new("com.acme.orders; timeout-milliseconds:=500");
    let scheduler = fixture.scheduler.clone();
    let parser = greeter_module().component(
        BeanMetadata::new(
            "slow-converter",
            factory_fn(move |_| {
                scheduler.advance(Duration::from_millis(500));
                Ok::<_, Infallible>(Arc::new(Identity) as Arc<dyn TypeConverter>)
            }),
        )
        .role(BeanRole::TypeConverter),
    );
    let container = fixture.container(parser);

    fixture.start(&container);

    assert_eq!(container.state(), LifecycleState::Failed);
    assert_eq!(fixture.failures(), 1);
    assert_eq!(fixture.created(), 0);
    assert!(matches!(
        fixture.last_failure(),
        Some(ContainerError::UnsatisfiedDependencyTimeout { .. })
    ));

    container.destroy();
    assert_eq!(fixture.destroyed(), (1, 1));
}
