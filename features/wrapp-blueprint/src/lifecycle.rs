//! The driver of a module container
//!
//! A module is driven by [`Shared::run`], a loop which performs the work of the current state and moves on
//! until it has to wait for something outside of the module. Waiting never blocks: the loop returns and is
//! resubmitted to the [`Scheduler`] by whatever event it waits for.
//!
//! All driving happens under one reentrant lock per module. Notifications which arrive while the lock is held
//! never wait for it. On the owning thread they leave a flag the running loop picks up, from other threads
//! they submit a resync task instead.

use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet},
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard, RwLock, RwLockReadGuard};
use wrapp_config::{config::DEFAULT_TIMEOUT, directives::parse_header, ContainerConfig};

use crate::{
    builder::DependencyGraphBuilder,
    context::ModuleContext,
    dependency_graph::DependencyGraph,
    errors::ContainerError,
    exposer::{ServiceExposer, TriggerProxy},
    host::{
        EventSender, MetadataParser, ModuleHost, NamespaceHandlerDirectory, NamespaceListener,
        ParsedDescriptor, Publication, Published, Registration,
    },
    instantiator::Instantiator,
    metadata::{BeanRole, ComponentMetadata, Scope, ServiceMetadata},
    processors::{as_role, BeanProcessor, ConversionService, RegistryProcessor, TypeConverter},
    registry::ComponentDefinitionRegistry,
    repository::Repository,
    satisfiable::{SatisfactionListener, SatisfiableDependencyTracker},
    scheduler::{ScheduledTask, Scheduler},
    state::{Inputs, LifecycleState, Transition},
    types::Instance,
};

/// Capability under which a created module publishes its [`ModuleContext`]
pub const MODULE_CONTEXT_CAPABILITY: &str = "module-context";
pub const SYMBOLIC_NAME_PROPERTY: &str = "module.symbolic-name";
pub const VERSION_PROPERTY: &str = "module.version";

/// Why a lazily activated module is asked to start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationCause {
    /// Someone needs a service right now, the module is created on the calling thread
    ServiceRequest,
    /// Passive discovery, e.g. a class of the module was loaded, the module is created in the background
    ClassLoad,
}

enum Flow {
    Continue,
    Suspend,
    Halt,
}

/// State only the driver touches, guarded by the driver lock
#[derive(Default)]
struct Driver {
    config: Option<ContainerConfig>,
    descriptor: Option<Box<dyn ParsedDescriptor>>,
    namespaces: BTreeSet<String>,
    namespace_listener: Option<Box<dyn Registration>>,
    waiting_sent: bool,
    tracker: Option<SatisfiableDependencyTracker>,
    timeout: Option<Box<dyn ScheduledTask>>,
    context_registration: Option<Box<dyn Registration>>,
}
impl Driver {
    fn wait_for_dependencies(&self) -> bool {
        self.config
            .as_ref()
            .map_or(true, |config| config.wait_for_dependencies)
    }

    fn timeout(&self) -> Duration {
        self.config
            .as_ref()
            .map_or(DEFAULT_TIMEOUT, |config| config.timeout)
    }

    fn is_satisfied(&self) -> bool {
        self.tracker
            .as_ref()
            .map_or(true, SatisfiableDependencyTracker::is_all_satisfied)
    }

    fn missing(&self) -> Vec<String> {
        self.tracker
            .as_ref()
            .map(SatisfiableDependencyTracker::missing)
            .unwrap_or_default()
    }
}

pub(crate) struct Shared {
    name: String,
    header: String,
    version: String,
    sources: Vec<String>,
    lazy_activation: bool,
    config_override: Option<ContainerConfig>,

    host: Arc<dyn ModuleHost>,
    parser: Arc<dyn MetadataParser>,
    handlers: Arc<dyn NamespaceHandlerDirectory>,
    events: Arc<dyn EventSender>,
    scheduler: Arc<dyn Scheduler>,

    conversions: Arc<ConversionService>,
    exposer: Arc<ServiceExposer>,
    registry: RwLock<ComponentDefinitionRegistry>,
    /// Current repository generation, readable without the driver lock
    generation: Mutex<Option<Arc<Instantiator>>>,
    /// Only written while holding the driver lock, except by destroy
    state: Mutex<LifecycleState>,
    driver: ReentrantMutex<RefCell<Driver>>,

    resync: AtomicBool,
    destroy_pending: AtomicBool,
    activation_requested: AtomicBool,
    /// Set when the timer fires while a step of this thread has the driver borrowed
    pending_timeout: Mutex<Option<Duration>>,
}

type DriverGuard<'a> = ReentrantMutexGuard<'a, RefCell<Driver>>;

// Accessors
impl Shared {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn host(&self) -> &Arc<dyn ModuleHost> {
        &self.host
    }

    pub(crate) fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    pub(crate) fn registry(&self) -> RwLockReadGuard<'_, ComponentDefinitionRegistry> {
        self.registry.read()
    }

    /// Creates or returns a component of the current generation
    pub(crate) fn get_component(&self, name: &str) -> Result<Instance, ContainerError> {
        let generation = self.generation.lock().clone();
        generation
            .ok_or_else(|| ContainerError::NoSuchComponent(name.to_string()))?
            .create(name)
    }

    fn current_generation(&self) -> Result<Arc<Instantiator>, ContainerError> {
        let generation = self.generation.lock().clone();
        generation.ok_or_else(|| ContainerError::IllegalState("No component graph has been built".to_string()))
    }
}

// Scheduling
impl Shared {
    fn submit(self: &Arc<Self>, work: impl FnOnce(&Arc<Shared>) + Send + 'static) {
        let weak = Arc::downgrade(self);
        self.scheduler.submit(Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                work(&shared);
            }
        }));
    }

    pub(crate) fn submit_run(self: &Arc<Self>) {
        self.submit(|shared| shared.run());
    }

    fn arm_timeout(self: &Arc<Self>, driver: &mut Driver) {
        if let Some(previous) = driver.timeout.take() {
            previous.cancel();
        }
        let timeout = driver.timeout();
        let weak = Arc::downgrade(self);
        driver.timeout = Some(self.scheduler.schedule_once(
            timeout,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.on_timeout(timeout);
                }
            }),
        ));
    }
}

// The driver loop
impl Shared {
    /// Drives the module until it has to wait or is done
    pub(crate) fn run(self: &Arc<Self>) {
        let guard = self.driver.lock();
        loop {
            let flow = {
                let Ok(mut driver) = guard.try_borrow_mut() else {
                    // A step further up this thread's stack picks the work up once it returns
                    self.resync.store(true, Ordering::SeqCst);
                    return;
                };
                let state = self.state();
                if state.is_terminal() {
                    Flow::Halt
                } else {
                    tracing::debug!(module = %self.name, %state, "Running module");
                    match self.step(state, &mut driver) {
                        Ok(flow) => flow,
                        Err(error) => {
                            self.fail(&mut driver, error);
                            Flow::Halt
                        }
                    }
                }
            };

            let expired = self.pending_timeout.lock().take();
            if let Some(timeout) = expired {
                if let Ok(mut driver) = guard.try_borrow_mut() {
                    self.expire(&mut driver, timeout);
                }
            }
            if self.destroy_pending.swap(false, Ordering::SeqCst) {
                self.teardown(&guard);
                return;
            }
            match flow {
                Flow::Continue => continue,
                Flow::Suspend if self.resync.swap(false, Ordering::SeqCst) => continue,
                Flow::Suspend | Flow::Halt => break,
            }
        }

        if self.state() == LifecycleState::Created && self.resync.swap(false, Ordering::SeqCst) {
            let changed = self.exposer.reconcile_all();
            tracing::debug!(module = %self.name, changed, "Reconciled services after creation");
        }
    }

    /// Applies a transition unless the state was changed meanwhile, e.g. by destroy
    fn advance(&self, from: LifecycleState, transition: Transition) -> Flow {
        match transition {
            Transition::Goto(next) => {
                {
                    let mut state = self.state.lock();
                    if *state != from {
                        return Flow::Halt;
                    }
                    *state = next;
                }
                tracing::debug!(module = %self.name, %from, to = %next, "State changed");
                Flow::Continue
            }
            Transition::Suspend => Flow::Suspend,
            Transition::Halt => Flow::Halt,
        }
    }

    fn step(self: &Arc<Self>, state: LifecycleState, driver: &mut Driver) -> Result<Flow, ContainerError> {
        use LifecycleState::*;

        let inputs = Inputs {
            wait_for_dependencies: driver.wait_for_dependencies(),
            lazy_activation: self.lazy_activation,
            ..Inputs::default()
        };
        match state {
            Unknown => self.parse(driver, inputs),
            WaitForNamespaceHandlers => self.populate(driver, inputs),
            Populated => self.build_initial(driver, inputs),
            WaitForInitialReferences | WaitForInitialReferences2 => {
                let inputs = Inputs {
                    dependencies_satisfied: driver.is_satisfied(),
                    ..inputs
                };
                Ok(self.advance(state, state.next(&inputs)))
            }
            InitialReferencesSatisfied => self.rebuild(driver, inputs),
            InitialReferencesSatisfied2 => self.choose_activation(inputs),
            WaitForTrigger => {
                let inputs = Inputs {
                    activation_requested: self.activation_requested.load(Ordering::SeqCst),
                    ..inputs
                };
                Ok(self.advance(state, state.next(&inputs)))
            }
            Create => self.create(driver),
            Created | Failed | Destroyed => Ok(Flow::Halt),
        }
    }

    fn parse(self: &Arc<Self>, driver: &mut Driver, inputs: Inputs) -> Result<Flow, ContainerError> {
        let config = match &self.config_override {
            Some(config) => config.clone(),
            None => ContainerConfig::from_header(&self.header)?,
        };
        tracing::debug!(
            module = %self.name,
            timeout = ?config.timeout,
            wait_for_dependencies = config.wait_for_dependencies,
            "Module directives"
        );
        driver.config = Some(config);

        self.events.send_creating(&self.name);
        let descriptor = self.parser.parse(&self.sources)?;
        driver.namespaces = descriptor.namespaces();
        if !driver.namespaces.is_empty() && driver.namespace_listener.is_none() {
            let listener = Arc::new(NamespaceWatch(Arc::downgrade(self)));
            driver.namespace_listener = Some(self.handlers.add_listener(listener));
        }
        driver.descriptor = Some(descriptor);

        let state = LifecycleState::Unknown;
        Ok(self.advance(state, state.next(&inputs)))
    }

    fn populate(&self, driver: &mut Driver, inputs: Inputs) -> Result<Flow, ContainerError> {
        let state = LifecycleState::WaitForNamespaceHandlers;
        let missing: Vec<String> = driver
            .namespaces
            .iter()
            .filter(|namespace| self.handlers.handler(namespace).is_none())
            .cloned()
            .collect();

        if !missing.is_empty() {
            if !driver.waiting_sent {
                tracing::info!(module = %self.name, ?missing, "Waiting for namespace handlers");
                self.events.send_waiting(&self.name, &missing);
                driver.waiting_sent = true;
            }
            return Ok(self.advance(state, state.next(&inputs)));
        }

        let descriptor = driver
            .descriptor
            .as_ref()
            .ok_or_else(|| ContainerError::IllegalState("The descriptor has not been parsed".to_string()))?;
        let mut registry = ComponentDefinitionRegistry::new();
        descriptor.populate(self.handlers.as_ref(), &mut registry)?;
        tracing::debug!(module = %self.name, components = registry.len(), "Populated registry");
        *self.registry.write() = registry;

        let inputs = Inputs {
            handlers_available: true,
            ..inputs
        };
        Ok(self.advance(state, state.next(&inputs)))
    }

    fn build_generation(&self, bean_processors: Vec<Arc<dyn BeanProcessor>>) -> Arc<Instantiator> {
        let repository = {
            let registry = self.registry.read();
            DependencyGraphBuilder::new(self.host.clone()).build(&registry)
        };
        Arc::new(Instantiator::new(
            Arc::new(repository),
            self.conversions.clone(),
            self.exposer.clone(),
            bean_processors,
        ))
    }

    /// Starts tracking the satisfiables of a repository, returns whether all are satisfied
    fn track(self: &Arc<Self>, driver: &mut Driver, repository: &Repository) -> bool {
        let mut tracker = SatisfiableDependencyTracker::discover(repository);
        tracker.start(Arc::new(DriverListener(Arc::downgrade(self))));
        let satisfied = tracker.is_all_satisfied();
        driver.tracker = Some(tracker);
        satisfied
    }

    fn send_waiting(&self, driver: &Driver) {
        let missing = driver.missing();
        tracing::info!(module = %self.name, ?missing, "Waiting for dependencies");
        self.events.send_waiting(&self.name, &missing);
    }

    fn build_initial(self: &Arc<Self>, driver: &mut Driver, inputs: Inputs) -> Result<Flow, ContainerError> {
        let state = LifecycleState::Populated;
        let generation = self.build_generation(Vec::new());
        DependencyGraph::new(generation.repository()).check()?;

        let satisfied = self.track(driver, generation.repository());
        *self.generation.lock() = Some(generation);
        self.arm_timeout(driver);

        let transition = state.next(&Inputs {
            dependencies_satisfied: satisfied,
            ..inputs
        });
        if transition == Transition::Goto(LifecycleState::WaitForInitialReferences) {
            self.send_waiting(driver);
        }
        Ok(self.advance(state, transition))
    }

    /// Runs the bootstrap components and rebuilds the graph from the processed registry
    fn rebuild(self: &Arc<Self>, driver: &mut Driver, inputs: Inputs) -> Result<Flow, ContainerError> {
        let state = LifecycleState::InitialReferencesSatisfied;
        let current = self.current_generation()?;
        let snapshot = self.registry.read().clone();

        for name in snapshot.type_converters() {
            let instance = current.create(&name)?;
            self.conversions
                .register(as_role::<dyn TypeConverter>(&name, &instance, "TypeConverter")?);
            tracing::debug!(module = %self.name, converter = %name, "Registered type converter");
        }

        let mut bean_processors = Vec::new();
        for bean in snapshot.beans() {
            match bean.role {
                BeanRole::RegistryProcessor => {
                    let instance = current.create(&bean.id)?;
                    let processor =
                        as_role::<dyn RegistryProcessor>(&bean.id, &instance, "RegistryProcessor")?;
                    // Processed on a copy, the processor may read the registry meanwhile
                    let mut registry = self.registry.read().clone();
                    processor
                        .process(&mut registry)
                        .map_err(|error| ContainerError::creation(&bean.id, error))?;
                    *self.registry.write() = registry;
                    tracing::debug!(module = %self.name, processor = %bean.id, "Processed registry");
                }
                BeanRole::BeanProcessor => {
                    let instance = current.create(&bean.id)?;
                    bean_processors.push(as_role::<dyn BeanProcessor>(&bean.id, &instance, "BeanProcessor")?);
                }
                BeanRole::Component | BeanRole::TypeConverter => {}
            }
        }

        let next = self.build_generation(bean_processors);
        DependencyGraph::new(next.repository()).check()?;

        if let Some(mut tracker) = driver.tracker.take() {
            tracker.stop();
        }
        let carried = current.repository().carry_forward(next.repository());
        tracing::debug!(module = %self.name, ?carried, "Carried instances into the rebuilt graph");
        current.repository().destroy();
        *self.generation.lock() = Some(next.clone());

        let satisfied = self.track(driver, next.repository());
        let transition = state.next(&Inputs {
            dependencies_satisfied: satisfied,
            ..inputs
        });
        if transition == Transition::Goto(LifecycleState::WaitForInitialReferences2) {
            self.send_waiting(driver);
        }
        Ok(self.advance(state, transition))
    }

    fn choose_activation(self: &Arc<Self>, inputs: Inputs) -> Result<Flow, ContainerError> {
        let state = LifecycleState::InitialReferencesSatisfied2;
        let transition = state.next(&inputs);

        if transition == Transition::Goto(LifecycleState::WaitForTrigger) {
            let services: Vec<ServiceMetadata> = self
                .registry
                .read()
                .services()
                .filter(|service| service.is_trigger_eligible())
                .cloned()
                .collect();
            for service in &services {
                let proxy = TriggerProxy::new(service, Arc::downgrade(self));
                self.exposer.register_trigger(Arc::new(proxy))?;
            }
            tracing::info!(module = %self.name, triggers = services.len(), "Waiting for activation");
        }
        Ok(self.advance(state, transition))
    }

    fn create(self: &Arc<Self>, driver: &mut Driver) -> Result<Flow, ContainerError> {
        let state = LifecycleState::Create;
        if let Some(timer) = driver.timeout.take() {
            timer.cancel();
        }

        let generation = self.current_generation()?;
        let eager: Vec<String> = self
            .registry
            .read()
            .iter()
            .filter(|component| match component {
                ComponentMetadata::Bean(bean) => !bean.lazy_init && bean.scope == Scope::Singleton,
                ComponentMetadata::Service(_) | ComponentMetadata::Reference(_) => true,
            })
            .map(|component| component.id().to_string())
            .collect();
        generation.create_all(&eager)?;

        if driver.context_registration.is_none() {
            let properties = BTreeMap::from([
                (SYMBOLIC_NAME_PROPERTY.to_string(), self.name.clone()),
                (VERSION_PROPERTY.to_string(), self.version.clone()),
            ]);
            let registration = self.host.publish(Publication {
                capabilities: vec![MODULE_CONTEXT_CAPABILITY.to_string()],
                properties,
                object: Published::Context(ModuleContext::new(self.clone())),
            })?;
            driver.context_registration = Some(registration);
        }

        let flow = self.advance(state, state.next(&Inputs::default()));
        if let Flow::Continue = flow {
            tracing::info!(module = %self.name, "Module created");
            self.events.send_created(&self.name);
        }
        Ok(flow)
    }

    /// Moves to Failed and sends the single failure event
    fn fail(&self, driver: &mut Driver, error: ContainerError) {
        {
            let mut state = self.state.lock();
            if matches!(*state, LifecycleState::Failed | LifecycleState::Destroyed) {
                tracing::debug!(module = %self.name, %error, "Ignoring failure of a stopped module");
                return;
            }
            *state = LifecycleState::Failed;
        }

        tracing::error!(module = %self.name, %error, "Unable to start module");
        if let Some(timer) = driver.timeout.take() {
            timer.cancel();
        }
        if let Some(mut tracker) = driver.tracker.take() {
            tracker.stop();
        }
        self.events.send_failure(&self.name, &error);
    }
}

// External events
impl Shared {
    fn on_timeout(self: &Arc<Self>, timeout: Duration) {
        let guard = self.driver.lock();
        {
            let Ok(mut driver) = guard.try_borrow_mut() else {
                // The step running on this thread fails the module once it returns
                tracing::debug!(module = %self.name, "Timeout fired while the module is driven on this thread");
                *self.pending_timeout.lock() = Some(timeout);
                return;
            };
            self.expire(&mut driver, timeout);
        }
        // Failure listeners may have destroyed the module
        if self.destroy_pending.swap(false, Ordering::SeqCst) {
            self.teardown(&guard);
        }
    }

    fn expire(&self, driver: &mut Driver, timeout: Duration) {
        let state = self.state();
        if state.is_terminal() {
            return;
        }
        // The timer is firing, nothing left to cancel
        driver.timeout = None;
        let error = if state == LifecycleState::WaitForTrigger {
            ContainerError::ActivationTimeout { timeout }
        } else {
            ContainerError::UnsatisfiedDependencyTimeout {
                timeout,
                missing: driver.missing(),
            }
        };
        self.fail(driver, error);
    }

    fn on_satisfaction(self: &Arc<Self>, recipe: &str, satisfied: bool) {
        tracing::debug!(module = %self.name, recipe, satisfied, "Notified satisfaction");

        let Some(guard) = self.driver.try_lock() else {
            // Driven by another thread
            self.submit(|shared| shared.resync());
            return;
        };
        {
            let Ok(driver) = guard.try_borrow() else {
                self.resync.store(true, Ordering::SeqCst);
                return;
            };
            if let Some(tracker) = &driver.tracker {
                tracing::debug!(
                    module = %self.name,
                    components = ?tracker.components_depending_on(recipe),
                    "Components affected by satisfaction change"
                );
            }
        }

        let state = self.state();
        if state.is_waiting_for_references() {
            self.submit_run();
        } else if state == LifecycleState::Created {
            let changed = self.exposer.reconcile_for(recipe);
            tracing::debug!(module = %self.name, recipe, changed, "Reconciled services");
        }
    }

    /// Catches up with satisfaction changes which arrived while another thread drove the module
    fn resync(self: &Arc<Self>) {
        let _guard = self.driver.lock();
        let state = self.state();
        if state.is_waiting_for_references() {
            self.run();
        } else if state == LifecycleState::Created {
            let changed = self.exposer.reconcile_all();
            tracing::debug!(module = %self.name, changed, "Reconciled services");
        }
    }

    pub(crate) fn trigger_activation(self: &Arc<Self>, cause: ActivationCause) -> Result<(), ContainerError> {
        if !self.lazy_activation {
            return Err(ContainerError::IllegalState(
                "Activation can only be triggered for modules with lazy activation".to_string(),
            ));
        }

        let first = !self.activation_requested.swap(true, Ordering::SeqCst);
        if self.state() != LifecycleState::WaitForTrigger {
            if first {
                tracing::debug!(module = %self.name, ?cause, "Activation requested early, remembered");
            }
            return Ok(());
        }

        tracing::debug!(module = %self.name, ?cause, "Activation triggered");
        match cause {
            ActivationCause::ServiceRequest => self.run(),
            ActivationCause::ClassLoad => self.submit_run(),
        }
        Ok(())
    }

    fn uses_namespace(&self, namespace: &str) -> bool {
        let guard = self.driver.lock();
        let uses = guard
            .try_borrow()
            .map(|driver| driver.namespaces.contains(namespace))
            .unwrap_or(false);
        uses
    }

    /// A handler the descriptor needs went away, start over from populating the registry
    fn reset(self: &Arc<Self>, namespace: &str) {
        let guard = self.driver.lock();
        let released = {
            let Ok(mut driver) = guard.try_borrow_mut() else {
                return;
            };
            if !driver.namespaces.contains(namespace) {
                return;
            }
            {
                let mut state = self.state.lock();
                if matches!(
                    *state,
                    LifecycleState::Unknown
                        | LifecycleState::WaitForNamespaceHandlers
                        | LifecycleState::Failed
                        | LifecycleState::Destroyed
                ) {
                    return;
                }
                *state = LifecycleState::WaitForNamespaceHandlers;
            }
            driver.waiting_sent = false;
            // Triggers are published again, only new demand activates the module
            self.activation_requested.store(false, Ordering::SeqCst);
            (
                driver.timeout.take(),
                driver.tracker.take(),
                driver.context_registration.take(),
            )
        };

        tracing::info!(module = %self.name, namespace, "Namespace handler withdrawn, resetting module");
        let (timer, tracker, context_registration) = released;
        if let Some(timer) = timer {
            timer.cancel();
        }
        if let Some(mut tracker) = tracker {
            tracker.stop();
        }
        if let Some(registration) = context_registration {
            registration.unregister();
        }
        self.exposer.unregister_all();
        let generation = self.generation.lock().take();
        if let Some(generation) = generation {
            generation.repository().destroy();
        }
        *self.registry.write() = ComponentDefinitionRegistry::new();
        self.conversions.clear();
        drop(guard);

        self.submit_run();
    }

    pub(crate) fn destroy(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if *state == LifecycleState::Destroyed {
                return;
            }
            *state = LifecycleState::Destroyed;
        }
        tracing::info!(module = %self.name, "Destroying module");

        let guard = self.driver.lock();
        if guard.try_borrow_mut().is_err() {
            // The step running on this thread tears down once it returns
            self.destroy_pending.store(true, Ordering::SeqCst);
            return;
        }
        self.teardown(&guard);
    }

    /// Releases everything, the driver borrow is not held while collaborators are called
    fn teardown(&self, guard: &DriverGuard<'_>) {
        let released = match guard.try_borrow_mut() {
            Ok(mut driver) => std::mem::take(&mut *driver),
            Err(_) => {
                tracing::warn!(module = %self.name, "Teardown requested while the module is borrowed");
                return;
            }
        };

        self.events.send_destroying(&self.name);
        if let Some(timer) = released.timeout {
            timer.cancel();
        }
        if let Some(registration) = released.context_registration {
            registration.unregister();
        }
        if let Some(registration) = released.namespace_listener {
            registration.unregister();
        }
        if let Some(mut tracker) = released.tracker {
            tracker.stop();
        }
        self.exposer.unregister_all();
        let generation = self.generation.lock().take();
        if let Some(generation) = generation {
            generation.repository().destroy();
        }
        self.events.send_destroyed(&self.name);
        tracing::info!(module = %self.name, "Module destroyed");
    }
}

struct DriverListener(Weak<Shared>);
impl SatisfactionListener for DriverListener {
    fn notify_satisfaction(&self, recipe: &str, satisfied: bool) {
        if let Some(shared) = self.0.upgrade() {
            shared.on_satisfaction(recipe, satisfied);
        }
    }
}

struct NamespaceWatch(Weak<Shared>);
impl NamespaceListener for NamespaceWatch {
    fn handler_registered(&self, namespace: &str) {
        let Some(shared) = self.0.upgrade() else {
            return;
        };
        tracing::debug!(module = %shared.name, namespace, "Namespace handler registered");
        let namespace = namespace.to_string();
        shared.submit(move |shared| {
            if shared.uses_namespace(&namespace) {
                shared.run();
            }
        });
    }

    fn handler_unregistered(&self, namespace: &str) {
        let Some(shared) = self.0.upgrade() else {
            return;
        };
        tracing::debug!(module = %shared.name, namespace, "Namespace handler unregistered");
        let namespace = namespace.to_string();
        shared.submit(move |shared| shared.reset(&namespace));
    }
}

/// Container for the components of one module
///
/// Created through [`ModuleContainer::builder`] and started with [`ModuleContainer::start`].
/// All handles refer to the same module.
#[derive(Clone)]
pub struct ModuleContainer(Arc<Shared>);
impl Debug for ModuleContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleContainer")
            .field("module", &self.0.name)
            .field("state", &self.0.state())
            .finish()
    }
}

impl ModuleContainer {
    pub fn builder(host: Arc<dyn ModuleHost>) -> ModuleContainerBuilder {
        ModuleContainerBuilder::new(host)
    }

    pub fn symbolic_name(&self) -> &str {
        &self.0.name
    }

    pub fn state(&self) -> LifecycleState {
        self.0.state()
    }

    /// Submits the driver to the scheduler
    pub fn start(&self) {
        self.0.submit_run();
    }

    /// Requests the activation of a lazily activated module
    ///
    /// A request before the module waits for its trigger is remembered.
    pub fn trigger_activation(&self, cause: ActivationCause) -> Result<(), ContainerError> {
        self.0.trigger_activation(cause)
    }

    /// Tears the module down, may be called at any time and any number of times
    pub fn destroy(&self) {
        self.0.destroy();
    }

    pub fn context(&self) -> ModuleContext {
        ModuleContext::new(self.0.clone())
    }

    /// Services currently registered with the host
    pub fn registered_services(&self) -> Vec<String> {
        self.0.exposer.registered_services()
    }
}

pub struct ModuleContainerBuilder {
    host: Arc<dyn ModuleHost>,
    parser: Option<Arc<dyn MetadataParser>>,
    handlers: Option<Arc<dyn NamespaceHandlerDirectory>>,
    events: Option<Arc<dyn EventSender>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    sources: Vec<String>,
    lazy_activation: bool,
    config: Option<ContainerConfig>,
}
impl ModuleContainerBuilder {
    pub fn new(host: Arc<dyn ModuleHost>) -> Self {
        Self {
            host,
            parser: None,
            handlers: None,
            events: None,
            scheduler: None,
            sources: Vec::new(),
            lazy_activation: false,
            config: None,
        }
    }

    pub fn parser(mut self, parser: Arc<dyn MetadataParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn namespaces(mut self, handlers: Arc<dyn NamespaceHandlerDirectory>) -> Self {
        self.handlers = Some(handlers);
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSender>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Adds a descriptor source handed to the parser
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.sources.push(source.into());
        self
    }

    pub fn lazy_activation(mut self, lazy: bool) -> Self {
        self.lazy_activation = lazy;
        self
    }

    /// Uses this configuration instead of the directives of the symbolic name header
    pub fn config(mut self, config: ContainerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<ModuleContainer, ContainerError> {
        let missing = |what: &str| ContainerError::IllegalState(format!("No {what} configured"));
        let parser = self.parser.ok_or_else(|| missing("descriptor parser"))?;
        let handlers = self.handlers.ok_or_else(|| missing("namespace handler directory"))?;
        let events = self.events.ok_or_else(|| missing("event sender"))?;
        let scheduler = self.scheduler.ok_or_else(|| missing("scheduler"))?;

        let header = self.host.symbolic_name_header();
        let name = match &self.config {
            Some(config) => config.symbolic_name.clone(),
            None => parse_header(&header)
                .ok()
                .and_then(|elements| elements.into_iter().next())
                .map(|element| element.name)
                .unwrap_or_else(|| header.trim().to_string()),
        };

        let shared = Shared {
            name,
            header,
            version: self.host.version(),
            sources: self.sources,
            lazy_activation: self.lazy_activation,
            config_override: self.config,
            exposer: Arc::new(ServiceExposer::new(self.host.clone())),
            host: self.host,
            parser,
            handlers,
            events,
            scheduler,
            conversions: Arc::new(ConversionService::default()),
            registry: RwLock::new(ComponentDefinitionRegistry::new()),
            generation: Mutex::new(None),
            state: Mutex::new(LifecycleState::Unknown),
            driver: ReentrantMutex::new(RefCell::new(Driver::default())),
            resync: AtomicBool::new(false),
            destroy_pending: AtomicBool::new(false),
            activation_requested: AtomicBool::new(false),
            pending_timeout: Mutex::new(None),
        };
        Ok(ModuleContainer(Arc::new(shared)))
    }
}
