//! In memory collaborators for tests and demos
//!
//! [`MockHost`] keeps publications in a map and tells watchers about every change of presence.
//! [`ManualScheduler`] runs nothing on its own, tests decide when queued work and timers run.

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use parking_lot::Mutex;

use crate::{
    context::ModuleContext,
    errors::{ContainerError, HostError},
    events::ContainerEvent,
    host::{
        CapabilityWatcher, EventSender, MetadataParser, ModuleHost, NamespaceHandler, NamespaceHandlerDirectory,
        NamespaceListener, ParsedDescriptor, Publication, Published, Registration,
    },
    metadata::ComponentMetadata,
    registry::ComponentDefinitionRegistry,
    scheduler::{ScheduledTask, Scheduler, Task},
    types::{DynError, Instance},
};

#[derive(Default)]
struct HostState {
    next_id: u64,
    provided: BTreeMap<String, Instance>,
    published: BTreeMap<u64, Publication>,
    watchers: BTreeMap<u64, (String, Arc<dyn CapabilityWatcher>)>,
}
impl HostState {
    fn id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn is_present(&self, capability: &str) -> bool {
        self.provided.contains_key(capability)
            || self
                .published
                .values()
                .any(|publication| publication.capabilities.iter().any(|c| c == capability))
    }

    fn presence(&self, capabilities: &[String]) -> Vec<bool> {
        capabilities.iter().map(|c| self.is_present(c)).collect()
    }
}

/// A host keeping everything in memory
pub struct MockHost {
    header: String,
    version: String,
    this: Weak<MockHost>,
    state: Mutex<HostState>,
    publishes: AtomicUsize,
    unregisters: AtomicUsize,
    activations: AtomicUsize,
}

impl MockHost {
    pub fn new(header: &str) -> Arc<Self> {
        Self::with_version(header, "1.0.0")
    }

    pub fn with_version(header: &str, version: &str) -> Arc<Self> {
        Arc::new_cyclic(|this| MockHost {
            header: header.to_string(),
            version: version.to_string(),
            this: this.clone(),
            state: Mutex::new(HostState::default()),
            publishes: AtomicUsize::new(0),
            unregisters: AtomicUsize::new(0),
            activations: AtomicUsize::new(0),
        })
    }

    /// Changes the state and notifies the watchers of capabilities whose presence changed
    fn change(&self, capabilities: &[String], apply: impl FnOnce(&mut HostState)) {
        let notify: Vec<(String, bool, Arc<dyn CapabilityWatcher>)> = {
            let mut state = self.state.lock();
            let before = state.presence(capabilities);
            apply(&mut state);
            let after = state.presence(capabilities);

            let mut notify = Vec::new();
            for (index, capability) in capabilities.iter().enumerate() {
                if before[index] == after[index] {
                    continue;
                }
                for (watched, watcher) in state.watchers.values() {
                    if watched == capability {
                        notify.push((capability.clone(), after[index], watcher.clone()));
                    }
                }
            }
            notify
        };

        for (capability, present, watcher) in notify {
            watcher.capability_changed(&capability, present);
        }
    }

    /// Provides a capability from outside of any module
    pub fn provide(&self, capability: &str, instance: Instance) {
        let capabilities = [capability.to_string()];
        self.change(&capabilities, |state| {
            state.provided.insert(capability.to_string(), instance);
        });
    }

    pub fn withdraw(&self, capability: &str) {
        let capabilities = [capability.to_string()];
        self.change(&capabilities, |state| {
            state.provided.remove(capability);
        });
    }

    fn remove_publication(&self, id: u64) {
        let capabilities = {
            let state = self.state.lock();
            match state.published.get(&id) {
                Some(publication) => publication.capabilities.clone(),
                None => return,
            }
        };
        self.change(&capabilities, |state| {
            state.published.remove(&id);
        });
        self.unregisters.fetch_add(1, Ordering::SeqCst);
    }

    fn find(&self, capability: &str) -> Option<Published> {
        let state = self.state.lock();
        if let Some(instance) = state.provided.get(capability) {
            return Some(Published::Instance(instance.clone()));
        }
        state
            .published
            .values()
            .find(|publication| publication.capabilities.iter().any(|c| c == capability))
            .map(|publication| publication.object.clone())
    }

    /// Looks a capability up like a consumer would, surfacing errors of trigger proxies
    pub fn demand(&self, capability: &str) -> Option<Result<Instance, ContainerError>> {
        match self.find(capability)? {
            Published::Instance(instance) => Some(Ok(instance)),
            Published::Trigger(trigger) => Some(trigger.resolve()),
            Published::Context(context) => Some(Ok(Instance::new(context))),
        }
    }

    /// Current publications of a capability
    pub fn publications(&self, capability: &str) -> Vec<Publication> {
        self.state
            .lock()
            .published
            .values()
            .filter(|publication| publication.capabilities.iter().any(|c| c == capability))
            .cloned()
            .collect()
    }

    /// The first published module context
    pub fn context(&self) -> Option<ModuleContext> {
        self.state
            .lock()
            .published
            .values()
            .find_map(|publication| match &publication.object {
                Published::Context(context) => Some(context.clone()),
                _ => None,
            })
    }

    pub fn publish_count(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }

    pub fn unregister_count(&self) -> usize {
        self.unregisters.load(Ordering::SeqCst)
    }

    pub fn activation_count(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }

    pub fn watcher_count(&self) -> usize {
        self.state.lock().watchers.len()
    }
}

impl ModuleHost for MockHost {
    fn symbolic_name_header(&self) -> String {
        self.header.clone()
    }

    fn version(&self) -> String {
        self.version.clone()
    }

    fn activate(&self, _transient: bool) -> Result<(), HostError> {
        self.activations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn publish(&self, publication: Publication) -> Result<Box<dyn Registration>, HostError> {
        let capabilities = publication.capabilities.clone();
        let mut id = 0;
        self.change(&capabilities, |state| {
            id = state.id();
            state.published.insert(id, publication);
        });
        self.publishes.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(?capabilities, id, "Published");

        Ok(Box::new(HostRegistration {
            host: self.this.clone(),
            id,
            kind: RegistrationKind::Publication,
            done: AtomicBool::new(false),
        }))
    }

    fn lookup(&self, capability: &str) -> Option<Instance> {
        match self.demand(capability)? {
            Ok(instance) => Some(instance),
            Err(error) => {
                tracing::debug!(capability, %error, "Lookup failed");
                None
            }
        }
    }

    fn watch(&self, capability: &str, watcher: Arc<dyn CapabilityWatcher>) -> Box<dyn Registration> {
        let (id, present) = {
            let mut state = self.state.lock();
            let id = state.id();
            state
                .watchers
                .insert(id, (capability.to_string(), watcher.clone()));
            (id, state.is_present(capability))
        };
        watcher.capability_changed(capability, present);

        Box::new(HostRegistration {
            host: self.this.clone(),
            id,
            kind: RegistrationKind::Watch,
            done: AtomicBool::new(false),
        })
    }
}

enum RegistrationKind {
    Publication,
    Watch,
}

struct HostRegistration {
    host: Weak<MockHost>,
    id: u64,
    kind: RegistrationKind,
    done: AtomicBool,
}
impl Registration for HostRegistration {
    fn unregister(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(host) = self.host.upgrade() else {
            return;
        };
        match self.kind {
            RegistrationKind::Publication => host.remove_publication(self.id),
            RegistrationKind::Watch => {
                host.state.lock().watchers.remove(&self.id);
            }
        }
    }
}

type Listeners = Arc<Mutex<BTreeMap<u64, Arc<dyn NamespaceListener>>>>;

/// Namespace handlers which can be added and removed at runtime
#[derive(Default)]
pub struct MockNamespaces {
    handlers: Mutex<BTreeMap<String, Arc<dyn NamespaceHandler>>>,
    listeners: Listeners,
    next_id: AtomicU64,
}
impl MockNamespaces {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn listeners(&self) -> Vec<Arc<dyn NamespaceListener>> {
        self.listeners.lock().values().cloned().collect()
    }

    pub fn register(&self, handler: Arc<dyn NamespaceHandler>) {
        let namespace = handler.namespace().to_string();
        self.handlers.lock().insert(namespace.clone(), handler);
        for listener in self.listeners() {
            listener.handler_registered(&namespace);
        }
    }

    pub fn unregister(&self, namespace: &str) {
        let removed = self.handlers.lock().remove(namespace);
        if removed.is_none() {
            return;
        }
        for listener in self.listeners() {
            listener.handler_unregistered(namespace);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}
impl NamespaceHandlerDirectory for MockNamespaces {
    fn handler(&self, namespace: &str) -> Option<Arc<dyn NamespaceHandler>> {
        self.handlers.lock().get(namespace).cloned()
    }

    fn add_listener(&self, listener: Arc<dyn NamespaceListener>) -> Box<dyn Registration> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().insert(id, listener);
        Box::new(ListenerRegistration {
            listeners: self.listeners.clone(),
            id,
        })
    }
}

struct ListenerRegistration {
    listeners: Listeners,
    id: u64,
}
impl Registration for ListenerRegistration {
    fn unregister(&self) {
        self.listeners.lock().remove(&self.id);
    }
}

/// Handler turning known element names into fixed definitions
pub struct StaticHandler {
    namespace: String,
    elements: BTreeMap<String, ComponentMetadata>,
}
impl StaticHandler {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            elements: BTreeMap::new(),
        }
    }

    pub fn element(mut self, name: &str, component: impl Into<ComponentMetadata>) -> Self {
        self.elements.insert(name.to_string(), component.into());
        self
    }
}
impl NamespaceHandler for StaticHandler {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn parse(&self, element: &str, registry: &mut ComponentDefinitionRegistry) -> Result<(), DynError> {
        let component = self
            .elements
            .get(element)
            .ok_or_else(|| format!("Unknown element '{element}' in namespace '{}'", self.namespace))?;
        registry.register(component.clone())?;
        Ok(())
    }
}

/// Parser returning a descriptor assembled in code
///
/// The parser is its own parsed descriptor.
#[derive(Clone, Default)]
pub struct MockParser {
    components: Vec<ComponentMetadata>,
    elements: Vec<(String, String)>,
    type_converters: Vec<String>,
    failure: Option<String>,
}
impl MockParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn component(mut self, component: impl Into<ComponentMetadata>) -> Self {
        self.components.push(component.into());
        self
    }

    /// An element of a custom namespace, parsed by its handler
    pub fn element(mut self, namespace: &str, element: &str) -> Self {
        self.elements.push((namespace.to_string(), element.to_string()));
        self
    }

    pub fn type_converter(mut self, id: &str) -> Self {
        self.type_converters.push(id.to_string());
        self
    }

    /// Parsing fails with a descriptor error
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }
}
impl MetadataParser for MockParser {
    fn parse(&self, sources: &[String]) -> Result<Box<dyn ParsedDescriptor>, ContainerError> {
        if let Some(message) = &self.failure {
            return Err(ContainerError::Descriptor(message.clone()));
        }
        tracing::trace!(?sources, "Parsed descriptor");
        Ok(Box::new(self.clone()))
    }
}
impl ParsedDescriptor for MockParser {
    fn namespaces(&self) -> BTreeSet<String> {
        self.elements
            .iter()
            .map(|(namespace, _)| namespace.clone())
            .collect()
    }

    fn populate(
        &self,
        handlers: &dyn NamespaceHandlerDirectory,
        registry: &mut ComponentDefinitionRegistry,
    ) -> Result<(), ContainerError> {
        for component in &self.components {
            registry.register(component.clone())?;
        }
        for (namespace, element) in &self.elements {
            let handler = handlers
                .handler(namespace)
                .ok_or_else(|| ContainerError::Descriptor(format!("No handler for namespace '{namespace}'")))?;
            handler
                .parse(element, registry)
                .map_err(|error| ContainerError::Descriptor(format!("{namespace}:{element} - {error}")))?;
        }
        for id in &self.type_converters {
            registry.register_type_converter(id.clone());
        }
        Ok(())
    }
}

/// Keeps every event for later assertions
#[derive(Default)]
pub struct RecordingEventSender {
    events: Mutex<Vec<ContainerEvent>>,
}
impl RecordingEventSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ContainerEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, matches: impl Fn(&ContainerEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|event| matches(event)).count()
    }

    fn push(&self, event: ContainerEvent) {
        self.events.lock().push(event);
    }
}
impl EventSender for RecordingEventSender {
    fn send_creating(&self, module: &str) {
        self.push(ContainerEvent::Creating {
            module: module.to_string(),
        });
    }

    fn send_waiting(&self, module: &str, missing: &[String]) {
        self.push(ContainerEvent::Waiting {
            module: module.to_string(),
            missing: missing.to_vec(),
        });
    }

    fn send_failure(&self, module: &str, cause: &ContainerError) {
        self.push(ContainerEvent::Failure {
            module: module.to_string(),
            cause: cause.clone(),
        });
    }

    fn send_created(&self, module: &str) {
        self.push(ContainerEvent::Created {
            module: module.to_string(),
        });
    }

    fn send_destroying(&self, module: &str) {
        self.push(ContainerEvent::Destroying {
            module: module.to_string(),
        });
    }

    fn send_destroyed(&self, module: &str) {
        self.push(ContainerEvent::Destroyed {
            module: module.to_string(),
        });
    }
}

struct Timer {
    due: Duration,
    task: Task,
    cancelled: Arc<AtomicBool>,
}

#[derive(Default)]
struct Clock {
    now: Duration,
    queue: VecDeque<Task>,
    timers: Vec<Timer>,
}

/// Scheduler driven by the test itself
#[derive(Default)]
pub struct ManualScheduler {
    clock: Mutex<Clock>,
}
impl ManualScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Runs queued tasks, including those they submit, until the queue is empty
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = self.clock.lock().queue.pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Moves time forward, fires due timers and runs the queue afterwards
    pub fn advance(&self, by: Duration) -> usize {
        let due: Vec<Timer> = {
            let mut clock = self.clock.lock();
            clock.now += by;
            let now = clock.now;
            let (mut due, waiting): (Vec<Timer>, Vec<Timer>) = std::mem::take(&mut clock.timers)
                .into_iter()
                .filter(|timer| !timer.cancelled.load(Ordering::SeqCst))
                .partition(|timer| timer.due <= now);
            clock.timers = waiting;
            due.sort_by_key(|timer| timer.due);
            due
        };

        let fired = due.len();
        for timer in due {
            if !timer.cancelled.load(Ordering::SeqCst) {
                (timer.task)();
            }
        }
        self.run_pending();
        fired
    }

    /// Number of queued tasks
    pub fn pending(&self) -> usize {
        self.clock.lock().queue.len()
    }

    /// Number of timers neither fired nor cancelled
    pub fn active_timers(&self) -> usize {
        self.clock
            .lock()
            .timers
            .iter()
            .filter(|timer| !timer.cancelled.load(Ordering::SeqCst))
            .count()
    }
}
impl Scheduler for ManualScheduler {
    fn submit(&self, task: Task) {
        self.clock.lock().queue.push_back(task);
    }

    fn schedule_once(&self, delay: Duration, task: Task) -> Box<dyn ScheduledTask> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut clock = self.clock.lock();
        let due = clock.now + delay;
        clock.timers.push(Timer {
            due,
            task,
            cancelled: cancelled.clone(),
        });
        Box::new(ManualTimer(cancelled))
    }
}

struct ManualTimer(Arc<AtomicBool>);
impl ScheduledTask for ManualTimer {
    fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}
