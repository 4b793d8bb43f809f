#![allow(dead_code)]

use std::sync::Arc;

use wrapp_blueprint::{
    events::ContainerEvent,
    mock::{ManualScheduler, MockHost, MockNamespaces, MockParser, RecordingEventSender},
    ModuleContainer, ModuleContainerBuilder,
};

/// Mock collaborators of one module, the scheduler only runs when told to
pub struct Fixture {
    pub host: Arc<MockHost>,
    pub namespaces: Arc<MockNamespaces>,
    pub events: Arc<RecordingEventSender>,
    pub scheduler: Arc<ManualScheduler>,
}

impl Fixture {
    pub fn new(header: &str) -> Self {
        Self {
            host: MockHost::new(header),
            namespaces: MockNamespaces::new(),
            events: RecordingEventSender::new(),
            scheduler: ManualScheduler::new(),
        }
    }

    pub fn container(&self, parser: MockParser) -> ModuleContainer {
        self.build(parser, false)
    }

    pub fn lazy_container(&self, parser: MockParser) -> ModuleContainer {
        self.build(parser, true)
    }

    fn build(&self, parser: MockParser, lazy: bool) -> ModuleContainer {
        self.builder(parser)
            .lazy_activation(lazy)
            .build()
            .expect("All collaborators are set")
    }

    /// Builder wired to the mocks, for tests which replace one of them
    pub fn builder(&self, parser: MockParser) -> ModuleContainerBuilder {
        ModuleContainer::builder(self.host.clone())
            .parser(parser.build())
            .namespaces(self.namespaces.clone())
            .events(self.events.clone())
            .scheduler(self.scheduler.clone())
            .source("OSGI-INF/blueprint/module.xml")
    }

    /// Starts the container and runs until it has to wait
    pub fn start(&self, container: &ModuleContainer) {
        container.start();
        self.scheduler.run_pending();
    }

    pub fn waiting(&self) -> usize {
        self.events
            .count(|event| matches!(event, ContainerEvent::Waiting { .. }))
    }

    pub fn created(&self) -> usize {
        self.events
            .count(|event| matches!(event, ContainerEvent::Created { .. }))
    }

    pub fn failures(&self) -> usize {
        self.events
            .count(|event| matches!(event, ContainerEvent::Failure { .. }))
    }

    pub fn destroyed(&self) -> (usize, usize) {
        (
            self.events
                .count(|event| matches!(event, ContainerEvent::Destroying { .. })),
            self.events
                .count(|event| matches!(event, ContainerEvent::Destroyed { .. })),
        )
    }

    pub fn last_failure(&self) -> Option<wrapp_blueprint::ContainerError> {
        self.events.events().into_iter().rev().find_map(|event| match event {
            ContainerEvent::Failure { cause, .. } => Some(cause),
            _ => None,
        })
    }
}
