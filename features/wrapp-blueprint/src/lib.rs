//! Wrapp Blueprint runs the component container of a module.
//!
//! A module describes its components in a descriptor: beans created by factories, services published to the
//! host and references to capabilities other modules publish. The container parses the descriptor, waits for
//! namespace handlers and mandatory references, runs bootstrap components, creates everything else and keeps
//! the published services in line with the availability of their references until it is destroyed.
//!
//! # Examples
//!
//! ```rust
//! use std::convert::Infallible;
//!
//! use wrapp_blueprint::{
//!     factories::factory_fn,
//!     metadata::BeanMetadata,
//!     mock::{ManualScheduler, MockHost, MockNamespaces, MockParser, RecordingEventSender},
//!     LifecycleState, ModuleContainer,
//! };
//!
//! struct Greeter(String);
//!
//! let parser = MockParser::new()
//!     .component(BeanMetadata::new(
//!         "greeter",
//!         factory_fn(|_| Ok::<_, Infallible>(Greeter("hello".to_string()))),
//!     ))
//!     .build();
//! let scheduler = ManualScheduler::new();
//!
//! let container = ModuleContainer::builder(MockHost::new("com.acme.greeter"))
//!     .parser(parser)
//!     .namespaces(MockNamespaces::new())
//!     .events(RecordingEventSender::new())
//!     .scheduler(scheduler.clone())
//!     .build()
//!     .unwrap();
//!
//! container.start();
//! scheduler.run_pending();
//!
//! assert_eq!(container.state(), LifecycleState::Created);
//! let greeter = container.context().get_component_as::<Greeter>("greeter").unwrap();
//! assert_eq!(greeter.0, "hello");
//! container.destroy();
//! ```
//!
//! Wrapp Blueprint consists of the following components:
//!
//! 1. Metadata and registry - component definitions as the descriptor declares them
//! 2. Repository and instantiator - recipes built from the definitions and the instances created from them
//! 3. Satisfiables and exposer - tracking references and (un)publishing services accordingly
//! 4. Lifecycle - the state machine driving a module from its descriptor to created components
//! 5. Host - the traits a module system implements to run containers

pub mod builder;
pub mod context;
pub mod dependency_graph;
pub mod errors;
pub mod events;
pub mod exposer;
pub mod factories;
pub mod host;
pub mod instantiator;
pub mod lifecycle;
pub mod metadata;
pub mod mock;
pub mod processors;
pub mod recipe;
pub mod reference;
pub mod registry;
pub mod repository;
pub mod satisfiable;
pub mod scheduler;
pub mod state;
pub mod types;

pub use context::ModuleContext;
pub use errors::ContainerError;
pub use lifecycle::{ActivationCause, ModuleContainer, ModuleContainerBuilder};
pub use state::LifecycleState;
pub use types::{DynError, Injectable, Instance, TypeInfo};
