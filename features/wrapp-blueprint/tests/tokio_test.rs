use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use wrapp_blueprint::{
    events::{event_channel, ContainerEvent},
    metadata::ReferenceMetadata,
    mock::{MockHost, MockNamespaces, MockParser},
    scheduler::TokioScheduler,
    ContainerError, Instance, LifecycleState, ModuleContainer,
};

fn container(host: Arc<MockHost>) -> (ModuleContainer, futures_channel::mpsc::UnboundedReceiver<ContainerEvent>) {
    let (events, rx) = event_channel();
    let container = ModuleContainer::builder(host)
        .parser(
            MockParser::new()
                .component(ReferenceMetadata::new("db", "storage.Database"))
                .build(),
        )
        .namespaces(MockNamespaces::new())
        .events(Arc::new(events))
        .scheduler(Arc::new(TokioScheduler::current()))
        .build()
        .expect("All collaborators are set");
    (container, rx)
}

async fn next_event(rx: &mut futures_channel::mpsc::UnboundedReceiver<ContainerEvent>) -> ContainerEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.next())
        .await
        .expect("Event in time")
        .expect("Channel open")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn times_out_on_the_runtime() {
    let host = MockHost::new("com.acme.orders; timeout-milliseconds:=50");
    let (container, mut rx) = container(host);
    container.start();

    assert!(matches!(next_event(&mut rx).await, ContainerEvent::Creating { .. }));
    assert!(matches!(next_event(&mut rx).await, ContainerEvent::Waiting { .. }));
    match next_event(&mut rx).await {
        ContainerEvent::Failure {
            cause: ContainerError::UnsatisfiedDependencyTimeout { missing, .. },
            ..
        } => assert_eq!(missing, vec!["storage.Database"]),
        other => panic!("Unexpected event {other:?}"),
    }
    assert_eq!(container.state(), LifecycleState::Failed);

    container.destroy();
    assert!(matches!(next_event(&mut rx).await, ContainerEvent::Destroying { .. }));
    assert!(matches!(next_event(&mut rx).await, ContainerEvent::Destroyed { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resumes_on_the_runtime_when_satisfied() {
    let host = MockHost::new("com.acme.orders; timeout-milliseconds:=5000");
    let (container, mut rx) = container(host.clone());
    container.start();

    assert!(matches!(next_event(&mut rx).await, ContainerEvent::Creating { .. }));
    assert!(matches!(next_event(&mut rx).await, ContainerEvent::Waiting { .. }));

    host.provide("storage.Database", Instance::new(42u32));
    assert!(matches!(next_event(&mut rx).await, ContainerEvent::Created { .. }));
    assert_eq!(container.state(), LifecycleState::Created);

    container.destroy();
    assert!(matches!(next_event(&mut rx).await, ContainerEvent::Destroying { .. }));
}
