use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use wrapp_blueprint::{
    events::event_channel,
    factories::factory_fn,
    metadata::{BeanMetadata, ReferenceMetadata, ServiceMetadata},
    mock::{MockHost, MockNamespaces, MockParser},
    reference::ServiceReference,
    scheduler::TokioScheduler,
    DynError, Instance, LifecycleState, ModuleContainer,
};

struct Database {
    url: String,
}

struct OrderRepository {
    db: Arc<ServiceReference>,
}

/// Logs are controlled through `RUST_LOG`, e.g. `RUST_LOG=wrapp_blueprint=debug`
fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), DynError> {
    setup_tracing();

    let host = MockHost::new("com.acme.orders; version=1.0; timeout-milliseconds:=5000");
    let parser = MockParser::new()
        .component(ReferenceMetadata::new("db", "storage.Database"))
        .component(
            BeanMetadata::new(
                "repository",
                factory_fn(|args| {
                    let db = args.get::<ServiceReference>("db")?;
                    Ok::<_, DynError>(OrderRepository { db })
                }),
            )
            .arg_ref("db"),
        )
        .component(ServiceMetadata::new("orders", "repository").capability("orders.Api"))
        .build();

    let (events, mut rx) = event_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.next().await {
            println!("event: {event:?}");
        }
    });

    let container = ModuleContainer::builder(host.clone())
        .parser(parser)
        .namespaces(MockNamespaces::new())
        .events(Arc::new(events))
        .scheduler(Arc::new(TokioScheduler::current()))
        .build()?;
    container.start();

    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("before the database shows up: {}", container.state());

    host.provide(
        "storage.Database",
        Instance::new(Database {
            url: "postgres://localhost/orders".to_string(),
        }),
    );
    while container.state() != LifecycleState::Created {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let repository = container
        .context()
        .get_component_as::<OrderRepository>("repository")?;
    if let Some(db) = repository.db.get_as::<Database>() {
        println!("repository uses {}", db.url);
    }
    println!("registered services: {:?}", container.registered_services());

    container.destroy();
    drop(container);
    tokio::time::sleep(Duration::from_millis(50)).await;
    printer.abort();
    Ok(())
}
