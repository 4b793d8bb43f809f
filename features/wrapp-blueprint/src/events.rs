use futures_channel::mpsc;

use crate::{errors::ContainerError, host::EventSender};

/// A lifecycle notification as delivered by [`ChannelEventSender`]
#[derive(Debug, Clone)]
pub enum ContainerEvent {
    Creating { module: String },
    Waiting { module: String, missing: Vec<String> },
    Failure { module: String, cause: ContainerError },
    Created { module: String },
    Destroying { module: String },
    Destroyed { module: String },
}
impl ContainerEvent {
    pub fn module(&self) -> &str {
        match self {
            ContainerEvent::Creating { module }
            | ContainerEvent::Waiting { module, .. }
            | ContainerEvent::Failure { module, .. }
            | ContainerEvent::Created { module }
            | ContainerEvent::Destroying { module }
            | ContainerEvent::Destroyed { module } => module,
        }
    }
}

/// Forwards events into an unbounded channel, sending never blocks
#[derive(Clone)]
pub struct ChannelEventSender {
    tx: mpsc::UnboundedSender<ContainerEvent>,
}

/// Creates a sender and the stream of its events
pub fn event_channel() -> (ChannelEventSender, mpsc::UnboundedReceiver<ContainerEvent>) {
    let (tx, rx) = mpsc::unbounded();
    (ChannelEventSender { tx }, rx)
}

impl ChannelEventSender {
    fn send(&self, event: ContainerEvent) {
        if let Err(error) = self.tx.unbounded_send(event) {
            tracing::debug!(event = ?error.into_inner(), "Event receiver is gone");
        }
    }
}
impl EventSender for ChannelEventSender {
    fn send_creating(&self, module: &str) {
        self.send(ContainerEvent::Creating {
            module: module.to_string(),
        });
    }

    fn send_waiting(&self, module: &str, missing: &[String]) {
        self.send(ContainerEvent::Waiting {
            module: module.to_string(),
            missing: missing.to_vec(),
        });
    }

    fn send_failure(&self, module: &str, cause: &ContainerError) {
        self.send(ContainerEvent::Failure {
            module: module.to_string(),
            cause: cause.clone(),
        });
    }

    fn send_created(&self, module: &str) {
        self.send(ContainerEvent::Created {
            module: module.to_string(),
        });
    }

    fn send_destroying(&self, module: &str) {
        self.send(ContainerEvent::Destroying {
            module: module.to_string(),
        });
    }

    fn send_destroyed(&self, module: &str) {
        self.send(ContainerEvent::Destroyed {
            module: module.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn events_arrive_in_order() {
        let (sender, mut rx) = event_channel();
        sender.send_creating("orders");
        sender.send_waiting("orders", &["storage.Database".to_string()]);
        sender.send_failure("orders", &ContainerError::IllegalState("boom".to_string()));
        drop(sender);

        assert!(matches!(rx.next().await, Some(ContainerEvent::Creating { .. })));
        match rx.next().await {
            Some(ContainerEvent::Waiting { module, missing }) => {
                assert_eq!(module, "orders");
                assert_eq!(missing, vec!["storage.Database"]);
            }
            other => panic!("unexpected {other:?}"),
        }
        let failure = rx.next().await.unwrap();
        assert_eq!(failure.module(), "orders");
        assert!(rx.next().await.is_none());
    }

    #[test]
    fn sending_without_receiver_is_silent() {
        let (sender, rx) = event_channel();
        drop(rx);
        sender.send_destroyed("orders");
    }
}
