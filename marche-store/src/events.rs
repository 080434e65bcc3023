use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info};
use marche_order::{EventPublisher, RepositoryError};
use marche_shared::OrderEvent;

/// In-process fan-out of order events to any number of subscribers.
#[derive(Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<OrderEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receives events published after this call. Slow subscribers that fall
    /// more than `capacity` events behind get `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: &OrderEvent) -> Result<(), RepositoryError> {
        match self.sender.send(event.clone()) {
            Ok(receivers) => {
                info!("Sent event to {}/{}: {} subscriber(s)", event.topic(), event.order_id, receivers);
            }
            // Nobody listening is not a failure
            Err(_) => debug!("No subscribers for {}/{}", event.topic(), event.order_id),
        }
        Ok(())
    }
}
