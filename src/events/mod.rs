use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::ParcelState;

/// Domain events emitted by the lifecycle engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    LeadCaptured {
        lead_id: Uuid,
        created: bool,
    },
    LeadConverted {
        lead_id: Uuid,
        order_id: Uuid,
    },
    OrderCreated {
        order_id: Uuid,
        order_number: String,
    },
    ParcelCreated {
        order_id: Uuid,
        consignment_id: String,
        recreated: bool,
    },
    ParcelStatusChanged {
        order_id: Uuid,
        old_status: ParcelState,
        new_status: ParcelState,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a bounded channel and returns both halves.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Best-effort publish that never waits; drops and logs when the channel is full or closed.
    pub fn publish(&self, event: Event) {
        if let Err(err) = self.sender.try_send(event) {
            warn!("Dropping domain event: {}", err);
        }
    }
}

/// Drains the event channel, logging each event. Runs until every sender is dropped.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated {
                order_id,
                order_number,
            } => info!(%order_id, order_number = %order_number, "order created"),
            Event::ParcelStatusChanged {
                order_id,
                old_status,
                new_status,
            } => info!(%order_id, %old_status, %new_status, "parcel status changed"),
            other => info!(event = ?other, "domain event"),
        }
    }
    info!("Event channel closed; event processor exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_drops_when_channel_is_full() {
        let (sender, mut rx) = EventSender::channel(1);
        let order_id = Uuid::new_v4();
        sender.publish(Event::OrderCreated {
            order_id,
            order_number: "A1".into(),
        });
        sender.publish(Event::OrderCreated {
            order_id,
            order_number: "A2".into(),
        });

        let first = rx.recv().await.unwrap();
        assert_eq!(
            first,
            Event::OrderCreated {
                order_id,
                order_number: "A1".into()
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_after_receiver_is_gone_does_not_panic() {
        let (sender, rx) = EventSender::channel(4);
        drop(rx);
        sender.publish(Event::LeadCaptured {
            lead_id: Uuid::new_v4(),
            created: true,
        });
    }
}
