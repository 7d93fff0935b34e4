use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::domain::WebhookTopic;

/// Operator-visible lifecycle events. Compliance failures ride this bus so
/// they surface for remediation instead of disappearing into logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeEvent {
    SessionStored {
        shop: String,
        session_id: String,
    },
    SessionsPurged {
        shop: String,
        deleted: usize,
    },
    WebhookHandled {
        topic: WebhookTopic,
        shop: String,
        delivery_id: String,
    },
    WebhookDuplicate {
        topic: WebhookTopic,
        shop: String,
        delivery_id: String,
    },
    WebhookIgnored {
        topic: String,
        shop: String,
        delivery_id: String,
    },
    ComplianceFailure {
        topic: WebhookTopic,
        shop: String,
        delivery_id: String,
        reason: String,
    },
}

pub type EventSender = broadcast::Sender<BridgeEvent>;
pub type EventReceiver = broadcast::Receiver<BridgeEvent>;

/// Broadcast-only bus: publishers never block and carry no request state.
#[derive(Clone, Debug)]
pub struct EventBus {
    global_sender: EventSender,
    shop_senders: Arc<DashMap<String, EventSender>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (global_sender, _) = broadcast::channel(1000);
        Self {
            global_sender,
            shop_senders: Arc::new(DashMap::new()),
        }
    }

    pub fn subscribe_global(&self) -> EventReceiver {
        self.global_sender.subscribe()
    }

    /// Stream scoped to one shop, created on first subscription.
    pub fn subscribe_shop(&self, shop: &str) -> EventReceiver {
        self.shop_senders
            .entry(shop.to_string())
            .or_insert_with(|| broadcast::channel(100).0)
            .subscribe()
    }

    /// Publish to the shop's stream (if anyone is listening) and always to
    /// the global stream.
    pub fn publish(&self, shop: &str, event: BridgeEvent) {
        if let Some(sender) = self.shop_senders.get(shop) {
            let _ = sender.send(event.clone());
        }
        let _ = self.global_sender.send(event);
    }

    pub fn cleanup_shop(&self, shop: &str) {
        self.shop_senders.remove(shop);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shop_subscribers_see_their_events_on_both_streams() {
        let bus = EventBus::new();
        let mut global = bus.subscribe_global();
        let mut shop = bus.subscribe_shop("a.myshop.example");

        bus.publish(
            "a.myshop.example",
            BridgeEvent::SessionStored {
                shop: "a.myshop.example".into(),
                session_id: "offline_a.myshop.example".into(),
            },
        );

        assert!(matches!(global.recv().await.unwrap(), BridgeEvent::SessionStored { .. }));
        assert!(matches!(shop.recv().await.unwrap(), BridgeEvent::SessionStored { .. }));
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_fail() {
        let bus = EventBus::new();
        bus.publish(
            "b.myshop.example",
            BridgeEvent::SessionsPurged {
                shop: "b.myshop.example".into(),
                deleted: 0,
            },
        );
        bus.cleanup_shop("b.myshop.example");
    }
}
