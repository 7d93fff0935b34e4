use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    domain::{WebhookEnvelope, WebhookTopic},
    utils::errors::Result,
};

/// Per-topic processing callback. One invocation per claimed delivery; the
/// dispatcher supplies the idempotency, not the handler.
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    async fn handle(&self, envelope: &WebhookEnvelope) -> Result<()>;
}

/// How the platform delivers the topic. Informational; everything is plain
/// HTTP today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMethod {
    Http,
}

pub struct HandlerDescriptor {
    pub topic: WebhookTopic,
    pub delivery_method: DeliveryMethod,
    handler: Arc<dyn WebhookHandler>,
}

impl HandlerDescriptor {
    pub fn new(topic: WebhookTopic, handler: Arc<dyn WebhookHandler>) -> Self {
        Self {
            topic,
            delivery_method: DeliveryMethod::Http,
            handler,
        }
    }

    pub async fn invoke(&self, envelope: &WebhookEnvelope) -> Result<()> {
        self.handler.handle(envelope).await
    }
}

/// Immutable topic→handler table. Built once at process start and shared by
/// reference, so dispatch needs no synchronization.
pub struct WebhookRegistry {
    entries: HashMap<WebhookTopic, HandlerDescriptor>,
}

impl WebhookRegistry {
    pub fn builder() -> WebhookRegistryBuilder {
        WebhookRegistryBuilder {
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, topic: WebhookTopic) -> Option<&HandlerDescriptor> {
        self.entries.get(&topic)
    }

    pub fn topics(&self) -> impl Iterator<Item = WebhookTopic> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct WebhookRegistryBuilder {
    entries: HashMap<WebhookTopic, HandlerDescriptor>,
}

impl WebhookRegistryBuilder {
    pub fn register(mut self, topic: WebhookTopic, handler: Arc<dyn WebhookHandler>) -> Self {
        self.entries.insert(topic, HandlerDescriptor::new(topic, handler));
        self
    }

    pub fn build(self) -> WebhookRegistry {
        WebhookRegistry {
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nop;

    #[async_trait]
    impl WebhookHandler for Nop {
        async fn handle(&self, _envelope: &WebhookEnvelope) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn lookup_finds_registered_topics_only() {
        let registry = WebhookRegistry::builder()
            .register(WebhookTopic::OrdersCreate, Arc::new(Nop))
            .build();

        assert_eq!(registry.len(), 1);
        let descriptor = registry.get(WebhookTopic::OrdersCreate).unwrap();
        assert_eq!(descriptor.topic, WebhookTopic::OrdersCreate);
        assert_eq!(descriptor.delivery_method, DeliveryMethod::Http);
        assert!(registry.get(WebhookTopic::ShopRedact).is_none());
        assert!(registry.get(WebhookTopic::Unknown).is_none());
    }
}
