//! Handlers for the subscribed webhook topics.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    domain::{WebhookEnvelope, WebhookTopic},
    events::{BridgeEvent, EventBus},
    services::{
        session_store::SessionStore,
        webhook_registry::{WebhookHandler, WebhookRegistry},
    },
    storage::KvStore,
    utils::errors::Result,
};

/// Numeric entity id from a payload, if the payload has one.
fn payload_id(envelope: &WebhookEnvelope) -> Option<i64> {
    envelope.body_json().ok()?.get("id")?.as_i64()
}

/// `products/create`: downstream cache/analytics refresh hook.
pub struct ProductsCreateHandler;

#[async_trait]
impl WebhookHandler for ProductsCreateHandler {
    async fn handle(&self, envelope: &WebhookEnvelope) -> Result<()> {
        tracing::info!(
            shop = %envelope.shop,
            product_id = ?payload_id(envelope),
            "Product created"
        );
        Ok(())
    }
}

/// `orders/create`: downstream order-intake hook.
pub struct OrdersCreateHandler;

#[async_trait]
impl WebhookHandler for OrdersCreateHandler {
    async fn handle(&self, envelope: &WebhookEnvelope) -> Result<()> {
        tracing::info!(
            shop = %envelope.shop,
            order_id = ?payload_id(envelope),
            "Order created"
        );
        Ok(())
    }
}

/// `customers/data_request`: queue a durable export ticket. The export runs
/// out of band within the platform's compliance SLA; the ticket is what
/// guarantees the request survives until it does.
pub struct CustomersDataRequestHandler {
    kv: Arc<dyn KvStore>,
    ticket_ttl: Duration,
}

impl CustomersDataRequestHandler {
    pub fn new(kv: Arc<dyn KvStore>, ticket_ttl: Duration) -> Self {
        Self { kv, ticket_ttl }
    }
}

#[async_trait]
impl WebhookHandler for CustomersDataRequestHandler {
    async fn handle(&self, envelope: &WebhookEnvelope) -> Result<()> {
        let ticket_id = Uuid::new_v4();
        let ticket = serde_json::json!({
            "ticketId": ticket_id,
            "shop": envelope.shop,
            "deliveryId": envelope.delivery_id,
            "payload": envelope.body_json().unwrap_or(serde_json::Value::Null),
            "requestedAt": chrono::Utc::now(),
        });
        self.kv
            .set(
                &format!("compliance_export:{}", envelope.delivery_id),
                &ticket.to_string(),
                self.ticket_ttl,
            )
            .await?;
        tracing::info!(shop = %envelope.shop, ticket_id = %ticket_id, "Customer data export queued");
        Ok(())
    }
}

/// `customers/redact`: the service stores no per-customer records, so the
/// erasure is immediately satisfiable; a durable receipt is kept for audit.
pub struct CustomersRedactHandler {
    kv: Arc<dyn KvStore>,
    ticket_ttl: Duration,
}

impl CustomersRedactHandler {
    pub fn new(kv: Arc<dyn KvStore>, ticket_ttl: Duration) -> Self {
        Self { kv, ticket_ttl }
    }
}

#[async_trait]
impl WebhookHandler for CustomersRedactHandler {
    async fn handle(&self, envelope: &WebhookEnvelope) -> Result<()> {
        let receipt = serde_json::json!({
            "shop": envelope.shop,
            "deliveryId": envelope.delivery_id,
            "payload": envelope.body_json().unwrap_or(serde_json::Value::Null),
            "redactedAt": chrono::Utc::now(),
        });
        self.kv
            .set(
                &format!("compliance_redact:{}", envelope.delivery_id),
                &receipt.to_string(),
                self.ticket_ttl,
            )
            .await?;
        tracing::info!(shop = %envelope.shop, "Customer redaction recorded");
        Ok(())
    }
}

/// `shop/redact`: erase everything stored for the shop — every session the
/// index knows about, then the index itself.
pub struct ShopRedactHandler {
    sessions: Arc<SessionStore>,
    events: EventBus,
}

impl ShopRedactHandler {
    pub fn new(sessions: Arc<SessionStore>, events: EventBus) -> Self {
        Self { sessions, events }
    }
}

#[async_trait]
impl WebhookHandler for ShopRedactHandler {
    async fn handle(&self, envelope: &WebhookEnvelope) -> Result<()> {
        let deleted = self.sessions.delete_for_shop(&envelope.shop).await?;
        self.events.publish(
            &envelope.shop,
            BridgeEvent::SessionsPurged {
                shop: envelope.shop.clone(),
                deleted,
            },
        );
        tracing::info!(shop = %envelope.shop, deleted, "Shop data redacted");
        Ok(())
    }
}

/// Registry wired with the handler for every subscribed topic.
pub fn default_registry(
    sessions: Arc<SessionStore>,
    kv: Arc<dyn KvStore>,
    events: EventBus,
    ticket_ttl: Duration,
) -> WebhookRegistry {
    WebhookRegistry::builder()
        .register(WebhookTopic::ProductsCreate, Arc::new(ProductsCreateHandler))
        .register(WebhookTopic::OrdersCreate, Arc::new(OrdersCreateHandler))
        .register(
            WebhookTopic::CustomersDataRequest,
            Arc::new(CustomersDataRequestHandler::new(kv.clone(), ticket_ttl)),
        )
        .register(
            WebhookTopic::CustomersRedact,
            Arc::new(CustomersRedactHandler::new(kv, ticket_ttl)),
        )
        .register(
            WebhookTopic::ShopRedact,
            Arc::new(ShopRedactHandler::new(sessions, events)),
        )
        .build()
}
