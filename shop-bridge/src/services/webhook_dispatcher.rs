use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::{
    config::WebhookConfig,
    domain::{TopicCategory, WebhookEnvelope},
    events::{BridgeEvent, EventBus},
    services::{delivery_log::DeliveryLog, webhook_registry::WebhookRegistry},
    storage::KvStore,
    utils::errors::{Result, ShopBridgeError},
};

const COMPLIANCE_FAILURE_PREFIX: &str = "compliance_failure:";

// Bound on dedup-store and failure-record calls; a stalled backend must not
// pin the delivery request.
const DEDUP_OP_TIMEOUT: Duration = Duration::from_secs(2);

/// Terminal state of one inbound delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handler ran (or a compliance failure was durably recorded);
    /// acknowledge.
    Handled,
    /// Delivery id already claimed; acknowledged without re-running side
    /// effects.
    Duplicate,
    /// No handler for the topic; acknowledged so the platform does not
    /// redeliver forever.
    Ignored,
    /// Transient failure; answer with a retryable status and let the
    /// platform's redelivery schedule drive the retry.
    Retry,
}

impl DispatchOutcome {
    pub fn is_acknowledged(&self) -> bool {
        !matches!(self, Self::Retry)
    }
}

/// Drives an authenticated envelope through dedup, routing and handling.
/// Stages: received → deduplicated → routed → handled → acknowledged, with
/// a failure exit at each stage folding into the outcome.
pub struct WebhookDispatcher {
    registry: Arc<WebhookRegistry>,
    deliveries: DeliveryLog,
    kv: Arc<dyn KvStore>,
    events: EventBus,
    handler_timeout: Duration,
    compliance_record_ttl: Duration,
}

impl WebhookDispatcher {
    pub fn new(
        registry: Arc<WebhookRegistry>,
        kv: Arc<dyn KvStore>,
        events: EventBus,
        config: &WebhookConfig,
    ) -> Self {
        Self {
            registry,
            deliveries: DeliveryLog::new(kv.clone(), config.dedup_retention()),
            kv,
            events,
            handler_timeout: config.handler_timeout(),
            compliance_record_ttl: config.compliance_record_ttl(),
        }
    }

    async fn bounded<T>(&self, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        match timeout(DEDUP_OP_TIMEOUT, fut).await {
            Ok(result) => result,
            Err(_) => Err(ShopBridgeError::Timeout {
                operation: "dedup store",
            }),
        }
    }

    /// This never errors: the HTTP layer has to answer the platform either
    /// way, so every failure becomes part of the outcome.
    pub async fn dispatch(&self, envelope: &WebhookEnvelope) -> DispatchOutcome {
        // At-least-once delivery means the same id may arrive again, or
        // concurrently; only the first claim runs the handler. When the dedup
        // store itself is down we fail open: processing twice beats dropping
        // a delivery.
        match self.bounded(self.deliveries.claim(&envelope.delivery_id)).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(
                    delivery_id = %envelope.delivery_id,
                    topic = %envelope.topic,
                    "Duplicate delivery short-circuited"
                );
                self.events.publish(
                    &envelope.shop,
                    BridgeEvent::WebhookDuplicate {
                        topic: envelope.topic,
                        shop: envelope.shop.clone(),
                        delivery_id: envelope.delivery_id.clone(),
                    },
                );
                return DispatchOutcome::Duplicate;
            }
            Err(e) => {
                tracing::warn!(
                    delivery_id = %envelope.delivery_id,
                    error = %e,
                    "Dedup store unavailable, processing without idempotency guarantee"
                );
            }
        }

        let Some(descriptor) = self.registry.get(envelope.topic) else {
            tracing::info!(
                topic = %envelope.raw_topic,
                delivery_id = %envelope.delivery_id,
                "No handler registered for topic, acknowledging"
            );
            self.events.publish(
                &envelope.shop,
                BridgeEvent::WebhookIgnored {
                    topic: envelope.raw_topic.clone(),
                    shop: envelope.shop.clone(),
                    delivery_id: envelope.delivery_id.clone(),
                },
            );
            return DispatchOutcome::Ignored;
        };

        let result = match timeout(self.handler_timeout, descriptor.invoke(envelope)).await {
            Ok(result) => result,
            Err(_) => Err(ShopBridgeError::Timeout {
                operation: "webhook handler",
            }),
        };

        match result {
            Ok(()) => {
                tracing::info!(
                    topic = %envelope.topic,
                    shop = %envelope.shop,
                    delivery_id = %envelope.delivery_id,
                    "Webhook handled"
                );
                self.events.publish(
                    &envelope.shop,
                    BridgeEvent::WebhookHandled {
                        topic: envelope.topic,
                        shop: envelope.shop.clone(),
                        delivery_id: envelope.delivery_id.clone(),
                    },
                );
                DispatchOutcome::Handled
            }
            Err(error) => self.handle_failure(envelope, error).await,
        }
    }

    async fn handle_failure(
        &self,
        envelope: &WebhookEnvelope,
        error: ShopBridgeError,
    ) -> DispatchOutcome {
        if error.is_transient() {
            tracing::warn!(
                topic = %envelope.topic,
                delivery_id = %envelope.delivery_id,
                error = %error,
                "Transient handler failure, requesting redelivery"
            );
            self.release_claim(envelope).await;
            return DispatchOutcome::Retry;
        }

        match envelope.topic.category() {
            TopicCategory::Compliance => {
                // Legal obligation: the failure itself must survive the
                // process so an operator can remediate. Only once it is on
                // durable record is it safe to acknowledge and stop the
                // platform's redelivery.
                tracing::error!(
                    topic = %envelope.topic,
                    shop = %envelope.shop,
                    delivery_id = %envelope.delivery_id,
                    error = %error,
                    "Compliance handler failed"
                );
                match self.record_compliance_failure(envelope, &error).await {
                    Ok(()) => {
                        self.events.publish(
                            &envelope.shop,
                            BridgeEvent::ComplianceFailure {
                                topic: envelope.topic,
                                shop: envelope.shop.clone(),
                                delivery_id: envelope.delivery_id.clone(),
                                reason: error.to_string(),
                            },
                        );
                        DispatchOutcome::Handled
                    }
                    Err(record_err) => {
                        tracing::error!(
                            delivery_id = %envelope.delivery_id,
                            error = %record_err,
                            "Could not record compliance failure, requesting redelivery"
                        );
                        self.release_claim(envelope).await;
                        DispatchOutcome::Retry
                    }
                }
            }
            TopicCategory::Domain => {
                // Permanent failure: redelivery would fail the same way.
                tracing::error!(
                    topic = %envelope.topic,
                    delivery_id = %envelope.delivery_id,
                    error = %error,
                    "Handler failed permanently, acknowledging"
                );
                DispatchOutcome::Handled
            }
        }
    }

    async fn release_claim(&self, envelope: &WebhookEnvelope) {
        if let Err(e) = self.bounded(self.deliveries.release(&envelope.delivery_id)).await {
            tracing::warn!(
                delivery_id = %envelope.delivery_id,
                error = %e,
                "Failed to release delivery claim"
            );
        }
    }

    async fn record_compliance_failure(
        &self,
        envelope: &WebhookEnvelope,
        error: &ShopBridgeError,
    ) -> Result<()> {
        let record = serde_json::json!({
            "topic": envelope.topic.as_str(),
            "shop": envelope.shop,
            "deliveryId": envelope.delivery_id,
            "reason": error.to_string(),
            "failedAt": chrono::Utc::now(),
        });
        self.bounded(self.kv.set(
            &format!("{COMPLIANCE_FAILURE_PREFIX}{}", envelope.delivery_id),
            &record.to_string(),
            self.compliance_record_ttl,
        ))
        .await
    }
}
