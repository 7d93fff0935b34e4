use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::errors::Result;

/// Webhook topics this app subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookTopic {
    #[serde(rename = "products/create")]
    ProductsCreate,
    #[serde(rename = "orders/create")]
    OrdersCreate,
    #[serde(rename = "customers/data_request")]
    CustomersDataRequest,
    #[serde(rename = "customers/redact")]
    CustomersRedact,
    #[serde(rename = "shop/redact")]
    ShopRedact,
    // Catch-all for topics the registry has no handler for
    #[serde(other)]
    Unknown,
}

impl WebhookTopic {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "products/create" => Self::ProductsCreate,
            "orders/create" => Self::OrdersCreate,
            "customers/data_request" => Self::CustomersDataRequest,
            "customers/redact" => Self::CustomersRedact,
            "shop/redact" => Self::ShopRedact,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProductsCreate => "products/create",
            Self::OrdersCreate => "orders/create",
            Self::CustomersDataRequest => "customers/data_request",
            Self::CustomersRedact => "customers/redact",
            Self::ShopRedact => "shop/redact",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Compliance topics carry a legal handling obligation; their handlers
    /// must complete or durably queue the effect before the delivery is
    /// acknowledged.
    pub fn category(&self) -> TopicCategory {
        match self {
            Self::CustomersDataRequest | Self::CustomersRedact | Self::ShopRedact => {
                TopicCategory::Compliance
            }
            _ => TopicCategory::Domain,
        }
    }
}

impl fmt::Display for WebhookTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicCategory {
    Domain,
    Compliance,
}

/// One inbound delivery from the platform, already past the signature gate
/// upstream. The same logical event may arrive more than once under the same
/// `delivery_id`; dedup is the dispatcher's job.
#[derive(Debug, Clone)]
pub struct WebhookEnvelope {
    pub topic: WebhookTopic,
    /// Topic string as delivered, kept for logging unrecognized topics.
    pub raw_topic: String,
    pub shop: String,
    pub delivery_id: String,
    pub body: Vec<u8>,
}

impl WebhookEnvelope {
    pub fn new(
        raw_topic: impl Into<String>,
        shop: impl Into<String>,
        delivery_id: impl Into<String>,
        body: Vec<u8>,
    ) -> Self {
        let raw_topic = raw_topic.into();
        Self {
            topic: WebhookTopic::parse(&raw_topic),
            raw_topic,
            shop: shop.into(),
            delivery_id: delivery_id.into(),
            body,
        }
    }

    /// Payload as JSON. Bodies are opaque at the envelope level and only
    /// interpreted per-topic.
    pub fn body_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subscribed_topics() {
        assert_eq!(WebhookTopic::parse("orders/create"), WebhookTopic::OrdersCreate);
        assert_eq!(WebhookTopic::parse("shop/redact"), WebhookTopic::ShopRedact);
        assert_eq!(WebhookTopic::parse("carts/update"), WebhookTopic::Unknown);
    }

    #[test]
    fn compliance_topics_are_categorized() {
        assert_eq!(WebhookTopic::OrdersCreate.category(), TopicCategory::Domain);
        assert_eq!(WebhookTopic::ProductsCreate.category(), TopicCategory::Domain);
        assert_eq!(
            WebhookTopic::CustomersDataRequest.category(),
            TopicCategory::Compliance
        );
        assert_eq!(WebhookTopic::CustomersRedact.category(), TopicCategory::Compliance);
        assert_eq!(WebhookTopic::ShopRedact.category(), TopicCategory::Compliance);
    }

    #[test]
    fn envelope_keeps_the_raw_topic_for_unknowns() {
        let envelope = WebhookEnvelope::new("carts/update", "a.myshop.example", "d1", vec![]);
        assert_eq!(envelope.topic, WebhookTopic::Unknown);
        assert_eq!(envelope.raw_topic, "carts/update");
    }

    #[test]
    fn body_json_decodes_the_payload() {
        let envelope = WebhookEnvelope::new(
            "orders/create",
            "a.myshop.example",
            "d1",
            br#"{"id": 42}"#.to_vec(),
        );
        assert_eq!(envelope.body_json().unwrap()["id"], 42);
        let bad = WebhookEnvelope::new("orders/create", "a.myshop.example", "d2", b"nope".to_vec());
        assert!(bad.body_json().is_err());
    }
}
