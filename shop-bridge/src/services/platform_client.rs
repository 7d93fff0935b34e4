use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::PlatformConfig,
    domain::Session,
    utils::errors::{Result, ShopBridgeError},
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Offline token issued by the platform at the end of the install handshake.
#[derive(Clone, Deserialize)]
pub struct AccessTokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub scope: Option<String>,
}

impl std::fmt::Debug for AccessTokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokenGrant")
            .field("access_token", &"<redacted>")
            .field("scope", &self.scope)
            .finish()
    }
}

/// External handshake collaborator: swaps an authorization code for an
/// offline token. Behind a trait so install orchestration is testable
/// without the platform.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange_code(&self, shop: &str, code: &str) -> Result<AccessTokenGrant>;
}

/// HTTP client for the platform's admin surface: the OAuth token endpoint
/// and the GraphQL Admin API the read endpoints aggregate from.
pub struct PlatformClient {
    http: reqwest::Client,
    api_key: String,
    api_secret: String,
    api_version: String,
}

impl PlatformClient {
    pub fn new(config: &PlatformConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            api_version: config.api_version.clone(),
        }
    }

    /// Run a GraphQL query against the shop's admin API using the session's
    /// offline token. Returns the `data` object; GraphQL-level errors map to
    /// a handler failure since retrying them verbatim will not help.
    pub async fn graphql(&self, session: &Session, query: &str) -> Result<serde_json::Value> {
        let url = format!(
            "https://{}/admin/api/{}/graphql.json",
            session.shop, self.api_version
        );
        let response = self
            .http
            .post(&url)
            .header("X-Shopify-Access-Token", &session.access_token)
            .json(&serde_json::json!({ "query": query }))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;

        let body: serde_json::Value = response.json().await?;
        if let Some(errors) = body.get("errors") {
            if !errors.is_null() {
                return Err(ShopBridgeError::Handler(format!(
                    "GraphQL query failed: {errors}"
                )));
            }
        }
        Ok(body.get("data").cloned().unwrap_or(serde_json::Value::Null))
    }

    /// Shop profile plus order/revenue/product KPIs for the dashboard.
    pub async fn shop_kpis(&self, session: &Session) -> Result<KpiReport> {
        let data = self.graphql(session, SHOP_KPIS_QUERY).await?;
        Ok(aggregate_kpis(&data, Utc::now()))
    }
}

#[async_trait]
impl TokenExchange for PlatformClient {
    async fn exchange_code(&self, shop: &str, code: &str) -> Result<AccessTokenGrant> {
        let url = format!("https://{shop}/admin/oauth/access_token");
        let grant = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "client_id": self.api_key,
                "client_secret": self.api_secret,
                "code": code,
            }))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json::<AccessTokenGrant>()
            .await?;
        Ok(grant)
    }
}

const SHOP_KPIS_QUERY: &str = r#"
query ShopKpis {
  shop {
    name
    email
    myshopifyDomain
    currencyCode
  }
  orders(first: 50, reverse: true) {
    edges {
      node {
        id
        createdAt
        totalPriceSet {
          shopMoney {
            amount
          }
        }
      }
    }
  }
  products(first: 10) {
    edges {
      node {
        id
        title
        featuredImage {
          url
        }
        variants(first: 1) {
          edges {
            node {
              price
              inventoryQuantity
            }
          }
        }
      }
    }
  }
}
"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiReport {
    pub shop: ShopProfile,
    pub orders: OrderCounts,
    pub revenue: RevenueTotals,
    pub top_products: Vec<ProductSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopProfile {
    pub name: String,
    pub email: String,
    pub domain: String,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCounts {
    pub today: usize,
    pub this_week: usize,
    pub this_month: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueTotals {
    pub today: String,
    pub this_week: String,
    pub this_month: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub id: String,
    pub title: String,
    pub inventory: i64,
    pub price: String,
    pub image: Option<String>,
}

fn str_field(value: &serde_json::Value, field: &str) -> String {
    value
        .get(field)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Fold the raw query result into the dashboard aggregate. Aggregation stays
/// deliberately thin: counts and sums over what one page of orders returns.
fn aggregate_kpis(data: &serde_json::Value, now: DateTime<Utc>) -> KpiReport {
    let shop = &data["shop"];
    let empty = Vec::new();
    let orders: Vec<&serde_json::Value> = data["orders"]["edges"]
        .as_array()
        .unwrap_or(&empty)
        .iter()
        .map(|edge| &edge["node"])
        .collect();
    let products: Vec<&serde_json::Value> = data["products"]["edges"]
        .as_array()
        .unwrap_or(&empty)
        .iter()
        .map(|edge| &edge["node"])
        .collect();

    let week_start = now - ChronoDuration::days(7);
    let order_age = |order: &&serde_json::Value| -> Option<DateTime<Utc>> {
        order["createdAt"]
            .as_str()
            .and_then(|raw| raw.parse::<DateTime<Utc>>().ok())
    };
    let order_amount = |order: &&serde_json::Value| -> f64 {
        order["totalPriceSet"]["shopMoney"]["amount"]
            .as_str()
            .and_then(|raw| raw.parse::<f64>().ok())
            .unwrap_or(0.0)
    };

    let today: Vec<&&serde_json::Value> = orders
        .iter()
        .filter(|o| order_age(o).map(|at| at.date_naive() == now.date_naive()).unwrap_or(false))
        .collect();
    let this_week: Vec<&&serde_json::Value> = orders
        .iter()
        .filter(|o| order_age(o).map(|at| at >= week_start).unwrap_or(false))
        .collect();

    let revenue = |subset: &[&&serde_json::Value]| -> String {
        let total: f64 = subset.iter().map(|o| order_amount(o)).sum();
        format!("{total:.2}")
    };

    let top_products = products
        .iter()
        .map(|product| {
            let variant = &product["variants"]["edges"][0]["node"];
            ProductSummary {
                id: str_field(product, "id"),
                title: str_field(product, "title"),
                inventory: variant["inventoryQuantity"].as_i64().unwrap_or(0),
                price: variant["price"]
                    .as_str()
                    .unwrap_or("0.00")
                    .to_string(),
                image: product["featuredImage"]["url"].as_str().map(str::to_string),
            }
        })
        .collect();

    KpiReport {
        shop: ShopProfile {
            name: str_field(shop, "name"),
            email: str_field(shop, "email"),
            domain: str_field(shop, "myshopifyDomain"),
            currency: str_field(shop, "currencyCode"),
        },
        orders: OrderCounts {
            today: today.len(),
            this_week: this_week.len(),
            this_month: orders.len(),
        },
        revenue: RevenueTotals {
            today: revenue(&today),
            this_week: revenue(&this_week),
            this_month: revenue(&orders.iter().collect::<Vec<_>>()),
        },
        top_products,
    }
}
