use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Health check
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

// Install flow
#[derive(Debug, Deserialize)]
pub struct BeginInstallQuery {
    pub shop: String,
}

#[derive(Debug, Deserialize)]
pub struct InstallCallbackQuery {
    pub shop: String,
    pub code: String,
    pub host: Option<String>,
    pub embedded: Option<String>,
}

// Entry route: install context parameters forwarded verbatim
#[derive(Debug, Deserialize)]
pub struct EntryQuery {
    pub shop: Option<String>,
    pub host: Option<String>,
    pub embedded: Option<String>,
    pub hmac: Option<String>,
}

// Read API
#[derive(Debug, Deserialize)]
pub struct ShopScopedQuery {
    pub shop: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyResponse {
    pub api_key: String,
}

// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}
