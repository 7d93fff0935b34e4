use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShopBridgeError {
    #[error("No authenticated session resolved for this request")]
    Unauthenticated,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Timed out waiting for {operation}")]
    Timeout { operation: &'static str },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Platform API error: {0}")]
    PlatformApi(#[from] reqwest::Error),

    #[error("Webhook handler error: {0}")]
    Handler(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ShopBridgeError {
    /// Whether a retry of the failed operation could plausibly succeed.
    /// Transient failures map to retryable HTTP statuses on the webhook path
    /// so the platform's own redelivery schedule drives the retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ShopBridgeError::Storage(_)
                | ShopBridgeError::Timeout { .. }
                | ShopBridgeError::PlatformApi(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ShopBridgeError>;
