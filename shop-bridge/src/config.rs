use std::time::Duration;

use serde::Deserialize;

use crate::utils::errors::{Result, ShopBridgeError};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub platform: PlatformConfig,
    pub storage: StorageConfig,
    pub webhooks: WebhookConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Credentials and addressing for the storefront platform. `api_secret` is
/// kept out of `Debug` output; the startup log prints the whole config.
#[derive(Deserialize, Clone)]
pub struct PlatformConfig {
    pub api_key: String,
    pub api_secret: String,
    pub scopes: String,
    /// Public base URL of this deployment, used for the OAuth redirect URI.
    pub app_url: String,
    pub api_version: String,
}

impl std::fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("scopes", &self.scopes)
            .field("app_url", &self.app_url)
            .field("api_version", &self.api_version)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Sessions expire this long after their last write.
    pub session_ttl_secs: u64,
    /// Upper bound on any single KV call.
    pub operation_timeout_ms: u64,
}

impl StorageConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    /// Upper bound on one handler invocation.
    pub handler_timeout_ms: u64,
    /// How long processed delivery ids are remembered for dedup.
    pub dedup_retention_secs: u64,
    /// How long failed compliance deliveries stay on record for manual
    /// remediation.
    pub compliance_record_ttl_secs: u64,
}

impl WebhookConfig {
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    pub fn dedup_retention(&self) -> Duration {
        Duration::from_secs(self.dedup_retention_secs)
    }

    pub fn compliance_record_ttl(&self) -> Duration {
        Duration::from_secs(self.compliance_record_ttl_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            platform: PlatformConfig {
                api_key: std::env::var("SHOPIFY_API_KEY").unwrap_or_default(),
                api_secret: std::env::var("SHOPIFY_API_SECRET").unwrap_or_default(),
                scopes: "read_products,read_orders".to_string(),
                app_url: "http://localhost:8080".to_string(),
                api_version: "2024-10".to_string(),
            },
            storage: StorageConfig {
                session_ttl_secs: 86_400,
                operation_timeout_ms: 2_000,
            },
            webhooks: WebhookConfig {
                handler_timeout_ms: 5_000,
                dedup_retention_secs: 172_800,
                compliance_record_ttl_secs: 2_592_000,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "text".to_string(),
            },
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CONFIG_PATH")
            .unwrap_or_else(|_| "/etc/shop-bridge/config.toml".to_string());

        let mut config = if std::path::Path::new(&config_path).exists() {
            let config_str = std::fs::read_to_string(&config_path).map_err(|e| {
                ShopBridgeError::Configuration(format!(
                    "Failed to read config file {config_path}: {e}"
                ))
            })?;

            toml::from_str::<AppConfig>(&config_str).map_err(|e| {
                ShopBridgeError::Configuration(format!("Failed to parse config file: {e}"))
            })?
        } else {
            AppConfig::default()
        };

        // Environment variables override file settings
        if let Ok(key) = std::env::var("SHOPIFY_API_KEY") {
            config.platform.api_key = key;
        }
        if let Ok(secret) = std::env::var("SHOPIFY_API_SECRET") {
            config.platform.api_secret = secret;
        }
        if let Ok(scopes) = std::env::var("SHOPIFY_SCOPES") {
            config.platform.scopes = scopes;
        }
        if let Ok(app_url) = std::env::var("APP_URL") {
            config.platform.app_url = app_url;
        }

        if let Ok(host) = std::env::var("SERVER_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("SERVER_PORT") {
            config.server.port = port
                .parse()
                .map_err(|e| ShopBridgeError::Configuration(format!("Invalid port: {e}")))?;
        }

        Ok(config)
    }
}
