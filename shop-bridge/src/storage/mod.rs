pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

use crate::utils::errors::Result;

/// Durable key-value backend with per-key expiry, supplied by the deployment
/// environment.
///
/// Only atomic single-key operations are assumed: no transactions, no range
/// or pattern queries. Any invariant spanning multiple keys has to be
/// maintained with compensating writes on top of this interface.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Write `value` under `key`, replacing any existing value and resetting
    /// the expiry clock.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Write `value` only if `key` is absent (or expired). Returns whether
    /// this call created the key.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Read the live value under `key`. Expired keys read as absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn del(&self, key: &str) -> Result<()>;

    /// Remove every key in `keys`; may batch at the transport level.
    async fn del_many(&self, keys: &[String]) -> Result<()>;
}
