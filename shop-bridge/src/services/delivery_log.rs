use std::sync::Arc;
use std::time::Duration;

use crate::{storage::KvStore, utils::errors::Result};

const DELIVERY_PREFIX: &str = "webhook_delivery:";

/// Durable record of claimed webhook delivery ids.
///
/// The platform delivers at least once; this log turns that into at most one
/// handler run per delivery id. Records expire after the retention window,
/// which bounds storage and outlives the platform's own redelivery schedule.
pub struct DeliveryLog {
    kv: Arc<dyn KvStore>,
    retention: Duration,
}

impl DeliveryLog {
    pub fn new(kv: Arc<dyn KvStore>, retention: Duration) -> Self {
        Self { kv, retention }
    }

    fn key(delivery_id: &str) -> String {
        format!("{DELIVERY_PREFIX}{delivery_id}")
    }

    /// Claim a delivery id. `Ok(true)` means this caller is first and should
    /// run the handler; `Ok(false)` means the id was already claimed,
    /// possibly by a concurrent request.
    pub async fn claim(&self, delivery_id: &str) -> Result<bool> {
        self.kv
            .set_nx(&Self::key(delivery_id), "1", self.retention)
            .await
    }

    /// Release a claim after a transient handler failure so the platform's
    /// redelivery re-runs the handler.
    pub async fn release(&self, delivery_id: &str) -> Result<()> {
        self.kv.del(&Self::key(delivery_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryKv;

    #[tokio::test]
    async fn only_the_first_claim_wins_until_released() {
        let log = DeliveryLog::new(Arc::new(MemoryKv::new()), Duration::from_secs(60));
        assert!(log.claim("d1").await.unwrap());
        assert!(!log.claim("d1").await.unwrap());

        log.release("d1").await.unwrap();
        assert!(log.claim("d1").await.unwrap());
    }

    #[tokio::test]
    async fn claims_lapse_after_the_retention_window() {
        let log = DeliveryLog::new(Arc::new(MemoryKv::new()), Duration::from_millis(30));
        assert!(log.claim("d1").await.unwrap());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(log.claim("d1").await.unwrap());
    }
}
