use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::{
    domain::Session,
    storage::KvStore,
    utils::errors::{Result, ShopBridgeError},
};

const SESSION_PREFIX: &str = "session:";
const SHOP_INDEX_PREFIX: &str = "shop_sessions:";

/// Durable session persistence over the deployment's KV backend.
///
/// Every write applies the store's standard TTL, resetting the expiry clock.
/// A bare KV store cannot answer shop-scoped queries, so `shop_sessions:{shop}`
/// holds the known ids as a secondary index maintained with compensating
/// single-key writes. The index may transiently reference a missing session;
/// readers treat a dangling id as absent and prune it.
///
/// Storage failures never escape as panics: each operation returns a typed
/// result and logs a diagnostic, because a degraded response beats crashing
/// the request task.
pub struct SessionStore {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
    op_timeout: Duration,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KvStore>, ttl: Duration, op_timeout: Duration) -> Self {
        Self { kv, ttl, op_timeout }
    }

    fn session_key(id: &str) -> String {
        format!("{SESSION_PREFIX}{id}")
    }

    fn shop_key(shop: &str) -> String {
        format!("{SHOP_INDEX_PREFIX}{shop}")
    }

    /// Bound a storage call so a stalled backend cannot pin a request task.
    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ShopBridgeError::Timeout {
                operation: "session storage",
            }),
        }
    }

    /// Serialize and write the session, resetting its TTL.
    pub async fn store(&self, session: &Session) -> Result<()> {
        let payload = serde_json::to_string(session)?;
        self.bounded(self.kv.set(&Self::session_key(&session.id), &payload, self.ttl))
            .await
            .map_err(|e| {
                tracing::warn!(session_id = %session.id, error = %e, "Failed to store session");
                e
            })?;
        self.index_add(&session.shop, &session.id).await;
        tracing::debug!(session_id = %session.id, shop = %session.shop, "Session stored");
        Ok(())
    }

    /// Three distinguishable outcomes: `Ok(Some)` hit, `Ok(None)` absent or
    /// expired (not an error), `Err` storage failure.
    pub async fn load(&self, id: &str) -> Result<Option<Session>> {
        let raw = self
            .bounded(self.kv.get(&Self::session_key(id)))
            .await
            .map_err(|e| {
                tracing::warn!(session_id = %id, error = %e, "Failed to load session");
                e
            })?;
        match raw {
            Some(payload) => match serde_json::from_str::<Session>(&payload) {
                Ok(session) => Ok(Some(session)),
                Err(e) => {
                    // A record that no longer decodes is unusable; drop it
                    // instead of failing every caller until the TTL clears it.
                    tracing::warn!(session_id = %id, error = %e, "Discarding undecodable session record");
                    let _ = self.bounded(self.kv.del(&Self::session_key(id))).await;
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Idempotent: deleting an absent id succeeds.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let existing = self.load(id).await.ok().flatten();
        self.bounded(self.kv.del(&Self::session_key(id)))
            .await
            .map_err(|e| {
                tracing::warn!(session_id = %id, error = %e, "Failed to delete session");
                e
            })?;
        if let Some(session) = existing {
            self.index_remove(&session.shop, id).await;
        }
        Ok(())
    }

    /// Bulk delete; an empty input succeeds with zero effect. Shop index
    /// entries for the deleted ids are left to lazy pruning on the next
    /// shop-scoped read.
    pub async fn delete_many(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = ids.iter().map(|id| Self::session_key(id)).collect();
        self.bounded(self.kv.del_many(&keys)).await.map_err(|e| {
            tracing::warn!(count = ids.len(), error = %e, "Failed to delete sessions");
            e
        })
    }

    /// Shop-scoped lookup through the secondary index. Without the index a
    /// plain KV store could only ever answer with an empty sequence; with it,
    /// dangling ids (session expired ahead of the index) are pruned and not
    /// returned.
    pub async fn find_by_shop(&self, shop: &str) -> Result<Vec<Session>> {
        let ids = self.index_ids(shop).await?;
        let mut sessions = Vec::new();
        let mut live_ids = Vec::new();
        for id in &ids {
            if let Some(session) = self.load(id).await? {
                live_ids.push(id.clone());
                sessions.push(session);
            }
        }
        if live_ids.len() != ids.len() {
            if live_ids.is_empty() {
                let _ = self.bounded(self.kv.del(&Self::shop_key(shop))).await;
            } else {
                self.index_write(shop, &live_ids).await;
            }
        }
        Ok(sessions)
    }

    /// Erase every session the index knows for `shop`, then the index key
    /// itself. Returns how many ids were dropped.
    pub async fn delete_for_shop(&self, shop: &str) -> Result<usize> {
        let ids = self.index_ids(shop).await?;
        let keys: Vec<String> = ids.iter().map(|id| Self::session_key(id)).collect();
        if !keys.is_empty() {
            self.bounded(self.kv.del_many(&keys)).await?;
        }
        self.bounded(self.kv.del(&Self::shop_key(shop))).await?;
        tracing::info!(shop = %shop, deleted = ids.len(), "Deleted all sessions for shop");
        Ok(ids.len())
    }

    async fn index_ids(&self, shop: &str) -> Result<Vec<String>> {
        let raw = self.bounded(self.kv.get(&Self::shop_key(shop))).await?;
        match raw {
            Some(payload) => Ok(serde_json::from_str(&payload).unwrap_or_default()),
            None => Ok(Vec::new()),
        }
    }

    /// Compensating write beside the session record. A failure here leaves
    /// at worst a session invisible to shop-scoped lookup until its next
    /// store; it must not fail the write that already succeeded.
    async fn index_add(&self, shop: &str, id: &str) {
        match self.index_ids(shop).await {
            Ok(mut ids) => {
                if !ids.iter().any(|existing| existing == id) {
                    ids.push(id.to_string());
                }
                self.index_write(shop, &ids).await;
            }
            Err(e) => {
                tracing::warn!(shop = %shop, error = %e, "Skipping shop index update");
            }
        }
    }

    async fn index_remove(&self, shop: &str, id: &str) {
        if let Ok(ids) = self.index_ids(shop).await {
            let remaining: Vec<String> = ids.into_iter().filter(|existing| existing != id).collect();
            if remaining.is_empty() {
                let _ = self.bounded(self.kv.del(&Self::shop_key(shop))).await;
            } else {
                self.index_write(shop, &remaining).await;
            }
        }
    }

    async fn index_write(&self, shop: &str, ids: &[String]) {
        match serde_json::to_string(ids) {
            Ok(payload) => {
                if let Err(e) = self
                    .bounded(self.kv.set(&Self::shop_key(shop), &payload, self.ttl))
                    .await
                {
                    tracing::warn!(shop = %shop, error = %e, "Failed to write shop index");
                }
            }
            Err(e) => {
                tracing::warn!(shop = %shop, error = %e, "Failed to encode shop index");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryKv;
    use tokio_test::assert_ok;

    fn store_with(kv: Arc<MemoryKv>, ttl: Duration) -> SessionStore {
        SessionStore::new(kv, ttl, Duration::from_millis(500))
    }

    fn session(shop: &str) -> Session {
        Session::offline(shop, "tok", None)
    }

    #[tokio::test]
    async fn store_then_load_round_trips() {
        let store = store_with(Arc::new(MemoryKv::new()), Duration::from_secs(60));
        let s = session("a.myshop.example");
        assert_ok!(store.store(&s).await);

        let loaded = store.load(&s.id).await.unwrap();
        assert_eq!(loaded, Some(s));
    }

    #[tokio::test]
    async fn loading_an_unknown_id_is_absent_not_an_error() {
        let store = store_with(Arc::new(MemoryKv::new()), Duration::from_secs(60));
        assert_eq!(store.load("never-stored").await.unwrap(), None);
    }

    #[tokio::test]
    async fn sessions_expire_after_the_storage_ttl() {
        let store = store_with(Arc::new(MemoryKv::new()), Duration::from_millis(50));
        let s = session("a.myshop.example");
        store.store(&s).await.unwrap();
        assert!(store.load(&s.id).await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.load(&s.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_is_idempotent_even_for_never_stored_ids() {
        let store = store_with(Arc::new(MemoryKv::new()), Duration::from_secs(60));
        assert_ok!(store.delete("ghost").await);
        assert_eq!(store.load("ghost").await.unwrap(), None);

        let s = session("a.myshop.example");
        store.store(&s).await.unwrap();
        assert_ok!(store.delete(&s.id).await);
        assert_ok!(store.delete(&s.id).await);
        assert_eq!(store.load(&s.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_many_with_empty_input_is_a_no_op() {
        let store = store_with(Arc::new(MemoryKv::new()), Duration::from_secs(60));
        assert_ok!(store.delete_many(&[]).await);
    }

    #[tokio::test]
    async fn find_by_shop_returns_indexed_sessions() {
        let store = store_with(Arc::new(MemoryKv::new()), Duration::from_secs(60));
        let s = session("a.myshop.example");
        store.store(&s).await.unwrap();
        store.store(&session("b.myshop.example")).await.unwrap();

        let found = store.find_by_shop("a.myshop.example").await.unwrap();
        assert_eq!(found, vec![s]);
        assert!(store.find_by_shop("c.myshop.example").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dangling_index_entries_read_as_absent_and_get_pruned() {
        let kv = Arc::new(MemoryKv::new());
        let store = store_with(kv.clone(), Duration::from_secs(60));
        let s = session("a.myshop.example");
        store.store(&s).await.unwrap();

        // Session gone but index entry still present, as after a partial
        // failure or an expiry race.
        kv.del(&format!("session:{}", s.id)).await.unwrap();

        assert!(store.find_by_shop("a.myshop.example").await.unwrap().is_empty());
        assert_eq!(kv.get("shop_sessions:a.myshop.example").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_for_shop_leaves_no_sessions_and_no_index() {
        let kv = Arc::new(MemoryKv::new());
        let store = store_with(kv.clone(), Duration::from_secs(60));
        let s = session("a.myshop.example");
        store.store(&s).await.unwrap();

        let deleted = store.delete_for_shop("a.myshop.example").await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.load(&s.id).await.unwrap(), None);
        assert_eq!(kv.get("shop_sessions:a.myshop.example").await.unwrap(), None);
        assert!(store.find_by_shop("a.myshop.example").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_records_are_discarded_as_absent() {
        let kv = Arc::new(MemoryKv::new());
        let store = store_with(kv.clone(), Duration::from_secs(60));
        kv.set("session:bad", "not json", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.load("bad").await.unwrap(), None);
        assert_eq!(kv.get("session:bad").await.unwrap(), None);
    }
}
