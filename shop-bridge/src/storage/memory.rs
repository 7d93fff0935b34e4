use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;

use crate::{storage::KvStore, utils::errors::Result};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn new(value: &str, ttl: Duration) -> Self {
        Self {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory reference backend for local runs and tests. Expired entries are
/// dropped lazily on access, so an expired key behaves exactly like an
/// absent one.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: DashMap<String, Entry>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries.insert(key.to_string(), Entry::new(value, ttl));
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(Entry::new(value, ttl));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry::new(value, ttl));
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        // The read guard must be released before removing an expired entry.
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
            Some(_) => {}
            None => return Ok(None),
        }
        self.entries.remove_if(key, |_, entry| entry.is_expired());
        Ok(None)
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn del_many(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let kv = MemoryKv::new();
        kv.set("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn expired_key_reads_as_absent() {
        let kv = MemoryKv::new();
        kv.set("k", "v", Duration::from_millis(20)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(kv.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_nx_grants_the_key_once() {
        let kv = MemoryKv::new();
        assert!(kv.set_nx("k", "a", Duration::from_secs(60)).await.unwrap());
        assert!(!kv.set_nx("k", "b", Duration::from_secs(60)).await.unwrap());
        assert_eq!(kv.get("k").await.unwrap(), Some("a".to_string()));
    }

    #[tokio::test]
    async fn set_nx_reclaims_an_expired_key() {
        let kv = MemoryKv::new();
        assert!(kv.set_nx("k", "a", Duration::from_millis(20)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(kv.set_nx("k", "b", Duration::from_secs(60)).await.unwrap());
        assert_eq!(kv.get("k").await.unwrap(), Some("b".to_string()));
    }

    #[tokio::test]
    async fn del_is_idempotent_and_del_many_accepts_empty_input() {
        let kv = MemoryKv::new();
        kv.del("missing").await.unwrap();
        kv.del_many(&[]).await.unwrap();

        kv.set("a", "1", Duration::from_secs(60)).await.unwrap();
        kv.set("b", "2", Duration::from_secs(60)).await.unwrap();
        kv.del_many(&["a".to_string(), "b".to_string()]).await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), None);
        assert_eq!(kv.get("b").await.unwrap(), None);
    }
}
