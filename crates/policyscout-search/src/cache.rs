//! Response cache: a key-value store with per-entry TTL.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use thiserror::Error;

use crate::types::SearchResponse;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Key-value cache for search responses.
///
/// The client treats every error as a miss, so implementations may fail
/// freely without affecting a run.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<SearchResponse>, CacheError>;

    /// Store `value` under `key` for `ttl`.
    async fn setex(&self, key: &str, ttl: Duration, value: &SearchResponse)
    -> Result<(), CacheError>;
}

#[derive(Clone)]
struct Entry {
    ttl: Duration,
    response: SearchResponse,
}

struct EntryTtl;

impl Expiry<String, Entry> for EntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Entry, _at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process cache backed by moka.
#[derive(Clone)]
pub struct MemoryCache {
    inner: Cache<String, Entry>,
}

impl MemoryCache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .expire_after(EntryTtl)
                .build(),
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

#[async_trait]
impl ResponseCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<SearchResponse>, CacheError> {
        Ok(self.inner.get(key).await.map(|e| e.response))
    }

    async fn setex(
        &self,
        key: &str,
        ttl: Duration,
        value: &SearchResponse,
    ) -> Result<(), CacheError> {
        self.inner
            .insert(
                key.to_string(),
                Entry {
                    ttl,
                    response: value.clone(),
                },
            )
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get() {
        let cache = MemoryCache::new(16);
        assert!(cache.get("k").await.unwrap().is_none());
        cache
            .setex("k", Duration::from_secs(60), &SearchResponse::text("body"))
            .await
            .unwrap();
        let hit = cache.get("k").await.unwrap().unwrap();
        assert_eq!(hit.content, "body");
    }

    #[tokio::test]
    async fn zero_ttl_expires_immediately() {
        let cache = MemoryCache::new(16);
        cache
            .setex("k", Duration::ZERO, &SearchResponse::text("body"))
            .await
            .unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
    }
}
