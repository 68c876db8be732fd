//! The Selection Cache collaborator.
//!
//! A short-TTL `chain -> last chosen URL` mapping. A backend that fails on
//! any call is tolerated by design: the [`crate::selector::Selector`]
//! treats a failing `Get` as a miss and a failing `Set`/`Remove` as a
//! best-effort no-op.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Failures a [`SelectionCache`] implementation may surface.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Short-TTL mapping from cache key to the URL bytes last written for it.
///
/// Cache key format is `"rpc:best:{chain}"`, optionally suffixed with
/// `:{prefix}` to isolate tenants sharing one backend — see
/// [`cache_key`].
#[async_trait]
pub trait SelectionCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;
    async fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// Build the cache key for a chain: `"rpc:best:{chain}"`, with an optional
/// `:{prefix}` suffix to isolate tenants sharing one cache backend.
pub fn cache_key(chain: u64, prefix: Option<&str>) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("rpc:best:{chain}:{prefix}"),
        _ => format!("rpc:best:{chain}"),
    }
}

/// In-memory reference implementation with real TTL expiry, backed by a
/// concurrent map for lock-free reads.
#[derive(Default)]
pub struct InMemoryCache {
    entries: DashMap<String, (Vec<u8>, Instant, Duration)>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SelectionCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };
        let (value, written_at, ttl) = entry.value();
        if written_at.elapsed() >= *ttl {
            drop(entry);
            self.entries.remove(key);
            return Ok(None);
        }
        Ok(Some(value.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), (value, Instant::now(), ttl));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// A cache wrapper that fails every call, for testing the Selector's
/// "collaborator failure degrades to miss/best-effort" behavior.
#[derive(Default)]
pub struct AlwaysFailingCache;

#[async_trait]
impl SelectionCache for AlwaysFailingCache {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Err(CacheError::Backend("simulated cache outage".into()))
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Backend("simulated cache outage".into()))
    }

    async fn remove(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Backend("simulated cache outage".into()))
    }
}
