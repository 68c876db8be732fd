//! The selection and failure-tracking core.
//!
//! An `Arc`-held value holding its collaborators, no global state,
//! constructed with a plain function rather than wired through a DI
//! container, implementing four operations and a multi-tier fallback
//! policy over them.

use crate::backoff;
use crate::cache::{cache_key, SelectionCache};
use crate::clock::Clock;
use crate::config::SelectorConfig;
use crate::endpoint::{Endpoint, EndpointState};
use crate::error::SelectorError;
use crate::policy;
use crate::store::{EndpointStore, StoreError};

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

fn map_store_err(err: StoreError) -> SelectorError {
    match err {
        StoreError::Cancelled => SelectorError::Cancelled,
        StoreError::Backend(inner) => SelectorError::Store(inner),
    }
}

fn check_cancel(cancel: &CancellationToken) -> Result<(), SelectorError> {
    if cancel.is_cancelled() {
        Err(SelectorError::Cancelled)
    } else {
        Ok(())
    }
}

/// Picks the best URL for a chain and records success/failure outcomes.
///
/// Holds `Arc` references to its store, cache, and clock collaborators —
/// all shared mutable state lives in those collaborators, not here.
/// The only in-process state this type owns is the per-URL lock table used
/// to serialize `mark_success`/`mark_failure` read-modify-writes, per the
/// first of the two concurrency-safe shapes in the Design Notes.
pub struct Selector<S: EndpointStore, C: SelectionCache> {
    store: Arc<S>,
    cache: Arc<C>,
    clock: Arc<dyn Clock>,
    config: SelectorConfig,
    url_locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl<S: EndpointStore, C: SelectionCache> Selector<S, C> {
    /// Construct a Selector from its collaborators. Plain constructor
    /// function, no service locator.
    pub fn new(store: Arc<S>, cache: Arc<C>, clock: Arc<dyn Clock>, config: SelectorConfig) -> Self {
        Self {
            store,
            cache,
            clock,
            config,
            url_locks: DashMap::new(),
        }
    }

    fn cache_key_for(&self, chain: u64) -> String {
        cache_key(chain, self.config.cache_key_prefix.as_deref())
    }

    fn lock_for(&self, url: &str) -> Arc<AsyncMutex<()>> {
        self.url_locks
            .entry(url.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn is_backoff_eligible(&self, endpoint: &Endpoint) -> bool {
        backoff::is_eligible(
            endpoint.consecutive_errors,
            endpoint.last_error_at,
            self.clock.now(),
            &self.config.backoff,
        )
    }

    /// `GetBest`.
    pub async fn get_best(&self, chain: u64, cancel: &CancellationToken) -> Result<String, SelectorError> {
        check_cancel(cancel)?;

        let key = self.cache_key_for(chain);
        if let Ok(Some(bytes)) = self.cache.get(&key).await {
            if let Ok(url) = String::from_utf8(bytes) {
                debug!(chain, "cache hit for GetBest");
                return Ok(url);
            }
        }

        let active = self
            .store
            .get_by_chain_and_state(chain, EndpointState::Active, cancel)
            .await
            .map_err(map_store_err)?;

        // Each tier is resolved to an owned URL immediately: `pick_best`
        // borrows from whichever Vec is local to this tier's scope, so the
        // borrow cannot outlive it.
        let candidate_url = if !active.is_empty() {
            policy::pick_best(&active).map(|e| e.url.clone())
        } else {
            let error_tier = self
                .store
                .get_by_chain_and_state(chain, EndpointState::Error, cancel)
                .await
                .map_err(map_store_err)?;
            let eligible: Vec<Endpoint> = error_tier
                .into_iter()
                .filter(|e| self.is_backoff_eligible(e))
                .collect();

            if !eligible.is_empty() {
                policy::pick_best(&eligible).map(|e| e.url.clone())
            } else if self.config.allow_disabled_fallback {
                let disabled = self
                    .store
                    .get_by_chain_and_state(chain, EndpointState::Disabled, cancel)
                    .await
                    .map_err(map_store_err)?;
                policy::pick_best(&disabled).map(|e| e.url.clone())
            } else {
                None
            }
        };

        match candidate_url {
            Some(url) => {
                if self
                    .cache
                    .set(&key, url.clone().into_bytes(), self.config.cache_duration)
                    .await
                    .is_err()
                {
                    warn!(chain, "cache write failed for GetBest, continuing");
                }
                Ok(url)
            }
            None => Err(SelectorError::NoHealthyEndpoint { chain }),
        }
    }

    /// `GetNext`. Does not consult the cache and does not honor
    /// disabled-as-fallback.
    pub async fn get_next(
        &self,
        chain: u64,
        failed_url: &str,
        cancel: &CancellationToken,
    ) -> Result<String, SelectorError> {
        check_cancel(cancel)?;
        if failed_url.is_empty() {
            return Err(SelectorError::InvalidArgument("failed_url must not be empty".into()));
        }

        let all = self.store.get_by_chain(chain, cancel).await.map_err(map_store_err)?;
        let candidates: Vec<Endpoint> = all
            .into_iter()
            .filter(|e| e.url != failed_url)
            .filter(|e| e.state == EndpointState::Active || (e.state == EndpointState::Error && self.is_backoff_eligible(e)))
            .collect();

        match policy::pick_best(&candidates).map(|e| e.url.clone()) {
            Some(url) => {
                let key = self.cache_key_for(chain);
                if self
                    .cache
                    .set(&key, url.clone().into_bytes(), self.config.cache_duration)
                    .await
                    .is_err()
                {
                    warn!(chain, "cache write failed for GetNext, continuing");
                }
                Ok(url)
            }
            None => Err(SelectorError::NoHealthyEndpoint { chain }),
        }
    }

    /// `MarkSuccess`.
    pub async fn mark_success(&self, url: &str, cancel: &CancellationToken) -> Result<(), SelectorError> {
        check_cancel(cancel)?;
        if url.is_empty() {
            return Err(SelectorError::InvalidArgument("url must not be empty".into()));
        }

        let lock = self.lock_for(url);
        let _guard = lock.lock().await;

        let Some(mut endpoint) = self.store.get_by_url(url, cancel).await.map_err(map_store_err)? else {
            warn!(url, "MarkSuccess on unknown endpoint, ignoring");
            return Ok(());
        };

        let was_erroring = endpoint.state == EndpointState::Error || endpoint.consecutive_errors > 0;

        endpoint.consecutive_errors = 0;
        endpoint.error_message = None;
        endpoint.modified_at = self.clock.now();
        if endpoint.state == EndpointState::Error {
            endpoint.state = EndpointState::Active;
            info!(url, "endpoint recovered via MarkSuccess");
        }

        let chain = endpoint.chain;
        self.store.update(endpoint, cancel).await.map_err(map_store_err)?;

        if was_erroring {
            let key = self.cache_key_for(chain);
            if self.cache.remove(&key).await.is_err() {
                warn!(chain, "cache invalidation failed after MarkSuccess, continuing");
            }
        }

        Ok(())
    }

    /// `MarkFailure`. Always invalidates the chain's cache entry.
    pub async fn mark_failure(
        &self,
        url: &str,
        reason: &str,
        cancel: &CancellationToken,
    ) -> Result<(), SelectorError> {
        check_cancel(cancel)?;
        if url.is_empty() {
            return Err(SelectorError::InvalidArgument("url must not be empty".into()));
        }

        let lock = self.lock_for(url);
        let _guard = lock.lock().await;

        let Some(mut endpoint) = self.store.get_by_url(url, cancel).await.map_err(map_store_err)? else {
            warn!(url, "MarkFailure on unknown endpoint, ignoring");
            return Ok(());
        };

        let reason = if reason.is_empty() { "unknown" } else { reason };

        endpoint.consecutive_errors += 1;
        endpoint.last_error_at = Some(self.clock.now());
        endpoint.error_message = Some(reason.to_string());
        endpoint.modified_at = self.clock.now();

        if endpoint.consecutive_errors >= self.config.max_consecutive_errors
            && endpoint.state == EndpointState::Active
        {
            warn!(
                url,
                consecutive_errors = endpoint.consecutive_errors,
                "endpoint exceeded max_consecutive_errors, marking Error"
            );
            endpoint.state = EndpointState::Error;
        }

        let chain = endpoint.chain;
        self.store.update(endpoint, cancel).await.map_err(map_store_err)?;

        let key = self.cache_key_for(chain);
        if self.cache.remove(&key).await.is_err() {
            warn!(chain, "cache invalidation failed after MarkFailure, continuing");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{AlwaysFailingCache, InMemoryCache};
    use crate::clock::FixedClock;
    use crate::store::InMemoryEndpointStore;
    use chrono::Utc;

    fn harness(
        config: SelectorConfig,
    ) -> (Selector<InMemoryEndpointStore, InMemoryCache>, Arc<InMemoryEndpointStore>, Arc<FixedClock>) {
        let store = Arc::new(InMemoryEndpointStore::new());
        let cache = Arc::new(InMemoryCache::new());
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let selector = Selector::new(store.clone(), cache, clock.clone(), config);
        (selector, store, clock)
    }

    async fn seed(store: &InMemoryEndpointStore, chain: u64, url: &str, priority: u32, now: chrono::DateTime<Utc>) {
        let cancel = CancellationToken::new();
        store.add(Endpoint::new(chain, url, priority, now), &cancel).await.unwrap();
    }

    #[tokio::test]
    async fn s1_failover_after_five_failures() {
        let (selector, store, clock) = harness(SelectorConfig::new().with_max_consecutive_errors(5));
        let cancel = CancellationToken::new();
        seed(&store, 1, "https://a", 1, clock.now()).await;
        seed(&store, 1, "https://b", 2, clock.now()).await;

        assert_eq!(selector.get_best(1, &cancel).await.unwrap(), "https://a");

        for _ in 0..5 {
            selector.mark_failure("https://a", "boom", &cancel).await.unwrap();
        }

        assert_eq!(selector.get_best(1, &cancel).await.unwrap(), "https://b");
        let a = store.get_by_url("https://a", &cancel).await.unwrap().unwrap();
        assert_eq!(a.state, EndpointState::Error);
        assert_eq!(a.consecutive_errors, 5);
    }

    #[tokio::test]
    async fn s2_backoff_window_then_priority_wins_then_only_eligible() {
        let (selector, store, clock) =
            harness(SelectorConfig::new().with_max_consecutive_errors(5));
        let cancel = CancellationToken::new();
        seed(&store, 1, "https://a", 1, clock.now()).await;
        seed(&store, 1, "https://b", 2, clock.now()).await;

        for _ in 0..5 {
            selector.mark_failure("https://a", "boom", &cancel).await.unwrap();
        }

        // t + 10 min: backoff for n=5 is 16 min, so A is still ineligible.
        clock.advance(chrono::Duration::minutes(10));
        assert_eq!(selector.get_best(1, &cancel).await.unwrap(), "https://b");

        // t + 16 min total: A becomes eligible, but B (Active) still wins on priority.
        clock.advance(chrono::Duration::minutes(6));
        assert_eq!(selector.get_best(1, &cancel).await.unwrap(), "https://b");

        // Now fail B five times too; A is the only eligible Error endpoint.
        for _ in 0..5 {
            selector.mark_failure("https://b", "boom", &cancel).await.unwrap();
        }
        assert_eq!(selector.get_best(1, &cancel).await.unwrap(), "https://a");
    }

    #[tokio::test]
    async fn s3_no_endpoints_fails_with_no_healthy_endpoint() {
        let (selector, _store, _clock) = harness(SelectorConfig::new());
        let cancel = CancellationToken::new();
        let result = selector.get_best(137, &cancel).await;
        assert!(matches!(result, Err(SelectorError::NoHealthyEndpoint { chain: 137 })));
    }

    #[tokio::test]
    async fn s4_equal_priority_fewer_errors_wins() {
        let (selector, store, clock) = harness(SelectorConfig::new());
        let cancel = CancellationToken::new();
        seed(&store, 1, "https://a", 1, clock.now()).await;
        seed(&store, 1, "https://b", 1, clock.now()).await;

        selector.mark_failure("https://a", "boom", &cancel).await.unwrap();
        selector.mark_failure("https://a", "boom", &cancel).await.unwrap();

        assert_eq!(selector.get_best(1, &cancel).await.unwrap(), "https://b");
    }

    #[tokio::test]
    async fn s5_get_next_excludes_failed_url_and_updates_cache() {
        let (selector, store, clock) = harness(SelectorConfig::new());
        let cancel = CancellationToken::new();
        seed(&store, 1, "https://a", 1, clock.now()).await;
        seed(&store, 1, "https://b", 2, clock.now()).await;

        assert_eq!(selector.get_best(1, &cancel).await.unwrap(), "https://a");
        selector.mark_failure("https://a", "boom", &cancel).await.unwrap();

        let next = selector.get_next(1, "https://a", &cancel).await.unwrap();
        assert_eq!(next, "https://b");

        // Cache now holds B: GetBest should return it from cache without
        // re-resolving (even if A were to become eligible again).
        assert_eq!(selector.get_best(1, &cancel).await.unwrap(), "https://b");
    }

    #[tokio::test]
    async fn get_next_never_returns_failed_url() {
        let (selector, store, clock) = harness(SelectorConfig::new());
        let cancel = CancellationToken::new();
        seed(&store, 1, "https://a", 1, clock.now()).await;

        let result = selector.get_next(1, "https://a", &cancel).await;
        assert!(matches!(result, Err(SelectorError::NoHealthyEndpoint { chain: 1 })));
    }

    #[tokio::test]
    async fn get_next_rejects_empty_failed_url() {
        let (selector, _store, _clock) = harness(SelectorConfig::new());
        let cancel = CancellationToken::new();
        let result = selector.get_next(1, "", &cancel).await;
        assert!(matches!(result, Err(SelectorError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn mark_success_on_unknown_url_is_a_noop() {
        let (selector, _store, _clock) = harness(SelectorConfig::new());
        let cancel = CancellationToken::new();
        assert!(selector.mark_success("https://unknown", &cancel).await.is_ok());
    }

    #[tokio::test]
    async fn mark_failure_empty_reason_becomes_sentinel() {
        let (selector, store, clock) = harness(SelectorConfig::new());
        let cancel = CancellationToken::new();
        seed(&store, 1, "https://a", 1, clock.now()).await;

        selector.mark_failure("https://a", "", &cancel).await.unwrap();
        let a = store.get_by_url("https://a", &cancel).await.unwrap().unwrap();
        assert_eq!(a.error_message.as_deref(), Some("unknown"));
    }

    #[tokio::test]
    async fn property_2_cache_hit_fidelity_skips_store_after_ttl_set() {
        let (selector, store, clock) = harness(SelectorConfig::new());
        let cancel = CancellationToken::new();
        seed(&store, 1, "https://a", 1, clock.now()).await;
        seed(&store, 1, "https://b", 2, clock.now()).await;

        let first = selector.get_best(1, &cancel).await.unwrap();

        // Even if a lower-priority endpoint is added after the cache write,
        // a cold re-resolution is never attempted within TTL.
        seed(&store, 1, "https://z", 0, clock.now()).await;
        let second = selector.get_best(1, &cancel).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn property_6_mark_success_invalidates_cache_only_when_recovering() {
        let (selector, store, clock) = harness(SelectorConfig::new());
        let cancel = CancellationToken::new();
        seed(&store, 1, "https://a", 1, clock.now()).await;
        seed(&store, 1, "https://b", 2, clock.now()).await;

        selector.get_best(1, &cancel).await.unwrap();
        // A healthy endpoint succeeding should not touch the cache: a
        // second GetBest for a *new*, lower-priority endpoint should still
        // return the cached URL.
        selector.mark_success("https://a", &cancel).await.unwrap();
        seed(&store, 1, "https://z", 0, clock.now()).await;
        assert_eq!(selector.get_best(1, &cancel).await.unwrap(), "https://a");
    }

    #[tokio::test]
    async fn disabled_fallback_respects_config_flag() {
        let cancel = CancellationToken::new();

        let (selector, store, clock) = harness(SelectorConfig::new().with_allow_disabled_fallback(false));
        seed(&store, 1, "https://a", 1, clock.now()).await;
        {
            let mut e = store.get_by_url("https://a", &cancel).await.unwrap().unwrap();
            e.state = EndpointState::Disabled;
            store.update(e, &cancel).await.unwrap();
        }
        assert!(matches!(
            selector.get_best(1, &cancel).await,
            Err(SelectorError::NoHealthyEndpoint { chain: 1 })
        ));

        let (selector, store, clock) = harness(SelectorConfig::new().with_allow_disabled_fallback(true));
        seed(&store, 1, "https://a", 1, clock.now()).await;
        {
            let mut e = store.get_by_url("https://a", &cancel).await.unwrap().unwrap();
            e.state = EndpointState::Disabled;
            store.update(e, &cancel).await.unwrap();
        }
        assert_eq!(selector.get_best(1, &cancel).await.unwrap(), "https://a");
    }

    #[tokio::test]
    async fn mark_failure_never_transitions_a_disabled_endpoint() {
        let (selector, store, clock) = harness(SelectorConfig::new().with_max_consecutive_errors(1));
        let cancel = CancellationToken::new();
        seed(&store, 1, "https://a", 1, clock.now()).await;
        {
            let mut e = store.get_by_url("https://a", &cancel).await.unwrap().unwrap();
            e.state = EndpointState::Disabled;
            store.update(e, &cancel).await.unwrap();
        }

        selector.mark_failure("https://a", "boom", &cancel).await.unwrap();

        let a = store.get_by_url("https://a", &cancel).await.unwrap().unwrap();
        assert_eq!(a.state, EndpointState::Disabled, "only an operator may move an endpoint out of Disabled");
        assert_eq!(a.consecutive_errors, 1);
        assert_eq!(a.error_message.as_deref(), Some("boom"));
        assert!(a.last_error_at.is_some());
    }

    #[tokio::test]
    async fn cache_failure_degrades_to_miss_not_error() {
        let store = Arc::new(InMemoryEndpointStore::new());
        let cache = Arc::new(AlwaysFailingCache);
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let selector = Selector::new(store.clone(), cache, clock.clone(), SelectorConfig::new());
        let cancel = CancellationToken::new();
        seed(&store, 1, "https://a", 1, clock.now()).await;

        // A failing cache must not surface as an error: selection still
        // succeeds by falling through to the store.
        assert_eq!(selector.get_best(1, &cancel).await.unwrap(), "https://a");
    }

    #[tokio::test]
    async fn concurrent_mark_failure_does_not_lose_updates() {
        let (selector, store, clock) = harness(SelectorConfig::new().with_max_consecutive_errors(1000));
        let cancel = CancellationToken::new();
        seed(&store, 1, "https://a", 1, clock.now()).await;

        let selector = Arc::new(selector);
        let mut handles = Vec::new();
        for _ in 0..50 {
            let selector = selector.clone();
            handles.push(tokio::spawn(async move {
                let cancel = CancellationToken::new();
                selector.mark_failure("https://a", "boom", &cancel).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let a = store.get_by_url("https://a", &cancel).await.unwrap().unwrap();
        assert_eq!(a.consecutive_errors, 50);
    }
}
