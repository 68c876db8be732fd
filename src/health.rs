//! The background health recovery loop.
//!
//! Generalizes the shape of a `tokio::spawn`-wrapped `tokio::time::interval`
//! loop to: concurrent probing of every Error-state endpoint per round,
//! loop-wide cancellation that reaches both the sleep and the outstanding
//! probes, and promotion driven through the store rather than an
//! in-process map.

use crate::clock::Clock;
use crate::endpoint::EndpointState;
use crate::prober::BlockNumberProber;
use crate::store::EndpointStore;

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration specific to the health loop's own cadence, distinct from
/// the Selector's `SelectorConfig` (the two are constructed from the same
/// configuration table but the loop only needs a slice of it).
#[derive(Clone, Debug)]
pub struct HealthLoopConfig {
    pub health_check_interval: Duration,
    pub request_timeout: Duration,
    pub enable_health_checks: bool,
}

/// Background task that probes Error-state endpoints and promotes
/// recovered ones back to Active.
pub struct HealthLoop<S: EndpointStore, P: BlockNumberProber> {
    store: Arc<S>,
    prober: Arc<P>,
    clock: Arc<dyn Clock>,
    config: HealthLoopConfig,
}

impl<S: EndpointStore + 'static, P: BlockNumberProber + 'static> HealthLoop<S, P> {
    pub fn new(store: Arc<S>, prober: Arc<P>, clock: Arc<dyn Clock>, config: HealthLoopConfig) -> Self {
        Self {
            store,
            prober,
            clock,
            config,
        }
    }

    /// Run the loop until `cancel` fires. If `enable_health_checks` is
    /// false, logs a notice and returns immediately without iterating.
    pub async fn run(&self, cancel: CancellationToken) {
        if !self.config.enable_health_checks {
            info!("health checks disabled, health loop exiting without iterating");
            return;
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("health loop cancelled during sleep");
                    return;
                }
                _ = tokio::time::sleep(self.config.health_check_interval) => {}
            }

            self.run_once(&cancel).await;
        }
    }

    /// One iteration of the loop body, exposed separately so tests can
    /// drive a single round deterministically instead of waiting out the
    /// configured interval.
    pub async fn run_once(&self, cancel: &CancellationToken) {
        // Loads every endpoint and filters to Error state in memory rather
        // than a targeted by-state query across all chains; see DESIGN.md
        // for why this stays the normative approach.
        let failing = match self.load_all_errors(cancel).await {
            Ok(rows) if rows.is_empty() => {
                debug!("health loop: no Error-state endpoints this round");
                return;
            }
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "health loop: store read failed, will retry next round");
                return;
            }
        };

        let probes = failing.iter().map(|endpoint| {
            let prober = Arc::clone(&self.prober);
            let url = endpoint.url.clone();
            let timeout = self.config.request_timeout;
            let cancel = cancel.clone();
            async move {
                let result = prober.probe(&url, timeout, &cancel).await;
                (url, result)
            }
        });

        let results = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("health loop cancelled while probes were outstanding");
                return;
            }
            results = join_all(probes) => results,
        };

        for (url, result) in results {
            match result {
                Ok(block_number) => {
                    // Any non-negative value (block_number is unsigned) is healthy.
                    let _ = block_number;
                    if let Err(e) = self.promote(&url, cancel).await {
                        warn!(url, error = %e, "health loop: failed to persist recovery");
                    } else {
                        info!(url, "endpoint recovered via health probe");
                    }
                }
                Err(e) => {
                    debug!(url, error = %e, "health loop: probe still failing, will retry next round");
                }
            }
        }
    }

    async fn load_all_errors(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<crate::endpoint::Endpoint>, crate::store::StoreError> {
        let all = self.store.get_all(cancel).await?;
        Ok(all.into_iter().filter(|e| e.state == EndpointState::Error).collect())
    }

    async fn promote(&self, url: &str, cancel: &CancellationToken) -> Result<(), crate::store::StoreError> {
        let Some(mut endpoint) = self.store.get_by_url(url, cancel).await? else {
            return Ok(());
        };
        endpoint.state = EndpointState::Active;
        endpoint.consecutive_errors = 0;
        endpoint.error_message = None;
        endpoint.modified_at = self.clock.now();
        self.store.update(endpoint, cancel).await
    }
}
