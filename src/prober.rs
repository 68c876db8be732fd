//! The BlockNumber Prober collaborator.
//!
//! An abstract network probe that asks an endpoint for its current block
//! number. Its on-wire format is explicitly out of scope for the core;
//! the [`crate::health::HealthLoop`] only needs "healthy or not".

use crate::error::ProbeError;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Probes an endpoint URL for its current block number.
///
/// A successful probe returning any non-negative value is "healthy" —
/// there is no notion of a block number being too low or too high at this
/// layer.
#[async_trait]
pub trait BlockNumberProber: Send + Sync {
    async fn probe(
        &self,
        url: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<u64, ProbeError>;
}

/// Concrete prober built on `alloy`, probing liveness via
/// `provider.get_block_number()`.
#[cfg(feature = "alloy-prober")]
pub struct AlloyBlockNumberProber;

#[cfg(feature = "alloy-prober")]
#[async_trait]
impl BlockNumberProber for AlloyBlockNumberProber {
    async fn probe(
        &self,
        url: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<u64, ProbeError> {
        use alloy::providers::{Provider, ProviderBuilder};

        let parsed: url::Url = url
            .parse()
            .map_err(|e: url::ParseError| ProbeError::Protocol(e.to_string()))?;
        let provider = ProviderBuilder::new().connect_http(parsed);

        let call = async {
            tokio::time::timeout(timeout, provider.get_block_number())
                .await
                .map_err(|_| ProbeError::Timeout)?
                .map_err(|e| ProbeError::Transport(e.to_string()))
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProbeError::Transport("cancelled".into())),
            result = call => result,
        }
    }
}

/// A scriptable prober for tests: returns a fixed result per URL, or a
/// default for unknown URLs.
#[cfg(any(test, feature = "test-util"))]
pub struct ScriptedProber {
    pub responses: dashmap::DashMap<String, Result<u64, String>>,
}

#[cfg(any(test, feature = "test-util"))]
impl ScriptedProber {
    pub fn new() -> Self {
        Self {
            responses: dashmap::DashMap::new(),
        }
    }

    pub fn set_healthy(&self, url: &str, block_number: u64) {
        self.responses.insert(url.to_string(), Ok(block_number));
    }

    pub fn set_failing(&self, url: &str, reason: &str) {
        self.responses.insert(url.to_string(), Err(reason.to_string()));
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl BlockNumberProber for ScriptedProber {
    async fn probe(
        &self,
        url: &str,
        _timeout: Duration,
        _cancel: &CancellationToken,
    ) -> Result<u64, ProbeError> {
        match self.responses.get(url).map(|r| r.value().clone()) {
            Some(Ok(n)) => Ok(n),
            Some(Err(reason)) => Err(ProbeError::Transport(reason)),
            None => Err(ProbeError::Transport(format!("no script for {url}"))),
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_prober_returns_configured_result() {
        let prober = ScriptedProber::new();
        prober.set_healthy("https://a", 100);
        prober.set_failing("https://b", "connection refused");

        let cancel = CancellationToken::new();
        assert_eq!(
            prober.probe("https://a", Duration::from_secs(1), &cancel).await.unwrap(),
            100
        );
        assert!(prober.probe("https://b", Duration::from_secs(1), &cancel).await.is_err());
    }
}
