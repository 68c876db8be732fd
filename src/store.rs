//! The Endpoint Store collaborator.
//!
//! This is the persistence boundary: a conforming implementation may be
//! relational, document-oriented, or in-memory. The core depends only on
//! this trait, never on a concrete datastore (ORM boilerplate and schema
//! are explicitly out of scope for this core).

use crate::endpoint::{Endpoint, EndpointState};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Failures an [`EndpointStore`] implementation may surface.
///
/// Unlike [`crate::error::SelectorError`], this has no `NoHealthyEndpoint`
/// or `InvalidArgument` variant: those are policy decisions the Selector
/// makes, not something a store can detect.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The operation's cancellation token fired first.
    #[error("store operation cancelled")]
    Cancelled,

    /// Backend-specific failure (connection, query, serialization, ...).
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Persistent per-chain list of endpoints with their state and error
/// counters.
///
/// All methods accept a [`CancellationToken`]; implementations backed by
/// real I/O should race the underlying call against `cancel.cancelled()`
/// and return [`StoreError::Cancelled`] if it fires first, the way
/// [`InMemoryEndpointStore`] does.
#[async_trait]
pub trait EndpointStore: Send + Sync {
    /// Endpoints for `chain` in `state`, ordered by `(priority,
    /// consecutive_errors)` ascending.
    async fn get_by_chain_and_state(
        &self,
        chain: u64,
        state: EndpointState,
        cancel: &CancellationToken,
    ) -> Result<Vec<Endpoint>, StoreError>;

    /// All endpoints for `chain`, regardless of state.
    async fn get_by_chain(
        &self,
        chain: u64,
        cancel: &CancellationToken,
    ) -> Result<Vec<Endpoint>, StoreError>;

    /// The endpoint with this URL, if any.
    async fn get_by_url(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Endpoint>, StoreError>;

    /// The endpoint with this id, if any.
    async fn get_by_id(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<Endpoint>, StoreError>;

    /// Every endpoint across every chain.
    async fn get_all(&self, cancel: &CancellationToken) -> Result<Vec<Endpoint>, StoreError>;

    /// Insert a new endpoint row. Implementations set `created_at` and
    /// `modified_at`.
    async fn add(&self, endpoint: Endpoint, cancel: &CancellationToken) -> Result<(), StoreError>;

    /// Persist a mutated endpoint row. Implementations update
    /// `modified_at`.
    async fn update(
        &self,
        endpoint: Endpoint,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError>;
}

/// In-memory reference implementation, keyed by URL in a concurrent map.
///
/// This is what the crate is tested against and what a caller can reach
/// for when no external datastore is wired up yet; a production deployment
/// supplies its own `EndpointStore` (Postgres, Redis, ...).
#[derive(Default)]
pub struct InMemoryEndpointStore {
    rows: DashMap<String, Endpoint>,
}

impl InMemoryEndpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with an endpoint, for tests and examples.
    pub fn seed(&self, endpoint: Endpoint) {
        self.rows.insert(endpoint.url.clone(), endpoint);
    }

    fn check_cancel(cancel: &CancellationToken) -> Result<(), StoreError> {
        if cancel.is_cancelled() {
            Err(StoreError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl EndpointStore for InMemoryEndpointStore {
    async fn get_by_chain_and_state(
        &self,
        chain: u64,
        state: EndpointState,
        cancel: &CancellationToken,
    ) -> Result<Vec<Endpoint>, StoreError> {
        Self::check_cancel(cancel)?;
        let mut rows: Vec<Endpoint> = self
            .rows
            .iter()
            .map(|r| r.value().clone())
            .filter(|e| e.chain == chain && e.state == state)
            .collect();
        rows.sort_by_key(|e| e.rank_key());
        Ok(rows)
    }

    async fn get_by_chain(
        &self,
        chain: u64,
        cancel: &CancellationToken,
    ) -> Result<Vec<Endpoint>, StoreError> {
        Self::check_cancel(cancel)?;
        Ok(self
            .rows
            .iter()
            .map(|r| r.value().clone())
            .filter(|e| e.chain == chain)
            .collect())
    }

    async fn get_by_url(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Endpoint>, StoreError> {
        Self::check_cancel(cancel)?;
        Ok(self.rows.get(url).map(|r| r.value().clone()))
    }

    async fn get_by_id(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<Endpoint>, StoreError> {
        Self::check_cancel(cancel)?;
        Ok(self.rows.iter().map(|r| r.value().clone()).find(|e| e.id == id))
    }

    async fn get_all(&self, cancel: &CancellationToken) -> Result<Vec<Endpoint>, StoreError> {
        Self::check_cancel(cancel)?;
        Ok(self.rows.iter().map(|r| r.value().clone()).collect())
    }

    async fn add(&self, mut endpoint: Endpoint, cancel: &CancellationToken) -> Result<(), StoreError> {
        Self::check_cancel(cancel)?;
        let now = Utc::now();
        endpoint.created_at = now;
        endpoint.modified_at = now;
        self.rows.insert(endpoint.url.clone(), endpoint);
        Ok(())
    }

    async fn update(
        &self,
        mut endpoint: Endpoint,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        Self::check_cancel(cancel)?;
        endpoint.modified_at = Utc::now();
        self.rows.insert(endpoint.url.clone(), endpoint);
        Ok(())
    }
}
