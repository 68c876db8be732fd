//! # rpc-endpoint-selector
//!
//! An RPC endpoint selection and failover engine for blockchain clients.
//! Given a chain identifier, it returns the URL of the best currently
//! healthy JSON-RPC endpoint for that chain, tracks per-endpoint
//! success/failure, transitions endpoints between health states, enforces
//! exponential backoff on failed endpoints, and periodically rehabilitates
//! endpoints that have recovered.
//!
//! ## Shape
//!
//! - **Endpoint Store** ([`store::EndpointStore`]) and **Selection Cache**
//!   ([`cache::SelectionCache`]) are collaborator traits the core depends
//!   on but never implements a production backend for — bring your own
//!   Postgres/Redis/whatever; an in-memory reference
//!   implementation of each is included for tests and standalone use.
//! - **Selector** ([`selector::Selector`]) is the `GetBest`/`GetNext`/
//!   `MarkSuccess`/`MarkFailure` state machine.
//! - **HealthLoop** ([`health::HealthLoop`]) is the background recovery
//!   task.
//!
//! ## Example
//!
//! ```rust,no_run
//! use rpc_endpoint_selector::{
//!     cache::InMemoryCache,
//!     clock::SystemClock,
//!     config::SelectorConfig,
//!     endpoint::Endpoint,
//!     selector::Selector,
//!     store::{EndpointStore, InMemoryEndpointStore},
//! };
//! use chrono::Utc;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InMemoryEndpointStore::new());
//!     let cache = Arc::new(InMemoryCache::new());
//!     let cancel = CancellationToken::new();
//!
//!     store
//!         .add(Endpoint::new(1, "https://rpc.example.com", 10, Utc::now()), &cancel)
//!         .await?;
//!
//!     let selector = Selector::new(store, cache, Arc::new(SystemClock), SelectorConfig::new());
//!
//!     let url = selector.get_best(1, &cancel).await?;
//!     println!("best endpoint for chain 1: {url}");
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod cache;
pub mod clock;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod health;
pub mod metrics;
pub mod policy;
pub mod prober;
pub mod selector;
pub mod store;

pub use backoff::BackoffConfig;
pub use cache::{InMemoryCache, SelectionCache};
pub use clock::{Clock, SystemClock};
pub use config::SelectorConfig;
pub use endpoint::{Endpoint, EndpointState};
pub use error::{ProbeError, SelectorError};
pub use health::{HealthLoop, HealthLoopConfig};
pub use metrics::{ChainHealthSummary, EndpointSnapshot};
pub use prober::BlockNumberProber;
pub use selector::Selector;
pub use store::{EndpointStore, InMemoryEndpointStore, StoreError};
