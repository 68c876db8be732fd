//! Operator-facing metrics over the `Endpoint` shape.
//!
//! These are a snapshot view over whatever the `EndpointStore` currently
//! holds; the core has no counters of its own beyond what is already
//! persisted.

use crate::endpoint::{Endpoint, EndpointState};
use serde::{Deserialize, Serialize};

/// Point-in-time health summary for one chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainHealthSummary {
    pub chain: u64,
    pub active: usize,
    pub error: usize,
    pub disabled: usize,
    pub endpoints: Vec<EndpointSnapshot>,
}

/// Serializable subset of [`Endpoint`] for dashboards/logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSnapshot {
    pub url: String,
    pub state: EndpointState,
    pub priority: u32,
    pub consecutive_errors: u32,
    pub last_error_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<&Endpoint> for EndpointSnapshot {
    fn from(e: &Endpoint) -> Self {
        Self {
            url: e.url.clone(),
            state: e.state,
            priority: e.priority,
            consecutive_errors: e.consecutive_errors,
            last_error_at: e.last_error_at,
        }
    }
}

impl ChainHealthSummary {
    /// Summarize a chain's endpoints, as returned by
    /// `EndpointStore::get_by_chain`.
    pub fn from_endpoints(chain: u64, endpoints: &[Endpoint]) -> Self {
        let mut active = 0;
        let mut error = 0;
        let mut disabled = 0;

        for e in endpoints {
            match e.state {
                EndpointState::Active => active += 1,
                EndpointState::Error => error += 1,
                EndpointState::Disabled => disabled += 1,
            }
        }

        Self {
            chain,
            active,
            error,
            disabled,
            endpoints: endpoints.iter().map(EndpointSnapshot::from).collect(),
        }
    }

    /// Fraction of endpoints currently Active, in `[0.0, 1.0]`. `1.0` when
    /// there are no endpoints at all (vacuously healthy) — the optimistic
    /// default on empty input.
    pub fn active_ratio(&self) -> f64 {
        let total = self.active + self.error + self.disabled;
        if total == 0 {
            return 1.0;
        }
        self.active as f64 / total as f64
    }
}
