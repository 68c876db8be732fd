//! Endpoint data model and state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Health state of an [`Endpoint`].
///
/// Transitions are owned by the [`crate::selector::Selector`] (Active <->
/// Error) and the health loop (Error -> Active on a successful probe).
/// `Disabled` is reached only by out-of-band operator action; the core
/// never writes it and never transitions out of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointState {
    /// Serving selection normally.
    Active,
    /// Failing; eligible for selection again once its backoff elapses.
    Error,
    /// Withdrawn from rotation by an operator.
    Disabled,
}

impl EndpointState {
    /// `true` for the state an operator, not the core, must re-enable from.
    pub fn is_disabled(&self) -> bool {
        matches!(self, EndpointState::Disabled)
    }
}

/// One `(chain, url)` row tracked by the [`crate::store::EndpointStore`].
///
/// See the crate-level docs for the invariants this type must uphold; they
/// are enforced by [`crate::selector::Selector`] and
/// [`crate::health::HealthLoop`], not by this type itself — a bare struct
/// crossing a store boundary cannot enforce invariants on data read back
/// from storage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Endpoint {
    /// Opaque stable identifier.
    pub id: Uuid,

    /// Chain identifier (1 = Ethereum mainnet, 137 = Polygon, ...).
    pub chain: u64,

    /// The JSON-RPC endpoint URL.
    pub url: String,

    /// Current health state.
    pub state: EndpointState,

    /// Non-negative; lower is preferred by the selection policy.
    pub priority: u32,

    /// Failures since the last recorded success. Reset to 0 on success.
    pub consecutive_errors: u32,

    /// Free-text reason for the most recent failure, if any.
    pub error_message: Option<String>,

    /// Timestamp of the most recent failure, if any.
    pub last_error_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Endpoint {
    /// Construct a new endpoint in the initial `Active` state.
    ///
    /// Initial-state assignment is an operator responsibility, not the
    /// core's; this constructor exists for tests and for
    /// `EndpointStore::add` callers that need to stamp a fresh row, not as
    /// a "seed an endpoint" API (seeding is out of scope for the core).
    pub fn new(chain: u64, url: impl Into<String>, priority: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            chain,
            url: url.into(),
            state: EndpointState::Active,
            priority,
            consecutive_errors: 0,
            error_message: None,
            last_error_at: None,
            created_at: now,
            modified_at: now,
        }
    }

    /// The `(priority, consecutive_errors)` pair the selection policy
    /// compares lexicographically.
    pub fn rank_key(&self) -> (u32, u32) {
        (self.priority, self.consecutive_errors)
    }
}
