//! Selection policy: deterministic lexicographic-minimum choice.
//!
//! This plays the role a pluggable `SelectionStrategy` trait object would,
//! but is a free function instead: there is exactly one selection policy
//! here (no pluggable round-robin/latency strategies), so making it an
//! extension point would be inventing a knob nothing asks for.

use crate::endpoint::Endpoint;

/// Choose the endpoint with the smallest `(priority, consecutive_errors)`
/// pair. Ties are broken by whichever order `candidates` is given in — no
/// randomization, no stronger promise.
pub fn pick_best(candidates: &[Endpoint]) -> Option<&Endpoint> {
    candidates.iter().min_by_key(|e| e.rank_key())
}
