use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::driver::DriverCandidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchFailure {
    /// No driver survived the compatibility/radius/availability filter
    /// at any radius step. A normal outcome, not a fault.
    NoDrivers,
    /// The global assignment budget expired mid-search.
    Timeout,
    /// Every assignment attempt lost to a concurrent matching run.
    AssignmentRace,
    /// The request was cancelled or claimed before this run could bind it.
    Cancelled,
}

impl std::fmt::Display for MatchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            MatchFailure::NoDrivers => "no available drivers found in search area",
            MatchFailure::Timeout => "matching timed out",
            MatchFailure::AssignmentRace => "all assignment attempts lost to concurrent matches",
            MatchFailure::Cancelled => "request no longer matchable",
        };
        f.write_str(reason)
    }
}

/// Outcome of one matching run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingResult {
    pub success: bool,
    pub driver: Option<DriverCandidate>,
    /// Up to 4 runners-up from the winning radius step.
    pub alternatives: Vec<DriverCandidate>,
    pub matching_time_ms: u64,
    /// Radius at which the run succeeded or gave up.
    pub search_radius_km: f64,
    /// Total candidates evaluated across all radius steps.
    pub candidates_evaluated: u32,
    pub failure: Option<MatchFailure>,
    pub retry_recommended: bool,
    pub estimated_pickup_at: Option<DateTime<Utc>>,
}
