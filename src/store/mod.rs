pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MatchError;
use crate::geo::GeoPoint;
use crate::models::driver::{DriverCandidate, DriverSnapshot};
use crate::models::request::{RequestStatus, ServiceKind};

/// Spatial range query against the driver-location store.
#[derive(Debug, Clone)]
pub struct DriverQuery {
    pub region: String,
    /// Acceptable driver service types, expanded through the
    /// compatibility map before the query is issued.
    pub services: Vec<ServiceKind>,
    pub center: GeoPoint,
    pub radius_km: f64,
    /// Locations recorded before this instant are too stale to match.
    pub freshest_after: DateTime<Utc>,
}

/// Result of the store's conditional assignment write. The two
/// non-committed variants are race-losses, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    Committed,
    DriverUnavailable,
    RequestTaken,
}

/// Store-side lifecycle record for a request. The binding here is the
/// single source of truth; only `try_assign`/`release` write it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestState {
    pub status: RequestStatus,
    pub driver: Option<Uuid>,
}

/// Geospatial store holding driver positions and the active-booking
/// state. `try_assign` is the single atomic write of the whole engine:
/// it re-validates driver and request and commits binding, driver
/// status and location availability together, or not at all.
#[async_trait]
pub trait DriverStore: Send + Sync {
    async fn find_available(&self, query: &DriverQuery) -> Result<Vec<DriverSnapshot>, MatchError>;

    async fn try_assign(
        &self,
        driver_id: Uuid,
        request_id: Uuid,
    ) -> Result<AssignOutcome, MatchError>;

    /// Reverses a committed binding (rider cancelled, dispatch
    /// reassigned). Not called by the search loop itself.
    async fn release(&self, driver_id: Uuid, request_id: Uuid) -> Result<(), MatchError>;
}

/// Short-TTL key-value cache in front of the store. Best-effort: any
/// fault or inconsistency here is ignored in favor of the store.
#[async_trait]
pub trait CandidateCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<DriverCandidate>>, MatchError>;

    async fn set_with_expiry(
        &self,
        key: &str,
        value: Vec<DriverCandidate>,
        ttl: Duration,
    ) -> Result<(), MatchError>;
}

pub fn cache_key(region: &str, service: ServiceKind, radius_km: f64) -> String {
    format!("{region}:{service}:{radius_km:.1}")
}
