use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::MatchingConfig;
use crate::engine::eta::estimate_eta_minutes;
use crate::error::MatchError;
use crate::geo::haversine_km;
use crate::models::driver::{DriverCandidate, DriverStatus};
use crate::models::request::RideRequest;
use crate::store::{cache_key, CandidateCache, DriverQuery, DriverStore};

/// One way of producing candidates for a radius step. `Ok(None)` means
/// "this source cannot answer" (cache miss); an empty `Some` is a real
/// answer meaning nobody qualifies.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn candidates(
        &self,
        request: &RideRequest,
        radius_km: f64,
    ) -> Result<Option<Vec<DriverCandidate>>, MatchError>;
}

/// Serves memoized candidate lists. A hit is re-filtered against the
/// current pickup point and availability flags; it is an optimization
/// only, never a correctness guarantee.
pub struct CacheSource {
    cache: Arc<dyn CandidateCache>,
    config: Arc<MatchingConfig>,
    clock: Arc<dyn Clock>,
}

#[async_trait]
impl CandidateSource for CacheSource {
    async fn candidates(
        &self,
        request: &RideRequest,
        radius_km: f64,
    ) -> Result<Option<Vec<DriverCandidate>>, MatchError> {
        let key = cache_key(&request.region, request.service, radius_km);
        let Some(cached) = self.cache.get(&key).await? else {
            return Ok(None);
        };

        let now = self.clock.now();
        // The TTL is shorter than the staleness bound today, but the
        // eligibility rule must hold even if the config inverts that.
        let freshest_after =
            now - ChronoDuration::seconds(self.config.location_staleness_secs);
        let refreshed: Vec<DriverCandidate> = cached
            .into_iter()
            .filter(|candidate| {
                candidate.driver.status == DriverStatus::Available
                    && candidate.driver.location.available
                    && candidate.driver.active_bookings == 0
                    && candidate.driver.location.recorded_at >= freshest_after
            })
            .filter_map(|mut candidate| {
                // Distance is against this request's pickup, not the
                // pickup the entry was built for.
                let distance = haversine_km(&candidate.driver.location.point, &request.pickup);
                if distance > radius_km {
                    return None;
                }
                candidate.distance_km = distance;
                candidate.eta_minutes = estimate_eta_minutes(
                    &self.config,
                    distance,
                    candidate.driver.location.speed_kmh,
                    now,
                );
                Some(candidate)
            })
            .collect();

        if refreshed.is_empty() {
            // A hit filtered down to nothing is treated as a miss so
            // the store still gets consulted.
            return Ok(None);
        }

        debug!(key = %key, hits = refreshed.len(), "candidate cache hit");
        Ok(Some(refreshed))
    }
}

/// Issues the spatial range query against the driver-location store.
/// Always answers; the single source of truth.
pub struct StoreSource {
    store: Arc<dyn DriverStore>,
    config: Arc<MatchingConfig>,
    clock: Arc<dyn Clock>,
}

#[async_trait]
impl CandidateSource for StoreSource {
    async fn candidates(
        &self,
        request: &RideRequest,
        radius_km: f64,
    ) -> Result<Option<Vec<DriverCandidate>>, MatchError> {
        let now = self.clock.now();
        let query = DriverQuery {
            region: request.region.clone(),
            services: self.config.compatible_services(request.service),
            center: request.pickup,
            radius_km,
            freshest_after: now - ChronoDuration::seconds(self.config.location_staleness_secs),
        };

        let drivers = self.store.find_available(&query).await?;
        let candidates = drivers
            .into_iter()
            .map(|driver| {
                let distance = haversine_km(&driver.location.point, &request.pickup);
                let eta =
                    estimate_eta_minutes(&self.config, distance, driver.location.speed_kmh, now);
                DriverCandidate {
                    driver,
                    distance_km: distance,
                    eta_minutes: eta,
                    matching_score: 0.0,
                }
            })
            .collect();

        Ok(Some(candidates))
    }
}

/// Cache-then-store candidate lookup for one radius step. Store and
/// cache faults degrade to an empty step; an empty list is a normal
/// outcome, never an error.
pub struct CandidateFinder {
    cache_source: CacheSource,
    store_source: StoreSource,
    cache: Arc<dyn CandidateCache>,
    config: Arc<MatchingConfig>,
}

impl CandidateFinder {
    pub fn new(
        store: Arc<dyn DriverStore>,
        cache: Arc<dyn CandidateCache>,
        config: Arc<MatchingConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache_source: CacheSource {
                cache: cache.clone(),
                config: config.clone(),
                clock: clock.clone(),
            },
            store_source: StoreSource {
                store,
                config: config.clone(),
                clock,
            },
            cache,
            config,
        }
    }

    pub async fn find(&self, request: &RideRequest, radius_km: f64) -> Vec<DriverCandidate> {
        match self.cache_source.candidates(request, radius_km).await {
            Ok(Some(candidates)) => return candidates,
            Ok(None) => {}
            Err(err) => {
                warn!(request_id = %request.id, error = %err, "candidate cache lookup failed");
            }
        }

        let found = match self.store_source.candidates(request, radius_km).await {
            Ok(Some(candidates)) => candidates,
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(
                    request_id = %request.id,
                    radius_km,
                    error = %err,
                    "driver store query failed; treating step as empty"
                );
                return Vec::new();
            }
        };

        if !found.is_empty() {
            let key = cache_key(&request.region, request.service, radius_km);
            let ttl = Duration::from_secs(self.config.cache_ttl_secs);
            if let Err(err) = self.cache.set_with_expiry(&key, found.clone(), ttl).await {
                warn!(key = %key, error = %err, "candidate cache write failed");
            }
        }

        found
    }
}
