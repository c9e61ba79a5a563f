use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::MatchError;
use crate::geo::haversine_km;
use crate::models::driver::{DriverCandidate, DriverSnapshot, DriverStatus};
use crate::models::request::RequestStatus;
use crate::store::{AssignOutcome, CandidateCache, DriverQuery, DriverStore, RequestState};

/// DashMap-backed driver/request store. Serves embedded deployments
/// and the test suite; the commit mutex makes `try_assign` atomic with
/// respect to every concurrent matching run sharing this store.
pub struct InMemoryDriverStore {
    drivers: DashMap<Uuid, DriverSnapshot>,
    requests: DashMap<Uuid, RequestState>,
    commit: Mutex<()>,
}

impl InMemoryDriverStore {
    pub fn new() -> Self {
        Self {
            drivers: DashMap::new(),
            requests: DashMap::new(),
            commit: Mutex::new(()),
        }
    }

    pub fn upsert_driver(&self, driver: DriverSnapshot) {
        self.drivers.insert(driver.id, driver);
    }

    /// Registers a demand event in `Searching` state, unbound.
    pub fn open_request(&self, request_id: Uuid) {
        self.requests.insert(
            request_id,
            RequestState {
                status: RequestStatus::Searching,
                driver: None,
            },
        );
    }

    pub fn driver(&self, id: Uuid) -> Option<DriverSnapshot> {
        self.drivers.get(&id).map(|entry| entry.value().clone())
    }

    pub fn request(&self, id: Uuid) -> Option<RequestState> {
        self.requests.get(&id).map(|entry| entry.value().clone())
    }
}

impl Default for InMemoryDriverStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DriverStore for InMemoryDriverStore {
    async fn find_available(&self, query: &DriverQuery) -> Result<Vec<DriverSnapshot>, MatchError> {
        let matches = self
            .drivers
            .iter()
            .filter_map(|entry| {
                let driver = entry.value();
                let eligible = driver.region == query.region
                    && driver.status == DriverStatus::Available
                    && driver.location.available
                    && driver.active_bookings == 0
                    && driver.location.recorded_at >= query.freshest_after
                    && driver
                        .services
                        .iter()
                        .any(|service| query.services.contains(service))
                    && haversine_km(&driver.location.point, &query.center) <= query.radius_km;

                if eligible {
                    Some(driver.clone())
                } else {
                    None
                }
            })
            .collect();

        Ok(matches)
    }

    async fn try_assign(
        &self,
        driver_id: Uuid,
        request_id: Uuid,
    ) -> Result<AssignOutcome, MatchError> {
        let _guard = self.commit.lock().await;

        // Re-validate both sides under the commit lock; a concurrent
        // run may have claimed either since this candidate was scored.
        let driver_free = match self.drivers.get(&driver_id) {
            Some(driver) => {
                driver.status == DriverStatus::Available && driver.active_bookings == 0
            }
            None => false,
        };
        if !driver_free {
            debug!(%driver_id, "assignment rejected: driver no longer available");
            return Ok(AssignOutcome::DriverUnavailable);
        }

        let request_open = match self.requests.get(&request_id) {
            Some(request) => {
                request.status == RequestStatus::Searching && request.driver.is_none()
            }
            None => false,
        };
        if !request_open {
            debug!(%request_id, "assignment rejected: request already bound");
            return Ok(AssignOutcome::RequestTaken);
        }

        if let Some(mut request) = self.requests.get_mut(&request_id) {
            request.status = RequestStatus::Assigned;
            request.driver = Some(driver_id);
        }
        if let Some(mut driver) = self.drivers.get_mut(&driver_id) {
            driver.status = DriverStatus::Busy;
            driver.active_bookings += 1;
            driver.location.available = false;
        }

        Ok(AssignOutcome::Committed)
    }

    async fn release(&self, driver_id: Uuid, request_id: Uuid) -> Result<(), MatchError> {
        let _guard = self.commit.lock().await;

        if let Some(mut request) = self.requests.get_mut(&request_id) {
            if request.driver == Some(driver_id) {
                request.status = RequestStatus::Cancelled;
                request.driver = None;
            }
        }
        if let Some(mut driver) = self.drivers.get_mut(&driver_id) {
            driver.active_bookings = driver.active_bookings.saturating_sub(1);
            if driver.active_bookings == 0 {
                driver.status = DriverStatus::Available;
                driver.location.available = true;
            }
        }

        Ok(())
    }
}

struct CacheEntry {
    expires_at: Instant,
    candidates: Vec<DriverCandidate>,
}

/// TTL key-value cache over a DashMap. Expired entries are dropped
/// lazily on read.
pub struct InMemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CandidateCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<DriverCandidate>>, MatchError> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > Instant::now() {
                return Ok(Some(entry.candidates.clone()));
            }
        }
        self.entries.remove(key);
        Ok(None)
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: Vec<DriverCandidate>,
        ttl: Duration,
    ) -> Result<(), MatchError> {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                expires_at: Instant::now() + ttl,
                candidates: value,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::geo::GeoPoint;
    use crate::models::driver::DriverLocation;
    use crate::models::request::ServiceKind;

    fn snapshot(seed: u128) -> DriverSnapshot {
        DriverSnapshot {
            id: Uuid::from_u128(seed),
            name: format!("driver-{seed}"),
            phone: "+63-900-000-0001".to_string(),
            region: "mnl-south".to_string(),
            rating: 4.6,
            total_trips: 320,
            acceptance_rate: 88.0,
            services: vec![ServiceKind::Ride],
            vehicle: "sedan".to_string(),
            location: DriverLocation {
                point: GeoPoint {
                    lat: 14.5547,
                    lng: 121.0244,
                },
                accuracy_m: None,
                bearing: None,
                speed_kmh: None,
                recorded_at: Utc::now(),
                available: true,
            },
            status: DriverStatus::Available,
            active_bookings: 0,
        }
    }

    fn query() -> DriverQuery {
        DriverQuery {
            region: "mnl-south".to_string(),
            services: vec![ServiceKind::Ride],
            center: GeoPoint {
                lat: 14.5547,
                lng: 121.0244,
            },
            radius_km: 5.0,
            freshest_after: Utc::now() - ChronoDuration::seconds(120),
        }
    }

    #[tokio::test]
    async fn second_assignment_of_the_same_driver_is_rejected() {
        let store = InMemoryDriverStore::new();
        store.upsert_driver(snapshot(1));
        let first = Uuid::from_u128(100);
        let second = Uuid::from_u128(101);
        store.open_request(first);
        store.open_request(second);

        let driver_id = Uuid::from_u128(1);
        let won = store.try_assign(driver_id, first).await.unwrap();
        let lost = store.try_assign(driver_id, second).await.unwrap();

        assert_eq!(won, AssignOutcome::Committed);
        assert_eq!(lost, AssignOutcome::DriverUnavailable);
    }

    #[tokio::test]
    async fn second_assignment_of_the_same_request_is_rejected() {
        let store = InMemoryDriverStore::new();
        store.upsert_driver(snapshot(1));
        store.upsert_driver(snapshot(2));
        let request_id = Uuid::from_u128(100);
        store.open_request(request_id);

        let won = store.try_assign(Uuid::from_u128(1), request_id).await.unwrap();
        let lost = store.try_assign(Uuid::from_u128(2), request_id).await.unwrap();

        assert_eq!(won, AssignOutcome::Committed);
        assert_eq!(lost, AssignOutcome::RequestTaken);
    }

    #[tokio::test]
    async fn commit_flips_driver_and_location_state_together() {
        let store = InMemoryDriverStore::new();
        store.upsert_driver(snapshot(1));
        let request_id = Uuid::from_u128(100);
        store.open_request(request_id);

        store.try_assign(Uuid::from_u128(1), request_id).await.unwrap();

        let driver = store.driver(Uuid::from_u128(1)).unwrap();
        assert_eq!(driver.status, DriverStatus::Busy);
        assert!(!driver.location.available);
        assert_eq!(driver.active_bookings, 1);

        // Busy drivers disappear from spatial queries immediately.
        let found = store.find_available(&query()).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn release_restores_availability() {
        let store = InMemoryDriverStore::new();
        store.upsert_driver(snapshot(1));
        let request_id = Uuid::from_u128(100);
        store.open_request(request_id);
        store.try_assign(Uuid::from_u128(1), request_id).await.unwrap();

        store.release(Uuid::from_u128(1), request_id).await.unwrap();

        let driver = store.driver(Uuid::from_u128(1)).unwrap();
        assert_eq!(driver.status, DriverStatus::Available);
        assert!(driver.location.available);
        assert_eq!(store.request(request_id).unwrap().status, RequestStatus::Cancelled);
    }

    #[tokio::test]
    async fn stale_locations_are_filtered_out_of_queries() {
        let store = InMemoryDriverStore::new();
        let mut stale = snapshot(1);
        stale.location.recorded_at = Utc::now() - ChronoDuration::minutes(10);
        store.upsert_driver(stale);
        store.upsert_driver(snapshot(2));

        let found = store.find_available(&query()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, Uuid::from_u128(2));
    }

    #[tokio::test]
    async fn incompatible_service_types_are_filtered_out() {
        let store = InMemoryDriverStore::new();
        let mut bike = snapshot(1);
        bike.services = vec![ServiceKind::RideMini];
        store.upsert_driver(bike);

        // A 2-wheel driver cannot serve a 4-wheel ride query.
        let found = store.find_available(&query()).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn cache_entries_expire_after_their_ttl() {
        let cache = InMemoryCache::new();
        cache
            .set_with_expiry("mnl-south:ride:2.0", Vec::new(), Duration::from_millis(20))
            .await
            .unwrap();

        assert!(cache.get("mnl-south:ride:2.0").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get("mnl-south:ride:2.0").await.unwrap().is_none());
    }
}
