use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::config::MatchingConfig;
use crate::models::driver::DriverCandidate;
use crate::models::request::RideRequest;

/// A candidate reporting more than this speed is considered in motion,
/// which correlates with responsiveness.
const MOVING_SPEED_KMH: f64 = 5.0;
/// Riders below this historical rating get paired with strong drivers.
const DIFFICULT_RIDER_RATING: f64 = 3.5;
const STRONG_DRIVER_RATING: f64 = 4.5;
/// Staleness penalty starts after this many seconds...
const FRESH_LOCATION_SECS: i64 = 60;
/// ...and reaches the cap two minutes later.
const STALENESS_PENALTY_CAP: f64 = 20.0;
const STALENESS_PENALTY_PER_SEC: f64 = STALENESS_PENALTY_CAP / 120.0;

const EXACT_SERVICE_BONUS: f64 = 10.0;
const MOVING_BONUS: f64 = 5.0;
const DIFFICULT_RIDER_BONUS: f64 = 5.0;

/// Populates `matching_score` on every candidate and returns them
/// sorted best-first. Scores are always in [0, 100]; ties within the
/// configured epsilon rank the closer driver first.
pub fn score_candidates(
    config: &MatchingConfig,
    mut candidates: Vec<DriverCandidate>,
    request: &RideRequest,
    elapsed_ms: u64,
    now: DateTime<Utc>,
) -> Vec<DriverCandidate> {
    let urgency = urgency_multiplier(config, elapsed_ms);

    for candidate in &mut candidates {
        candidate.matching_score = compute_score(config, candidate, request, urgency, now);
    }

    candidates.sort_by(|a, b| rank(config.tie_epsilon, a, b));
    candidates
}

/// Grows linearly from 1.0 toward 2.0 as the assignment budget burns
/// down, so distance matters more the longer the search runs.
fn urgency_multiplier(config: &MatchingConfig, elapsed_ms: u64) -> f64 {
    let consumed = elapsed_ms as f64 / config.max_assignment_time_ms as f64;
    (1.0 + consumed).min(2.0)
}

fn compute_score(
    config: &MatchingConfig,
    candidate: &DriverCandidate,
    request: &RideRequest,
    urgency: f64,
    now: DateTime<Utc>,
) -> f64 {
    let driver = &candidate.driver;

    let proximity = (1.0 - candidate.distance_km / config.max_radius_km).clamp(0.0, 1.0) * 100.0;
    let distance_term = (proximity * urgency).min(100.0);
    let rating_term = (driver.rating / 5.0).clamp(0.0, 1.0) * 100.0;
    let experience_term = (((driver.total_trips + 1) as f64).ln() * 20.0).min(100.0);
    let acceptance_term = driver.acceptance_rate.clamp(0.0, 100.0);
    let eta_term = (100.0 - candidate.eta_minutes * 5.0).max(0.0);

    let weights = &config.weights;
    let mut score = distance_term * weights.distance
        + rating_term * weights.rating
        + experience_term * weights.experience
        + acceptance_term * weights.acceptance
        + eta_term * weights.eta;

    // Exact service in the driver's list beats mere compatibility.
    if driver.services.contains(&request.service) {
        score += EXACT_SERVICE_BONUS;
    }

    if driver
        .location
        .speed_kmh
        .is_some_and(|speed| speed > MOVING_SPEED_KMH)
    {
        score += MOVING_BONUS;
    }

    if request
        .rider_rating
        .is_some_and(|rating| rating < DIFFICULT_RIDER_RATING)
        && driver.rating >= STRONG_DRIVER_RATING
    {
        score += DIFFICULT_RIDER_BONUS;
    }

    score -= staleness_penalty(driver.location.recorded_at, now);

    score.clamp(0.0, 100.0)
}

fn staleness_penalty(recorded_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_secs = (now - recorded_at).num_seconds();
    if age_secs <= FRESH_LOCATION_SECS {
        return 0.0;
    }
    ((age_secs - FRESH_LOCATION_SECS) as f64 * STALENESS_PENALTY_PER_SEC)
        .min(STALENESS_PENALTY_CAP)
}

fn rank(tie_epsilon: f64, a: &DriverCandidate, b: &DriverCandidate) -> Ordering {
    if (a.matching_score - b.matching_score).abs() <= tie_epsilon {
        a.distance_km.total_cmp(&b.distance_km)
    } else {
        b.matching_score.total_cmp(&a.matching_score)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::geo::GeoPoint;
    use crate::models::driver::{DriverLocation, DriverSnapshot, DriverStatus};
    use crate::models::request::ServiceKind;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 13, 0, 0).unwrap()
    }

    fn candidate(id_seed: u128, distance_km: f64, rating: f64) -> DriverCandidate {
        DriverCandidate {
            driver: DriverSnapshot {
                id: Uuid::from_u128(id_seed),
                name: "test-driver".to_string(),
                phone: "+63-900-000-0000".to_string(),
                region: "mnl-south".to_string(),
                rating,
                total_trips: 500,
                acceptance_rate: 90.0,
                services: vec![ServiceKind::Ride],
                vehicle: "sedan".to_string(),
                location: DriverLocation {
                    point: GeoPoint {
                        lat: 14.55,
                        lng: 121.02,
                    },
                    accuracy_m: None,
                    bearing: None,
                    speed_kmh: None,
                    recorded_at: now(),
                    available: true,
                },
                status: DriverStatus::Available,
                active_bookings: 0,
            },
            distance_km,
            eta_minutes: distance_km * 2.5,
            matching_score: 0.0,
        }
    }

    fn request(service: ServiceKind) -> RideRequest {
        RideRequest {
            id: Uuid::new_v4(),
            reference: "BK-1001".to_string(),
            rider_id: Uuid::new_v4(),
            service,
            pickup: GeoPoint {
                lat: 14.55,
                lng: 121.02,
            },
            pickup_address: "Ayala Ave".to_string(),
            dropoff: None,
            region: "mnl-south".to_string(),
            surge: 1.0,
            scheduled_at: None,
            rider_rating: None,
            created_at: now(),
        }
    }

    #[test]
    fn scores_stay_in_bounds_for_extreme_inputs() {
        let config = MatchingConfig::default();
        let req = request(ServiceKind::Ride);

        let mut perfect = candidate(1, 0.0, 5.0);
        perfect.eta_minutes = 0.0;
        perfect.driver.acceptance_rate = 100.0;
        perfect.driver.total_trips = 1_000_000;
        perfect.driver.location.speed_kmh = Some(40.0);

        let mut dismal = candidate(2, 100.0, 0.0);
        dismal.eta_minutes = 500.0;
        dismal.driver.acceptance_rate = 0.0;
        dismal.driver.total_trips = 0;
        dismal.driver.services = vec![ServiceKind::FoodDelivery];
        dismal.driver.location.recorded_at = now() - Duration::minutes(30);

        let ranked = score_candidates(&config, vec![perfect, dismal], &req, 60_000, now());
        for c in &ranked {
            assert!((0.0..=100.0).contains(&c.matching_score), "score {}", c.matching_score);
        }
        assert_eq!(ranked[0].driver.id, Uuid::from_u128(1));
    }

    #[test]
    fn closer_driver_wins_an_exact_tie() {
        let config = MatchingConfig::default();
        let req = request(ServiceKind::Ride);

        let mut near = candidate(1, 1.0, 4.5);
        near.eta_minutes = 5.0;
        // The far driver's rating edge exactly offsets the distance
        // term, so both land on the same score.
        let mut far = candidate(2, 1.2, 4.6);
        far.eta_minutes = 5.0;

        let ranked = score_candidates(&config, vec![far, near], &req, 0, now());

        assert_eq!(ranked[0].driver.id, Uuid::from_u128(1));
    }

    #[test]
    fn stale_location_is_penalized() {
        let config = MatchingConfig::default();
        let req = request(ServiceKind::Ride);

        let fresh = candidate(1, 3.0, 4.5);
        let mut stale = candidate(2, 3.0, 4.5);
        stale.driver.location.recorded_at = now() - Duration::seconds(150);

        let ranked = score_candidates(&config, vec![stale, fresh], &req, 0, now());
        assert_eq!(ranked[0].driver.id, Uuid::from_u128(1));
        assert!(ranked[0].matching_score > ranked[1].matching_score);
    }

    #[test]
    fn exact_service_outranks_compatible_superset() {
        let config = MatchingConfig::default();
        let req = request(ServiceKind::RideMini);

        let mut exact = candidate(1, 3.0, 4.5);
        exact.driver.services = vec![ServiceKind::RideMini];
        let mut compatible = candidate(2, 3.0, 4.5);
        compatible.driver.services = vec![ServiceKind::Ride];

        let ranked = score_candidates(&config, vec![compatible, exact], &req, 0, now());
        assert_eq!(ranked[0].driver.id, Uuid::from_u128(1));
    }

    #[test]
    fn difficult_rider_pairs_with_strong_driver() {
        let config = MatchingConfig::default();
        let mut req = request(ServiceKind::Ride);
        req.rider_rating = Some(2.8);

        let strong = candidate(1, 3.0, 4.8);
        let average = candidate(2, 3.0, 4.8);

        let mut low_rated_req = request(ServiceKind::Ride);
        low_rated_req.rider_rating = Some(4.9);

        let with_bonus = score_candidates(&config, vec![strong], &req, 0, now());
        let without = score_candidates(&config, vec![average], &low_rated_req, 0, now());

        assert!(with_bonus[0].matching_score > without[0].matching_score);
    }

    #[test]
    fn urgency_raises_the_distance_term_late_in_the_search() {
        let config = MatchingConfig::default();
        let req = request(ServiceKind::Ride);

        let early = score_candidates(&config, vec![candidate(1, 6.0, 3.0)], &req, 0, now());
        let late = score_candidates(
            &config,
            vec![candidate(1, 6.0, 3.0)],
            &req,
            config.max_assignment_time_ms,
            now(),
        );

        assert!(late[0].matching_score > early[0].matching_score);
    }
}
