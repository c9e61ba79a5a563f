use std::collections::HashMap;
use std::env;

use crate::error::MatchError;
use crate::models::request::ServiceKind;

/// Scoring weight vector. Must sum to 1.0.
#[derive(Debug, Clone, Copy)]
pub struct ScoreWeights {
    pub distance: f64,
    pub rating: f64,
    pub experience: f64,
    pub acceptance: f64,
    pub eta: f64,
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.distance + self.rating + self.experience + self.acceptance + self.eta
    }
}

/// Daily congestion window in whole hours, `[start, end)`. A window
/// with `start > end` wraps past midnight.
#[derive(Debug, Clone, Copy)]
pub struct RushWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl RushWindow {
    pub fn contains(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// Static matching policy, immutable for the lifetime of one engine.
#[derive(Debug, Clone)]
pub struct MatchingConfig {
    pub max_radius_km: f64,
    pub max_assignment_time_ms: u64,
    /// Ascending progressive-search radii.
    pub radius_steps_km: Vec<f64>,
    pub weights: ScoreWeights,
    /// Which driver service types may fulfill each request type.
    pub compatibility: HashMap<ServiceKind, Vec<ServiceKind>>,
    /// Assign immediately when the top score reaches this, or the
    /// radius is still small. Carried over from observed production
    /// defaults; not known to be tuned optimally.
    pub early_accept_score: f64,
    pub early_accept_radius_km: f64,
    /// Stop widening once a good-enough candidate exists at mid radius.
    pub early_stop_score: f64,
    pub early_stop_radius_km: f64,
    /// Scores closer than this are tied; ties break by distance.
    pub tie_epsilon: f64,
    /// Locations older than this are not eligible at all.
    pub location_staleness_secs: i64,
    pub cache_ttl_secs: u64,
    pub rush_windows: [RushWindow; 2],
    pub avg_urban_speed_kmh: f64,
    pub rush_multiplier: f64,
    pub min_eta_minutes: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_radius_km: 15.0,
            max_assignment_time_ms: 30_000,
            radius_steps_km: vec![2.0, 5.0, 8.0, 12.0, 15.0],
            weights: ScoreWeights {
                distance: 0.30,
                rating: 0.20,
                experience: 0.15,
                acceptance: 0.15,
                eta: 0.20,
            },
            compatibility: default_compatibility(),
            early_accept_score: 80.0,
            early_accept_radius_km: 5.0,
            early_stop_score: 70.0,
            early_stop_radius_km: 8.0,
            tie_epsilon: 0.5,
            location_staleness_secs: 120,
            cache_ttl_secs: 30,
            rush_windows: [
                RushWindow {
                    start_hour: 7,
                    end_hour: 10,
                },
                RushWindow {
                    start_hour: 17,
                    end_hour: 20,
                },
            ],
            avg_urban_speed_kmh: 25.0,
            rush_multiplier: 1.3,
            min_eta_minutes: 2.0,
        }
    }
}

impl MatchingConfig {
    pub fn from_env() -> Result<Self, MatchError> {
        let _ = dotenvy::dotenv();

        let defaults = Self::default();
        let radius_steps_km = match env::var("MATCH_RADIUS_STEPS_KM") {
            Ok(raw) => raw
                .split(',')
                .map(|step| {
                    step.trim().parse::<f64>().map_err(|err| {
                        MatchError::InvalidConfig(format!("invalid MATCH_RADIUS_STEPS_KM: {err}"))
                    })
                })
                .collect::<Result<Vec<f64>, MatchError>>()?,
            Err(_) => defaults.radius_steps_km.clone(),
        };

        let config = Self {
            max_radius_km: parse_or_default("MATCH_MAX_RADIUS_KM", defaults.max_radius_km)?,
            max_assignment_time_ms: parse_or_default(
                "MATCH_MAX_ASSIGNMENT_TIME_MS",
                defaults.max_assignment_time_ms,
            )?,
            radius_steps_km,
            cache_ttl_secs: parse_or_default("MATCH_CACHE_TTL_SECS", defaults.cache_ttl_secs)?,
            location_staleness_secs: parse_or_default(
                "MATCH_LOCATION_STALENESS_SECS",
                defaults.location_staleness_secs,
            )?,
            avg_urban_speed_kmh: parse_or_default(
                "MATCH_AVG_SPEED_KMH",
                defaults.avg_urban_speed_kmh,
            )?,
            ..defaults
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if (self.weights.sum() - 1.0).abs() > 1e-6 {
            return Err(MatchError::InvalidConfig(format!(
                "score weights must sum to 1.0, got {}",
                self.weights.sum()
            )));
        }
        if self.radius_steps_km.is_empty() {
            return Err(MatchError::InvalidConfig(
                "radius step list is empty".to_string(),
            ));
        }
        let ascending = self
            .radius_steps_km
            .windows(2)
            .all(|pair| pair[0] < pair[1]);
        if !ascending {
            return Err(MatchError::InvalidConfig(
                "radius steps must be strictly ascending".to_string(),
            ));
        }
        if let Some(&last) = self.radius_steps_km.last() {
            if last > self.max_radius_km {
                return Err(MatchError::InvalidConfig(format!(
                    "largest radius step {last} exceeds max radius {}",
                    self.max_radius_km
                )));
            }
        }
        if self.max_assignment_time_ms == 0 {
            return Err(MatchError::InvalidConfig(
                "max assignment time must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Driver service types that may fulfill `requested`. Falls back to
    /// exact match if the compatibility map has no entry.
    pub fn compatible_services(&self, requested: ServiceKind) -> Vec<ServiceKind> {
        self.compatibility
            .get(&requested)
            .cloned()
            .unwrap_or_else(|| vec![requested])
    }
}

/// A 4-wheel vehicle may also serve 2-wheel requests, never the
/// reverse; delivery tiers accept the next-lighter vehicle class.
fn default_compatibility() -> HashMap<ServiceKind, Vec<ServiceKind>> {
    HashMap::from([
        (ServiceKind::Ride, vec![ServiceKind::Ride]),
        (
            ServiceKind::RideMini,
            vec![ServiceKind::RideMini, ServiceKind::Ride],
        ),
        (
            ServiceKind::ParcelDelivery,
            vec![ServiceKind::ParcelDelivery, ServiceKind::RideMini],
        ),
        (
            ServiceKind::FoodDelivery,
            vec![ServiceKind::FoodDelivery, ServiceKind::ParcelDelivery],
        ),
        (
            ServiceKind::MartDelivery,
            vec![ServiceKind::MartDelivery, ServiceKind::FoodDelivery],
        ),
    ])
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, MatchError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| MatchError::InvalidConfig(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(MatchingConfig::default().validate().is_ok());
    }

    #[test]
    fn unbalanced_weights_are_rejected() {
        let mut config = MatchingConfig::default();
        config.weights.distance = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_order_radius_steps_are_rejected() {
        let config = MatchingConfig {
            radius_steps_km: vec![5.0, 2.0, 8.0],
            ..MatchingConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn car_covers_two_wheel_but_not_the_reverse() {
        let config = MatchingConfig::default();
        assert!(config
            .compatible_services(ServiceKind::RideMini)
            .contains(&ServiceKind::Ride));
        assert!(!config
            .compatible_services(ServiceKind::Ride)
            .contains(&ServiceKind::RideMini));
    }

    #[test]
    fn rush_window_wraps_past_midnight() {
        let window = RushWindow {
            start_hour: 22,
            end_hour: 2,
        };
        assert!(window.contains(23));
        assert!(window.contains(1));
        assert!(!window.contains(12));
    }
}
