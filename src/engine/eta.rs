use chrono::{DateTime, Timelike, Utc};

use crate::config::MatchingConfig;

/// Straight-line pickup ETA in minutes. Base estimate assumes the
/// configured average urban speed; a known positive instantaneous
/// speed is blended 50/50 with it. Rush windows multiply the result,
/// and it never drops below the configured floor.
pub fn estimate_eta_minutes(
    config: &MatchingConfig,
    distance_km: f64,
    speed_kmh: Option<f64>,
    now: DateTime<Utc>,
) -> f64 {
    let base = distance_km / config.avg_urban_speed_kmh * 60.0;

    let mut eta = match speed_kmh {
        Some(speed) if speed > 0.0 => {
            let live = distance_km / speed * 60.0;
            (base + live) / 2.0
        }
        _ => base,
    };

    if is_rush_hour(config, now) {
        eta *= config.rush_multiplier;
    }

    eta.max(config.min_eta_minutes)
}

pub fn is_rush_hour(config: &MatchingConfig, now: DateTime<Utc>) -> bool {
    let hour = now.hour();
    config.rush_windows.iter().any(|window| window.contains(hour))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn off_peak() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 13, 0, 0).unwrap()
    }

    fn rush() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 8, 30, 0).unwrap()
    }

    #[test]
    fn base_estimate_uses_average_urban_speed() {
        let config = MatchingConfig::default();
        // 5 km at 25 km/h is 12 minutes.
        let eta = estimate_eta_minutes(&config, 5.0, None, off_peak());
        assert!((eta - 12.0).abs() < 1e-9);
    }

    #[test]
    fn known_speed_blends_fifty_fifty() {
        let config = MatchingConfig::default();
        // base 12 min, live at 50 km/h is 6 min, blended 9 min.
        let eta = estimate_eta_minutes(&config, 5.0, Some(50.0), off_peak());
        assert!((eta - 9.0).abs() < 1e-9);
    }

    #[test]
    fn zero_or_negative_speed_is_ignored() {
        let config = MatchingConfig::default();
        let eta = estimate_eta_minutes(&config, 5.0, Some(0.0), off_peak());
        assert!((eta - 12.0).abs() < 1e-9);
    }

    #[test]
    fn rush_hour_applies_congestion_multiplier() {
        let config = MatchingConfig::default();
        let eta = estimate_eta_minutes(&config, 5.0, None, rush());
        assert!((eta - 12.0 * 1.3).abs() < 1e-9);
    }

    #[test]
    fn short_hops_floor_at_two_minutes() {
        let config = MatchingConfig::default();
        let eta = estimate_eta_minutes(&config, 0.1, None, off_peak());
        assert!((eta - config.min_eta_minutes).abs() < 1e-9);
    }
}
