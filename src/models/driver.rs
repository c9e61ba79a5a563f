use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;
use crate::models::request::ServiceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverStatus {
    Available,
    Busy,
    Offline,
}

/// Last reported position of a driver. `available` is the
/// location-availability flag the assignment commit flips off together
/// with the driver status and the request binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverLocation {
    pub point: GeoPoint,
    pub accuracy_m: Option<f64>,
    pub bearing: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub recorded_at: DateTime<Utc>,
    pub available: bool,
}

/// Driver record as the geospatial store returns it from a range query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverSnapshot {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub region: String,
    /// 0–5 stars.
    pub rating: f64,
    pub total_trips: u64,
    /// Rolling acceptance rate, 0–100.
    pub acceptance_rate: f64,
    pub services: Vec<ServiceKind>,
    pub vehicle: String,
    pub location: DriverLocation,
    pub status: DriverStatus,
    pub active_bookings: u32,
}

/// Per-attempt view of a driver's matchability. Derived, short-lived,
/// reconstructed on every match run; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverCandidate {
    pub driver: DriverSnapshot,
    pub distance_km: f64,
    pub eta_minutes: f64,
    /// Populated by the scoring engine; 0–100.
    pub matching_score: f64,
}
