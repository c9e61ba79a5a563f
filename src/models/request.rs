use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceKind {
    Ride,
    RideMini,
    ParcelDelivery,
    FoodDelivery,
    MartDelivery,
}

impl ServiceKind {
    /// Stable lowercase name, used in cache keys and telemetry labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Ride => "ride",
            ServiceKind::RideMini => "ride_mini",
            ServiceKind::ParcelDelivery => "parcel",
            ServiceKind::FoodDelivery => "food",
            ServiceKind::MartDelivery => "mart",
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a demand event as the store tracks it. The matching
/// core only ever moves a request from `Searching` to `Assigned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Searching,
    Assigned,
    Cancelled,
    Expired,
}

/// Immutable description of a demand event. Read-only to the matching
/// core; the request→driver binding lives in the store, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideRequest {
    pub id: Uuid,
    pub reference: String,
    pub rider_id: Uuid,
    pub service: ServiceKind,
    pub pickup: GeoPoint,
    pub pickup_address: String,
    pub dropoff: Option<GeoPoint>,
    pub region: String,
    pub surge: f64,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub rider_rating: Option<f64>,
    pub created_at: DateTime<Utc>,
}
