use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::MatchError;
use crate::geo::GeoPoint;

/// Payload published once an assignment commits: enough for the driver
/// app to accept the job and for regional observers to track outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentNotification {
    pub request_id: Uuid,
    pub reference: String,
    pub rider_id: Uuid,
    pub driver_id: Uuid,
    pub driver_name: String,
    pub driver_phone: String,
    pub driver_rating: f64,
    pub vehicle: String,
    pub driver_location: GeoPoint,
    pub matching_score: f64,
    pub estimated_pickup_at: DateTime<Utc>,
    pub region: String,
    pub sent_at: DateTime<Utc>,
}

/// Fire-and-forget publish channel. The engine never waits on, or
/// fails because of, delivery.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn publish(&self, notification: AssignmentNotification) -> Result<(), MatchError>;
}

/// Broadcast-backed channel; subscribers are driver-app gateways and
/// regional dashboards.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<AssignmentNotification>,
}

impl BroadcastNotifier {
    pub fn new(buffer: usize) -> Self {
        let (tx, _unused_rx) = broadcast::channel(buffer);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AssignmentNotification> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl NotificationChannel for BroadcastNotifier {
    async fn publish(&self, notification: AssignmentNotification) -> Result<(), MatchError> {
        // No subscribers is fine; assignments commit regardless.
        let _ = self.tx.send(notification);
        Ok(())
    }
}
