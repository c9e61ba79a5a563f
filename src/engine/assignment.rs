use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::MatchError;
use crate::models::driver::DriverCandidate;
use crate::models::request::RideRequest;
use crate::notify::{AssignmentNotification, NotificationChannel};
use crate::store::{AssignOutcome, DriverStore};

/// Commits the request→driver binding through the store's atomic
/// conditional write and fires the assignment notification. The sole
/// writer of the binding; everything else in the engine only reads.
pub struct AssignmentExecutor {
    store: Arc<dyn DriverStore>,
    notifier: Arc<dyn NotificationChannel>,
    clock: Arc<dyn Clock>,
}

impl AssignmentExecutor {
    pub fn new(
        store: Arc<dyn DriverStore>,
        notifier: Arc<dyn NotificationChannel>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
        }
    }

    /// The store re-validates driver availability and request state
    /// inside its transactional boundary; a non-committed outcome is
    /// the expected race-loss path, not a failure.
    pub async fn assign(
        &self,
        candidate: &DriverCandidate,
        request: &RideRequest,
    ) -> Result<AssignOutcome, MatchError> {
        let outcome = self
            .store
            .try_assign(candidate.driver.id, request.id)
            .await?;

        match outcome {
            AssignOutcome::Committed => {
                info!(
                    request_id = %request.id,
                    driver_id = %candidate.driver.id,
                    score = candidate.matching_score,
                    distance_km = candidate.distance_km,
                    "driver assigned"
                );
                self.notify(candidate, request).await;
            }
            AssignOutcome::DriverUnavailable => {
                debug!(
                    request_id = %request.id,
                    driver_id = %candidate.driver.id,
                    "driver no longer available"
                );
            }
            AssignOutcome::RequestTaken => {
                debug!(request_id = %request.id, "request claimed by a concurrent match");
            }
        }

        Ok(outcome)
    }

    /// Reverses a committed assignment (rider cancel, dispatch
    /// override). Cancelling a search loop never calls this implicitly.
    pub async fn unassign(&self, driver_id: Uuid, request_id: Uuid) -> Result<(), MatchError> {
        self.store.release(driver_id, request_id).await?;
        info!(%request_id, %driver_id, "assignment released");
        Ok(())
    }

    // Notification stays outside the store's atomic section; a failed
    // publish never rolls back a committed assignment.
    async fn notify(&self, candidate: &DriverCandidate, request: &RideRequest) {
        let now = self.clock.now();
        let notification = AssignmentNotification {
            request_id: request.id,
            reference: request.reference.clone(),
            rider_id: request.rider_id,
            driver_id: candidate.driver.id,
            driver_name: candidate.driver.name.clone(),
            driver_phone: candidate.driver.phone.clone(),
            driver_rating: candidate.driver.rating,
            vehicle: candidate.driver.vehicle.clone(),
            driver_location: candidate.driver.location.point,
            matching_score: candidate.matching_score,
            estimated_pickup_at: now + Duration::seconds((candidate.eta_minutes * 60.0) as i64),
            region: request.region.clone(),
            sent_at: now,
        };

        if let Err(err) = self.notifier.publish(notification).await {
            warn!(request_id = %request.id, error = %err, "assignment notification failed");
        }
    }
}
