use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Duration as ChronoDuration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::MatchingConfig;
use crate::engine::assignment::AssignmentExecutor;
use crate::engine::finder::CandidateFinder;
use crate::engine::scoring::score_candidates;
use crate::error::MatchError;
use crate::models::driver::DriverCandidate;
use crate::models::request::RideRequest;
use crate::models::result::{MatchFailure, MatchingResult};
use crate::notify::NotificationChannel;
use crate::observability::recorder::{MatchAttempt, PerformanceRecorder};
use crate::store::{AssignOutcome, CandidateCache, DriverStore};

/// Allowance past the assignment budget for scheduling overhead before
/// the outer timeout cuts a stalled run loose.
const SCHEDULING_SLACK_MS: u64 = 500;
const MAX_ALTERNATIVES: usize = 4;

/// Search statistics shared with the outer timeout path, so a run cut
/// off mid-flight still reports what it managed to evaluate.
struct SearchProgress {
    evaluated: AtomicU32,
    radius_bits: AtomicU64,
}

impl SearchProgress {
    fn new() -> Self {
        Self {
            evaluated: AtomicU32::new(0),
            radius_bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    fn add_evaluated(&self, count: u32) {
        self.evaluated.fetch_add(count, Ordering::Relaxed);
    }

    fn evaluated(&self) -> u32 {
        self.evaluated.load(Ordering::Relaxed)
    }

    fn set_radius(&self, radius_km: f64) {
        self.radius_bits.store(radius_km.to_bits(), Ordering::Relaxed);
    }

    fn radius(&self) -> f64 {
        f64::from_bits(self.radius_bits.load(Ordering::Relaxed))
    }
}

/// Top-level matching control loop. Stateless across requests: policy
/// lives in the config, per-run timers are locals, and every request
/// is matched by an independent call with no shared mutable state.
pub struct MatchingEngine {
    config: Arc<MatchingConfig>,
    finder: CandidateFinder,
    executor: AssignmentExecutor,
    recorder: Arc<PerformanceRecorder>,
    clock: Arc<dyn Clock>,
}

impl MatchingEngine {
    pub fn new(
        config: MatchingConfig,
        store: Arc<dyn DriverStore>,
        cache: Arc<dyn CandidateCache>,
        notifier: Arc<dyn NotificationChannel>,
        recorder: Arc<PerformanceRecorder>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, MatchError> {
        config.validate()?;
        let config = Arc::new(config);

        Ok(Self {
            finder: CandidateFinder::new(
                store.clone(),
                cache,
                config.clone(),
                clock.clone(),
            ),
            executor: AssignmentExecutor::new(store, notifier, clock.clone()),
            config,
            recorder,
            clock,
        })
    }

    /// Matches one request within the configured assignment budget.
    /// Never returns an error: faults degrade per policy and surface
    /// as a structured result the booking lifecycle can act on.
    pub async fn match_ride(&self, request: &RideRequest) -> MatchingResult {
        self.recorder.metrics.active_searches.inc();
        let started = Instant::now();
        let progress = SearchProgress::new();
        let budget =
            Duration::from_millis(self.config.max_assignment_time_ms + SCHEDULING_SLACK_MS);

        // The loop checks the deadline at every iteration; this outer
        // race only fires when a store or cache call itself stalls.
        let result = match tokio::time::timeout(
            budget,
            self.run_search(request, started, &progress),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(request_id = %request.id, "matching run abandoned at hard timeout");
                self.timed_out_result(started, &progress)
            }
        };

        self.recorder.metrics.active_searches.dec();
        self.record(request, &result);
        result
    }

    /// Reverses a committed assignment through the normal unassignment
    /// path, e.g. when the rider cancels after a match.
    pub async fn cancel_assignment(
        &self,
        driver_id: Uuid,
        request_id: Uuid,
    ) -> Result<(), MatchError> {
        self.executor.unassign(driver_id, request_id).await
    }

    async fn run_search(
        &self,
        request: &RideRequest,
        started: Instant,
        progress: &SearchProgress,
    ) -> MatchingResult {
        let max_ms = self.config.max_assignment_time_ms;
        let mut best: Option<DriverCandidate> = None;
        let mut runner_pool: Vec<DriverCandidate> = Vec::new();
        let mut timed_out = false;

        'steps: for &radius_km in &self.config.radius_steps_km {
            if elapsed_ms(started) >= max_ms {
                timed_out = true;
                break;
            }
            progress.set_radius(radius_km);

            let candidates = self.finder.find(request, radius_km).await;
            if candidates.is_empty() {
                debug!(request_id = %request.id, radius_km, "no candidates at this radius");
                continue;
            }
            progress.add_evaluated(candidates.len() as u32);

            let ranked = score_candidates(
                &self.config,
                candidates,
                request,
                elapsed_ms(started),
                self.clock.now(),
            );

            let top = &ranked[0];
            if best
                .as_ref()
                .is_none_or(|b| top.matching_score > b.matching_score)
            {
                best = Some(top.clone());
                runner_pool = ranked.iter().skip(1).take(MAX_ALTERNATIVES).cloned().collect();
            }

            let early_accept = top.matching_score >= self.config.early_accept_score
                || radius_km <= self.config.early_accept_radius_km;
            if early_accept {
                for candidate in &ranked {
                    if elapsed_ms(started) >= max_ms {
                        timed_out = true;
                        break 'steps;
                    }
                    match self.executor.assign(candidate, request).await {
                        Ok(AssignOutcome::Committed) => {
                            return self.assigned_result(
                                candidate.clone(),
                                runners_up(&ranked, candidate.driver.id),
                                started,
                                radius_km,
                                progress.evaluated(),
                            );
                        }
                        Ok(AssignOutcome::RequestTaken) => {
                            return self.request_taken_result(started, radius_km, progress);
                        }
                        Ok(AssignOutcome::DriverUnavailable) => continue,
                        Err(err) => {
                            warn!(
                                request_id = %request.id,
                                driver_id = %candidate.driver.id,
                                error = %err,
                                "assignment attempt failed; trying next candidate"
                            );
                            continue;
                        }
                    }
                }
                // Every candidate at this radius lost its race; widen.
                continue;
            }

            let good_enough = best
                .as_ref()
                .is_some_and(|b| b.matching_score >= self.config.early_stop_score);
            if good_enough && radius_km >= self.config.early_stop_radius_km {
                debug!(
                    request_id = %request.id,
                    radius_km,
                    "good-enough candidate seen; stopping radius expansion"
                );
                break;
            }
        }

        // One final attempt with the best candidate ever seen, unless
        // the budget is already gone.
        if !timed_out {
            if let Some(candidate) = best {
                match self.executor.assign(&candidate, request).await {
                    Ok(AssignOutcome::Committed) => {
                        return self.assigned_result(
                            candidate,
                            runner_pool,
                            started,
                            progress.radius(),
                            progress.evaluated(),
                        );
                    }
                    Ok(AssignOutcome::RequestTaken) => {
                        return self.request_taken_result(started, progress.radius(), progress);
                    }
                    Ok(AssignOutcome::DriverUnavailable) => {}
                    Err(err) => {
                        warn!(request_id = %request.id, error = %err, "final assignment attempt failed");
                    }
                }
            }
        }

        let evaluated = progress.evaluated();
        if timed_out {
            self.timed_out_result(started, progress)
        } else if evaluated == 0 {
            MatchingResult {
                success: false,
                driver: None,
                alternatives: Vec::new(),
                matching_time_ms: elapsed_ms(started),
                search_radius_km: progress.radius(),
                candidates_evaluated: 0,
                failure: Some(MatchFailure::NoDrivers),
                retry_recommended: true,
                estimated_pickup_at: None,
            }
        } else {
            MatchingResult {
                success: false,
                driver: None,
                alternatives: Vec::new(),
                matching_time_ms: elapsed_ms(started),
                search_radius_km: progress.radius(),
                candidates_evaluated: evaluated,
                failure: Some(MatchFailure::AssignmentRace),
                retry_recommended: true,
                estimated_pickup_at: None,
            }
        }
    }

    fn assigned_result(
        &self,
        winner: DriverCandidate,
        alternatives: Vec<DriverCandidate>,
        started: Instant,
        radius_km: f64,
        evaluated: u32,
    ) -> MatchingResult {
        let estimated_pickup_at =
            self.clock.now() + ChronoDuration::seconds((winner.eta_minutes * 60.0) as i64);

        info!(
            driver_id = %winner.driver.id,
            score = winner.matching_score,
            radius_km,
            evaluated,
            "match complete"
        );

        MatchingResult {
            success: true,
            driver: Some(winner),
            alternatives,
            matching_time_ms: elapsed_ms(started),
            search_radius_km: radius_km,
            candidates_evaluated: evaluated,
            failure: None,
            retry_recommended: false,
            estimated_pickup_at: Some(estimated_pickup_at),
        }
    }

    fn request_taken_result(
        &self,
        started: Instant,
        radius_km: f64,
        progress: &SearchProgress,
    ) -> MatchingResult {
        MatchingResult {
            success: false,
            driver: None,
            alternatives: Vec::new(),
            matching_time_ms: elapsed_ms(started),
            search_radius_km: radius_km,
            candidates_evaluated: progress.evaluated(),
            failure: Some(MatchFailure::Cancelled),
            // The request already has a driver; retrying would race it.
            retry_recommended: false,
            estimated_pickup_at: None,
        }
    }

    fn timed_out_result(&self, started: Instant, progress: &SearchProgress) -> MatchingResult {
        let elapsed = elapsed_ms(started);
        MatchingResult {
            success: false,
            driver: None,
            alternatives: Vec::new(),
            matching_time_ms: elapsed,
            search_radius_km: progress.radius(),
            candidates_evaluated: progress.evaluated(),
            failure: Some(MatchFailure::Timeout),
            // A run that burned double the budget points at a stalled
            // dependency; retrying immediately would stall again.
            retry_recommended: elapsed < self.config.max_assignment_time_ms * 2,
            estimated_pickup_at: None,
        }
    }

    fn record(&self, request: &RideRequest, result: &MatchingResult) {
        self.recorder.record(MatchAttempt {
            request_id: request.id,
            region: request.region.clone(),
            service: request.service.as_str().to_string(),
            success: result.success,
            matching_time_ms: result.matching_time_ms,
            search_radius_km: result.search_radius_km,
            candidates_evaluated: result.candidates_evaluated,
            driver_id: result.driver.as_ref().map(|winner| winner.driver.id),
            failure: result.failure,
            recorded_at: self.clock.now(),
        });
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn runners_up(ranked: &[DriverCandidate], winner_id: Uuid) -> Vec<DriverCandidate> {
    ranked
        .iter()
        .filter(|candidate| candidate.driver.id != winner_id)
        .take(MAX_ALTERNATIVES)
        .cloned()
        .collect()
}
