use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::result::MatchFailure;
use crate::observability::metrics::Metrics;

/// Append-only record of one match attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchAttempt {
    pub request_id: Uuid,
    pub region: String,
    pub service: String,
    pub success: bool,
    pub matching_time_ms: u64,
    pub search_radius_km: f64,
    pub candidates_evaluated: u32,
    pub driver_id: Option<Uuid>,
    pub failure: Option<MatchFailure>,
    pub recorded_at: DateTime<Utc>,
}

/// Rolling aggregate suitable for dashboards.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MatchStats {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub avg_matching_time_ms: f64,
}

/// Keeps a bounded ring of recent attempts plus running aggregates,
/// and mirrors every attempt into the Prometheus registry.
pub struct PerformanceRecorder {
    pub metrics: Metrics,
    attempts: Mutex<VecDeque<MatchAttempt>>,
    stats: Mutex<MatchStats>,
    capacity: usize,
}

impl PerformanceRecorder {
    pub fn new(capacity: usize) -> Self {
        Self {
            metrics: Metrics::new(),
            attempts: Mutex::new(VecDeque::with_capacity(capacity)),
            stats: Mutex::new(MatchStats::default()),
            capacity,
        }
    }

    pub fn record(&self, attempt: MatchAttempt) {
        let outcome = match (&attempt.failure, attempt.success) {
            (_, true) => "assigned",
            (Some(MatchFailure::Timeout), _) => "timeout",
            _ => "exhausted",
        };

        self.metrics.matches_total.with_label_values(&[outcome]).inc();
        self.metrics
            .matching_latency_seconds
            .with_label_values(&[outcome])
            .observe(attempt.matching_time_ms as f64 / 1_000.0);
        self.metrics
            .candidates_per_match
            .observe(attempt.candidates_evaluated as f64);

        {
            let mut stats = self.stats.lock().expect("stats lock");
            stats.total += 1;
            match outcome {
                "assigned" => stats.succeeded += 1,
                "timeout" => stats.timed_out += 1,
                _ => stats.failed += 1,
            }
            // Incremental mean keeps the aggregate O(1) per attempt.
            stats.avg_matching_time_ms +=
                (attempt.matching_time_ms as f64 - stats.avg_matching_time_ms)
                    / stats.total as f64;
        }

        let mut attempts = self.attempts.lock().expect("attempts lock");
        if attempts.len() == self.capacity {
            attempts.pop_front();
        }
        attempts.push_back(attempt);
    }

    pub fn stats(&self) -> MatchStats {
        *self.stats.lock().expect("stats lock")
    }

    pub fn recent(&self, limit: usize) -> Vec<MatchAttempt> {
        let attempts = self.attempts.lock().expect("attempts lock");
        attempts.iter().rev().take(limit).cloned().collect()
    }
}
