//! `EngineState` and the engine-wide counters it aggregates, plus the
//! `DisabledEndpointMap` / `EscalationMap` shared-state types.
//!
//! Counters live behind atomics so many concurrently running job cycles
//! can update them without a lock; `snapshot()` produces the immutable
//! `EngineStats` view callers actually read.

use super::ids::{EndpointId, JobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    #[default]
    Stopped,
    Running,
    Draining,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineStats {
    pub total_cycles: u64,
    pub jobs_processed: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub endpoint_calls: u64,
    pub ai_calls: u64,
    pub malformed_plan: u64,
    pub malformed_schedule: u64,
    pub repair_attempts_plan: u64,
    pub repair_successes_plan: u64,
    pub repair_failures_plan: u64,
    pub repair_attempts_schedule: u64,
    pub repair_successes_schedule: u64,
    pub repair_failures_schedule: u64,
    pub avg_cycle_duration_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineState {
    pub status: EngineStatus,
    pub last_processing_time: Option<DateTime<Utc>>,
    pub stats: EngineStats,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            status: EngineStatus::Stopped,
            last_processing_time: None,
            stats: EngineStats::default(),
        }
    }
}

/// Atomic-counter backing store for `EngineStats`, cheap to update from
/// many concurrently-running job cycles without a lock.
#[derive(Default)]
struct StatsInner {
    total_cycles: AtomicU64,
    jobs_processed: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    endpoint_calls: AtomicU64,
    ai_calls: AtomicU64,
    malformed_plan: AtomicU64,
    malformed_schedule: AtomicU64,
    repair_attempts_plan: AtomicU64,
    repair_successes_plan: AtomicU64,
    repair_failures_plan: AtomicU64,
    repair_attempts_schedule: AtomicU64,
    repair_successes_schedule: AtomicU64,
    repair_failures_schedule: AtomicU64,
    cycle_duration_total_ms: AtomicU64,
}

#[derive(Clone, Default)]
pub struct EngineStatsCounter(Arc<StatsInner>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Plan,
    Schedule,
}

impl EngineStatsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_job_outcome(&self, success: bool) {
        self.0.jobs_processed.fetch_add(1, Ordering::Relaxed);
        if success {
            self.0.success_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.0.failure_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_endpoint_call(&self) {
        self.0.endpoint_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ai_call(&self) {
        self.0.ai_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self, phase: Phase) {
        match phase {
            Phase::Plan => self.0.malformed_plan.fetch_add(1, Ordering::Relaxed),
            Phase::Schedule => self.0.malformed_schedule.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_repair_attempt(&self, phase: Phase) {
        match phase {
            Phase::Plan => self.0.repair_attempts_plan.fetch_add(1, Ordering::Relaxed),
            Phase::Schedule => self.0.repair_attempts_schedule.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_repair_success(&self, phase: Phase) {
        match phase {
            Phase::Plan => self.0.repair_successes_plan.fetch_add(1, Ordering::Relaxed),
            Phase::Schedule => self
                .0
                .repair_successes_schedule
                .fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_repair_failure(&self, phase: Phase) {
        match phase {
            Phase::Plan => self.0.repair_failures_plan.fetch_add(1, Ordering::Relaxed),
            Phase::Schedule => self
                .0
                .repair_failures_schedule
                .fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_cycle(&self, duration_ms: u64) {
        self.0.total_cycles.fetch_add(1, Ordering::Relaxed);
        self.0
            .cycle_duration_total_ms
            .fetch_add(duration_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EngineStats {
        let total_cycles = self.0.total_cycles.load(Ordering::Relaxed);
        let duration_total = self.0.cycle_duration_total_ms.load(Ordering::Relaxed);
        EngineStats {
            total_cycles,
            jobs_processed: self.0.jobs_processed.load(Ordering::Relaxed),
            success_count: self.0.success_count.load(Ordering::Relaxed),
            failure_count: self.0.failure_count.load(Ordering::Relaxed),
            endpoint_calls: self.0.endpoint_calls.load(Ordering::Relaxed),
            ai_calls: self.0.ai_calls.load(Ordering::Relaxed),
            malformed_plan: self.0.malformed_plan.load(Ordering::Relaxed),
            malformed_schedule: self.0.malformed_schedule.load(Ordering::Relaxed),
            repair_attempts_plan: self.0.repair_attempts_plan.load(Ordering::Relaxed),
            repair_successes_plan: self.0.repair_successes_plan.load(Ordering::Relaxed),
            repair_failures_plan: self.0.repair_failures_plan.load(Ordering::Relaxed),
            repair_attempts_schedule: self.0.repair_attempts_schedule.load(Ordering::Relaxed),
            repair_successes_schedule: self.0.repair_successes_schedule.load(Ordering::Relaxed),
            repair_failures_schedule: self.0.repair_failures_schedule.load(Ordering::Relaxed),
            avg_cycle_duration_ms: if total_cycles == 0 {
                0.0
            } else {
                duration_total as f64 / total_cycles as f64
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct DisabledUntil {
    pub until_cycle: u64,
    pub reason: String,
}

/// `(jobId, endpointId) -> disabled-until` map, consulted by the cycle
/// processor to filter plans before dispatch.
pub type DisabledEndpointMap = HashMap<(JobId, EndpointId), DisabledUntil>;

/// `(jobId, endpointId) -> consecutive failure count`, maintained by the
/// circuit breaker.
pub type EscalationMap = HashMap<(JobId, EndpointId), u64>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_counters() {
        let stats = EngineStatsCounter::new();
        stats.record_job_outcome(true);
        stats.record_job_outcome(false);
        stats.record_cycle(100);
        stats.record_cycle(200);
        let snap = stats.snapshot();
        assert_eq!(snap.jobs_processed, 2);
        assert_eq!(snap.success_count, 1);
        assert_eq!(snap.failure_count, 1);
        assert_eq!(snap.total_cycles, 2);
        assert!((snap.avg_cycle_duration_ms - 150.0).abs() < f64::EPSILON);
    }
}
