//! Per-`(jobId, endpointId)` circuit breaker.
//!
//! A lock-guarded map of per-key breaker state (`record_success`/
//! `record_failure`/`is_disabled`). The recovery trigger is cycle-counted
//! rather than wall-clock: once tripped, a key stays disabled for the
//! remainder of the current cycle plus `cooldown_cycles` subsequent
//! cycles, so recovery tracks engine progress instead of an independent
//! timer.

use crate::types::{DisabledEndpointMap, DisabledUntil, EndpointId, EscalationMap, JobId};
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u64,
    pub cooldown_cycles: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_cycles: 1,
        }
    }
}

struct Inner {
    config: CircuitBreakerConfig,
    escalation: EscalationMap,
    disabled: DisabledEndpointMap,
}

/// Shared, lock-guarded breaker state for the whole engine.
#[derive(Clone)]
pub struct CircuitBreakerRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                config,
                escalation: EscalationMap::new(),
                disabled: DisabledEndpointMap::new(),
            })),
        }
    }

    /// Record a final (post-retry) failure; returns true if this call
    /// tripped the breaker.
    pub fn record_failure(&self, job_id: JobId, endpoint_id: EndpointId, current_cycle: u64) -> bool {
        let mut inner = self.inner.write();
        let key = (job_id, endpoint_id);
        let count = inner.escalation.entry(key).or_insert(0);
        *count += 1;
        let tripped = *count >= inner.config.failure_threshold;
        if tripped {
            let until_cycle = current_cycle + inner.config.cooldown_cycles;
            inner.disabled.insert(
                key,
                DisabledUntil {
                    until_cycle,
                    reason: format!(
                        "{} consecutive failures (threshold {})",
                        count, inner.config.failure_threshold
                    ),
                },
            );
        }
        tripped
    }

    /// Reset the escalation counter for a key on overall success.
    pub fn record_success(&self, job_id: JobId, endpoint_id: EndpointId) {
        let mut inner = self.inner.write();
        inner.escalation.remove(&(job_id, endpoint_id));
    }

    /// Whether this endpoint is currently disabled for this job, given
    /// the current cycle count. Expires stale entries as a side effect.
    pub fn is_disabled(&self, job_id: JobId, endpoint_id: EndpointId, current_cycle: u64) -> bool {
        let mut inner = self.inner.write();
        let key = (job_id, endpoint_id);
        let expired = match inner.disabled.get(&key) {
            Some(entry) => current_cycle > entry.until_cycle,
            None => return false,
        };
        if expired {
            inner.disabled.remove(&key);
            inner.escalation.remove(&key);
            false
        } else {
            true
        }
    }

    pub fn escalation_count(&self, job_id: JobId, endpoint_id: EndpointId) -> u64 {
        self.inner
            .read()
            .escalation
            .get(&(job_id, endpoint_id))
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_threshold_consecutive_failures() {
        let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 3,
            cooldown_cycles: 2,
        });
        let job = JobId::new();
        let ep = EndpointId::new();
        assert!(!registry.record_failure(job, ep, 1));
        assert!(!registry.record_failure(job, ep, 1));
        assert!(registry.record_failure(job, ep, 1));
        assert!(registry.is_disabled(job, ep, 1));
    }

    #[test]
    fn success_resets_escalation_count() {
        let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig::default());
        let job = JobId::new();
        let ep = EndpointId::new();
        registry.record_failure(job, ep, 1);
        registry.record_failure(job, ep, 1);
        assert_eq!(registry.escalation_count(job, ep), 2);
        registry.record_success(job, ep);
        assert_eq!(registry.escalation_count(job, ep), 0);
    }

    #[test]
    fn disabled_entry_expires_after_cooldown_cycles() {
        let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 1,
            cooldown_cycles: 2,
        });
        let job = JobId::new();
        let ep = EndpointId::new();
        registry.record_failure(job, ep, 5);
        assert!(registry.is_disabled(job, ep, 5));
        assert!(registry.is_disabled(job, ep, 7));
        assert!(!registry.is_disabled(job, ep, 8));
    }
}
