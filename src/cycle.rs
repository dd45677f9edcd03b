//! The per-job cycle: lock, load context, plan, execute, schedule, unlock.
//! Every exit path — success, a failed plan call, a failed schedule call —
//! unlocks the job exactly once and leaves it in a consistent state.

use crate::agent::AiAgentAdapter;
use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::executor::EndpointExecutor;
use crate::store::{ErrorPhase, Store, TokenDelta};
use crate::types::{EndpointId, JobId};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Upper bound on the backoff applied when the AI fails to produce a
/// schedule and the cycle must fall back to a computed `nextRunAt`.
const FALLBACK_MAX_BACKOFF: Duration = Duration::from_secs(3600);

pub struct CycleProcessor {
    store: Arc<dyn Store>,
    agent: Arc<AiAgentAdapter>,
    executor: Arc<dyn EndpointExecutor>,
    breaker: CircuitBreakerRegistry,
    lease_owner: String,
    lease_ttl: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed,
    LockContended,
}

impl CycleProcessor {
    pub fn new(
        store: Arc<dyn Store>,
        agent: Arc<AiAgentAdapter>,
        executor: Arc<dyn EndpointExecutor>,
        breaker: CircuitBreakerRegistry,
        lease_owner: impl Into<String>,
        lease_ttl: Duration,
    ) -> Self {
        Self {
            store,
            agent,
            executor,
            breaker,
            lease_owner: lease_owner.into(),
            lease_ttl,
        }
    }

    pub async fn process_job(
        &self,
        job_id: JobId,
        cycle: u64,
        cancellation: &CancellationToken,
    ) -> JobOutcome {
        match self.store.lock_job(job_id, &self.lease_owner, self.lease_ttl).await {
            Ok(true) => {}
            Ok(false) => return JobOutcome::LockContended,
            Err(err) => {
                error!(%job_id, %err, "failed to acquire job lock");
                return JobOutcome::Failed;
            }
        }

        let outcome = self.run_locked(job_id, cycle, cancellation).await;

        if let Err(err) = self.store.unlock_job(job_id, &self.lease_owner).await {
            warn!(%job_id, %err, "failed to release job lock");
        }

        outcome
    }

    async fn run_locked(&self, job_id: JobId, cycle: u64, cancellation: &CancellationToken) -> JobOutcome {
        let ctx = match self.store.get_job_context(job_id).await {
            Ok(ctx) => ctx,
            Err(err) => {
                self.record_failure(job_id, ErrorPhase::Context, &err.to_string()).await;
                return JobOutcome::Failed;
            }
        };

        let plan = match self.agent.plan(&ctx).await {
            Ok(plan) => plan,
            Err(err) => {
                self.record_failure(job_id, ErrorPhase::Plan, &err.to_string()).await;
                self.fall_back_schedule(job_id, ctx.job.consecutive_failures + 1).await;
                return JobOutcome::Failed;
            }
        };
        if let Some(usage) = &plan.usage {
            self.record_tokens(job_id, usage.input_tokens, usage.output_tokens).await;
        }
        if let Err(err) = self.store.record_execution_plan(job_id, &plan).await {
            warn!(%job_id, %err, "failed to persist execution plan");
        }

        let disabled: HashSet<EndpointId> = plan
            .endpoint_calls
            .iter()
            .map(|c| c.endpoint_id)
            .filter(|id| self.breaker.is_disabled(job_id, *id, cycle))
            .collect();
        if !disabled.is_empty() {
            info!(%job_id, disabled = disabled.len(), "skipping circuit-broken endpoints this cycle");
        }

        let results = self
            .executor
            .run(job_id, &ctx, &plan, &disabled, cycle, cancellation)
            .await;

        if let Err(err) = self.store.record_endpoint_results(job_id, &results.results).await {
            warn!(%job_id, %err, "failed to persist endpoint results");
        }
        if let Err(err) = self.store.record_execution_summary(job_id, &results.summary).await {
            warn!(%job_id, %err, "failed to persist execution summary");
        }

        let job_succeeded = results.summary.failure_count == 0;

        match self.agent.finalize_schedule(&ctx, &results).await {
            Ok(schedule) => {
                if let Some(usage) = &schedule.usage {
                    self.record_tokens(job_id, usage.input_tokens, usage.output_tokens).await;
                }
                if let Err(err) = self
                    .store
                    .update_job_schedule(job_id, schedule.next_run_at, &schedule.reasoning)
                    .await
                {
                    warn!(%job_id, %err, "failed to persist next schedule");
                }
            }
            Err(err) => {
                self.record_failure(job_id, ErrorPhase::Schedule, &err.to_string()).await;
                let failures = if job_succeeded {
                    0
                } else {
                    ctx.job.consecutive_failures + 1
                };
                self.fall_back_schedule(job_id, failures).await;
            }
        }

        if job_succeeded {
            JobOutcome::Succeeded
        } else {
            JobOutcome::Failed
        }
    }

    async fn record_failure(&self, job_id: JobId, phase: ErrorPhase, message: &str) {
        error!(%job_id, ?phase, message, "job cycle failed");
        if let Err(err) = self.store.record_job_error(job_id, message, phase).await {
            warn!(%job_id, %err, "failed to persist job error");
        }
    }

    async fn record_tokens(&self, job_id: JobId, prompt_tokens: u64, completion_tokens: u64) {
        let delta = TokenDelta {
            prompt_tokens,
            completion_tokens,
        };
        if let Err(err) = self.store.update_job_token_usage(job_id, delta).await {
            warn!(%job_id, %err, "failed to persist token usage");
        }
    }

    async fn fall_back_schedule(&self, job_id: JobId, consecutive_failures: u64) {
        let next_run_at = fallback_next_run_at(consecutive_failures);
        if let Err(err) = self
            .store
            .update_job_schedule(job_id, next_run_at, "fallback: AI scheduling unavailable")
            .await
        {
            warn!(%job_id, %err, "failed to persist fallback schedule");
        }
    }
}

fn fallback_next_run_at(consecutive_failures: u64) -> DateTime<Utc> {
    let backoff_secs = 30u64.saturating_mul(1u64 << consecutive_failures.min(20));
    let capped = Duration::from_secs(backoff_secs).min(FALLBACK_MAX_BACKOFF);
    Utc::now() + chrono::Duration::from_std(capped).unwrap_or(chrono::Duration::seconds(30))
}
