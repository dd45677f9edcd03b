//! Endpoint executor: sequential and bounded-parallel dispatch.
//!
//! The parallel path is a `FuturesUnordered` dispatch loop with per-call
//! timeout and circuit-breaker integration, bounded by a semaphore sized to
//! `concurrencyLimit`. Dispatch is gated on `dependsOn`: an endpoint call
//! is only admitted to the in-flight set once every id it depends on has
//! completed, so the dependency graph is a hard ordering constraint, not
//! an optional hint.

use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::classify::{CallOutcome, ErrorCategory, RetryPolicy};
use crate::error::EndpointError;
use crate::http_client::HttpClient;
use crate::types::{
    AiAgentPlanResponse, EndpointCall, EndpointExecutionResult, EndpointId, ExecutionResults,
    ExecutionStrategy, ExecutionSummary, JobContext, JobId,
};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[async_trait]
pub trait EndpointExecutor: Send + Sync {
    async fn run(
        &self,
        job_id: JobId,
        ctx: &JobContext,
        plan: &AiAgentPlanResponse,
        disabled: &HashSet<EndpointId>,
        cycle: u64,
        cancellation: &CancellationToken,
    ) -> ExecutionResults;
}

pub struct DefaultEndpointExecutor {
    http: Arc<dyn HttpClient>,
    retry_policy: Arc<dyn RetryPolicy>,
    breaker: CircuitBreakerRegistry,
}

impl DefaultEndpointExecutor {
    pub fn new(
        http: Arc<dyn HttpClient>,
        retry_policy: Arc<dyn RetryPolicy>,
        breaker: CircuitBreakerRegistry,
    ) -> Self {
        Self {
            http,
            retry_policy,
            breaker,
        }
    }

    async fn execute_with_retry(
        &self,
        job_id: JobId,
        call: &EndpointCall,
        method: crate::types::HttpMethod,
        url: &str,
        cycle: u64,
        cancellation: &CancellationToken,
    ) -> EndpointExecutionResult {
        let max_attempts = call.max_retries + 1;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if cancellation.is_cancelled() {
                return EndpointExecutionResult {
                    endpoint_id: call.endpoint_id,
                    success: false,
                    http_status: None,
                    latency_ms: 0,
                    attempts: attempt,
                    classification: Some(ErrorCategory::Aborted),
                    body_summary: None,
                    error: Some("aborted".to_string()),
                };
            }

            let attempt_start = Instant::now();
            let timeout = Duration::from_millis(call.timeout_ms);
            let outcome = tokio::select! {
                res = self.http.call(method, url, &call.payload, timeout) => Ok(res),
                _ = cancellation.cancelled() => Err(()),
            };
            let latency_ms = attempt_start.elapsed().as_millis() as u64;

            let endpoint_result = match outcome {
                Err(()) => Err(EndpointError::Aborted),
                Ok(Ok(success)) => {
                    self.breaker.record_success(job_id, call.endpoint_id);
                    return EndpointExecutionResult {
                        endpoint_id: call.endpoint_id,
                        success: true,
                        http_status: Some(success.status),
                        latency_ms,
                        attempts: attempt,
                        classification: None,
                        body_summary: success.body_summary,
                        error: None,
                    };
                }
                Ok(Err(err)) => Err(err),
            };

            let err = endpoint_result.unwrap_err();
            let category = classify_endpoint_error(&err);

            if self.retry_policy.should_retry(attempt, max_attempts, category) {
                debug!(endpoint_id = %call.endpoint_id, attempt, "retrying endpoint call");
                tokio::time::sleep(self.retry_policy.backoff(attempt)).await;
                continue;
            }

            self.breaker.record_failure(job_id, call.endpoint_id, cycle);
            let http_status = match &err {
                EndpointError::Http4xx(s) | EndpointError::Http5xx(s) => Some(*s),
                _ => None,
            };
            return EndpointExecutionResult {
                endpoint_id: call.endpoint_id,
                success: false,
                http_status,
                latency_ms,
                attempts: attempt,
                classification: Some(category),
                body_summary: None,
                error: Some(err.to_string()),
            };
        }
    }
}

fn classify_endpoint_error(err: &EndpointError) -> ErrorCategory {
    let outcome = match err {
        EndpointError::Timeout => CallOutcome {
            aborted: false,
            http_status: None,
            message: Some("timeout".to_string()),
        },
        EndpointError::Aborted => CallOutcome {
            aborted: true,
            http_status: None,
            message: None,
        },
        EndpointError::Http4xx(s) => CallOutcome {
            aborted: false,
            http_status: Some(*s),
            message: None,
        },
        EndpointError::Http5xx(s) => CallOutcome {
            aborted: false,
            http_status: Some(*s),
            message: None,
        },
        EndpointError::Network(m) => CallOutcome {
            aborted: false,
            http_status: None,
            message: Some(m.clone()),
        },
        EndpointError::Unknown(m) => CallOutcome {
            aborted: false,
            http_status: None,
            message: Some(m.clone()),
        },
    };
    crate::classify::classify(&outcome)
}

#[async_trait]
impl EndpointExecutor for DefaultEndpointExecutor {
    async fn run(
        &self,
        job_id: JobId,
        ctx: &JobContext,
        plan: &AiAgentPlanResponse,
        disabled: &HashSet<EndpointId>,
        cycle: u64,
        cancellation: &CancellationToken,
    ) -> ExecutionResults {
        let start_time = Utc::now();
        let start_instant = Instant::now();

        let endpoint_by_id: HashMap<EndpointId, &crate::types::Endpoint> =
            ctx.endpoints.iter().map(|e| (e.id, e)).collect();

        let calls: Vec<&EndpointCall> = plan
            .endpoint_calls
            .iter()
            .filter(|c| !disabled.contains(&c.endpoint_id))
            .collect();

        let results = match plan.execution_strategy {
            ExecutionStrategy::Sequential => {
                self.run_sequential(job_id, &calls, &endpoint_by_id, cycle, cancellation)
                    .await
            }
            ExecutionStrategy::Parallel => {
                self.run_parallel(
                    job_id,
                    &calls,
                    &endpoint_by_id,
                    plan.concurrency_limit,
                    cycle,
                    cancellation,
                )
                .await
            }
        };

        let end_time = Utc::now();
        let success_count = results.iter().filter(|r| r.success).count() as u32;
        let failure_count = results.len() as u32 - success_count;

        ExecutionResults {
            results,
            summary: ExecutionSummary {
                start_time,
                end_time,
                total_duration_ms: start_instant.elapsed().as_millis() as u64,
                success_count,
                failure_count,
            },
        }
    }
}

impl DefaultEndpointExecutor {
    async fn run_sequential(
        &self,
        job_id: JobId,
        calls: &[&EndpointCall],
        endpoints: &HashMap<EndpointId, &crate::types::Endpoint>,
        cycle: u64,
        cancellation: &CancellationToken,
    ) -> Vec<EndpointExecutionResult> {
        let mut ordered: Vec<&&EndpointCall> = calls.iter().collect();
        ordered.sort_by_key(|c| c.priority);

        let mut results = Vec::with_capacity(ordered.len());
        for call in ordered {
            let Some(endpoint) = endpoints.get(&call.endpoint_id) else {
                warn!(endpoint_id = %call.endpoint_id, "plan references unknown endpoint, skipping");
                continue;
            };
            let result = self
                .execute_with_retry(job_id, call, endpoint.method, &endpoint.url, cycle, cancellation)
                .await;
            let abort = call.critical && !result.success;
            results.push(result);
            if abort {
                break;
            }
        }
        results
    }

    async fn run_parallel(
        &self,
        job_id: JobId,
        calls: &[&EndpointCall],
        endpoints: &HashMap<EndpointId, &crate::types::Endpoint>,
        concurrency_limit: u32,
        cycle: u64,
        cancellation: &CancellationToken,
    ) -> Vec<EndpointExecutionResult> {
        let semaphore = Arc::new(Semaphore::new(concurrency_limit.max(1) as usize));
        let mut completed: HashSet<EndpointId> = HashSet::new();
        let mut pending: Vec<&EndpointCall> = calls.iter().copied().collect();
        let mut results = Vec::with_capacity(pending.len());

        let mut in_flight = FuturesUnordered::new();

        loop {
            let mut i = 0;
            while i < pending.len() {
                let ready = pending[i].depends_on.iter().all(|d| completed.contains(d));
                if !ready {
                    i += 1;
                    continue;
                }
                let call = pending.remove(i);
                let Some(endpoint) = endpoints.get(&call.endpoint_id) else {
                    warn!(endpoint_id = %call.endpoint_id, "plan references unknown endpoint, skipping");
                    completed.insert(call.endpoint_id);
                    continue;
                };
                let permit = semaphore.clone().acquire_owned().await.expect("semaphore open");
                let method = endpoint.method;
                let url = endpoint.url.clone();
                let call = call.clone();
                let this = SequentialHandle {
                    breaker: self.breaker.clone(),
                    retry_policy: self.retry_policy.clone(),
                    http: self.http.clone(),
                };
                let cancellation = cancellation.clone();
                in_flight.push(async move {
                    let r = this
                        .execute(job_id, &call, method, &url, cycle, &cancellation)
                        .await;
                    drop(permit);
                    r
                });
            }

            if in_flight.is_empty() {
                break;
            }

            if let Some(result) = in_flight.next().await {
                completed.insert(result.endpoint_id);
                results.push(result);
            }
        }

        results
    }
}

/// Cheap clone-of-dependencies handle used so each in-flight future in the
/// parallel dispatch loop owns its copy of the executor's collaborators.
struct SequentialHandle {
    breaker: CircuitBreakerRegistry,
    retry_policy: Arc<dyn RetryPolicy>,
    http: Arc<dyn HttpClient>,
}

impl SequentialHandle {
    async fn execute(
        &self,
        job_id: JobId,
        call: &EndpointCall,
        method: crate::types::HttpMethod,
        url: &str,
        cycle: u64,
        cancellation: &CancellationToken,
    ) -> EndpointExecutionResult {
        let delegate = DefaultEndpointExecutor {
            http: self.http.clone(),
            retry_policy: self.retry_policy.clone(),
            breaker: self.breaker.clone(),
        };
        delegate
            .execute_with_retry(job_id, call, method, url, cycle, cancellation)
            .await
    }
}
