//! The engine lifecycle: a periodic tick that drains due jobs through the
//! cycle processor, non-overlapping (a slow cycle coalesces the next tick
//! rather than running concurrently with it), with a soft per-cycle time
//! budget that cancels outstanding work rather than running forever.

use crate::config::SchedulerConfig;
use crate::cycle::{CycleProcessor, JobOutcome};
use crate::store::Store;
use crate::types::{EngineState, EngineStats, EngineStatsCounter, EngineStatus};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub cycle: u64,
    pub jobs_considered: usize,
    pub jobs_succeeded: usize,
    pub jobs_failed: usize,
    pub jobs_lock_contended: usize,
    pub timed_out: bool,
}

pub struct Engine {
    store: Arc<dyn Store>,
    processor: Arc<CycleProcessor>,
    config: SchedulerConfig,
    state: RwLock<EngineState>,
    stats: EngineStatsCounter,
    cycle_counter: AtomicU64,
    shutdown: CancellationToken,
    tick_guard: Arc<Semaphore>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn Store>,
        processor: Arc<CycleProcessor>,
        config: SchedulerConfig,
        stats: EngineStatsCounter,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            processor,
            config,
            state: RwLock::new(EngineState::default()),
            stats,
            cycle_counter: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            tick_guard: Arc::new(Semaphore::new(1)),
            task: Mutex::new(None),
        })
    }

    pub fn status(&self) -> EngineStatus {
        self.state.read().status
    }

    pub fn metrics(&self) -> EngineStats {
        self.stats.snapshot()
    }

    /// Starts the periodic tick loop. A no-op if already running.
    pub async fn start(self: &Arc<Self>) {
        {
            let mut state = self.state.write();
            if state.status != EngineStatus::Stopped {
                return;
            }
            state.status = EngineStatus::Running;
        }

        let engine = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(engine.config.interval_ms));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if engine.status() != EngineStatus::Running {
                            break;
                        }
                        match engine.tick_guard.clone().try_acquire_owned() {
                            Ok(permit) => {
                                engine.process_cycle().await;
                                drop(permit);
                            }
                            Err(_) => {
                                debug!("skipping tick: previous cycle is still running");
                            }
                        }
                    }
                    _ = engine.shutdown.cancelled() => break,
                }
            }
        });
        *self.task.lock().await = Some(handle);
    }

    /// Transitions running -> draining -> stopped, waiting for any
    /// in-flight cycle to finish before returning.
    pub async fn stop(&self) {
        {
            let mut state = self.state.write();
            if state.status != EngineStatus::Running {
                return;
            }
            state.status = EngineStatus::Draining;
        }
        self.shutdown.cancel();
        if let Some(handle) = self.task.lock().await.take() {
            if let Err(err) = handle.await {
                warn!(%err, "engine tick loop panicked while stopping");
            }
        }
        self.state.write().status = EngineStatus::Stopped;
    }

    /// Runs exactly one cycle synchronously. Used directly by tests and by
    /// the tick loop.
    pub async fn process_cycle(&self) -> CycleReport {
        let cycle = self.cycle_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let wall_clock_start = Instant::now();
        let cancellation = CancellationToken::new();

        let jobs = match self.store.get_jobs_to_process(self.config.max_batch_size).await {
            Ok(jobs) => jobs,
            Err(err) => {
                warn!(cycle, %err, "failed to load due jobs for this cycle");
                Vec::new()
            }
        };
        let jobs_considered = jobs.len();
        debug!(cycle, jobs_considered, "starting cycle");

        let semaphore = Arc::new(Semaphore::new(self.config.job_concurrency.max(1) as usize));
        let mut in_flight = FuturesUnordered::new();
        for job in &jobs {
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore open");
            let processor = self.processor.clone();
            let job_id = job.id;
            let cancellation = cancellation.clone();
            in_flight.push(async move {
                let outcome = processor.process_job(job_id, cycle, &cancellation).await;
                drop(permit);
                outcome
            });
        }

        let deadline = tokio::time::Instant::now() + Duration::from_millis(self.config.cycle_timeout_ms);
        let mut outcomes = Vec::with_capacity(jobs_considered);
        let mut timed_out = false;
        loop {
            tokio::select! {
                next = in_flight.next() => {
                    match next {
                        Some(outcome) => outcomes.push(outcome),
                        None => break,
                    }
                }
                _ = tokio::time::sleep_until(deadline), if !timed_out => {
                    warn!(cycle, "cycle exceeded its time budget, cancelling outstanding work");
                    cancellation.cancel();
                    timed_out = true;
                }
            }
        }

        let elapsed_ms = wall_clock_start.elapsed().as_millis() as u64;
        self.stats.record_cycle(elapsed_ms);
        {
            let mut state = self.state.write();
            state.last_processing_time = Some(chrono::Utc::now());
            state.stats = self.stats.snapshot();
        }

        let report = CycleReport {
            cycle,
            jobs_considered,
            jobs_succeeded: outcomes.iter().filter(|o| **o == JobOutcome::Succeeded).count(),
            jobs_failed: outcomes.iter().filter(|o| **o == JobOutcome::Failed).count(),
            jobs_lock_contended: outcomes
                .iter()
                .filter(|o| **o == JobOutcome::LockContended)
                .count(),
            timed_out,
        };
        for outcome in &outcomes {
            self.stats.record_job_outcome(*outcome == JobOutcome::Succeeded);
        }
        info!(
            cycle,
            jobs_considered,
            succeeded = report.jobs_succeeded,
            failed = report.jobs_failed,
            elapsed_ms,
            "cycle complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AiAgentAdapter, MockModelAdapter, StructuredGeneration};
    use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerRegistry};
    use crate::classify::LinearBackoff;
    use crate::config::AiAgentConfig;
    use crate::executor::DefaultEndpointExecutor;
    use crate::http_client::HttpCallSuccess;
    use crate::store::InMemoryStore;
    use crate::types::{
        AiAgentPlanResponse, AiAgentScheduleResponse, Endpoint, EndpointId, ExecutionStrategy, HttpMethod,
        Job,
    };
    use async_trait::async_trait;
    use chrono::Utc;

    struct AlwaysOkHttp;

    #[async_trait]
    impl crate::http_client::HttpClient for AlwaysOkHttp {
        async fn call(
            &self,
            _method: HttpMethod,
            _url: &str,
            _payload: &serde_json::Value,
            _timeout: Duration,
        ) -> Result<HttpCallSuccess, crate::error::EndpointError> {
            Ok(HttpCallSuccess {
                status: 200,
                body_summary: None,
            })
        }
    }

    fn plan_value(endpoint_id: EndpointId) -> serde_json::Value {
        serde_json::to_value(AiAgentPlanResponse {
            execution_strategy: ExecutionStrategy::Sequential,
            concurrency_limit: 1,
            endpoint_calls: vec![crate::types::EndpointCall {
                endpoint_id,
                priority: 1,
                critical: false,
                depends_on: vec![],
                timeout_ms: 1000,
                max_retries: 0,
                payload: serde_json::json!({}),
            }],
            reasoning: "call it".to_string(),
            confidence: 0.9,
            usage: None,
        })
        .unwrap()
    }

    fn schedule_value() -> serde_json::Value {
        serde_json::to_value(AiAgentScheduleResponse {
            next_run_at: Utc::now() + chrono::Duration::minutes(5),
            reasoning: "looks good".to_string(),
            confidence: 0.9,
            usage: None,
        })
        .unwrap()
    }

    fn build_engine(store: Arc<InMemoryStore>, responses: Vec<Result<StructuredGeneration, crate::error::ModelError>>) -> Arc<Engine> {
        let model = MockModelAdapter::with_responses(responses);
        let stats = EngineStatsCounter::new();
        let agent = Arc::new(AiAgentAdapter::new(Arc::new(model), AiAgentConfig::default(), stats.clone()));
        let breaker = CircuitBreakerRegistry::new(CircuitBreakerConfig::default());
        let executor = Arc::new(DefaultEndpointExecutor::new(
            Arc::new(AlwaysOkHttp),
            Arc::new(LinearBackoff),
            breaker.clone(),
        ));
        let processor = Arc::new(CycleProcessor::new(
            store.clone(),
            agent,
            executor,
            breaker,
            "engine-worker",
            Duration::from_secs(60),
        ));
        let config = SchedulerConfig {
            interval_ms: 50,
            max_batch_size: 20,
            job_concurrency: 5,
            cycle_timeout_ms: 5_000,
            job_lease_ttl_ms: 120_000,
        };
        Engine::new(store, processor, config, stats)
    }

    #[tokio::test]
    async fn process_cycle_with_no_due_jobs_is_a_no_op() {
        let store = Arc::new(InMemoryStore::new());
        let engine = build_engine(store, vec![]);
        let report = engine.process_cycle().await;
        assert_eq!(report.jobs_considered, 0);
        assert_eq!(report.jobs_succeeded, 0);
    }

    #[tokio::test]
    async fn process_cycle_runs_a_due_job_to_completion() {
        let store = Arc::new(InMemoryStore::new());
        let job = Job::new("demo", Utc::now() - chrono::Duration::seconds(1));
        let endpoint = Endpoint {
            id: EndpointId::new(),
            job_id: job.id,
            method: HttpMethod::Get,
            url: "https://example.invalid/ping".to_string(),
            request_schema: serde_json::json!({}),
            response_schema: None,
        };
        store.seed_job(job.clone(), vec![endpoint.clone()], vec![]);

        let engine = build_engine(
            store.clone(),
            vec![
                Ok(StructuredGeneration {
                    object: Some(plan_value(endpoint.id)),
                    text: "plan".to_string(),
                    usage: None,
                }),
                Ok(StructuredGeneration {
                    object: Some(schedule_value()),
                    text: "schedule".to_string(),
                    usage: None,
                }),
            ],
        );

        let report = engine.process_cycle().await;
        assert_eq!(report.jobs_considered, 1);
        assert_eq!(report.jobs_succeeded, 1);
        assert!(!report.timed_out);

        let metrics = engine.metrics();
        assert_eq!(metrics.total_cycles, 1);
        assert_eq!(metrics.jobs_processed, 1);
    }

    #[tokio::test]
    async fn start_then_stop_transitions_status_cleanly() {
        let store = Arc::new(InMemoryStore::new());
        let engine = build_engine(store, vec![]);
        assert_eq!(engine.status(), EngineStatus::Stopped);
        engine.start().await;
        assert_eq!(engine.status(), EngineStatus::Running);
        engine.stop().await;
        assert_eq!(engine.status(), EngineStatus::Stopped);
    }
}
