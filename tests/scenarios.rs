//! End-to-end cycle scenarios, exercised through `Engine`/`CycleProcessor`
//! against an in-memory store and scripted model adapter rather than at the
//! level of any single module.

use async_trait::async_trait;
use cadence::agent::{AiAgentAdapter, MockModelAdapter, StructuredGeneration};
use cadence::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerRegistry};
use cadence::classify::LinearBackoff;
use cadence::config::AiAgentConfig;
use cadence::cycle::CycleProcessor;
use cadence::executor::DefaultEndpointExecutor;
use cadence::http_client::{HttpCallSuccess, HttpClient};
use cadence::store::InMemoryStore;
use cadence::types::{
    AiAgentPlanResponse, AiAgentScheduleResponse, EndpointCall, EngineStatsCounter, Endpoint,
    EndpointId, ExecutionStrategy, HttpMethod, Job,
};
use cadence::Engine;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct AlwaysOkHttp;

#[async_trait]
impl HttpClient for AlwaysOkHttp {
    async fn call(
        &self,
        _method: HttpMethod,
        _url: &str,
        _payload: &serde_json::Value,
        _timeout: Duration,
    ) -> Result<HttpCallSuccess, cadence::error::EndpointError> {
        Ok(HttpCallSuccess {
            status: 200,
            body_summary: None,
        })
    }
}

fn seed_job_with_one_endpoint(store: &InMemoryStore) -> (cadence::types::JobId, EndpointId) {
    let job = Job::new("check on a thing", Utc::now() - chrono::Duration::seconds(1));
    let job_id = job.id;
    let endpoint = Endpoint {
        id: EndpointId::new(),
        job_id,
        method: HttpMethod::Get,
        url: "https://example.invalid/check".to_string(),
        request_schema: json!({}),
        response_schema: None,
    };
    let endpoint_id = endpoint.id;
    store.seed_job(job, vec![endpoint], vec![]);
    (job_id, endpoint_id)
}

fn plan_value(endpoint_id: EndpointId, concurrency_limit: u32, strategy: ExecutionStrategy) -> serde_json::Value {
    serde_json::to_value(AiAgentPlanResponse {
        execution_strategy: strategy,
        concurrency_limit,
        endpoint_calls: vec![EndpointCall {
            endpoint_id,
            priority: 1,
            critical: false,
            depends_on: vec![],
            timeout_ms: 1_000,
            max_retries: 0,
            payload: json!({}),
        }],
        reasoning: "one endpoint, nothing fancy".to_string(),
        confidence: 0.9,
        usage: None,
    })
    .unwrap()
}

fn schedule_value(next_run_at: chrono::DateTime<Utc>) -> serde_json::Value {
    serde_json::to_value(AiAgentScheduleResponse {
        next_run_at,
        reasoning: "scheduled".to_string(),
        confidence: 0.9,
        usage: None,
    })
    .unwrap()
}

fn build_engine(
    store: Arc<InMemoryStore>,
    agent_config: AiAgentConfig,
    responses: Vec<Result<StructuredGeneration, cadence::error::ModelError>>,
) -> (Arc<Engine>, EngineStatsCounter) {
    let model = MockModelAdapter::with_responses(responses);
    let stats = EngineStatsCounter::new();
    let agent = Arc::new(AiAgentAdapter::new(Arc::new(model), agent_config, stats.clone()));
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
        "scenario-worker",
        Duration::from_secs(120),
    ));
    let config = cadence::config::SchedulerConfig {
        interval_ms: 1_000,
        max_batch_size: 20,
        job_concurrency: 5,
        cycle_timeout_ms: 5_000,
        job_lease_ttl_ms: 120_000,
    };
    let engine = Engine::new(store, processor, config, stats.clone());
    (engine, stats)
}

/// S1: an empty due-job batch completes the cycle with nothing processed
/// and never touches the AI adapter or the executor.
#[tokio::test]
async fn empty_batch_is_a_clean_no_op() {
    let store = Arc::new(InMemoryStore::new());
    let (engine, stats) = build_engine(store, AiAgentConfig::default(), vec![]);

    let report = engine.process_cycle().await;

    assert_eq!(report.jobs_considered, 0);
    assert_eq!(report.jobs_succeeded, 0);
    assert_eq!(report.jobs_failed, 0);
    let metrics = stats.snapshot();
    assert_eq!(metrics.ai_calls, 0);
    assert_eq!(metrics.endpoint_calls, 0);
}

/// S4: a plan response that fails semantic validation (concurrency_limit
/// too low for a parallel strategy) is repaired on the second attempt when
/// repair is enabled, and the repaired plan is what actually executes.
#[tokio::test]
async fn malformed_plan_is_repaired_and_executes_the_corrected_version() {
    let store = Arc::new(InMemoryStore::new());
    let (job_id, endpoint_id) = seed_job_with_one_endpoint(&store);

    let mut config = AiAgentConfig::default();
    config.repair_malformed_responses = true;

    let bad_plan = plan_value(endpoint_id, 1, ExecutionStrategy::Parallel);
    let good_plan = plan_value(endpoint_id, 2, ExecutionStrategy::Parallel);
    let schedule = schedule_value(Utc::now() + chrono::Duration::minutes(10));

    let (engine, stats) = build_engine(
        store.clone(),
        config,
        vec![
            Ok(StructuredGeneration {
                object: Some(bad_plan),
                text: "first attempt".to_string(),
                usage: None,
            }),
            Ok(StructuredGeneration {
                object: Some(good_plan),
                text: "repaired attempt".to_string(),
                usage: None,
            }),
            Ok(StructuredGeneration {
                object: Some(schedule),
                text: "schedule".to_string(),
                usage: None,
            }),
        ],
    );

    let report = engine.process_cycle().await;
    assert_eq!(report.jobs_succeeded, 1);

    let metrics = stats.snapshot();
    assert_eq!(metrics.repair_attempts_plan, 1);
    assert_eq!(metrics.repair_successes_plan, 1);
    assert_eq!(metrics.malformed_plan, 0);

    let ctx = store.get_job_context(job_id).await.unwrap();
    assert!(ctx.job.next_run_at > Utc::now());
}

/// S5: a schedule response that lands in the past is rejected under strict
/// semantic validation. With repair disabled the job falls back to a
/// computed backoff instead of adopting the AI's proposed schedule, and
/// its failure counter advances since the schedule call itself failed.
#[tokio::test]
async fn schedule_in_the_past_falls_back_instead_of_being_adopted() {
    let store = Arc::new(InMemoryStore::new());
    let (job_id, endpoint_id) = seed_job_with_one_endpoint(&store);

    let config = AiAgentConfig::default(); // semantic_strict: true, repair disabled
    let plan = plan_value(endpoint_id, 1, ExecutionStrategy::Sequential);
    let stale_schedule = schedule_value(Utc::now() - chrono::Duration::seconds(60));

    let before = Utc::now();
    let (engine, stats) = build_engine(
        store.clone(),
        config,
        vec![
            Ok(StructuredGeneration {
                object: Some(plan),
                text: "plan".to_string(),
                usage: None,
            }),
            Ok(StructuredGeneration {
                object: Some(stale_schedule),
                text: "stale schedule".to_string(),
                usage: None,
            }),
        ],
    );

    let report = engine.process_cycle().await;
    // the endpoint call itself succeeds; only the schedule call is rejected
    assert_eq!(report.jobs_succeeded, 1);

    let metrics = stats.snapshot();
    assert_eq!(metrics.malformed_schedule, 1);

    let ctx = store.get_job_context(job_id).await.unwrap();
    // fallback reschedule pushes next_run_at forward, it does not adopt the
    // AI's (rejected) in-the-past value
    assert!(ctx.job.next_run_at > before);
    assert!(!ctx.job.is_locked());
}

struct AlwaysRejectHttp;

#[async_trait]
impl HttpClient for AlwaysRejectHttp {
    async fn call(
        &self,
        _method: HttpMethod,
        _url: &str,
        _payload: &serde_json::Value,
        _timeout: Duration,
    ) -> Result<HttpCallSuccess, cadence::error::EndpointError> {
        Err(cadence::error::EndpointError::Http4xx(400))
    }
}

/// After `failure_threshold` consecutive final failures for (job, endpoint),
/// the breaker trips and the *next* cycle's plan excludes that endpoint.
/// Exercised across the assembled `Engine`, not a single module in
/// isolation: a breaker wired to a registry the cycle never consults
/// would show up here as a call count that keeps climbing forever.
#[tokio::test]
async fn tripped_breaker_excludes_the_endpoint_from_the_next_cycle() {
    let store = Arc::new(InMemoryStore::new());
    let (job_id, endpoint_id) = seed_job_with_one_endpoint(&store);

    let mut config = AiAgentConfig::default();
    config.semantic_strict = false; // keep the test focused on breaker behavior

    let mut responses = Vec::new();
    for _ in 0..3 {
        responses.push(Ok(StructuredGeneration {
            object: Some(plan_value(endpoint_id, 1, ExecutionStrategy::Sequential)),
            text: "plan".to_string(),
            usage: None,
        }));
        responses.push(Ok(StructuredGeneration {
            object: Some(schedule_value(Utc::now() - chrono::Duration::milliseconds(1))),
            text: "schedule".to_string(),
            usage: None,
        }));
    }

    let model = MockModelAdapter::with_responses(responses);
    let stats = EngineStatsCounter::new();
    let agent = Arc::new(AiAgentAdapter::new(Arc::new(model), config, stats.clone()));
    let breaker = CircuitBreakerRegistry::new(CircuitBreakerConfig {
        failure_threshold: 2,
        cooldown_cycles: 1,
    });
    let executor = Arc::new(DefaultEndpointExecutor::new(
        Arc::new(AlwaysRejectHttp),
        Arc::new(LinearBackoff),
        breaker.clone(),
    ));
    let processor = Arc::new(CycleProcessor::new(
        store.clone(),
        agent,
        executor,
        breaker.clone(),
        "breaker-worker",
        Duration::from_secs(120),
    ));
    let scheduler_config = cadence::config::SchedulerConfig {
        interval_ms: 1_000,
        max_batch_size: 20,
        job_concurrency: 5,
        cycle_timeout_ms: 5_000,
        job_lease_ttl_ms: 120_000,
    };
    let engine = Engine::new(store, processor, scheduler_config, stats.clone());

    engine.process_cycle().await; // 1st failure, not yet tripped
    assert_eq!(stats.snapshot().endpoint_calls, 1);
    assert!(!breaker.is_disabled(job_id, endpoint_id, 2));

    engine.process_cycle().await; // 2nd failure, trips the breaker
    assert_eq!(stats.snapshot().endpoint_calls, 2);
    assert!(breaker.is_disabled(job_id, endpoint_id, 3));

    engine.process_cycle().await; // endpoint must be filtered out this time
    assert_eq!(
        stats.snapshot().endpoint_calls,
        2,
        "disabled endpoint must not be called again while the breaker is tripped"
    );
}
