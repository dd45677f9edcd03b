//! Exercises the engine end to end against an in-memory store and a
//! scripted model adapter: seeds one job with a single endpoint, runs a
//! handful of cycles, and prints the resulting metrics snapshot.

use cadence::agent::{AiAgentAdapter, MockModelAdapter, StructuredGeneration};
use cadence::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerRegistry};
use cadence::classify::LinearBackoff;
use cadence::config::{AiAgentConfig, SchedulerConfig};
use cadence::cycle::CycleProcessor;
use cadence::executor::DefaultEndpointExecutor;
use cadence::http_client::ReqwestHttpClient;
use cadence::store::InMemoryStore;
use cadence::types::{
    AiAgentPlanResponse, AiAgentScheduleResponse, EndpointCall, EngineStatsCounter, Endpoint,
    EndpointId, ExecutionStrategy, HttpMethod, Job,
};
use cadence::Engine;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = Arc::new(InMemoryStore::new());
    let job = Job::new(
        "ping the status endpoint and report health",
        Utc::now() - chrono::Duration::seconds(1),
    );
    let endpoint = Endpoint {
        id: EndpointId::new(),
        job_id: job.id,
        method: HttpMethod::Get,
        url: "https://httpbin.org/status/200".to_string(),
        request_schema: serde_json::json!({}),
        response_schema: None,
    };
    store.seed_job(job, vec![endpoint.clone()], vec![]);

    let plan = AiAgentPlanResponse {
        execution_strategy: ExecutionStrategy::Sequential,
        concurrency_limit: 1,
        endpoint_calls: vec![EndpointCall {
            endpoint_id: endpoint.id,
            priority: 1,
            critical: false,
            depends_on: vec![],
            timeout_ms: 5_000,
            max_retries: 1,
            payload: serde_json::json!({}),
        }],
        reasoning: "the job asks for a health ping, call the one endpoint it has".to_string(),
        confidence: 0.95,
        usage: None,
    };
    let schedule = AiAgentScheduleResponse {
        next_run_at: Utc::now() + chrono::Duration::minutes(10),
        reasoning: "healthy response, check again in ten minutes".to_string(),
        confidence: 0.9,
        usage: None,
    };

    let model = MockModelAdapter::with_responses(vec![
        Ok(StructuredGeneration {
            object: Some(serde_json::to_value(&plan).unwrap()),
            text: String::new(),
            usage: None,
        }),
        Ok(StructuredGeneration {
            object: Some(serde_json::to_value(&schedule).unwrap()),
            text: String::new(),
            usage: None,
        }),
    ]);

    let stats = EngineStatsCounter::new();
    let agent = Arc::new(AiAgentAdapter::new(
        Arc::new(model),
        AiAgentConfig::default(),
        stats.clone(),
    ));
    let breaker = CircuitBreakerRegistry::new(CircuitBreakerConfig::default());
    let executor = Arc::new(DefaultEndpointExecutor::new(
        Arc::new(ReqwestHttpClient::new()),
        Arc::new(LinearBackoff),
        breaker.clone(),
    ));
    let processor = Arc::new(CycleProcessor::new(
        store.clone(),
        agent,
        executor,
        breaker,
        "demo-worker",
        Duration::from_secs(120),
    ));
    let config = SchedulerConfig {
        interval_ms: 1_000,
        ..SchedulerConfig::default()
    };

    let engine = Engine::new(store, processor, config, stats);
    let report = engine.process_cycle().await;
    println!("{report:#?}");
    println!("{:#?}", engine.metrics());
}
