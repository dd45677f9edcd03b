//! Adaptive job scheduling engine: a periodic control loop that selects due
//! jobs from a backing store, asks an AI planner which endpoints to call
//! and how, executes the plan with retry and circuit-breaking, then asks
//! the AI to compute the job's next run time from the observed results.

pub mod agent;
pub mod circuit_breaker;
pub mod classify;
pub mod config;
pub mod cycle;
pub mod engine;
pub mod error;
pub mod executor;
pub mod http_client;
pub mod store;
pub mod types;

pub use agent::{AiAgentAdapter, ModelAdapter};
pub use config::{validate_engine_config, EngineConfig};
pub use cycle::CycleProcessor;
pub use engine::Engine;
pub use error::EngineError;
pub use executor::{DefaultEndpointExecutor, EndpointExecutor};
pub use http_client::{HttpClient, ReqwestHttpClient};
pub use store::Store;
