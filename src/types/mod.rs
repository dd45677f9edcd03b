//! Core data model: entities shared by the store, executor, and AI agent
//! adapter. Pure types — no I/O, no trait objects.

pub mod context;
pub mod endpoint;
pub mod engine_state;
pub mod execution;
pub mod ids;
pub mod job;
pub mod message;
pub mod plan;
pub mod schedule;
pub mod usage;

pub use context::{ExecutionContext, JobContext};
pub use endpoint::{Endpoint, HttpMethod};
pub use engine_state::{
    DisabledEndpointMap, DisabledUntil, EngineState, EngineStats, EngineStatsCounter,
    EngineStatus, EscalationMap, Phase,
};
pub use execution::{EndpointExecutionResult, ExecutionResults, ExecutionSummary};
pub use ids::{EndpointId, ExecutionId, JobId};
pub use job::{Job, JobStatus};
pub use message::{Message, MessageRole};
pub use plan::{AiAgentPlanResponse, EndpointCall, ExecutionStrategy, Usage};
pub use schedule::AiAgentScheduleResponse;
pub use usage::EndpointUsage;
