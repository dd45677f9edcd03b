//! The store adapter contract: a typed façade over whatever persistence
//! layer backs jobs, endpoints, and engine metrics. The engine depends
//! only on this trait, so a direct-database implementation and a REST- or
//! queue-backed one are equally legal behind it.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::types::{
    AiAgentPlanResponse, EndpointExecutionResult, EngineStats, ExecutionSummary, Job, JobContext,
    JobId, JobStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPhase {
    Lock,
    Context,
    Plan,
    Execute,
    Schedule,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenDelta {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Jobs with `next_run_at <= now`, not currently locked. Earliest
    /// `next_run_at` first, ties broken by job id for determinism.
    async fn get_jobs_to_process(&self, max: u32) -> Result<Vec<Job>, StoreError>;

    /// Atomic: acquires iff `locked_by IS NULL OR locked_at + ttl < now`.
    async fn lock_job(
        &self,
        job_id: JobId,
        lease_owner: &str,
        ttl: std::time::Duration,
    ) -> Result<bool, StoreError>;

    /// Idempotent: unlocking an already-unlocked or foreign-owned lock is
    /// a no-op, not an error.
    async fn unlock_job(&self, job_id: JobId, lease_owner: &str) -> Result<(), StoreError>;

    async fn get_job_context(&self, job_id: JobId) -> Result<JobContext, StoreError>;

    async fn record_execution_plan(
        &self,
        job_id: JobId,
        plan: &AiAgentPlanResponse,
    ) -> Result<(), StoreError>;

    async fn record_endpoint_results(
        &self,
        job_id: JobId,
        results: &[EndpointExecutionResult],
    ) -> Result<(), StoreError>;

    async fn record_execution_summary(
        &self,
        job_id: JobId,
        summary: &ExecutionSummary,
    ) -> Result<(), StoreError>;

    async fn update_job_schedule(
        &self,
        job_id: JobId,
        next_run_at: DateTime<Utc>,
        reasoning: &str,
    ) -> Result<(), StoreError>;

    async fn record_job_error(
        &self,
        job_id: JobId,
        error: &str,
        phase: ErrorPhase,
    ) -> Result<(), StoreError>;

    async fn update_job_token_usage(
        &self,
        job_id: JobId,
        delta: TokenDelta,
    ) -> Result<(), StoreError>;

    async fn update_execution_status(
        &self,
        job_id: JobId,
        status: JobStatus,
    ) -> Result<(), StoreError>;

    async fn get_engine_metrics(&self) -> Result<EngineStats, StoreError>;
}
