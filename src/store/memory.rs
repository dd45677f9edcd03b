//! In-memory `Store` implementation used by tests and scenario runs.
//! Backed by a plain lock-guarded map rather than an in-memory SQLite
//! connection, since nothing here needs SQL.

use super::{ErrorPhase, Store, TokenDelta};
use crate::error::StoreError;
use crate::types::{
    AiAgentPlanResponse, Endpoint, EndpointExecutionResult, EndpointUsage, EngineStats,
    EngineStatsCounter, ExecutionContext, ExecutionSummary, Job, JobContext, JobId, JobStatus,
    Message,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

struct Record {
    job: Job,
    endpoints: Vec<Endpoint>,
    messages: Vec<Message>,
    endpoint_usage: Vec<EndpointUsage>,
    last_plan: Option<AiAgentPlanResponse>,
    last_results: Vec<EndpointExecutionResult>,
    last_summary: Option<ExecutionSummary>,
    last_error: Option<(String, String)>,
}

pub struct InMemoryStore {
    records: RwLock<HashMap<JobId, Record>>,
    stats: EngineStatsCounter,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            stats: EngineStatsCounter::new(),
        }
    }

    pub fn stats_counter(&self) -> EngineStatsCounter {
        self.stats.clone()
    }

    pub fn seed_job(&self, job: Job, endpoints: Vec<Endpoint>, messages: Vec<Message>) {
        self.records.write().insert(
            job.id,
            Record {
                job,
                endpoints,
                messages,
                endpoint_usage: Vec::new(),
                last_plan: None,
                last_results: Vec::new(),
                last_summary: None,
                last_error: None,
            },
        );
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_jobs_to_process(&self, max: u32) -> Result<Vec<Job>, StoreError> {
        let now = Utc::now();
        let mut due: Vec<Job> = self
            .records
            .read()
            .values()
            .filter(|r| {
                r.job.status == JobStatus::Active && r.job.locked_by.is_none() && r.job.next_run_at <= now
            })
            .map(|r| r.job.clone())
            .collect();
        due.sort_by(|a, b| a.next_run_at.cmp(&b.next_run_at).then(a.id.to_string().cmp(&b.id.to_string())));
        due.truncate(max as usize);
        Ok(due)
    }

    async fn lock_job(
        &self,
        job_id: JobId,
        lease_owner: &str,
        ttl: std::time::Duration,
    ) -> Result<bool, StoreError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        let now = Utc::now();
        let available = match (&record.job.locked_by, record.job.locked_at) {
            (None, _) => true,
            (Some(_), Some(locked_at)) => {
                now.signed_duration_since(locked_at).num_milliseconds() as u64 > ttl.as_millis() as u64
            }
            (Some(_), None) => true,
        };
        if available {
            record.job.locked_by = Some(lease_owner.to_string());
            record.job.locked_at = Some(now);
        }
        Ok(available)
    }

    async fn unlock_job(&self, job_id: JobId, lease_owner: &str) -> Result<(), StoreError> {
        let mut records = self.records.write();
        if let Some(record) = records.get_mut(&job_id) {
            if record.job.locked_by.as_deref() == Some(lease_owner) {
                record.job.locked_by = None;
                record.job.locked_at = None;
            }
        }
        Ok(())
    }

    async fn get_job_context(&self, job_id: JobId) -> Result<JobContext, StoreError> {
        let records = self.records.read();
        let record = records
            .get(&job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        Ok(JobContext {
            job: record.job.clone(),
            endpoints: record.endpoints.clone(),
            messages: record.messages.clone(),
            endpoint_usage: record.endpoint_usage.clone(),
            execution_context: ExecutionContext {
                current_time: Utc::now(),
                system_environment: "in-memory".to_string(),
            },
        })
    }

    async fn record_execution_plan(
        &self,
        job_id: JobId,
        plan: &AiAgentPlanResponse,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        record.last_plan = Some(plan.clone());
        self.stats.record_ai_call();
        Ok(())
    }

    async fn record_endpoint_results(
        &self,
        job_id: JobId,
        results: &[EndpointExecutionResult],
    ) -> Result<(), StoreError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        record.last_results = results.to_vec();
        for result in results {
            record.endpoint_usage.push(EndpointUsage {
                endpoint_id: result.endpoint_id,
                timestamp: Utc::now(),
                success: result.success,
                latency_ms: result.latency_ms,
                classification: result.classification,
            });
            self.stats.record_endpoint_call();
        }
        Ok(())
    }

    async fn record_execution_summary(
        &self,
        job_id: JobId,
        summary: &ExecutionSummary,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        record.last_summary = Some(summary.clone());
        Ok(())
    }

    async fn update_job_schedule(
        &self,
        job_id: JobId,
        next_run_at: DateTime<Utc>,
        _reasoning: &str,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        record.job.next_run_at = next_run_at;
        record.job.last_run_at = Some(Utc::now());
        record.job.consecutive_failures = 0;
        Ok(())
    }

    async fn record_job_error(
        &self,
        job_id: JobId,
        error: &str,
        phase: ErrorPhase,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        record.job.consecutive_failures += 1;
        record.last_error = Some((format!("{phase:?}"), error.to_string()));
        Ok(())
    }

    async fn update_job_token_usage(
        &self,
        job_id: JobId,
        delta: TokenDelta,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        record.job.prompt_tokens += delta.prompt_tokens;
        record.job.completion_tokens += delta.completion_tokens;
        Ok(())
    }

    async fn update_execution_status(
        &self,
        job_id: JobId,
        status: JobStatus,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        record.job.status = status;
        Ok(())
    }

    async fn get_engine_metrics(&self) -> Result<EngineStats, StoreError> {
        Ok(self.stats.snapshot())
    }
}

pub fn shared() -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_then_unlock_round_trips() {
        let store = InMemoryStore::new();
        let job = Job::new("demo", Utc::now());
        let id = job.id;
        store.seed_job(job, vec![], vec![]);

        assert!(store.lock_job(id, "owner-a", std::time::Duration::from_secs(60)).await.unwrap());
        assert!(!store.lock_job(id, "owner-b", std::time::Duration::from_secs(60)).await.unwrap());
        store.unlock_job(id, "owner-a").await.unwrap();
        assert!(store.lock_job(id, "owner-b", std::time::Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn due_jobs_ordered_by_next_run_at() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let earlier = Job::new("first", now - chrono::Duration::seconds(10));
        let later = Job::new("second", now - chrono::Duration::seconds(5));
        store.seed_job(later.clone(), vec![], vec![]);
        store.seed_job(earlier.clone(), vec![], vec![]);

        let due = store.get_jobs_to_process(20).await.unwrap();
        assert_eq!(due[0].id, earlier.id);
        assert_eq!(due[1].id, later.id);
    }
}
