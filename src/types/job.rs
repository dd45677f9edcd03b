//! The `Job` entity: engine-owned lock/schedule fields plus externally
//! authored definition fields.

use super::ids::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a job. Set externally on creation; the engine only
/// ever transitions `Active -> Failed` on unrecoverable cycle errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Active,
    Paused,
    Failed,
}

/// A schedulable unit of work. The engine mutates only `locked_by`,
/// `locked_at`, `next_run_at`, `last_run_at`, `consecutive_failures`, and
/// the token-usage accumulators; everything else is authored externally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Natural-language definition of what this job should accomplish.
    pub definition: String,
    pub status: JobStatus,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub next_run_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl Job {
    pub fn new(definition: impl Into<String>, next_run_at: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            definition: definition.into(),
            status: JobStatus::Active,
            locked_by: None,
            locked_at: None,
            next_run_at,
            last_run_at: None,
            consecutive_failures: 0,
            prompt_tokens: 0,
            completion_tokens: 0,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked_by.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_unlocked_and_active() {
        let job = Job::new("send weekly digest", Utc::now());
        assert_eq!(job.status, JobStatus::Active);
        assert!(!job.is_locked());
        assert_eq!(job.consecutive_failures, 0);
    }
}
