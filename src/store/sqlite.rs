//! SQLite-backed `Store`: WAL mode, schema created before the connection
//! is wrapped in an async mutex (avoids `blocking_lock` in async context),
//! job rows keyed by id with a `locked_by`/`locked_at` pair for lease
//! semantics.

use super::{ErrorPhase, Store, TokenDelta};
use crate::error::StoreError;
use crate::types::{
    AiAgentPlanResponse, Endpoint, EndpointExecutionResult, EngineStats, EngineStatsCounter,
    ExecutionContext, ExecutionSummary, Job, JobContext, JobId, JobStatus, Message,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct SqliteStore {
    conn: Mutex<Connection>,
    stats: EngineStatsCounter,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("creating data dir: {e}")))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| StoreError::Unavailable(format!("opening sqlite store: {e}")))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| StoreError::Unavailable(format!("setting WAL mode: {e}")))?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            stats: EngineStatsCounter::new(),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Unavailable(format!("opening sqlite store: {e}")))?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            stats: EngineStatsCounter::new(),
        })
    }
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS jobs (
            job_id TEXT PRIMARY KEY,
            definition TEXT NOT NULL,
            status TEXT NOT NULL,
            locked_by TEXT,
            locked_at TEXT,
            next_run_at TEXT NOT NULL,
            last_run_at TEXT,
            consecutive_failures INTEGER NOT NULL DEFAULT 0,
            prompt_tokens INTEGER NOT NULL DEFAULT 0,
            completion_tokens INTEGER NOT NULL DEFAULT 0,
            endpoints_json TEXT NOT NULL DEFAULT '[]',
            messages_json TEXT NOT NULL DEFAULT '[]',
            endpoint_usage_json TEXT NOT NULL DEFAULT '[]',
            last_plan_json TEXT,
            last_results_json TEXT,
            last_summary_json TEXT,
            last_error_phase TEXT,
            last_error_message TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_jobs_next_run ON jobs(next_run_at);",
    )
    .map_err(|e| StoreError::Unavailable(format!("initializing schema: {e}")))?;
    Ok(())
}

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
    let job_id: String = row.get("job_id")?;
    let status: String = row.get("status")?;
    Ok(Job {
        id: job_id.parse().map_err(|_| {
            rusqlite::Error::InvalidColumnType(0, "job_id".into(), rusqlite::types::Type::Text)
        })?,
        definition: row.get("definition")?,
        status: match status.as_str() {
            "active" => JobStatus::Active,
            "paused" => JobStatus::Paused,
            _ => JobStatus::Failed,
        },
        locked_by: row.get("locked_by")?,
        locked_at: row
            .get::<_, Option<String>>("locked_at")?
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc)),
        next_run_at: DateTime::parse_from_rfc3339(&row.get::<_, String>("next_run_at")?)
            .unwrap()
            .with_timezone(&Utc),
        last_run_at: row
            .get::<_, Option<String>>("last_run_at")?
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc)),
        consecutive_failures: row.get::<_, i64>("consecutive_failures")? as u64,
        prompt_tokens: row.get::<_, i64>("prompt_tokens")? as u64,
        completion_tokens: row.get::<_, i64>("completion_tokens")? as u64,
    })
}

fn status_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Active => "active",
        JobStatus::Paused => "paused",
        JobStatus::Failed => "failed",
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_jobs_to_process(&self, max: u32) -> Result<Vec<Job>, StoreError> {
        let conn = self.conn.lock().await;
        let now = Utc::now().to_rfc3339();
        let mut stmt = conn
            .prepare(
                "SELECT * FROM jobs WHERE status = 'active' AND locked_by IS NULL
                 AND next_run_at <= ?1 ORDER BY next_run_at ASC, job_id ASC LIMIT ?2",
            )
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let rows = stmt
            .query_map(params![now, max], row_to_job)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| StoreError::Unavailable(e.to_string()))?);
        }
        Ok(out)
    }

    async fn lock_job(
        &self,
        job_id: JobId,
        lease_owner: &str,
        ttl: std::time::Duration,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        let now = Utc::now();
        let ttl_cutoff = (now - chrono::Duration::milliseconds(ttl.as_millis() as i64)).to_rfc3339();
        let updated = conn
            .execute(
                "UPDATE jobs SET locked_by = ?1, locked_at = ?2
                 WHERE job_id = ?3 AND (locked_by IS NULL OR locked_at < ?4)",
                params![lease_owner, now.to_rfc3339(), job_id.to_string(), ttl_cutoff],
            )
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(updated == 1)
    }

    async fn unlock_job(&self, job_id: JobId, lease_owner: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE jobs SET locked_by = NULL, locked_at = NULL
             WHERE job_id = ?1 AND locked_by = ?2",
            params![job_id.to_string(), lease_owner],
        )
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn get_job_context(&self, job_id: JobId) -> Result<JobContext, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT * FROM jobs WHERE job_id = ?1")
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let row = stmt
            .query_row(params![job_id.to_string()], |row| {
                let job = row_to_job(row)?;
                let endpoints_json: String = row.get("endpoints_json")?;
                let messages_json: String = row.get("messages_json")?;
                let usage_json: String = row.get("endpoint_usage_json")?;
                Ok((job, endpoints_json, messages_json, usage_json))
            })
            .optional()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let (job, endpoints_json, messages_json, usage_json) =
            row.ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        let endpoints: Vec<Endpoint> =
            serde_json::from_str(&endpoints_json).unwrap_or_default();
        let messages: Vec<Message> = serde_json::from_str(&messages_json).unwrap_or_default();
        let endpoint_usage = serde_json::from_str(&usage_json).unwrap_or_default();
        Ok(JobContext {
            job,
            endpoints,
            messages,
            endpoint_usage,
            execution_context: ExecutionContext {
                current_time: Utc::now(),
                system_environment: "sqlite".to_string(),
            },
        })
    }

    async fn record_execution_plan(
        &self,
        job_id: JobId,
        plan: &AiAgentPlanResponse,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let json = serde_json::to_string(plan).unwrap();
        conn.execute(
            "UPDATE jobs SET last_plan_json = ?1 WHERE job_id = ?2",
            params![json, job_id.to_string()],
        )
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        self.stats.record_ai_call();
        Ok(())
    }

    async fn record_endpoint_results(
        &self,
        job_id: JobId,
        results: &[EndpointExecutionResult],
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let json = serde_json::to_string(results).unwrap();
        conn.execute(
            "UPDATE jobs SET last_results_json = ?1 WHERE job_id = ?2",
            params![json, job_id.to_string()],
        )
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        for _ in results {
            self.stats.record_endpoint_call();
        }
        Ok(())
    }

    async fn record_execution_summary(
        &self,
        job_id: JobId,
        summary: &ExecutionSummary,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let json = serde_json::to_string(summary).unwrap();
        conn.execute(
            "UPDATE jobs SET last_summary_json = ?1 WHERE job_id = ?2",
            params![json, job_id.to_string()],
        )
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn update_job_schedule(
        &self,
        job_id: JobId,
        next_run_at: DateTime<Utc>,
        _reasoning: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE jobs SET next_run_at = ?1, last_run_at = ?2, consecutive_failures = 0
             WHERE job_id = ?3",
            params![
                next_run_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
                job_id.to_string()
            ],
        )
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn record_job_error(
        &self,
        job_id: JobId,
        error: &str,
        phase: ErrorPhase,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE jobs SET consecutive_failures = consecutive_failures + 1,
             last_error_phase = ?1, last_error_message = ?2 WHERE job_id = ?3",
            params![format!("{phase:?}"), error, job_id.to_string()],
        )
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn update_job_token_usage(
        &self,
        job_id: JobId,
        delta: TokenDelta,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE jobs SET prompt_tokens = prompt_tokens + ?1,
             completion_tokens = completion_tokens + ?2 WHERE job_id = ?3",
            params![
                delta.prompt_tokens as i64,
                delta.completion_tokens as i64,
                job_id.to_string()
            ],
        )
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn update_execution_status(
        &self,
        job_id: JobId,
        status: JobStatus,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE jobs SET status = ?1 WHERE job_id = ?2",
            params![status_str(status), job_id.to_string()],
        )
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn get_engine_metrics(&self) -> Result<EngineStats, StoreError> {
        Ok(self.stats.snapshot())
    }
}

impl SqliteStore {
    /// Insert a job definition plus its fixed endpoint/message seed data.
    /// Test/demo helper — production callers populate jobs through
    /// whatever external surface owns job authoring (out of scope here).
    pub async fn seed_job(
        &self,
        job: &Job,
        endpoints: &[Endpoint],
        messages: &[Message],
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO jobs (job_id, definition, status, next_run_at, endpoints_json, messages_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(job_id) DO UPDATE SET definition = excluded.definition",
            params![
                job.id.to_string(),
                job.definition,
                status_str(job.status),
                job.next_run_at.to_rfc3339(),
                serde_json::to_string(endpoints).unwrap(),
                serde_json::to_string(messages).unwrap(),
            ],
        )
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

pub fn default_path() -> std::path::PathBuf {
    dirs_next_data_dir().join("cadence").join("jobs.db")
}

fn dirs_next_data_dir() -> std::path::PathBuf {
    std::env::var_os("XDG_DATA_HOME")
        .map(std::path::PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| std::path::PathBuf::from(h).join(".local/share")))
        .unwrap_or_else(|| std::path::PathBuf::from("."))
}

pub fn shared_in_memory() -> Result<Arc<SqliteStore>, StoreError> {
    Ok(Arc::new(SqliteStore::open_in_memory()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HttpMethod;

    #[tokio::test]
    async fn round_trips_a_job_through_sqlite() {
        let store = SqliteStore::open_in_memory().unwrap();
        let job = Job::new("send digest", Utc::now() - chrono::Duration::seconds(1));
        let endpoint = Endpoint {
            id: crate::types::EndpointId::new(),
            job_id: job.id,
            method: HttpMethod::Post,
            url: "https://example.invalid/send".to_string(),
            request_schema: serde_json::json!({}),
            response_schema: None,
        };
        store.seed_job(&job, &[endpoint], &[]).await.unwrap();

        let due = store.get_jobs_to_process(10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, job.id);

        assert!(store
            .lock_job(job.id, "owner", std::time::Duration::from_secs(30))
            .await
            .unwrap());
        let ctx = store.get_job_context(job.id).await.unwrap();
        assert_eq!(ctx.endpoints.len(), 1);
        store.unlock_job(job.id, "owner").await.unwrap();
    }
}
