//! `AIAgentScheduleResponse`: the structured object produced by the
//! second AI call, which decides the job's next run time.

use super::plan::Usage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiAgentScheduleResponse {
    pub next_run_at: DateTime<Utc>,
    pub reasoning: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}
