//! `EndpointExecutionResult` / `ExecutionResults`: the executor's output.

use super::ids::EndpointId;
use crate::classify::ErrorCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointExecutionResult {
    pub endpoint_id: EndpointId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    pub latency_ms: u64,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<ErrorCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_duration_ms: u64,
    pub success_count: u32,
    pub failure_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResults {
    pub results: Vec<EndpointExecutionResult>,
    pub summary: ExecutionSummary,
}
