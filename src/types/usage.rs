//! `EndpointUsage`: an append-only ring of recent endpoint call outcomes,
//! fed into the AI prompt so the planner can see recent history.

use super::ids::EndpointId;
use crate::classify::ErrorCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointUsage {
    pub endpoint_id: EndpointId,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub latency_ms: u64,
    pub classification: Option<ErrorCategory>,
}
