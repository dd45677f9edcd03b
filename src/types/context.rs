//! `JobContext`: the transient, per-cycle bundle the cycle processor reads
//! from the store and hands to the AI agent adapter and executor. Owned
//! exclusively by the cycle processor for the duration of one job cycle.

use super::endpoint::Endpoint;
use super::job::Job;
use super::message::Message;
use super::usage::EndpointUsage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub current_time: DateTime<Utc>,
    pub system_environment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobContext {
    pub job: Job,
    pub endpoints: Vec<Endpoint>,
    pub messages: Vec<Message>,
    pub endpoint_usage: Vec<EndpointUsage>,
    pub execution_context: ExecutionContext,
}
