//! The narrow seam over whatever model backend answers planning and
//! scheduling prompts. Kept minimal and object-safe, the way the executor's
//! `HttpClient` trait isolates network I/O behind a single `async_trait`
//! method so tests can script deterministic responses.

use crate::error::ModelError;
use crate::types::Usage;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct StructuredGeneration {
    pub object: Option<Value>,
    pub text: String,
    pub usage: Option<Usage>,
}

#[async_trait]
pub trait ModelAdapter: Send + Sync {
    async fn generate_structured(
        &self,
        prompt: &str,
        schema: &Value,
    ) -> Result<StructuredGeneration, ModelError>;
}

/// Test double with a scripted queue of responses, one per call. Panics if
/// the queue is exhausted before the test stops calling it.
pub struct MockModelAdapter {
    responses: Mutex<VecDeque<Result<StructuredGeneration, ModelError>>>,
}

impl MockModelAdapter {
    pub fn with_responses(responses: Vec<Result<StructuredGeneration, ModelError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl ModelAdapter for MockModelAdapter {
    async fn generate_structured(
        &self,
        _prompt: &str,
        _schema: &Value,
    ) -> Result<StructuredGeneration, ModelError> {
        self.responses
            .lock()
            .pop_front()
            .expect("MockModelAdapter response queue exhausted")
    }
}
