//! The `Endpoint` entity: an HTTP call a job's plan may invoke. Immutable
//! from the engine's point of view.

use super::ids::{EndpointId, JobId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_reqwest(&self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,
    pub job_id: JobId,
    pub method: HttpMethod,
    pub url: String,
    /// JSON Schema describing the request payload the plan must produce.
    pub request_schema: Value,
    /// JSON Schema the response body is expected to conform to, if any.
    pub response_schema: Option<Value>,
}
