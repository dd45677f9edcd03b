//! The HTTP transport seam. Real dispatch goes through `reqwest`; tests
//! swap in a scripted responder so the executor and retry-policy tests
//! never bind a real socket.

use crate::error::EndpointError;
use crate::types::HttpMethod;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpCallSuccess {
    pub status: u16,
    pub body_summary: Option<String>,
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn call(
        &self,
        method: HttpMethod,
        url: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<HttpCallSuccess, EndpointError>;
}

pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn call(
        &self,
        method: HttpMethod,
        url: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<HttpCallSuccess, EndpointError> {
        let request = self
            .client
            .request(method.as_reqwest(), url)
            .json(payload)
            .timeout(timeout);

        let response = request.send().await.map_err(reqwest_to_endpoint_error)?;
        let status = response.status().as_u16();
        let body_summary = response
            .text()
            .await
            .ok()
            .map(|body| body.chars().take(500).collect());

        if status >= 500 {
            return Err(EndpointError::Http5xx(status));
        }
        if (400..500).contains(&status) {
            return Err(EndpointError::Http4xx(status));
        }
        Ok(HttpCallSuccess {
            status,
            body_summary,
        })
    }
}

fn reqwest_to_endpoint_error(err: reqwest::Error) -> EndpointError {
    if err.is_timeout() {
        return EndpointError::Timeout;
    }
    if err.is_connect() {
        return EndpointError::Network(err.to_string());
    }
    if let Some(status) = err.status() {
        let code = status.as_u16();
        if code >= 500 {
            return EndpointError::Http5xx(code);
        }
        if (400..500).contains(&code) {
            return EndpointError::Http4xx(code);
        }
    }
    EndpointError::Unknown(err.to_string())
}
