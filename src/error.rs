//! Error taxonomy for the engine: each subsystem gets its own `thiserror`
//! enum, and `EngineError` aggregates them via `#[from]`.

use crate::classify::ErrorCategory;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("schema validation failed: {0}")]
    Schema(String),
    #[error("semantic validation failed: {0}")]
    Semantic(String),
    #[error("empty model response")]
    Empty,
    #[error("vendor error: {0}")]
    Vendor(String),
}

impl ModelError {
    /// Whether this error is eligible for the single-shot repair path —
    /// the message must match `/Semantic validation failed|Error parsing|schema/i`.
    pub fn is_repairable(&self) -> bool {
        !matches!(self, ModelError::Vendor(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("timeout")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("http 4xx: {0}")]
    Http4xx(u16),
    #[error("http 5xx: {0}")]
    Http5xx(u16),
    #[error("aborted")]
    Aborted,
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl EndpointError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EndpointError::Timeout => ErrorCategory::Timeout,
            EndpointError::Network(_) => ErrorCategory::Network,
            EndpointError::Http4xx(_) => ErrorCategory::Http4xx,
            EndpointError::Http5xx(_) => ErrorCategory::Http5xx,
            EndpointError::Aborted => ErrorCategory::Aborted,
            EndpointError::Unknown(_) => ErrorCategory::Unknown,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid engine configuration: {0}")]
    ConfigInvalid(String),
    #[error("cancelled")]
    Cancelled,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_errors_are_not_repairable() {
        assert!(!ModelError::Vendor("boom".into()).is_repairable());
        assert!(ModelError::Schema("bad".into()).is_repairable());
    }

    #[test]
    fn endpoint_error_category_mapping() {
        assert_eq!(EndpointError::Timeout.category(), ErrorCategory::Timeout);
        assert_eq!(EndpointError::Http5xx(503).category(), ErrorCategory::Http5xx);
    }
}
