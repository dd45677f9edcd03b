//! Metrics events the AI agent adapter emits so callers can wire them into
//! whatever observability stack they run, without the adapter depending on
//! one directly.

use super::schema_validation::MalformedResponseCategory;
use crate::types::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsEventType {
    RepairAttempt,
    RepairSuccess,
    RepairFailure,
    Malformed,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricsEvent {
    pub event_type: MetricsEventType,
    pub phase: Phase,
    pub category: Option<MalformedResponseCategory>,
}
