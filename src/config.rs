//! Typed configuration. Every field has an explicit default;
//! `validate_engine_config` is total and pure, checking the combination of
//! defaults-or-overrides for internal consistency rather than any single
//! field in isolation.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptOptimizationConfig {
    pub enabled: bool,
    pub max_messages: usize,
    pub min_recent_messages: usize,
    pub max_endpoint_usage_entries: usize,
}

impl Default for PromptOptimizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_messages: 40,
            min_recent_messages: 10,
            max_endpoint_usage_entries: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiAgentConfig {
    pub model: String,
    pub validate_semantics: bool,
    pub semantic_strict: bool,
    pub repair_malformed_responses: bool,
    pub prompt_optimization: PromptOptimizationConfig,
}

impl Default for AiAgentConfig {
    fn default() -> Self {
        Self {
            model: "default".to_string(),
            validate_semantics: true,
            semantic_strict: true,
            repair_malformed_responses: false,
            prompt_optimization: PromptOptimizationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub max_concurrency: u32,
    pub default_timeout_ms: u64,
    pub default_concurrency_limit: u32,
    pub max_retries: u32,
    pub circuit_threshold: u64,
    pub cooldown_cycles: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            default_timeout_ms: 30_000,
            default_concurrency_limit: 3,
            max_retries: 2,
            circuit_threshold: 5,
            cooldown_cycles: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub interval_ms: u64,
    pub max_batch_size: u32,
    pub job_concurrency: u32,
    pub cycle_timeout_ms: u64,
    /// Lease TTL granted to `lockJob`; must exceed `cycle_timeout_ms` so a
    /// job cannot be double-claimed mid-cycle.
    pub job_lease_ttl_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            max_batch_size: 20,
            job_concurrency: 5,
            cycle_timeout_ms: 60_000,
            job_lease_ttl_ms: 120_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub ai_agent: AiAgentConfig,
    pub execution: ExecutionConfig,
    pub scheduler: SchedulerConfig,
    pub metrics: MetricsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ai_agent: AiAgentConfig::default(),
            execution: ExecutionConfig::default(),
            scheduler: SchedulerConfig {
                max_batch_size: 20,
                ..SchedulerConfig::default()
            },
            metrics: MetricsConfig { enabled: true },
        }
    }
}

/// Defaults are already baked in via `Default`; this validates the
/// combination is internally consistent, returning `EngineError::ConfigInvalid`
/// for the engine to surface as a fatal startup error.
pub fn validate_engine_config(config: &EngineConfig) -> Result<(), EngineError> {
    if config.scheduler.max_batch_size == 0 {
        return Err(EngineError::ConfigInvalid(
            "scheduler.max_batch_size must be >= 1".to_string(),
        ));
    }
    if config.scheduler.job_concurrency == 0 {
        return Err(EngineError::ConfigInvalid(
            "scheduler.job_concurrency must be >= 1".to_string(),
        ));
    }
    if config.execution.default_concurrency_limit < 1 {
        return Err(EngineError::ConfigInvalid(
            "execution.default_concurrency_limit must be >= 1".to_string(),
        ));
    }
    if config.scheduler.job_lease_ttl_ms <= config.scheduler.cycle_timeout_ms {
        return Err(EngineError::ConfigInvalid(
            "scheduler.job_lease_ttl_ms must exceed scheduler.cycle_timeout_ms".to_string(),
        ));
    }
    if config.ai_agent.prompt_optimization.min_recent_messages
        > config.ai_agent.prompt_optimization.max_messages
    {
        return Err(EngineError::ConfigInvalid(
            "promptOptimization.minRecentMessages cannot exceed maxMessages".to_string(),
        ));
    }
    Ok(())
}
