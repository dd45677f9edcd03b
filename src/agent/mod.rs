//! The AI agent adapter: prompt optimization, schema validation, semantic
//! validation, single-shot repair, and malformed-response classification,
//! wrapped around a narrow model adapter trait.

pub mod context_optimizer;
pub mod metrics;
pub mod model;
pub mod schema_validation;

pub use context_optimizer::optimize_context;
pub use metrics::{MetricsEvent, MetricsEventType};
pub use model::{MockModelAdapter, ModelAdapter, StructuredGeneration};
pub use schema_validation::{compile_schema, MalformedResponseCategory};

use crate::config::AiAgentConfig;
use crate::error::ModelError;
use crate::types::engine_state::Phase;
use crate::types::{
    AiAgentPlanResponse, AiAgentScheduleResponse, EngineStatsCounter, ExecutionResults, JobContext,
};
use jsonschema::Validator;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Composes the model adapter with the optimize/generate/validate/repair
/// pipeline.
pub struct AiAgentAdapter {
    model: Arc<dyn ModelAdapter>,
    config: AiAgentConfig,
    stats: EngineStatsCounter,
    metrics_hook: Option<Arc<dyn Fn(MetricsEvent) + Send + Sync>>,
}

impl AiAgentAdapter {
    pub fn new(model: Arc<dyn ModelAdapter>, config: AiAgentConfig, stats: EngineStatsCounter) -> Self {
        Self {
            model,
            config,
            stats,
            metrics_hook: None,
        }
    }

    pub fn with_metrics_hook(mut self, hook: Arc<dyn Fn(MetricsEvent) + Send + Sync>) -> Self {
        self.metrics_hook = Some(hook);
        self
    }

    fn emit(&self, event: MetricsEvent) {
        if let Some(hook) = &self.metrics_hook {
            hook(event);
        }
    }

    pub async fn plan(&self, ctx: &JobContext) -> Result<AiAgentPlanResponse, ModelError> {
        let optimized = optimize_context(ctx, &self.config.prompt_optimization);
        let prompt = plan_prompt(&optimized);
        self.run_pipeline(Phase::Plan, &prompt, &plan_schema(), |value| {
            let plan: AiAgentPlanResponse = serde_json::from_value(value)
                .map_err(|e| ModelError::Schema(e.to_string()))?;
            validate_plan_semantics(&plan, self.config.semantic_strict)?;
            Ok(plan)
        })
        .await
    }

    pub async fn finalize_schedule(
        &self,
        ctx: &JobContext,
        results: &ExecutionResults,
    ) -> Result<AiAgentScheduleResponse, ModelError> {
        let optimized = optimize_context(ctx, &self.config.prompt_optimization);
        let prompt = schedule_prompt(&optimized, results);
        self.run_pipeline(Phase::Schedule, &prompt, &schedule_schema(), |value| {
            let schedule: AiAgentScheduleResponse = serde_json::from_value(value)
                .map_err(|e| ModelError::Schema(e.to_string()))?;
            validate_schedule_semantics(&schedule, self.config.semantic_strict)?;
            Ok(schedule)
        })
        .await
    }

    async fn run_pipeline<T>(
        &self,
        phase: Phase,
        prompt: &str,
        schema: &Value,
        parse: impl Fn(Value) -> Result<T, ModelError> + Send + Sync,
    ) -> Result<T, ModelError>
    where
        T: DeserializeOwned,
    {
        self.stats.record_ai_call();
        let generation = self.model.generate_structured(prompt, schema).await?;
        match self.validate_and_parse(&generation, schema, &parse) {
            Ok(value) => Ok(value),
            Err(err) => {
                if self.should_repair(&err) {
                    self.stats.record_repair_attempt(phase);
                    self.emit(MetricsEvent {
                        event_type: MetricsEventType::RepairAttempt,
                        phase,
                        category: None,
                    });
                    let retry = self.model.generate_structured(prompt, schema).await?;
                    match self.validate_and_parse(&retry, schema, &parse) {
                        Ok(value) => {
                            self.stats.record_repair_success(phase);
                            self.emit(MetricsEvent {
                                event_type: MetricsEventType::RepairSuccess,
                                phase,
                                category: None,
                            });
                            Ok(value)
                        }
                        Err(retry_err) => {
                            self.stats.record_repair_failure(phase);
                            self.stats.record_malformed(phase);
                            let category = classify_malformed(&retry_err);
                            self.emit(MetricsEvent {
                                event_type: MetricsEventType::RepairFailure,
                                phase,
                                category: Some(category),
                            });
                            self.emit(MetricsEvent {
                                event_type: MetricsEventType::Malformed,
                                phase,
                                category: Some(category),
                            });
                            Err(retry_err)
                        }
                    }
                } else {
                    self.stats.record_malformed(phase);
                    let category = classify_malformed(&err);
                    warn!(?phase, ?category, %err, "model response rejected, no repair attempted");
                    self.emit(MetricsEvent {
                        event_type: MetricsEventType::Malformed,
                        phase,
                        category: Some(category),
                    });
                    Err(err)
                }
            }
        }
    }

    fn validate_and_parse<T>(
        &self,
        generation: &StructuredGeneration,
        schema: &Value,
        parse: &(impl Fn(Value) -> Result<T, ModelError> + Send + Sync),
    ) -> Result<T, ModelError> {
        if generation.text.trim().is_empty() && generation.object.is_none() {
            return Err(ModelError::Empty);
        }
        let value = match &generation.object {
            Some(value) => value.clone(),
            None => schema_validation::parse_json(&generation.text)?,
        };
        let validator = schema_validation::compile_schema(schema)?;
        schema_validation::validate_against_schema(&validator, &value)?;
        parse(value)
    }

    fn should_repair(&self, err: &ModelError) -> bool {
        if !self.config.repair_malformed_responses || !err.is_repairable() {
            return false;
        }
        REPAIRABLE_PATTERN.is_match(&err.to_string())
    }
}

static REPAIRABLE_PATTERN: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"(?i)Semantic validation failed|Error parsing|schema").unwrap());

fn classify_malformed(err: &ModelError) -> MalformedResponseCategory {
    schema_validation::classify_malformed_message(&err.to_string())
}

fn validate_plan_semantics(plan: &AiAgentPlanResponse, strict: bool) -> Result<(), ModelError> {
    let mut issues = Vec::new();
    if plan.execution_strategy == crate::types::ExecutionStrategy::Parallel
        && plan.concurrency_limit < 2
    {
        issues.push("parallel strategy requires concurrencyLimit >= 2".to_string());
    }
    issues.extend(plan.dependency_issues());
    for call in &plan.endpoint_calls {
        if call.critical && call.priority < 1 {
            issues.push(format!(
                "critical endpoint {} must have priority >= 1",
                call.endpoint_id
            ));
        }
    }
    if !issues.is_empty() && strict {
        return Err(ModelError::Semantic(format!(
            "Semantic validation failed: {}",
            issues.join("; ")
        )));
    }
    Ok(())
}

fn validate_schedule_semantics(
    schedule: &AiAgentScheduleResponse,
    strict: bool,
) -> Result<(), ModelError> {
    let mut issues = Vec::new();
    if schedule.next_run_at <= chrono::Utc::now() {
        issues.push("nextRunAt must be strictly in the future".to_string());
    }
    if !(0.0..=1.0).contains(&schedule.confidence) {
        issues.push("confidence must be within [0,1]".to_string());
    }
    if !issues.is_empty() && strict {
        return Err(ModelError::Semantic(format!(
            "Semantic validation failed: {}",
            issues.join("; ")
        )));
    }
    Ok(())
}

fn plan_prompt(ctx: &JobContext) -> String {
    let mut out = String::new();
    for message in &ctx.messages {
        out.push_str(&format!("{:?}: {}\n", message.role, message.content));
    }
    out.push_str(&format!(
        "\nJob: {}\nEndpoints: {}\n",
        ctx.job.definition,
        ctx.endpoints.len()
    ));
    out
}

fn schedule_prompt(ctx: &JobContext, results: &ExecutionResults) -> String {
    format!(
        "{}\nExecution summary: {} succeeded, {} failed, {}ms total\n",
        plan_prompt(ctx),
        results.summary.success_count,
        results.summary.failure_count,
        results.summary.total_duration_ms
    )
}

fn plan_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "required": ["execution_strategy", "concurrency_limit", "endpoint_calls", "reasoning", "confidence"],
        "properties": {
            "execution_strategy": {"enum": ["sequential", "parallel"]},
            "concurrency_limit": {"type": "integer", "minimum": 1},
            "endpoint_calls": {"type": "array"},
            "reasoning": {"type": "string"},
            "confidence": {"type": "number", "minimum": 0, "maximum": 1}
        }
    })
}

fn schedule_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "required": ["next_run_at", "reasoning", "confidence"],
        "properties": {
            "next_run_at": {"type": "string"},
            "reasoning": {"type": "string"},
            "confidence": {"type": "number", "minimum": 0, "maximum": 1}
        }
    })
}

pub fn compiled_plan_schema() -> Validator {
    compile_schema(&plan_schema()).expect("static plan schema compiles")
}

pub fn compiled_schedule_schema() -> Validator {
    compile_schema(&schedule_schema()).expect("static schedule schema compiles")
}
