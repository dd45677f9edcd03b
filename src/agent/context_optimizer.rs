//! Prompt optimization: keeps every `system` message, truncates the
//! remainder to the most recent window, and caps how much endpoint usage
//! history rides along in the prompt.

use crate::config::PromptOptimizationConfig;
use crate::types::{JobContext, MessageRole};

pub fn optimize_context(ctx: &JobContext, config: &PromptOptimizationConfig) -> JobContext {
    if !config.enabled {
        return ctx.clone();
    }

    let mut messages = ctx.messages.clone();
    let window = config.max_messages.max(config.min_recent_messages);

    let non_system_count = messages
        .iter()
        .filter(|m| m.role != MessageRole::System)
        .count();
    if non_system_count > window {
        let mut drop = non_system_count - window;
        messages.retain(|m| {
            if m.role == MessageRole::System || drop == 0 {
                true
            } else {
                drop -= 1;
                false
            }
        });
    }

    let mut endpoint_usage = ctx.endpoint_usage.clone();
    if endpoint_usage.len() > config.max_endpoint_usage_entries {
        let cut = endpoint_usage.len() - config.max_endpoint_usage_entries;
        endpoint_usage.drain(0..cut);
    }

    JobContext {
        job: ctx.job.clone(),
        endpoints: ctx.endpoints.clone(),
        messages,
        endpoint_usage,
        execution_context: ctx.execution_context.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Endpoint, EndpointUsage, ExecutionContext, HttpMethod, Job, Message};
    use chrono::Utc;

    fn base_ctx(message_count: usize) -> JobContext {
        let job = Job::new("demo", Utc::now());
        let mut messages = vec![Message::new(MessageRole::System, "be careful", 0)];
        for i in 1..=message_count {
            messages.push(Message::new(MessageRole::User, format!("turn {i}"), i as u64));
        }
        JobContext {
            job,
            endpoints: Vec::<Endpoint>::new(),
            messages,
            endpoint_usage: Vec::<EndpointUsage>::new(),
            execution_context: ExecutionContext {
                current_time: Utc::now(),
                system_environment: "test".to_string(),
            },
        }
    }

    #[test]
    fn keeps_all_system_messages_and_trims_the_rest() {
        let ctx = base_ctx(100);
        let config = PromptOptimizationConfig {
            enabled: true,
            max_messages: 10,
            min_recent_messages: 5,
            max_endpoint_usage_entries: 20,
        };
        let optimized = optimize_context(&ctx, &config);
        let system_count = optimized
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .count();
        assert_eq!(system_count, 1);
        assert_eq!(optimized.messages.len(), 11);
    }

    #[test]
    fn disabled_optimization_is_a_no_op() {
        let ctx = base_ctx(50);
        let config = PromptOptimizationConfig {
            enabled: false,
            ..PromptOptimizationConfig::default()
        };
        let optimized = optimize_context(&ctx, &config);
        assert_eq!(optimized.messages.len(), ctx.messages.len());
    }

    #[test]
    fn endpoint_usage_is_capped_to_most_recent_entries() {
        let mut ctx = base_ctx(1);
        let endpoint_id = crate::types::EndpointId::new();
        for _ in 0..30 {
            ctx.endpoint_usage.push(EndpointUsage {
                endpoint_id,
                timestamp: Utc::now(),
                success: true,
                latency_ms: 10,
                classification: None,
            });
        }
        let config = PromptOptimizationConfig::default();
        let optimized = optimize_context(&ctx, &config);
        assert_eq!(optimized.endpoint_usage.len(), config.max_endpoint_usage_entries);
        let _ = HttpMethod::Get;
    }
}
