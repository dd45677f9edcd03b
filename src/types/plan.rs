//! `AIAgentPlanResponse`: the structured object the planner call must
//! produce, plus the DAG-validity check shared by semantic validation and
//! the parallel executor.

use super::ids::EndpointId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointCall {
    pub endpoint_id: EndpointId,
    pub priority: i64,
    pub critical: bool,
    #[serde(default)]
    pub depends_on: Vec<EndpointId>,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiAgentPlanResponse {
    pub execution_strategy: ExecutionStrategy,
    pub concurrency_limit: u32,
    pub endpoint_calls: Vec<EndpointCall>,
    pub reasoning: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl AiAgentPlanResponse {
    /// Endpoint ids referenced by more than one call, or calls whose
    /// `depends_on` references an id absent from the plan, or a self-edge.
    /// Returns human-readable issues; empty means the dependency graph is
    /// a well-formed DAG over known ids.
    pub fn dependency_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let mut seen = HashSet::new();
        let mut duplicate = HashSet::new();
        for call in &self.endpoint_calls {
            if !seen.insert(call.endpoint_id) {
                duplicate.insert(call.endpoint_id);
            }
        }
        for id in &duplicate {
            issues.push(format!("duplicate endpoint id in plan: {id}"));
        }

        let known: HashSet<EndpointId> = self.endpoint_calls.iter().map(|c| c.endpoint_id).collect();
        for call in &self.endpoint_calls {
            for dep in &call.depends_on {
                if *dep == call.endpoint_id {
                    issues.push(format!("endpoint {} depends on itself", call.endpoint_id));
                } else if !known.contains(dep) {
                    issues.push(format!(
                        "endpoint {} depends on unknown endpoint {}",
                        call.endpoint_id, dep
                    ));
                }
            }
        }

        if issues.is_empty() && self.has_cycle() {
            issues.push("dependsOn edges contain a cycle".to_string());
        }
        issues
    }

    fn has_cycle(&self) -> bool {
        let adj: HashMap<EndpointId, &Vec<EndpointId>> = self
            .endpoint_calls
            .iter()
            .map(|c| (c.endpoint_id, &c.depends_on))
            .collect();

        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }
        let mut marks: HashMap<EndpointId, Mark> = HashMap::new();

        fn visit(
            id: EndpointId,
            adj: &HashMap<EndpointId, &Vec<EndpointId>>,
            marks: &mut HashMap<EndpointId, Mark>,
        ) -> bool {
            match marks.get(&id) {
                Some(Mark::Done) => return false,
                Some(Mark::Visiting) => return true,
                None => {}
            }
            marks.insert(id, Mark::Visiting);
            if let Some(deps) = adj.get(&id) {
                for dep in deps.iter() {
                    if visit(*dep, adj, marks) {
                        return true;
                    }
                }
            }
            marks.insert(id, Mark::Done);
            false
        }

        for id in adj.keys() {
            if visit(*id, &adj, &mut marks) {
                return true;
            }
        }
        false
    }
}
