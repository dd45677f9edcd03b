//! Structured-response validation: markdown-fence stripping, JSON parsing,
//! and JSON Schema validation, each producing a distinct `ModelError` so the
//! repair loop and malformed-response metrics can tell them apart.

use crate::error::ModelError;
use jsonschema::Validator;
use serde_json::Value;

/// Closed set of malformed-response buckets for metrics and repair
/// eligibility. Every `ModelError::Schema`/`ModelError::Semantic` message
/// produced by this module falls into exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedResponseCategory {
    SchemaParseError,
    InvalidEnumValue,
    StructuralInconsistency,
    SemanticViolation,
    EmptyResponse,
}

pub fn classify_malformed_message(message: &str) -> MalformedResponseCategory {
    let lower = message.to_lowercase();
    if lower.contains("empty model response") {
        MalformedResponseCategory::EmptyResponse
    } else if lower.contains("semantic validation failed") {
        MalformedResponseCategory::SemanticViolation
    } else if lower.contains("invalid enum value") {
        MalformedResponseCategory::InvalidEnumValue
    } else if lower.contains("schema validation failed") {
        MalformedResponseCategory::StructuralInconsistency
    } else if lower.contains("error parsing") || lower.contains("expected") {
        MalformedResponseCategory::SchemaParseError
    } else {
        MalformedResponseCategory::StructuralInconsistency
    }
}

/// Drops a leading/trailing ```json ... ``` or ``` ... ``` fence, the way
/// models commonly wrap structured output despite being asked not to.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        let rest = rest.trim_start_matches(['\n', '\r']);
        if let Some(body) = rest.strip_suffix("```") {
            return body.trim();
        }
        return rest.trim();
    }
    trimmed
}

pub fn parse_json(text: &str) -> Result<Value, ModelError> {
    serde_json::from_str(strip_code_fences(text))
        .map_err(|e| ModelError::Schema(format!("Error parsing model response as JSON: {e}")))
}

pub fn compile_schema(schema: &Value) -> Result<Validator, ModelError> {
    jsonschema::validator_for(schema)
        .map_err(|e| ModelError::Schema(format!("invalid schema: {e}")))
}

pub fn validate_against_schema(validator: &Validator, instance: &Value) -> Result<(), ModelError> {
    let errors: Vec<String> = validator
        .iter_errors(instance)
        .map(|e| e.to_string())
        .collect();
    if errors.is_empty() {
        return Ok(());
    }
    if errors.iter().any(|e| e.contains("is not one of")) {
        Err(ModelError::Schema(format!(
            "invalid enum value: {}",
            errors.join("; ")
        )))
    } else {
        Err(ModelError::Schema(format!(
            "schema validation failed: {}",
            errors.join("; ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fence() {
        let text = "```json\n{\"a\":1}\n```";
        assert_eq!(strip_code_fences(text), "{\"a\":1}");
    }

    #[test]
    fn leaves_bare_json_untouched() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(parse_json("not json").is_err());
    }

    #[test]
    fn missing_required_field_is_a_structural_inconsistency() {
        let schema = serde_json::json!({"type": "object", "required": ["a"]});
        let validator = compile_schema(&schema).unwrap();
        let err = validate_against_schema(&validator, &serde_json::json!({})).unwrap_err();
        assert!(matches!(err, ModelError::Schema(_)));
        assert_eq!(
            classify_malformed_message(&err.to_string()),
            MalformedResponseCategory::StructuralInconsistency
        );
    }

    #[test]
    fn enum_mismatch_is_an_invalid_enum_value() {
        let schema = serde_json::json!({"type": "string", "enum": ["a", "b"]});
        let validator = compile_schema(&schema).unwrap();
        let err = validate_against_schema(&validator, &serde_json::json!("c")).unwrap_err();
        assert_eq!(
            classify_malformed_message(&err.to_string()),
            MalformedResponseCategory::InvalidEnumValue
        );
    }

    #[test]
    fn classifies_known_message_shapes() {
        assert_eq!(
            classify_malformed_message("schema validation failed: required"),
            MalformedResponseCategory::StructuralInconsistency
        );
        assert_eq!(
            classify_malformed_message("Semantic validation failed: bad"),
            MalformedResponseCategory::SemanticViolation
        );
        assert_eq!(
            classify_malformed_message("empty model response"),
            MalformedResponseCategory::EmptyResponse
        );
    }
}
