//! Structured-output schema for the unified generator and the validation that
//! turns an untyped JSON object into a [`GenerationResult`].

use serde_json::{json, Map, Value};

use super::extract::strip_code_fence;
use crate::error::DiagramError;
use crate::types::{clamp_dimension, GenerationResult, Technology, TokenUsage};

/// Keys every diagram object must carry.
pub const REQUIRED_KEYS: [&str; 6] = ["type", "content", "title", "explanation", "width", "height"];

/// JSON schema handed to providers that support structured output.
///
/// The first attempt asks for a leading `reasoning` field so the model plans
/// before writing code. The retry after a schema violation drops it.
pub fn response_schema(include_reasoning: bool) -> Value {
    let mut properties = Map::new();
    let mut required: Vec<&str> = Vec::new();

    if include_reasoning {
        properties.insert(
            "reasoning".to_string(),
            json!({
                "type": "string",
                "description": "One or two sentences on why this technology fits the request"
            }),
        );
        required.push("reasoning");
    }

    properties.insert(
        "type".to_string(),
        json!({
            "type": "string",
            "enum": Technology::ALL.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
            "description": "Rendering technology"
        }),
    );
    properties.insert(
        "content".to_string(),
        json!({
            "type": "string",
            "description": "Complete source code or markup for the chosen technology"
        }),
    );
    properties.insert(
        "title".to_string(),
        json!({ "type": "string", "description": "Short diagram title" }),
    );
    properties.insert(
        "explanation".to_string(),
        json!({ "type": "string", "description": "Caption shown to the student" }),
    );
    properties.insert(
        "width".to_string(),
        json!({ "type": "integer", "description": "Preferred width in pixels" }),
    );
    properties.insert(
        "height".to_string(),
        json!({ "type": "integer", "description": "Preferred height in pixels" }),
    );
    required.extend(REQUIRED_KEYS);

    json!({
        "type": "object",
        "properties": Value::Object(properties),
        "required": required,
        "additionalProperties": false
    })
}

/// True when `value` is an object carrying every required key with a non-null value.
pub fn has_required_keys(value: &Value) -> bool {
    value.as_object().is_some_and(|object| {
        REQUIRED_KEYS
            .iter()
            .all(|key| object.get(*key).is_some_and(|v| !v.is_null()))
    })
}

fn required_string<'a>(object: &'a Map<String, Value>, key: &str) -> Result<&'a str, DiagramError> {
    match object.get(key) {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(DiagramError::SchemaViolation(format!(
            "field '{key}' must be a string, got {}",
            type_name(other)
        ))),
        None => Err(DiagramError::SchemaViolation(format!(
            "missing required field '{key}'"
        ))),
    }
}

fn required_dimension(object: &Map<String, Value>, key: &str) -> Result<u32, DiagramError> {
    let value = object
        .get(key)
        .ok_or_else(|| DiagramError::SchemaViolation(format!("missing required field '{key}'")))?;

    let number = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64)),
        _ => None,
    };

    number.map(clamp_dimension).ok_or_else(|| {
        DiagramError::SchemaViolation(format!(
            "field '{key}' must be a number, got {}",
            type_name(value)
        ))
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Validate a candidate object and convert it into a [`GenerationResult`].
///
/// Token usage is left empty; the caller fills it from the reply.
pub fn validate_object(value: &Value) -> Result<GenerationResult, DiagramError> {
    let object = value.as_object().ok_or_else(|| {
        DiagramError::SchemaViolation(format!("expected an object, got {}", type_name(value)))
    })?;

    let raw_type = required_string(object, "type")?;
    let technology = Technology::parse(raw_type).ok_or_else(|| {
        DiagramError::SchemaViolation(format!(
            "field 'type' must be one of matplotlib, svg, latex, graphviz; got '{raw_type}'"
        ))
    })?;

    let content = strip_code_fence(required_string(object, "content")?);
    if content.trim().is_empty() {
        return Err(DiagramError::SchemaViolation(
            "field 'content' must not be empty".to_string(),
        ));
    }

    let title = required_string(object, "title")?;
    let explanation = required_string(object, "explanation")?;
    let width = required_dimension(object, "width")?;
    let height = required_dimension(object, "height")?;

    Ok(GenerationResult {
        technology,
        content: content.to_string(),
        title: title.trim().to_string(),
        explanation: explanation.trim().to_string(),
        width,
        height,
        usage: TokenUsage::default(),
    })
}

/// Strict validity check used in regeneration mode.
///
/// Rejects an empty response, the literal `null`, an empty object and any
/// response whose JSON is missing a required key.
pub fn is_usable_response(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        return false;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => has_required_keys(&value),
        Err(_) => super::extract::salvage_json(trimmed)
            .map(|value| has_required_keys(&value))
            .unwrap_or(false),
    }
}
