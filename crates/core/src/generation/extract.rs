use serde_json::Value;

use super::reply::{ModelReply, ReplyBlock, ReplyBody};
use super::schema::validate_object;
use crate::error::DiagramError;
use crate::types::GenerationResult;

/// Recover a JSON object from text that wraps it in prose or fences.
///
/// Takes the span from the first `{` to the last `}` and keeps it only if it
/// parses as an object.
pub fn salvage_json(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }

    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Remove a markdown fence wrapped around generated source.
///
/// Drops an opening fence line (with or without a language tag) and a closing
/// fence. Unfenced source is returned untouched.
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return content;
    };

    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()).trim_start(),
    };
    let body = body.trim_end();
    let body = body.strip_suffix("```").unwrap_or(body);

    body.trim_start_matches(['\r', '\n']).trim_end()
}

/// Turn a decoded reply into a validated [`GenerationResult`].
///
/// Order of preference: a pre-parsed object, then any block tagged as JSON,
/// then text blocks through [`salvage_json`]. Thought blocks are ignored.
pub fn extract_generation(reply: &ModelReply) -> Result<GenerationResult, DiagramError> {
    let mut result = match &reply.body {
        ReplyBody::Parsed(value) => validate_object(value)?,
        ReplyBody::Blocks(blocks) => extract_from_blocks(blocks)?,
    };
    result.usage = reply.usage;
    Ok(result)
}

fn extract_from_blocks(blocks: &[ReplyBlock]) -> Result<GenerationResult, DiagramError> {
    let mut last_error = None;

    for block in blocks {
        if let ReplyBlock::Json(value) = block {
            match validate_object(value) {
                Ok(result) => return Ok(result),
                Err(e) => last_error = Some(e),
            }
        }
    }

    for block in blocks {
        if let ReplyBlock::Text(text) = block {
            let Some(value) = salvage_json(text) else {
                continue;
            };
            match validate_object(&value) {
                Ok(result) => return Ok(result),
                Err(e) => last_error = Some(e),
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        DiagramError::SchemaViolation("no response block contained a JSON object".to_string())
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Technology, TokenUsage};
    use serde_json::json;

    fn diagram_json() -> Value {
        json!({
            "type": "graphviz",
            "content": "digraph G { a -> b }",
            "title": "Flow",
            "explanation": "A to B",
            "width": 600,
            "height": 400
        })
    }

    #[test]
    fn test_salvage_recovers_object_from_prose() {
        let object = diagram_json();
        let cases = [
            format!("Here is the diagram you asked for:\n{object}\nLet me know!"),
            format!("```json\n{object}\n```"),
            format!("{object}"),
            format!("Note: the following is valid.\n\n{object}\n\nThanks."),
        ];
        for text in cases {
            assert_eq!(salvage_json(&text), Some(object.clone()), "text: {text}");
        }
    }

    #[test]
    fn test_salvage_rejects_non_json() {
        assert_eq!(salvage_json("no braces here"), None);
        assert_eq!(salvage_json("} backwards {"), None);
        assert_eq!(salvage_json("{ not json }"), None);
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```dot\ndigraph G { a }\n```"), "digraph G { a }");
        assert_eq!(strip_code_fence("  ```\r\n<svg></svg>\r\n```  "), "<svg></svg>");
        assert_eq!(strip_code_fence("```svg <svg></svg>```"), "<svg></svg>");
        assert_eq!(strip_code_fence("digraph G { a }\n"), "digraph G { a }\n");
    }

    #[test]
    fn test_extract_prefers_parsed_object() {
        let reply = ModelReply::parsed(diagram_json()).with_usage(TokenUsage {
            prompt_tokens: 3,
            completion_tokens: 4,
        });
        let result = extract_generation(&reply).unwrap();
        assert_eq!(result.technology, Technology::Graphviz);
        assert_eq!(result.usage.total(), 7);
    }

    #[test]
    fn test_extract_prefers_json_block_over_text() {
        let mut other = diagram_json();
        other["title"] = json!("From text");
        let reply = ModelReply {
            body: ReplyBody::Blocks(vec![
                ReplyBlock::Thought("{\"type\": \"svg\"}".into()),
                ReplyBlock::Text(other.to_string()),
                ReplyBlock::Json(diagram_json()),
            ]),
            usage: TokenUsage::default(),
        };
        assert_eq!(extract_generation(&reply).unwrap().title, "Flow");
    }

    #[test]
    fn test_extract_falls_back_to_text_salvage() {
        let reply = ModelReply::from_text(format!("Sure.\n{}\nEnjoy", diagram_json()));
        assert_eq!(extract_generation(&reply).unwrap().title, "Flow");
    }

    #[test]
    fn test_extract_ignores_thought_blocks() {
        let reply = ModelReply {
            body: ReplyBody::Blocks(vec![ReplyBlock::Thought(diagram_json().to_string())]),
            usage: TokenUsage::default(),
        };
        assert!(matches!(
            extract_generation(&reply),
            Err(DiagramError::SchemaViolation(_))
        ));
    }

    #[test]
    fn test_extract_reports_validation_error_of_salvaged_object() {
        let mut broken = diagram_json();
        broken["type"] = json!("plantuml");
        let reply = ModelReply::from_text(format!("ok {broken}"));
        let err = extract_generation(&reply).unwrap_err();
        assert!(err.to_string().contains("plantuml"));
    }
}
