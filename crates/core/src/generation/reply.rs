//! Provider reply shapes.
//!
//! Providers disagree on how structured output comes back. Some hand over an
//! already-parsed object, others a list of content blocks where reasoning,
//! tool input and plain text are interleaved. Each known wire shape gets one
//! decoder; [`probe_shape`] picks the decoder by looking for markers that
//! only that shape carries, so nothing downstream branches on provider names.

use serde_json::Value;

use crate::types::TokenUsage;

/// One block of a block-structured reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyBlock {
    /// Reasoning or thinking output; always discarded.
    Thought(String),
    /// A block the provider explicitly tags as structured JSON.
    Json(Value),
    /// Free text that may or may not contain a JSON object.
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplyBody {
    /// The provider already parsed the structured output.
    Parsed(Value),
    Blocks(Vec<ReplyBlock>),
}

/// A decoded provider reply plus its token accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub body: ReplyBody,
    pub usage: TokenUsage,
}

impl ModelReply {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            body: ReplyBody::Blocks(vec![ReplyBlock::Text(text.into())]),
            usage: TokenUsage::default(),
        }
    }

    pub fn parsed(value: Value) -> Self {
        Self {
            body: ReplyBody::Parsed(value),
            usage: TokenUsage::default(),
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Text the strict regeneration check inspects. Thought blocks never count.
    pub fn candidate_texts(&self) -> Vec<String> {
        match &self.body {
            ReplyBody::Parsed(value) => vec![value.to_string()],
            ReplyBody::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ReplyBlock::Thought(_) => None,
                    ReplyBlock::Json(value) => Some(value.to_string()),
                    ReplyBlock::Text(text) => Some(text.clone()),
                })
                .collect(),
        }
    }
}

/// Wire shapes we know how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyShape {
    /// `{"choices": [{"message": {...}}], "usage": {...}}`
    ChatCompletion,
    /// `{"content": [{"type": "thinking" | "text" | "tool_use", ...}], "usage": {...}}`
    ContentBlocks,
    /// Anything else; treated as free text.
    FreeText,
}

pub fn probe_shape(body: &Value) -> ReplyShape {
    if body.get("choices").is_some_and(Value::is_array) {
        return ReplyShape::ChatCompletion;
    }

    let typed_blocks = body
        .get("content")
        .and_then(Value::as_array)
        .is_some_and(|blocks| blocks.iter().all(|b| b.get("type").is_some()));
    if typed_blocks {
        return ReplyShape::ContentBlocks;
    }

    ReplyShape::FreeText
}

/// Decode a raw provider body by probing its shape.
pub fn decode_reply(body: &Value) -> ModelReply {
    match probe_shape(body) {
        ReplyShape::ChatCompletion => decode_chat_completion(body),
        ReplyShape::ContentBlocks => decode_content_blocks(body),
        ReplyShape::FreeText => match body {
            Value::String(text) => ModelReply::from_text(text.clone()),
            other => ModelReply::from_text(other.to_string()),
        },
    }
}

fn usage_field(usage: Option<&Value>, key: &str) -> u64 {
    usage
        .and_then(|u| u.get(key))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

fn decode_chat_completion(body: &Value) -> ModelReply {
    let usage = TokenUsage {
        prompt_tokens: usage_field(body.get("usage"), "prompt_tokens"),
        completion_tokens: usage_field(body.get("usage"), "completion_tokens"),
    };

    let message = body.pointer("/choices/0/message");

    if let Some(parsed) = message.and_then(|m| m.get("parsed")).filter(|p| p.is_object()) {
        return ModelReply::parsed(parsed.clone()).with_usage(usage);
    }

    let mut blocks = Vec::new();
    for key in ["reasoning_content", "reasoning"] {
        if let Some(thought) = message.and_then(|m| m.get(key)).and_then(Value::as_str) {
            blocks.push(ReplyBlock::Thought(thought.to_string()));
        }
    }

    let content = message
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    // Strict structured output returns the object as the whole content string.
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(content.trim()) {
        return ModelReply::parsed(value).with_usage(usage);
    }

    blocks.push(ReplyBlock::Text(content.to_string()));
    ModelReply {
        body: ReplyBody::Blocks(blocks),
        usage,
    }
}

fn decode_content_blocks(body: &Value) -> ModelReply {
    let usage = TokenUsage {
        prompt_tokens: usage_field(body.get("usage"), "input_tokens"),
        completion_tokens: usage_field(body.get("usage"), "output_tokens"),
    };

    let blocks = body
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let text_of = |key: &str| {
                        item.get(key)
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string()
                    };
                    match item.get("type").and_then(Value::as_str) {
                        Some("thinking") => Some(ReplyBlock::Thought(text_of("thinking"))),
                        Some("redacted_thinking") => Some(ReplyBlock::Thought(String::new())),
                        Some("tool_use") => item.get("input").cloned().map(ReplyBlock::Json),
                        Some("text") => Some(ReplyBlock::Text(text_of("text"))),
                        _ => None,
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    ModelReply {
        body: ReplyBody::Blocks(blocks),
        usage,
    }
}
