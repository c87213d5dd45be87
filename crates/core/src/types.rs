use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DiagramError;

/// Smallest width/height a model may request, in pixels.
pub const MIN_DIMENSION: u32 = 200;
/// Largest width/height a model may request, in pixels.
pub const MAX_DIMENSION: u32 = 4096;

/// Rendering technologies the model can choose from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Technology {
    Matplotlib,
    Svg,
    Latex,
    Graphviz,
}

impl Technology {
    pub const ALL: [Technology; 4] = [
        Technology::Matplotlib,
        Technology::Svg,
        Technology::Latex,
        Technology::Graphviz,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Technology::Matplotlib => "matplotlib",
            Technology::Svg => "svg",
            Technology::Latex => "latex",
            Technology::Graphviz => "graphviz",
        }
    }

    pub fn parse(value: &str) -> Option<Technology> {
        Technology::ALL
            .into_iter()
            .find(|tech| tech.as_str() == value.trim().to_ascii_lowercase())
    }

    /// Technologies whose source is executed by an interpreter or renderer
    /// process rather than returned as markup.
    pub fn executes_code(&self) -> bool {
        matches!(self, Technology::Matplotlib | Technology::Graphviz)
    }
}

impl fmt::Display for Technology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One prior turn of the tutoring conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
}

/// Inbound diagram request, as posted by the route layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramRequest {
    #[serde(default)]
    pub conversation_history: Vec<ConversationTurn>,
    pub diagram_request: String,
    #[serde(default = "default_subject")]
    pub subject: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub regenerate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
}

fn default_subject() -> String {
    "general".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

impl DiagramRequest {
    pub fn new(diagram_request: impl Into<String>) -> Self {
        Self {
            conversation_history: Vec::new(),
            diagram_request: diagram_request.into(),
            subject: default_subject(),
            language: default_language(),
            regenerate: false,
            session_id: None,
            student_id: None,
        }
    }

    /// Caller identifier used in logs only.
    pub fn caller(&self) -> &str {
        self.session_id
            .as_deref()
            .or(self.student_id.as_deref())
            .unwrap_or("anonymous")
    }

    /// Title used when no generated title exists yet.
    pub fn fallback_title(&self) -> String {
        let trimmed = self.diagram_request.trim();
        if trimmed.chars().count() > 60 {
            let head: String = trimmed.chars().take(57).collect();
            format!("{head}...")
        } else if trimmed.is_empty() {
            "Diagram".to_string()
        } else {
            trimmed.to_string()
        }
    }
}

/// Token accounting across every model call made for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

/// Validated output of the unified generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationResult {
    pub technology: Technology,
    pub content: String,
    pub title: String,
    pub explanation: String,
    pub width: u32,
    pub height: u32,
    pub usage: TokenUsage,
}

/// Transport encoding of a rendered diagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePayload {
    /// Base64-encoded PNG bytes.
    Png(String),
    /// Inline SVG markup.
    Svg(String),
}

impl ImagePayload {
    pub fn into_inner(self) -> String {
        match self {
            ImagePayload::Png(data) | ImagePayload::Svg(data) => data,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ImagePayload::Png(data) | ImagePayload::Svg(data) => data.is_empty(),
        }
    }
}

/// Result of one executor invocation: a complete image or an error, never both.
pub type ExecutionOutcome = Result<ImagePayload, DiagramError>;

/// Sizing information sent alongside the image so a client can lay out a
/// surface before decoding it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderingHint {
    pub width: u32,
    pub height: u32,
    pub background: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f32>,
}

impl RenderingHint {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            background: "#ffffff".to_string(),
            scale: None,
        }
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = Some(scale);
        self
    }
}

/// Outbound payload. `success` is always true; failures travel in `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramResponse {
    pub success: bool,
    pub diagram_type: Technology,
    pub diagram_code: String,
    pub diagram_title: String,
    pub explanation: String,
    pub rendering_hint: RenderingHint,
    pub processing_time_ms: u64,
    pub tokens_used: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Clamp a model-provided dimension into the sane pixel range.
pub fn clamp_dimension(value: i64) -> u32 {
    value.clamp(MIN_DIMENSION as i64, MAX_DIMENSION as i64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request: DiagramRequest =
            serde_json::from_str(r#"{"diagram_request": "draw a triangle"}"#).unwrap();
        assert_eq!(request.subject, "general");
        assert_eq!(request.language, "en");
        assert!(!request.regenerate);
        assert!(request.conversation_history.is_empty());
        assert_eq!(request.caller(), "anonymous");
    }

    #[test]
    fn test_technology_parse_is_case_insensitive() {
        assert_eq!(Technology::parse("GraphViz"), Some(Technology::Graphviz));
        assert_eq!(Technology::parse(" svg "), Some(Technology::Svg));
        assert_eq!(Technology::parse("mermaid"), None);
    }

    #[test]
    fn test_clamp_dimension() {
        assert_eq!(clamp_dimension(10), MIN_DIMENSION);
        assert_eq!(clamp_dimension(800), 800);
        assert_eq!(clamp_dimension(100_000), MAX_DIMENSION);
    }

    #[test]
    fn test_fallback_title_truncates() {
        let request = DiagramRequest::new("a".repeat(100));
        assert_eq!(request.fallback_title().chars().count(), 60);
        assert_eq!(DiagramRequest::new("  ").fallback_title(), "Diagram");
    }

    #[test]
    fn test_response_omits_empty_error() {
        let response = DiagramResponse {
            success: true,
            diagram_type: Technology::Svg,
            diagram_code: "<svg/>".into(),
            diagram_title: "t".into(),
            explanation: "e".into(),
            rendering_hint: RenderingHint::new(400, 300),
            processing_time_ms: 1,
            tokens_used: 0,
            error: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["diagram_type"], "svg");
    }
}
