use super::{JsonRpcError, Tool};
use crate::pipeline::Pipeline;
use crate::provider::Provider;
use drawkit_core::DiagramRequest;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct ServerCapabilities {
    pub tools: Option<ToolsCapability>,
}

#[derive(Debug, Serialize)]
pub struct ToolsCapability {}

#[derive(Debug, Serialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

#[derive(Debug, Serialize)]
pub struct ToolsList {
    pub tools: Vec<Tool>,
}

#[derive(Debug, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    pub arguments: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct CallToolResult {
    pub content: Vec<Content>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum Content {
    #[serde(rename = "text")]
    Text { text: String },
}

pub fn handle_initialize() -> Result<serde_json::Value, JsonRpcError> {
    let result = InitializeResult {
        protocol_version: "2024-11-05".to_string(),
        capabilities: ServerCapabilities {
            tools: Some(ToolsCapability {}),
        },
        server_info: ServerInfo {
            name: "drawkit".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    };

    serde_json::to_value(result).map_err(|e| JsonRpcError::internal(format!("Internal error: {e}")))
}

pub fn handle_tools_list() -> Result<serde_json::Value, JsonRpcError> {
    let tools = vec![Tool {
        name: "generate_diagram".to_string(),
        description: "Generate an educational diagram for a tutoring conversation. The model picks the best technology (matplotlib, svg, latex or graphviz), the code is executed in isolation and the rendered image is returned as base64 PNG or inline SVG. Always succeeds: when rendering fails twice a placeholder SVG is returned and the 'error' field explains why.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "diagram_request": {
                    "type": "string",
                    "description": "What the student wants drawn"
                },
                "conversation_history": {
                    "type": "array",
                    "description": "Prior turns, oldest first (only the most recent few are used)",
                    "items": {
                        "type": "object",
                        "properties": {
                            "role": { "type": "string" },
                            "content": { "type": "string" }
                        },
                        "required": ["role", "content"]
                    }
                },
                "subject": {
                    "type": "string",
                    "description": "Subject area, e.g. 'physics' (default: general)"
                },
                "language": {
                    "type": "string",
                    "description": "Language code for title and explanation (default: en)"
                },
                "regenerate": {
                    "type": "boolean",
                    "description": "Use the higher-quality model for a retry the student asked for"
                }
            },
            "required": ["diagram_request"]
        }),
    }];

    serde_json::to_value(ToolsList { tools })
        .map_err(|e| JsonRpcError::internal(format!("Internal error: {e}")))
}

pub async fn handle_tools_call<P: Provider>(
    params: Option<serde_json::Value>,
    pipeline: &Pipeline<P>,
) -> Result<serde_json::Value, JsonRpcError> {
    let params: CallToolParams = serde_json::from_value(params.unwrap_or(serde_json::Value::Null))
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {e}")))?;

    match params.name.as_str() {
        "generate_diagram" => handle_generate_diagram(params.arguments, pipeline).await,
        _ => Err(JsonRpcError::invalid_params(format!(
            "Unknown tool: {}",
            params.name
        ))),
    }
}

async fn handle_generate_diagram<P: Provider>(
    arguments: Option<serde_json::Value>,
    pipeline: &Pipeline<P>,
) -> Result<serde_json::Value, JsonRpcError> {
    let request: DiagramRequest =
        serde_json::from_value(arguments.unwrap_or(serde_json::Value::Null))
            .map_err(|e| JsonRpcError::invalid_params(format!("Invalid arguments: {e}")))?;

    let response = pipeline.run(&request).await;

    let json_string = serde_json::to_string_pretty(&response)
        .map_err(|e| JsonRpcError::internal(format!("Serialization error: {e}")))?;

    let result = CallToolResult {
        content: vec![Content::Text { text: json_string }],
        is_error: None,
    };

    serde_json::to_value(result).map_err(|e| JsonRpcError::internal(format!("Internal error: {e}")))
}
