//! Model Context Protocol surface.
//!
//! JSON-RPC 2.0 requests arrive over stdio (`drawkit mcp`) or HTTP
//! (`POST /message` on `drawkit serve`) and are answered by [`handle_request`].

mod stdio;
mod tools;

pub use stdio::run_stdio;

use crate::pipeline::Pipeline;
use crate::provider::Provider;
use serde::{Deserialize, Serialize};

// JSON-RPC 2.0 types
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<serde_json::Value>,
    method: String,
    params: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    jsonrpc: String,
    id: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    pub fn invalid_params(message: String) -> Self {
        Self {
            code: -32602,
            message,
            data: None,
        }
    }

    pub fn internal(message: String) -> Self {
        Self {
            code: -32603,
            message,
            data: None,
        }
    }
}

// MCP Protocol types
#[derive(Debug, Serialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

pub async fn handle_request<P: Provider>(
    request_str: &str,
    pipeline: &Pipeline<P>,
) -> JsonRpcResponse {
    let request: JsonRpcRequest = match serde_json::from_str(request_str) {
        Ok(req) => req,
        Err(e) => {
            return JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: None,
                result: None,
                error: Some(JsonRpcError {
                    code: -32700,
                    message: format!("Parse error: {e}"),
                    data: None,
                }),
            };
        }
    };

    log::debug!("mcp request: {}", request.method);

    let result = match request.method.as_str() {
        "initialize" => tools::handle_initialize(),
        "tools/list" => tools::handle_tools_list(),
        "tools/call" => tools::handle_tools_call(request.params, pipeline).await,
        method => Err(JsonRpcError {
            code: -32601,
            message: format!("Method not found: {method}"),
            data: None,
        }),
    };

    match result {
        Ok(value) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id,
            result: Some(value),
            error: None,
        },
        Err(error) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id,
            result: None,
            error: Some(error),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorConfig;
    use crate::generator::{Generator, GeneratorConfig};
    use crate::provider::scripted::ScriptedProvider;
    use drawkit_core::generation::ModelReply;
    use serde_json::{json, Value};
    use std::time::Duration;

    fn pipeline(provider: ScriptedProvider) -> Pipeline<ScriptedProvider> {
        let config = GeneratorConfig {
            model: "fast".to_string(),
            regenerate_model: "careful".to_string(),
            model_timeout: Duration::from_secs(5),
            max_tokens: 1024,
        };
        Pipeline::new(Generator::new(provider, config), ExecutorConfig::default(), 20.0)
    }

    fn to_json(response: JsonRpcResponse) -> Value {
        serde_json::to_value(response).unwrap()
    }

    #[tokio::test]
    async fn test_parse_error() {
        let pipeline = pipeline(ScriptedProvider::new(Vec::new()));
        let response = to_json(handle_request("{not json", &pipeline).await);
        assert_eq!(response["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let pipeline = pipeline(ScriptedProvider::new(Vec::new()));
        let request = json!({"jsonrpc": "2.0", "id": 7, "method": "resources/list"}).to_string();
        let response = to_json(handle_request(&request, &pipeline).await);
        assert_eq!(response["id"], 7);
        assert_eq!(response["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_tools_list_exposes_generate_diagram() {
        let pipeline = pipeline(ScriptedProvider::new(Vec::new()));
        let request = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}).to_string();
        let response = to_json(handle_request(&request, &pipeline).await);
        let tools = response["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "generate_diagram");
        assert_eq!(tools[0]["inputSchema"]["required"][0], "diagram_request");
    }

    #[tokio::test]
    async fn test_generate_diagram_call() {
        let reply = ModelReply::parsed(json!({
            "type": "svg",
            "content": "<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 10 10\"></svg>",
            "title": "Dot",
            "explanation": "A dot.",
            "width": 300,
            "height": 300
        }));
        let pipeline = pipeline(ScriptedProvider::new(vec![Ok(reply)]));
        let request = json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {
                "name": "generate_diagram",
                "arguments": {"diagram_request": "draw a dot", "subject": "art"}
            }
        })
        .to_string();

        let response = to_json(handle_request(&request, &pipeline).await);

        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        let diagram: Value = serde_json::from_str(text).unwrap();
        assert_eq!(diagram["success"], true);
        assert_eq!(diagram["diagram_type"], "svg");
        assert_eq!(diagram["diagram_title"], "Dot");
    }

    #[tokio::test]
    async fn test_generate_diagram_requires_request_text() {
        let pipeline = pipeline(ScriptedProvider::new(Vec::new()));
        let request = json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {"name": "generate_diagram", "arguments": {"subject": "math"}}
        })
        .to_string();
        let response = to_json(handle_request(&request, &pipeline).await);
        assert_eq!(response["error"]["code"], -32602);
    }
}
