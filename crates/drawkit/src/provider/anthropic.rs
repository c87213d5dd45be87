use super::{check_response, request_error, ModelCall, Provider};
use crate::prelude::*;
use drawkit_core::generation::{decode_reply, ModelReply};
use drawkit_core::DiagramError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde_json::json;

const API_VERSION: &str = "2023-06-01";

/// Tool the model is forced to call; its input is the diagram object.
pub const EMIT_TOOL: &str = "emit_diagram";

/// Messages endpoint. Structured output comes back as the input of a forced
/// tool call, interleaved with thinking blocks when reasoning is enabled.
pub struct AnthropicProvider {
    client: reqwest::Client,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_str(api_key).map_err(|e| eyre!("Invalid header value: {}", e))?,
        );
        headers.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_static(API_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::ClientBuild {
                provider: "anthropic".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

pub(crate) fn request_body(call: &ModelCall) -> serde_json::Value {
    json!({
        "model": call.model,
        "max_tokens": call.max_tokens,
        "system": call.system,
        "messages": [{ "role": "user", "content": call.prompt }],
        "tools": [{
            "name": EMIT_TOOL,
            "description": "Return the diagram specification.",
            "input_schema": call.schema
        }],
        "tool_choice": { "type": "tool", "name": EMIT_TOOL }
    })
}

impl Provider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn complete(&self, call: &ModelCall) -> Result<ModelReply, DiagramError> {
        let url = f!("{}/messages", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&request_body(call))
            .send()
            .await
            .map_err(|e| request_error(self.name(), e))?;

        let body: serde_json::Value = check_response(response, self.name())
            .await?
            .json()
            .await
            .map_err(|e| request_error(self.name(), e))?;

        Ok(decode_reply(&body))
    }
}
