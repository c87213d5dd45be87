use super::{check_response, request_error, ModelCall, Provider};
use crate::prelude::*;
use drawkit_core::generation::{decode_reply, ModelReply};
use drawkit_core::DiagramError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::json;

/// Chat-completions endpoint with `json_schema` structured output.
///
/// Works against any server speaking the same wire format.
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&f!("Bearer {api_key}"))
                .map_err(|e| eyre!("Invalid header value: {}", e))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::ClientBuild {
                provider: "openai".to_string(),
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
        "messages": [
            { "role": "system", "content": call.system },
            { "role": "user", "content": call.prompt }
        ],
        "response_format": {
            "type": "json_schema",
            "json_schema": {
                "name": "diagram",
                "schema": call.schema
            }
        }
    })
}

impl Provider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, call: &ModelCall) -> Result<ModelReply, DiagramError> {
        let url = f!("{}/chat/completions", self.base_url);

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
