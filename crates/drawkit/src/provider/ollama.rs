use super::{ModelCall, Provider};
use crate::prelude::*;
use drawkit_core::generation::ModelReply;
use drawkit_core::DiagramError;
use rig::client::{CompletionClient, Nothing};
use rig::completion::Prompt;
use rig::providers::ollama;

/// Local models served by Ollama. There is no schema enforcement on this
/// path: the schema is appended to the prompt and the reply is salvaged from
/// free text.
pub struct OllamaProvider {
    client: ollama::Client,
}

impl OllamaProvider {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = ollama::Client::builder()
            .api_key(Nothing)
            .base_url(base_url)
            .build()
            .map_err(|e| Error::ClientBuild {
                provider: "ollama".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self { client })
    }
}

pub(crate) fn prompt_with_schema(call: &ModelCall) -> String {
    f!(
        "{}\n\nThe JSON object must validate against this schema:\n{}",
        call.prompt, call.schema
    )
}

impl Provider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn complete(&self, call: &ModelCall) -> Result<ModelReply, DiagramError> {
        let agent = self.client.agent(&call.model).preamble(&call.system).build();
        let prompt = prompt_with_schema(call);

        let response = agent
            .prompt(&prompt)
            .await
            .map_err(|e| DiagramError::Provider(f!("ollama generation failed: {e}")))?;

        Ok(ModelReply::from_text(response))
    }
}
