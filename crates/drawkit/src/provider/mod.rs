//! Language-model providers.
//!
//! Every provider turns a [`ModelCall`] into a decoded [`ModelReply`]. The
//! generator never looks at wire formats; reply shapes are decoded in
//! `drawkit_core::generation::reply`.

mod anthropic;
mod ollama;
mod openai;

#[cfg(test)]
pub mod scripted;

pub use anthropic::AnthropicProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

use drawkit_core::generation::ModelReply;
use drawkit_core::DiagramError;
use std::future::Future;

/// Everything a provider needs for one structured-output call.
#[derive(Debug, Clone)]
pub struct ModelCall {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub schema: serde_json::Value,
    pub max_tokens: u32,
}

pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    fn complete(
        &self,
        call: &ModelCall,
    ) -> impl Future<Output = Result<ModelReply, DiagramError>> + Send;
}

/// Provider chosen at startup from configuration.
pub enum AnyProvider {
    OpenAi(OpenAiProvider),
    Anthropic(AnthropicProvider),
    Ollama(OllamaProvider),
}

impl Provider for AnyProvider {
    fn name(&self) -> &'static str {
        match self {
            AnyProvider::OpenAi(provider) => provider.name(),
            AnyProvider::Anthropic(provider) => provider.name(),
            AnyProvider::Ollama(provider) => provider.name(),
        }
    }

    async fn complete(&self, call: &ModelCall) -> Result<ModelReply, DiagramError> {
        match self {
            AnyProvider::OpenAi(provider) => provider.complete(call).await,
            AnyProvider::Anthropic(provider) => provider.complete(call).await,
            AnyProvider::Ollama(provider) => provider.complete(call).await,
        }
    }
}

/// Turn a non-success HTTP response into a provider error carrying the body.
pub(crate) async fn check_response(
    response: reqwest::Response,
    provider: &str,
) -> Result<reqwest::Response, DiagramError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(300).collect();
    Err(DiagramError::Provider(format!("{provider} [{status}]: {body}")))
}

pub(crate) fn request_error(provider: &str, error: reqwest::Error) -> DiagramError {
    DiagramError::Provider(format!("{provider} request failed: {error}"))
}
