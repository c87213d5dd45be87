//! Unified generator: one model call chooses the technology and writes the
//! diagram source.

use crate::provider::{ModelCall, Provider};
use drawkit_core::generation::{
    build_generation_prompt, extract_generation, is_usable_reply, response_schema,
    with_json_reminder, ModelReply, SYSTEM_PREAMBLE,
};
use drawkit_core::ladder::Narrowing;
use drawkit_core::{DiagramError, DiagramRequest, GenerationResult, TokenUsage};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Model for first-time requests.
    pub model: String,
    /// Higher-quality model used when the caller asks to regenerate.
    pub regenerate_model: String,
    pub model_timeout: Duration,
    pub max_tokens: u32,
}

pub struct Generator<P> {
    provider: P,
    config: GeneratorConfig,
}

impl<P: Provider> Generator<P> {
    pub fn new(provider: P, config: GeneratorConfig) -> Self {
        Self { provider, config }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Produce one generation result for the request.
    ///
    /// The schema with a leading `reasoning` field is tried first. A schema
    /// violation falls back once to the schema without it. Tokens from every
    /// call made here are added to `usage`, including failed ones.
    pub async fn generate(
        &self,
        request: &DiagramRequest,
        narrowing: Option<&Narrowing>,
        usage: &mut TokenUsage,
    ) -> Result<GenerationResult, DiagramError> {
        let prompt = build_generation_prompt(request, narrowing);
        let model = if request.regenerate {
            &self.config.regenerate_model
        } else {
            &self.config.model
        };

        log::debug!(
            "generating with {} model '{model}' (regenerate={}, narrowed={})",
            self.provider.name(),
            request.regenerate,
            narrowing.is_some()
        );

        let result = match self
            .call(model, &prompt, true, request.regenerate, usage)
            .await
        {
            Err(DiagramError::SchemaViolation(reason)) => {
                log::warn!(
                    "reply violated the reasoning schema ({reason}); retrying without reasoning"
                );
                self.call(model, &prompt, false, request.regenerate, usage)
                    .await
            }
            other => other,
        };

        result.map(|mut generation| {
            generation.usage = *usage;
            generation
        })
    }

    async fn call(
        &self,
        model: &str,
        prompt: &str,
        include_reasoning: bool,
        strict: bool,
        usage: &mut TokenUsage,
    ) -> Result<GenerationResult, DiagramError> {
        let schema = response_schema(include_reasoning);

        let mut reply = self.invoke(model, prompt.to_string(), &schema).await?;
        usage.add(reply.usage);

        if strict && !is_usable_reply(&reply) {
            log::warn!(
                "regeneration reply is empty or incomplete; asking again for the JSON object"
            );
            reply = self
                .invoke(model, with_json_reminder(prompt), &schema)
                .await?;
            usage.add(reply.usage);

            if !is_usable_reply(&reply) {
                return Err(DiagramError::SchemaViolation(
                    "regeneration returned no usable JSON object".to_string(),
                ));
            }
        }

        extract_generation(&reply)
    }

    async fn invoke(
        &self,
        model: &str,
        prompt: String,
        schema: &serde_json::Value,
    ) -> Result<ModelReply, DiagramError> {
        let call = ModelCall {
            model: model.to_string(),
            system: SYSTEM_PREAMBLE.to_string(),
            prompt,
            schema: schema.clone(),
            max_tokens: self.config.max_tokens,
        };

        tokio::time::timeout(self.config.model_timeout, self.provider.complete(&call))
            .await
            .map_err(|_| DiagramError::timeout("model call", self.config.model_timeout.as_secs()))?
    }
}
