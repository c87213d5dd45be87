use crate::executor::ExecutorConfig;
use crate::generator::{Generator, GeneratorConfig};
use crate::pipeline::Pipeline;
use crate::prelude::*;
use crate::provider::{AnthropicProvider, AnyProvider, OllamaProvider, OpenAiProvider};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ProviderKind {
    /// Chat-completions API with JSON-schema structured output
    Openai,
    /// Messages API with a forced tool call
    Anthropic,
    /// Local Ollama server
    Ollama,
}

impl ProviderKind {
    fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Openai => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Ollama => "ollama",
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::Openai => "https://api.openai.com/v1",
            ProviderKind::Anthropic => "https://api.anthropic.com/v1",
            ProviderKind::Ollama => "http://localhost:11434",
        }
    }

    fn default_models(&self) -> (&'static str, &'static str) {
        match self {
            ProviderKind::Openai => ("gpt-4o-mini", "gpt-4o"),
            ProviderKind::Anthropic => ("claude-3-5-haiku-latest", "claude-3-5-sonnet-latest"),
            ProviderKind::Ollama => ("llama3.1", "llama3.1:70b"),
        }
    }
}

/// Pipeline settings shared by every subcommand.
#[derive(Debug, Clone, clap::Args)]
pub struct PipelineOptions {
    /// Language-model provider
    #[clap(long, env = "DRAWKIT_PROVIDER", global = true, value_enum, default_value = "openai")]
    pub provider: ProviderKind,

    /// Provider base URL (defaults to the provider's public endpoint)
    #[clap(long, env = "DRAWKIT_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Provider API key
    #[clap(long, env = "DRAWKIT_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model for first-time requests
    #[clap(long, env = "DRAWKIT_MODEL", global = true)]
    pub model: Option<String>,

    /// Model for regeneration requests
    #[clap(long, env = "DRAWKIT_REGENERATE_MODEL", global = true)]
    pub regenerate_model: Option<String>,

    /// Maximum completion tokens per model call
    #[clap(long, env = "DRAWKIT_MAX_TOKENS", global = true, default_value = "4096")]
    pub max_tokens: u32,

    /// Seconds before a model call is abandoned
    #[clap(long, env = "DRAWKIT_MODEL_TIMEOUT", global = true, default_value = "90")]
    pub model_timeout: u64,

    /// Seconds of CPU time a plot script may use
    #[clap(long, env = "DRAWKIT_PLOT_TIMEOUT", global = true, default_value = "5")]
    pub plot_timeout: u64,

    /// Seconds a Graphviz render may take
    #[clap(long, env = "DRAWKIT_GRAPH_TIMEOUT", global = true, default_value = "5")]
    pub graph_timeout: u64,

    /// Seconds a LaTeX compilation may take
    #[clap(long, env = "DRAWKIT_LATEX_TIMEOUT", global = true, default_value = "45")]
    pub latex_timeout: u64,

    /// Seconds a PDF to SVG conversion may take
    #[clap(long, env = "DRAWKIT_CONVERTER_TIMEOUT", global = true, default_value = "20")]
    pub converter_timeout: u64,

    /// Python interpreter with matplotlib and numpy
    #[clap(long, env = "DRAWKIT_PYTHON", global = true, default_value = "python3")]
    pub python: String,

    /// Graphviz layout binary
    #[clap(long, env = "DRAWKIT_DOT", global = true, default_value = "dot")]
    pub dot: String,

    /// LaTeX compiler
    #[clap(long, env = "DRAWKIT_LATEX", global = true, default_value = "pdflatex")]
    pub latex: String,

    /// PDF to SVG converter
    #[clap(long, env = "DRAWKIT_SVG_CONVERTER", global = true, default_value = "pdf2svg")]
    pub svg_converter: String,

    /// Converter used when the primary one is missing
    #[clap(long, env = "DRAWKIT_FALLBACK_CONVERTER", global = true, default_value = "dvisvgm")]
    pub fallback_converter: String,

    /// Parent directory for per-request scratch directories
    #[clap(long, env = "DRAWKIT_SCRATCH_DIR", global = true)]
    pub scratch_dir: Option<PathBuf>,

    /// Padding added around every SVG, in user units
    #[clap(long, env = "DRAWKIT_SVG_PADDING", global = true, default_value = "20")]
    pub svg_padding: f64,
}

impl PipelineOptions {
    pub fn generator_config(&self) -> GeneratorConfig {
        let (model, regenerate_model) = self.provider.default_models();
        GeneratorConfig {
            model: self.model.clone().unwrap_or_else(|| model.to_string()),
            regenerate_model: self
                .regenerate_model
                .clone()
                .unwrap_or_else(|| regenerate_model.to_string()),
            model_timeout: Duration::from_secs(self.model_timeout),
            max_tokens: self.max_tokens,
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            python: self.python.clone(),
            dot: self.dot.clone(),
            latex_compiler: self.latex.clone(),
            svg_converter: self.svg_converter.clone(),
            fallback_converter: self.fallback_converter.clone(),
            plot_timeout: Duration::from_secs(self.plot_timeout),
            graph_timeout: Duration::from_secs(self.graph_timeout),
            latex_timeout: Duration::from_secs(self.latex_timeout),
            converter_timeout: Duration::from_secs(self.converter_timeout),
            scratch_dir: self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir),
        }
    }

    pub fn build_provider(&self) -> Result<AnyProvider> {
        let base_url = self
            .base_url
            .as_deref()
            .unwrap_or(self.provider.default_base_url());

        let api_key = || {
            self.api_key
                .as_deref()
                .filter(|key| !key.trim().is_empty())
                .ok_or_else(|| Error::MissingApiKey(self.provider.as_str().to_string()))
        };

        Ok(match self.provider {
            ProviderKind::Openai => AnyProvider::OpenAi(OpenAiProvider::new(base_url, api_key()?)?),
            ProviderKind::Anthropic => {
                AnyProvider::Anthropic(AnthropicProvider::new(base_url, api_key()?)?)
            }
            ProviderKind::Ollama => AnyProvider::Ollama(OllamaProvider::new(base_url)?),
        })
    }

    fn check(&self) -> Result<()> {
        if self.plot_timeout == 0 || self.graph_timeout == 0 || self.latex_timeout == 0 {
            return Err(
                Error::InvalidConfig("renderer timeouts must be at least 1s".to_string()).into(),
            );
        }
        if self.model_timeout == 0 {
            return Err(
                Error::InvalidConfig("model timeout must be at least 1s".to_string()).into(),
            );
        }
        if !self.svg_padding.is_finite() || self.svg_padding < 0.0 {
            return Err(
                Error::InvalidConfig(f!("invalid svg padding: {}", self.svg_padding)).into(),
            );
        }
        Ok(())
    }

    pub fn build_pipeline(&self) -> Result<Pipeline<AnyProvider>> {
        self.check()?;
        let executors = self.executor_config();
        if !executors.scratch_dir.is_dir() {
            return Err(Error::InvalidConfig(f!(
                "scratch directory {} does not exist",
                executors.scratch_dir.display()
            ))
            .into());
        }

        let generator = Generator::new(self.build_provider()?, self.generator_config());
        log::info!(
            "provider={} model={} regenerate_model={}",
            self.provider.as_str(),
            generator.config().model,
            generator.config().regenerate_model
        );

        Ok(Pipeline::new(generator, executors, self.svg_padding))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, clap::Parser)]
    struct TestApp {
        #[clap(flatten)]
        options: PipelineOptions,
    }

    fn parse(args: &[&str]) -> PipelineOptions {
        let mut argv = vec!["drawkit"];
        argv.extend_from_slice(args);
        TestApp::parse_from(argv).options
    }

    #[test]
    fn test_defaults_follow_provider() {
        let options = parse(&["--provider", "ollama", "--model", "qwen2.5"]);
        let config = options.generator_config();
        assert_eq!(config.model, "qwen2.5");
        assert_eq!(config.regenerate_model, "llama3.1:70b");
        assert_eq!(options.executor_config().latex_timeout, Duration::from_secs(45));
    }

    #[test]
    fn test_hosted_providers_need_an_api_key() {
        let options = parse(&["--provider", "anthropic", "--api-key", " "]);
        let err = options.build_provider().err().unwrap();
        assert!(err.to_string().contains("Missing API key"));
    }

    #[test]
    fn test_zero_timeouts_are_rejected() {
        let options = parse(&["--plot-timeout", "0"]);
        assert!(options.check().is_err());
    }
}
