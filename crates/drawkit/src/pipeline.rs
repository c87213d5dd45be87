//! Request orchestration.
//!
//! Drives one request through the fallback ladder: generate, screen, execute,
//! and on failure one narrowed retry before a placeholder. Every path ends in
//! a [`DiagramResponse`] with `success: true`.

use crate::executor::{self, ExecutorConfig};
use crate::generator::Generator;
use crate::provider::Provider;
use drawkit_core::ladder::{Event, FallbackLadder, Stage};
use drawkit_core::plot::{sanitize_source, PLOT_DPI};
use drawkit_core::svg::{pad_svg, placeholder_svg, PLACEHOLDER_HEIGHT, PLACEHOLDER_WIDTH};
use drawkit_core::{
    safety, DiagramError, DiagramRequest, DiagramResponse, ExecutionOutcome, GenerationResult,
    ImagePayload, RenderingHint, Technology, TokenUsage,
};
use std::time::Instant;

pub struct Pipeline<P> {
    generator: Generator<P>,
    executors: ExecutorConfig,
    svg_padding: f64,
}

/// What a finished ladder run produced, before it becomes a response.
pub(crate) struct Run {
    pub ladder: FallbackLadder,
    pub rendered: Option<(GenerationResult, ImagePayload)>,
    pub first_title: Option<String>,
    pub usage: TokenUsage,
}

impl<P: Provider> Pipeline<P> {
    pub fn new(generator: Generator<P>, executors: ExecutorConfig, svg_padding: f64) -> Self {
        Self {
            generator,
            executors,
            svg_padding,
        }
    }

    pub fn generator(&self) -> &Generator<P> {
        &self.generator
    }

    /// Turn a request into a response. Never fails.
    pub async fn run(&self, request: &DiagramRequest) -> DiagramResponse {
        let started = Instant::now();
        log::info!(
            "diagram request from {} (subject={}, language={}, regenerate={})",
            request.caller(),
            request.subject,
            request.language,
            request.regenerate
        );

        let run = self.run_ladder(request).await;
        let response = respond(request, run, started);

        log::info!(
            "diagram response for {}: type={} tokens={} in {}ms{}",
            request.caller(),
            response.diagram_type,
            response.tokens_used,
            response.processing_time_ms,
            if response.error.is_some() { " (placeholder)" } else { "" }
        );
        response
    }

    /// Response for a request body that could not be read at all.
    pub fn reject(&self, reason: &str) -> DiagramResponse {
        log::warn!("rejecting unreadable diagram request: {reason}");
        placeholder_response(
            "Diagram",
            &format!("Invalid request: {reason}"),
            vec![format!("invalid request: {reason}")],
            Instant::now(),
            0,
        )
    }

    pub(crate) async fn run_ladder(&self, request: &DiagramRequest) -> Run {
        let mut ladder = FallbackLadder::new();
        let mut usage = TokenUsage::default();
        let mut first_title = None;
        let mut rendered = None;

        while !ladder.stage().is_terminal() {
            let attempt = ladder.attempt();
            let narrowing = ladder.narrowing();

            let generation = match self
                .generator
                .generate(request, narrowing.as_ref(), &mut usage)
                .await
            {
                Ok(generation) => generation,
                Err(e) => {
                    self.fail(&mut ladder, attempt, e);
                    continue;
                }
            };
            ladder.advance(Event::Generated);
            first_title.get_or_insert_with(|| generation.title.clone());
            log::debug!(
                "attempt {attempt}: generated {} ({} chars)",
                generation.technology,
                generation.content.len()
            );

            let source = match self.validate(&generation) {
                Ok(source) => source,
                Err(e) => {
                    self.fail(&mut ladder, attempt, e);
                    continue;
                }
            };
            ladder.advance(Event::Validated);

            match self.execute(&generation, &source).await {
                Ok(payload) if !payload.is_empty() => {
                    ladder.advance(Event::Executed);
                    rendered = Some((generation, payload));
                }
                Ok(_) => self.fail(
                    &mut ladder,
                    attempt,
                    DiagramError::ExecutionFailed("renderer returned an empty image".to_string()),
                ),
                Err(e) => self.fail(&mut ladder, attempt, e),
            }
        }

        Run {
            ladder,
            rendered,
            first_title,
            usage,
        }
    }

    fn fail(&self, ladder: &mut FallbackLadder, attempt: u8, error: DiagramError) {
        let from = ladder.stage();
        let to = ladder.advance(Event::Failed(error.clone()));
        match to {
            Stage::Generating => {
                log::warn!("attempt {attempt} failed while {from:?}: {error}; retrying narrowed")
            }
            _ => {
                log::warn!("attempt {attempt} failed while {from:?}: {error}; emitting placeholder")
            }
        }
    }

    /// Screen the generated source and return what will actually be executed.
    fn validate(&self, generation: &GenerationResult) -> Result<String, DiagramError> {
        safety::screen(generation)?;
        match generation.technology {
            Technology::Matplotlib => sanitize_source(&generation.content),
            _ => Ok(generation.content.clone()),
        }
    }

    async fn execute(&self, generation: &GenerationResult, source: &str) -> ExecutionOutcome {
        match generation.technology {
            Technology::Matplotlib => executor::plot::execute_plot(source, &self.executors).await,
            Technology::Graphviz => executor::graph::execute_graph(source, &self.executors).await,
            Technology::Latex => {
                let payload = executor::latex::convert_latex(
                    source,
                    &generation.title,
                    generation.width,
                    generation.height,
                    &self.executors,
                )
                .await?;
                Ok(self.post_process(payload))
            }
            Technology::Svg => Ok(self.post_process(ImagePayload::Svg(source.to_string()))),
        }
    }

    fn post_process(&self, payload: ImagePayload) -> ImagePayload {
        match payload {
            ImagePayload::Svg(svg) => ImagePayload::Svg(pad_svg(&svg, self.svg_padding)),
            png => png,
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn respond(request: &DiagramRequest, run: Run, started: Instant) -> DiagramResponse {
    match run.rendered {
        Some((generation, payload)) if run.ladder.stage() == Stage::Done => {
            let hint = RenderingHint::new(generation.width, generation.height);
            let hint = match payload {
                ImagePayload::Png(_) => hint.with_scale(PLOT_DPI as f32 / 100.0),
                ImagePayload::Svg(_) => hint,
            };
            DiagramResponse {
                success: true,
                diagram_type: generation.technology,
                diagram_code: payload.into_inner(),
                diagram_title: generation.title,
                explanation: generation.explanation,
                rendering_hint: hint,
                processing_time_ms: elapsed_ms(started),
                tokens_used: run.usage.total(),
                error: None,
            }
        }
        _ => {
            let title = run
                .first_title
                .unwrap_or_else(|| request.fallback_title());
            let reason = run
                .ladder
                .last_failure()
                .map(DiagramError::short_reason)
                .unwrap_or_else(|| "unknown failure".to_string());
            let failures = run
                .ladder
                .failures()
                .iter()
                .enumerate()
                .map(|(i, e)| format!("attempt {}: {e}", i + 1))
                .collect();
            placeholder_response(&title, &reason, failures, started, run.usage.total())
        }
    }
}

fn placeholder_response(
    title: &str,
    reason: &str,
    failures: Vec<String>,
    started: Instant,
    tokens_used: u64,
) -> DiagramResponse {
    DiagramResponse {
        success: true,
        diagram_type: Technology::Svg,
        diagram_code: placeholder_svg(title, reason),
        diagram_title: title.to_string(),
        explanation: "The diagram could not be rendered, so a placeholder is shown instead."
            .to_string(),
        rendering_hint: RenderingHint::new(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT),
        processing_time_ms: elapsed_ms(started),
        tokens_used,
        error: Some(failures.join("; ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::GeneratorConfig;
    use crate::provider::scripted::ScriptedProvider;
    use drawkit_core::generation::ModelReply;
    use drawkit_core::svg::PADDED_MARKER;
    use drawkit_core::FailureKind;
    use serde_json::json;
    use std::time::Duration;

    fn reply(technology: &str, title: &str, content: &str) -> ModelReply {
        ModelReply::parsed(json!({
            "reasoning": "fits",
            "type": technology,
            "content": content,
            "title": title,
            "explanation": "Explained.",
            "width": 640,
            "height": 480
        }))
        .with_usage(TokenUsage {
            prompt_tokens: 50,
            completion_tokens: 10,
        })
    }

    const PLOT: &str = "x = np.linspace(0, 10, 20)\nplt.plot(x, x ** 2)";
    const SVG: &str = concat!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"200\" height=\"100\">",
        "<rect width=\"10\" height=\"10\"/></svg>",
    );

    fn pipeline(provider: ScriptedProvider) -> Pipeline<ScriptedProvider> {
        let generator = Generator::new(
            provider,
            GeneratorConfig {
                model: "fast".to_string(),
                regenerate_model: "careful".to_string(),
                model_timeout: Duration::from_secs(5),
                max_tokens: 2048,
            },
        );
        let executors = ExecutorConfig {
            python: "/nonexistent/drawkit-python".to_string(),
            ..ExecutorConfig::default()
        };
        Pipeline::new(generator, executors, 20.0)
    }

    // --- Happy path ---

    #[tokio::test]
    async fn test_svg_is_padded_once() {
        let pipeline = pipeline(ScriptedProvider::new(vec![Ok(reply("svg", "Box", SVG))]));

        let response = pipeline.run(&DiagramRequest::new("draw a box")).await;

        assert!(response.success);
        assert_eq!(response.diagram_type, Technology::Svg);
        assert!(response.diagram_code.contains(PADDED_MARKER));
        assert!(response.diagram_code.contains("width=\"240\""));
        assert_eq!(response.diagram_title, "Box");
        assert_eq!(response.rendering_hint.width, 640);
        assert_eq!(response.tokens_used, 60);
        assert!(response.error.is_none());
    }

    // --- Degradation ---

    #[tokio::test]
    async fn test_two_execution_failures_degrade_to_placeholder() {
        let pipeline = pipeline(ScriptedProvider::always(reply(
            "matplotlib",
            "Projectile Motion",
            PLOT,
        )));

        let response = pipeline
            .run(&DiagramRequest::new("plot a projectile trajectory"))
            .await;

        assert!(response.success);
        assert_eq!(response.diagram_type, Technology::Svg);
        assert!(response.diagram_code.starts_with("<svg"));
        assert!(response.diagram_code.contains("Projectile Motion"));
        assert_eq!(response.diagram_title, "Projectile Motion");
        assert_eq!(response.rendering_hint.width, PLACEHOLDER_WIDTH);
        assert!(response.error.as_deref().unwrap().contains("attempt 2"));
        assert_eq!(response.tokens_used, 120);

        let calls = pipeline.generator().provider().calls();
        assert_eq!(calls.len(), 2);
        assert!(!calls[0].prompt.contains("RETRY"));
        assert!(calls[1].prompt.contains("RETRY"));
    }

    #[tokio::test]
    async fn test_non_portable_label_retries_without_execution() {
        let accented = "plt.plot([1, 2, 3])\nplt.title('Vitesse \u{e9}lev\u{e9}e')";
        let pipeline = pipeline(ScriptedProvider::new(vec![
            Ok(reply("matplotlib", "Vitesse", accented)),
            Ok(reply("svg", "Speed", SVG)),
        ]));

        let run = pipeline.run_ladder(&DiagramRequest::new("trace la vitesse")).await;

        assert_eq!(run.ladder.stage(), Stage::Done);
        assert_eq!(run.ladder.failures().len(), 1);
        assert_eq!(run.ladder.failures()[0].kind(), FailureKind::NonPortableText);
        let (generation, payload) = run.rendered.unwrap();
        assert_eq!(generation.technology, Technology::Svg);
        assert!(matches!(payload, ImagePayload::Svg(_)));
    }

    #[tokio::test]
    async fn test_provider_failures_degrade_with_fallback_title() {
        let pipeline = pipeline(ScriptedProvider::new(vec![
            Err(DiagramError::Provider("503 overloaded".to_string())),
            Err(DiagramError::Provider("503 overloaded".to_string())),
        ]));

        let response = pipeline.run(&DiagramRequest::new("draw the krebs cycle")).await;

        assert!(response.success);
        assert_eq!(response.diagram_type, Technology::Svg);
        assert_eq!(response.diagram_title, "draw the krebs cycle");
        assert!(response.diagram_code.contains("503 overloaded"));
        assert_eq!(response.tokens_used, 0);
    }

    #[tokio::test]
    async fn test_safety_rejection_then_success() {
        let pipeline = pipeline(ScriptedProvider::new(vec![
            Ok(reply("svg", "Bad", "<svg><script>alert(1)</script></svg>")),
            Ok(reply("svg", "Good", SVG)),
        ]));

        let response = pipeline.run(&DiagramRequest::new("draw")).await;

        assert_eq!(response.diagram_title, "Good");
        assert!(response.error.is_none());
        assert!(!response.diagram_code.contains("<script"));
    }

    #[test]
    fn test_reject_builds_placeholder() {
        let pipeline = pipeline(ScriptedProvider::new(Vec::new()));
        let response = pipeline.reject("missing field `diagram_request`");
        assert!(response.success);
        assert_eq!(response.diagram_type, Technology::Svg);
        assert!(response.error.unwrap().contains("diagram_request"));
    }
}
