//! HTTP surface: the diagram endpoint consumed by the tutoring backend, a
//! health probe and MCP over HTTP.

use crate::pipeline::Pipeline;
use crate::prelude::{eprintln, *};
use crate::provider::Provider;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
    routing::{get, post},
    Json, Router,
};
use drawkit_core::{DiagramRequest, DiagramResponse};
use futures::stream::{self, Stream};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Debug, Clone, clap::Args)]
pub struct ServeOptions {
    /// Port to listen on
    #[arg(short, long, env = "DRAWKIT_PORT", default_value = "3000")]
    pub port: u16,

    /// Host to bind to
    #[arg(long, env = "DRAWKIT_HOST", default_value = "127.0.0.1")]
    pub host: String,
}

pub async fn run(options: ServeOptions, global: crate::Global) -> Result<()> {
    let pipeline = global.pipeline.build_pipeline()?;
    let addr = format!("{}:{}", options.host, options.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| eyre!("Failed to bind to {}: {}", addr, e))?;

    if global.verbose {
        eprintln!("drawkit listening on http://{}", addr);
        eprintln!("Diagram endpoint: http://{}/api/v1/diagrams/generate", addr);
        eprintln!("MCP SSE endpoint: http://{}/sse", addr);
        eprintln!("MCP message endpoint: http://{}/message", addr);
    }
    log::info!("listening on {addr}");

    axum::serve(listener, router(Arc::new(pipeline)))
        .await
        .map_err(|e| eyre!("Server error: {e}"))?;

    Ok(())
}

pub fn router<P: Provider + 'static>(pipeline: Arc<Pipeline<P>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/diagrams/generate", post(generate_handler::<P>))
        .route("/sse", get(sse_handler))
        .route("/message", post(message_handler::<P>))
        .layer(cors)
        .with_state(pipeline)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Always answers 200 with a [`DiagramResponse`]; even an unreadable body
/// yields a placeholder.
async fn generate_handler<P: Provider + 'static>(
    State(pipeline): State<Arc<Pipeline<P>>>,
    body: String,
) -> Json<DiagramResponse> {
    match serde_json::from_str::<DiagramRequest>(&body) {
        Ok(request) => Json(pipeline.run(&request).await),
        Err(e) => Json(pipeline.reject(&e.to_string())),
    }
}

async fn sse_handler() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = stream::once(async { Ok(Event::default().data("MCP SSE endpoint ready")) });
    Sse::new(stream)
}

async fn message_handler<P: Provider + 'static>(
    State(pipeline): State<Arc<Pipeline<P>>>,
    Json(request): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    let request_str = serde_json::to_string(&request).unwrap_or_default();
    let response = crate::mcp::handle_request(&request_str, &pipeline).await;
    Json(serde_json::to_value(response).unwrap_or(serde_json::Value::Null))
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

    async fn spawn(provider: ScriptedProvider) -> String {
        let config = GeneratorConfig {
            model: "fast".to_string(),
            regenerate_model: "careful".to_string(),
            model_timeout: Duration::from_secs(5),
            max_tokens: 1024,
        };
        let pipeline = Pipeline::new(
            Generator::new(provider, config),
            ExecutorConfig::default(),
            20.0,
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(Arc::new(pipeline))).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_health() {
        let base = spawn(ScriptedProvider::new(Vec::new())).await;
        let body: Value = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_generate_endpoint_returns_diagram() {
        let reply = ModelReply::parsed(json!({
            "type": "svg",
            "content": "<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 100 50\"><line x1=\"0\" y1=\"0\" x2=\"100\" y2=\"50\"/></svg>",
            "title": "Slope",
            "explanation": "A line with slope one half.",
            "width": 500,
            "height": 250
        }));
        let base = spawn(ScriptedProvider::new(vec![Ok(reply)])).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/api/v1/diagrams/generate"))
            .json(&json!({"diagram_request": "draw a line", "subject": "math"}))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());

        let body: DiagramResponse = response.json().await.unwrap();
        assert!(body.success);
        assert_eq!(body.diagram_title, "Slope");
        assert!(body.diagram_code.contains("viewBox=\"-20 -20 140 90\""));
    }

    #[tokio::test]
    async fn test_malformed_body_still_gets_placeholder() {
        let base = spawn(ScriptedProvider::new(Vec::new())).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/api/v1/diagrams/generate"))
            .body("{\"subject\": \"math\"}")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let body: DiagramResponse = response.json().await.unwrap();
        assert!(body.success);
        assert!(body.error.unwrap().contains("diagram_request"));
    }

    #[tokio::test]
    async fn test_mcp_message_endpoint() {
        let base = spawn(ScriptedProvider::new(Vec::new())).await;
        let body: Value = reqwest::Client::new()
            .post(format!("{base}/message"))
            .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["result"]["serverInfo"]["name"], "drawkit");
    }
}
