use super::{ensure_available, run_process, ExecutorConfig, PNG_MAGIC};
use base64::{engine::general_purpose, Engine as _};
use drawkit_core::plot::PLOT_DPI;
use drawkit_core::{DiagramError, ExecutionOutcome, ImagePayload};
use tokio::process::Command;

/// Render DOT source to a base64 PNG with the Graphviz `dot` layout engine.
pub async fn execute_graph(source: &str, config: &ExecutorConfig) -> ExecutionOutcome {
    let dot = ensure_available(&config.dot)?;

    let mut command = Command::new(dot);
    command.arg("-Tpng").arg(format!("-Gdpi={PLOT_DPI}"));

    let output = run_process(
        command,
        Some(source.as_bytes()),
        config.graph_timeout,
        "graph rendering",
    )
    .await?;

    if !output.status.success() {
        return Err(DiagramError::ExecutionFailed(format!(
            "dot exited with {}: {}",
            output.status,
            output.diagnostic()
        )));
    }

    if !output.stdout.starts_with(PNG_MAGIC) {
        return Err(DiagramError::ExecutionFailed(
            "dot produced no PNG image".to_string(),
        ));
    }

    Ok(ImagePayload::Png(general_purpose::STANDARD.encode(&output.stdout)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::testing::fake_binary;
    use std::time::Duration;

    #[tokio::test]
    async fn test_missing_dot() {
        let config = ExecutorConfig {
            dot: "drawkit-no-such-dot".to_string(),
            ..ExecutorConfig::default()
        };
        let err = execute_graph("digraph { a -> b }", &config).await.unwrap_err();
        assert!(matches!(err, DiagramError::EnvironmentUnavailable(_)));
    }

    #[tokio::test]
    async fn test_renders_png_with_real_dot() {
        let config = ExecutorConfig::default();
        if ensure_available(&config.dot).is_err() {
            eprintln!("skipping: dot not installed");
            return;
        }
        let payload = execute_graph("digraph G { a -> b; b -> c; }", &config)
            .await
            .unwrap();
        assert!(matches!(payload, ImagePayload::Png(ref data) if data.starts_with("iVBORw0KGgo")));
    }

    #[tokio::test]
    async fn test_syntax_error_is_execution_failure() {
        let bin = tempfile::tempdir().unwrap();
        let config = ExecutorConfig {
            dot: fake_binary(
                bin.path(),
                "dot",
                "cat > /dev/null\necho 'Error: <stdin>: syntax error in line 1 near ->' >&2\nexit 1",
            ),
            ..ExecutorConfig::default()
        };
        let err = execute_graph("digraph { -> }", &config).await.unwrap_err();
        assert!(matches!(err, DiagramError::ExecutionFailed(ref m) if m.contains("syntax error")));
    }

    #[tokio::test]
    async fn test_hung_renderer_times_out() {
        let bin = tempfile::tempdir().unwrap();
        let config = ExecutorConfig {
            dot: fake_binary(bin.path(), "dot", "exec sleep 30"),
            graph_timeout: Duration::from_millis(300),
            ..ExecutorConfig::default()
        };
        let err = execute_graph("digraph { a }", &config).await.unwrap_err();
        assert!(matches!(
            err,
            DiagramError::Timeout { ref stage, .. } if stage == "graph rendering"
        ));
    }
}
