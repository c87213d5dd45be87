use super::{ensure_available, run_process, scratch_dir, ExecutorConfig, PNG_MAGIC};
use base64::{engine::general_purpose, Engine as _};
use drawkit_core::plot::{classify_exit, runner_script, PLOT_DPI};
use drawkit_core::{DiagramError, ExecutionOutcome, ImagePayload};
use std::time::Duration;
use tokio::process::Command;

/// Time the interpreter gets past the in-process timer before it is killed.
const KILL_GRACE: Duration = Duration::from_secs(1);

/// Execute sanitized plotting code and return the figure as base64 PNG.
///
/// The interpreter interrupts the script itself when its timer fires and
/// always closes open figures. The hard kill only covers an interpreter that
/// ignores the signal.
pub async fn execute_plot(source: &str, config: &ExecutorConfig) -> ExecutionOutcome {
    let python = ensure_available(&config.python)?;
    let workdir = scratch_dir(&config.scratch_dir, "drawkit-plot-")?;
    let timeout_secs = config.plot_timeout.as_secs_f64();

    let mut command = Command::new(python);
    command
        .arg("-I")
        .arg("-c")
        .arg(runner_script(timeout_secs, PLOT_DPI))
        .current_dir(workdir.path())
        .env("MPLBACKEND", "Agg")
        .env("MPLCONFIGDIR", workdir.path());

    let output = match run_process(
        command,
        Some(source.as_bytes()),
        config.plot_timeout + KILL_GRACE,
        "plot execution",
    )
    .await
    {
        Err(DiagramError::Timeout { .. }) => {
            return Err(DiagramError::timeout(
                "plot execution",
                config.plot_timeout.as_secs(),
            ))
        }
        other => other?,
    };

    if !output.status.success() {
        return Err(classify_exit(
            output.status.code(),
            &output.stderr,
            config.plot_timeout.as_secs(),
        ));
    }

    if !output.stdout.starts_with(PNG_MAGIC) {
        return Err(DiagramError::ExecutionFailed(
            "interpreter exited cleanly but produced no PNG image".to_string(),
        ));
    }

    log::debug!("plot rendered: {} bytes", output.stdout.len());
    Ok(ImagePayload::Png(general_purpose::STANDARD.encode(&output.stdout)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn config(timeout: Duration) -> ExecutorConfig {
        ExecutorConfig {
            plot_timeout: timeout,
            ..ExecutorConfig::default()
        }
    }

    /// Plot tests need python3 with matplotlib and numpy.
    async fn plotting_available() -> bool {
        match execute_plot("plt.plot([0, 1], [0, 1])", &config(Duration::from_secs(30))).await {
            Err(DiagramError::EnvironmentUnavailable(reason)) => {
                eprintln!("skipping plot test: {reason}");
                false
            }
            _ => true,
        }
    }

    #[tokio::test]
    async fn test_missing_interpreter() {
        let config = ExecutorConfig {
            python: "/nonexistent/drawkit-python".to_string(),
            ..ExecutorConfig::default()
        };
        let err = execute_plot("plt.plot([1])", &config).await.unwrap_err();
        assert!(matches!(err, DiagramError::EnvironmentUnavailable(_)));
    }

    #[tokio::test]
    async fn test_renders_png() {
        if !plotting_available().await {
            return;
        }
        let payload = execute_plot(
            "x = np.linspace(0, 2 * math.pi, 50)\nplt.plot(x, np.sin(x))\nplt.title('Sine')",
            &config(Duration::from_secs(30)),
        )
        .await
        .unwrap();

        match payload {
            ImagePayload::Png(data) => assert!(data.starts_with("iVBORw0KGgo")),
            other => panic!("expected PNG, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_infinite_loop_times_out() {
        if !plotting_available().await {
            return;
        }
        let timeout = Duration::from_secs(2);
        let started = Instant::now();

        let err = execute_plot("plt.figure()\nwhile True:\n    pass", &config(timeout))
            .await
            .unwrap_err();

        assert_eq!(err, DiagramError::timeout("plot execution", 2));
        assert!(started.elapsed() < timeout + KILL_GRACE + Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_script_error_is_execution_failure() {
        if !plotting_available().await {
            return;
        }
        let err = execute_plot("plt.plot(undefined_name)", &config(Duration::from_secs(30)))
            .await
            .unwrap_err();
        assert!(matches!(err, DiagramError::ExecutionFailed(ref m) if m.contains("NameError")));
    }

    #[tokio::test]
    async fn test_disallowed_import_fails_inside_interpreter() {
        if !plotting_available().await {
            return;
        }
        let err = execute_plot("import os\nplt.plot([1])", &config(Duration::from_secs(30)))
            .await
            .unwrap_err();
        assert!(matches!(err, DiagramError::ExecutionFailed(ref m) if m.contains("not allowed")));
    }
}
