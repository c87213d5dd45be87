//! Renderer processes.
//!
//! Every executor runs its tool in a child process under a hard timeout.
//! The child is killed when the timeout fires or when the calling future is
//! dropped, so a cancelled request never leaves a renderer behind.

pub mod graph;
pub mod latex;
pub mod plot;

use drawkit_core::DiagramError;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// PNG file signature.
pub const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub python: String,
    pub dot: String,
    pub latex_compiler: String,
    pub svg_converter: String,
    pub fallback_converter: String,
    pub plot_timeout: Duration,
    pub graph_timeout: Duration,
    pub latex_timeout: Duration,
    pub converter_timeout: Duration,
    /// Parent directory for per-request scratch directories.
    pub scratch_dir: PathBuf,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            dot: "dot".to_string(),
            latex_compiler: "pdflatex".to_string(),
            svg_converter: "pdf2svg".to_string(),
            fallback_converter: "dvisvgm".to_string(),
            plot_timeout: Duration::from_secs(5),
            graph_timeout: Duration::from_secs(5),
            latex_timeout: Duration::from_secs(45),
            converter_timeout: Duration::from_secs(20),
            scratch_dir: std::env::temp_dir(),
        }
    }
}

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl ProcessOutput {
    /// Last non-empty stderr line, for error messages.
    pub fn diagnostic(&self) -> String {
        self.stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("no diagnostic output")
            .trim()
            .to_string()
    }
}

/// Resolve a renderer binary, by name on `PATH` or as a path.
pub fn ensure_available(binary: &str) -> Result<PathBuf, DiagramError> {
    which::which(binary).map_err(|e| {
        DiagramError::EnvironmentUnavailable(format!("'{binary}' is not available: {e}"))
    })
}

/// Run a command to completion, feeding `stdin` if given.
///
/// Spawning, writing stdin and waiting all happen under `limit`. On timeout
/// the child is dropped, which kills it.
pub async fn run_process(
    mut command: Command,
    stdin: Option<&[u8]>,
    limit: Duration,
    stage: &str,
) -> Result<ProcessOutput, DiagramError> {
    command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
            DiagramError::EnvironmentUnavailable(format!("{stage}: cannot start process: {e}"))
        }
        _ => DiagramError::ExecutionFailed(format!("{stage}: cannot start process: {e}")),
    })?;

    let input = stdin.map(<[u8]>::to_vec);
    let work = async move {
        if let (Some(input), Some(mut pipe)) = (input, child.stdin.take()) {
            // A child that exits without reading stdin closes the pipe early;
            // its exit status tells the real story.
            if let Err(e) = pipe.write_all(&input).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e);
                }
            }
            drop(pipe);
        }
        child.wait_with_output().await
    };

    match tokio::time::timeout(limit, work).await {
        Ok(Ok(output)) => Ok(ProcessOutput {
            status: output.status,
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }),
        Ok(Err(e)) => Err(DiagramError::ExecutionFailed(format!("{stage}: {e}"))),
        Err(_) => {
            log::warn!("{stage} exceeded {}s; process killed", limit.as_secs_f64());
            Err(DiagramError::timeout(stage, limit.as_secs().max(1)))
        }
    }
}

/// Create a per-request scratch directory, removed on drop.
pub fn scratch_dir(parent: &Path, prefix: &str) -> Result<tempfile::TempDir, DiagramError> {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir_in(parent)
        .map_err(|e| {
            DiagramError::EnvironmentUnavailable(format!(
                "cannot create scratch directory in {}: {e}",
                parent.display()
            ))
        })
}

#[cfg(test)]
pub(crate) mod testing {
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    /// Write an executable shell script and return its path.
    pub fn fake_binary(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_missing_binary_is_environment_unavailable() {
        let err = ensure_available("drawkit-no-such-binary").unwrap_err();
        assert!(matches!(err, DiagramError::EnvironmentUnavailable(_)));
    }

    #[tokio::test]
    async fn test_run_process_feeds_stdin() {
        let output = run_process(Command::new("cat"), Some(b"hello"), Duration::from_secs(5), "cat")
            .await
            .unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout, b"hello");
    }

    #[tokio::test]
    async fn test_run_process_kills_on_timeout() {
        let mut command = Command::new("sleep");
        command.arg("30");
        let started = Instant::now();

        let err = run_process(command, None, Duration::from_millis(200), "sleep")
            .await
            .unwrap_err();

        assert!(matches!(err, DiagramError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_scratch_dir_is_removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let scratch = scratch_dir(parent.path(), "drawkit-test-").unwrap();
        std::fs::write(scratch.path().join("a.txt"), "x").unwrap();
        drop(scratch);
        assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);
    }
}
