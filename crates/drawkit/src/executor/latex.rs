//! LaTeX/TikZ to SVG conversion.
//!
//! Each request gets its own scratch directory holding the source, the
//! compiler's auxiliary files, the PDF and the SVG. The directory is a
//! [`tempfile::TempDir`], so it is removed whether conversion succeeds,
//! fails, times out or the request is cancelled mid-flight.

use super::{ensure_available, run_process, scratch_dir, ExecutorConfig, ProcessOutput};
use drawkit_core::latex::{first_error, standalone_document, PDF_FILE, SOURCE_FILE, SVG_FILE};
use drawkit_core::svg::ensure_svg_metadata;
use drawkit_core::{DiagramError, ExecutionOutcome, ImagePayload};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// PDF-to-SVG tool, with the argument convention it expects.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Converter {
    /// `pdf2svg <input.pdf> <output.svg>`
    Pdf2Svg(PathBuf),
    /// `dvisvgm --pdf -o <output.svg> <input.pdf>`
    Dvisvgm(PathBuf),
}

impl Converter {
    fn resolve(config: &ExecutorConfig) -> Result<Self, DiagramError> {
        if let Ok(path) = ensure_available(&config.svg_converter) {
            return Ok(Converter::Pdf2Svg(path));
        }
        match ensure_available(&config.fallback_converter) {
            Ok(path) => {
                log::debug!(
                    "'{}' unavailable, converting with '{}'",
                    config.svg_converter,
                    config.fallback_converter
                );
                Ok(Converter::Dvisvgm(path))
            }
            Err(_) => Err(DiagramError::EnvironmentUnavailable(format!(
                "no PDF to SVG converter found ('{}' or '{}')",
                config.svg_converter, config.fallback_converter
            ))),
        }
    }

    fn command(&self, workdir: &Path) -> Command {
        let mut command = match self {
            Converter::Pdf2Svg(path) => {
                let mut command = Command::new(path);
                command.arg(PDF_FILE).arg(SVG_FILE);
                command
            }
            Converter::Dvisvgm(path) => {
                let mut command = Command::new(path);
                command.arg("--pdf").arg("-o").arg(SVG_FILE).arg(PDF_FILE);
                command
            }
        };
        command.current_dir(workdir);
        command
    }
}

/// Compile a TikZ fragment and return it as inline SVG with title metadata.
pub async fn convert_latex(
    fragment: &str,
    title: &str,
    width: u32,
    height: u32,
    config: &ExecutorConfig,
) -> ExecutionOutcome {
    let compiler = ensure_available(&config.latex_compiler)?;
    let converter = Converter::resolve(config)?;
    let scratch = scratch_dir(&config.scratch_dir, "drawkit-latex-")?;

    let result = compile_and_convert(scratch.path(), fragment, compiler, &converter, config).await;

    if let Err(e) = scratch.close() {
        log::warn!("failed to remove latex scratch directory: {e}");
    }

    let svg = result?;
    Ok(ImagePayload::Svg(ensure_svg_metadata(&svg, title, width, height)))
}

async fn compile_and_convert(
    workdir: &Path,
    fragment: &str,
    compiler: PathBuf,
    converter: &Converter,
    config: &ExecutorConfig,
) -> Result<String, DiagramError> {
    tokio::fs::write(workdir.join(SOURCE_FILE), standalone_document(fragment))
        .await
        .map_err(|e| DiagramError::ExecutionFailed(format!("cannot write {SOURCE_FILE}: {e}")))?;

    let mut command = Command::new(compiler);
    command
        .arg("-interaction=nonstopmode")
        .arg("-halt-on-error")
        .arg("-no-shell-escape")
        .arg(SOURCE_FILE)
        .current_dir(workdir);

    let output = run_process(command, None, config.latex_timeout, "latex compilation").await?;
    if !output.status.success() || !workdir.join(PDF_FILE).exists() {
        return Err(DiagramError::ExecutionFailed(
            compile_failure(workdir, &output).await,
        ));
    }

    let output = run_process(
        converter.command(workdir),
        None,
        config.converter_timeout,
        "svg conversion",
    )
    .await?;
    if !output.status.success() {
        return Err(DiagramError::ExecutionFailed(format!(
            "svg conversion failed: {}",
            output.diagnostic()
        )));
    }

    let svg = tokio::fs::read_to_string(workdir.join(SVG_FILE))
        .await
        .map_err(|e| DiagramError::ExecutionFailed(format!("converter produced no SVG: {e}")))?;

    if !svg.contains("<svg") {
        return Err(DiagramError::ExecutionFailed(
            "converter output is not SVG".to_string(),
        ));
    }

    Ok(svg)
}

async fn compile_failure(workdir: &Path, output: &ProcessOutput) -> String {
    let log_file = workdir.join(SOURCE_FILE).with_extension("log");
    let log = tokio::fs::read_to_string(log_file).await.unwrap_or_default();
    let stdout = String::from_utf8_lossy(&output.stdout);

    let detail = first_error(&log)
        .or_else(|| first_error(&stdout))
        .unwrap_or_else(|| output.diagnostic());

    format!("latex compilation failed: {detail}")
}
