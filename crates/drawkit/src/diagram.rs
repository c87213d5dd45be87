//! One-shot diagram generation from the command line.

use crate::prelude::{eprintln, println, *};
use base64::{engine::general_purpose, Engine as _};
use colored::Colorize;
use drawkit_core::{ConversationTurn, DiagramRequest, DiagramResponse};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, clap::Args)]
pub struct DiagramOptions {
    /// What to draw, e.g. "a right triangle with sides 3, 4 and 5"
    pub request: String,

    /// Subject area
    #[arg(long, default_value = "general")]
    pub subject: String,

    /// Language code for title and explanation
    #[arg(long, default_value = "en")]
    pub language: String,

    /// Use the regeneration model
    #[arg(long)]
    pub regenerate: bool,

    /// JSON file with prior conversation turns ([{"role": ..., "content": ...}])
    #[arg(long)]
    pub history: Option<PathBuf>,

    /// Write the rendered image (PNG or SVG) to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output the full response as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(options: DiagramOptions, global: crate::Global) -> Result<()> {
    let pipeline = global.pipeline.build_pipeline()?;

    let conversation_history = match &options.history {
        Some(path) => read_history(path).await?,
        None => Vec::new(),
    };

    let request = DiagramRequest {
        conversation_history,
        subject: options.subject.clone(),
        language: options.language.clone(),
        regenerate: options.regenerate,
        ..DiagramRequest::new(options.request.clone())
    };

    if global.verbose {
        eprintln!("Generating diagram for: {}", request.diagram_request);
    }

    let response = pipeline.run(&request).await;

    if let Some(path) = &options.output {
        write_image(&response, path).await?;
        if global.verbose {
            eprintln!("Image written to {}", path.display());
        }
    }

    if options.json || !std::io::stdout().is_terminal() {
        let json = serde_json::to_string_pretty(&response).context("Failed to serialize response")?;
        println!("{}", json);
    } else {
        output_formatted(&response, options.output.as_deref());
    }

    Ok(())
}

async fn read_history(path: &Path) -> Result<Vec<ConversationTurn>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| eyre!("Failed to read history file '{}': {}", path.display(), e))?;
    serde_json::from_str(&content)
        .map_err(|e| eyre!("Invalid history file '{}': {}", path.display(), e))
}

/// Decode the response payload into the bytes of an image file.
pub fn image_bytes(response: &DiagramResponse) -> Result<Vec<u8>> {
    if response.diagram_type.executes_code() {
        general_purpose::STANDARD
            .decode(&response.diagram_code)
            .map_err(|e| eyre!("Invalid base64 image data: {}", e))
    } else {
        Ok(response.diagram_code.clone().into_bytes())
    }
}

async fn write_image(response: &DiagramResponse, path: &Path) -> Result<()> {
    let bytes = image_bytes(response)?;
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| eyre!("Failed to write image to '{}': {}", path.display(), e))
}

fn output_formatted(response: &DiagramResponse, output: Option<&Path>) {
    println!("\n{}", "=".repeat(80));
    println!("{}", response.diagram_title.bold());
    println!("{}", "=".repeat(80));

    println!("Type: {}", response.diagram_type.to_string().cyan());
    println!(
        "Size: {}x{}",
        response.rendering_hint.width, response.rendering_hint.height
    );
    println!("Tokens: {}", response.tokens_used);
    println!("Time: {}ms", response.processing_time_ms);

    println!("\n{}", response.explanation);

    if let Some(error) = &response.error {
        println!("\n{}", f!("Rendering failed, placeholder returned: {error}").yellow());
    }

    match output {
        Some(path) => println!("\n{}", f!("Image: {}", path.display()).green()),
        None => {
            println!("\nTo save the image:");
            println!("  drawkit diagram \"<request>\" --output diagram.{}", extension(response));
        }
    }
    println!();
}

fn extension(response: &DiagramResponse) -> &'static str {
    if response.diagram_type.executes_code() {
        "png"
    } else {
        "svg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drawkit_core::{RenderingHint, Technology};

    fn response(diagram_type: Technology, code: &str) -> DiagramResponse {
        DiagramResponse {
            success: true,
            diagram_type,
            diagram_code: code.to_string(),
            diagram_title: "t".to_string(),
            explanation: "e".to_string(),
            rendering_hint: RenderingHint::new(400, 300),
            processing_time_ms: 1,
            tokens_used: 0,
            error: None,
        }
    }

    #[test]
    fn test_png_payload_is_decoded() {
        let encoded = general_purpose::STANDARD.encode(b"\x89PNG\r\n\x1a\nrest");
        let bytes = image_bytes(&response(Technology::Graphviz, &encoded)).unwrap();
        assert!(bytes.starts_with(b"\x89PNG"));
        assert_eq!(extension(&response(Technology::Matplotlib, "")), "png");
    }

    #[test]
    fn test_svg_payload_is_written_verbatim() {
        let bytes = image_bytes(&response(Technology::Latex, "<svg/>")).unwrap();
        assert_eq!(bytes, b"<svg/>");
        assert_eq!(extension(&response(Technology::Svg, "")), "svg");
    }

    #[tokio::test]
    async fn test_read_history_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, r#"[{"role": "student", "content": "what is a vector?"}]"#).unwrap();

        let history = read_history(&path).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, "student");
        assert!(read_history(&dir.path().join("missing.json")).await.is_err());
    }
}
