use crate::pipeline::Pipeline;
use crate::prelude::{eprintln, *};
use crate::provider::Provider;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Serve newline-delimited JSON-RPC on stdin/stdout until EOF.
pub async fn run_stdio<P: Provider>(pipeline: Pipeline<P>, verbose: bool) -> Result<()> {
    if verbose {
        eprintln!("Starting MCP server with stdio transport...");
        eprintln!();
    }

    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut reader = BufReader::new(stdin);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            break; // EOF
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if verbose {
            eprintln!("Received: {trimmed}");
        }

        let response = super::handle_request(trimmed, &pipeline).await;
        let response_json = serde_json::to_string(&response)?;

        if verbose {
            eprintln!("Sending: {} bytes", response_json.len());
        }

        stdout.write_all(response_json.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    Ok(())
}
