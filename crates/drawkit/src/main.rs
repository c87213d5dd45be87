use crate::prelude::*;
use clap::Parser;

mod config;
mod diagram;
mod error;
mod executor;
mod generator;
mod mcp;
mod pipeline;
mod prelude;
mod provider;
mod server;

#[derive(Debug, clap::Parser)]
#[command(
    author,
    version,
    about,
    long_about = "Generate educational diagrams with a language model and render them safely"
)]
pub struct App {
    #[command(subcommand)]
    pub command: SubCommands,

    #[clap(flatten)]
    global: Global,
}

#[derive(Debug, Clone, clap::Args)]
pub struct Global {
    /// Whether to display additional information.
    #[clap(long, env = "DRAWKIT_VERBOSE", global = true, default_value = "false")]
    verbose: bool,

    #[clap(flatten)]
    pipeline: config::PipelineOptions,
}

#[derive(Debug, clap::Parser)]
pub enum SubCommands {
    /// Generate one diagram and print the response
    Diagram(crate::diagram::DiagramOptions),

    /// Serve the diagram API and MCP over HTTP
    Serve(crate::server::ServeOptions),

    /// Model Context Protocol server over stdio
    #[clap(name = "mcp")]
    MCP,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    color_eyre::install()?;

    let app = App::parse();

    match app.command {
        SubCommands::Diagram(options) => crate::diagram::run(options, app.global).await,
        SubCommands::Serve(options) => crate::server::run(options, app.global).await,
        SubCommands::MCP => {
            let pipeline = app.global.pipeline.build_pipeline()?;
            crate::mcp::run_stdio(pipeline, app.global.verbose).await
        }
    }
    .map_err(|err: color_eyre::eyre::Report| eyre!(err))
}
