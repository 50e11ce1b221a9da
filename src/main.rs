use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use research_copilot::copilot::agent::{AskRequest, ResearchAgent};
use research_copilot::copilot::config::CopilotConfig;
use research_copilot::copilot::server;

use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config and PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Path to a YAML config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Ask a single question and print the answer
    Ask {
        /// The research question
        #[arg(short, long)]
        query: String,

        /// Path to a YAML config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<CopilotConfig> {
    CopilotConfig::load(path.map(|p| p.as_path())).context("failed to load configuration")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Serve { host, port, config } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            // Request spans from TraceLayer
            if let Err(e) =
                tracing::subscriber::set_global_default(tracing_subscriber::fmt().finish())
            {
                log::warn!("Tracing subscriber not installed: {}", e);
            }

            let agent = ResearchAgent::from_config(&config)
                .await
                .context("failed to build research agent")?;
            server::serve(Arc::new(agent), &config.server).await?;
        }
        Commands::Ask { query, config } => {
            let config = load_config(config.as_ref())?;
            let agent = ResearchAgent::from_config(&config)
                .await
                .context("failed to build research agent")?;

            println!("Searching with: {}", agent.tools().join(", "));
            let response = agent.ask(AskRequest::from_input(query, None)).await?;

            for log in &response.logs {
                println!("[{}] {}", if log.done { "x" } else { " " }, log.message);
            }
            println!();
            println!("{}", response.content);
        }
    }

    Ok(())
}
