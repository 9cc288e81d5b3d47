use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use usage_streamer::config::Config;
use usage_streamer::infra::{build_http_client, AccessToken, WorkspaceClient};
use usage_streamer::observability::{self, ConsoleWriter};
use usage_streamer::pipeline::{progress, AggregationPipeline, PipelineSettings, RunOutcome, ServiceLimiters};
use usage_streamer::server::{self, AppState};

#[derive(Parser)]
#[command(name = "usage_streamer")]
#[command(about = "Per-user storage and mail usage, streamed as it is computed")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML config file (defaults to $USAGE_CONFIG or config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the event stream over HTTP
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one aggregation and print every event as a JSON line
    Stream {
        /// Bearer token for the upstream services (defaults to $USAGE_ACCESS_TOKEN)
        #[arg(long)]
        token: Option<String>,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    Ok(Config::load_from(path.map(|p| p.as_path()))?)
}

async fn stream_once(config: Config, token: AccessToken) -> anyhow::Result<RunOutcome> {
    let limiters = ServiceLimiters::from_config(&config.limits)?;
    let http = build_http_client(&config.services)?;
    let client = Arc::new(WorkspaceClient::new(http, &config.services, &config.pipeline, token));
    let pipeline = AggregationPipeline::new(
        client.clone(),
        client.clone(),
        client,
        &limiters,
        PipelineSettings::from(&config.pipeline),
    );

    let (stream, mut rx) = progress::channel(16);
    let run = tokio::spawn(pipeline.run(stream));

    let written = progress::write_json_lines(&mut rx, &mut std::io::stdout()).await?;

    let summary = run.await?;
    debug!(events = written, outcome = ?summary.outcome, "Stream drained");
    if !summary.warnings.is_empty() {
        warn!(count = summary.warnings.len(), "Some lookups fell back to zero values");
    }
    Ok(summary.outcome)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port } => {
            observability::init_logging(ConsoleWriter::Stdout);
            if let Err(e) = observability::metrics::init() {
                warn!("Failed to initialize metrics: {}", e);
            }

            let mut config = load_config(cli.config.as_ref())?;
            if let Some(port) = port {
                config.server.port = port;
            }
            info!(
                host = %config.server.host,
                port = config.server.port,
                batch_size = config.pipeline.batch_size,
                "Starting usage stream server"
            );
            server::start_server(AppState::new(config)?).await?;
        }
        Commands::Stream { token } => {
            // stdout carries the events
            observability::init_logging(ConsoleWriter::Stderr);

            let config = load_config(cli.config.as_ref())?;
            let token = match token {
                Some(token) => token,
                None => std::env::var("USAGE_ACCESS_TOKEN")
                    .map_err(|_| anyhow::anyhow!("no token: pass --token or set USAGE_ACCESS_TOKEN"))?,
            };

            let outcome = stream_once(config, AccessToken::new(token)).await?;
            if outcome == RunOutcome::Failed {
                anyhow::bail!("aggregation run failed");
            }
        }
    }

    Ok(())
}
