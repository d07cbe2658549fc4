//! CLI binary for proposing and validating trading signals.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sigforge_llm::{CostTrackingMiddleware, LlmClient, LoggingMiddleware};
use sigforge_pipeline::{
    DiscordNotifier, Dispatcher, PipelineConfig, SchemaDirection, SchemaRegistry, SignalPipeline,
};
use sigforge_types::{SignalRequest, Stage};

#[derive(Parser)]
#[command(name = "sigforge", version, about = "Staged LLM trading-signal pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Propose, validate, and summarize a signal for one asset
    Propose {
        /// Asset symbol (e.g. AAPL, EUR/USD, BTC/USD)
        #[arg(short, long)]
        asset: String,

        /// Approximate signal time, ISO-8601 (e.g. 2024-01-01T00:00:00Z)
        #[arg(short, long)]
        timestamp: String,

        /// Model to use for every stage
        #[arg(short, long)]
        model: Option<String>,

        /// Force a provider ("google" or "openai")
        #[arg(long)]
        provider: Option<String>,

        /// Skip the summarization stage
        #[arg(long)]
        no_summary: bool,

        /// Leave the validation outcome out of the printed result
        #[arg(long)]
        hide_validation: bool,

        /// JSON config file (environment variables still apply on top)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the JSON schema a stage's output must satisfy
    Schema {
        /// Stage name: generate, validate, or summarize
        stage: Stage,

        /// Print the input schema instead of the output schema
        #[arg(long)]
        input: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable.
    let default_filter = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Propose {
            asset,
            timestamp,
            model,
            provider,
            no_summary,
            hide_validation,
            config,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(model) = model {
                config.model = model;
            }
            if provider.is_some() {
                config.provider = provider;
            }
            if no_summary {
                config.options.summarize = false;
            }
            if hide_validation {
                config.options.expose_validation = false;
            }
            cmd_propose(&asset, &timestamp, &config).await?;
        }
        Commands::Schema { stage, input } => {
            cmd_schema(stage, input)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::from_env()?,
    };
    Ok(config)
}

async fn cmd_propose(asset: &str, timestamp: &str, config: &PipelineConfig) -> anyhow::Result<()> {
    let request = SignalRequest::new(asset, timestamp).map_err(|e| anyhow::anyhow!(e.user_message()))?;

    let costs = CostTrackingMiddleware::new();
    let client = LlmClient::from_env()?
        .with_middleware(LoggingMiddleware)
        .with_middleware(costs.clone());
    let pipeline = SignalPipeline::new(Arc::new(client), config)?;

    let result = match pipeline.run(&request).await {
        Ok(result) => result,
        Err(err) => {
            tracing::error!(error = %err, "pipeline failed");
            anyhow::bail!(err.user_message());
        }
    };

    println!("{}", serde_json::to_string_pretty(&result)?);

    let dispatcher = match DiscordNotifier::from_config(config) {
        Some(notifier) => Dispatcher::default().with_notifier(notifier),
        None => Dispatcher::default(),
    };
    if let Some(handle) = dispatcher.maybe_notify(&request, &result) {
        // Keep the process alive until delivery finishes.
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "notification task panicked");
        }
    }

    tracing::info!(
        input_tokens = costs.total_input_tokens(),
        output_tokens = costs.total_output_tokens(),
        "token usage"
    );
    Ok(())
}

fn cmd_schema(stage: Stage, input: bool) -> anyhow::Result<()> {
    let config = PipelineConfig::from_env()?;
    let registry = SchemaRegistry::new(config.timeframes);
    let direction = if input {
        SchemaDirection::Input
    } else {
        SchemaDirection::Output
    };
    let schema = registry.schema(stage, direction).to_json_schema();
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
