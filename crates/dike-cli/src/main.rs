//! Dike CLI - runs the audit event pipeline.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod shutdown;

use commands::{Cli, Commands, LogFormat};

const DEFAULT_FILTER: &str = "dike=info,dike_core=info,dike_webhook=info,dike_sink=info";

fn init_tracing(format: &LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_format);

    match cli.command {
        Commands::Run(args) => commands::run::execute(args).await,
        Commands::Adapters(args) => commands::adapters::run(&args),
        Commands::Version => {
            println!("dike {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
