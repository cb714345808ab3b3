//! Run command implementation.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use dike_core::{Context, Pipeline, PipelineConfig};
use tracing::{info, warn};

use crate::shutdown;

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Pipeline configuration file (YAML)
    #[arg(short, long, env = "DIKE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Loads the configuration, or the defaults when no file is given.
pub fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("could not load configuration {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

/// Composes the pipeline, runs it until a termination signal, then shuts
/// it down within the configured budget.
pub async fn execute(args: RunArgs) -> Result<()> {
    let config = load_config(args.config.as_ref())?;
    let registries = super::registries();

    let root = Context::background();
    shutdown::cancel_on_signal(root.clone());

    info!(
        inputs = ?registries.inputs.names(),
        sinks = ?registries.sinks.names(),
        "Composing pipeline"
    );
    let pipeline = Pipeline::compose(&registries, &config, &root)
        .await
        .context("could not start pipeline")?;

    info!("Pipeline running");
    let summary = pipeline.run_until_cancelled(&root).await;
    if !summary.is_clean() {
        warn!(
            failed = summary.failed,
            abandoned = summary.abandoned,
            "Shutdown was not clean"
        );
    }
    Ok(())
}
