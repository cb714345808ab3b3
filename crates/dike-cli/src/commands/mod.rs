//! CLI commands and argument parsing.

pub mod adapters;
pub mod run;

use clap::{Parser, Subcommand, ValueEnum};
use dike_core::Registries;

/// Dike - Kubernetes audit event pipeline
#[derive(Parser)]
#[command(name = "dike")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Log output format.
#[derive(Clone, Debug, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline until SIGINT or SIGTERM
    Run(run::RunArgs),

    /// List the registered inputs and sinks
    Adapters(adapters::AdaptersArgs),

    /// Print version information
    Version,
}

/// Registries holding every adapter compiled into the binary.
pub fn registries() -> Registries {
    let registries = Registries::new();
    dike_webhook::register(&registries.inputs);
    dike_sink::register(&registries.sinks);
    registries
}
