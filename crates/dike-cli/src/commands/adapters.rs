//! Adapters command implementation.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::registries;

/// Arguments for the adapters command.
#[derive(Args)]
pub struct AdaptersArgs {
    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Output format for the adapters command.
#[derive(Clone, Debug, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Registered adapter names.
#[derive(Debug, Serialize)]
pub struct AdapterListing {
    pub inputs: Vec<String>,
    pub sinks: Vec<String>,
}

/// Lists the adapters compiled into the binary.
#[must_use]
pub fn listing() -> AdapterListing {
    let registries = registries();
    AdapterListing {
        inputs: registries.inputs.names(),
        sinks: registries.sinks.names(),
    }
}

/// Runs the adapters command.
pub fn run(args: &AdaptersArgs) -> Result<()> {
    let listing = listing();
    match args.format {
        OutputFormat::Text => {
            println!("Inputs:");
            for name in &listing.inputs {
                println!("  {name}");
            }
            println!("Sinks:");
            for name in &listing.sinks {
                println!("  {name}");
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&listing)?),
    }
    Ok(())
}
