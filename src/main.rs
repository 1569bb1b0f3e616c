//! paramconsensus CLI
//!
//! Extract architectural parameters from specification text with two
//! independent models, and inspect the engine's configuration.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use paramconsensus_lib::config::EngineConfig;
use paramconsensus_lib::pipeline::{engine_status, ConsensusEngine};

/// Dual-LLM consensus extraction of architectural parameters.
#[derive(Parser, Debug)]
#[command(name = "paramconsensus")]
#[command(version)]
#[command(about = "Dual-LLM consensus extraction of architectural parameters", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract and verify parameters from a text file (`-` for stdin)
    Extract {
        /// Input file, or `-` to read stdin
        input: PathBuf,

        /// Split input above the single-pass limit into overlapping windows
        #[arg(long, env = "CONSENSUS_CHUNKED")]
        chunked: bool,
    },

    /// Show whether both models are configured
    #[command(alias = "health")]
    Status,

    /// Describe the two models and their roles
    Models,
}

#[derive(Serialize)]
struct ModelDescription {
    role: &'static str,
    name: String,
    model: String,
    provider: &'static str,
    purpose: &'static str,
}

#[derive(Serialize)]
struct ModelsOutput {
    architecture: &'static str,
    models: Vec<ModelDescription>,
}

fn main() -> Result<()> {
    paramconsensus_lib::init_tracing();

    let cli = Cli::parse();
    let config = EngineConfig::from_env().context("Invalid configuration")?;

    match cli.command {
        Commands::Extract { input, chunked } => {
            let text = read_input(&input)?;
            let engine = ConsensusEngine::from_config(config)?;
            let report = if chunked {
                engine.extract_chunked_blocking(&text)?
            } else {
                engine.extract_blocking(&text)?
            };
            print_json(&engine.response(&report), cli.pretty)
        }
        Commands::Status => print_json(&engine_status(&config), cli.pretty),
        Commands::Models => {
            let describe = |role, p: &paramconsensus_lib::config::ProviderConfig, purpose| {
                ModelDescription {
                    role,
                    name: p.display_name.clone(),
                    model: p.model.clone(),
                    provider: p.kind.as_str(),
                    purpose,
                }
            };
            let output = ModelsOutput {
                architecture: "Proposer-Verifier",
                models: vec![
                    describe(
                        "Proposer",
                        &config.proposer,
                        "High-recall extraction of candidate parameters",
                    ),
                    describe(
                        "Verifier",
                        &config.verifier,
                        "Strict validation and hallucination detection",
                    ),
                ],
            };
            print_json(&output, cli.pretty)
        }
    }
}

fn read_input(input: &Path) -> Result<String> {
    if input.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        Ok(text)
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read {}", input.display()))
    }
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}
