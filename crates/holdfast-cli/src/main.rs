mod console;
mod emulator;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use holdfast_core::config::{PropConfig, Sensor};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "holdfast",
    about = "Tag-detecting prop controller: run it on simulated hardware or check its configuration",
    version
)]
struct Cli {
    /// Log filter (overrides RUST_LOG; default: info)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the prop on simulated hardware, driven from stdin
    Run {
        /// Prop configuration (JSON)
        #[arg(long, short)]
        config: PathBuf,
    },

    /// Validate a configuration file and print its parts
    Check {
        /// Prop configuration (JSON)
        #[arg(long, short)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Run { config } => match load_config(&config) {
            Ok(config) => emulator::run(config).await,
            Err(e) => Err(e),
        },
        Commands::Check { config } => load_config(&config).map(|config| print_parts(&config)),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn load_config(path: &Path) -> Result<PropConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config: PropConfig = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    Ok(config)
}

fn print_parts(config: &PropConfig) {
    println!("{:<12} {:<22} {:<10} ACTUATORS", "PART", "TAG", "SENSOR");
    for part in &config.parts {
        let sensor = match part.sensor {
            Sensor::Channel(channel) => format!("ch {channel}"),
            Sensor::Gpio(pin) => format!("gpio {pin}"),
        };
        let actuators: Vec<String> = part.actuators.iter().map(ToString::to_string).collect();
        println!(
            "{:<12} {:<22} {:<10} {}",
            part.name,
            part.tag.to_hex(),
            sensor,
            actuators.join(", ")
        );
    }
    println!(
        "{} parts, scan mode {:?}, release {:?}",
        config.parts.len(),
        config.scan_mode,
        config.release
    );
}
