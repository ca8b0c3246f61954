//! # Mailroom Configuration Validator
//!
//! Loads configuration the same way the runtime does, validates it and prints the
//! result with credentials masked. Exits non-zero when validation fails.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mailroom_core::config::{ConfigManager, MailroomConfig};
use std::path::PathBuf;
use std::process;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate mailroom configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment whose overrides to apply (development, test, production, ...)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Base configuration file
    #[arg(short, long, default_value = "config/mailroom.toml")]
    config: PathBuf,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate the whole configuration
    All,

    /// Print one section of the sanitized configuration
    Section {
        /// database, redis, coordinator, courier, health or tasks
        name: String,
    },

    /// Print the compiled-in defaults
    Defaults,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::All) | None => validate_all(&cli),
        Some(Commands::Section { name }) => show_section(&cli, name),
        Some(Commands::Defaults) => show_defaults(),
    };

    if let Err(e) = result {
        eprintln!("❌ {e:#}");
        process::exit(1);
    }
}

fn load(cli: &Cli) -> Result<std::sync::Arc<ConfigManager>> {
    ConfigManager::load_from_file(&cli.config, &cli.environment).with_context(|| {
        format!(
            "loading {} for environment {}",
            cli.config.display(),
            cli.environment
        )
    })
}

fn validate_all(cli: &Cli) -> Result<()> {
    println!("🔧 Validating mailroom configuration");
    println!("Environment: {}", cli.environment);
    println!("Config file: {}", cli.config.display());
    println!();

    let manager = load(cli)?;
    let config = manager.config();
    println!("✅ Configuration loaded and validated");
    println!(
        "   coordinator: {} workers, {} retries, {}ms backoff step",
        config.coordinator.workers,
        config.coordinator.max_retries,
        config.coordinator.retry_backoff_ms
    );
    println!(
        "   health: {} x {}s window, {} samples, ratio {}",
        config.health.intervals,
        config.health.interval_secs,
        config.health.min_samples,
        config.health.failure_ratio
    );
    println!(
        "   queues: handler={} batch={}",
        config.tasks.handler_queue, config.tasks.batch_queue
    );
    println!();
    println!("{}", serde_json::to_string_pretty(&manager.sanitized())?);
    Ok(())
}

fn show_section(cli: &Cli, name: &str) -> Result<()> {
    let manager = load(cli)?;
    let sanitized = manager.sanitized();
    let Some(section) = sanitized.get(name) else {
        bail!("unknown section {name}");
    };
    println!("{}", serde_json::to_string_pretty(section)?);
    Ok(())
}

fn show_defaults() -> Result<()> {
    let manager = ConfigManager::from_config(MailroomConfig::default(), "defaults")?;
    println!("{}", serde_json::to_string_pretty(&manager.sanitized())?);
    Ok(())
}
