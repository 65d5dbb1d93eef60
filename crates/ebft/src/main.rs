//! # EBFT Node
//!
//! Command line entry point:
//! - `devnet` runs a whole validator network in this process
//! - `check-config` validates an `ebft.toml`
//! - `init` writes one configuration per validator of a fresh network

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use ebft::devnet::generate_node_key;
use ebft::{Devnet, DEFAULT_CONFIG_FILE, VERSION};
use ebft_config::{Config, LoggingConfig};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// EBFT validator node and tools
#[derive(Parser, Debug)]
#[command(name = "ebft")]
#[command(version)]
#[command(about = "EBFT validator node - status gossip, revolts and round progress")]
#[command(long_about = None)]
struct Cli {
    /// Enable verbose logging (can be repeated for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log format: text, json, or compact (defaults to the config file's)
    #[arg(long)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum LogFormat {
    Text,
    Json,
    Compact,
}

impl LogFormat {
    fn from_config(format: &str) -> Self {
        match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Text,
        }
    }
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run an in-process validator network
    Devnet {
        /// Configuration file path (defaults apply when absent)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of validators (overrides config)
        #[arg(long)]
        validators: Option<usize>,

        /// Index of a validator that never builds blocks (overrides config)
        #[arg(long)]
        silent: Option<usize>,

        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        duration_secs: Option<u64>,
    },

    /// Validate a configuration file
    CheckConfig {
        /// Configuration file path
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },

    /// Generate validator keys and one configuration file per validator
    Init {
        /// Output directory for configuration files
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Number of validators
        #[arg(long, default_value = "4")]
        validators: usize,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Devnet {
            ref config,
            validators,
            silent,
            duration_secs,
        } => {
            let mut config = match config {
                Some(path) => Config::load(path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => Config::default(),
            };
            if let Some(count) = validators {
                config.devnet.validators = count;
            }
            if silent.is_some() {
                config.devnet.silent_validator = silent;
            }
            init_tracing(&cli, &config.logging)?;
            handle_devnet(config, duration_secs.map(Duration::from_secs)).await
        }

        Commands::CheckConfig { ref config } => {
            init_tracing(&cli, &LoggingConfig::default())?;
            handle_check_config(config)
        }

        Commands::Init {
            ref output,
            validators,
        } => {
            init_tracing(&cli, &LoggingConfig::default())?;
            handle_init(output, validators)
        }

        Commands::Version => handle_version(),
    }
}

fn init_tracing(cli: &Cli, logging: &LoggingConfig) -> Result<()> {
    let filter = match cli.verbose {
        0 => {
            let level = logging.level.to_lowercase();
            format!("{},ebft={}", level, level)
        }
        1 => "info,ebft=debug".to_string(),
        2 => "debug,ebft=debug".to_string(),
        _ => "trace,ebft=trace".to_string(),
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let format = cli
        .log_format
        .unwrap_or_else(|| LogFormat::from_config(&logging.format));

    match format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true))
                .with(env_filter)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(env_filter)
                .init();
        }
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(fmt::layer().compact())
                .with(env_filter)
                .init();
        }
    }

    Ok(())
}

/// Handle the `devnet` command: run until Ctrl-C or `duration` elapses.
async fn handle_devnet(config: Config, duration: Option<Duration>) -> Result<()> {
    info!(version = VERSION, "Starting EBFT devnet");

    let devnet = Devnet::start(&config).context("starting devnet")?;

    let mut report = tokio::time::interval(Duration::from_millis(config.devnet.report_interval_ms));
    report.tick().await;

    let deadline = async {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = report.tick() => {
                devnet.report();
                if !devnet.all_running() {
                    warn!("A validator stopped unexpectedly, shutting down");
                    break;
                }
            }
            _ = &mut deadline => {
                info!("Devnet duration elapsed");
                break;
            }
            result = tokio::signal::ctrl_c() => {
                result.context("waiting for Ctrl-C")?;
                info!("Received Ctrl-C, shutting down");
                break;
            }
        }
    }

    devnet.report();
    let conflicts = devnet.chain().conflicts();
    devnet.stop()?;

    if conflicts > 0 {
        anyhow::bail!("devnet committed {} conflicting blocks", conflicts);
    }
    Ok(())
}

/// Handle the `check-config` command.
fn handle_check_config(path: &Path) -> Result<()> {
    let config = Config::load(path).with_context(|| format!("loading {}", path.display()))?;
    let node_index = config.chain.node_index()?;

    println!("Configuration OK: {}", path.display());
    println!("  Validators: {}", config.chain.validators.len());
    match node_index {
        Some(index) => println!("  Node index: {}", index),
        None => println!("  Node index: not a validator"),
    }
    println!(
        "  Revolt timeout: {}ms (delay base {}ms, max {}ms)",
        config.revolt.timeout_ms,
        config.revolt.exponential_delay_base_ms,
        config.revolt.exponential_delay_max_ms
    );
    match config.revolt.fast_revolt_status_timeout_ms {
        Some(ms) => println!("  Fast revolt: after {}ms of primary silence", ms),
        None => println!("  Fast revolt: disabled"),
    }
    println!(
        "  Heartbeat: {}",
        if config.heartbeat.enabled {
            format!("enabled, timeout {}ms", config.heartbeat.timeout_ms)
        } else {
            "disabled".to_string()
        }
    );
    Ok(())
}

/// Handle the `init` command: writes `node-<i>.toml` for every validator.
fn handle_init(output: &Path, validators: usize) -> Result<()> {
    if validators == 0 {
        anyhow::bail!("at least one validator is required");
    }
    std::fs::create_dir_all(output)
        .with_context(|| format!("creating {}", output.display()))?;

    let keys = (0..validators)
        .map(|_| generate_node_key())
        .collect::<Result<Vec<_>, _>>()?;
    let hex_keys: Vec<String> = keys.iter().map(|k| k.to_hex()).collect();

    for (index, key) in hex_keys.iter().enumerate() {
        let mut config = Config::default();
        config.chain.validators = hex_keys.clone();
        config.chain.node_pubkey = Some(key.clone());
        config.validate()?;

        let path = output.join(format!("node-{}.toml", index));
        config.save(&path)?;
        info!(index, path = %path.display(), "Wrote validator configuration");
    }

    println!(
        "Initialized {} validators in {}",
        validators,
        output.display()
    );
    Ok(())
}

fn handle_version() -> Result<()> {
    println!("EBFT {}", VERSION);
    println!("  Rust: {}", env!("CARGO_PKG_RUST_VERSION"));
    println!("  Git: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    Ok(())
}
