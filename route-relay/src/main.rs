mod config;
mod observability;

use clap::{Args, Parser};
use config::{Config, ConfigError};
use observability::ObservabilityError;
use relay::config::ApiKey;
use relay::errors::RelayError;
use std::path::PathBuf;

/// Relay for the OpenRouteService API that keeps API keys on the server.
#[derive(Parser)]
#[command(version)]
enum CliCommand {
    /// Serve relayed requests
    Run(RunArgs),
    /// Load and validate a config file, then exit
    CheckConfig(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    /// Path to the YAML config file
    #[arg(long, short)]
    config: PathBuf,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Comma separated API keys, replacing `relay.api_keys` from the config
    #[arg(long, env = "RELAY_API_KEYS", value_delimiter = ',', hide_env_values = true)]
    api_keys: Option<Vec<String>>,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Observability(#[from] ObservabilityError),
    #[error("could not start runtime: {0}")]
    Runtime(std::io::Error),
    #[error(transparent)]
    Relay(#[from] RelayError),
}

fn main() -> Result<(), CliError> {
    let cli = CliCommand::parse();

    match cli {
        CliCommand::Run(args) => run(args),
        CliCommand::CheckConfig(args) => {
            let config = Config::from_file(&args.config)?;
            println!(
                "Config OK: {} API key(s), listening on {}:{}",
                config.relay.api_keys.len(),
                config.relay.listener.host,
                config.relay.listener.port
            );
            Ok(())
        }
    }
}

fn run(args: RunArgs) -> Result<(), CliError> {
    let mut config = Config::from_file(&args.config.config)?;
    if let Some(api_keys) = args.api_keys {
        config.relay.api_keys = api_keys
            .into_iter()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .map(ApiKey::new)
            .collect();
    }

    let _guard = observability::init(&config.common)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    rt.block_on(async move {
        tokio::select! {
            result = relay::run(config.relay) => result?,
            _ = tokio::signal::ctrl_c() => tracing::info!("Received shutdown signal"),
        }
        Ok::<(), CliError>(())
    })
}
