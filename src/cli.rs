//! Command-line interface for relayerctl.
use std::{path::PathBuf, str::FromStr};

use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use crate::{
    constants::FUNDING_KEY_ENV,
    network::NetworkKind,
    relayer_config::{DestinationSpec, SourceSpec},
};

/// Wrapper around `LevelFilter` so clap can parse log levels from either
/// string names ("info", "debug", etc.) or numeric shorthands (0-5).
#[derive(Clone, Copy, Debug)]
pub struct LogLevelArg(LevelFilter);

impl LogLevelArg {
    /// String representation suitable for `RUST_LOG`.
    pub fn as_str(&self) -> &'static str {
        match self.0 {
            LevelFilter::OFF => "off",
            LevelFilter::ERROR => "error",
            LevelFilter::WARN => "warn",
            LevelFilter::INFO => "info",
            LevelFilter::DEBUG => "debug",
            LevelFilter::TRACE => "trace",
        }
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("log level cannot be empty".into());
        }

        if let Ok(number) = trimmed.parse::<u8>() {
            let level = match number {
                0 => LevelFilter::OFF,
                1 => LevelFilter::ERROR,
                2 => LevelFilter::WARN,
                3 => LevelFilter::INFO,
                4 => LevelFilter::DEBUG,
                5 => LevelFilter::TRACE,
                _ => {
                    return Err(format!(
                        "unsupported log level number '{number}' (expected 0-5)"
                    ));
                }
            };

            return Ok(LogLevelArg(level));
        }

        let lowercase = trimmed.to_ascii_lowercase();
        let level = match lowercase.as_str() {
            "off" => Some(LevelFilter::OFF),
            "error" | "err" => Some(LevelFilter::ERROR),
            "warn" | "warning" => Some(LevelFilter::WARN),
            "info" | "information" => Some(LevelFilter::INFO),
            "debug" => Some(LevelFilter::DEBUG),
            "trace" => Some(LevelFilter::TRACE),
            _ => None,
        }
        .ok_or_else(|| format!("invalid log level '{trimmed}'"))?;

        Ok(LogLevelArg(level))
    }
}

fn parse_network(value: &str) -> Result<NetworkKind, String> {
    NetworkKind::from_str(value.trim()).map_err(|_| {
        format!("unknown network '{value}' (expected local, devnet, fuji or mainnet)")
    })
}

/// Command-line interface for relayerctl.
#[derive(Parser)]
#[command(name = "relayerctl", version, author)]
#[command(about = "Installs, configures and runs the interchain message relayer", long_about = None)]
pub struct Cli {
    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Path to the settings file (defaults to `relayerctl.yaml` when present).
    #[arg(long, value_name = "PATH", global = true)]
    pub settings: Option<PathBuf>,

    /// Network whose relayer is managed.
    #[arg(long, global = true, default_value = "local", value_parser = parse_network)]
    pub network: NetworkKind,

    /// API endpoint of the network; required for devnets.
    #[arg(long, value_name = "URL", global = true)]
    pub endpoint: Option<String>,

    /// Root directory for relayer binaries and state.
    #[arg(long, value_name = "DIR", global = true)]
    pub base_dir: Option<PathBuf>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Where the relayer binary comes from.
#[derive(Args, Debug, Clone, Default)]
pub struct BinaryArgs {
    /// Relayer version to install (`latest`, `latest-prerelease` or a tag).
    #[arg(long)]
    pub version: Option<String>,

    /// Run this relayer binary instead of installing one.
    #[arg(long, value_name = "PATH", conflicts_with = "version")]
    pub bin_path: Option<PathBuf>,

    /// Return once the launch grace period passes, without waiting for listeners.
    #[arg(long)]
    pub no_wait: bool,
}

/// Available commands for relayerctl.
#[derive(Subcommand)]
pub enum Commands {
    /// Install a relayer binary without running it.
    Install {
        /// Relayer version to install (`latest`, `latest-prerelease` or a tag).
        #[arg(long)]
        version: Option<String>,
    },

    /// Stop any running relayer and launch a fresh one.
    Deploy(BinaryArgs),

    /// Launch the relayer; fails if it is already running or unconfigured.
    Start(BinaryArgs),

    /// Stop the running relayer.
    Stop,

    /// Show the relayer's lifecycle state.
    Status,

    /// Show the relayer's log.
    Logs {
        /// Number of lines to show (default: 50).
        #[arg(short, long, default_value = "50")]
        lines: usize,
    },

    /// Top the relayer's delivery account up to the required balance.
    Fund {
        /// RPC endpoint of the chain holding the account.
        #[arg(long, value_name = "URL")]
        rpc_url: String,

        /// Hex private key of the account paying for the top-up.
        #[arg(long, env = FUNDING_KEY_ENV, hide_env_values = true, value_name = "HEX")]
        funding_key: String,

        /// Relayer delivery account.
        #[arg(long)]
        address: String,
    },

    /// Manage the relayer's routing configuration.
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Source chain options.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// RPC endpoint of the chain.
    #[arg(long, value_name = "URL")]
    pub rpc_endpoint: String,

    /// Websocket endpoint; derived from the RPC endpoint when omitted.
    #[arg(long, value_name = "URL")]
    pub ws_endpoint: Option<String>,

    /// Subnet the chain belongs to.
    #[arg(long)]
    pub subnet_id: String,

    /// Blockchain id.
    #[arg(long)]
    pub blockchain_id: String,

    /// Teleporter registry contract address.
    #[arg(long)]
    pub registry_address: String,

    /// Teleporter messenger contract address.
    #[arg(long)]
    pub messenger_address: String,

    /// Address credited with relaying rewards.
    #[arg(long)]
    pub reward_address: String,
}

impl SourceArgs {
    /// Source registration built from these options.
    pub fn to_spec(&self) -> SourceSpec {
        SourceSpec {
            rpc_endpoint: self.rpc_endpoint.clone(),
            ws_endpoint: self.ws_endpoint.clone(),
            subnet_id: self.subnet_id.clone(),
            blockchain_id: self.blockchain_id.clone(),
            registry_address: self.registry_address.clone(),
            messenger_address: self.messenger_address.clone(),
            reward_address: self.reward_address.clone(),
        }
    }

    /// Destination registration for the same chain, paid for by `private_key`.
    pub fn to_destination_spec(&self, private_key: &str) -> DestinationSpec {
        DestinationSpec {
            rpc_endpoint: self.rpc_endpoint.clone(),
            subnet_id: self.subnet_id.clone(),
            blockchain_id: self.blockchain_id.clone(),
            private_key: private_key.to_string(),
        }
    }
}

/// Configuration subcommands.
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write a configuration with no chains unless one exists.
    Init {
        /// Replace an existing configuration.
        #[arg(long)]
        force: bool,
    },

    /// Register a source chain.
    AddSource(SourceArgs),

    /// Register a destination chain.
    AddDestination {
        /// RPC endpoint of the chain.
        #[arg(long, value_name = "URL")]
        rpc_endpoint: String,

        /// Subnet the chain belongs to.
        #[arg(long)]
        subnet_id: String,

        /// Blockchain id.
        #[arg(long)]
        blockchain_id: String,

        /// Hex private key used to deliver messages.
        #[arg(long)]
        private_key: String,
    },

    /// Register a chain as both source and destination.
    AddChain {
        #[command(flatten)]
        source: SourceArgs,

        /// Hex private key used to deliver messages.
        #[arg(long)]
        private_key: String,
    },

    /// Print the configuration.
    List,
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}
