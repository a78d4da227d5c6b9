use std::{error::Error, process::ExitCode};

use chrono::{Local, TimeZone};
use tracing::info;
use tracing_subscriber::EnvFilter;

use relayerctl::{
    cli::{BinaryArgs, Cli, Commands, ConfigCommands, parse_args},
    config::{Settings, load_settings},
    funding::{FundingKey, FundingOutcome, RpcChainClient, display_address, parse_address},
    installer::install_relayer,
    logs::show_logs,
    network::Network,
    relayer::{Relayer, RelayerState},
    relayer_config::{DestinationSpec, Registration},
    runtime,
};

fn main() -> ExitCode {
    let args = parse_args();
    init_logging(&args);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Cli) -> Result<(), Box<dyn Error>> {
    let settings = load_settings(args.settings.as_deref())?;
    runtime::init(args.base_dir.as_deref().or(settings.base_dir.as_deref()));

    let relayer = Relayer::for_network(args.network)
        .with_launch_settings(settings.launch_settings()?);

    match &args.command {
        Commands::Install { version } => {
            let version = version.as_deref().unwrap_or(settings.version());
            let bin = install_relayer(&relayer.paths().bin_dir, version)?;
            println!("{}", bin.display());
        }
        Commands::Deploy(binary) => {
            let relayer = apply_wait(relayer, binary);
            let version = binary.version.as_deref().unwrap_or(settings.version());
            let bin = relayer.deploy(version, binary.bin_path.as_deref())?;
            info!("Relayer deployed from {}", bin.display());
        }
        Commands::Start(binary) => {
            let relayer = apply_wait(relayer, binary);
            let version = binary.version.as_deref().unwrap_or(settings.version());
            let bin = relayer.start(version, binary.bin_path.as_deref())?;
            info!("Relayer started from {}", bin.display());
        }
        Commands::Stop => relayer.stop()?,
        Commands::Status => {
            let status = relayer.status()?;
            match (status.state, status.pid) {
                (RelayerState::Running, Some(pid)) => {
                    let since = status
                        .started_at
                        .and_then(|secs| Local.timestamp_opt(secs as i64, 0).single())
                        .map(|time| format!(" since {}", time.format("%Y-%m-%d %H:%M:%S")))
                        .unwrap_or_default();
                    println!("{}: running (PID {pid}){since}", relayer.network());
                }
                (state, _) => println!("{}: {state}", relayer.network()),
            }
        }
        Commands::Logs { lines } => show_logs(&relayer.paths().log, *lines)?,
        Commands::Fund {
            rpc_url,
            funding_key,
            address,
        } => {
            let key = FundingKey::from_hex(funding_key)?;
            let address = parse_address(address)?;
            let client = RpcChainClient::new(rpc_url)?;
            let address_label = display_address(address);
            match relayer.ensure_funded(&client, &key, address)? {
                FundingOutcome::AlreadyFunded { balance } => {
                    println!("{address_label} already holds {balance}")
                }
                FundingOutcome::Funded { amount, balance } => {
                    println!("{address_label} funded with {amount}; balance is now {balance}")
                }
            }
        }
        Commands::Config(command) => run_config_command(args, &settings, &relayer, command)?,
    }

    Ok(())
}

fn init_logging(args: &Cli) {
    let filter = if let Some(level) = args.log_level {
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}

fn apply_wait(relayer: Relayer, binary: &BinaryArgs) -> Relayer {
    if !binary.no_wait {
        return relayer;
    }
    let mut launch = relayer.launch_settings();
    launch.wait_for_init = false;
    relayer.with_launch_settings(launch)
}

fn run_config_command(
    args: &Cli,
    settings: &Settings,
    relayer: &Relayer,
    command: &ConfigCommands,
) -> Result<(), Box<dyn Error>> {
    let store = relayer.config_store();

    match command {
        ConfigCommands::Init { force } => {
            let endpoint = args
                .endpoint
                .as_deref()
                .or_else(|| settings.endpoint(args.network));
            let network = Network::resolve(args.network, endpoint)?;
            let storage = relayer.paths().storage_dir.display().to_string();

            if *force {
                store.create_base(
                    settings.log_level(),
                    &storage,
                    settings.metrics_port(),
                    &network,
                )?;
                println!("Wrote {}", store.path().display());
            } else if store.create_base_if_missing(
                settings.log_level(),
                &storage,
                settings.metrics_port(),
                &network,
            )? {
                println!("Wrote {}", store.path().display());
            } else {
                println!("Keeping existing {}", store.path().display());
            }
        }
        ConfigCommands::AddSource(source) => {
            let registration = store.add_source(&source.to_spec())?;
            report("source", &source.blockchain_id, registration);
        }
        ConfigCommands::AddDestination {
            rpc_endpoint,
            subnet_id,
            blockchain_id,
            private_key,
        } => {
            let spec = DestinationSpec {
                rpc_endpoint: rpc_endpoint.clone(),
                subnet_id: subnet_id.clone(),
                blockchain_id: blockchain_id.clone(),
                private_key: private_key.clone(),
            };
            let registration = store.add_destination(&spec)?;
            report("destination", blockchain_id, registration);
        }
        ConfigCommands::AddChain {
            source,
            private_key,
        } => {
            let (as_source, as_destination) = store.add_source_and_destination(
                &source.to_spec(),
                &source.to_destination_spec(private_key),
            )?;
            report("source", &source.blockchain_id, as_source);
            report("destination", &source.blockchain_id, as_destination);
        }
        ConfigCommands::List => {
            let config = store.load()?;
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
        }
    }

    Ok(())
}

fn report(role: &str, blockchain_id: &str, registration: Registration) {
    match registration {
        Registration::Added => println!("Added {role} {blockchain_id}"),
        Registration::Unchanged => println!("{role} {blockchain_id} already configured"),
        Registration::Conflicting => {
            println!("{role} {blockchain_id} kept as previously configured")
        }
    }
}
