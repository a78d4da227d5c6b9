//! Relayer routing configuration and the store that merges chains into it.
//!
//! The configuration file is shared by every deploy on the host. Each mutation takes
//! an exclusive advisory lock on `<config>.lock`, reloads the file, applies the change
//! and swaps the result in with a rename, so concurrent invocations serialize instead
//! of dropping each other's entries.
//!
//! Source and destination lists are keyed by blockchain id: registering a chain that
//! is already present leaves the existing entry untouched.
use std::{
    collections::BTreeMap,
    ffi::OsString,
    fs::{self, File, OpenOptions},
    io::ErrorKind,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::{
    constants::{
        CONFIG_LOCK_SUFFIX, CONFIG_TMP_SUFFIX, DEFAULT_DB_WRITE_INTERVAL_SECONDS,
        DEFAULT_SIGNATURE_CACHE_SIZE, EVM_VM, OFF_CHAIN_REGISTRY_SOURCE_ADDRESS,
        STATE_FILE_MODE,
    },
    error::RelayerConfigError,
    network::{Network, NetworkKind},
};

/// Endpoint of an API the relayer talks to.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ApiConfig {
    /// Base URL of the API.
    pub base_url: String,
    /// Query parameters appended to every request.
    #[serde(
        rename = "query-parameters",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub query_params: BTreeMap<String, String>,
}

impl ApiConfig {
    /// Endpoint at `base_url` without query parameters.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            query_params: BTreeMap::new(),
        }
    }
}

/// Message protocol bound to a contract address on a source chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "message-format", content = "settings", rename_all = "kebab-case")]
pub enum MessageProtocol {
    /// Teleporter messages emitted by the messenger contract.
    Teleporter {
        /// Address credited with delivery rewards.
        #[serde(rename = "reward-address")]
        reward_address: String,
    },
    /// Registry updates signed off-chain and delivered to the registry contract.
    OffChainRegistry {
        /// Registry contract receiving the updates.
        #[serde(rename = "teleporter-registry-address")]
        teleporter_registry_address: String,
    },
}

/// Chain the relayer listens on for outgoing messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct SourceBlockchain {
    /// Subnet validating the chain.
    pub subnet_id: String,
    /// Chain identifier; unique within the source list.
    pub blockchain_id: String,
    /// Virtual machine kind.
    pub vm: String,
    /// JSON-RPC endpoint.
    pub rpc_endpoint: ApiConfig,
    /// Websocket endpoint used for log subscriptions.
    pub ws_endpoint: ApiConfig,
    /// Protocols keyed by the contract address emitting them.
    pub message_contracts: BTreeMap<String, MessageProtocol>,
}

/// Chain the relayer delivers messages to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct DestinationBlockchain {
    /// Subnet validating the chain.
    pub subnet_id: String,
    /// Chain identifier; unique within the destination list.
    pub blockchain_id: String,
    /// Virtual machine kind.
    pub vm: String,
    /// JSON-RPC endpoint used for delivery.
    pub rpc_endpoint: ApiConfig,
    /// Key paying for delivery transactions.
    pub account_private_key: String,
}

/// Entry addressable by blockchain id.
pub trait ChainEntry {
    /// Identifier the table is keyed by.
    fn blockchain_id(&self) -> &str;
}

impl ChainEntry for SourceBlockchain {
    fn blockchain_id(&self) -> &str {
        &self.blockchain_id
    }
}

impl ChainEntry for DestinationBlockchain {
    fn blockchain_id(&self) -> &str {
        &self.blockchain_id
    }
}

/// Result of registering a chain in a [`ChainTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The chain was appended.
    Added,
    /// An identical entry was already present.
    Unchanged,
    /// A different entry for the same blockchain id was already present and kept.
    Conflicting,
}

/// Insertion-ordered table keyed by blockchain id, serialized as a JSON list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ChainTable<T> {
    entries: Vec<T>,
}

impl<T> Default for ChainTable<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: ChainEntry + PartialEq> ChainTable<T> {
    /// Entry registered for `blockchain_id`.
    pub fn get(&self, blockchain_id: &str) -> Option<&T> {
        self.entries
            .iter()
            .find(|entry| entry.blockchain_id() == blockchain_id)
    }

    /// Whether `blockchain_id` is registered.
    pub fn contains(&self, blockchain_id: &str) -> bool {
        self.get(blockchain_id).is_some()
    }

    /// Appends `entry` unless its blockchain id is already registered.
    pub fn register(&mut self, entry: T) -> Registration {
        match self.get(entry.blockchain_id()) {
            Some(existing) if *existing == entry => Registration::Unchanged,
            Some(_) => Registration::Conflicting,
            None => {
                self.entries.push(entry);
                Registration::Added
            }
        }
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Placeholder printed instead of a private key.
pub const REDACTED: &str = "<redacted>";

fn default_db_write_interval() -> u64 {
    DEFAULT_DB_WRITE_INTERVAL_SECONDS
}

fn default_signature_cache_size() -> u64 {
    DEFAULT_SIGNATURE_CACHE_SIZE
}

/// The relayer's routing configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct RelayerConfig {
    /// Relayer log level.
    pub log_level: String,
    /// P-Chain API used to resolve validator sets.
    pub p_chain_api: ApiConfig,
    /// Info API used to resolve peers.
    pub info_api: ApiConfig,
    /// Directory holding the relayer's delivery checkpoint.
    pub storage_location: String,
    /// Whether blocks produced while the relayer was down are replayed.
    pub process_missed_blocks: bool,
    /// Chains messages are read from.
    #[serde(default)]
    pub source_blockchains: ChainTable<SourceBlockchain>,
    /// Chains messages are delivered to.
    #[serde(default)]
    pub destination_blockchains: ChainTable<DestinationBlockchain>,
    /// Prometheus metrics port.
    pub metrics_port: u16,
    /// Checkpoint flush interval.
    #[serde(default = "default_db_write_interval")]
    pub db_write_interval_seconds: u64,
    /// Signature cache size.
    #[serde(default = "default_signature_cache_size")]
    pub signature_cache_size: u64,
    /// Whether peers on private addresses may be contacted.
    #[serde(default)]
    pub allow_private_ips: bool,
    /// Keys this tool does not model, preserved across rewrites.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RelayerConfig {
    /// Skeleton configuration with no chains for `network`.
    pub fn base(
        log_level: &str,
        storage_location: &str,
        metrics_port: u16,
        network: &Network,
    ) -> Self {
        Self {
            log_level: log_level.to_string(),
            p_chain_api: ApiConfig::new(&network.endpoint),
            info_api: ApiConfig::new(&network.endpoint),
            storage_location: storage_location.to_string(),
            process_missed_blocks: false,
            source_blockchains: ChainTable::default(),
            destination_blockchains: ChainTable::default(),
            metrics_port,
            db_write_interval_seconds: DEFAULT_DB_WRITE_INTERVAL_SECONDS,
            signature_cache_size: DEFAULT_SIGNATURE_CACHE_SIZE,
            allow_private_ips: matches!(network.kind, NetworkKind::Local | NetworkKind::Devnet),
            extra: Map::new(),
        }
    }

    /// Registers `spec` as a source chain.
    pub fn add_source(&mut self, spec: &SourceSpec) -> Registration {
        let registration = self.source_blockchains.register(spec.to_entry());
        if registration == Registration::Conflicting {
            warn!(
                "Source blockchain {} is already configured with different settings; keeping the existing entry",
                spec.blockchain_id
            );
        }
        registration
    }

    /// Registers `spec` as a destination chain.
    pub fn add_destination(&mut self, spec: &DestinationSpec) -> Registration {
        let registration = self.destination_blockchains.register(spec.to_entry());
        if registration == Registration::Conflicting {
            warn!(
                "Destination blockchain {} is already configured with different settings; keeping the existing entry",
                spec.blockchain_id
            );
        }
        registration
    }

    /// Blockchain ids of every source, in insertion order.
    pub fn source_ids(&self) -> Vec<&str> {
        self.source_blockchains
            .iter()
            .map(|source| source.blockchain_id.as_str())
            .collect()
    }

    /// Copy safe to print: destination account keys are masked.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        for destination in &mut config.destination_blockchains.entries {
            if !destination.account_private_key.is_empty() {
                destination.account_private_key = REDACTED.to_string();
            }
        }
        config
    }
}

/// Derives a websocket endpoint from an RPC endpoint.
///
/// `https` becomes `wss`, `http` becomes `ws`, and a trailing `/rpc` becomes `/ws`.
pub fn derive_ws_endpoint(rpc_endpoint: &str) -> String {
    let swapped = if let Some(rest) = rpc_endpoint.strip_prefix("https") {
        format!("wss{rest}")
    } else if let Some(rest) = rpc_endpoint.strip_prefix("http") {
        format!("ws{rest}")
    } else {
        rpc_endpoint.to_string()
    };

    match swapped.strip_suffix("/rpc") {
        Some(prefix) => format!("{prefix}/ws"),
        None => swapped,
    }
}

/// Parameters of a source chain registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSpec {
    /// JSON-RPC endpoint.
    pub rpc_endpoint: String,
    /// Websocket endpoint; derived from the RPC endpoint when absent.
    pub ws_endpoint: Option<String>,
    /// Subnet id.
    pub subnet_id: String,
    /// Blockchain id.
    pub blockchain_id: String,
    /// Teleporter registry contract.
    pub registry_address: String,
    /// Teleporter messenger contract.
    pub messenger_address: String,
    /// Address credited with delivery rewards.
    pub reward_address: String,
}

impl SourceSpec {
    /// Config entry for this source.
    pub fn to_entry(&self) -> SourceBlockchain {
        let ws_endpoint = self
            .ws_endpoint
            .as_deref()
            .filter(|ws| !ws.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| derive_ws_endpoint(&self.rpc_endpoint));

        let mut message_contracts = BTreeMap::new();
        message_contracts.insert(
            self.messenger_address.clone(),
            MessageProtocol::Teleporter {
                reward_address: self.reward_address.clone(),
            },
        );
        message_contracts.insert(
            OFF_CHAIN_REGISTRY_SOURCE_ADDRESS.to_string(),
            MessageProtocol::OffChainRegistry {
                teleporter_registry_address: self.registry_address.clone(),
            },
        );

        SourceBlockchain {
            subnet_id: self.subnet_id.clone(),
            blockchain_id: self.blockchain_id.clone(),
            vm: EVM_VM.to_string(),
            rpc_endpoint: ApiConfig::new(&self.rpc_endpoint),
            ws_endpoint: ApiConfig::new(ws_endpoint),
            message_contracts,
        }
    }
}

/// Parameters of a destination chain registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationSpec {
    /// JSON-RPC endpoint.
    pub rpc_endpoint: String,
    /// Subnet id.
    pub subnet_id: String,
    /// Blockchain id.
    pub blockchain_id: String,
    /// Key paying for delivery transactions.
    pub private_key: String,
}

impl DestinationSpec {
    /// Config entry for this destination.
    pub fn to_entry(&self) -> DestinationBlockchain {
        DestinationBlockchain {
            subnet_id: self.subnet_id.clone(),
            blockchain_id: self.blockchain_id.clone(),
            vm: EVM_VM.to_string(),
            rpc_endpoint: ApiConfig::new(&self.rpc_endpoint),
            account_private_key: self.private_key.clone(),
        }
    }
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Lock guard; the advisory lock is released when the file handle drops.
struct ConfigLock {
    _file: File,
}

/// Reads and atomically rewrites a relayer configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayerConfigStore {
    path: PathBuf,
}

impl RelayerConfigStore {
    /// Store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Configuration file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the configuration file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn lock(&self) -> Result<ConfigLock, RelayerConfigError> {
        let lock_path = sibling_path(&self.path, CONFIG_LOCK_SUFFIX);
        let lock_error = |source| RelayerConfigError::LockError {
            path: lock_path.clone(),
            source,
        };

        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(lock_error)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(lock_error)?;
        file.lock_exclusive().map_err(lock_error)?;
        Ok(ConfigLock { _file: file })
    }

    /// Loads and parses the configuration.
    pub fn load(&self) -> Result<RelayerConfig, RelayerConfigError> {
        let contents =
            fs::read_to_string(&self.path).map_err(|source| RelayerConfigError::ReadError {
                path: self.path.clone(),
                source,
            })?;
        serde_json::from_str(&contents).map_err(|source| RelayerConfigError::ParseError {
            path: self.path.clone(),
            source,
        })
    }

    fn write(&self, config: &RelayerConfig) -> Result<(), RelayerConfigError> {
        let write_error = |source| RelayerConfigError::WriteError {
            path: self.path.clone(),
            source,
        };

        let payload = serde_json::to_string_pretty(config)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_error)?;
        }

        let tmp_path = sibling_path(&self.path, CONFIG_TMP_SUFFIX);
        fs::write(&tmp_path, payload).map_err(write_error)?;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(STATE_FILE_MODE))
            .map_err(write_error)?;
        fs::rename(&tmp_path, &self.path).map_err(write_error)?;
        debug!("Wrote relayer config {}", self.path.display());
        Ok(())
    }

    /// Replaces the configuration with `config`.
    pub fn save(&self, config: &RelayerConfig) -> Result<(), RelayerConfigError> {
        let _lock = self.lock()?;
        self.write(config)
    }

    /// Loads, mutates and rewrites the configuration under the lock.
    pub fn update<T>(
        &self,
        mutate: impl FnOnce(&mut RelayerConfig) -> T,
    ) -> Result<T, RelayerConfigError> {
        let _lock = self.lock()?;
        let mut config = self.load()?;
        let outcome = mutate(&mut config);
        self.write(&config)?;
        Ok(outcome)
    }

    /// Writes a skeleton configuration, replacing any existing file.
    pub fn create_base(
        &self,
        log_level: &str,
        storage_location: &str,
        metrics_port: u16,
        network: &Network,
    ) -> Result<(), RelayerConfigError> {
        let config = RelayerConfig::base(log_level, storage_location, metrics_port, network);
        self.save(&config)
    }

    /// Writes a skeleton configuration unless one exists; returns whether it wrote.
    pub fn create_base_if_missing(
        &self,
        log_level: &str,
        storage_location: &str,
        metrics_port: u16,
        network: &Network,
    ) -> Result<bool, RelayerConfigError> {
        let _lock = self.lock()?;
        match fs::metadata(&self.path) {
            Ok(_) => return Ok(false),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(source) => {
                return Err(RelayerConfigError::ReadError {
                    path: self.path.clone(),
                    source,
                });
            }
        }

        let config = RelayerConfig::base(log_level, storage_location, metrics_port, network);
        self.write(&config)?;
        info!("Created relayer config {}", self.path.display());
        Ok(true)
    }

    /// Registers a source chain.
    pub fn add_source(&self, spec: &SourceSpec) -> Result<Registration, RelayerConfigError> {
        self.update(|config| config.add_source(spec))
    }

    /// Registers a destination chain.
    pub fn add_destination(
        &self,
        spec: &DestinationSpec,
    ) -> Result<Registration, RelayerConfigError> {
        self.update(|config| config.add_destination(spec))
    }

    /// Registers a chain as both source and destination with a single read and write.
    pub fn add_source_and_destination(
        &self,
        source: &SourceSpec,
        destination: &DestinationSpec,
    ) -> Result<(Registration, Registration), RelayerConfigError> {
        self.update(|config| (config.add_source(source), config.add_destination(destination)))
    }
}
