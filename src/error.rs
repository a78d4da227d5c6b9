//! Error handling for relayerctl.
use std::{path::PathBuf, process::ExitStatus};

use thiserror::Error;

/// Defines all possible errors surfaced by the relayer lifecycle manager.
#[derive(Debug, Error)]
pub enum RelayerError {
    /// `start` was requested while a relayer is already up.
    #[error("relayer is already running for {network} (PID {pid})")]
    AlreadyRunning {
        /// Network the relayer serves.
        network: String,
        /// PID of the running relayer.
        pid: u32,
    },

    /// `stop` was requested but no CLI-managed relayer is running.
    #[error("there is no CLI-managed relayer running for {network}")]
    NotRunning {
        /// Network the relayer would serve.
        network: String,
    },

    /// No routing configuration exists to launch the relayer with.
    #[error("there is no relayer configuration available at {0}")]
    MissingConfig(PathBuf),

    /// Spawning the relayer binary failed.
    #[error("failed to launch relayer {binary}: {source}")]
    LaunchError {
        /// The binary that failed to spawn.
        binary: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// The relayer exited before its setup grace period elapsed.
    #[error("relayer process failed during setup ({status}); see logs at {log}")]
    ExitedDuringSetup {
        /// Exit status reported by the child.
        status: ExitStatus,
        /// Log file holding the relayer's output.
        log: PathBuf,
    },

    /// The relayer did not report every source listener in time.
    #[error(
        "timeout waiting for relayer initialization ({initialized}/{expected} sources); see logs at {log}"
    )]
    InitializationTimeout {
        /// Sources whose listener reported in.
        initialized: usize,
        /// Sources configured.
        expected: usize,
        /// Log file holding the relayer's output.
        log: PathBuf,
    },

    /// Error for the run-file.
    #[error("run file error: {0}")]
    RunFile(#[from] RunFileError),

    /// Error while stopping the relayer process.
    #[error("process error: {0}")]
    Process(#[from] ProcessError),

    /// Error while installing the relayer binary.
    #[error("install error: {0}")]
    Install(#[from] InstallError),

    /// Error reading or writing the routing configuration.
    #[error("relayer config error: {0}")]
    Config(#[from] RelayerConfigError),

    /// Filesystem error outside of the files above.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error type for run-file operations.
#[derive(Debug, Error)]
pub enum RunFileError {
    /// Error reading the run-file.
    #[error("failed to read run file {path}: {source}")]
    ReadError {
        /// Run-file path.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Error parsing the run-file contents.
    #[error("failed to parse run file {path}: {source}")]
    ParseError {
        /// Run-file path.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: serde_json::Error,
    },

    /// Error writing the run-file.
    #[error("could not write relayer run file to {path}: {source}")]
    WriteError {
        /// Run-file path.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Error removing the run-file.
    #[error("failed removing relayer run file {path}: {source}")]
    RemoveError {
        /// Run-file path.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },
}

/// Error type for signalling and cleaning up the relayer process.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Removing the relayer storage directory failed.
    #[error("failed removing relayer storage dir {path}: {source}")]
    StorageError {
        /// Storage directory path.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Delivering the interrupt signal failed.
    #[error("failed sending interrupt signal to relayer process with pid {pid}: {source}")]
    InterruptError {
        /// Target pid.
        pid: u32,
        /// The underlying error that occurred.
        #[source]
        source: nix::errno::Errno,
    },

    /// Forcefully killing the relayer failed.
    #[error("failed killing relayer process with pid {pid}: {source}")]
    KillError {
        /// Target pid.
        pid: u32,
        /// The underlying error that occurred.
        #[source]
        source: nix::errno::Errno,
    },

    /// The relayer is still alive after SIGKILL.
    #[error("relayer process with pid {pid} is still running after kill")]
    StillRunning {
        /// Target pid.
        pid: u32,
    },

    /// Error for the run-file.
    #[error("run file error: {0}")]
    RunFile(#[from] RunFileError),
}

/// Error type for relayer binary installation.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The host OS or architecture has no published relayer build.
    #[error("OS not supported: {os}/{arch}")]
    UnsupportedPlatform {
        /// Host operating system.
        os: String,
        /// Host architecture.
        arch: String,
    },

    /// HTTP transport failure.
    #[error("failed doing request to {url}: {source}")]
    HttpError {
        /// Requested URL.
        url: String,
        /// The underlying error that occurred.
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status.
    #[error("failed doing request {url}: unexpected http status code: {status}")]
    HttpStatus {
        /// Requested URL.
        url: String,
        /// Status code received.
        status: u16,
    },

    /// No release matched the requested channel.
    #[error("no {channel} found for {org}/{repo} component {component}")]
    NoRelease {
        /// `release` or `pre-release`.
        channel: &'static str,
        /// GitHub organisation.
        org: String,
        /// GitHub repository.
        repo: String,
        /// Tag prefix searched for.
        component: String,
    },

    /// Unpacking the downloaded archive failed.
    #[error("failed extracting relayer archive into {dir}: {reason}")]
    ExtractError {
        /// Destination directory.
        dir: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The archive unpacked but did not contain an executable relayer.
    #[error("relayer binary not found at {0} after extraction")]
    MissingBinary(PathBuf),

    /// Filesystem error while preparing the version directory.
    #[error("install I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Error type for the relayer routing configuration store.
#[derive(Debug, Error)]
pub enum RelayerConfigError {
    /// Error reading the configuration file.
    #[error("failed to read relayer config {path}: {source}")]
    ReadError {
        /// Configuration path.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for the expected shape.
    #[error("failed to parse relayer config {path}: {source}")]
    ParseError {
        /// Configuration path.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: serde_json::Error,
    },

    /// Error serialising or writing the configuration file.
    #[error("failed to write relayer config {path}: {source}")]
    WriteError {
        /// Configuration path.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Error acquiring the advisory lock guarding the configuration.
    #[error("failed to lock relayer config {path}: {source}")]
    LockError {
        /// Lock file path.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Error serialising the configuration.
    #[error("failed to serialise relayer config: {0}")]
    SerializeError(#[from] serde_json::Error),
}

/// Error type for relayer account funding.
#[derive(Debug, Error)]
pub enum FundingError {
    /// The RPC endpoint is not a valid URL.
    #[error("invalid rpc url {url}: {reason}")]
    InvalidUrl {
        /// Endpoint as given.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An account address is not a 20-byte hex address.
    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    /// The funding key is not a valid secp256k1 private key.
    #[error("invalid funding key: {0}")]
    InvalidKey(#[source] ethers_signers::WalletError),

    /// Signing the transfer failed.
    #[error("failed to sign funding transfer: {0}")]
    Signer(#[source] ethers_signers::WalletError),

    /// The node rejected a request or could not be reached.
    #[error("rpc request failed: {0}")]
    Provider(#[from] ethers_providers::ProviderError),

    /// The async runtime backing the RPC client could not start.
    #[error("failed to start rpc runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// The node reported a quantity too large for the balance type.
    #[error("invalid quantity returned by rpc: {0}")]
    InvalidQuantity(String),

    /// The transfer left the mempool without a receipt.
    #[error("funding transfer {tx_hash} was dropped")]
    TransferDropped {
        /// Hash of the signed transfer.
        tx_hash: String,
    },

    /// The transfer was mined but reverted.
    #[error("funding transfer {tx_hash} reverted")]
    TransferReverted {
        /// Hash of the signed transfer.
        tx_hash: String,
    },

    /// Balance is still below the requirement after funding.
    #[error(
        "relayer address {address} has balance {actual}, below the required {required}"
    )]
    InsufficientBalance {
        /// Relayer account.
        address: String,
        /// Required balance in smallest units.
        required: u128,
        /// Observed balance in smallest units.
        actual: u128,
    },
}

/// Error type for the relayerctl settings file.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Error reading the settings file.
    #[error("Failed to read settings file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Error parsing YAML settings.
    #[error("Invalid YAML format: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// A `${VAR}` reference names an unset variable.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// A duration field could not be parsed.
    #[error("Invalid duration '{0}'")]
    InvalidDuration(String),
}
