//! Constants and configuration values for relayerctl.
//!
//! This module centralizes the file names, timings and well-known values shared by
//! the installer, the configuration store and the lifecycle manager.

use std::time::Duration;

// ============================================================================
// File System Constants
// ============================================================================

/// Directory (relative to the base directory) holding versioned relayer binaries.
pub const RELAYER_BIN_DIR: &str = "bin/icm-relayer";

/// Directory (relative to the base directory) holding per-network relayer state.
pub const RELAYER_STATE_DIR: &str = "relayer";

/// Name of the relayer executable inside a version directory.
pub const RELAYER_BIN_NAME: &str = "icm-relayer";

/// Name of the relayer routing configuration file.
pub const RELAYER_CONFIG_FILE_NAME: &str = "config.json";

/// Name of the file recording the running relayer's process id.
pub const RUN_FILE_NAME: &str = "run.json";

/// Name of the relayer's combined stdout/stderr log.
pub const LOG_FILE_NAME: &str = "relayer.log";

/// Name of the relayer's checkpoint directory.
pub const STORAGE_DIR_NAME: &str = "storage";

/// Suffix of the advisory lock file guarding the relayer configuration.
pub const CONFIG_LOCK_SUFFIX: &str = ".lock";

/// Suffix of the temporary file used for atomic configuration writes.
pub const CONFIG_TMP_SUFFIX: &str = ".tmp";

/// Default settings file looked up in the working directory.
pub const DEFAULT_SETTINGS_FILE: &str = "relayerctl.yaml";

/// Permission bits applied to the run-file and the relayer configuration.
pub const STATE_FILE_MODE: u32 = 0o644;

// ============================================================================
// Process Management Timing
// ============================================================================

/// Time a freshly spawned relayer must survive before the launch counts as successful.
pub const RELAYER_SETUP_GRACE: Duration = Duration::from_secs(2);

/// Interval between liveness checks while waiting for the relayer to exit.
pub const RELAYER_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Time allowed between SIGINT and the SIGKILL escalation.
pub const RELAYER_STOP_TIMEOUT: Duration = Duration::from_secs(3);

/// Interval between log scans while waiting for relayer listeners to come up.
pub const RELAYER_INIT_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on waiting for every source listener to initialize.
pub const RELAYER_INIT_TIMEOUT: Duration = Duration::from_secs(120);

/// Log marker emitted by the relayer once a source listener is running.
pub const LISTENER_INITIALIZED_MARKER: &str = "Listener initialized";

// ============================================================================
// Relayer Configuration Defaults
// ============================================================================

/// Default relayer log level written into new configurations.
pub const DEFAULT_RELAYER_LOG_LEVEL: &str = "info";

/// Default port the relayer exposes Prometheus metrics on.
pub const DEFAULT_METRICS_PORT: u16 = 9090;

/// How often the relayer flushes its delivery checkpoint.
pub const DEFAULT_DB_WRITE_INTERVAL_SECONDS: u64 = 10;

/// Size of the relayer's signature cache.
pub const DEFAULT_SIGNATURE_CACHE_SIZE: u64 = 1024 * 1024;

/// Virtual machine kind written for every chain entry.
pub const EVM_VM: &str = "evm";

/// Source address the relayer listens on for off-chain registry updates.
pub const OFF_CHAIN_REGISTRY_SOURCE_ADDRESS: &str =
    "0x0000000000000000000000000000000000000000";

// ============================================================================
// Release Discovery
// ============================================================================

/// GitHub organisation publishing relayer releases.
pub const RELEASE_ORG: &str = "ava-labs";

/// Repository publishing relayer releases.
pub const RELEASE_REPO: &str = "icm-services";

/// Tag prefix identifying relayer releases inside the repository.
pub const RELAYER_COMPONENT: &str = "icm-relayer";

/// Version alias resolving to the latest stable release.
pub const LATEST_RELEASE_TAG: &str = "latest";

/// Version alias resolving to the latest pre-release.
pub const LATEST_PRERELEASE_TAG: &str = "latest-prerelease";

/// Environment variable carrying an optional GitHub API token.
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

// ============================================================================
// Funding
// ============================================================================

/// Smallest-denomination units per native token.
pub const WEI_PER_TOKEN: u128 = 1_000_000_000_000_000_000;

/// Balance the relayer account is topped up to before it starts delivering.
pub const RELAYER_REQUIRED_BALANCE: u128 = 500 * WEI_PER_TOKEN;

/// Number of balance re-reads after submitting a funding transfer.
pub const FUNDING_CONFIRM_ATTEMPTS: usize = 10;

/// Delay between balance re-reads after a funding transfer.
pub const FUNDING_CONFIRM_INTERVAL: Duration = Duration::from_millis(500);

/// Gas limit of a plain value transfer.
pub const TRANSFER_GAS_LIMIT: u64 = 21_000;

/// Environment variable that may carry the funding key instead of the command line.
pub const FUNDING_KEY_ENV: &str = "RELAYERCTL_FUNDING_KEY";
