//! Runtime paths for relayer binaries and per-network relayer state.
use std::{
    env,
    path::{Path, PathBuf},
    sync::{OnceLock, RwLock},
};

use crate::{
    constants::{
        LOG_FILE_NAME, RELAYER_BIN_DIR, RELAYER_CONFIG_FILE_NAME, RELAYER_STATE_DIR,
        RUN_FILE_NAME, STORAGE_DIR_NAME,
    },
    network::NetworkKind,
};

#[derive(Debug, Clone)]
struct RuntimeContext {
    base_dir: PathBuf,
}

static CONTEXT: OnceLock<RwLock<RuntimeContext>> = OnceLock::new();

fn context_lock() -> &'static RwLock<RuntimeContext> {
    CONTEXT.get_or_init(|| RwLock::new(RuntimeContext::from_home()))
}

impl RuntimeContext {
    fn from_home() -> Self {
        let home = env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/"));
        Self {
            base_dir: home.join(".local/share/relayerctl"),
        }
    }
}

/// Re-derives the base directory from `$HOME`, or pins it to `base_dir`.
pub fn init(base_dir: Option<&Path>) {
    let context = match base_dir {
        Some(dir) => RuntimeContext {
            base_dir: dir.to_path_buf(),
        },
        None => RuntimeContext::from_home(),
    };
    let mut guard = context_lock()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = context;
}

/// Root of all relayerctl state.
pub fn base_dir() -> PathBuf {
    context_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .base_dir
        .clone()
}

/// Directory holding one sub-directory per installed relayer version.
pub fn relayer_bin_dir() -> PathBuf {
    base_dir().join(RELAYER_BIN_DIR)
}

/// Files owned by the relayer of a single network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayerPaths {
    /// Versioned binary cache.
    pub bin_dir: PathBuf,
    /// Routing configuration handed to the relayer.
    pub config: PathBuf,
    /// Relayer stdout/stderr.
    pub log: PathBuf,
    /// Run-file with the relayer pid.
    pub run_file: PathBuf,
    /// Relayer checkpoint directory.
    pub storage_dir: PathBuf,
}

impl RelayerPaths {
    /// Paths for `network` under the current base directory.
    pub fn for_network(network: NetworkKind) -> Self {
        Self::under(&base_dir(), network)
    }

    /// Paths for `network` rooted at `base`.
    pub fn under(base: &Path, network: NetworkKind) -> Self {
        let state_dir = base.join(RELAYER_STATE_DIR).join(network.as_ref());
        Self {
            bin_dir: base.join(RELAYER_BIN_DIR),
            config: state_dir.join(RELAYER_CONFIG_FILE_NAME),
            log: state_dir.join(LOG_FILE_NAME),
            run_file: state_dir.join(RUN_FILE_NAME),
            storage_dir: state_dir.join(STORAGE_DIR_NAME),
        }
    }
}
