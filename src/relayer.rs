//! Lifecycle of the relayer for one network: install, configure, launch, stop.
//!
//! The relayer runs detached in its own session. Nothing here supervises it; every
//! operation re-derives its state from the run-file, the configuration and the log.
use std::{
    collections::HashSet,
    fmt,
    fs::{self, File},
    io,
    os::unix::process::CommandExt,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
    constants::{
        LISTENER_INITIALIZED_MARKER, RELAYER_INIT_CHECK_INTERVAL, RELAYER_INIT_TIMEOUT,
        RELAYER_REQUIRED_BALANCE, RELAYER_SETUP_GRACE,
    },
    error::{FundingError, RelayerError},
    funding::{Address, ChainClient, FundingKey, FundingOutcome, ensure_funded},
    installer::{Downloader, GithubDownloader, RelayerInstaller, installed_versions},
    network::NetworkKind,
    process::{self, RunRecord},
    relayer_config::RelayerConfigStore,
    runtime::RelayerPaths,
};

/// How a launch is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchSettings {
    /// Time the child must survive right after spawn.
    pub setup_grace: Duration,
    /// Whether to wait for every source listener to report in.
    pub wait_for_init: bool,
    /// Upper bound on the listener wait.
    pub init_timeout: Duration,
    /// Interval between log scans during the listener wait.
    pub init_interval: Duration,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            setup_grace: RELAYER_SETUP_GRACE,
            wait_for_init: true,
            init_timeout: RELAYER_INIT_TIMEOUT,
            init_interval: RELAYER_INIT_CHECK_INTERVAL,
        }
    }
}

/// Lifecycle state derived from the files on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayerState {
    /// Nothing installed or configured.
    NotDeployed,
    /// A relayer binary is installed but no configuration exists.
    Installed,
    /// A configuration exists but the relayer never ran.
    Configured,
    /// The relayer process is alive.
    Running,
    /// The relayer ran before and is no longer alive.
    Stopped,
}

impl fmt::Display for RelayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RelayerState::NotDeployed => "not deployed",
            RelayerState::Installed => "installed",
            RelayerState::Configured => "configured",
            RelayerState::Running => "running",
            RelayerState::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Snapshot reported by [`Relayer::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayerStatus {
    /// Derived state.
    pub state: RelayerState,
    /// PID when running.
    pub pid: Option<u32>,
    /// Process start time (seconds since the epoch) when running and known.
    pub started_at: Option<u64>,
}

/// The relayer of a single network on this host.
#[derive(Debug, Clone)]
pub struct Relayer {
    network: NetworkKind,
    paths: RelayerPaths,
    launch: LaunchSettings,
}

impl Relayer {
    /// Relayer for `network` using `paths`.
    pub fn new(network: NetworkKind, paths: RelayerPaths) -> Self {
        Self {
            network,
            paths,
            launch: LaunchSettings::default(),
        }
    }

    /// Relayer for `network` under the runtime base directory.
    pub fn for_network(network: NetworkKind) -> Self {
        Self::new(network, RelayerPaths::for_network(network))
    }

    /// Overrides how launches are confirmed.
    pub fn with_launch_settings(mut self, launch: LaunchSettings) -> Self {
        self.launch = launch;
        self
    }

    /// How launches are confirmed.
    pub fn launch_settings(&self) -> LaunchSettings {
        self.launch
    }

    /// Network served.
    pub fn network(&self) -> NetworkKind {
        self.network
    }

    /// Files owned by this relayer.
    pub fn paths(&self) -> &RelayerPaths {
        &self.paths
    }

    /// Store for this relayer's routing configuration.
    pub fn config_store(&self) -> RelayerConfigStore {
        RelayerConfigStore::new(&self.paths.config)
    }

    /// Derives the lifecycle state.
    pub fn status(&self) -> Result<RelayerStatus, RelayerError> {
        if let Some(process) = process::is_up(&self.paths.run_file)? {
            return Ok(RelayerStatus {
                state: RelayerState::Running,
                pid: Some(process.pid()),
                started_at: process.started_at(),
            });
        }

        let state = if self.paths.log.exists() {
            RelayerState::Stopped
        } else if self.paths.config.exists() {
            RelayerState::Configured
        } else if !installed_versions(&self.paths.bin_dir).is_empty() {
            RelayerState::Installed
        } else {
            RelayerState::NotDeployed
        };

        Ok(RelayerStatus {
            state,
            pid: None,
            started_at: None,
        })
    }

    /// Starts the relayer; fails if it is already running or unconfigured.
    pub fn start(&self, version: &str, bin_path: Option<&Path>) -> Result<PathBuf, RelayerError> {
        let installer = RelayerInstaller::new(GithubDownloader::new()?);
        self.start_with(&installer, version, bin_path)
    }

    /// [`Relayer::start`] with an explicit installer.
    pub fn start_with<D: Downloader>(
        &self,
        installer: &RelayerInstaller<D>,
        version: &str,
        bin_path: Option<&Path>,
    ) -> Result<PathBuf, RelayerError> {
        if let Some(process) = process::is_up(&self.paths.run_file)? {
            return Err(RelayerError::AlreadyRunning {
                network: self.network.to_string(),
                pid: process.pid(),
            });
        }
        self.deploy_with(installer, version, bin_path)
    }

    /// Stops the relayer; fails if it is not running.
    pub fn stop(&self) -> Result<(), RelayerError> {
        if process::is_up(&self.paths.run_file)?.is_none() {
            return Err(RelayerError::NotRunning {
                network: self.network.to_string(),
            });
        }
        process::cleanup(&self.paths.run_file, &self.paths.storage_dir)?;
        info!("Relayer for {} stopped", self.network);
        Ok(())
    }

    /// Replaces any running instance with a fresh one; returns the binary used.
    pub fn deploy(&self, version: &str, bin_path: Option<&Path>) -> Result<PathBuf, RelayerError> {
        let installer = RelayerInstaller::new(GithubDownloader::new()?);
        self.deploy_with(&installer, version, bin_path)
    }

    /// [`Relayer::deploy`] with an explicit installer.
    ///
    /// A configuration must exist; nothing is stopped or installed without one. An
    /// explicit `bin_path` skips installation. The run-file is only written once the
    /// launch is confirmed, so a failed deploy can simply be retried.
    pub fn deploy_with<D: Downloader>(
        &self,
        installer: &RelayerInstaller<D>,
        version: &str,
        bin_path: Option<&Path>,
    ) -> Result<PathBuf, RelayerError> {
        if !self.paths.config.exists() {
            return Err(RelayerError::MissingConfig(self.paths.config.clone()));
        }

        process::cleanup(&self.paths.run_file, &self.paths.storage_dir)?;

        let binary = match bin_path {
            Some(path) => path.to_path_buf(),
            None => installer.install(&self.paths.bin_dir, version)?,
        };

        let mut child = self.launch(&binary)?;
        let pid = child.id();
        if let Err(err) = RunRecord::for_pid(pid).save(&self.paths.run_file) {
            warn!("Could not record relayer PID {pid}; killing it");
            abandon(&mut child);
            return Err(err.into());
        }
        info!(
            "Relayer for {} running with PID {pid}; logs at {}",
            self.network,
            self.paths.log.display()
        );
        Ok(binary)
    }

    /// Funds the relayer's delivery account up to the required balance from `key`.
    pub fn ensure_funded<C: ChainClient>(
        &self,
        client: &C,
        key: &FundingKey,
        relayer_address: Address,
    ) -> Result<FundingOutcome, FundingError> {
        ensure_funded(client, key, relayer_address, RELAYER_REQUIRED_BALANCE)
    }

    fn launch(&self, binary: &Path) -> Result<Child, RelayerError> {
        if let Some(parent) = self.paths.log.parent() {
            fs::create_dir_all(parent)?;
        }
        let stdout = File::create(&self.paths.log)?;
        let stderr = stdout.try_clone()?;

        info!("Executing relayer {}", binary.display());
        let mut command = Command::new(binary);
        command
            .arg("--config-file")
            .arg(&self.paths.config)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        // Own session so signals aimed at the CLI's terminal do not reach the relayer.
        unsafe {
            command.pre_exec(|| {
                if libc::setsid() < 0 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = command
            .spawn()
            .map_err(|source| RelayerError::LaunchError {
                binary: binary.to_path_buf(),
                source,
            })?;
        let pid = child.id();
        debug!("Spawned relayer PID {pid}");

        if let Some(status) = wait_with_timeout(&mut child, self.launch.setup_grace)? {
            return Err(RelayerError::ExitedDuringSetup {
                status,
                log: self.paths.log.clone(),
            });
        }

        if self.launch.wait_for_init
            && let Err(err) = self.wait_for_initialization(&mut child)
        {
            warn!("Relayer PID {pid} failed to initialize; killing it");
            abandon(&mut child);
            return Err(err);
        }

        Ok(child)
    }

    fn wait_for_initialization(&self, child: &mut Child) -> Result<(), RelayerError> {
        let config = self.config_store().load()?;
        let expected = config.source_ids();
        let deadline = Instant::now() + self.launch.init_timeout;

        loop {
            let log = fs::read_to_string(&self.paths.log)?;
            let initialized = initialized_sources(&log, &expected);
            if initialized == expected.len() {
                debug!("All {initialized} relayer source listeners initialized");
                return Ok(());
            }

            if let Some(status) = child.try_wait()? {
                return Err(RelayerError::ExitedDuringSetup {
                    status,
                    log: self.paths.log.clone(),
                });
            }

            if Instant::now() >= deadline {
                return Err(RelayerError::InitializationTimeout {
                    initialized,
                    expected: expected.len(),
                    log: self.paths.log.clone(),
                });
            }
            thread::sleep(self.launch.init_interval);
        }
    }
}

/// Number of `sources` with a listener-initialized line in `log`.
pub fn initialized_sources(log: &str, sources: &[&str]) -> usize {
    let mut seen = HashSet::new();
    for line in log.lines().filter(|l| l.contains(LISTENER_INITIALIZED_MARKER)) {
        for source in sources {
            if line.contains(source) {
                seen.insert(*source);
            }
        }
    }
    seen.len()
}

/// Kills and reaps a child whose launch could not be completed.
fn abandon(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Wait for a child process with a timeout, returning `Ok(None)` on timeout.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;

    loop {
        match child.try_wait()? {
            Some(status) => return Ok(Some(status)),
            None => {
                if Instant::now() >= deadline {
                    return Ok(None);
                }
                thread::sleep(Duration::from_millis(50));
            }
        }
    }
}
