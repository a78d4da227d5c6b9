//! Settings file for relayerctl.
use regex::Regex;
use serde::Deserialize;
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    constants::{DEFAULT_METRICS_PORT, DEFAULT_RELAYER_LOG_LEVEL, DEFAULT_SETTINGS_FILE},
    error::SettingsError,
    network::NetworkKind,
    relayer::LaunchSettings,
};

/// Represents the structure of the settings file.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
pub struct Settings {
    /// Relayer version to install; `latest` when unset.
    pub version: Option<String>,
    /// Root of the relayerctl state tree.
    pub base_dir: Option<PathBuf>,
    /// Log level written into new relayer configurations.
    pub log_level: Option<String>,
    /// Metrics port written into new relayer configurations.
    pub metrics_port: Option<u16>,
    /// API endpoint overrides keyed by network name.
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
    /// Launch confirmation overrides.
    #[serde(default)]
    pub launch: LaunchOverrides,
}

/// Launch timings as written in the settings file (`"2s"`, `"1m"`, ...).
#[derive(Debug, Default, Deserialize, Clone, PartialEq, Eq)]
pub struct LaunchOverrides {
    /// Time the relayer must survive after spawn.
    pub setup_grace: Option<String>,
    /// Whether to wait for source listeners before reporting success.
    pub wait_for_init: Option<bool>,
    /// Upper bound on the listener wait.
    pub init_timeout: Option<String>,
}

impl Settings {
    /// Relayer version to deploy, `latest` when unset.
    pub fn version(&self) -> &str {
        self.version.as_deref().unwrap_or("latest")
    }

    /// Relayer log level for new configurations.
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_RELAYER_LOG_LEVEL)
    }

    /// Metrics port for new configurations.
    pub fn metrics_port(&self) -> u16 {
        self.metrics_port.unwrap_or(DEFAULT_METRICS_PORT)
    }

    /// Endpoint override for `network`, if any.
    pub fn endpoint(&self, network: NetworkKind) -> Option<&str> {
        self.endpoints.get(network.as_ref()).map(String::as_str)
    }

    /// Launch settings with overrides applied over the defaults.
    pub fn launch_settings(&self) -> Result<LaunchSettings, SettingsError> {
        let mut launch = LaunchSettings::default();
        if let Some(grace) = &self.launch.setup_grace {
            launch.setup_grace = parse_duration(grace)?;
        }
        if let Some(wait) = self.launch.wait_for_init {
            launch.wait_for_init = wait;
        }
        if let Some(timeout) = &self.launch.init_timeout {
            launch.init_timeout = parse_duration(timeout)?;
        }
        Ok(launch)
    }
}

/// Parses durations such as `10s`, `5m`, `1h`; a bare number means seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, SettingsError> {
    let trimmed = raw.trim();
    let invalid = || SettingsError::InvalidDuration(raw.to_string());

    let (digits, scale) = if let Some(value) = trimmed.strip_suffix("ms") {
        (value, 0)
    } else if let Some(value) = trimmed.strip_suffix('s') {
        (value, 1)
    } else if let Some(value) = trimmed.strip_suffix('m') {
        (value, 60)
    } else if let Some(value) = trimmed.strip_suffix('h') {
        (value, 3600)
    } else {
        (trimmed, 1)
    };

    let value: u64 = digits.trim().parse().map_err(|_| invalid())?;
    if scale == 0 {
        Ok(Duration::from_millis(value))
    } else {
        value
            .checked_mul(scale)
            .map(Duration::from_secs)
            .ok_or_else(invalid)
    }
}

/// Expands `${VAR}` and `$VAR` references; unset variables are an error.
fn expand_env_vars(input: &str) -> Result<String, SettingsError> {
    let re = Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?").expect("valid env var pattern");

    let mut missing = None;
    let result = re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        match env::var(var_name) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(var_name) => Err(SettingsError::MissingEnvVar(var_name)),
        None => Ok(result.to_string()),
    }
}

/// Loads the settings file, expanding environment variables.
///
/// An explicit path must exist. Without one, `relayerctl.yaml` in the working
/// directory is used when present and defaults apply otherwise.
pub fn load_settings(settings_path: Option<&Path>) -> Result<Settings, SettingsError> {
    let settings_path = match settings_path {
        Some(path) => path,
        None if Path::new(DEFAULT_SETTINGS_FILE).exists() => Path::new(DEFAULT_SETTINGS_FILE),
        None => return Ok(Settings::default()),
    };

    let content = fs::read_to_string(settings_path).map_err(|e| {
        SettingsError::ReadError(std::io::Error::new(
            e.kind(),
            format!("{} ({})", e, settings_path.display()),
        ))
    })?;

    let expanded_content = expand_env_vars(&content)?;
    if expanded_content.trim().is_empty() {
        return Ok(Settings::default());
    }
    Ok(serde_yaml::from_str(&expanded_content)?)
}
