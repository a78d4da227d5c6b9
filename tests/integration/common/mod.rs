#![allow(dead_code)]

use std::{
    env, fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use relayerctl::{
    constants::RELAYER_BIN_NAME,
    error::InstallError,
    installer::Downloader,
    relayer::LaunchSettings,
    relayer_config::{DestinationSpec, SourceSpec},
};
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};

pub struct HomeEnvGuard {
    previous: Option<String>,
    _lock: std::sync::MutexGuard<'static, ()>,
}

impl HomeEnvGuard {
    pub fn set(home: &Path) -> Self {
        let lock = relayerctl::test_utils::env_lock();
        let previous = env::var("HOME").ok();
        unsafe {
            env::set_var("HOME", home);
        }
        relayerctl::runtime::init(None);
        Self {
            previous,
            _lock: lock,
        }
    }
}

impl Drop for HomeEnvGuard {
    fn drop(&mut self) {
        match &self.previous {
            Some(value) => unsafe {
                env::set_var("HOME", value);
            },
            None => unsafe {
                env::remove_var("HOME");
            },
        }
        relayerctl::runtime::init(None);
    }
}

/// Downloader for tests that must never touch the network.
pub struct OfflineDownloader;

impl Downloader for OfflineDownloader {
    fn latest_version(&self, _prerelease: bool) -> Result<String, InstallError> {
        Ok("v1.0.0".into())
    }

    fn download(&self, url: &str) -> Result<Vec<u8>, InstallError> {
        panic!("unexpected download of {url}");
    }
}

/// Writes an executable shell script at `path`.
pub fn write_script(path: &Path, body: &str) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    path.to_path_buf()
}

/// Installs a fake relayer as `<bin_dir>/<version>/icm-relayer`.
pub fn install_fake_relayer(bin_dir: &Path, version: &str, body: &str) -> PathBuf {
    write_script(&bin_dir.join(version).join(RELAYER_BIN_NAME), body)
}

/// Script body of a relayer that reports listeners for `sources` and keeps running.
pub fn healthy_relayer(sources: &[&str]) -> String {
    let mut body = String::from("echo \"relayer starting with $*\"\n");
    for source in sources {
        body.push_str(&format!(
            "echo 'level=info msg=\"Listener initialized\" blockchainID={source}'\n"
        ));
    }
    body.push_str("exec sleep 60");
    body
}

/// Launch settings short enough for tests.
pub fn quick_launch() -> LaunchSettings {
    LaunchSettings {
        setup_grace: Duration::from_millis(300),
        wait_for_init: true,
        init_timeout: Duration::from_secs(5),
        init_interval: Duration::from_millis(50),
    }
}

pub fn source_spec(blockchain_id: &str) -> SourceSpec {
    SourceSpec {
        rpc_endpoint: format!("http://127.0.0.1:9650/ext/bc/{blockchain_id}/rpc"),
        ws_endpoint: None,
        subnet_id: "11111111111111111111111111111111LpoYY".into(),
        blockchain_id: blockchain_id.into(),
        registry_address: "0x17aB05351fC94a1a67Bf3f56DdbB941aE6c63E25".into(),
        messenger_address: "0x253b2784c75e510dD0fF1da844684a1aC0aa5fcf".into(),
        reward_address: "0x8db97C7cEcE249c2b98bDC0226Cc4C2A57BF52FC".into(),
    }
}

pub fn destination_spec(blockchain_id: &str) -> DestinationSpec {
    DestinationSpec {
        rpc_endpoint: format!("http://127.0.0.1:9650/ext/bc/{blockchain_id}/rpc"),
        subnet_id: "11111111111111111111111111111111LpoYY".into(),
        blockchain_id: blockchain_id.into(),
        private_key: "56289e99c94b6912bfc12adc093c9b51124f0dc54ac7a766b2bc5ccf558d8027".into(),
    }
}

pub fn wait_for_path(path: &Path) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if path.exists() {
            return;
        }
        thread::sleep(Duration::from_millis(100));
    }
    panic!("Timed out waiting for {:?} to exist", path);
}

pub fn read_pid(path: &Path) -> u32 {
    wait_for_path(path);
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(contents) = fs::read_to_string(path)
            && let Ok(pid) = contents.trim().parse::<u32>()
        {
            return pid;
        }
        if Instant::now() >= deadline {
            panic!("Timed out reading pid from {:?}", path);
        }
        thread::sleep(Duration::from_millis(50));
    }
}

/// Whether `pid` is running; zombies awaiting a reap count as exited.
pub fn is_process_alive(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    system
        .process(Pid::from_u32(pid))
        .is_some_and(|process| process.status() != ProcessStatus::Zombie)
}

pub fn wait_for_process_exit(pid: u32) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if !is_process_alive(pid) {
            return;
        }
        thread::sleep(Duration::from_millis(100));
    }
    panic!("Timed out waiting for PID {} to exit", pid);
}
