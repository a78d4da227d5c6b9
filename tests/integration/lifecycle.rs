#[path = "common/mod.rs"]
mod common;

use std::{fs, time::Duration};

use common::{
    OfflineDownloader, healthy_relayer, install_fake_relayer, is_process_alive, quick_launch,
    read_pid, source_spec, wait_for_process_exit, write_script,
};
use relayerctl::{
    error::RelayerError,
    installer::RelayerInstaller,
    network::{Network, NetworkKind},
    process::{self, RunRecord},
    relayer::{LaunchSettings, Relayer, RelayerState},
    runtime::RelayerPaths,
};
use tempfile::tempdir;

fn relayer_under(base: &std::path::Path) -> Relayer {
    Relayer::new(NetworkKind::Local, RelayerPaths::under(base, NetworkKind::Local))
        .with_launch_settings(quick_launch())
}

fn write_config(relayer: &Relayer, sources: &[&str]) {
    let store = relayer.config_store();
    let storage = relayer.paths().storage_dir.display().to_string();
    store
        .create_base_if_missing("info", &storage, 9090, &Network::local())
        .unwrap();
    for source in sources {
        store.add_source(&source_spec(source)).unwrap();
    }
}

#[test]
fn deploy_launches_installed_version_and_stop_cleans_up() {
    let temp = tempdir().unwrap();
    let relayer = relayer_under(temp.path());
    let installer = RelayerInstaller::new(OfflineDownloader);
    write_config(&relayer, &["2CA6"]);
    let bin = install_fake_relayer(
        &relayer.paths().bin_dir,
        "v1.0.0",
        &healthy_relayer(&["2CA6"]),
    );
    fs::create_dir_all(relayer.paths().storage_dir.join("db")).unwrap();

    let used = relayer.deploy_with(&installer, "v1.0.0", None).unwrap();
    assert_eq!(used, bin);

    let status = relayer.status().unwrap();
    assert_eq!(status.state, RelayerState::Running);
    let pid = status.pid.expect("running relayer has a pid");
    assert!(is_process_alive(pid));
    assert_eq!(
        RunRecord::load(&relayer.paths().run_file).unwrap().unwrap().pid,
        pid
    );
    assert!(!relayer.paths().storage_dir.exists());

    let log = fs::read_to_string(&relayer.paths().log).unwrap();
    assert!(log.contains("--config-file"));
    assert!(log.contains(relayer.paths().config.to_str().unwrap()));

    relayer.stop().unwrap();
    wait_for_process_exit(pid);
    assert!(!relayer.paths().run_file.exists());
    assert_eq!(relayer.status().unwrap().state, RelayerState::Stopped);
    assert!(relayer.paths().log.exists());
}

#[test]
fn status_follows_the_lifecycle() {
    let temp = tempdir().unwrap();
    let relayer = relayer_under(temp.path());
    assert_eq!(relayer.status().unwrap().state, RelayerState::NotDeployed);

    install_fake_relayer(&relayer.paths().bin_dir, "v1.0.0", &healthy_relayer(&[]));
    assert_eq!(relayer.status().unwrap().state, RelayerState::Installed);

    write_config(&relayer, &[]);
    assert_eq!(relayer.status().unwrap().state, RelayerState::Configured);

    let installer = RelayerInstaller::new(OfflineDownloader);
    relayer.start_with(&installer, "latest", None).unwrap();
    assert_eq!(relayer.status().unwrap().state, RelayerState::Running);

    relayer.stop().unwrap();
    assert_eq!(relayer.status().unwrap().state, RelayerState::Stopped);
}

#[test]
fn start_and_stop_guard_their_preconditions() {
    let temp = tempdir().unwrap();
    let relayer = relayer_under(temp.path());
    let installer = RelayerInstaller::new(OfflineDownloader);
    install_fake_relayer(&relayer.paths().bin_dir, "v1.0.0", &healthy_relayer(&[]));

    assert!(matches!(
        relayer.stop(),
        Err(RelayerError::NotRunning { .. })
    ));
    assert!(matches!(
        relayer.start_with(&installer, "v1.0.0", None),
        Err(RelayerError::MissingConfig(_))
    ));

    write_config(&relayer, &[]);
    relayer.start_with(&installer, "v1.0.0", None).unwrap();
    let pid = relayer.status().unwrap().pid.unwrap();

    match relayer.start_with(&installer, "v1.0.0", None) {
        Err(RelayerError::AlreadyRunning { pid: running, .. }) => assert_eq!(running, pid),
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }

    relayer.stop().unwrap();
    assert!(matches!(
        relayer.stop(),
        Err(RelayerError::NotRunning { .. })
    ));
}

#[test]
fn deploy_replaces_a_running_relayer() {
    let temp = tempdir().unwrap();
    let relayer = relayer_under(temp.path());
    let installer = RelayerInstaller::new(OfflineDownloader);
    write_config(&relayer, &[]);
    install_fake_relayer(&relayer.paths().bin_dir, "v1.0.0", &healthy_relayer(&[]));

    relayer.deploy_with(&installer, "v1.0.0", None).unwrap();
    let first = relayer.status().unwrap().pid.unwrap();

    relayer.deploy_with(&installer, "v1.0.0", None).unwrap();
    let second = relayer.status().unwrap().pid.unwrap();

    assert_ne!(first, second);
    wait_for_process_exit(first);
    assert!(is_process_alive(second));

    relayer.stop().unwrap();
}

#[test]
fn explicit_binary_path_skips_installation() {
    let temp = tempdir().unwrap();
    let relayer = relayer_under(temp.path());
    let installer = RelayerInstaller::new(OfflineDownloader);
    write_config(&relayer, &["2CA6", "9XYZ"]);
    let custom = write_script(
        &temp.path().join("custom/relayer"),
        &healthy_relayer(&["2CA6", "9XYZ"]),
    );

    let used = relayer
        .deploy_with(&installer, "v9.9.9", Some(&custom))
        .unwrap();
    assert_eq!(used, custom);
    assert!(!relayer.paths().bin_dir.join("v9.9.9").exists());

    relayer.stop().unwrap();
}

#[test]
fn exit_during_grace_period_is_a_launch_failure() {
    let temp = tempdir().unwrap();
    let relayer = relayer_under(temp.path());
    let installer = RelayerInstaller::new(OfflineDownloader);
    write_config(&relayer, &[]);
    install_fake_relayer(
        &relayer.paths().bin_dir,
        "v1.0.0",
        "echo 'fatal: bad config' >&2\nexit 3",
    );

    match relayer.deploy_with(&installer, "v1.0.0", None) {
        Err(RelayerError::ExitedDuringSetup { status, log }) => {
            assert_eq!(status.code(), Some(3));
            assert_eq!(log, relayer.paths().log);
        }
        other => panic!("expected ExitedDuringSetup, got {other:?}"),
    }

    assert!(!relayer.paths().run_file.exists());
    let log = fs::read_to_string(&relayer.paths().log).unwrap();
    assert!(log.contains("fatal: bad config"));
}

#[test]
fn missing_listener_times_out_and_kills_the_relayer() {
    let temp = tempdir().unwrap();
    let pid_file = temp.path().join("relayer.pid");
    let relayer = relayer_under(temp.path()).with_launch_settings(LaunchSettings {
        init_timeout: Duration::from_millis(500),
        ..quick_launch()
    });
    let installer = RelayerInstaller::new(OfflineDownloader);
    write_config(&relayer, &["2CA6", "9XYZ"]);
    install_fake_relayer(
        &relayer.paths().bin_dir,
        "v1.0.0",
        &format!(
            "echo $$ > {}\necho 'level=info msg=\"Listener initialized\" blockchainID=2CA6'\nexec sleep 60",
            pid_file.display()
        ),
    );

    match relayer.deploy_with(&installer, "v1.0.0", None) {
        Err(RelayerError::InitializationTimeout {
            initialized,
            expected,
            ..
        }) => {
            assert_eq!(initialized, 1);
            assert_eq!(expected, 2);
        }
        other => panic!("expected InitializationTimeout, got {other:?}"),
    }

    let pid = read_pid(&pid_file);
    wait_for_process_exit(pid);
    assert!(!relayer.paths().run_file.exists());
}

#[test]
fn stale_run_file_is_cleared_before_deploy() {
    let temp = tempdir().unwrap();
    let relayer = relayer_under(temp.path());
    let installer = RelayerInstaller::new(OfflineDownloader);
    write_config(&relayer, &[]);
    install_fake_relayer(&relayer.paths().bin_dir, "v1.0.0", &healthy_relayer(&[]));

    let mut exited = std::process::Command::new("true").spawn().unwrap();
    let dead_pid = exited.id();
    exited.wait().unwrap();
    RunRecord::for_pid(dead_pid)
        .save(&relayer.paths().run_file)
        .unwrap();

    relayer.start_with(&installer, "v1.0.0", None).unwrap();
    let running = process::is_up(&relayer.paths().run_file)
        .unwrap()
        .expect("relayer should be running");
    assert_ne!(running.pid(), dead_pid);

    relayer.stop().unwrap();
}

#[test]
fn deploy_without_configuration_touches_nothing() {
    let temp = tempdir().unwrap();
    let relayer = relayer_under(temp.path());
    let installer = RelayerInstaller::new(OfflineDownloader);
    fs::create_dir_all(relayer.paths().storage_dir.join("db")).unwrap();

    match relayer.deploy_with(&installer, "v1.0.0", None) {
        Err(RelayerError::MissingConfig(path)) => assert_eq!(path, relayer.paths().config),
        other => panic!("expected MissingConfig, got {other:?}"),
    }

    assert!(relayer.paths().storage_dir.join("db").exists());
    assert!(!relayer.paths().bin_dir.exists());
    assert!(!relayer.paths().log.exists());
}

#[test]
fn unrecordable_launch_kills_the_relayer() {
    let temp = tempdir().unwrap();
    let pid_file = temp.path().join("relayer.pid");
    let relayer = relayer_under(temp.path());
    let installer = RelayerInstaller::new(OfflineDownloader);
    write_config(&relayer, &["2CA6"]);
    // A directory squatting on the run-file path makes the write fail, even as root.
    install_fake_relayer(
        &relayer.paths().bin_dir,
        "v1.0.0",
        &format!(
            "echo $$ > {}\nmkdir -p {}\n{}",
            pid_file.display(),
            relayer.paths().run_file.display(),
            healthy_relayer(&["2CA6"])
        ),
    );

    assert!(matches!(
        relayer.deploy_with(&installer, "v1.0.0", None),
        Err(RelayerError::RunFile(_))
    ));

    let pid = read_pid(&pid_file);
    wait_for_process_exit(pid);
    assert!(!is_process_alive(pid));
}
