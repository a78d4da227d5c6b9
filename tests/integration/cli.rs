#[path = "common/mod.rs"]
mod common;

use std::{fs, path::Path};

use assert_cmd::Command;
use common::{healthy_relayer, wait_for_process_exit, write_script};
use predicates::prelude::*;
use relayerctl::process::RunRecord;
use tempfile::tempdir;

fn relayerctl(base: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("relayerctl"));
    cmd.current_dir(base)
        .env_remove("RUST_LOG")
        .arg("--base-dir")
        .arg(base.join("state"));
    cmd
}

fn add_chain_args(blockchain_id: &str, registry: &str) -> Vec<String> {
    [
        "config",
        "add-chain",
        "--rpc-endpoint",
        &format!("http://127.0.0.1:9650/ext/bc/{blockchain_id}/rpc"),
        "--subnet-id",
        "11111111111111111111111111111111LpoYY",
        "--blockchain-id",
        blockchain_id,
        "--registry-address",
        registry,
        "--messenger-address",
        "0x253b2784c75e510dD0fF1da844684a1aC0aa5fcf",
        "--reward-address",
        "0x8db97C7cEcE249c2b98bDC0226Cc4C2A57BF52FC",
        "--private-key",
        "56289e99c94b6912bfc12adc093c9b51124f0dc54ac7a766b2bc5ccf558d8027",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect()
}

#[test]
fn config_commands_build_the_routing_table() {
    let temp = tempdir().unwrap();
    let base = temp.path();

    relayerctl(base)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));
    relayerctl(base)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Keeping existing"));

    relayerctl(base)
        .args(add_chain_args("2CA6", "0x17aB05351fC94a1a67Bf3f56DdbB941aE6c63E25"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Added source 2CA6"))
        .stdout(predicate::str::contains("Added destination 2CA6"));

    relayerctl(base)
        .args(add_chain_args("2CA6", "0x0000000000000000000000000000000000001234"))
        .assert()
        .success()
        .stdout(predicate::str::contains("source 2CA6 kept as previously configured"));

    relayerctl(base)
        .args(["config", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"blockchain-id\": \"2CA6\""))
        .stdout(predicate::str::contains(
            "0x17aB05351fC94a1a67Bf3f56DdbB941aE6c63E25",
        ))
        .stdout(predicate::str::contains("0x0000000000000000000000000000000000001234").not())
        .stdout(predicate::str::contains("56289e99c94b6912bfc12adc093c9b51124f0dc54ac7a766b2bc5ccf558d8027").not())
        .stdout(predicate::str::contains("\"account-private-key\": \"<redacted>\""));

    let on_disk = fs::read_to_string(base.join("state/relayer/local/config.json")).unwrap();
    assert!(on_disk.contains("56289e99c94b6912bfc12adc093c9b51124f0dc54ac7a766b2bc5ccf558d8027"));
}

#[test]
fn devnet_requires_an_endpoint() {
    let temp = tempdir().unwrap();
    let base = temp.path();

    relayerctl(base)
        .args(["--network", "devnet", "config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("requires an explicit endpoint"));

    relayerctl(base)
        .args([
            "--network",
            "devnet",
            "--endpoint",
            "http://10.0.0.7:9650",
            "config",
            "init",
        ])
        .assert()
        .success();
    let config = fs::read_to_string(base.join("state/relayer/devnet/config.json")).unwrap();
    assert!(config.contains("http://10.0.0.7:9650"));
    assert!(config.contains("\"allow-private-ips\": true"));
}

#[test]
fn stop_and_start_report_missing_preconditions() {
    let temp = tempdir().unwrap();
    let base = temp.path();

    relayerctl(base)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("local: not deployed"));

    relayerctl(base)
        .arg("stop")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "there is no CLI-managed relayer running for local",
        ));

    relayerctl(base)
        .args(["start", "--bin-path", "/bin/true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no relayer configuration available"));
}

#[test]
fn deploy_status_logs_and_stop_round_trip() {
    let temp = tempdir().unwrap();
    let base = temp.path();
    let settings = base.join("relayerctl.yaml");
    fs::write(&settings, "launch:\n  setup_grace: \"300ms\"\n  init_timeout: \"5s\"\n").unwrap();
    let fake = write_script(&base.join("fake/icm-relayer"), &healthy_relayer(&["2CA6"]));

    relayerctl(base).args(["config", "init"]).assert().success();
    relayerctl(base)
        .args(add_chain_args("2CA6", "0x17aB05351fC94a1a67Bf3f56DdbB941aE6c63E25"))
        .assert()
        .success();

    relayerctl(base)
        .arg("deploy")
        .arg("--bin-path")
        .arg(&fake)
        .assert()
        .success();

    let run_file = base.join("state/relayer/local/run.json");
    let pid = RunRecord::load(&run_file).unwrap().unwrap().pid;

    relayerctl(base)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("local: running (PID {pid})")));

    relayerctl(base)
        .args(["logs", "--lines", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Listener initialized"))
        .stdout(predicate::str::contains("relayer starting").not());

    relayerctl(base)
        .arg("start")
        .arg("--bin-path")
        .arg(&fake)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already running"));

    relayerctl(base).arg("stop").assert().success();
    wait_for_process_exit(pid);
    assert!(!run_file.exists());

    relayerctl(base)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("local: stopped"));
}

#[test]
fn fund_rejects_a_malformed_funding_key() {
    let temp = tempdir().unwrap();
    relayerctl(temp.path())
        .env_remove("RELAYERCTL_FUNDING_KEY")
        .args([
            "fund",
            "--rpc-url",
            "http://127.0.0.1:9/ext/bc/C/rpc",
            "--funding-key",
            "0xnothex",
            "--address",
            "0x17aB05351fC94a1a67Bf3f56DdbB941aE6c63E25",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid funding key"))
        .stderr(predicate::str::contains("0xnothex").not());
}

#[test]
fn unknown_network_is_rejected() {
    let temp = tempdir().unwrap();
    relayerctl(temp.path())
        .args(["--network", "moon", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown network 'moon'"));
}
