#[path = "common/mod.rs"]
mod common;

use std::{
    fs,
    process::{Command, Stdio},
};

use common::is_process_alive;
use relayerctl::process::{self, Liveness, RunRecord};
use tempfile::tempdir;

#[test]
fn run_file_from_before_a_reboot_is_discarded() {
    let temp = tempdir().unwrap();
    let run_file = temp.path().join("relayer/local/run.json");

    let mut exited = Command::new("true").spawn().unwrap();
    let dead_pid = exited.id();
    exited.wait().unwrap();

    RunRecord {
        pid: dead_pid,
        started_at: Some(1_600_000_000),
    }
    .save(&run_file)
    .unwrap();

    assert!(process::is_up(&run_file).unwrap().is_none());
    assert!(!run_file.exists());
    assert!(process::is_up(&run_file).unwrap().is_none());
}

#[test]
fn run_file_naming_a_recycled_pid_is_discarded() {
    let temp = tempdir().unwrap();
    let run_file = temp.path().join("run.json");

    // Our own pid is alive, but it did not start at the recorded time.
    let record = RunRecord {
        pid: std::process::id(),
        started_at: Some(1),
    };
    assert_eq!(
        process::check_liveness(record.pid, record.started_at),
        Liveness::Reused
    );
    record.save(&run_file).unwrap();

    assert!(process::is_up(&run_file).unwrap().is_none());
    assert!(!run_file.exists());
}

#[test]
fn cleanup_ignores_a_run_file_naming_pid_zero() {
    let temp = tempdir().unwrap();
    let run_file = temp.path().join("run.json");
    let storage = temp.path().join("storage");
    fs::create_dir_all(&storage).unwrap();
    fs::write(&run_file, r#"{"pid":0}"#).unwrap();

    // Treating pid 0 as live would interrupt this test's own process group.
    process::cleanup(&run_file, &storage).unwrap();
    assert!(!run_file.exists());
    assert!(!storage.exists());
    assert!(process::is_up(&run_file).unwrap().is_none());
}

#[test]
fn cleanup_without_relayer_still_clears_storage() {
    let temp = tempdir().unwrap();
    let run_file = temp.path().join("run.json");
    let storage = temp.path().join("storage");
    fs::create_dir_all(storage.join("db")).unwrap();
    fs::write(storage.join("db/checkpoint"), "42").unwrap();

    process::cleanup(&run_file, &storage).unwrap();
    assert!(!storage.exists());

    process::cleanup(&run_file, &storage).unwrap();
    assert!(!run_file.exists());
}

#[test]
fn cleanup_stops_a_live_relayer() {
    let temp = tempdir().unwrap();
    let run_file = temp.path().join("run.json");
    let storage = temp.path().join("storage");
    fs::create_dir_all(&storage).unwrap();

    let mut child = Command::new("sleep")
        .arg("30")
        .stdout(Stdio::null())
        .spawn()
        .unwrap();
    let pid = child.id();
    RunRecord::for_pid(pid).save(&run_file).unwrap();

    let handle = process::is_up(&run_file)
        .unwrap()
        .expect("sleep should be up");
    assert_eq!(handle.pid(), pid);
    assert!(handle.started_at().is_some());

    process::cleanup(&run_file, &storage).unwrap();

    let status = child.wait().unwrap();
    assert!(!status.success());
    assert!(!run_file.exists());
    assert!(!storage.exists());
    assert!(!is_process_alive(pid));
}
