//! Run-file tracking, liveness checks and shutdown of the detached relayer process.
//!
//! The CLI exits right after launching the relayer, so there is no parent/child
//! relationship to lean on: every check re-derives liveness from the OS using the pid
//! (and start time) recorded in the run-file.
use std::{
    fs,
    io::ErrorKind,
    os::unix::fs::PermissionsExt,
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread,
    time::{Duration, Instant},
};

use nix::{
    errno::Errno,
    sys::signal::{self, Signal},
    unistd::Pid,
};
use serde::{Deserialize, Serialize};
use sysinfo::{ProcessStatus, ProcessesToUpdate, System};
use tracing::{debug, info, warn};

use crate::{
    constants::{RELAYER_CHECK_INTERVAL, RELAYER_STOP_TIMEOUT, STATE_FILE_MODE},
    error::{ProcessError, RunFileError},
};

/// Start times read through different snapshots may disagree by rounding.
const START_TIME_TOLERANCE_SECS: u64 = 1;

/// Contents of the relayer run-file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRecord {
    /// PID of the relayer process.
    pub pid: u32,
    /// Process start time (seconds since the epoch) captured at launch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
}

impl RunRecord {
    /// Builds a record for `pid`, capturing its start time when the OS exposes it.
    pub fn for_pid(pid: u32) -> Self {
        Self {
            pid,
            started_at: process_start_time(pid),
        }
    }

    /// Loads the run-file, returning `None` when it does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, RunFileError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(RunFileError::ReadError {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| RunFileError::ParseError {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Writes the run-file, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), RunFileError> {
        let write_error = |source| RunFileError::WriteError {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_error)?;
        }
        let payload = serde_json::to_vec(self).map_err(|err| write_error(err.into()))?;
        fs::write(path, payload).map_err(write_error)?;
        fs::set_permissions(path, fs::Permissions::from_mode(STATE_FILE_MODE))
            .map_err(write_error)?;
        Ok(())
    }
}

/// Removes the run-file.
pub fn remove_run_file(path: &Path) -> Result<(), RunFileError> {
    fs::remove_file(path).map_err(|source| RunFileError::RemoveError {
        path: path.to_path_buf(),
        source,
    })
}

/// Outcome of checking a recorded pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// The recorded process is running.
    Alive,
    /// No process answers to the pid, or it is a zombie.
    Gone,
    /// A different process now owns the pid.
    Reused,
}

/// Start time of `pid` in seconds since the epoch, if the process table exposes it.
pub fn process_start_time(pid: u32) -> Option<u64> {
    let target = sysinfo::Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
    system.process(target).map(|process| process.start_time())
}

/// Checks `pid` with signal 0 and cross-checks the process table.
///
/// Acquiring a pid can succeed for a recycled identifier after a reboot, so when a
/// start time was recorded it must match the live process as well. Pid 0 never names
/// a relayer: signalling it would reach the caller's own process group.
pub fn check_liveness(pid: u32, started_at: Option<u64>) -> Liveness {
    let Ok(raw) = i32::try_from(pid) else {
        return Liveness::Gone;
    };
    if raw == 0 {
        return Liveness::Gone;
    }

    if let Err(err) = signal::kill(Pid::from_raw(raw), None) {
        debug!("Signal 0 to PID {pid} failed: {err}");
        return Liveness::Gone;
    }

    let target = sysinfo::Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
    let Some(process) = system.process(target) else {
        debug!("PID {pid} accepted a signal but is missing from the process table");
        return Liveness::Gone;
    };

    if matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead) {
        return Liveness::Gone;
    }

    match started_at {
        Some(expected) if process.start_time().abs_diff(expected) > START_TIME_TOLERANCE_SECS => {
            Liveness::Reused
        }
        _ => Liveness::Alive,
    }
}

/// Handle to a relayer process that was confirmed alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayerProcess {
    record: RunRecord,
}

impl RelayerProcess {
    /// PID of the relayer.
    pub fn pid(&self) -> u32 {
        self.record.pid
    }

    /// Recorded start time of the relayer.
    pub fn started_at(&self) -> Option<u64> {
        self.record.started_at
    }

    /// Re-checks the process.
    pub fn is_alive(&self) -> bool {
        check_liveness(self.record.pid, self.record.started_at) == Liveness::Alive
    }

    fn nix_pid(&self) -> Pid {
        Pid::from_raw(self.record.pid as i32)
    }

    /// Sends SIGINT. A process that already vanished counts as delivered.
    pub fn interrupt(&self) -> Result<(), Errno> {
        match signal::kill(self.nix_pid(), Signal::SIGINT) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Sends SIGKILL. A process that already vanished counts as killed.
    pub fn kill(&self) -> Result<(), Errno> {
        match signal::kill(self.nix_pid(), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Polls until the process is gone or `timeout` elapses.
    pub fn wait_for_exit(&self, timeout: Duration, interval: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_alive() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(interval);
        }
    }
}

/// Resolves whether the relayer recorded in `run_file` is running.
///
/// A missing run-file is not an error. A run-file whose process is gone (for example
/// after a reboot without cleanup) is removed and reported as not running.
pub fn is_up(run_file: &Path) -> Result<Option<RelayerProcess>, RunFileError> {
    let Some(record) = RunRecord::load(run_file)? else {
        return Ok(None);
    };

    match check_liveness(record.pid, record.started_at) {
        Liveness::Alive => Ok(Some(RelayerProcess { record })),
        liveness => {
            warn!(
                "Relayer PID {} from {} is no longer running ({liveness:?}); removing stale run file",
                record.pid,
                run_file.display()
            );
            remove_run_file(run_file)?;
            Ok(None)
        }
    }
}

/// Removes the relayer storage directory and stops the relayer if it is running.
pub fn cleanup(run_file: &Path, storage_dir: &Path) -> Result<(), ProcessError> {
    match fs::remove_dir_all(storage_dir) {
        Ok(()) => debug!("Removed relayer storage {}", storage_dir.display()),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(source) => {
            return Err(ProcessError::StorageError {
                path: storage_dir.to_path_buf(),
                source,
            });
        }
    }

    let Some(process) = is_up(run_file)? else {
        return Ok(());
    };

    terminate(&process, RELAYER_STOP_TIMEOUT, RELAYER_CHECK_INTERVAL)?;
    remove_run_file(run_file)?;
    Ok(())
}

/// Interrupts `process`, escalating to SIGKILL when it outlives `timeout`.
///
/// Liveness is polled on a scoped thread that is always joined before returning.
pub fn terminate(
    process: &RelayerProcess,
    timeout: Duration,
    interval: Duration,
) -> Result<(), ProcessError> {
    let pid = process.pid();
    let finished = AtomicBool::new(false);
    let (exited_tx, exited_rx) = mpsc::channel::<()>();

    let outcome = thread::scope(|scope| {
        scope.spawn(|| {
            while !finished.load(Ordering::SeqCst) {
                if !process.is_alive() {
                    let _ = exited_tx.send(());
                    return;
                }
                thread::sleep(interval);
            }
        });

        let outcome = interrupt_then_kill(process, &exited_rx, timeout);
        finished.store(true, Ordering::SeqCst);
        outcome
    });
    outcome?;

    if !process.wait_for_exit(timeout, interval) {
        return Err(ProcessError::StillRunning { pid });
    }

    info!("Relayer process {pid} stopped");
    Ok(())
}

fn interrupt_then_kill(
    process: &RelayerProcess,
    exited: &mpsc::Receiver<()>,
    timeout: Duration,
) -> Result<(), ProcessError> {
    let pid = process.pid();
    debug!("Sending SIGINT to relayer PID {pid}");
    process
        .interrupt()
        .map_err(|source| ProcessError::InterruptError { pid, source })?;

    if exited.recv_timeout(timeout).is_ok() {
        return Ok(());
    }

    warn!("Relayer PID {pid} did not exit after SIGINT; sending SIGKILL");
    process
        .kill()
        .map_err(|source| ProcessError::KillError { pid, source })
}
