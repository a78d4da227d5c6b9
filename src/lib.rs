//! relayerctl installs, configures and runs an interchain message relayer on
//! Unix-like hosts. It downloads versioned relayer binaries, maintains the relayer's
//! JSON routing configuration, launches the relayer as a detached process tracked by
//! a run-file, and stops it again with a graceful-then-forceful shutdown.

/// CLI interface.
pub mod cli;

/// Settings file management.
pub mod config;

/// File names, timings and well-known values.
pub mod constants;

/// Error handling.
pub mod error;

/// Funding of the relayer's delivery account.
pub mod funding;

/// Relayer binary installation.
pub mod installer;

/// Logs management.
pub mod logs;

/// Networks the relayer can serve.
pub mod network;

/// Run-file and relayer process handle.
pub mod process;

/// Relayer lifecycle manager.
pub mod relayer;

/// Relayer routing configuration store.
pub mod relayer_config;

/// Runtime directory layout.
pub mod runtime;

#[doc(hidden)]
pub mod test_utils;
