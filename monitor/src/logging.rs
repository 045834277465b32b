//! Tracing subscriber initialization for the monitor binary.
//!
//! # Priority (highest to lowest)
//!
//! 1. `UPS_MONITOR_LOG` env var (per-target directives, e.g. `ups_monitor=debug,warn`)
//! 2. `RUST_LOG` env var
//! 3. CLI flags (`-v` → debug, `-q` → error)
//! 4. Default level: `info`

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::error::MonitorError;

pub const LOG_ENV: &str = "UPS_MONITOR_LOG";

/// Verbosity level derived from CLI flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    #[must_use]
    pub const fn from_flags(verbose: bool, quiet: bool) -> Self {
        if verbose {
            Self::Verbose
        } else if quiet {
            Self::Quiet
        } else {
            Self::Normal
        }
    }

    #[must_use]
    pub const fn default_level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
        }
    }
}

/// Installs the global subscriber. Call once, before the runtime starts work.
pub fn init_subscriber(verbosity: Verbosity, log_file: Option<&Path>) -> Result<(), MonitorError> {
    let filter = build_env_filter(verbosity, std::env::var(LOG_ENV).ok().as_deref());

    let installed = match log_file {
        Some(path) => {
            let file = open_log_file(path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(Mutex::new(file))
                        .with_ansi(false)
                        .with_target(false),
                )
                .try_init()
        }
        None => {
            let use_ansi = std::io::IsTerminal::is_terminal(&std::io::stderr());
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_ansi(use_ansi)
                        .with_target(false),
                )
                .try_init()
        }
    };

    installed.map_err(|err| MonitorError::Subscriber(err.to_string()))
}

/// Opens `path` for appending, creating missing parent directories.
fn open_log_file(path: &Path) -> Result<File, MonitorError> {
    let log_error = |source: std::io::Error| MonitorError::LogFile {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(log_error)?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(log_error)
}

/// Builds the filter from the project variable, then `RUST_LOG`, then flags.
fn build_env_filter(verbosity: Verbosity, project_directives: Option<&str>) -> EnvFilter {
    // An unparseable project variable falls through rather than failing startup.
    if let Some(directives) = project_directives
        && let Ok(filter) = EnvFilter::try_new(directives)
    {
        return filter;
    }

    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    EnvFilter::new(verbosity.default_level().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_wins_over_quiet() {
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::Verbose);
        assert_eq!(Verbosity::from_flags(false, true), Verbosity::Quiet);
        assert_eq!(Verbosity::from_flags(false, false), Verbosity::Normal);
    }

    #[test]
    fn default_level_is_info() {
        assert_eq!(Verbosity::Normal.default_level(), Level::INFO);
        assert_eq!(Verbosity::Verbose.default_level(), Level::DEBUG);
        assert_eq!(Verbosity::Quiet.default_level(), Level::ERROR);
    }

    #[test]
    fn log_file_parent_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("nested").join("ups-monitor.log");

        open_log_file(&path).expect("log file opens under a fresh directory");
        assert!(path.is_file());

        open_log_file(&path).expect("existing log file is reopened for append");
    }

    #[test]
    fn project_directives_take_priority() {
        let filter = build_env_filter(Verbosity::Quiet, Some("ups_monitor=trace"));
        assert!(filter.to_string().contains("ups_monitor=trace"));
    }
}
