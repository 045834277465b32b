use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;
use ups_core::power::ScriptError;

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unexpected reading {contents:?} in {path}")]
    Parse { path: PathBuf, contents: String },
    #[error("no ina219 hwmon device found under {0}")]
    NotFound(PathBuf),
    #[error("scripted sensor: {0}")]
    Script(ScriptError),
    #[error("sensor lock poisoned by a panicked reader")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum GuardError {
    #[cfg(target_os = "linux")]
    #[error("process table scan failed: {0}")]
    Scan(#[from] procfs::ProcError),
    #[cfg(not(target_os = "linux"))]
    #[error("process table inspection is only supported on Linux")]
    Unsupported,
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to spawn escalation session: {0}")]
    Spawn(#[source] io::Error),
    #[error("an escalation session is already running")]
    Busy,
}

#[derive(Debug, Error)]
pub enum RebootError {
    #[error("reboot command is empty")]
    EmptyCommand,
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` exited with {status}")]
    Failed { command: String, status: ExitStatus },
}

/// Startup failures returned from `main`. Once the loops run nothing is fatal.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("invalid --policy: {0}")]
    Policy(String),
    #[error(transparent)]
    Sensor(#[from] SensorError),
    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(String),
    #[error("failed to locate own executable: {0}")]
    CurrentExe(#[source] io::Error),
    #[error("process mode is only supported on Linux")]
    ProcessModeUnsupported,
}
