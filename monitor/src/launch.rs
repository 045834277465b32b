//! Escalation session launchers.
//!
//! Both launchers return as soon as the session is started. A launched session
//! is never joined by the primary loop; coordination goes through the guard.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use tracing::{debug, info, warn};
use ups_core::supervisor::{LaunchRequest, SessionLauncher};

use crate::error::LaunchError;
use crate::guard::{SESSION_SUBCOMMAND, SessionFlag};
use crate::hw::SharedSensor;
use crate::reboot::CommandReboot;
use crate::runtime::session_task;

/// Starts `<program> ... escalate ... --policy <policy>` as a child process.
#[derive(Debug)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ProcessLauncher {
    /// `args` must already contain the session subcommand and its sensor and
    /// reboot flags; the policy is appended per launch.
    pub fn new(program: PathBuf, args: Vec<OsString>) -> Self {
        debug_assert!(args.iter().any(|arg| arg == SESSION_SUBCOMMAND));
        Self { program, args }
    }

    pub fn command_line(&self, request: &LaunchRequest<Instant>) -> Vec<OsString> {
        let mut args = self.args.clone();
        args.push("--policy".into());
        args.push(request.policy.to_string().into());
        args
    }
}

impl SessionLauncher for ProcessLauncher {
    type Instant = Instant;
    type Error = LaunchError;

    fn launch(&mut self, request: LaunchRequest<Instant>) -> Result<(), Self::Error> {
        let mut child = tokio::process::Command::new(&self.program)
            .args(self.command_line(&request))
            .stdin(Stdio::null())
            .spawn()
            .map_err(LaunchError::Spawn)?;

        let pid = child.id();
        info!(
            ?pid,
            recovered_after_ms = request.recovered_after.as_millis(),
            "escalation session process started"
        );

        // Reap the child so the guard never sees it linger as a zombie.
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!(?pid, %status, "escalation session process exited"),
                Err(err) => warn!(?pid, error = %err, "failed to wait for escalation session"),
            }
        });

        Ok(())
    }
}

/// Runs sessions as detached tasks sharing this process's sensor.
#[derive(Debug)]
pub struct TaskLauncher {
    sensor: SharedSensor,
    flag: SessionFlag,
    actuator: CommandReboot,
}

impl TaskLauncher {
    pub fn new(sensor: SharedSensor, flag: SessionFlag, actuator: CommandReboot) -> Self {
        Self {
            sensor,
            flag,
            actuator,
        }
    }
}

impl SessionLauncher for TaskLauncher {
    type Instant = Instant;
    type Error = LaunchError;

    fn launch(&mut self, request: LaunchRequest<Instant>) -> Result<(), Self::Error> {
        let token = self.flag.try_claim().ok_or(LaunchError::Busy)?;
        let sensor = self.sensor.clone();
        let actuator = self.actuator.clone();
        let policy = request.policy;

        info!(
            recovered_after_ms = request.recovered_after.as_millis(),
            "escalation session task started"
        );
        tokio::spawn(async move {
            let _token = token;
            session_task::run_session(sensor, actuator, policy).await;
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ups_core::policy::DEFAULT_POLICY;
    use ups_core::power::ScriptedSensor;

    use super::*;
    use crate::hw::HostSensor;

    fn request() -> LaunchRequest<Instant> {
        LaunchRequest {
            requested_at: Instant::now(),
            recovered_after: Duration::from_secs(2),
            policy: DEFAULT_POLICY,
        }
    }

    #[test]
    fn process_command_line_carries_the_policy() {
        let launcher = ProcessLauncher::new(
            PathBuf::from("/usr/bin/ups-monitor"),
            vec!["escalate".into(), "--dry-run".into()],
        );

        let args = launcher.command_line(&request());
        assert_eq!(
            args,
            vec![
                OsString::from("escalate"),
                OsString::from("--dry-run"),
                OsString::from("--policy"),
                OsString::from(DEFAULT_POLICY.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn task_launcher_refuses_a_second_session() {
        let sensor = SharedSensor::new(HostSensor::Script(ScriptedSensor::new(vec![12.6])));
        let flag = SessionFlag::new();
        let mut launcher =
            TaskLauncher::new(sensor, flag.clone(), CommandReboot::new("true", true));

        launcher.launch(request()).expect("first launch succeeds");
        assert!(flag.is_set());
        assert!(matches!(launcher.launch(request()), Err(LaunchError::Busy)));
    }
}
