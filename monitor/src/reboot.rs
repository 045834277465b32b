use std::process::Command;

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::block_in_place;
use tracing::{error, warn};
use ups_core::supervisor::RebootActuator;

use crate::cli::RebootArgs;
use crate::error::RebootError;

/// Runs a configured command to reboot the host.
#[derive(Clone, Debug)]
pub struct CommandReboot {
    command: String,
    dry_run: bool,
}

impl CommandReboot {
    pub fn new(command: impl Into<String>, dry_run: bool) -> Self {
        Self {
            command: command.into(),
            dry_run,
        }
    }

    pub fn from_args(args: &RebootArgs) -> Self {
        Self::new(args.reboot_command.clone(), args.dry_run)
    }
}

impl RebootActuator for CommandReboot {
    type Error = RebootError;

    fn reboot(&mut self) -> Result<(), Self::Error> {
        let mut words = self.command.split_whitespace();
        let program = words.next().ok_or(RebootError::EmptyCommand)?;

        if self.dry_run {
            warn!(command = %self.command, "dry run: skipping reboot command");
            return Ok(());
        }

        error!(command = %self.command, "rebooting host");
        let run = || Command::new(program).args(words).status();
        // Sessions may run as tasks; keep the blocking wait off the worker.
        let status = match Handle::try_current() {
            Ok(handle) if matches!(handle.runtime_flavor(), RuntimeFlavor::MultiThread) => {
                block_in_place(run)
            }
            _ => run(),
        }
        .map_err(|source| RebootError::Spawn {
            command: self.command.clone(),
            source,
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(RebootError::Failed {
                command: self.command.clone(),
                status,
            })
        }
    }
}
