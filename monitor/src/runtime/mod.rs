//! Async loops behind the `watch` and `escalate` subcommands.

pub mod session_task;
pub mod watch_task;

use crate::cli::{Cli, Command};
use crate::error::MonitorError;

pub async fn run(cli: &Cli) -> Result<(), MonitorError> {
    match &cli.command {
        Command::Watch(args) => watch_task::run(cli, args).await,
        Command::Escalate(args) => session_task::run(args).await,
    }
}
