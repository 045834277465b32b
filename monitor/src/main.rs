mod cli;
mod error;
mod guard;
mod hw;
mod launch;
mod logging;
mod reboot;
mod runtime;
mod telemetry;

use clap::Parser;

use cli::Cli;
use error::MonitorError;

#[tokio::main]
async fn main() -> Result<(), MonitorError> {
    let cli = Cli::parse();
    logging::init_subscriber(cli.verbosity(), cli.log_file.as_deref())?;

    let result = runtime::run(&cli).await;
    if let Err(err) = &result {
        tracing::error!(error = %err, "ups-monitor exiting");
    }
    result
}
