use std::fmt::Display;
use std::time::Instant;

use tokio::time::{MissedTickBehavior, interval};
use tracing::info;
use ups_core::supervisor::{SessionGuard, SessionLauncher, Watchdog};
use ups_core::telemetry::TelemetryRecorder;

use crate::cli::{Cli, LaunchMode, WatchArgs};
use crate::error::MonitorError;
use crate::guard::{FlagGuard, SessionFlag};
use crate::hw::{HostSensor, SharedSensor};
use crate::launch::TaskLauncher;
use crate::reboot::CommandReboot;
use crate::telemetry::{TelemetryCursor, log_tick_error, log_tick_report};

/// Entry point for `ups-monitor watch`.
pub async fn run(cli: &Cli, args: &WatchArgs) -> Result<(), MonitorError> {
    let policy = args.session.policy()?;
    let sensor = HostSensor::from_args(&args.session.sensor)?;
    info!(
        sensor = %sensor.describe(),
        mode = ?args.mode,
        %policy,
        "starting power watchdog"
    );
    let sensor = SharedSensor::new(sensor);

    match args.mode {
        LaunchMode::Process => run_process_mode(cli, args, sensor, policy).await,
        LaunchMode::Task => {
            let flag = SessionFlag::new();
            let launcher = TaskLauncher::new(
                sensor.clone(),
                flag.clone(),
                CommandReboot::from_args(&args.session.reboot),
            );
            drive(Watchdog::new(sensor, FlagGuard::new(flag), launcher, policy)).await
        }
    }
}

#[cfg(target_os = "linux")]
async fn run_process_mode(
    cli: &Cli,
    args: &WatchArgs,
    sensor: SharedSensor,
    policy: ups_core::policy::WatchdogPolicy,
) -> Result<(), MonitorError> {
    use crate::guard::{ProcessTableGuard, SESSION_SUBCOMMAND};
    use crate::launch::ProcessLauncher;

    let program = std::env::current_exe().map_err(MonitorError::CurrentExe)?;
    let name = program
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut child_args = cli.forwarded_args();
    child_args.push(SESSION_SUBCOMMAND.into());
    child_args.extend(args.session.forwarded_args());

    let guard = ProcessTableGuard::new(name);
    let launcher = ProcessLauncher::new(program, child_args);
    drive(Watchdog::new(sensor, guard, launcher, policy)).await
}

#[cfg(not(target_os = "linux"))]
async fn run_process_mode(
    _cli: &Cli,
    _args: &WatchArgs,
    _sensor: SharedSensor,
    _policy: ups_core::policy::WatchdogPolicy,
) -> Result<(), MonitorError> {
    Err(MonitorError::ProcessModeUnsupported)
}

/// Ticks the watchdog every sample period until interrupted.
async fn drive<G, L>(mut watchdog: Watchdog<SharedSensor, G, L>) -> Result<(), MonitorError>
where
    G: SessionGuard,
    G::Error: Display,
    L: SessionLauncher<Instant = Instant>,
    L::Error: Display,
{
    let mut telemetry = TelemetryRecorder::<Instant>::new();
    let mut cursor = TelemetryCursor::default();
    let mut ticker = interval(watchdog.policy().sample_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; stopping power watchdog");
                return Ok(());
            }
        }

        match watchdog.tick(Instant::now(), &mut telemetry) {
            Ok(report) => log_tick_report(&report),
            Err(err) => log_tick_error(&err),
        }
        cursor.drain(&telemetry);
    }
}
