use std::time::Instant;

use tokio::time::{MissedTickBehavior, interval};
use tracing::info;
use ups_core::policy::WatchdogPolicy;
use ups_core::session::SessionOutcome;
use ups_core::supervisor::{Escalation, SessionTick};
use ups_core::telemetry::TelemetryRecorder;

use crate::cli::SessionArgs;
use crate::error::MonitorError;
use crate::hw::{HostSensor, SharedSensor};
use crate::reboot::CommandReboot;
use crate::telemetry::{
    TelemetryCursor, log_session_error, log_session_outcome, log_session_tick,
};

/// Entry point for `ups-monitor escalate`.
pub async fn run(args: &SessionArgs) -> Result<(), MonitorError> {
    let policy = args.policy()?;
    let sensor = HostSensor::from_args(&args.sensor)?;
    info!(sensor = %sensor.describe(), "escalation session using sensor");

    run_session(
        SharedSensor::new(sensor),
        CommandReboot::from_args(&args.reboot),
        policy,
    )
    .await;
    Ok(())
}

/// Samples until the session triggers or its window closes.
pub async fn run_session(
    sensor: SharedSensor,
    actuator: CommandReboot,
    policy: WatchdogPolicy,
) -> SessionOutcome {
    let mut telemetry = TelemetryRecorder::<Instant>::new();
    let mut cursor = TelemetryCursor::default();
    let mut session = Escalation::start(sensor, actuator, &policy, Instant::now(), &mut telemetry);
    info!(
        %policy,
        "escalation session started; watching for repeated flicker"
    );

    let mut ticker = interval(policy.sample_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match session.tick(Instant::now(), &mut telemetry) {
            Ok(SessionTick::Finished(outcome)) => {
                cursor.drain(&telemetry);
                log_session_outcome(outcome);
                return outcome;
            }
            Ok(tick) => log_session_tick(&tick),
            Err(err) => log_session_error(&err),
        }
        cursor.drain(&telemetry);

        if let Some(outcome) = session.outcome()
            && outcome.is_reboot()
        {
            log_session_outcome(outcome);
            return outcome;
        }
    }
}
