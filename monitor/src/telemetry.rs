//! Log lines for primary loop and session reports.

use std::fmt::Display;
use std::time::Instant;

use tracing::{debug, error, info, trace, warn};
use ups_core::detector::FlickerEvent;
use ups_core::session::{SessionOutcome, SessionStep};
use ups_core::supervisor::{SessionError, SessionTick, TickError, TickReport};
use ups_core::telemetry::{EventId, TelemetryPayload, TelemetryRecorder};

pub fn log_tick_report(report: &TickReport) {
    let TickReport::Sampled {
        sample,
        event,
        launched,
    } = report
    else {
        debug!("escalation session active; skipping tick");
        return;
    };

    info!(volts = sample.bus_volts, "power level {}", sample.level);

    match event {
        FlickerEvent::Steady => {}
        FlickerEvent::PowerDropped => {
            warn!(level = %sample.level, "power dropped below threshold");
        }
        FlickerEvent::Flicker { recovered_after } => {
            info!(
                level = %sample.level,
                recovered_after_ms = recovered_after.as_millis(),
                "power flicker detected"
            );
            if *launched {
                info!("escalation session launched");
            }
        }
        FlickerEvent::SlowRecovery { recovered_after } => {
            info!(
                level = %sample.level,
                recovered_after_ms = recovered_after.as_millis(),
                "power recovered after the grace window; not escalating"
            );
        }
        FlickerEvent::RecoveryTimedOut { waited } => {
            warn!(
                level = %sample.level,
                waited_ms = waited.as_millis(),
                "power still low; closing recovery window"
            );
        }
        FlickerEvent::PowerRestored => {
            info!(level = %sample.level, "power restored");
        }
    }
}

pub fn log_tick_error<S, G, L>(err: &TickError<S, G, L>)
where
    S: Display,
    G: Display,
    L: Display,
{
    match err {
        TickError::Sensor(source) => warn!(error = %source, "sensor read failed; retrying next tick"),
        TickError::Guard(source) => {
            error!(error = %source, "session guard query failed; skipping tick");
        }
        TickError::Launch { source, sample } => {
            info!(volts = sample.bus_volts, "power level {}", sample.level);
            info!(level = %sample.level, "power flicker detected");
            error!(error = %source, "failed to launch escalation session");
        }
    }
}

pub fn log_session_tick(tick: &SessionTick) {
    match tick {
        SessionTick::Sampled { sample, step } => {
            info!(volts = sample.bus_volts, "session power level {}", sample.level);
            match step {
                SessionStep::Holding | SessionStep::Finished(_) => {}
                SessionStep::Dropped => warn!(level = %sample.level, "session saw power drop"),
                SessionStep::Counted { transitions } => {
                    info!(transitions, "low-to-high transition counted");
                }
                SessionStep::Triggered {
                    transitions,
                    elapsed,
                } => error!(
                    transitions,
                    elapsed_ms = elapsed.as_millis(),
                    "power flicker repeated {transitions} times; triggering reboot"
                ),
            }
        }
        SessionTick::Finished(outcome) => log_session_outcome(*outcome),
    }
}

pub fn log_session_outcome(outcome: SessionOutcome) {
    match outcome {
        SessionOutcome::RebootTriggered { .. } => info!(%outcome, "escalation session finished"),
        SessionOutcome::TimedOut { transitions } => {
            info!(transitions, "observation window elapsed without reboot");
        }
    }
}

pub fn log_session_error<S, A>(err: &SessionError<S, A>)
where
    S: Display,
    A: Display,
{
    match err {
        SessionError::Sensor(source) => {
            warn!(error = %source, "session sensor read failed; retrying next tick");
        }
        SessionError::Reboot {
            source,
            transitions,
        } => error!(error = %source, transitions, "reboot command failed"),
    }
}

/// Emits ring entries at trace level as they are recorded.
#[derive(Debug, Default)]
pub struct TelemetryCursor {
    next: EventId,
}

impl TelemetryCursor {
    pub fn drain<const CAPACITY: usize>(&mut self, recorder: &TelemetryRecorder<Instant, CAPACITY>) {
        let start = self.next;
        for record in recorder.oldest_first().filter(|record| record.id >= start) {
            match record.details {
                TelemetryPayload::None => trace!(id = record.id, event = %record.event),
                TelemetryPayload::Power(power) => trace!(
                    id = record.id,
                    event = %record.event,
                    level = %power.level,
                    elapsed_ms = power.elapsed.map(|elapsed| elapsed.as_millis()),
                ),
                TelemetryPayload::Session(session) => trace!(
                    id = record.id,
                    event = %record.event,
                    transitions = session.transitions,
                    elapsed_ms = session.elapsed.map(|elapsed| elapsed.as_millis()),
                ),
            }
            self.next = record.id.wrapping_add(1);
        }
    }

    #[cfg(test)]
    pub fn next_id(&self) -> EventId {
        self.next
    }
}
