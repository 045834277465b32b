//! Escalation session driver.
//!
//! Wraps a [`RepeatCounter`] together with its own sampler and the reboot
//! actuator. The actuator is called at most once, on the tick that reaches
//! the repeat target.

use core::fmt;

use crate::policy::WatchdogPolicy;
use crate::power::{PowerSample, PowerSampler, VoltageSensor};
use crate::session::{RepeatCounter, SessionOutcome, SessionStep};
use crate::telemetry::{
    SessionTelemetry, TelemetryEventKind, TelemetryPayload, TelemetryRecorder,
};
use crate::time::MonotonicInstant;

use super::RebootActuator;

/// Result of a session tick that ran to completion.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SessionTick {
    Sampled { sample: PowerSample, step: SessionStep },
    /// The session has ended; no sample was taken.
    Finished(SessionOutcome),
}

#[derive(Debug, PartialEq)]
pub enum SessionError<S, A> {
    /// The sensor read failed; the counter is unchanged.
    Sensor(S),
    /// The reboot request failed. The session still ends as triggered.
    Reboot { source: A, transitions: u8 },
}

impl<S, A> fmt::Display for SessionError<S, A>
where
    S: fmt::Display,
    A: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Sensor(err) => write!(f, "sensor read failed: {err}"),
            SessionError::Reboot {
                source,
                transitions,
            } => write!(
                f,
                "reboot after {transitions} transitions failed: {source}"
            ),
        }
    }
}

pub struct Escalation<S, A, I> {
    sampler: PowerSampler<S>,
    actuator: A,
    counter: RepeatCounter<I>,
}

impl<S, A, I> Escalation<S, A, I>
where
    S: VoltageSensor,
    A: RebootActuator,
    I: MonotonicInstant,
{
    /// Starts a session at `now` and records it.
    pub fn start<const CAPACITY: usize>(
        sensor: S,
        actuator: A,
        policy: &WatchdogPolicy,
        now: I,
        telemetry: &mut TelemetryRecorder<I, CAPACITY>,
    ) -> Self {
        telemetry.record(
            TelemetryEventKind::SessionStarted,
            TelemetryPayload::Session(SessionTelemetry::new(0, None)),
            now,
        );

        Self {
            sampler: PowerSampler::new(sensor),
            actuator,
            counter: RepeatCounter::start(policy, now),
        }
    }

    #[must_use]
    pub fn counter(&self) -> &RepeatCounter<I> {
        &self.counter
    }

    #[must_use]
    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.counter.is_finished()
    }

    #[must_use]
    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.counter.outcome()
    }

    #[must_use]
    pub fn deadline(&self) -> I {
        self.counter.deadline()
    }

    #[must_use]
    pub fn into_parts(self) -> (S, A) {
        (self.sampler.into_inner(), self.actuator)
    }

    /// Runs one session iteration at `now`.
    pub fn tick<const CAPACITY: usize>(
        &mut self,
        now: I,
        telemetry: &mut TelemetryRecorder<I, CAPACITY>,
    ) -> Result<SessionTick, SessionError<S::Error, A::Error>> {
        if let Some(outcome) = self.counter.outcome() {
            return Ok(SessionTick::Finished(outcome));
        }
        if let Some(outcome) = self.counter.poll_deadline(now) {
            telemetry.record_session_outcome(outcome, self.counter.started_at(), now);
            return Ok(SessionTick::Finished(outcome));
        }

        let sample = match self.sampler.sample() {
            Ok(sample) => sample,
            Err(err) => {
                telemetry.record(TelemetryEventKind::SensorFault, TelemetryPayload::None, now);
                return Err(SessionError::Sensor(err));
            }
        };

        let step = self.counter.observe(sample.level, now);
        telemetry.record_session_step(step, now);

        if let SessionStep::Triggered { transitions, .. } = step {
            if let Err(source) = self.actuator.reboot() {
                telemetry.record(
                    TelemetryEventKind::RebootFailed,
                    TelemetryPayload::Session(SessionTelemetry::new(transitions, None)),
                    now,
                );
                return Err(SessionError::Reboot {
                    source,
                    transitions,
                });
            }
        }

        Ok(SessionTick::Sampled { sample, step })
    }
}
