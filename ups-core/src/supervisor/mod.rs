//! Collaborator traits and the primary loop tick driver.
//!
//! The daemon and the emulator provide concrete guards, launchers and reboot
//! actuators that satisfy these traits while reusing the detector and
//! session logic housed in `ups-core`. A [`Watchdog`] owns everything the
//! primary loop needs; callers only supply timestamps and sleep between ticks.

use core::{fmt, time::Duration};

use crate::detector::{FlickerDetector, FlickerEvent};
use crate::policy::WatchdogPolicy;
use crate::power::{PowerSample, PowerSampler, VoltageSensor};
use crate::telemetry::{TelemetryEventKind, TelemetryPayload, TelemetryRecorder};
use crate::time::MonotonicInstant;

pub mod escalation;

pub use escalation::{Escalation, SessionError, SessionTick};

/// Liveness check ensuring at most one escalation session runs.
pub trait SessionGuard {
    /// Inspection failure. Never read as "no session".
    type Error;

    fn session_active(&mut self) -> Result<bool, Self::Error>;
}

/// Parameters handed to a freshly launched session.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LaunchRequest<I> {
    pub requested_at: I,
    /// How long the triggering flicker stayed below the threshold.
    pub recovered_after: Duration,
    pub policy: WatchdogPolicy,
}

/// Fire-and-forget starter for escalation sessions.
pub trait SessionLauncher {
    /// Monotonic timestamp type shared with the detector.
    type Instant: MonotonicInstant;
    type Error;

    fn launch(&mut self, request: LaunchRequest<Self::Instant>) -> Result<(), Self::Error>;
}

/// Final action taken when a session reaches its repeat target.
pub trait RebootActuator {
    type Error;

    fn reboot(&mut self) -> Result<(), Self::Error>;
}

impl<A: RebootActuator + ?Sized> RebootActuator for &mut A {
    type Error = A::Error;

    fn reboot(&mut self) -> Result<(), Self::Error> {
        (**self).reboot()
    }
}

/// Result of a primary loop tick that ran to completion.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TickReport {
    /// A session is running; nothing was sampled.
    SessionActive,
    Sampled {
        sample: PowerSample,
        event: FlickerEvent,
        /// A session was launched for this sample.
        launched: bool,
    },
}

/// Failures that end a primary tick early. None of them stop the loop.
#[derive(Debug, PartialEq)]
pub enum TickError<S, G, L> {
    /// The sensor read failed; detector state is unchanged.
    Sensor(S),
    /// The guard query failed; the whole tick was skipped.
    Guard(G),
    /// The flicker was detected but the session could not be started. The
    /// recovery window is closed as if the launch had succeeded.
    Launch { source: L, sample: PowerSample },
}

impl<S, G, L> fmt::Display for TickError<S, G, L>
where
    S: fmt::Display,
    G: fmt::Display,
    L: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickError::Sensor(err) => write!(f, "sensor read failed: {err}"),
            TickError::Guard(err) => write!(f, "session guard query failed: {err}"),
            TickError::Launch { source, sample } => write!(
                f,
                "session launch failed at {}: {source}",
                sample.level
            ),
        }
    }
}

/// Errors returned by [`Watchdog::tick`] for a given set of collaborators.
pub type WatchdogError<S, G, L> = TickError<
    <S as VoltageSensor>::Error,
    <G as SessionGuard>::Error,
    <L as SessionLauncher>::Error,
>;

/// Primary loop driver: guard check, sample, detect, launch.
pub struct Watchdog<S, G, L>
where
    L: SessionLauncher,
{
    sampler: PowerSampler<S>,
    guard: G,
    launcher: L,
    detector: FlickerDetector<L::Instant>,
    policy: WatchdogPolicy,
}

impl<S, G, L> Watchdog<S, G, L>
where
    S: VoltageSensor,
    G: SessionGuard,
    L: SessionLauncher,
{
    #[must_use]
    pub fn new(sensor: S, guard: G, launcher: L, policy: WatchdogPolicy) -> Self {
        Self {
            sampler: PowerSampler::new(sensor),
            guard,
            launcher,
            detector: FlickerDetector::new(&policy),
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &WatchdogPolicy {
        &self.policy
    }

    #[must_use]
    pub fn detector(&self) -> &FlickerDetector<L::Instant> {
        &self.detector
    }

    #[must_use]
    pub fn guard(&self) -> &G {
        &self.guard
    }

    pub fn guard_mut(&mut self) -> &mut G {
        &mut self.guard
    }

    #[must_use]
    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn launcher_mut(&mut self) -> &mut L {
        &mut self.launcher
    }

    pub fn sampler_mut(&mut self) -> &mut PowerSampler<S> {
        &mut self.sampler
    }

    /// Runs one primary loop iteration at `now`.
    pub fn tick<const CAPACITY: usize>(
        &mut self,
        now: L::Instant,
        telemetry: &mut TelemetryRecorder<L::Instant, CAPACITY>,
    ) -> Result<TickReport, WatchdogError<S, G, L>> {
        match self.guard.session_active() {
            Ok(true) => return Ok(TickReport::SessionActive),
            Ok(false) => {}
            Err(err) => {
                telemetry.record(TelemetryEventKind::GuardFault, TelemetryPayload::None, now);
                return Err(TickError::Guard(err));
            }
        }

        let sample = match self.sampler.sample() {
            Ok(sample) => sample,
            Err(err) => {
                telemetry.record(TelemetryEventKind::SensorFault, TelemetryPayload::None, now);
                return Err(TickError::Sensor(err));
            }
        };

        let event = self.detector.observe(sample.level, now);
        telemetry.record_flicker_event(event, sample.level, now);

        let FlickerEvent::Flicker { recovered_after } = event else {
            return Ok(TickReport::Sampled {
                sample,
                event,
                launched: false,
            });
        };

        let request = LaunchRequest {
            requested_at: now,
            recovered_after,
            policy: self.policy,
        };
        match self.launcher.launch(request) {
            Ok(()) => {
                telemetry.record(
                    TelemetryEventKind::SessionLaunched,
                    TelemetryPayload::None,
                    now,
                );
                Ok(TickReport::Sampled {
                    sample,
                    event,
                    launched: true,
                })
            }
            Err(source) => {
                telemetry.record(TelemetryEventKind::LaunchFailed, TelemetryPayload::None, now);
                Err(TickError::Launch { source, sample })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::DEFAULT_POLICY;
    use crate::power::{PowerState, ScriptError, ScriptedSensor};
    use crate::time::mock::MockInstant;

    /// Bus voltage that maps to `percent`.
    fn volts(percent: f32) -> f32 {
        crate::power::EMPTY_BUS_VOLTS + crate::power::BUS_VOLTS_SPAN * percent / 100.0
    }

    struct ToggleGuard {
        active: bool,
        fail: bool,
    }

    impl SessionGuard for ToggleGuard {
        type Error = &'static str;

        fn session_active(&mut self) -> Result<bool, Self::Error> {
            if self.fail {
                Err("ps unavailable")
            } else {
                Ok(self.active)
            }
        }
    }

    #[derive(Default)]
    struct RecordingLauncher {
        launched: usize,
        refuse: bool,
    }

    impl SessionLauncher for RecordingLauncher {
        type Instant = MockInstant;
        type Error = &'static str;

        fn launch(&mut self, _request: LaunchRequest<MockInstant>) -> Result<(), Self::Error> {
            if self.refuse {
                return Err("spawn failed");
            }
            self.launched += 1;
            Ok(())
        }
    }

    type TestWatchdog = Watchdog<
        ScriptedSensor<core::array::IntoIter<f32, 4>>,
        ToggleGuard,
        RecordingLauncher,
    >;

    fn watchdog(percents: [f32; 4]) -> TestWatchdog {
        Watchdog::new(
            ScriptedSensor::new(percents.map(volts)),
            ToggleGuard {
                active: false,
                fail: false,
            },
            RecordingLauncher::default(),
            DEFAULT_POLICY,
        )
    }

    #[test]
    fn active_session_skips_sampling() {
        let mut watchdog = watchdog([50.0, 50.0, 50.0, 50.0]);
        let mut telemetry = TelemetryRecorder::<MockInstant>::new();
        watchdog.guard_mut().active = true;

        let report = watchdog.tick(MockInstant::secs(0), &mut telemetry);
        assert_eq!(report, Ok(TickReport::SessionActive));
        assert_eq!(watchdog.detector().state(), PowerState::High);
        assert!(telemetry.is_empty());
    }

    #[test]
    fn guard_failure_keeps_the_window_open() {
        let mut watchdog = watchdog([100.0, 60.0, 90.0, 90.0]);
        let mut telemetry = TelemetryRecorder::<MockInstant>::new();

        watchdog.tick(MockInstant::secs(0), &mut telemetry).unwrap();
        watchdog.tick(MockInstant::secs(2), &mut telemetry).unwrap();

        watchdog.guard_mut().fail = true;
        let err = watchdog
            .tick(MockInstant::secs(4), &mut telemetry)
            .unwrap_err();
        assert_eq!(err, TickError::Guard("ps unavailable"));
        assert!(watchdog.detector().is_window_open());

        watchdog.guard_mut().fail = false;
        let report = watchdog.tick(MockInstant::secs(6), &mut telemetry).unwrap();
        assert!(matches!(report, TickReport::Sampled { launched: true, .. }));
    }

    #[test]
    fn launch_failure_closes_the_window() {
        let mut watchdog = watchdog([100.0, 60.0, 90.0, 90.0]);
        let mut telemetry = TelemetryRecorder::<MockInstant>::new();
        watchdog.launcher_mut().refuse = true;

        watchdog.tick(MockInstant::secs(0), &mut telemetry).unwrap();
        watchdog.tick(MockInstant::secs(2), &mut telemetry).unwrap();
        let err = watchdog
            .tick(MockInstant::secs(4), &mut telemetry)
            .unwrap_err();

        assert!(matches!(err, TickError::Launch { source: "spawn failed", .. }));
        assert!(!watchdog.detector().is_window_open());
        assert_eq!(watchdog.detector().state(), PowerState::High);
        assert_eq!(
            telemetry.latest().map(|record| record.event),
            Some(TelemetryEventKind::LaunchFailed)
        );
    }

    #[test]
    fn sensor_failure_leaves_state_untouched() {
        let mut watchdog: Watchdog<ScriptedSensor<core::iter::Empty<f32>>, _, _> = Watchdog::new(
            ScriptedSensor::new(core::iter::empty()),
            ToggleGuard {
                active: false,
                fail: false,
            },
            RecordingLauncher::default(),
            DEFAULT_POLICY,
        );
        let mut telemetry = TelemetryRecorder::<MockInstant>::new();

        let err = watchdog
            .tick(MockInstant::secs(0), &mut telemetry)
            .unwrap_err();
        assert_eq!(err, TickError::Sensor(ScriptError::Empty));
        assert_eq!(watchdog.detector().state(), PowerState::High);
    }
}
