//! Primary flicker detector.
//!
//! Tracks the last recorded [`PowerState`] and the recovery window opened by a
//! drop. A drop that recovers within the grace period is a flicker and is the
//! only event that escalates.

use core::time::Duration;

use crate::policy::WatchdogPolicy;
use crate::power::{PowerEdge, PowerLevel, PowerState};
use crate::time::MonotonicInstant;

/// Timer opened by a High to Low transition.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RecoveryWindow<I> {
    opened_at: I,
}

impl<I: MonotonicInstant> RecoveryWindow<I> {
    #[must_use]
    pub const fn open(opened_at: I) -> Self {
        Self { opened_at }
    }

    #[must_use]
    pub const fn opened_at(&self) -> I {
        self.opened_at
    }

    #[must_use]
    pub fn elapsed(&self, now: I) -> Duration {
        now.saturating_duration_since(self.opened_at)
    }
}

/// Outcome of a single detector observation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FlickerEvent {
    /// No threshold crossing and nothing timed out.
    Steady,
    /// High to Low; a recovery window was opened.
    PowerDropped,
    /// Recovered within grace. Escalates.
    Flicker { recovered_after: Duration },
    /// Recovered, but only after the grace period had passed.
    SlowRecovery { recovered_after: Duration },
    /// Still low once the grace period passed; the window was closed.
    RecoveryTimedOut { waited: Duration },
    /// Recovered after a timed out window; re-arms drop detection.
    PowerRestored,
}

impl FlickerEvent {
    /// Returns `true` when the event should launch an escalation session.
    #[must_use]
    pub const fn escalates(self) -> bool {
        matches!(self, FlickerEvent::Flicker { .. })
    }

    /// Returns `true` for events that changed the recorded state or window.
    #[must_use]
    pub const fn is_transition(self) -> bool {
        !matches!(self, FlickerEvent::Steady)
    }
}

/// Drop-then-recover state machine driven once per primary tick.
#[derive(Clone, Debug)]
pub struct FlickerDetector<I> {
    threshold: f32,
    grace: Duration,
    state: PowerState,
    window: Option<RecoveryWindow<I>>,
}

impl<I: MonotonicInstant> FlickerDetector<I> {
    #[must_use]
    pub fn new(policy: &WatchdogPolicy) -> Self {
        Self {
            threshold: policy.threshold,
            grace: policy.grace,
            state: PowerState::High,
            window: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> PowerState {
        self.state
    }

    #[must_use]
    pub fn window(&self) -> Option<&RecoveryWindow<I>> {
        self.window.as_ref()
    }

    #[must_use]
    pub fn is_window_open(&self) -> bool {
        self.window.is_some()
    }

    /// Feeds one sampled level taken at `now`.
    pub fn observe(&mut self, level: PowerLevel, now: I) -> FlickerEvent {
        match self.state.edge(level, self.threshold) {
            Some(PowerEdge::Dropped) => {
                self.state = PowerState::after(PowerEdge::Dropped);
                self.window = Some(RecoveryWindow::open(now));
                FlickerEvent::PowerDropped
            }
            Some(PowerEdge::Recovered) => {
                self.state = PowerState::after(PowerEdge::Recovered);
                match self.window.take() {
                    Some(window) => {
                        let recovered_after = window.elapsed(now);
                        if recovered_after <= self.grace {
                            FlickerEvent::Flicker { recovered_after }
                        } else {
                            FlickerEvent::SlowRecovery { recovered_after }
                        }
                    }
                    None => FlickerEvent::PowerRestored,
                }
            }
            None => self.expire_window(level, now),
        }
    }

    fn expire_window(&mut self, level: PowerLevel, now: I) -> FlickerEvent {
        let Some(window) = self.window else {
            return FlickerEvent::Steady;
        };

        let waited = window.elapsed(now);
        if waited > self.grace && level.is_below(self.threshold) {
            self.window = None;
            FlickerEvent::RecoveryTimedOut { waited }
        } else {
            FlickerEvent::Steady
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::DEFAULT_POLICY;
    use crate::time::mock::MockInstant;

    fn level(percent: f32) -> PowerLevel {
        PowerLevel::from_percent(percent)
    }

    #[test]
    fn quick_recovery_is_a_flicker() {
        let mut detector = FlickerDetector::new(&DEFAULT_POLICY);

        assert_eq!(
            detector.observe(level(100.0), MockInstant::secs(0)),
            FlickerEvent::Steady
        );
        assert_eq!(
            detector.observe(level(60.0), MockInstant::secs(2)),
            FlickerEvent::PowerDropped
        );
        assert!(detector.is_window_open());

        let event = detector.observe(level(95.0), MockInstant::secs(6));
        assert_eq!(
            event,
            FlickerEvent::Flicker {
                recovered_after: Duration::from_secs(4)
            }
        );
        assert!(event.escalates());
        assert_eq!(detector.state(), PowerState::High);
        assert!(!detector.is_window_open());
    }

    #[test]
    fn recovery_exactly_at_grace_still_counts() {
        let mut detector = FlickerDetector::new(&DEFAULT_POLICY);
        detector.observe(level(50.0), MockInstant::secs(10));

        let event = detector.observe(level(90.0), MockInstant::secs(15));
        assert!(event.escalates());
    }

    #[test]
    fn window_survives_while_level_sits_on_threshold() {
        let mut detector = FlickerDetector::new(&DEFAULT_POLICY);
        detector.observe(level(70.0), MockInstant::secs(0));

        assert_eq!(
            detector.observe(level(80.0), MockInstant::secs(8)),
            FlickerEvent::Steady
        );
        assert!(detector.is_window_open());
        assert_eq!(
            detector.observe(level(90.0), MockInstant::secs(10)),
            FlickerEvent::SlowRecovery {
                recovered_after: Duration::from_secs(10)
            }
        );
    }

    #[test]
    fn timeout_then_restore_rearms_detection() {
        let mut detector = FlickerDetector::new(&DEFAULT_POLICY);
        detector.observe(level(40.0), MockInstant::secs(0));
        assert_eq!(
            detector.observe(level(40.0), MockInstant::secs(2)),
            FlickerEvent::Steady
        );
        assert_eq!(
            detector.observe(level(40.0), MockInstant::secs(6)),
            FlickerEvent::RecoveryTimedOut {
                waited: Duration::from_secs(6)
            }
        );
        assert_eq!(detector.state(), PowerState::Low);
        assert_eq!(
            detector.observe(level(40.0), MockInstant::secs(8)),
            FlickerEvent::Steady
        );

        let restored = detector.observe(level(99.0), MockInstant::secs(10));
        assert_eq!(restored, FlickerEvent::PowerRestored);
        assert!(!restored.escalates());

        assert_eq!(
            detector.observe(level(10.0), MockInstant::secs(12)),
            FlickerEvent::PowerDropped
        );
    }
}
