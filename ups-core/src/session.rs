//! Time-boxed repeat counter run by an escalation session.
//!
//! A session starts in [`PowerState::High`] and counts Low to High crossings
//! until either the repeat target is hit or the observation window closes.
//! The first drop only arms the counter; it is never counted on its own.

use core::fmt;
use core::time::Duration;

use crate::policy::WatchdogPolicy;
use crate::power::{PowerEdge, PowerLevel, PowerState};
use crate::time::MonotonicInstant;

/// Terminal state of a session.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SessionOutcome {
    RebootTriggered { transitions: u8, elapsed: Duration },
    TimedOut { transitions: u8 },
}

impl SessionOutcome {
    #[must_use]
    pub const fn transitions(self) -> u8 {
        match self {
            SessionOutcome::RebootTriggered { transitions, .. }
            | SessionOutcome::TimedOut { transitions } => transitions,
        }
    }

    #[must_use]
    pub const fn is_reboot(self) -> bool {
        matches!(self, SessionOutcome::RebootTriggered { .. })
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionOutcome::RebootTriggered {
                transitions,
                elapsed,
            } => write!(
                f,
                "reboot triggered after {transitions} transitions in {}ms",
                elapsed.as_millis()
            ),
            SessionOutcome::TimedOut { transitions } => {
                write!(f, "timed out with {transitions} transitions")
            }
        }
    }
}

/// Result of feeding one sample to a [`RepeatCounter`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SessionStep {
    /// No crossing.
    Holding,
    /// High to Low; arms the next count.
    Dropped,
    /// Low to High below the repeat target.
    Counted { transitions: u8 },
    /// Repeat target reached; the reboot must fire now.
    Triggered { transitions: u8, elapsed: Duration },
    /// The session had already ended; the sample was ignored.
    Finished(SessionOutcome),
}

#[derive(Clone, Debug)]
pub struct RepeatCounter<I> {
    threshold: f32,
    repeats: u8,
    started_at: I,
    deadline: I,
    transitions: u8,
    state: PowerState,
    outcome: Option<SessionOutcome>,
}

impl<I: MonotonicInstant> RepeatCounter<I> {
    /// Opens a session at `now` with a deadline of `now + policy.window`.
    #[must_use]
    pub fn start(policy: &WatchdogPolicy, now: I) -> Self {
        Self {
            threshold: policy.threshold,
            repeats: policy.repeats,
            started_at: now,
            deadline: now + policy.window,
            transitions: 0,
            state: PowerState::High,
            outcome: None,
        }
    }

    #[must_use]
    pub const fn started_at(&self) -> I {
        self.started_at
    }

    #[must_use]
    pub const fn deadline(&self) -> I {
        self.deadline
    }

    #[must_use]
    pub const fn transitions(&self) -> u8 {
        self.transitions
    }

    #[must_use]
    pub const fn state(&self) -> PowerState {
        self.state
    }

    #[must_use]
    pub const fn outcome(&self) -> Option<SessionOutcome> {
        self.outcome
    }

    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// Closes the session once `now` reaches the deadline.
    ///
    /// Returns the terminal outcome if the session has ended, either now or
    /// on an earlier call.
    pub fn poll_deadline(&mut self, now: I) -> Option<SessionOutcome> {
        if self.outcome.is_none() && now >= self.deadline {
            self.outcome = Some(SessionOutcome::TimedOut {
                transitions: self.transitions,
            });
        }
        self.outcome
    }

    /// Feeds one sampled level taken at `now`.
    pub fn observe(&mut self, level: PowerLevel, now: I) -> SessionStep {
        if let Some(outcome) = self.poll_deadline(now) {
            return SessionStep::Finished(outcome);
        }

        match self.state.edge(level, self.threshold) {
            Some(PowerEdge::Recovered) => {
                self.state = PowerState::after(PowerEdge::Recovered);
                self.transitions = self.transitions.saturating_add(1);

                if self.transitions >= self.repeats {
                    let elapsed = now.saturating_duration_since(self.started_at);
                    self.outcome = Some(SessionOutcome::RebootTriggered {
                        transitions: self.transitions,
                        elapsed,
                    });
                    SessionStep::Triggered {
                        transitions: self.transitions,
                        elapsed,
                    }
                } else {
                    SessionStep::Counted {
                        transitions: self.transitions,
                    }
                }
            }
            Some(PowerEdge::Dropped) => {
                self.state = PowerState::after(PowerEdge::Dropped);
                SessionStep::Dropped
            }
            None => SessionStep::Holding,
        }
    }
}
