//! Watchdog telemetry ring.
//!
//! The core never logs. Every notable transition is recorded here with a
//! monotonically increasing [`EventId`] so front ends can render or replay
//! what the state machines decided.

use core::{fmt, time::Duration};

use heapless::{HistoryBuf, OldestOrdered};

use crate::detector::FlickerEvent;
use crate::power::PowerLevel;
use crate::session::{SessionOutcome, SessionStep};
use crate::time::MonotonicInstant;

/// Identifier assigned to each recorded event.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    PowerDropped,
    FlickerDetected,
    SlowRecovery,
    RecoveryTimedOut,
    PowerRestored,
    SessionLaunched,
    LaunchFailed,
    SensorFault,
    GuardFault,
    SessionStarted,
    TransitionCounted,
    RebootTriggered,
    RebootFailed,
    SessionTimedOut,
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TelemetryEventKind::PowerDropped => "power-dropped",
            TelemetryEventKind::FlickerDetected => "flicker-detected",
            TelemetryEventKind::SlowRecovery => "slow-recovery",
            TelemetryEventKind::RecoveryTimedOut => "recovery-timed-out",
            TelemetryEventKind::PowerRestored => "power-restored",
            TelemetryEventKind::SessionLaunched => "session-launched",
            TelemetryEventKind::LaunchFailed => "launch-failed",
            TelemetryEventKind::SensorFault => "sensor-fault",
            TelemetryEventKind::GuardFault => "guard-fault",
            TelemetryEventKind::SessionStarted => "session-started",
            TelemetryEventKind::TransitionCounted => "transition-counted",
            TelemetryEventKind::RebootTriggered => "reboot-triggered",
            TelemetryEventKind::RebootFailed => "reboot-failed",
            TelemetryEventKind::SessionTimedOut => "session-timed-out",
        };
        f.write_str(name)
    }
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TelemetryPayload {
    None,
    Power(PowerTelemetry),
    Session(SessionTelemetry),
}

/// Level observed with a primary loop transition.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PowerTelemetry {
    pub level: PowerLevel,
    /// Time spent in the recovery window, when one was open.
    pub elapsed: Option<Duration>,
}

impl PowerTelemetry {
    #[must_use]
    pub const fn new(level: PowerLevel, elapsed: Option<Duration>) -> Self {
        Self { level, elapsed }
    }
}

/// Counter snapshot taken with a session event.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SessionTelemetry {
    pub transitions: u8,
    pub elapsed: Option<Duration>,
}

impl SessionTelemetry {
    #[must_use]
    pub const fn new(transitions: u8, elapsed: Option<Duration>) -> Self {
        Self {
            transitions,
            elapsed,
        }
    }
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TelemetryRecord<I> {
    pub id: EventId,
    pub timestamp: I,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

pub type TelemetryRing<I, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord<I>, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<I, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> {
    ring: TelemetryRing<I, CAPACITY>,
    next_event_id: EventId,
}

impl<I, const CAPACITY: usize> TelemetryRecorder<I, CAPACITY>
where
    I: MonotonicInstant,
{
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    #[must_use]
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord<I>> {
        self.ring.oldest_ordered()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&TelemetryRecord<I>> {
        self.ring.recent()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Records an arbitrary telemetry event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: I,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details: payload,
        });

        id
    }

    /// Records a primary loop transition. `Steady` observations are skipped.
    pub fn record_flicker_event(
        &mut self,
        event: FlickerEvent,
        level: PowerLevel,
        timestamp: I,
    ) -> Option<EventId> {
        let (kind, elapsed) = match event {
            FlickerEvent::Steady => return None,
            FlickerEvent::PowerDropped => (TelemetryEventKind::PowerDropped, None),
            FlickerEvent::Flicker { recovered_after } => {
                (TelemetryEventKind::FlickerDetected, Some(recovered_after))
            }
            FlickerEvent::SlowRecovery { recovered_after } => {
                (TelemetryEventKind::SlowRecovery, Some(recovered_after))
            }
            FlickerEvent::RecoveryTimedOut { waited } => {
                (TelemetryEventKind::RecoveryTimedOut, Some(waited))
            }
            FlickerEvent::PowerRestored => (TelemetryEventKind::PowerRestored, None),
        };

        Some(self.record(
            kind,
            TelemetryPayload::Power(PowerTelemetry::new(level, elapsed)),
            timestamp,
        ))
    }

    /// Records a session step that changed the counter or ended the session.
    pub fn record_session_step(&mut self, step: SessionStep, timestamp: I) -> Option<EventId> {
        let (kind, details) = match step {
            SessionStep::Counted { transitions } => {
                (TelemetryEventKind::TransitionCounted, SessionTelemetry::new(transitions, None))
            }
            SessionStep::Triggered {
                transitions,
                elapsed,
            } => (
                TelemetryEventKind::RebootTriggered,
                SessionTelemetry::new(transitions, Some(elapsed)),
            ),
            SessionStep::Holding | SessionStep::Dropped | SessionStep::Finished(_) => {
                return None;
            }
        };

        Some(self.record(kind, TelemetryPayload::Session(details), timestamp))
    }

    /// Records the terminal outcome of a session.
    pub fn record_session_outcome(
        &mut self,
        outcome: SessionOutcome,
        started_at: I,
        timestamp: I,
    ) -> EventId {
        let kind = if outcome.is_reboot() {
            TelemetryEventKind::RebootTriggered
        } else {
            TelemetryEventKind::SessionTimedOut
        };
        let elapsed = timestamp.saturating_duration_since(started_at);

        self.record(
            kind,
            TelemetryPayload::Session(SessionTelemetry::new(outcome.transitions(), Some(elapsed))),
            timestamp,
        )
    }
}

impl<I, const CAPACITY: usize> Default for TelemetryRecorder<I, CAPACITY>
where
    I: MonotonicInstant,
{
    fn default() -> Self {
        Self::new()
    }
}
