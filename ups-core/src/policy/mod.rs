//! Fixed watchdog policy.
//!
//! The thresholds and timing windows below are the whole policy: an 80 %
//! low-power line, a 5 s grace for a flicker to recover, and a 20 s session
//! that reboots after three further recoveries. [`overrides`] lets bench setups
//! retune the numbers without changing the shape of the policy.

use core::fmt;
use core::time::Duration;

pub mod overrides;

pub use overrides::{PolicyError, PolicyOverrides, parse_overrides};

/// Charge percentage separating the high and low power states.
pub const LOW_POWER_THRESHOLD: f32 = 80.0;
/// Longest drop that still counts as a flicker once power recovers.
pub const RECOVERY_GRACE: Duration = Duration::from_secs(5);
/// Lifetime of an escalation session.
pub const OBSERVATION_WINDOW: Duration = Duration::from_secs(20);
/// Upper bound accepted for every policy duration.
pub const MAX_POLICY_DURATION: Duration = Duration::from_secs(60 * 60);
/// Recoveries an escalation session must count before rebooting.
pub const REBOOT_REPEAT_COUNT: u8 = 3;
/// Delay between samples in both loops.
pub const SAMPLE_PERIOD: Duration = Duration::from_secs(2);

/// Tunable constants shared by the flicker detector and escalation sessions.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct WatchdogPolicy {
    pub threshold: f32,
    pub grace: Duration,
    pub window: Duration,
    pub repeats: u8,
    pub sample_period: Duration,
}

impl WatchdogPolicy {
    #[must_use]
    pub const fn new(
        threshold: f32,
        grace: Duration,
        window: Duration,
        repeats: u8,
        sample_period: Duration,
    ) -> Self {
        Self {
            threshold,
            grace,
            window,
            repeats,
            sample_period,
        }
    }

    /// Applies a `key=value[,key=value]` override string on top of this policy.
    pub fn with_overrides(self, input: &str) -> Result<Self, PolicyError<'_>> {
        parse_overrides(input)?.apply(self)
    }
}

/// Renders the policy as an override string that parses back to itself.
impl fmt::Display for WatchdogPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "threshold={},grace={}ms,window={}ms,repeats={},period={}ms",
            self.threshold,
            self.grace.as_millis(),
            self.window.as_millis(),
            self.repeats,
            self.sample_period.as_millis()
        )
    }
}

impl Default for WatchdogPolicy {
    fn default() -> Self {
        DEFAULT_POLICY
    }
}

/// The policy the watchdog ships with.
pub const DEFAULT_POLICY: WatchdogPolicy = WatchdogPolicy::new(
    LOW_POWER_THRESHOLD,
    RECOVERY_GRACE,
    OBSERVATION_WINDOW,
    REBOOT_REPEAT_COUNT,
    SAMPLE_PERIOD,
);

/// Returns the shared default policy.
#[must_use]
pub const fn default_policy() -> WatchdogPolicy {
    DEFAULT_POLICY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_fixed_constants() {
        let policy = default_policy();
        assert_eq!(policy.threshold, 80.0);
        assert_eq!(policy.grace, Duration::from_secs(5));
        assert_eq!(policy.window, Duration::from_secs(20));
        assert_eq!(policy.repeats, 3);
        assert_eq!(policy.sample_period, Duration::from_secs(2));
        assert_eq!(WatchdogPolicy::default(), DEFAULT_POLICY);
    }

    #[test]
    fn overrides_leave_unspecified_fields_alone() {
        let policy = DEFAULT_POLICY
            .with_overrides("window=30s")
            .expect("override should parse");

        assert_eq!(policy.window, Duration::from_secs(30));
        assert_eq!(policy.grace, RECOVERY_GRACE);
        assert_eq!(policy.repeats, REBOOT_REPEAT_COUNT);
    }

    #[test]
    fn display_is_accepted_as_overrides() {
        let tuned = DEFAULT_POLICY
            .with_overrides("threshold=72.5,period=250ms")
            .expect("override should parse");

        let mut rendered = heapless::String::<96>::new();
        core::fmt::write(&mut rendered, format_args!("{tuned}")).unwrap();
        assert_eq!(
            rendered.as_str(),
            "threshold=72.5,grace=5000ms,window=20000ms,repeats=3,period=250ms"
        );
        assert_eq!(DEFAULT_POLICY.with_overrides(&rendered), Ok(tuned));
    }
}
