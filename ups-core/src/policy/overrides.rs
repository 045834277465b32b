//! Parser for `key=value` policy overrides.
//!
//! Accepts a comma separated list such as
//! `threshold=75, grace=4s, window=30s, repeats=2, period=500ms`. The
//! assignments are split with `winnow` combinators and every value is then
//! checked against its key.

use core::fmt;
use core::time::Duration;

use winnow::ModalResult;
use winnow::Parser;
use winnow::ascii::{digit1, space0};
use winnow::combinator::{alt, delimited};
use winnow::token::take_while;

use super::{MAX_POLICY_DURATION, WatchdogPolicy};

/// Policy field addressed by an override key.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OverrideKey {
    Threshold,
    Grace,
    Window,
    Repeats,
    Period,
}

impl OverrideKey {
    const ALL: [OverrideKey; 5] = [
        OverrideKey::Threshold,
        OverrideKey::Grace,
        OverrideKey::Window,
        OverrideKey::Repeats,
        OverrideKey::Period,
    ];

    /// Canonical spelling used in override strings.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            OverrideKey::Threshold => "threshold",
            OverrideKey::Grace => "grace",
            OverrideKey::Window => "window",
            OverrideKey::Repeats => "repeats",
            OverrideKey::Period => "period",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|key| key.name().eq_ignore_ascii_case(name))
    }
}

/// Errors reported while parsing or applying overrides.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PolicyError<'a> {
    /// Input did not match `key=value[,key=value]` at byte `offset`.
    Syntax { offset: usize },
    UnknownKey(&'a str),
    DuplicateKey(&'static str),
    InvalidValue { key: &'static str, value: &'a str },
    OutOfRange { key: &'static str },
}

impl fmt::Display for PolicyError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyError::Syntax { offset } => {
                write!(f, "expected key=value at offset {offset}")
            }
            PolicyError::UnknownKey(key) => write!(f, "unknown policy key `{key}`"),
            PolicyError::DuplicateKey(key) => write!(f, "policy key `{key}` given twice"),
            PolicyError::InvalidValue { key, value } => {
                write!(f, "invalid value `{value}` for `{key}`")
            }
            PolicyError::OutOfRange { key } => write!(f, "value for `{key}` is out of range"),
        }
    }
}

/// Parsed override values; `None` keeps the base policy value.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PolicyOverrides {
    pub threshold: Option<f32>,
    pub grace: Option<Duration>,
    pub window: Option<Duration>,
    pub repeats: Option<u8>,
    pub period: Option<Duration>,
}

impl PolicyOverrides {
    /// Returns `true` when no key was supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies the overrides to `base` and validates the result.
    pub fn apply<'a>(self, base: WatchdogPolicy) -> Result<WatchdogPolicy, PolicyError<'a>> {
        let policy = WatchdogPolicy {
            threshold: self.threshold.unwrap_or(base.threshold),
            grace: self.grace.unwrap_or(base.grace),
            window: self.window.unwrap_or(base.window),
            repeats: self.repeats.unwrap_or(base.repeats),
            sample_period: self.period.unwrap_or(base.sample_period),
        };

        if !(policy.threshold > 0.0 && policy.threshold < 100.0) {
            return Err(PolicyError::OutOfRange {
                key: OverrideKey::Threshold.name(),
            });
        }
        if policy.grace > MAX_POLICY_DURATION {
            return Err(PolicyError::OutOfRange {
                key: OverrideKey::Grace.name(),
            });
        }
        if policy.window.is_zero() || policy.window > MAX_POLICY_DURATION {
            return Err(PolicyError::OutOfRange {
                key: OverrideKey::Window.name(),
            });
        }
        if policy.repeats == 0 {
            return Err(PolicyError::OutOfRange {
                key: OverrideKey::Repeats.name(),
            });
        }
        if policy.sample_period.is_zero() || policy.sample_period > MAX_POLICY_DURATION {
            return Err(PolicyError::OutOfRange {
                key: OverrideKey::Period.name(),
            });
        }

        Ok(policy)
    }

    fn set<'a>(&mut self, key: &'a str, value: &'a str) -> Result<(), PolicyError<'a>> {
        let field = OverrideKey::from_name(key).ok_or(PolicyError::UnknownKey(key))?;
        let invalid = PolicyError::InvalidValue {
            key: field.name(),
            value,
        };

        let already_set = match field {
            OverrideKey::Threshold => self
                .threshold
                .replace(value.parse::<f32>().map_err(|_| invalid)?)
                .is_some(),
            OverrideKey::Grace => self
                .grace
                .replace(parse_duration(value).ok_or(invalid)?)
                .is_some(),
            OverrideKey::Window => self
                .window
                .replace(parse_duration(value).ok_or(invalid)?)
                .is_some(),
            OverrideKey::Repeats => self
                .repeats
                .replace(value.parse::<u8>().map_err(|_| invalid)?)
                .is_some(),
            OverrideKey::Period => self
                .period
                .replace(parse_duration(value).ok_or(invalid)?)
                .is_some(),
        };

        if already_set {
            Err(PolicyError::DuplicateKey(field.name()))
        } else {
            Ok(())
        }
    }
}

/// Parses a comma separated override list.
pub fn parse_overrides(input: &str) -> Result<PolicyOverrides, PolicyError<'_>> {
    let mut overrides = PolicyOverrides::default();
    let mut rest = input;

    loop {
        if rest.trim().is_empty() {
            return Ok(overrides);
        }

        let offset = input.len() - rest.len();
        let (key, value) = assignment
            .parse_next(&mut rest)
            .map_err(|_| PolicyError::Syntax { offset })?;
        overrides.set(key, value)?;

        if rest.is_empty() {
            return Ok(overrides);
        }

        let offset = input.len() - rest.len();
        separator
            .parse_next(&mut rest)
            .map_err(|_| PolicyError::Syntax { offset })?;
    }
}

/// Parses a duration literal such as `250ms` or `5s`.
#[must_use]
pub fn parse_duration(value: &str) -> Option<Duration> {
    let mut rest = value;
    let (digits, unit) = duration_literal.parse_next(&mut rest).ok()?;
    if !rest.is_empty() {
        return None;
    }

    let amount = digits.parse::<u64>().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(amount)),
        _ => Some(Duration::from_secs(amount)),
    }
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn is_value_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.'
}

fn assignment<'s>(input: &mut &'s str) -> ModalResult<(&'s str, &'s str)> {
    (
        delimited(space0, take_while(1.., is_key_char), space0),
        '=',
        delimited(space0, take_while(1.., is_value_char), space0),
    )
        .map(|(key, _, value)| (key, value))
        .parse_next(input)
}

fn separator(input: &mut &str) -> ModalResult<char> {
    delimited(space0, ',', space0).parse_next(input)
}

fn duration_literal<'s>(input: &mut &'s str) -> ModalResult<(&'s str, &'s str)> {
    (digit1, alt(("ms", "s"))).parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::DEFAULT_POLICY;

    #[test]
    fn parses_every_key() {
        let overrides =
            parse_overrides("threshold=75.5, grace=4s,window=30s , repeats=2,period=500ms")
                .expect("overrides should parse");

        assert_eq!(overrides.threshold, Some(75.5));
        assert_eq!(overrides.grace, Some(Duration::from_secs(4)));
        assert_eq!(overrides.window, Some(Duration::from_secs(30)));
        assert_eq!(overrides.repeats, Some(2));
        assert_eq!(overrides.period, Some(Duration::from_millis(500)));
    }

    #[test]
    fn empty_input_yields_no_overrides() {
        let overrides = parse_overrides("  ").expect("blank input is allowed");
        assert!(overrides.is_empty());
        assert_eq!(overrides.apply(DEFAULT_POLICY), Ok(DEFAULT_POLICY));
    }

    #[test]
    fn keys_are_case_insensitive() {
        let overrides = parse_overrides("Window=25s").expect("mixed case key");
        assert_eq!(overrides.window, Some(Duration::from_secs(25)));
    }

    #[test]
    fn rejects_unknown_keys() {
        assert_eq!(
            parse_overrides("grace=5s,cooldown=1s"),
            Err(PolicyError::UnknownKey("cooldown"))
        );
    }

    #[test]
    fn rejects_duplicate_keys() {
        assert_eq!(
            parse_overrides("grace=5s,grace=6s"),
            Err(PolicyError::DuplicateKey("grace"))
        );
    }

    #[test]
    fn rejects_durations_without_unit() {
        assert_eq!(
            parse_overrides("window=20"),
            Err(PolicyError::InvalidValue {
                key: "window",
                value: "20"
            })
        );
    }

    #[test]
    fn reports_syntax_offset() {
        assert_eq!(
            parse_overrides("grace=5s;window=2s"),
            Err(PolicyError::Syntax { offset: 8 })
        );
        assert_eq!(parse_overrides("=5s"), Err(PolicyError::Syntax { offset: 0 }));
    }

    #[test]
    fn validation_rejects_degenerate_policies() {
        let zero_repeats = parse_overrides("repeats=0").unwrap();
        assert_eq!(
            zero_repeats.apply(DEFAULT_POLICY),
            Err(PolicyError::OutOfRange { key: "repeats" })
        );

        let zero_period = parse_overrides("period=0ms").unwrap();
        assert_eq!(
            zero_period.apply(DEFAULT_POLICY),
            Err(PolicyError::OutOfRange { key: "period" })
        );

        let threshold = parse_overrides("threshold=100").unwrap();
        assert_eq!(
            threshold.apply(DEFAULT_POLICY),
            Err(PolicyError::OutOfRange { key: "threshold" })
        );
    }

    #[test]
    fn validation_caps_durations_at_one_hour() {
        let huge_window = parse_overrides("window=18446744073709551615s").unwrap();
        assert_eq!(
            huge_window.apply(DEFAULT_POLICY),
            Err(PolicyError::OutOfRange { key: "window" })
        );

        let long_grace = parse_overrides("grace=3601s").unwrap();
        assert_eq!(
            long_grace.apply(DEFAULT_POLICY),
            Err(PolicyError::OutOfRange { key: "grace" })
        );

        let long_period = parse_overrides("period=3600001ms").unwrap();
        assert_eq!(
            long_period.apply(DEFAULT_POLICY),
            Err(PolicyError::OutOfRange { key: "period" })
        );

        let policy = parse_overrides("grace=3600s,window=3600s,period=3600s")
            .unwrap()
            .apply(DEFAULT_POLICY)
            .expect("one hour is accepted");
        assert_eq!(policy.window, MAX_POLICY_DURATION);
    }

    #[test]
    fn duration_literals() {
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("7s"), Some(Duration::from_secs(7)));
        assert_eq!(parse_duration("7m"), None);
        assert_eq!(parse_duration("s"), None);
    }
}
