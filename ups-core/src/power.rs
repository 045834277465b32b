//! Bus-voltage sampling and the fixed battery percentage map.
//!
//! The UPS pack reads 9.0 V when empty and 12.6 V when full. Every sample is
//! mapped linearly across that span and clamped into `0..=100`, so downstream
//! state machines only ever see a [`PowerLevel`].

use core::fmt;

/// Bus voltage reported by an empty pack.
pub const EMPTY_BUS_VOLTS: f32 = 9.0;
/// Voltage span between an empty and a full pack.
pub const BUS_VOLTS_SPAN: f32 = 3.6;

/// Battery charge as a clamped percentage.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
pub struct PowerLevel(f32);

impl PowerLevel {
    pub const EMPTY: Self = Self(0.0);
    pub const FULL: Self = Self(100.0);

    /// Builds a level from a raw percentage, clamping into `0..=100`.
    ///
    /// `NaN` is read as an empty pack.
    #[must_use]
    pub fn from_percent(percent: f32) -> Self {
        if percent.is_nan() {
            return Self::EMPTY;
        }
        Self(percent.clamp(0.0, 100.0))
    }

    /// Converts a bus voltage reading into a level.
    #[must_use]
    pub fn from_bus_voltage(volts: f32) -> Self {
        Self::from_percent((volts - EMPTY_BUS_VOLTS) / BUS_VOLTS_SPAN * 100.0)
    }

    /// Returns the level as a percentage.
    #[must_use]
    pub const fn percent(self) -> f32 {
        self.0
    }

    /// Returns `true` when the level sits strictly below `threshold`.
    #[must_use]
    pub fn is_below(self, threshold: f32) -> bool {
        self.0 < threshold
    }

    /// Returns `true` when the level sits strictly above `threshold`.
    #[must_use]
    pub fn is_above(self, threshold: f32) -> bool {
        self.0 > threshold
    }
}

impl fmt::Display for PowerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.0)
    }
}

/// Converts a bus voltage straight into a clamped percentage.
#[must_use]
pub fn percent_from_bus_voltage(volts: f32) -> f32 {
    PowerLevel::from_bus_voltage(volts).percent()
}

/// Last recorded classification of the supply.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum PowerState {
    #[default]
    High,
    Low,
}

/// Threshold crossing relative to the previously recorded [`PowerState`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PowerEdge {
    Dropped,
    Recovered,
}

impl PowerState {
    /// Reports the crossing `level` makes against this recorded state.
    ///
    /// A level sitting exactly on `threshold` never crosses.
    #[must_use]
    pub fn edge(self, level: PowerLevel, threshold: f32) -> Option<PowerEdge> {
        match self {
            PowerState::High if level.is_below(threshold) => Some(PowerEdge::Dropped),
            PowerState::Low if level.is_above(threshold) => Some(PowerEdge::Recovered),
            _ => None,
        }
    }

    /// State recorded after `edge` has been applied.
    #[must_use]
    pub const fn after(edge: PowerEdge) -> Self {
        match edge {
            PowerEdge::Dropped => PowerState::Low,
            PowerEdge::Recovered => PowerState::High,
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerState::High => f.write_str("high"),
            PowerState::Low => f.write_str("low"),
        }
    }
}

/// Source of instantaneous bus voltage readings.
pub trait VoltageSensor {
    /// Driver-specific read failure.
    type Error;

    /// Reads the bus voltage in volts.
    fn read_bus_voltage(&mut self) -> Result<f32, Self::Error>;
}

impl<S> VoltageSensor for &mut S
where
    S: VoltageSensor + ?Sized,
{
    type Error = S::Error;

    fn read_bus_voltage(&mut self) -> Result<f32, Self::Error> {
        (**self).read_bus_voltage()
    }
}

/// One converted sensor reading.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PowerSample {
    pub bus_volts: f32,
    pub level: PowerLevel,
}

impl PowerSample {
    #[must_use]
    pub fn from_bus_voltage(bus_volts: f32) -> Self {
        Self {
            bus_volts,
            level: PowerLevel::from_bus_voltage(bus_volts),
        }
    }
}

/// Stateless wrapper that turns raw sensor reads into [`PowerSample`]s.
pub struct PowerSampler<S> {
    sensor: S,
}

impl<S: VoltageSensor> PowerSampler<S> {
    #[must_use]
    pub const fn new(sensor: S) -> Self {
        Self { sensor }
    }

    /// Reads the sensor once and converts the reading.
    pub fn sample(&mut self) -> Result<PowerSample, S::Error> {
        self.sensor
            .read_bus_voltage()
            .map(PowerSample::from_bus_voltage)
    }

    #[must_use]
    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    #[must_use]
    pub fn into_inner(self) -> S {
        self.sensor
    }
}

/// Error reported by [`ScriptedSensor`] when it never had a reading.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScriptError {
    Empty,
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::Empty => f.write_str("voltage script is empty"),
        }
    }
}

/// Sensor replaying a fixed list of voltages, then holding the last one.
#[derive(Clone, Debug)]
pub struct ScriptedSensor<I> {
    readings: I,
    last: Option<f32>,
}

impl<I> ScriptedSensor<I>
where
    I: Iterator<Item = f32>,
{
    #[must_use]
    pub fn new<T>(readings: T) -> Self
    where
        T: IntoIterator<IntoIter = I>,
    {
        Self {
            readings: readings.into_iter(),
            last: None,
        }
    }
}

impl<I> VoltageSensor for ScriptedSensor<I>
where
    I: Iterator<Item = f32>,
{
    type Error = ScriptError;

    fn read_bus_voltage(&mut self) -> Result<f32, Self::Error> {
        if let Some(next) = self.readings.next() {
            self.last = Some(next);
        }
        self.last.ok_or(ScriptError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_clamps_both_ends() {
        assert_eq!(percent_from_bus_voltage(5.0), 0.0);
        assert_eq!(percent_from_bus_voltage(20.0), 100.0);
        assert_eq!(percent_from_bus_voltage(EMPTY_BUS_VOLTS), 0.0);
        assert_eq!(percent_from_bus_voltage(f32::INFINITY), 100.0);
        assert_eq!(percent_from_bus_voltage(f32::NEG_INFINITY), 0.0);
        assert_eq!(percent_from_bus_voltage(f32::NAN), 0.0);
    }

    #[test]
    fn conversion_is_linear_inside_the_span() {
        let half = percent_from_bus_voltage(EMPTY_BUS_VOLTS + BUS_VOLTS_SPAN / 2.0);
        assert!((half - 50.0).abs() < 0.01);

        let full = percent_from_bus_voltage(EMPTY_BUS_VOLTS + BUS_VOLTS_SPAN);
        assert!((full - 100.0).abs() < 0.01);
    }

    #[test]
    fn threshold_comparisons_are_strict() {
        let level = PowerLevel::from_percent(80.0);
        assert!(!level.is_below(80.0));
        assert!(!level.is_above(80.0));
        assert_eq!(PowerState::High.edge(level, 80.0), None);
        assert_eq!(PowerState::Low.edge(level, 80.0), None);
    }

    #[test]
    fn edges_follow_the_recorded_state() {
        let low = PowerLevel::from_percent(60.0);
        let high = PowerLevel::from_percent(95.0);

        assert_eq!(PowerState::High.edge(low, 80.0), Some(PowerEdge::Dropped));
        assert_eq!(PowerState::High.edge(high, 80.0), None);
        assert_eq!(PowerState::Low.edge(high, 80.0), Some(PowerEdge::Recovered));
        assert_eq!(PowerState::Low.edge(low, 80.0), None);
        assert_eq!(PowerState::after(PowerEdge::Dropped), PowerState::Low);
    }

    #[test]
    fn scripted_sensor_holds_last_reading() {
        let mut sampler = PowerSampler::new(ScriptedSensor::new([12.6, 10.0]));

        assert_eq!(sampler.sample().unwrap().level, PowerLevel::FULL);
        let second = sampler.sample().unwrap();
        assert_eq!(second.bus_volts, 10.0);
        assert_eq!(sampler.sample().unwrap().bus_volts, 10.0);
    }

    #[test]
    fn empty_script_reports_error() {
        let mut sensor = ScriptedSensor::new(core::iter::empty::<f32>());
        assert_eq!(sensor.read_bus_voltage(), Err(ScriptError::Empty));
    }
}
