//! Voltage sensor adapters.

use std::path::Path;
use std::sync::{Arc, Mutex};

use ups_core::power::{ScriptedSensor, VoltageSensor};

use crate::cli::SensorArgs;
use crate::error::SensorError;

pub mod hwmon;

pub use hwmon::HwmonSensor;

/// Sensor selected on the command line.
#[derive(Debug)]
pub enum HostSensor {
    Hwmon(HwmonSensor),
    Script(ScriptedSensor<std::vec::IntoIter<f32>>),
}

impl HostSensor {
    pub fn from_args(args: &SensorArgs) -> Result<Self, SensorError> {
        if let Some(volts) = &args.script {
            return Ok(HostSensor::Script(ScriptedSensor::new(volts.clone())));
        }

        match &args.hwmon {
            Some(device) => HwmonSensor::open(device).map(HostSensor::Hwmon),
            None => HwmonSensor::discover(Path::new(hwmon::HWMON_ROOT)).map(HostSensor::Hwmon),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            HostSensor::Hwmon(sensor) => sensor.input_path().display().to_string(),
            HostSensor::Script(_) => "scripted voltages".to_owned(),
        }
    }
}

impl VoltageSensor for HostSensor {
    type Error = SensorError;

    fn read_bus_voltage(&mut self) -> Result<f32, Self::Error> {
        match self {
            HostSensor::Hwmon(sensor) => sensor.read_bus_voltage(),
            HostSensor::Script(sensor) => sensor.read_bus_voltage().map_err(SensorError::Script),
        }
    }
}

/// Cloneable handle serializing reads of one sensor across loops.
#[derive(Clone, Debug)]
pub struct SharedSensor {
    inner: Arc<Mutex<HostSensor>>,
}

impl SharedSensor {
    pub fn new(sensor: HostSensor) -> Self {
        Self {
            inner: Arc::new(Mutex::new(sensor)),
        }
    }
}

impl VoltageSensor for SharedSensor {
    type Error = SensorError;

    fn read_bus_voltage(&mut self) -> Result<f32, Self::Error> {
        let mut sensor = self.inner.lock().map_err(|_| SensorError::Poisoned)?;
        sensor.read_bus_voltage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_one_script() {
        let sensor = SharedSensor::new(HostSensor::Script(ScriptedSensor::new(vec![
            12.6, 11.0, 10.0,
        ])));
        let mut primary = sensor.clone();
        let mut session = sensor;

        assert_eq!(primary.read_bus_voltage().unwrap(), 12.6);
        assert_eq!(session.read_bus_voltage().unwrap(), 11.0);
        assert_eq!(primary.read_bus_voltage().unwrap(), 10.0);
    }

    #[test]
    fn script_takes_priority_over_discovery() {
        let args = SensorArgs {
            hwmon: None,
            script: Some(vec![12.0]),
        };
        let sensor = HostSensor::from_args(&args).unwrap();
        assert_eq!(sensor.describe(), "scripted voltages");
    }
}
