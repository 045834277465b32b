//! INA219 bus voltage through the Linux `ina2xx` hwmon driver.
//!
//! The driver exposes the bus voltage as `in1_input` in millivolts. The
//! device bound at I2C address 0x41 shows up as one `hwmonN` directory whose
//! `name` file reads `ina219`.

use std::fs;
use std::path::{Path, PathBuf};

use ups_core::power::VoltageSensor;

use crate::error::SensorError;

pub const HWMON_ROOT: &str = "/sys/class/hwmon";
pub const DRIVER_NAME: &str = "ina219";
const BUS_VOLTAGE_FILE: &str = "in1_input";

#[derive(Debug)]
pub struct HwmonSensor {
    input: PathBuf,
}

impl HwmonSensor {
    /// Uses the given hwmon device directory.
    pub fn open(device: &Path) -> Result<Self, SensorError> {
        let input = device.join(BUS_VOLTAGE_FILE);
        if !input.is_file() {
            return Err(SensorError::NotFound(device.to_path_buf()));
        }
        Ok(Self { input })
    }

    /// Finds the first device under `root` whose driver name is `ina219`.
    pub fn discover(root: &Path) -> Result<Self, SensorError> {
        let entries = fs::read_dir(root).map_err(|source| SensorError::Io {
            path: root.to_path_buf(),
            source,
        })?;

        let mut devices: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .collect();
        devices.sort();

        devices
            .iter()
            .find(|device| {
                fs::read_to_string(device.join("name"))
                    .is_ok_and(|name| name.trim() == DRIVER_NAME)
            })
            .map_or_else(
                || Err(SensorError::NotFound(root.to_path_buf())),
                |device| Self::open(device),
            )
    }

    pub fn input_path(&self) -> &Path {
        &self.input
    }
}

impl VoltageSensor for HwmonSensor {
    type Error = SensorError;

    fn read_bus_voltage(&mut self) -> Result<f32, Self::Error> {
        let contents = fs::read_to_string(&self.input).map_err(|source| SensorError::Io {
            path: self.input.clone(),
            source,
        })?;
        parse_millivolts(&contents).ok_or_else(|| SensorError::Parse {
            path: self.input.clone(),
            contents: contents.trim().to_owned(),
        })
    }
}

/// Parses a sysfs millivolt reading into volts.
#[allow(clippy::cast_precision_loss)]
fn parse_millivolts(contents: &str) -> Option<f32> {
    let millivolts: i64 = contents.trim().parse().ok()?;
    Some(millivolts as f32 / 1000.0)
}
