//! Sensor module configuration
//!
//! Plain data with defaults, a `validate()` pass and string setters for the
//! web settings form. Persistence lives outside the core.

use alloc::string::String;
use alloc::vec::Vec;

use fugit::MillisDurationU32;

use crate::aggregator::AveragingWindows;
use crate::errors::{SensorError, SensorResult};
use crate::record::MAX_CHANNELS;
use crate::store::Capacity;

/// Default record store size
pub const DEFAULT_STORE_LEN: usize = 100;

/// Settings of one sensor module
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SensorConfig {
    /// Values delivered per sample, fixed for the module's lifetime
    pub channel_count: u8,
    /// Raw samples averaged into one stored record
    pub sample_averaging: u8,
    /// Raw samples averaged for an offset or scaling measurement
    pub calibration_averaging: u8,
    /// Minimum time between reported records, 0 reports every record
    pub reporting_interval_ms: u16,
    /// Values per CSV row before a `;` break
    pub matrix_column_count: u8,
    /// Record store policy
    pub storage: Capacity,
    /// Product name shown on status pages
    pub info_name: String,
    /// Free text description
    pub info_description: String,
    /// Measured quantity per channel, e.g. "Temperature"
    pub channel_types: Vec<String>,
    /// Unit per channel, e.g. "°C"
    pub channel_units: Vec<String>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            channel_count: 0,
            sample_averaging: 10,
            calibration_averaging: 30,
            reporting_interval_ms: 1000,
            matrix_column_count: u8::MAX,
            storage: Capacity::fixed(DEFAULT_STORE_LEN).unwrap_or(Capacity::Adaptive),
            info_name: String::new(),
            info_description: String::new(),
            channel_types: Vec::new(),
            channel_units: Vec::new(),
        }
    }
}

impl SensorConfig {
    /// Defaults for a module with `channel_count` channels
    pub fn with_channels(channel_count: u8) -> Self {
        Self { channel_count, ..Self::default() }
    }

    /// Check the settings the module cannot run without
    ///
    /// Channel count problems are configuration errors that disable the
    /// module. Zero averaging windows are rejected as invalid settings.
    pub fn validate(&self) -> SensorResult<()> {
        if self.channel_count == 0 {
            return Err(SensorError::ZeroChannelCount);
        }
        if usize::from(self.channel_count) > MAX_CHANNELS {
            return Err(SensorError::TooManyChannels { count: self.channel_count.into(), max: MAX_CHANNELS });
        }
        if self.sample_averaging == 0 {
            return Err(SensorError::InvalidSetting { name: "sample_averaging", reason: "must be at least 1" });
        }
        if self.calibration_averaging == 0 {
            return Err(SensorError::InvalidSetting { name: "calibration_averaging", reason: "must be at least 1" });
        }
        if self.matrix_column_count == 0 {
            return Err(SensorError::InvalidSetting { name: "matrix_column_count", reason: "must be at least 1" });
        }
        Ok(())
    }

    /// Update one runtime setting from its form value
    ///
    /// Keys: `sample_averaging`, `calibration_averaging` (1..=255),
    /// `reporting_interval` (0..=65535 ms), `matrix_column_count` (1..=255).
    /// The channel count and store policy are fixed at setup.
    pub fn apply(&mut self, key: &str, value: &str) -> SensorResult<()> {
        let value = value.trim();
        match key {
            "sample_averaging" => self.sample_averaging = parse_nonzero_u8("sample_averaging", value)?,
            "calibration_averaging" => {
                self.calibration_averaging = parse_nonzero_u8("calibration_averaging", value)?
            }
            "matrix_column_count" => self.matrix_column_count = parse_nonzero_u8("matrix_column_count", value)?,
            "reporting_interval" => {
                self.reporting_interval_ms = value.parse().map_err(|_| SensorError::InvalidSetting {
                    name: "reporting_interval",
                    reason: "expected 0..=65535",
                })?
            }
            _ => return Err(SensorError::UnknownSetting),
        }
        Ok(())
    }

    /// Averaging windows for the aggregator
    pub fn averaging_windows(&self) -> AveragingWindows {
        AveragingWindows {
            normal: u32::from(self.sample_averaging),
            calibration: u32::from(self.calibration_averaging),
        }
    }

    /// Reporting interval as a duration
    pub fn reporting_interval(&self) -> MillisDurationU32 {
        MillisDurationU32::millis(u32::from(self.reporting_interval_ms))
    }

    /// Type label of channel `index` (0-based), empty if unset
    pub fn channel_type(&self, index: usize) -> &str {
        self.channel_types.get(index).map(String::as_str).unwrap_or("")
    }

    /// Unit label of channel `index` (0-based), empty if unset
    pub fn channel_unit(&self, index: usize) -> &str {
        self.channel_units.get(index).map(String::as_str).unwrap_or("")
    }
}

fn parse_nonzero_u8(name: &'static str, value: &str) -> SensorResult<u8> {
    match value.parse::<u8>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(SensorError::InvalidSetting { name, reason: "expected 1..=255" }),
    }
}
