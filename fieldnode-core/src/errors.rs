//! Error types for the sample pipeline
//!
//! Errors stay small and `Copy` so they can be returned from the sampling
//! hot path and logged without allocating. Reasons are `&'static str` only.
//!
//! ## Categories
//!
//! ### Configuration
//! - `ZeroChannelCount`, `TooManyChannels`: the module cannot run at all and
//!   stays disabled
//! - `InvalidSetting`, `UnknownSetting`: a single setting update is rejected
//!
//! ### Validation
//! - `ChannelOutOfRange`: a calibration request named a channel that does
//!   not exist; nothing was started
//! - `ChannelMismatch`: a driver delivered the wrong number of values
//!
//! ### Runtime
//! - `ZeroScalingReference`: the reference reading cannot produce a factor
//! - `NoCalibrationRunning`: a calibration result arrived with no session
//! - `ModuleDisabled`: the module was disabled during setup
//!
//! None of these are fatal. The owner logs them and carries on with the
//! affected module degraded.
//!
//! ```
//! use fieldnode_core::{SensorError, SensorModule};
//! # use fieldnode_core::config::SensorConfig;
//! # use fieldnode_core::logger::{Logger, LoggerConfig};
//! # use fieldnode_core::calibration::NullCalibrationStore;
//! # let mut log = Logger::new(LoggerConfig::default());
//! # let mut sensor = SensorModule::setup(SensorConfig::with_channels(2), 0, &mut NullCalibrationStore, &mut log);
//! match sensor.measure_scaling(3, 1000, 0, &mut log) {
//!     Ok(_) => {}
//!     Err(SensorError::ChannelOutOfRange { channel, count }) => {
//!         // tell the user which channels exist
//!         assert_eq!((channel, count), (3, 2));
//!     }
//!     Err(_) => {}
//! }
//! ```

use thiserror_no_std::Error;

/// Result type for pipeline operations
pub type SensorResult<T> = Result<T, SensorError>;

/// Errors raised by the sensor pipeline
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// Configured channel count is zero
    #[error("Data value count is zero")]
    ZeroChannelCount,

    /// Configured channel count exceeds the compiled-in limit
    #[error("Channel count {count} exceeds maximum {max}")]
    TooManyChannels {
        /// Requested channel count
        count: usize,
        /// Compiled-in maximum
        max: usize,
    },

    /// A sample did not carry one value per configured channel
    #[error("Expected {expected} channel values, got {actual}")]
    ChannelMismatch {
        /// Configured channel count
        expected: usize,
        /// Values delivered
        actual: usize,
    },

    /// Calibration channel number outside `1..=count`
    #[error("Channel number {channel} outside 1..={count}")]
    ChannelOutOfRange {
        /// Channel number as requested (1-based)
        channel: u16,
        /// Configured channel count
        count: u8,
    },

    /// Scaling reference reading is zero after the offset, no factor can be derived
    #[error("Scaling reference on channel {channel} is zero")]
    ZeroScalingReference {
        /// Channel index (0-based)
        channel: u8,
    },

    /// A calibration cycle finished while no session was running
    #[error("Offset/Scaling measurement finished without running")]
    NoCalibrationRunning,

    /// The module was disabled by a configuration error
    #[error("Module disabled")]
    ModuleDisabled,

    /// A setting value was rejected
    #[error("Invalid value for {name}: {reason}")]
    InvalidSetting {
        /// Setting key
        name: &'static str,
        /// Why it was rejected
        reason: &'static str,
    },

    /// No setting with that key exists
    #[error("Unknown setting")]
    UnknownSetting,
}

impl SensorError {
    /// Configuration errors disable a module instead of failing a single call
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::ZeroChannelCount | Self::TooManyChannels { .. })
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SensorError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::ZeroChannelCount => defmt::write!(fmt, "Channel count is zero"),
            Self::TooManyChannels { count, max } => {
                defmt::write!(fmt, "Channel count {} exceeds {}", count, max)
            }
            Self::ChannelMismatch { expected, actual } => {
                defmt::write!(fmt, "Expected {} values, got {}", expected, actual)
            }
            Self::ChannelOutOfRange { channel, count } => {
                defmt::write!(fmt, "Channel {} outside 1..={}", channel, count)
            }
            Self::ZeroScalingReference { channel } => {
                defmt::write!(fmt, "Zero scaling reference on {}", channel)
            }
            Self::NoCalibrationRunning => defmt::write!(fmt, "No calibration running"),
            Self::ModuleDisabled => defmt::write!(fmt, "Module disabled"),
            Self::InvalidSetting { name, reason } => {
                defmt::write!(fmt, "Invalid {}: {}", name, reason)
            }
            Self::UnknownSetting => defmt::write!(fmt, "Unknown setting"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn display_messages() {
        let err = SensorError::ChannelOutOfRange { channel: 0, count: 4 };
        assert_eq!(err.to_string(), "Channel number 0 outside 1..=4");

        let err = SensorError::ChannelMismatch { expected: 3, actual: 2 };
        assert_eq!(err.to_string(), "Expected 3 channel values, got 2");
    }

    #[test]
    fn configuration_errors_are_flagged() {
        assert!(SensorError::ZeroChannelCount.is_configuration());
        assert!(!SensorError::ModuleDisabled.is_configuration());
    }
}
