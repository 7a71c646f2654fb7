//! Timestamped multi-channel records

use crate::errors::{SensorError, SensorResult};
use crate::time::Timestamp;

/// Maximum number of channels a record can carry
///
/// Channel values live inline so a record never allocates:
/// 32 × 4 bytes + length + timestamp ≈ 140 bytes per record.
pub const MAX_CHANNELS: usize = 32;

/// Inline channel values
pub type Channels = heapless::Vec<i32, MAX_CHANNELS>;

/// One timestamped vector of channel readings
///
/// Immutable once built. The channel count is fixed by the owning module's
/// configuration and every record it produces has exactly that width.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Record {
    timestamp: Timestamp,
    channels: Channels,
}

impl Record {
    /// Build a record from a slice of channel values
    pub fn new(timestamp: Timestamp, values: &[i32]) -> SensorResult<Self> {
        let channels = Channels::from_slice(values).map_err(|_| SensorError::TooManyChannels {
            count: values.len(),
            max: MAX_CHANNELS,
        })?;
        Ok(Self { timestamp, channels })
    }

    /// Build a record from already collected values
    pub fn from_channels(timestamp: Timestamp, channels: Channels) -> Self {
        Self { timestamp, channels }
    }

    /// Uptime in milliseconds when the record was completed
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Channel values in configuration order
    pub fn channels(&self) -> &[i32] {
        &self.channels
    }

    /// Number of channels
    pub fn width(&self) -> usize {
        self.channels.len()
    }
}
