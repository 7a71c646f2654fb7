//! Averaging of raw samples into records
//!
//! The aggregator sums N consecutive raw samples per channel and emits their
//! truncated mean as one [`Record`] when the cycle is complete. N comes from
//! one of two windows: the normal reporting window or the longer
//! calibration window. Switching windows mid-cycle keeps the partial sums,
//! so the cycle in progress simply completes against the new length.

use crate::errors::{SensorError, SensorResult};
use crate::record::{Channels, Record, MAX_CHANNELS};
use crate::time::{elapsed_ms, Timestamp};

/// Which averaging window is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AveragingTarget {
    /// Regular reporting
    Normal,
    /// Offset or scaling acquisition
    Calibration,
}

/// Samples per cycle for each target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AveragingWindows {
    /// Samples per record during normal operation
    pub normal: u32,
    /// Samples per record while calibrating
    pub calibration: u32,
}

/// One completed averaging cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    /// Averaged values, stamped with the completing sample's time
    pub record: Record,
    /// Time of the cycle's first sample
    pub started_at: Timestamp,
}

impl Cycle {
    /// Acquisition time of the cycle in milliseconds
    pub fn duration_ms(&self) -> u32 {
        elapsed_ms(self.started_at, self.record.timestamp())
    }
}

/// Running per-channel sums
#[derive(Debug, Clone)]
pub struct SampleAggregator {
    sums: heapless::Vec<i64, MAX_CHANNELS>,
    count: u32,
    windows: AveragingWindows,
    target: AveragingTarget,
    cycle_started: Option<Timestamp>,
}

impl SampleAggregator {
    /// Aggregator for `channel_count` channels
    pub fn new(channel_count: usize, windows: AveragingWindows) -> SensorResult<Self> {
        if channel_count == 0 {
            return Err(SensorError::ZeroChannelCount);
        }
        let mut sums = heapless::Vec::new();
        sums.resize(channel_count, 0)
            .map_err(|_| SensorError::TooManyChannels { count: channel_count, max: MAX_CHANNELS })?;

        Ok(Self { sums, count: 0, windows, target: AveragingTarget::Normal, cycle_started: None })
    }

    /// Switch the active window, keeping any partial sums
    pub fn set_target(&mut self, target: AveragingTarget) {
        if self.target != target {
            log_debug!("averaging target {:?} -> {:?} at {} samples", self.target, target, self.count);
        }
        self.target = target;
    }

    /// Active window
    pub fn target(&self) -> AveragingTarget {
        self.target
    }

    /// Replace both window lengths
    pub fn set_windows(&mut self, windows: AveragingWindows) {
        self.windows = windows;
    }

    /// Samples needed to complete a cycle, never less than one
    pub fn target_count(&self) -> u32 {
        let n = match self.target {
            AveragingTarget::Normal => self.windows.normal,
            AveragingTarget::Calibration => self.windows.calibration,
        };
        n.max(1)
    }

    /// Samples accumulated in the current cycle
    pub fn sample_count(&self) -> u32 {
        self.count
    }

    /// Configured channel count
    pub fn channel_count(&self) -> usize {
        self.sums.len()
    }

    /// Accumulate one raw sample
    ///
    /// Returns the completed cycle when this sample reaches the target
    /// count. A sample of the wrong width is rejected and leaves the sums
    /// untouched.
    pub fn add_sample(&mut self, timestamp: Timestamp, raw: &[i32]) -> SensorResult<Option<Cycle>> {
        if raw.len() != self.sums.len() {
            return Err(SensorError::ChannelMismatch { expected: self.sums.len(), actual: raw.len() });
        }

        let started_at = *self.cycle_started.get_or_insert(timestamp);
        for (sum, &value) in self.sums.iter_mut().zip(raw) {
            *sum += i64::from(value);
        }
        self.count += 1;

        if self.count < self.target_count() {
            return Ok(None);
        }

        let divisor = i64::from(self.count);
        let means: Channels = self.sums.iter().map(|&sum| (sum / divisor) as i32).collect();
        self.reset();

        Ok(Some(Cycle { record: Record::from_channels(timestamp, means), started_at }))
    }

    /// Discard the cycle in progress
    pub fn reset(&mut self) {
        self.sums.iter_mut().for_each(|sum| *sum = 0);
        self.count = 0;
        self.cycle_started = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOWS: AveragingWindows = AveragingWindows { normal: 4, calibration: 8 };

    #[test]
    fn identical_samples_average_to_themselves() {
        let mut agg = SampleAggregator::new(2, WINDOWS).unwrap();
        for t in 0..3 {
            assert_eq!(agg.add_sample(t, &[5, -7]).unwrap(), None);
        }
        let cycle = agg.add_sample(3, &[5, -7]).unwrap().unwrap();
        assert_eq!(cycle.record.channels(), &[5, -7]);
        assert_eq!(cycle.record.timestamp(), 3);
        assert_eq!(cycle.started_at, 0);
        assert_eq!(agg.sample_count(), 0);
    }

    #[test]
    fn mean_truncates_toward_zero() {
        let mut agg = SampleAggregator::new(2, AveragingWindows { normal: 2, calibration: 2 }).unwrap();
        agg.add_sample(0, &[1, -1]).unwrap();
        let cycle = agg.add_sample(1, &[2, -2]).unwrap().unwrap();
        assert_eq!(cycle.record.channels(), &[1, -1]);
    }

    #[test]
    fn one_emission_per_cycle() {
        let mut agg = SampleAggregator::new(1, WINDOWS).unwrap();
        let emitted = (0..12).filter_map(|t| agg.add_sample(t, &[1]).unwrap()).count();
        assert_eq!(emitted, 3);
    }

    #[test]
    fn window_swap_keeps_partial_sums() {
        let mut agg = SampleAggregator::new(1, WINDOWS).unwrap();
        agg.add_sample(0, &[10]).unwrap();
        agg.add_sample(1, &[20]).unwrap();

        agg.set_target(AveragingTarget::Calibration);
        assert_eq!(agg.sample_count(), 2);
        for t in 2..7 {
            assert!(agg.add_sample(t, &[30]).unwrap().is_none());
        }
        let cycle = agg.add_sample(7, &[30]).unwrap().unwrap();
        // (10 + 20 + 6 * 30) / 8
        assert_eq!(cycle.record.channels(), &[26]);
    }

    #[test]
    fn shrinking_window_completes_on_next_sample() {
        let mut agg = SampleAggregator::new(1, WINDOWS).unwrap();
        agg.set_target(AveragingTarget::Calibration);
        for t in 0..5 {
            agg.add_sample(t, &[2]).unwrap();
        }
        agg.set_target(AveragingTarget::Normal);
        let cycle = agg.add_sample(5, &[2]).unwrap().unwrap();
        assert_eq!(cycle.record.channels(), &[2]);
    }

    #[test]
    fn rejects_wrong_width() {
        let mut agg = SampleAggregator::new(2, WINDOWS).unwrap();
        assert_eq!(
            agg.add_sample(0, &[1]),
            Err(SensorError::ChannelMismatch { expected: 2, actual: 1 })
        );
        assert_eq!(agg.sample_count(), 0);
    }

    #[test]
    fn zero_window_acts_as_one() {
        let mut agg = SampleAggregator::new(1, AveragingWindows { normal: 0, calibration: 0 }).unwrap();
        assert!(agg.add_sample(0, &[9]).unwrap().is_some());
    }

    #[test]
    fn zero_channels_rejected() {
        assert_eq!(SampleAggregator::new(0, WINDOWS).unwrap_err(), SensorError::ZeroChannelCount);
    }

    #[test]
    fn large_sums_do_not_overflow() {
        let mut agg = SampleAggregator::new(1, WINDOWS).unwrap();
        for t in 0..3 {
            agg.add_sample(t, &[i32::MAX]).unwrap();
        }
        let cycle = agg.add_sample(3, &[i32::MAX]).unwrap().unwrap();
        assert_eq!(cycle.record.channels(), &[i32::MAX]);
    }
}
