//! Offset and scaling calibration
//!
//! ## Numeric Contract
//!
//! Every channel carries an offset, a scaling factor and a display exponent:
//!
//! ```text
//! scaled = round((raw + offset) * scaling)
//! ```
//!
//! - **Offset measurement** averages a reading with no load applied and sets
//!   `offset_i = -raw_i` on every channel, so that reading scales to zero.
//! - **Scaling measurement** averages a reading with a known reference on one
//!   channel and sets `scaling_t = target / (raw_t + offset_t)` for that
//!   channel only. The offset must be measured first.
//!
//! The exponent is metadata for renderers that want to show scaled integers
//! as decimals (`value * 10^exponent`); it does not enter the formula.
//!
//! ## Session Lifecycle
//!
//! ```text
//!         start_offset()                 complete()
//! Idle ───────────────────→ Offset ───────────────────→ Idle
//!   │     start_scaling()                complete()       ↑
//!   └─────────────────────→ Scaling ──────────────────────┘
//! ```
//!
//! While a session runs, the aggregator uses its calibration window and the
//! reporting scheduler is suspended. Completion always restores both, even
//! when the derived parameters are rejected.

use core::fmt;

use crate::aggregator::{AveragingTarget, SampleAggregator};
use crate::errors::{SensorError, SensorResult};
use crate::record::{Channels, Record, MAX_CHANNELS};
use crate::scheduler::ReportingScheduler;
use crate::time::Timestamp;

/// Calibration of one channel
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelCalibration {
    /// Added to the raw value before scaling
    pub offset: i32,
    /// Multiplier applied after the offset
    pub scaling: f32,
    /// Power of ten for displaying scaled integers
    pub exponent: i8,
}

impl Default for ChannelCalibration {
    fn default() -> Self {
        Self { offset: 0, scaling: 1.0, exponent: 0 }
    }
}

impl ChannelCalibration {
    /// Scale one raw value, rounding to nearest and saturating
    pub fn apply(&self, raw: i32) -> i32 {
        let shifted = i64::from(raw) + i64::from(self.offset);
        saturate(libm::roundf(shifted as f32 * self.scaling))
    }

    /// Convert a float reading to its stored integer form, `value * 10^exponent`
    pub fn quantize(&self, value: f32) -> i32 {
        saturate(libm::roundf(value * libm::powf(10.0, f32::from(self.exponent))))
    }
}

fn saturate(value: f32) -> i32 {
    // `as` saturates at the bounds and maps NaN to zero
    value as i32
}

/// Calibration of every channel of a module
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CalibrationParams {
    channels: heapless::Vec<ChannelCalibration, MAX_CHANNELS>,
}

impl CalibrationParams {
    /// Neutral parameters (offset 0, scaling 1) for `channel_count` channels
    ///
    /// Counts above [`MAX_CHANNELS`] are clamped.
    pub fn neutral(channel_count: usize) -> Self {
        let mut channels = heapless::Vec::new();
        for _ in 0..channel_count.min(MAX_CHANNELS) {
            // bounded by the clamp above
            let _ = channels.push(ChannelCalibration::default());
        }
        Self { channels }
    }

    /// Parameters from explicit per-channel values
    pub fn from_channels(values: &[ChannelCalibration]) -> SensorResult<Self> {
        let channels = heapless::Vec::from_slice(values).map_err(|_| SensorError::TooManyChannels {
            count: values.len(),
            max: MAX_CHANNELS,
        })?;
        Ok(Self { channels })
    }

    /// Number of channels
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether no channel is configured
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Per-channel parameters
    pub fn channels(&self) -> &[ChannelCalibration] {
        &self.channels
    }

    /// Parameters of one channel (0-based)
    pub fn channel(&self, index: usize) -> Option<&ChannelCalibration> {
        self.channels.get(index)
    }

    /// Set the display exponent of one channel
    pub fn set_exponent(&mut self, index: usize, exponent: i8) -> bool {
        match self.channels.get_mut(index) {
            Some(channel) => {
                channel.exponent = exponent;
                true
            }
            None => false,
        }
    }

    /// Scale a full sample; extra raw values beyond the configured channels are dropped
    pub fn apply(&self, raw: &[i32]) -> Channels {
        self.channels.iter().zip(raw).map(|(cal, &value)| cal.apply(value)).collect()
    }

    /// Zero every channel at the given reading
    pub fn set_offsets_from(&mut self, raw: &[i32]) {
        for (cal, &value) in self.channels.iter_mut().zip(raw) {
            cal.offset = value.saturating_neg();
        }
    }

    /// Derive the scaling factor of channel `index` from a reference reading
    ///
    /// Returns the new factor. A reading that is zero after the offset
    /// cannot produce a factor; the old one is kept.
    pub fn set_scaling_from(&mut self, index: usize, raw: &[i32], target: i32) -> SensorResult<f32> {
        let channel = index as u8;
        let (cal, &value) = self
            .channels
            .get_mut(index)
            .zip(raw.get(index))
            .ok_or(SensorError::ChannelOutOfRange { channel: u16::from(channel) + 1, count: raw.len() as u8 })?;

        let denominator = i64::from(value) + i64::from(cal.offset);
        if denominator == 0 {
            return Err(SensorError::ZeroScalingReference { channel });
        }
        cal.scaling = target as f32 / denominator as f32;
        Ok(cal.scaling)
    }

    /// Offsets back to zero on every channel
    pub fn reset_offsets(&mut self) {
        self.channels.iter_mut().for_each(|cal| cal.offset = 0);
    }

    /// Scaling back to one on every channel
    pub fn reset_scaling(&mut self) {
        self.channels.iter_mut().for_each(|cal| cal.scaling = 1.0);
    }
}

/// Persistence of calibration parameters
///
/// Implemented by the platform's flash configuration layer. Loading returns
/// `None` when nothing usable is stored.
pub trait CalibrationStore {
    /// Failure reported by `save`
    type Error: fmt::Display;

    /// Stored parameters for a module with `channel_count` channels
    fn load(&mut self, channel_count: usize) -> Option<CalibrationParams>;

    /// Persist the parameters
    fn save(&mut self, params: &CalibrationParams) -> Result<(), Self::Error>;
}

/// Store that keeps nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCalibrationStore;

impl CalibrationStore for NullCalibrationStore {
    type Error = core::convert::Infallible;

    fn load(&mut self, _channel_count: usize) -> Option<CalibrationParams> {
        None
    }

    fn save(&mut self, _params: &CalibrationParams) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Calibration session in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalibrationSession {
    /// Normal operation
    #[default]
    Idle,
    /// Acquiring the zero reading
    Offset,
    /// Acquiring a reference reading
    Scaling {
        /// Channel index (0-based)
        channel: u8,
        /// Scaled value the reading should map to
        target: i32,
    },
}

/// Result of a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new session began
    Started,
    /// A session was already running; nothing changed
    AlreadyRunning,
}

/// What a completed session changed
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationOutcome {
    /// Offsets set on all channels
    Offset,
    /// New scaling factor on one channel
    Scaling {
        /// Channel index (0-based)
        channel: u8,
        /// Derived factor
        factor: f32,
    },
}

/// Calibration state machine
///
/// Owns only the session. The aggregator, scheduler and parameters belong to
/// the sensor module and are borrowed for each transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalibrationController {
    session: CalibrationSession,
}

impl CalibrationController {
    /// Idle controller
    pub const fn new() -> Self {
        Self { session: CalibrationSession::Idle }
    }

    /// Current session
    pub fn session(&self) -> CalibrationSession {
        self.session
    }

    /// Whether a session is running
    pub fn is_running(&self) -> bool {
        self.session != CalibrationSession::Idle
    }

    /// Begin an offset measurement
    pub fn start_offset(
        &mut self,
        aggregator: &mut SampleAggregator,
        scheduler: &mut ReportingScheduler,
    ) -> StartOutcome {
        if self.is_running() {
            return StartOutcome::AlreadyRunning;
        }
        self.begin(CalibrationSession::Offset, aggregator, scheduler);
        StartOutcome::Started
    }

    /// Begin a scaling measurement on `channel_number` (1-based)
    ///
    /// A running session makes this a no-op. Otherwise a channel number
    /// outside `1..=channel_count` is rejected before anything changes.
    pub fn start_scaling(
        &mut self,
        channel_number: u16,
        target: i32,
        aggregator: &mut SampleAggregator,
        scheduler: &mut ReportingScheduler,
    ) -> SensorResult<StartOutcome> {
        if self.is_running() {
            return Ok(StartOutcome::AlreadyRunning);
        }
        let count = aggregator.channel_count();
        if channel_number == 0 || usize::from(channel_number) > count {
            return Err(SensorError::ChannelOutOfRange { channel: channel_number, count: count as u8 });
        }
        let channel = (channel_number - 1) as u8;
        self.begin(CalibrationSession::Scaling { channel, target }, aggregator, scheduler);
        Ok(StartOutcome::Started)
    }

    fn begin(
        &mut self,
        session: CalibrationSession,
        aggregator: &mut SampleAggregator,
        scheduler: &mut ReportingScheduler,
    ) {
        scheduler.suspend();
        aggregator.set_target(AveragingTarget::Calibration);
        self.session = session;
    }

    /// Finish the running session with the averaged `record`
    ///
    /// Updates `params` and returns to idle. The aggregator goes back to its
    /// normal window and the scheduler resumes at `now` whether or not the
    /// derivation succeeded. With no session running nothing is touched and
    /// `NoCalibrationRunning` is returned.
    pub fn complete(
        &mut self,
        now: Timestamp,
        record: &Record,
        params: &mut CalibrationParams,
        aggregator: &mut SampleAggregator,
        scheduler: &mut ReportingScheduler,
    ) -> SensorResult<CalibrationOutcome> {
        let session = core::mem::take(&mut self.session);
        let outcome = match session {
            CalibrationSession::Idle => return Err(SensorError::NoCalibrationRunning),
            CalibrationSession::Offset => {
                params.set_offsets_from(record.channels());
                Ok(CalibrationOutcome::Offset)
            }
            CalibrationSession::Scaling { channel, target } => params
                .set_scaling_from(usize::from(channel), record.channels(), target)
                .map(|factor| CalibrationOutcome::Scaling { channel, factor }),
        };

        aggregator.set_target(AveragingTarget::Normal);
        scheduler.resume(now);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AveragingWindows;
    use fugit::MillisDurationU32;

    const WINDOWS: AveragingWindows = AveragingWindows { normal: 2, calibration: 4 };

    fn parts(channels: usize) -> (SampleAggregator, ReportingScheduler, CalibrationParams) {
        let mut scheduler = ReportingScheduler::new(MillisDurationU32::millis(100));
        scheduler.start(0);
        (SampleAggregator::new(channels, WINDOWS).unwrap(), scheduler, CalibrationParams::neutral(channels))
    }

    #[test]
    fn neutral_parameters_pass_values_through() {
        let params = CalibrationParams::neutral(3);
        assert_eq!(params.apply(&[1, -2, 3]).as_slice(), &[1, -2, 3]);
    }

    #[test]
    fn scaled_value_rounds_and_saturates() {
        let cal = ChannelCalibration { offset: -10, scaling: 0.5, exponent: 0 };
        assert_eq!(cal.apply(13), 2); // 1.5 rounds away from zero
        assert_eq!(cal.apply(7), -2);

        let huge = ChannelCalibration { offset: 0, scaling: 1e10, exponent: 0 };
        assert_eq!(huge.apply(1000), i32::MAX);
        assert_eq!(huge.apply(-1000), i32::MIN);
    }

    #[test]
    fn quantize_uses_exponent() {
        let cal = ChannelCalibration { offset: 0, scaling: 1.0, exponent: 2 };
        assert_eq!(cal.quantize(2.5), 250);
        assert_eq!(cal.quantize(-0.25), -25);
    }

    #[test]
    fn offset_session() {
        let (mut agg, mut sched, mut params) = parts(2);
        let mut ctl = CalibrationController::new();

        assert_eq!(ctl.start_offset(&mut agg, &mut sched), StartOutcome::Started);
        assert_eq!(agg.target_count(), 4);
        assert!(sched.is_suspended());

        let record = Record::new(500, &[100, -40]).unwrap();
        let outcome = ctl.complete(500, &record, &mut params, &mut agg, &mut sched).unwrap();
        assert_eq!(outcome, CalibrationOutcome::Offset);
        assert_eq!(params.apply(&[100, -40]).as_slice(), &[0, 0]);
        assert_eq!(agg.target_count(), 2);
        assert!(!sched.is_suspended());
        assert!(!ctl.is_running());
    }

    #[test]
    fn scaling_session_satisfies_formula() {
        let (mut agg, mut sched, mut params) = parts(2);
        params.set_offsets_from(&[100, 0]);
        let mut ctl = CalibrationController::new();

        ctl.start_scaling(1, 1000, &mut agg, &mut sched).unwrap();
        assert_eq!(ctl.session(), CalibrationSession::Scaling { channel: 0, target: 1000 });

        let record = Record::new(800, &[600, 3]).unwrap();
        let outcome = ctl.complete(800, &record, &mut params, &mut agg, &mut sched).unwrap();
        assert_eq!(outcome, CalibrationOutcome::Scaling { channel: 0, factor: 2.0 });

        // scaled = (raw + offset) * scaling
        assert_eq!(params.apply(&[600, 3]).as_slice(), &[1000, 3]);
        assert_eq!(params.channel(1).unwrap().scaling, 1.0);
    }

    #[test]
    fn out_of_range_channel_is_rejected_without_mutation() {
        let (mut agg, mut sched, _) = parts(2);
        let mut ctl = CalibrationController::new();

        for channel in [0, 3] {
            assert_eq!(
                ctl.start_scaling(channel, 5, &mut agg, &mut sched),
                Err(SensorError::ChannelOutOfRange { channel, count: 2 })
            );
        }
        assert!(!ctl.is_running());
        assert_eq!(agg.target(), AveragingTarget::Normal);
        assert!(!sched.is_suspended());
    }

    #[test]
    fn second_start_is_a_no_op() {
        let (mut agg, mut sched, _) = parts(2);
        let mut ctl = CalibrationController::new();

        ctl.start_offset(&mut agg, &mut sched);
        assert_eq!(
            ctl.start_scaling(1, 10, &mut agg, &mut sched),
            Ok(StartOutcome::AlreadyRunning)
        );
        assert_eq!(ctl.start_offset(&mut agg, &mut sched), StartOutcome::AlreadyRunning);
        assert_eq!(ctl.session(), CalibrationSession::Offset);
    }

    #[test]
    fn zero_reference_keeps_old_factor_and_restores_state() {
        let (mut agg, mut sched, mut params) = parts(1);
        params.set_offsets_from(&[50]);
        let mut ctl = CalibrationController::new();

        ctl.start_scaling(1, 100, &mut agg, &mut sched).unwrap();
        let record = Record::new(10, &[50]).unwrap();
        assert_eq!(
            ctl.complete(10, &record, &mut params, &mut agg, &mut sched),
            Err(SensorError::ZeroScalingReference { channel: 0 })
        );
        assert_eq!(params.channel(0).unwrap().scaling, 1.0);
        assert!(!ctl.is_running());
        assert_eq!(agg.target(), AveragingTarget::Normal);
        assert!(!sched.is_suspended());
    }

    #[test]
    fn completion_without_session_is_an_error() {
        let (mut agg, mut sched, mut params) = parts(1);
        let mut ctl = CalibrationController::new();
        let record = Record::new(10, &[1]).unwrap();
        assert_eq!(
            ctl.complete(10, &record, &mut params, &mut agg, &mut sched),
            Err(SensorError::NoCalibrationRunning)
        );
    }

    #[test]
    fn resets_restore_neutral_values() {
        let mut params = CalibrationParams::neutral(2);
        params.set_offsets_from(&[3, 4]);
        params.set_scaling_from(1, &[3, 8], 8).unwrap();

        params.reset_scaling();
        assert!(params.channels().iter().all(|c| c.scaling == 1.0));
        assert_eq!(params.channel(0).unwrap().offset, -3);

        params.reset_offsets();
        assert_eq!(params.apply(&[3, 8]).as_slice(), &[3, 8]);
    }
}
