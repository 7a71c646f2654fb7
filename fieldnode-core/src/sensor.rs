//! Sensor module
//!
//! Owns the whole sample pipeline of one sensor: aggregator, record store,
//! calibration parameters and session, reporting scheduler and the two
//! export sessions served over HTTP.
//!
//! ```text
//! add_sample ─→ SampleAggregator ─┬─→ RecordStore ─┬─→ poll → Logger (Data CSV)
//!                                 │                ├─→ live export
//!                                 │                └─→ CSV export
//!                                 └─→ CalibrationController → CalibrationStore
//!                                     (while a session runs)
//! ```
//!
//! A module configured with zero channels is disabled at setup. It logs an
//! error once and every later call is a no-op returning
//! [`SensorError::ModuleDisabled`] or an empty result.

use core::fmt;

use crate::aggregator::SampleAggregator;
use crate::calibration::{
    CalibrationController, CalibrationOutcome, CalibrationParams, CalibrationSession, CalibrationStore,
    ChannelCalibration, StartOutcome,
};
use crate::config::SensorConfig;
use crate::errors::{SensorError, SensorResult};
use crate::logger::{Level, Logger};
use crate::record::{Channels, Record};
use crate::scheduler::ReportingScheduler;
use crate::serializer::{ExportMode, ExportSession};
use crate::store::RecordStore;
use crate::time::{is_before, Timestamp, Uptime};

/// Module name shown in listings
pub const DESCRIPTION: &str = "Sensor Module";

/// Base path of the module's web endpoints
pub const URI: &str = "/sensor";

/// Store fill level, displayed as `"12/100 (fixed)"`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStatus {
    /// Records held
    pub size: usize,
    /// Maximum records, or current allocation when adaptive
    pub capacity: usize,
    /// Whether the store grows on demand
    pub adaptive: bool,
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.adaptive { "adaptive" } else { "fixed" };
        write!(f, "{}/{} ({})", self.size, self.capacity, mode)
    }
}

/// One row of the channel table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelDetail<'a> {
    /// Channel number (1-based)
    pub number: u16,
    /// Measured quantity
    pub kind: &'a str,
    /// Unit
    pub unit: &'a str,
    /// Current calibration
    pub calibration: ChannelCalibration,
}

#[derive(Debug)]
struct Pipeline {
    store: RecordStore<Record>,
    aggregator: SampleAggregator,
    calibration: CalibrationController,
    params: CalibrationParams,
    scheduler: ReportingScheduler,
    live: ExportSession,
    csv: ExportSession,
}

/// Sample pipeline of one sensor
#[derive(Debug)]
pub struct SensorModule {
    config: SensorConfig,
    pipeline: Option<Pipeline>,
}

impl SensorModule {
    /// Build the pipeline from `config`
    ///
    /// Loads persisted calibration, falling back to neutral parameters when
    /// nothing matching the channel count is stored, and starts the
    /// reporting interval at `now`.
    pub fn setup<S: CalibrationStore>(
        config: SensorConfig,
        now: Timestamp,
        persist: &mut S,
        log: &mut Logger,
    ) -> Self {
        match config.validate() {
            Err(err) if err.is_configuration() => {
                log.write(Level::Error, now, format_args!("{}.", err));
                return Self { config, pipeline: None };
            }
            Err(err) => log.write(Level::Warning, now, format_args!("{}, using the minimum.", err)),
            Ok(()) => {}
        }

        let count = usize::from(config.channel_count);
        let aggregator = match SampleAggregator::new(count, config.averaging_windows()) {
            Ok(aggregator) => aggregator,
            Err(err) => {
                log.write(Level::Error, now, format_args!("{}.", err));
                return Self { config, pipeline: None };
            }
        };

        let params = match persist.load(count) {
            Some(params) if params.len() == count => params,
            Some(_) => {
                log.write(Level::Warning, now, "Stored calibration does not match channel count, using neutral values.");
                CalibrationParams::neutral(count)
            }
            None => CalibrationParams::neutral(count),
        };

        let mut scheduler = ReportingScheduler::new(config.reporting_interval());
        scheduler.start(now);

        let pipeline = Pipeline {
            store: RecordStore::new(config.storage),
            aggregator,
            calibration: CalibrationController::new(),
            params,
            scheduler,
            live: ExportSession::new(ExportMode::Latest, config.matrix_column_count),
            csv: ExportSession::new(ExportMode::History, config.matrix_column_count),
        };
        log.write(Level::Info, now, format_args!("{} ready with {} channels.", DESCRIPTION, count));

        Self { config, pipeline: Some(pipeline) }
    }

    /// Whether setup succeeded
    pub fn is_enabled(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Active configuration
    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    fn pipeline_mut(&mut self) -> SensorResult<&mut Pipeline> {
        self.pipeline.as_mut().ok_or(SensorError::ModuleDisabled)
    }

    /// Feed one raw sample from the driver
    ///
    /// When the sample completes an averaging cycle the record is stored,
    /// or, while a calibration runs, handed to the calibration instead and
    /// the resulting parameters are persisted.
    ///
    /// The caller owns monotonicity of `now`. A record older than the newest
    /// stored one is still stored, with a warning, and breaks the oldest to
    /// newest timestamp order of exports.
    pub fn add_sample<S: CalibrationStore>(
        &mut self,
        now: Timestamp,
        raw: &[i32],
        persist: &mut S,
        log: &mut Logger,
    ) -> SensorResult<()> {
        let p = self.pipeline_mut()?;
        let Some(cycle) = p.aggregator.add_sample(now, raw)? else {
            return Ok(());
        };

        if !p.calibration.is_running() {
            if let Some(newest) = p.store.newest() {
                if is_before(cycle.record.timestamp(), newest.timestamp()) {
                    log.write(
                        Level::Warning,
                        now,
                        format_args!("Sample time went backwards from {}.", Uptime(newest.timestamp())),
                    );
                }
            }
            p.store.append(cycle.record);
            p.scheduler.notify_record();
            return Ok(());
        }

        let outcome =
            p.calibration.complete(now, &cycle.record, &mut p.params, &mut p.aggregator, &mut p.scheduler);
        match outcome {
            Ok(CalibrationOutcome::Offset) | Ok(CalibrationOutcome::Scaling { .. }) => {
                if let Err(err) = persist.save(&p.params) {
                    log.write(Level::Error, now, format_args!("Saving calibration failed: {}", err));
                }
                log.write(
                    Level::Info,
                    now,
                    format_args!("Offset/Scaling measurement done in {} ms.", cycle.duration_ms()),
                );
            }
            // recovered here, the old factor stays
            Err(err) => log.write(Level::Warning, now, format_args!("Calibration failed: {}.", err)),
        }
        Ok(())
    }

    /// Feed a sample of physical values, stored as `value * 10^exponent`
    pub fn add_float_sample<S: CalibrationStore>(
        &mut self,
        now: Timestamp,
        values: &[f32],
        persist: &mut S,
        log: &mut Logger,
    ) -> SensorResult<()> {
        let p = self.pipeline_mut()?;
        let raw: Channels = p
            .params
            .channels()
            .iter()
            .zip(values)
            .map(|(cal, &value)| cal.quantize(value))
            .collect();
        if values.len() != raw.len() {
            return Err(SensorError::ChannelMismatch { expected: raw.len(), actual: values.len() });
        }
        self.add_sample(now, &raw, persist, log)
    }

    /// Report the newest record if the interval allows
    ///
    /// Writes the scaled values as a `Data` CSV line. Returns whether a
    /// report was written.
    pub fn poll(&mut self, now: Timestamp, log: &mut Logger) -> bool {
        let Some(p) = self.pipeline.as_mut() else {
            return false;
        };
        if p.scheduler.poll(now).is_err() {
            return false;
        }
        match p.store.newest() {
            Some(record) => {
                let scaled = p.params.apply(record.channels());
                log.write_csv(Level::Data, now, &scaled, self.config.matrix_column_count);
                true
            }
            None => false,
        }
    }

    /// Raw values of the newest record
    pub fn current_raw(&self) -> Option<&[i32]> {
        self.pipeline.as_ref()?.store.newest().map(Record::channels)
    }

    /// Calibrated values of the newest record
    pub fn current_scaled(&self) -> Option<Channels> {
        let p = self.pipeline.as_ref()?;
        p.store.newest().map(|record| p.params.apply(record.channels()))
    }

    /// Start an offset measurement
    pub fn measure_offset(&mut self, now: Timestamp, log: &mut Logger) -> SensorResult<StartOutcome> {
        let p = self.pipeline_mut()?;
        let outcome = p.calibration.start_offset(&mut p.aggregator, &mut p.scheduler);
        if outcome == StartOutcome::Started {
            log.write(Level::Info, now, "Offset measurement started.");
        }
        Ok(outcome)
    }

    /// Start a scaling measurement on `channel_number` (1-based)
    pub fn measure_scaling(
        &mut self,
        channel_number: u16,
        target: i32,
        now: Timestamp,
        log: &mut Logger,
    ) -> SensorResult<StartOutcome> {
        let p = self.pipeline_mut()?;
        match p.calibration.start_scaling(channel_number, target, &mut p.aggregator, &mut p.scheduler) {
            Ok(StartOutcome::Started) => {
                log.write(Level::Info, now, format_args!("Scaling measurement of channel {} started.", channel_number));
                Ok(StartOutcome::Started)
            }
            Ok(StartOutcome::AlreadyRunning) => Ok(StartOutcome::AlreadyRunning),
            Err(err) => {
                log.write(Level::Warning, now, format_args!("Scaling measurement rejected: {}.", err));
                Err(err)
            }
        }
    }

    /// Running calibration session
    pub fn calibration_session(&self) -> CalibrationSession {
        self.pipeline.as_ref().map(|p| p.calibration.session()).unwrap_or_default()
    }

    /// Zero offsets on all channels and persist
    pub fn reset_offset<S: CalibrationStore>(
        &mut self,
        now: Timestamp,
        persist: &mut S,
        log: &mut Logger,
    ) -> SensorResult<()> {
        let p = self.pipeline_mut()?;
        p.params.reset_offsets();
        save_params(&p.params, now, persist, log);
        Ok(())
    }

    /// Unit scaling on all channels and persist
    pub fn reset_scaling<S: CalibrationStore>(
        &mut self,
        now: Timestamp,
        persist: &mut S,
        log: &mut Logger,
    ) -> SensorResult<()> {
        let p = self.pipeline_mut()?;
        p.params.reset_scaling();
        save_params(&p.params, now, persist, log);
        Ok(())
    }

    /// Set the display exponent of `channel_number` (1-based) and persist
    pub fn set_exponent<S: CalibrationStore>(
        &mut self,
        channel_number: u16,
        exponent: i8,
        now: Timestamp,
        persist: &mut S,
        log: &mut Logger,
    ) -> SensorResult<()> {
        let count = self.config.channel_count;
        let p = self.pipeline_mut()?;
        let out_of_range = SensorError::ChannelOutOfRange { channel: channel_number, count };
        let index = usize::from(channel_number).checked_sub(1).ok_or(out_of_range)?;
        if !p.params.set_exponent(index, exponent) {
            return Err(out_of_range);
        }
        save_params(&p.params, now, persist, log);
        Ok(())
    }

    /// Current calibration parameters
    pub fn params(&self) -> Option<&CalibrationParams> {
        self.pipeline.as_ref().map(|p| &p.params)
    }

    /// Update one runtime setting and apply it to the running pipeline
    ///
    /// The change is validated on a copy first; a rejected value leaves the
    /// configuration untouched.
    pub fn update_setting(&mut self, key: &str, value: &str, now: Timestamp) -> SensorResult<()> {
        let mut config = self.config.clone();
        config.apply(key, value)?;
        config.validate()?;

        if let Some(p) = self.pipeline.as_mut() {
            p.aggregator.set_windows(config.averaging_windows());
            if config.reporting_interval_ms != self.config.reporting_interval_ms {
                p.scheduler.set_interval(config.reporting_interval(), now);
            }
            p.live.set_matrix_columns(config.matrix_column_count);
            p.csv.set_matrix_columns(config.matrix_column_count);
        }
        self.config = config;
        Ok(())
    }

    /// Fill the next chunk of the live endpoint, newest record only
    pub fn fill_live(&mut self, buf: &mut [u8], index: usize) -> usize {
        match self.pipeline.as_mut() {
            Some(p) => p.live.fill(&p.store, buf, index),
            None => 0,
        }
    }

    /// Fill the next chunk of the CSV endpoint, full history oldest first
    pub fn fill_csv(&mut self, buf: &mut [u8], index: usize) -> usize {
        match self.pipeline.as_mut() {
            Some(p) => p.csv.fill(&p.store, buf, index),
            None => 0,
        }
    }

    /// Record store fill level
    pub fn status(&self) -> Option<StoreStatus> {
        self.pipeline.as_ref().map(|p| StoreStatus {
            size: p.store.size(),
            capacity: p.store.capacity(),
            adaptive: p.store.is_adaptive(),
        })
    }

    /// Stored records, oldest first
    pub fn store(&self) -> Option<&RecordStore<Record>> {
        self.pipeline.as_ref().map(|p| &p.store)
    }

    /// Per-channel labels and calibration
    pub fn channel_details(&self) -> impl Iterator<Item = ChannelDetail<'_>> + '_ {
        let channels = self.pipeline.as_ref().map(|p| p.params.channels()).unwrap_or(&[]);
        channels.iter().enumerate().map(move |(i, calibration)| ChannelDetail {
            number: i as u16 + 1,
            kind: self.config.channel_type(i),
            unit: self.config.channel_unit(i),
            calibration: *calibration,
        })
    }
}

fn save_params<S: CalibrationStore>(params: &CalibrationParams, now: Timestamp, persist: &mut S, log: &mut Logger) {
    if let Err(err) = persist.save(params) {
        log.write(Level::Error, now, format_args!("Saving calibration failed: {}", err));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::NullCalibrationStore;
    use crate::logger::LoggerConfig;
    use crate::store::Capacity;

    fn module(channels: u8, averaging: u8) -> (SensorModule, Logger) {
        let mut log = Logger::new(LoggerConfig::default());
        let config = SensorConfig {
            sample_averaging: averaging,
            calibration_averaging: 2,
            reporting_interval_ms: 0,
            storage: Capacity::fixed(3).unwrap(),
            ..SensorConfig::with_channels(channels)
        };
        let sensor = SensorModule::setup(config, 0, &mut NullCalibrationStore, &mut log);
        (sensor, log)
    }

    #[test]
    fn zero_channels_disable_module() {
        let mut log = Logger::new(LoggerConfig::default());
        let mut sensor =
            SensorModule::setup(SensorConfig::default(), 0, &mut NullCalibrationStore, &mut log);
        assert!(!sensor.is_enabled());
        assert!(log.has_error());
        assert_eq!(
            sensor.add_sample(1, &[1], &mut NullCalibrationStore, &mut log),
            Err(SensorError::ModuleDisabled)
        );
        assert_eq!(sensor.fill_csv(&mut [0u8; 16], 0), 0);
        assert!(sensor.status().is_none());
        assert_eq!(sensor.channel_details().count(), 0);
    }

    #[test]
    fn averaged_records_are_stored() {
        let (mut sensor, mut log) = module(2, 2);
        sensor.add_sample(1, &[1, 10], &mut NullCalibrationStore, &mut log).unwrap();
        assert!(sensor.current_raw().is_none());
        sensor.add_sample(2, &[3, 20], &mut NullCalibrationStore, &mut log).unwrap();
        assert_eq!(sensor.current_raw(), Some(&[2, 15][..]));
        assert_eq!(sensor.status().unwrap().to_string(), "1/3 (fixed)");
    }

    #[test]
    fn calibration_output_is_not_stored() {
        let (mut sensor, mut log) = module(1, 1);
        sensor.add_sample(1, &[5], &mut NullCalibrationStore, &mut log).unwrap();
        sensor.measure_offset(1, &mut log).unwrap();
        sensor.add_sample(2, &[5], &mut NullCalibrationStore, &mut log).unwrap();
        sensor.add_sample(3, &[5], &mut NullCalibrationStore, &mut log).unwrap();

        assert_eq!(sensor.store().unwrap().size(), 1);
        assert_eq!(sensor.calibration_session(), CalibrationSession::Idle);
        assert_eq!(sensor.current_scaled().unwrap().as_slice(), &[0]);
    }

    #[test]
    fn setting_update_reaches_pipeline() {
        let (mut sensor, mut log) = module(1, 5);
        sensor.update_setting("sample_averaging", "1", 0).unwrap();
        sensor.add_sample(1, &[7], &mut NullCalibrationStore, &mut log).unwrap();
        assert_eq!(sensor.current_raw(), Some(&[7][..]));

        assert!(sensor.update_setting("sample_averaging", "0", 0).is_err());
        assert_eq!(sensor.config().sample_averaging, 1);
    }

    #[test]
    fn exponent_applies_to_float_samples() {
        let (mut sensor, mut log) = module(2, 1);
        sensor.set_exponent(2, 1, 0, &mut NullCalibrationStore, &mut log).unwrap();
        sensor.add_float_sample(1, &[1.4, 2.5], &mut NullCalibrationStore, &mut log).unwrap();
        assert_eq!(sensor.current_raw(), Some(&[1, 25][..]));

        assert_eq!(
            sensor.set_exponent(0, 1, 0, &mut NullCalibrationStore, &mut log),
            Err(SensorError::ChannelOutOfRange { channel: 0, count: 2 })
        );
        assert_eq!(
            sensor.set_exponent(3, 1, 0, &mut NullCalibrationStore, &mut log),
            Err(SensorError::ChannelOutOfRange { channel: 3, count: 2 })
        );
        assert_eq!(
            sensor.add_float_sample(2, &[1.0], &mut NullCalibrationStore, &mut log),
            Err(SensorError::ChannelMismatch { expected: 2, actual: 1 })
        );
    }

    #[test]
    fn channel_details_carry_labels() {
        let mut log = Logger::new(LoggerConfig::default());
        let mut config = SensorConfig::with_channels(2);
        config.channel_types = vec!["Temperature".into(), "Humidity".into()];
        config.channel_units = vec!["°C".into()];
        let sensor = SensorModule::setup(config, 0, &mut NullCalibrationStore, &mut log);

        let rows: Vec<_> = sensor.channel_details().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].number, rows[0].kind, rows[0].unit), (1, "Temperature", "°C"));
        assert_eq!((rows[1].number, rows[1].unit), (2, ""));
        assert_eq!(rows[1].calibration, ChannelCalibration::default());
    }
}
