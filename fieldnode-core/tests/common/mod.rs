//! Shared fixtures for integration tests
//!
//! - `MemoryCalibrationStore`: calibration persistence that remembers saves
//! - `CaptureSink`: log output collected into a shared vector
//! - `Rig`: a sensor module wired to the above plus a mock clock

#![allow(dead_code)]

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use fieldnode_core::calibration::{CalibrationParams, CalibrationStore};
use fieldnode_core::config::SensorConfig;
use fieldnode_core::logger::{LogSink, Logger, LoggerConfig};
use fieldnode_core::sensor::SensorModule;
use fieldnode_core::time::{MockTimeSource, TimeSource};
use fieldnode_core::Capacity;

/// Calibration store backed by memory
#[derive(Debug, Default)]
pub struct MemoryCalibrationStore {
    pub stored: Option<CalibrationParams>,
    pub saves: usize,
    pub fail_saves: bool,
}

#[derive(Debug)]
pub struct SaveFailed;

impl fmt::Display for SaveFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("flash write failed")
    }
}

impl CalibrationStore for MemoryCalibrationStore {
    type Error = SaveFailed;

    fn load(&mut self, _channel_count: usize) -> Option<CalibrationParams> {
        self.stored.clone()
    }

    fn save(&mut self, params: &CalibrationParams) -> Result<(), Self::Error> {
        if self.fail_saves {
            return Err(SaveFailed);
        }
        self.stored = Some(params.clone());
        self.saves += 1;
        Ok(())
    }
}

/// Log sink collecting lines
#[derive(Debug, Clone, Default)]
pub struct CaptureSink(Rc<RefCell<Vec<String>>>);

impl CaptureSink {
    pub fn lines(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.0.borrow().iter().any(|line| line.contains(needle))
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl LogSink for CaptureSink {
    fn write_line(&mut self, line: &str) {
        self.0.borrow_mut().push(line.to_string());
    }
}

/// Configuration used by most scenarios
pub fn config(channels: u8, averaging: u8, store_len: usize) -> SensorConfig {
    SensorConfig {
        sample_averaging: averaging,
        calibration_averaging: 4,
        reporting_interval_ms: 0,
        storage: Capacity::fixed(store_len).expect("non-zero store"),
        ..SensorConfig::with_channels(channels)
    }
}

/// Sensor module with its collaborators
pub struct Rig {
    pub sensor: SensorModule,
    pub log: Logger,
    pub console: CaptureSink,
    pub flash: MemoryCalibrationStore,
    pub time: MockTimeSource,
}

impl Rig {
    pub fn new(config: SensorConfig) -> Self {
        Self::with_flash(config, MemoryCalibrationStore::default())
    }

    pub fn with_flash(config: SensorConfig, mut flash: MemoryCalibrationStore) -> Self {
        let console = CaptureSink::default();
        let mut log = Logger::new(LoggerConfig::default()).with_console(console.clone());
        let time = MockTimeSource::new(0);
        let sensor = SensorModule::setup(config, time.now(), &mut flash, &mut log);
        Self { sensor, log, console, flash, time }
    }

    /// Feed one raw sample, advancing the clock by 10 ms
    pub fn sample(&mut self, raw: &[i32]) {
        self.time.advance(10);
        self.sensor
            .add_sample(self.time.now(), raw, &mut self.flash, &mut self.log)
            .expect("sample accepted");
    }

    /// Feed the same sample `n` times
    pub fn repeat(&mut self, n: usize, raw: &[i32]) {
        for _ in 0..n {
            self.sample(raw);
        }
    }

    /// Feed one sample and return its record's timestamp
    pub fn record_at(&mut self, timestamp: u32, raw: &[i32]) {
        self.time.set(timestamp);
        self.sensor
            .add_sample(timestamp, raw, &mut self.flash, &mut self.log)
            .expect("sample accepted");
    }

    /// Drain an export with buffers of `size` bytes
    pub fn drain(&mut self, live: bool, size: usize) -> String {
        let mut body = Vec::new();
        let mut buf = vec![0u8; size];
        loop {
            let n = if live {
                self.sensor.fill_live(&mut buf, body.len())
            } else {
                self.sensor.fill_csv(&mut buf, body.len())
            };
            if n == 0 {
                break;
            }
            body.extend_from_slice(&buf[..n]);
        }
        String::from_utf8(body).expect("utf-8 body")
    }
}
