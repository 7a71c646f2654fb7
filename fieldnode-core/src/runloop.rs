//! Cooperative run loop bookkeeping
//!
//! The firmware's main loop calls [`RunLoop::tick`] once per iteration. It
//! tracks the device health state and loop timing, then lets the sensor
//! module report.

use crate::logger::Logger;
use crate::sensor::SensorModule;
use crate::time::{elapsed_ms, TimeSource, Timestamp};

/// Device health
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Network not up yet
    Init,
    /// Network up, no error logged
    Good,
    /// An error was logged; never left until restart
    Error,
}

/// Loop duration statistics in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    /// Rolling mean, weighted 9:1 toward history
    pub mean_ms: u32,
    /// Shortest iteration
    pub min_ms: u32,
    /// Longest iteration
    pub max_ms: u32,
    last: Option<Timestamp>,
}

impl Default for LoopStats {
    fn default() -> Self {
        Self { mean_ms: 0, min_ms: u32::MAX, max_ms: 0, last: None }
    }
}

impl LoopStats {
    /// Record an iteration starting at `now`
    ///
    /// The first call only remembers the time. The second seeds the mean
    /// with its duration, later ones blend in a tenth of theirs.
    pub fn update(&mut self, now: Timestamp) {
        if let Some(last) = self.last {
            let duration = elapsed_ms(last, now);
            self.max_ms = self.max_ms.max(duration);
            self.min_ms = self.min_ms.min(duration);
            self.mean_ms = if self.mean_ms == 0 {
                duration
            } else {
                libm::roundf(0.9 * self.mean_ms as f32 + 0.1 * duration as f32) as u32
            };
        }
        self.last = Some(now);
    }

    /// Whether at least one duration was measured
    pub fn has_samples(&self) -> bool {
        self.min_ms != u32::MAX
    }
}

/// Main loop state of a node
#[derive(Debug)]
pub struct RunLoop {
    state: NodeState,
    stats: LoopStats,
}

impl Default for RunLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLoop {
    /// Loop in `Init` state
    pub const fn new() -> Self {
        Self {
            state: NodeState::Init,
            stats: LoopStats { mean_ms: 0, min_ms: u32::MAX, max_ms: 0, last: None },
        }
    }

    /// Health state after the last tick
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Loop timing
    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// Run one iteration
    ///
    /// Loop timing is only measured in `Good` state, so the long iterations
    /// of network bring-up do not skew the maximum. Returns whether the
    /// sensor wrote a report.
    pub fn tick<T: TimeSource>(
        &mut self,
        time: &T,
        network_up: bool,
        sensor: &mut SensorModule,
        log: &mut Logger,
    ) -> bool {
        let now = time.now();
        if self.state == NodeState::Good {
            self.stats.update(now);
        }
        self.update_state(network_up, log);
        sensor.poll(now, log)
    }

    fn update_state(&mut self, network_up: bool, log: &Logger) {
        if self.state == NodeState::Error {
            return;
        }
        self.state = if log.has_error() {
            NodeState::Error
        } else if network_up {
            NodeState::Good
        } else {
            NodeState::Init
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::NullCalibrationStore;
    use crate::config::SensorConfig;
    use crate::logger::{Level, LoggerConfig};
    use crate::time::MockTimeSource;

    #[test]
    fn rolling_mean() {
        let mut stats = LoopStats::default();
        stats.update(0);
        assert!(!stats.has_samples());

        stats.update(10);
        assert_eq!(stats.mean_ms, 10);
        stats.update(30);
        assert_eq!(stats.mean_ms, 11);
        assert_eq!((stats.min_ms, stats.max_ms), (10, 20));
    }

    #[test]
    fn state_transitions() {
        let time = MockTimeSource::new(0);
        let mut log = Logger::new(LoggerConfig::default());
        let mut sensor = SensorModule::setup(SensorConfig::with_channels(1), 0, &mut NullCalibrationStore, &mut log);
        let mut run = RunLoop::new();

        run.tick(&time, false, &mut sensor, &mut log);
        assert_eq!(run.state(), NodeState::Init);

        run.tick(&time, true, &mut sensor, &mut log);
        assert_eq!(run.state(), NodeState::Good);

        time.advance(5);
        run.tick(&time, true, &mut sensor, &mut log);
        time.advance(7);
        run.tick(&time, true, &mut sensor, &mut log);
        assert_eq!(run.stats().max_ms, 7);

        log.write(Level::Error, time.now(), "sensor lost");
        run.tick(&time, true, &mut sensor, &mut log);
        assert_eq!(run.state(), NodeState::Error);
        run.tick(&time, true, &mut sensor, &mut log);
        assert_eq!(run.state(), NodeState::Error);
    }

    #[test]
    fn tick_reports_new_records() {
        let time = MockTimeSource::new(0);
        let mut log = Logger::new(LoggerConfig::default());
        let config = SensorConfig { sample_averaging: 1, reporting_interval_ms: 0, ..SensorConfig::with_channels(2) };
        let mut sensor = SensorModule::setup(config, 0, &mut NullCalibrationStore, &mut log);
        let mut run = RunLoop::new();

        assert!(!run.tick(&time, true, &mut sensor, &mut log));
        sensor.add_sample(1, &[5, 7], &mut NullCalibrationStore, &mut log).unwrap();
        assert!(run.tick(&time, true, &mut sensor, &mut log));
        assert!(!run.tick(&time, true, &mut sensor, &mut log));
    }
}
