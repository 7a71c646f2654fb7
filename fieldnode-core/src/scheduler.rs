//! Pollable reporting interval
//!
//! The scheduler decides when a freshly averaged record is also written out
//! as a log line. It never blocks: the run loop calls [`ReportingScheduler::poll`]
//! once per iteration and gets `Ok(())` when a report is due or
//! `WouldBlock` otherwise.
//!
//! A report is due when a record arrived since the previous poll, the
//! scheduler is not suspended, and the interval has elapsed. Records that
//! arrive before the interval is up are not reported; the next one after it
//! is. An interval of zero turns the rate limit off and every new record is
//! reported.

use core::convert::Infallible;

use fugit::MillisDurationU32;

use crate::time::{elapsed_ms, Timestamp};

/// Repeating interval timer gated on new records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportingScheduler {
    interval: MillisDurationU32,
    started_at: Option<Timestamp>,
    suspended: bool,
    pending: bool,
}

impl ReportingScheduler {
    /// Stopped scheduler with the given interval
    pub const fn new(interval: MillisDurationU32) -> Self {
        Self { interval, started_at: None, suspended: false, pending: false }
    }

    /// Start the interval at `now` if it is non-zero
    pub fn start(&mut self, now: Timestamp) {
        self.started_at = if self.interval.ticks() > 0 { Some(now) } else { None };
    }

    /// Change the interval and restart from `now`
    pub fn set_interval(&mut self, interval: MillisDurationU32, now: Timestamp) {
        self.interval = interval;
        if !self.suspended {
            self.start(now);
        }
    }

    /// Configured interval
    pub fn interval(&self) -> MillisDurationU32 {
        self.interval
    }

    /// Stop reporting until [`resume`](Self::resume)
    pub fn suspend(&mut self) {
        self.suspended = true;
        self.started_at = None;
        self.pending = false;
    }

    /// Lift a suspension and restart the interval from `now`
    pub fn resume(&mut self, now: Timestamp) {
        self.suspended = false;
        self.start(now);
    }

    /// Whether reporting is suspended
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Whether the interval timer is running
    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// A new record was stored
    pub fn notify_record(&mut self) {
        if !self.suspended {
            self.pending = true;
        }
    }

    /// Milliseconds until the interval elapses, 0 if elapsed or stopped
    pub fn remaining(&self, now: Timestamp) -> u32 {
        match self.started_at {
            Some(start) => self.interval.ticks().saturating_sub(elapsed_ms(start, now)),
            None => 0,
        }
    }

    /// Check whether a report is due at `now`
    ///
    /// Consumes the pending-record flag on every call, so a record that
    /// arrives early is skipped rather than reported late. On firing the
    /// interval restarts from `now`.
    pub fn poll(&mut self, now: Timestamp) -> nb::Result<(), Infallible> {
        let pending = core::mem::take(&mut self.pending);
        if !pending || self.suspended {
            return Err(nb::Error::WouldBlock);
        }
        if self.interval.ticks() == 0 {
            return Ok(());
        }
        if self.remaining(now) > 0 {
            return Err(nb::Error::WouldBlock);
        }
        self.started_at = Some(now);
        Ok(())
    }
}

impl Default for ReportingScheduler {
    fn default() -> Self {
        Self::new(MillisDurationU32::millis(1000))
    }
}
