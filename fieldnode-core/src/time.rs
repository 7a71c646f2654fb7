//! Device uptime handling
//!
//! All timestamps in the pipeline are milliseconds since boot in a `u32`,
//! which wraps after roughly 49.7 days. Interval arithmetic therefore uses
//! wrapping subtraction everywhere.

use core::cell::Cell;
use core::fmt;

/// Milliseconds since device boot
pub type Timestamp = u32;

/// Source of device uptime
///
/// Hardware implementations read a timer peripheral. Tests use
/// [`MockTimeSource`].
pub trait TimeSource {
    /// Current uptime in milliseconds
    fn now(&self) -> Timestamp;

    /// Smallest measurable step in milliseconds
    fn precision_ms(&self) -> u32 {
        1
    }
}

/// Milliseconds elapsed from `earlier` to `later`, tolerating one wrap
pub const fn elapsed_ms(earlier: Timestamp, later: Timestamp) -> u32 {
    later.wrapping_sub(earlier)
}

/// Whether `t` lies before `reference`
///
/// Gaps of more than half the `u32` range count as a wrap, so a timestamp
/// just after the wrap is still later than one just before it.
pub const fn is_before(t: Timestamp, reference: Timestamp) -> bool {
    elapsed_ms(reference, t) > u32::MAX / 2
}

/// Controllable time source for tests and simulation
///
/// Interior mutability lets a test advance time while a component holds a
/// shared reference to the source.
#[derive(Debug, Default)]
pub struct MockTimeSource {
    now: Cell<Timestamp>,
}

impl MockTimeSource {
    /// Create a source starting at `start`
    pub const fn new(start: Timestamp) -> Self {
        Self { now: Cell::new(start) }
    }

    /// Jump to an absolute time
    pub fn set(&self, timestamp: Timestamp) {
        self.now.set(timestamp);
    }

    /// Move forward by `ms`
    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

impl TimeSource for MockTimeSource {
    fn now(&self) -> Timestamp {
        self.now.get()
    }
}

/// Human readable uptime, e.g. `02:03:04.005` or `1d 02:03:04.005`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uptime(pub Timestamp);

impl fmt::Display for Uptime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.0 % 1000;
        let total_secs = self.0 / 1000;
        let secs = total_secs % 60;
        let mins = (total_secs / 60) % 60;
        let hours = (total_secs / 3600) % 24;
        let days = total_secs / 86_400;

        if days > 0 {
            write!(f, "{}d ", days)?;
        }
        write!(f, "{:02}:{:02}:{:02}.{:03}", hours, mins, secs, ms)
    }
}
