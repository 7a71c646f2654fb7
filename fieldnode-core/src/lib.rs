//! Core sample pipeline for FieldNode sensor firmware
//!
//! Collects raw multi-channel samples, averages and calibrates them, keeps
//! the results in a bounded record store and streams them out in small
//! chunks. Everything runs inside a single cooperative loop.
//!
//! Key constraints:
//! - Runs on microcontrollers with tens of KB of RAM
//! - No blocking inside any operation
//! - Readers resume across many short calls while producers keep appending
//!
//! ```
//! use fieldnode_core::config::SensorConfig;
//! use fieldnode_core::logger::{Logger, LoggerConfig};
//! use fieldnode_core::calibration::NullCalibrationStore;
//! use fieldnode_core::sensor::SensorModule;
//!
//! let mut log = Logger::new(LoggerConfig::default());
//! let mut flash = NullCalibrationStore;
//! let config = SensorConfig::with_channels(2);
//! let mut sensor = SensorModule::setup(config, 0, &mut flash, &mut log);
//!
//! for t in 1..=10 {
//!     sensor.add_sample(t * 100, &[5, 7], &mut flash, &mut log).unwrap();
//! }
//! assert_eq!(sensor.current_raw(), Some(&[5, 7][..]));
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

extern crate alloc;

#[macro_use]
mod macros;

pub mod aggregator;
pub mod calibration;
pub mod config;
pub mod errors;
pub mod format;
pub mod logger;
pub mod record;
pub mod runloop;
pub mod scheduler;
pub mod sensor;
pub mod serializer;
pub mod store;
pub mod time;

// Public API
pub use errors::{SensorError, SensorResult};
pub use record::{Record, MAX_CHANNELS};
pub use store::{Capacity, Cursor, RecordStore};
pub use sensor::SensorModule;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
