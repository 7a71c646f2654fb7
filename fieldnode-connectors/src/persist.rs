//! JSON settings on flash
//!
//! Every persisted settings object is one JSON file on a [`FlashBackend`],
//! keyed by [`Persisted::KEY`]. [`JsonStore`] reads and writes them and also
//! serves as the sensor module's [`CalibrationStore`].
//!
//! Unreadable files are treated as missing: the caller falls back to
//! defaults and the next save overwrites the damaged file.

use std::collections::HashMap;

use fieldnode_core::calibration::{CalibrationParams, CalibrationStore};
use fieldnode_core::config::SensorConfig;
use fieldnode_core::logger::LoggerConfig;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Persistence errors
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Flash write of '{key}' failed: {reason}")]
    Write { key: String, reason: String },

    #[error("Encoding '{key}' failed: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Raw key/value file storage
pub trait FlashBackend {
    /// File contents, `None` if absent
    fn read(&self, key: &str) -> Option<Vec<u8>>;

    /// Replace a file
    fn write(&mut self, key: &str, data: &[u8]) -> Result<(), PersistError>;

    /// Delete a file, absent files are fine
    fn remove(&mut self, key: &str);
}

/// Flash backend in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryFlash {
    files: HashMap<String, Vec<u8>>,
    read_only: bool,
}

impl MemoryFlash {
    /// Empty flash
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject all writes, as a worn or locked flash would
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// File contents as text
    pub fn file(&self, key: &str) -> Option<String> {
        self.files.get(key).map(|data| String::from_utf8_lossy(data).into_owned())
    }
}

impl FlashBackend for MemoryFlash {
    fn read(&self, key: &str) -> Option<Vec<u8>> {
        self.files.get(key).cloned()
    }

    fn write(&mut self, key: &str, data: &[u8]) -> Result<(), PersistError> {
        if self.read_only {
            return Err(PersistError::Write { key: key.to_string(), reason: "read-only".to_string() });
        }
        self.files.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) {
        self.files.remove(key);
    }
}

/// A settings object stored as one JSON file
pub trait Persisted: Serialize + DeserializeOwned {
    /// File name
    const KEY: &'static str;
}

impl Persisted for SensorConfig {
    const KEY: &'static str = "cfgSensor";
}

impl Persisted for LoggerConfig {
    const KEY: &'static str = "cfgLogger";
}

impl Persisted for CalibrationParams {
    const KEY: &'static str = "cfgSensorCalibration";
}

/// Typed JSON files on a flash backend
#[derive(Debug, Default, Clone)]
pub struct JsonStore<B> {
    backend: B,
}

impl<B: FlashBackend> JsonStore<B> {
    /// Store on `backend`
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Underlying backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable backend access
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Load `T`, `None` when absent or unreadable
    pub fn read<T: Persisted>(&self) -> Option<T> {
        let data = self.backend.read(T::KEY)?;
        match serde_json::from_slice(&data) {
            Ok(value) => Some(value),
            Err(err) => {
                log::warn!("Ignoring unreadable settings file '{}': {}", T::KEY, err);
                None
            }
        }
    }

    /// Load `T` or its default
    pub fn read_or_default<T: Persisted + Default>(&self) -> T {
        self.read().unwrap_or_default()
    }

    /// Save `T`
    pub fn write<T: Persisted>(&mut self, value: &T) -> Result<(), PersistError> {
        let data = serde_json::to_vec(value).map_err(|source| PersistError::Encode { key: T::KEY.to_string(), source })?;
        self.backend.write(T::KEY, &data)?;
        log::debug!("saved '{}' ({} bytes)", T::KEY, data.len());
        Ok(())
    }

    /// Delete the file of `T`, restoring defaults on next boot
    pub fn remove<T: Persisted>(&mut self) {
        self.backend.remove(T::KEY);
    }
}

impl<B: FlashBackend> CalibrationStore for JsonStore<B> {
    type Error = PersistError;

    fn load(&mut self, channel_count: usize) -> Option<CalibrationParams> {
        self.read::<CalibrationParams>().filter(|params| params.len() == channel_count)
    }

    fn save(&mut self, params: &CalibrationParams) -> Result<(), Self::Error> {
        self.write(params)
    }
}
