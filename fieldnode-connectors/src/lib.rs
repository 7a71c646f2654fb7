//! Host-side glue around the FieldNode sample pipeline
//!
//! ## Overview
//!
//! The core crate knows nothing about HTTP, MQTT or flash. This crate adapts
//! it to those surroundings without owning any transport itself:
//!
//! - [`actions`]: web form submissions mapped onto sensor operations
//! - [`endpoints`]: chunked response bodies for the live and CSV pages
//! - [`mqtt`]: topic naming, control dispatch and publishing
//! - [`persist`]: JSON settings and calibration on a flash backend
//! - [`sinks`]: logger outputs for serial writers and network connectors
//!
//! Network bring-up, broker discovery and reconnects belong to the platform.
//! Anything that can deliver bytes to a topic or path implements
//! [`Connector`] and plugs in here.
//!
//! ## Example Usage
//!
//! ```rust
//! use fieldnode_connectors::{Connector, MemoryConnector};
//! use fieldnode_connectors::mqtt::TopicRegistry;
//!
//! let mut broker = MemoryConnector::connected();
//! let mut topics = TopicRegistry::new("4711");
//! topics.register("sensor", None)?;
//!
//! topics.publish(&mut broker, "sensor", "21;")?;
//! assert_eq!(broker.sent()[0].0, "4711_sensor_data");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod actions;
pub mod endpoints;
pub mod mqtt;
pub mod persist;
pub mod sinks;

use thiserror::Error;

/// Common connector errors
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Not connected")]
    NotConnected,

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Anything that delivers payloads to a named destination
///
/// MQTT clients use the topic, websocket servers the path.
pub trait Connector {
    type Error: std::fmt::Display;

    /// Send one payload
    fn send(&mut self, topic: &str, data: &[u8]) -> Result<(), Self::Error>;

    /// Check if connected
    fn is_connected(&self) -> bool;
}

/// Delivery counters kept by publishers
#[derive(Debug, Default, Clone)]
pub struct ConnectionStats {
    /// Total messages sent successfully
    pub messages_sent: u64,
    /// Total messages failed to send
    pub messages_failed: u64,
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Last error message
    pub last_error: Option<String>,
}

impl ConnectionStats {
    /// Count a delivery attempt of `bytes` bytes
    pub fn record<E: std::fmt::Display>(&mut self, bytes: usize, result: &Result<(), E>) {
        match result {
            Ok(()) => {
                self.messages_sent += 1;
                self.bytes_sent += bytes as u64;
            }
            Err(err) => {
                self.messages_failed += 1;
                self.last_error = Some(err.to_string());
            }
        }
    }
}

/// In-memory connector for hosts and tests
#[derive(Debug, Default, Clone)]
pub struct MemoryConnector {
    connected: bool,
    sent: Vec<(String, Vec<u8>)>,
}

impl MemoryConnector {
    /// Connector that accepts sends
    pub fn connected() -> Self {
        Self { connected: true, sent: Vec::new() }
    }

    /// Change the connection state
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Payloads sent so far with their topics
    pub fn sent(&self) -> &[(String, Vec<u8>)] {
        &self.sent
    }

    /// Forget sent payloads
    pub fn clear(&mut self) {
        self.sent.clear();
    }

    /// Sent payloads as text
    pub fn sent_text(&self) -> Vec<(String, String)> {
        self.sent
            .iter()
            .map(|(topic, data)| (topic.clone(), String::from_utf8_lossy(data).into_owned()))
            .collect()
    }
}

impl Connector for MemoryConnector {
    type Error = ConnectorError;

    fn send(&mut self, topic: &str, data: &[u8]) -> Result<(), Self::Error> {
        if !self.connected {
            return Err(ConnectorError::NotConnected);
        }
        self.sent.push((topic.to_string(), data.to_vec()));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
