//! MQTT topic registry
//!
//! Modules register a base topic once. The registry derives the broker
//! topics from it and the device id:
//!
//! - data: `<device>_<base>_data`, written by the module
//! - control: `<device>_<base>_ctrl`, subscribed only when the module
//!   passed a control callback
//!
//! Incoming control messages are routed back to the owning callback by
//! [`TopicRegistry::dispatch`]. Topics live in an adaptive record store, so
//! the list grows with the number of modules.

use fieldnode_core::{Capacity, RecordStore};
use thiserror::Error;

use crate::{ConnectionStats, Connector};

/// Handler for control messages
pub type CtrlCallback = Box<dyn FnMut(&str)>;

/// Topic registry errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Topic '{0}' already registered")]
    DuplicateTopic(String),

    #[error("Invalid topic '{0}'")]
    InvalidTopic(String),

    #[error("MQTT control with unknown topic '{0}'")]
    UnknownTopic(String),

    #[error("Publishing to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },
}

/// One registered topic
pub struct MqttTopic {
    base: String,
    data_topic: String,
    ctrl_topic: String,
    ctrl: Option<CtrlCallback>,
}

impl std::fmt::Debug for MqttTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttTopic")
            .field("base", &self.base)
            .field("data_topic", &self.data_topic)
            .field("ctrl", &self.ctrl.is_some())
            .finish()
    }
}

impl MqttTopic {
    /// Base topic as registered
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Broker topic the module writes to
    pub fn data_topic(&self) -> &str {
        &self.data_topic
    }

    /// Broker topic for control messages, if subscribed
    pub fn ctrl_topic(&self) -> Option<&str> {
        self.ctrl.as_ref().map(|_| self.ctrl_topic.as_str())
    }
}

/// Registered topics of one device
pub struct TopicRegistry {
    device_id: String,
    topics: RecordStore<MqttTopic>,
    stats: ConnectionStats,
}

impl std::fmt::Debug for TopicRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicRegistry")
            .field("device_id", &self.device_id)
            .field("topics", &self.topics.size())
            .finish()
    }
}

impl TopicRegistry {
    /// Empty registry for `device_id`
    pub fn new(device_id: impl Into<String>) -> Self {
        Self { device_id: device_id.into(), topics: RecordStore::new(Capacity::Adaptive), stats: ConnectionStats::default() }
    }

    /// Device id used as topic prefix
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Register `base`; `ctrl` receives messages sent to its control topic
    ///
    /// Base topics are unique and must not be empty or contain `/`.
    pub fn register(&mut self, base: &str, ctrl: Option<CtrlCallback>) -> Result<(), MqttError> {
        if base.is_empty() || base.contains('/') {
            return Err(MqttError::InvalidTopic(base.to_string()));
        }
        if self.find(base).is_some() {
            return Err(MqttError::DuplicateTopic(base.to_string()));
        }
        let topic = MqttTopic {
            base: base.to_string(),
            data_topic: format!("{}_{}_data", self.device_id, base),
            ctrl_topic: format!("{}_{}_ctrl", self.device_id, base),
            ctrl,
        };
        log::debug!("registered MQTT topic {}", topic.data_topic);
        self.topics.append(topic);
        Ok(())
    }

    /// Whether any topic is registered
    pub fn has_topics(&self) -> bool {
        !self.topics.is_empty()
    }

    /// Registered topic by base name
    pub fn find(&self, base: &str) -> Option<&MqttTopic> {
        self.topics.find(|topic| topic.base == base)
    }

    /// Control topics to subscribe after connecting
    pub fn subscriptions(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().filter_map(MqttTopic::ctrl_topic)
    }

    /// All topics in registration order
    pub fn topics(&self) -> impl Iterator<Item = &MqttTopic> {
        self.topics.iter()
    }

    /// Route a control message received on broker topic `topic`
    pub fn dispatch(&mut self, topic: &str, payload: &str) -> Result<(), MqttError> {
        let base = topic
            .strip_prefix(self.device_id.as_str())
            .and_then(|rest| rest.strip_prefix('_'))
            .and_then(|rest| rest.strip_suffix("_ctrl"))
            .unwrap_or(topic);

        let handler = self
            .topics
            .iter_mut()
            .find(|t| t.base == base)
            .and_then(|t| t.ctrl.as_mut());
        match handler {
            Some(ctrl) => {
                ctrl(payload);
                Ok(())
            }
            None => {
                log::info!("MQTT control with unknown topic '{}'", base);
                Err(MqttError::UnknownTopic(base.to_string()))
            }
        }
    }

    /// Publish `message` on the data topic of `base`
    pub fn publish<C: Connector>(&mut self, connector: &mut C, base: &str, message: &str) -> Result<(), MqttError> {
        let topic = self
            .find(base)
            .map(|t| t.data_topic.clone())
            .ok_or_else(|| MqttError::UnknownTopic(base.to_string()))?;

        let result = if connector.is_connected() {
            connector.send(&topic, message.as_bytes()).map_err(|e| e.to_string())
        } else {
            Err("not connected".to_string())
        };
        self.stats.record(message.len(), &result);
        result.map_err(|reason| MqttError::Publish { topic, reason })
    }

    /// Delivery counters
    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryConnector;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn derived_topic_names() {
        let mut registry = TopicRegistry::new("4711");
        registry.register("sensor", Some(Box::new(|_: &str| {}))).unwrap();
        registry.register("status", None).unwrap();

        let topic = registry.find("sensor").unwrap();
        assert_eq!(topic.data_topic(), "4711_sensor_data");
        assert_eq!(topic.ctrl_topic(), Some("4711_sensor_ctrl"));
        assert_eq!(registry.find("status").unwrap().ctrl_topic(), None);
        assert_eq!(registry.subscriptions().collect::<Vec<_>>(), vec!["4711_sensor_ctrl"]);
    }

    #[test]
    fn duplicates_and_invalid_names_rejected() {
        let mut registry = TopicRegistry::new("1");
        registry.register("a", None).unwrap();
        assert!(matches!(registry.register("a", None), Err(MqttError::DuplicateTopic(_))));
        assert!(matches!(registry.register("", None), Err(MqttError::InvalidTopic(_))));
        assert!(matches!(registry.register("a/b", None), Err(MqttError::InvalidTopic(_))));
        assert_eq!(registry.topics().count(), 1);
    }

    #[test]
    fn control_messages_reach_callback() {
        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&received);

        let mut registry = TopicRegistry::new("dev_01");
        registry
            .register("relay", Some(Box::new(move |msg: &str| sink.borrow_mut().push(msg.to_string()))))
            .unwrap();

        registry.dispatch("dev_01_relay_ctrl", "on").unwrap();
        assert_eq!(*received.borrow(), vec!["on".to_string()]);

        assert!(matches!(
            registry.dispatch("dev_01_pump_ctrl", "on"),
            Err(MqttError::UnknownTopic(base)) if base == "pump"
        ));
    }

    #[test]
    fn publish_counts_deliveries() {
        let mut registry = TopicRegistry::new("7");
        registry.register("sensor", None).unwrap();

        let mut broker = MemoryConnector::connected();
        registry.publish(&mut broker, "sensor", "1,2;").unwrap();
        assert_eq!(broker.sent_text(), vec![("7_sensor_data".to_string(), "1,2;".to_string())]);

        broker.set_connected(false);
        assert!(matches!(registry.publish(&mut broker, "sensor", "3,4;"), Err(MqttError::Publish { .. })));
        assert!(matches!(registry.publish(&mut broker, "other", "x"), Err(MqttError::UnknownTopic(_))));

        let stats = registry.stats();
        assert_eq!((stats.messages_sent, stats.messages_failed, stats.bytes_sent), (1, 1, 4));
    }
}
