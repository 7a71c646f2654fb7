//! Logger outputs
//!
//! [`WriterSink`] feeds the serial console or any other `io::Write`.
//! [`ConnectorSink`] forwards network log lines to a connector, typically
//! the websocket at [`WEBSOCKET_LOG_PATH`].

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use fieldnode_core::logger::LogSink;

use crate::Connector;

/// Websocket path network log lines go to
pub const WEBSOCKET_LOG_PATH: &str = "/wslog";

/// Console output on a byte writer, one line per message
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Release the writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl WriterSink<std::io::Stdout> {
    /// Sink on standard output
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> LogSink for WriterSink<W> {
    fn write_line(&mut self, line: &str) {
        // A console that cannot be written has nowhere left to report to
        let _ = writeln!(self.writer, "{}", line).and_then(|()| self.writer.flush());
    }
}

/// Network output through a connector
///
/// Lines are dropped while the connector is down.
#[derive(Debug)]
pub struct ConnectorSink<C> {
    connector: C,
    path: String,
    dropped: u64,
}

impl<C: Connector> ConnectorSink<C> {
    /// Sink sending to [`WEBSOCKET_LOG_PATH`]
    pub fn new(connector: C) -> Self {
        Self::with_path(connector, WEBSOCKET_LOG_PATH)
    }

    /// Sink sending to `path`
    pub fn with_path(connector: C, path: impl Into<String>) -> Self {
        Self { connector, path: path.into(), dropped: 0 }
    }

    /// Lines not delivered
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl<C: Connector> LogSink for ConnectorSink<C> {
    fn write_line(&mut self, line: &str) {
        if !self.connector.is_connected() {
            self.dropped += 1;
            return;
        }
        if let Err(err) = self.connector.send(&self.path, line.as_bytes()) {
            self.dropped += 1;
            log::debug!("network log line dropped: {}", err);
        }
    }
}

/// Shared connectors, so the logger and the application can both use one
impl<C: Connector> Connector for Rc<RefCell<C>> {
    type Error = C::Error;

    fn send(&mut self, topic: &str, data: &[u8]) -> Result<(), Self::Error> {
        self.borrow_mut().send(topic, data)
    }

    fn is_connected(&self) -> bool {
        self.borrow().is_connected()
    }
}
