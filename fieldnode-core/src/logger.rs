//! Device logger
//!
//! Messages carry an explicit [`Level`] and the uptime they were written at.
//! Each message goes to up to two outputs:
//!
//! - **console**: `"<uptime> [<tag>] <message>"`, optionally ANSI coloured
//! - **network**: `"<uptime> <message>"`, never `Data` lines
//!
//! Independent of the outputs, every message at `Control` or more severe is
//! kept in a small ring of recent entries for status pages, and any `Error`
//! sets a sticky flag the run loop uses for its health state.
//!
//! ```
//! use fieldnode_core::logger::{Level, Logger, LoggerConfig};
//!
//! let mut log = Logger::new(LoggerConfig::default());
//! log.write(Level::Warning, 1_500, format_args!("sensor {} slow", 2));
//! log.write(Level::Info, 1_600, "not kept");
//!
//! let mut recent = Vec::new();
//! log.recent(|entry| recent.push(entry.message().to_string()));
//! assert_eq!(recent, vec!["sensor 2 slow"]);
//! ```

use alloc::boxed::Box;
use alloc::string::String;
use core::fmt::{self, Write as _};

use crate::errors::{SensorError, SensorResult};
use crate::format::{write_csv_values, LineFormat};
use crate::store::{Capacity, Cursor, RecordStore};
use crate::time::{Timestamp, Uptime};

/// Entries kept in the recent log
pub const RECENT_LOG_LEN: usize = 25;

/// Longest message kept in the recent log, longer ones are cut
pub const ENTRY_MESSAGE_LEN: usize = 96;

/// Message severity, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Level {
    /// Something failed
    Error,
    /// Something looks wrong
    Warning,
    /// Message addressed at the user
    User,
    /// Control flow: connections, actions, state changes
    Control,
    /// General information
    Info,
    /// Measurement output
    Data,
}

impl Level {
    /// All levels, most severe first
    pub const ALL: [Level; 6] =
        [Level::Error, Level::Warning, Level::User, Level::Control, Level::Info, Level::Data];

    /// Single-letter tag used in console lines
    pub const fn tag(self) -> char {
        match self {
            Level::Error => 'E',
            Level::Warning => 'W',
            Level::User => 'U',
            Level::Control => 'C',
            Level::Info => 'I',
            Level::Data => 'D',
        }
    }

    /// ANSI escape that starts this level's colour
    pub const fn ansi(self) -> &'static str {
        match self {
            Level::Error => "\x1b[31;1m",
            Level::Warning => "\x1b[33m",
            Level::User => "\x1b[95;1m",
            Level::Control => "\x1b[32m",
            Level::Info => "\x1b[90m",
            Level::Data => "\x1b[34m",
        }
    }

    /// Level from its position in [`Level::ALL`]
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }
}

const ANSI_RESET: &str = "\x1b[0m";

/// Where log lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LogTarget {
    /// Nowhere, only the recent log and error flag are kept
    None,
    /// Serial console
    Console,
    /// Network log socket
    Network,
    /// Console and network
    Both,
}

impl LogTarget {
    fn console(self) -> bool {
        matches!(self, LogTarget::Console | LogTarget::Both)
    }

    fn network(self) -> bool {
        matches!(self, LogTarget::Network | LogTarget::Both)
    }
}

/// Logger settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoggerConfig {
    /// Least severe level that is written out
    pub level: Level,
    /// Output selection
    pub target: LogTarget,
    /// Colour console lines
    pub ansi_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self { level: Level::Data, target: LogTarget::Console, ansi_color: false }
    }
}

impl LoggerConfig {
    /// Update one setting from its string form
    ///
    /// Keys: `level` (0 = Error .. 5 = Data), `target` (0 = None,
    /// 1 = Console, 2 = Network, 3 = Both), `ansi_color` (`0`/`1`,
    /// `true`/`false`).
    pub fn apply(&mut self, key: &str, value: &str) -> SensorResult<()> {
        let value = value.trim();
        match key {
            "level" => {
                self.level = value.parse::<u8>().ok().and_then(Level::from_index).ok_or(
                    SensorError::InvalidSetting { name: "level", reason: "expected 0..=5" },
                )?;
            }
            "target" => {
                self.target = match value {
                    "0" => LogTarget::None,
                    "1" => LogTarget::Console,
                    "2" => LogTarget::Network,
                    "3" => LogTarget::Both,
                    _ => {
                        return Err(SensorError::InvalidSetting { name: "target", reason: "expected 0..=3" })
                    }
                };
            }
            "ansi_color" => {
                self.ansi_color = match value {
                    "1" | "true" | "on" => true,
                    "0" | "false" | "off" => false,
                    _ => {
                        return Err(SensorError::InvalidSetting { name: "ansi_color", reason: "expected a boolean" })
                    }
                };
            }
            _ => return Err(SensorError::UnknownSetting),
        }
        Ok(())
    }
}

/// A kept log message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    timestamp: Timestamp,
    level: Level,
    message: heapless::String<ENTRY_MESSAGE_LEN>,
}

impl LogEntry {
    fn new(timestamp: Timestamp, level: Level, message: &str) -> Self {
        let mut kept = heapless::String::new();
        for c in message.chars() {
            if kept.push(c).is_err() {
                break;
            }
        }
        Self { timestamp, level, message: kept }
    }

    /// Uptime when written
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Severity
    pub fn level(&self) -> Level {
        self.level
    }

    /// Message text, possibly cut
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Renders kept entries as console-style lines without colour
#[derive(Debug, Clone, Copy, Default)]
pub struct LogLineFormat;

impl LineFormat<LogEntry> for LogLineFormat {
    fn write_line<W: fmt::Write>(&self, entry: &LogEntry, out: &mut W) -> fmt::Result {
        write!(out, "{} [{}] {}", Uptime(entry.timestamp), entry.level.tag(), entry.message)
    }
}

/// Output for finished log lines
pub trait LogSink {
    /// Emit one line, without trailing newline
    fn write_line(&mut self, line: &str);
}

/// Levelled device logger
pub struct Logger {
    config: LoggerConfig,
    recent: RecordStore<LogEntry>,
    error_reported: bool,
    console: Option<Box<dyn LogSink>>,
    network: Option<Box<dyn LogSink>>,
    message: String,
    line: String,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("config", &self.config)
            .field("recent", &self.recent.size())
            .field("error_reported", &self.error_reported)
            .field("console", &self.console.is_some())
            .field("network", &self.network.is_some())
            .finish()
    }
}

impl Logger {
    /// Logger without outputs attached
    pub fn new(config: LoggerConfig) -> Self {
        Self {
            config,
            recent: RecordStore::new(Capacity::fixed(RECENT_LOG_LEN).unwrap_or(Capacity::Adaptive)),
            error_reported: false,
            console: None,
            network: None,
            message: String::new(),
            line: String::new(),
        }
    }

    /// Attach the console output
    pub fn with_console(mut self, sink: impl LogSink + 'static) -> Self {
        self.console = Some(Box::new(sink));
        self
    }

    /// Attach the network output
    pub fn with_network(mut self, sink: impl LogSink + 'static) -> Self {
        self.network = Some(Box::new(sink));
        self
    }

    /// Current settings
    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// Replace the settings
    pub fn set_config(&mut self, config: LoggerConfig) {
        self.config = config;
    }

    /// Whether an `Error` was ever written
    pub fn has_error(&self) -> bool {
        self.error_reported
    }

    /// Write one message
    ///
    /// `message` is anything displayable, typically a string or
    /// `format_args!`.
    pub fn write(&mut self, level: Level, now: Timestamp, message: impl fmt::Display) {
        self.message.clear();
        if write!(self.message, "{}", message).is_err() {
            return;
        }
        self.dispatch(level, now);
    }

    /// Write channel values as one CSV message
    pub fn write_csv(&mut self, level: Level, now: Timestamp, values: &[i32], matrix_columns: u8) {
        self.message.clear();
        if write_csv_values(&mut self.message, values, matrix_columns).is_err() {
            return;
        }
        self.dispatch(level, now);
    }

    fn dispatch(&mut self, level: Level, now: Timestamp) {
        if level <= Level::Control {
            self.recent.append(LogEntry::new(now, level, &self.message));
        }
        if level == Level::Error {
            self.error_reported = true;
        }
        if self.config.target == LogTarget::None || level > self.config.level {
            return;
        }

        if self.config.target.console() {
            if let Some(sink) = self.console.as_mut() {
                self.line.clear();
                let (start, end) = if self.config.ansi_color { (level.ansi(), ANSI_RESET) } else { ("", "") };
                let _ = write!(self.line, "{} [{}] {}{}{}", Uptime(now), level.tag(), start, self.message, end);
                sink.write_line(&self.line);
            }
        }
        if self.config.target.network() && level != Level::Data {
            if let Some(sink) = self.network.as_mut() {
                self.line.clear();
                let _ = write!(self.line, "{} {}", Uptime(now), self.message);
                sink.write_line(&self.line);
            }
        }
    }

    /// Visit kept entries, newest first
    pub fn recent(&self, mut visit: impl FnMut(&LogEntry)) {
        let mut cursor = Cursor::latest();
        self.recent.reset_cursor(&mut cursor);
        while let Some(entry) = self.recent.current(&cursor) {
            visit(entry);
            self.recent.retreat(&mut cursor);
        }
    }

    /// Kept entries as a store, for chunked export
    pub fn recent_store(&self) -> &RecordStore<LogEntry> {
        &self.recent
    }
}
