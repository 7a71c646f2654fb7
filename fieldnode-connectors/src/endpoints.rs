//! Chunked HTTP response bodies
//!
//! The web server asks for the body piece by piece, passing a buffer and
//! the number of bytes already sent. [`ChunkedResponse`] keeps that byte
//! count per response and pulls each piece from the sensor module or the
//! logger. [`ChunkedResponse::write_to`] drives a whole response onto an
//! `io::Write` using HTTP/1.1 chunked transfer coding.

use std::io::{self, Write};

use fieldnode_core::logger::{LogLineFormat, Logger};
use fieldnode_core::serializer::{ChunkSerializer, PLACEHOLDER};
use fieldnode_core::store::Cursor;
use fieldnode_core::SensorModule;

/// Largest buffer `write_to` grows to when a line does not fit
pub const MAX_CHUNK_SIZE: usize = 8192;

/// Bodies served in chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Newest record as one CSV line
    Live,
    /// All stored records, oldest first
    Csv,
    /// Recent log messages, oldest first
    Log,
}

impl Endpoint {
    pub const ALL: [Endpoint; 3] = [Endpoint::Live, Endpoint::Csv, Endpoint::Log];

    /// Request path
    pub const fn path(self) -> &'static str {
        match self {
            Endpoint::Live => "/sensor/live",
            Endpoint::Csv => "/sensor/csv",
            Endpoint::Log => "/log",
        }
    }

    /// Response content type
    pub const fn content_type(self) -> &'static str {
        match self {
            Endpoint::Live | Endpoint::Log => "text/plain",
            Endpoint::Csv => "application/octet-stream",
        }
    }

    /// Endpoint serving `path`, query strings ignored
    pub fn route(path: &str) -> Option<Self> {
        let path = path.split('?').next().unwrap_or(path);
        Self::ALL.into_iter().find(|endpoint| endpoint.path() == path)
    }
}

/// One response in progress
#[derive(Debug)]
pub struct ChunkedResponse {
    endpoint: Endpoint,
    index: usize,
    log_cursor: Cursor,
    log_serializer: ChunkSerializer<LogLineFormat>,
}

impl ChunkedResponse {
    /// Fresh response for `endpoint`
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            index: 0,
            log_cursor: Cursor::oldest_first(),
            log_serializer: ChunkSerializer::new(LogLineFormat),
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Body bytes produced so far
    pub fn bytes_sent(&self) -> usize {
        self.index
    }

    /// Fill `buf` with the next piece of body, 0 when complete
    pub fn next_chunk(&mut self, sensor: &mut SensorModule, log: &Logger, buf: &mut [u8]) -> usize {
        let written = match self.endpoint {
            Endpoint::Live => sensor.fill_live(buf, self.index),
            Endpoint::Csv => sensor.fill_csv(buf, self.index),
            Endpoint::Log => {
                let store = log.recent_store();
                if self.index == 0 {
                    store.reset_cursor(&mut self.log_cursor);
                }
                self.log_serializer.fill(store, &mut self.log_cursor, buf)
            }
        };
        self.index += written;
        written
    }

    /// Stream the remaining body to `out` as HTTP chunks
    ///
    /// Starts with `chunk_size` byte buffers and doubles them, up to
    /// [`MAX_CHUNK_SIZE`], whenever a single line does not fit. Returns the
    /// body length written by this call.
    pub fn write_to<W: Write>(
        &mut self,
        sensor: &mut SensorModule,
        log: &Logger,
        out: &mut W,
        chunk_size: usize,
    ) -> io::Result<usize> {
        let mut buf = vec![0u8; chunk_size.clamp(1, MAX_CHUNK_SIZE)];
        let mut total = 0;

        loop {
            let n = self.next_chunk(sensor, log, &mut buf);
            if n == 0 {
                break;
            }
            if n == 1 && buf[0] == PLACEHOLDER {
                // placeholder bytes are not part of the body
                self.index -= 1;
                if buf.len() >= MAX_CHUNK_SIZE {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("line longer than {} bytes", MAX_CHUNK_SIZE),
                    ));
                }
                let grown = (buf.len() * 2).min(MAX_CHUNK_SIZE);
                buf.resize(grown, 0);
                continue;
            }
            write!(out, "{:X}\r\n", n)?;
            out.write_all(&buf[..n])?;
            out.write_all(b"\r\n")?;
            total += n;
        }

        out.write_all(b"0\r\n\r\n")?;
        out.flush()?;
        Ok(total)
    }
}
