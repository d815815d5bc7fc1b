//! Measurement result records and the sink they are written to.
//!
//! ## Record Format
//!
//! One tab-separated line per probe outcome:
//!
//! ```text
//! <send time UTC, %Y-%m-%d %H:%M:%S.%6f> \t <instance> \t <seq> \t <fragment>
//! ```
//!
//! | Outcome        | Fragment                          |
//! |----------------|-----------------------------------|
//! | Success        | `<d e="0"><rtt>0.050000</rtt></d>`|
//! | Late/duplicate | `<d e="1"><rtt>0.050000</rtt></d>`|
//! | Loss           | `<d e="0"/>`                      |
//!
//! The timestamp is the probe's *send* time (decoded from the payload), not
//! the receive time, so the time series stays aligned with the probe cadence.
//! Record rotation and retention are owned by whatever consumes the sink's
//! output file; the sink itself only appends and flushes.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

/// Outcome of a single probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// Reply matched an in-flight probe.
    Success {
        /// Round-trip time in seconds.
        rtt: f64,
    },
    /// Reply arrived but its identity was no longer in flight: either a
    /// network duplicate of an already-matched probe or a reply that beat
    /// its own loss sweep by arriving after expiry.
    Late {
        /// Round-trip time in seconds.
        rtt: f64,
    },
    /// No reply within the configured timeout.
    Loss,
}

/// One emitted measurement record. Created at classification time, written
/// once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    /// Probe send time in microseconds since the Unix epoch.
    pub send_micros: u64,
    /// Measurement instance identifier.
    pub instance: u32,
    /// Probe sequence number.
    pub seq: u64,
    /// Classified outcome.
    pub outcome: Outcome,
}

impl fmt::Display for ResultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_send_time(self.send_micros, f)?;
        write!(f, "\t{}\t{}\t", self.instance, self.seq)?;
        match self.outcome {
            Outcome::Success { rtt } => write!(f, "<d e=\"0\"><rtt>{rtt:.6}</rtt></d>"),
            Outcome::Late { rtt } => write!(f, "<d e=\"1\"><rtt>{rtt:.6}</rtt></d>"),
            Outcome::Loss => write!(f, "<d e=\"0\"/>"),
        }
    }
}

fn fmt_send_time(micros: u64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let timestamp = i64::try_from(micros)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_micros);
    match timestamp {
        Some(utc) => write!(f, "{}", utc.format("%Y-%m-%d %H:%M:%S%.6f")),
        // Unrepresentable send time; keep the raw value rather than lie.
        None => write!(f, "{micros}us"),
    }
}

/// Destination for the measurement record stream.
pub trait RecordSink: Send {
    /// Writes one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium rejects the write. Callers
    /// in the probe loops log the error and continue; a sink failure never
    /// stops probing.
    fn emit(&mut self, record: &ResultRecord) -> io::Result<()>;
}

/// A sink shared between the supervisor and receiver threads.
pub type SharedSink = Arc<Mutex<dyn RecordSink>>;

/// Sink writing one line per record to any writer, flushing after each line
/// so records survive abrupt termination.
pub struct WriterSink<W: Write + Send> {
    inner: W,
}

impl<W: Write + Send> WriterSink<W> {
    /// Wraps a writer.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write + Send> RecordSink for WriterSink<W> {
    fn emit(&mut self, record: &ResultRecord) -> io::Result<()> {
        writeln!(self.inner, "{record}")?;
        self.inner.flush()
    }
}

/// Collection sink, used by tests and embedders that post-process records.
impl RecordSink for Vec<ResultRecord> {
    fn emit(&mut self, record: &ResultRecord) -> io::Result<()> {
        self.push(record.clone());
        Ok(())
    }
}
