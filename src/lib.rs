//! Continuous UDP round-trip latency probe.
//!
//! `udping` sends one timestamped datagram per second to a fixed echo
//! destination, matches echoed replies against an in-flight request table,
//! and emits one structured record per probe: success (with RTT),
//! late/duplicate, or loss.
//!
//! # Architecture
//!
//! The [`probe::Supervisor`] owns one socket *generation* at a time: a
//! bound+connected UDP socket plus a background receiver thread. The sender
//! loop runs on the supervisor's own thread. Sender and receiver coordinate
//! only through the mutex-guarded [`probe::PendingTable`] and two atomic
//! cancellation tokens. A transport error in either loop tears the generation
//! down and the supervisor immediately builds a new one; setup failures are
//! retried with a fixed 15 second backoff for as long as the process runs.

pub mod clock;
pub mod config;
pub mod net;
pub mod probe;
pub mod record;
pub mod trace;

pub use config::ProbeConfig;
pub use probe::{PendingTable, ShutdownToken, Supervisor};
pub use record::{RecordSink, ResultRecord, SharedSink};
pub use trace::init_tracing;
