//! Probing engine: codec, in-flight bookkeeping, sender/receiver loops and
//! the socket-generation supervisor.

pub mod codec;
pub mod pending;
pub mod receiver;
pub mod sender;
pub mod signal;
pub mod supervisor;

pub use pending::{PendingTable, ProbeKey};
pub use sender::SeqCounter;
pub use signal::{GenerationToken, ShutdownToken};
pub use supervisor::{SetupError, Supervisor};

/// Minimum plausible round-trip time in seconds.
pub const RTT_VALID_MIN: f64 = 0.0;

/// Maximum plausible round-trip time in seconds. Replies outside the
/// `[RTT_VALID_MIN, RTT_VALID_MAX]` band indicate clock skew or payload
/// corruption and are discarded without touching the pending table.
pub const RTT_VALID_MAX: f64 = 300.0;
