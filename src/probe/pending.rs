//! In-flight probe bookkeeping.
//!
//! The pending table is the single point of coordination between the sender
//! and receiver loops: the sender inserts each payload immediately before
//! transmitting it, the receiver removes it when the echo arrives, and the
//! periodic sweep removes anything older than the reply timeout as loss.
//! The table itself is a plain data structure; the `Mutex` lives at the
//! sharing site in the supervisor.

use std::collections::HashMap;

/// The identity of an in-flight probe: the exact bytes that were sent.
///
/// The wire format is self-describing (sequence number + microsecond send
/// timestamp), so the payload itself is collision-free as a lookup key as
/// long as no two probes are transmitted within the same microsecond with
/// the same sequence number. The 1 Hz cadence guarantees that.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProbeKey(Vec<u8>);

impl ProbeKey {
    /// The raw payload bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for ProbeKey {
    fn from(payload: Vec<u8>) -> Self {
        Self(payload)
    }
}

impl From<&[u8]> for ProbeKey {
    fn from(payload: &[u8]) -> Self {
        Self(payload.to_vec())
    }
}

/// Mapping from in-flight probe identity to its send timestamp
/// (seconds since the Unix epoch).
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: HashMap<ProbeKey, f64>,
}

impl PendingTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a probe as in-flight.
    pub fn insert(&mut self, key: ProbeKey, send_time: f64) {
        self.entries.insert(key, send_time);
    }

    /// Removes and returns the send timestamp for `key`, if it is in flight.
    pub fn take(&mut self, key: &ProbeKey) -> Option<f64> {
        self.entries.remove(key)
    }

    /// Removes and returns every entry older than `timeout` seconds at `now`.
    ///
    /// Each expired probe is returned exactly once; the caller reports it
    /// as loss.
    pub fn sweep(&mut self, now: f64, timeout: f64) -> Vec<(ProbeKey, f64)> {
        let expired: Vec<ProbeKey> = self
            .entries
            .iter()
            .filter(|(_, &sent)| now - sent > timeout)
            .map(|(key, _)| key.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|key| {
                let sent = self.entries.remove(&key)?;
                Some((key, sent))
            })
            .collect()
    }

    /// Number of probes currently in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no probes are in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
