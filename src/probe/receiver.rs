//! Probe receiver loop.
//!
//! Background thread per socket generation. Blocks on the bounded-timeout
//! receive, classifies each reply against the pending table, and after every
//! receive attempt (reply, timeout, or per-datagram fault) sweeps expired
//! entries as loss. The 1 second receive timeout doubles as the poll point
//! for cancellation, so loss detection has roughly 1 second granularity.
//!
//! Per-datagram faults (malformed payload, out-of-band RTT, record write
//! failure) are logged and contained; only a transport-level I/O error
//! terminates the loop, cancelling the generation so the supervisor builds
//! a fresh socket.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::clock;
use crate::net::ProbeSocket;
use crate::probe::codec;
use crate::probe::pending::{PendingTable, ProbeKey};
use crate::probe::signal::{GenerationToken, ShutdownToken};
use crate::probe::{RTT_VALID_MAX, RTT_VALID_MIN};
use crate::record::{Outcome, ResultRecord, SharedSink};
use crate::trace::{debug, info, warn};

/// Receive buffer size; comfortably above any configured payload size.
const RECV_BUF_SIZE: usize = 2048;

/// Receiver loop state for one socket generation.
pub struct Receiver {
    socket: Arc<ProbeSocket>,
    table: Arc<Mutex<PendingTable>>,
    sink: SharedSink,
    instance: u32,
    timeout: f64,
}

impl Receiver {
    /// Creates a receiver classifying replies on `socket` against `table`,
    /// emitting records for `instance` into `sink`. Entries older than
    /// `timeout` are swept as loss.
    pub fn new(
        socket: Arc<ProbeSocket>,
        table: Arc<Mutex<PendingTable>>,
        sink: SharedSink,
        instance: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            socket,
            table,
            sink,
            instance,
            timeout: timeout.as_secs_f64(),
        }
    }

    /// Runs the receive loop until shutdown is requested, the generation is
    /// cancelled, or a transport failure occurs (which cancels the
    /// generation itself).
    pub fn run(&mut self, shutdown: &ShutdownToken, generation: &GenerationToken) {
        info!("receiver started");
        let mut buf = [0u8; RECV_BUF_SIZE];

        while !shutdown.is_set() && !generation.is_cancelled() {
            match self.socket.try_recv(&mut buf) {
                Ok(Some(len)) => {
                    let receive_time = clock::unix_now();
                    self.handle_reply(&buf[..len], receive_time);
                }
                // Idle timeout: nothing arrived, fall through to the sweep.
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "transport failure while receiving, restarting generation");
                    generation.cancel();
                    break;
                }
            }
            self.sweep_expired();
        }
        debug!("receiver stopped");
    }

    /// Classifies one received datagram.
    fn handle_reply(&self, payload: &[u8], receive_time: f64) {
        let decoded = match codec::decode(payload) {
            Ok(p) => p,
            Err(e) => {
                warn!(len = payload.len(), error = %e, "malformed reply payload");
                return;
            }
        };

        let rtt = receive_time - decoded.send_seconds();
        if !(RTT_VALID_MIN..=RTT_VALID_MAX).contains(&rtt) {
            // Clock skew or corruption; keep the entry pending so the probe
            // can still succeed, arrive late, or be swept.
            warn!(seq = decoded.seq, rtt, "reply RTT outside validity band, discarding");
            return;
        }

        let matched = self
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take(&ProbeKey::from(payload))
            .is_some();

        let outcome = if matched {
            Outcome::Success { rtt }
        } else {
            warn!(seq = decoded.seq, rtt, "late or duplicate reply");
            Outcome::Late { rtt }
        };
        self.emit(&ResultRecord {
            send_micros: decoded.send_micros,
            instance: self.instance,
            seq: decoded.seq,
            outcome,
        });
    }

    /// Removes every entry older than the reply timeout and reports each as
    /// loss exactly once. Sequence number and send time come from the probe
    /// identity itself.
    fn sweep_expired(&self) {
        let now = clock::unix_now();
        let expired = self
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sweep(now, self.timeout);

        for (key, _sent) in expired {
            match codec::decode(key.as_bytes()) {
                Ok(probe) => {
                    debug!(seq = probe.seq, "probe expired without reply");
                    self.emit(&ResultRecord {
                        send_micros: probe.send_micros,
                        instance: self.instance,
                        seq: probe.seq,
                        outcome: Outcome::Loss,
                    });
                }
                // Sender only inserts well-formed payloads; an unreadable
                // identity is dropped after logging rather than aborting.
                Err(e) => warn!(error = %e, "unreadable expired probe identity"),
            }
        }
    }

    fn emit(&self, record: &ResultRecord) {
        let result = self
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .emit(record);
        if let Err(e) = result {
            warn!(seq = record.seq, error = %e, "failed to write record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    struct Fixture {
        receiver: Receiver,
        table: Arc<Mutex<PendingTable>>,
        records: Arc<Mutex<Vec<ResultRecord>>>,
    }

    fn fixture(timeout: Duration) -> Fixture {
        let socket = Arc::new(ProbeSocket::bind(Ipv4Addr::LOCALHOST, 0).unwrap());
        let table = Arc::new(Mutex::new(PendingTable::new()));
        let records: Arc<Mutex<Vec<ResultRecord>>> = Arc::new(Mutex::new(Vec::new()));
        let sink: SharedSink = records.clone();
        let receiver = Receiver::new(socket, Arc::clone(&table), sink, 5, timeout);
        Fixture {
            receiver,
            table,
            records,
        }
    }

    fn pending(fixture: &Fixture, seq: u64, send_time: f64) -> Vec<u8> {
        let payload = codec::encode(seq, (send_time * 1e6) as u64, 20);
        fixture
            .table
            .lock()
            .unwrap()
            .insert(ProbeKey::from(payload.clone()), send_time);
        payload
    }

    fn records(fixture: &Fixture) -> Vec<ResultRecord> {
        fixture.records.lock().unwrap().clone()
    }

    #[test]
    fn matching_reply_classifies_success() {
        let f = fixture(Duration::from_secs(60));
        let payload = pending(&f, 1, 1000.0);

        f.receiver.handle_reply(&payload, 1000.05);

        let recs = records(&f);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].seq, 1);
        match recs[0].outcome {
            Outcome::Success { rtt } => assert!((rtt - 0.05).abs() < 1e-9),
            ref other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(
            recs[0].to_string(),
            "1970-01-01 00:16:40.000000\t5\t1\t<d e=\"0\"><rtt>0.050000</rtt></d>"
        );
        assert!(f.table.lock().unwrap().is_empty());
    }

    #[test]
    fn duplicate_reply_classifies_late() {
        let f = fixture(Duration::from_secs(60));
        let payload = pending(&f, 1, 1000.0);

        // Network duplication: the same datagram arrives twice.
        f.receiver.handle_reply(&payload, 1000.05);
        f.receiver.handle_reply(&payload, 1000.07);
        // And idempotently a third time.
        f.receiver.handle_reply(&payload, 1000.09);

        let recs = records(&f);
        assert_eq!(recs.len(), 3);
        assert!(matches!(recs[0].outcome, Outcome::Success { .. }));
        assert!(matches!(recs[1].outcome, Outcome::Late { .. }));
        assert!(matches!(recs[2].outcome, Outcome::Late { .. }));
        assert!(f.table.lock().unwrap().is_empty());
    }

    #[test]
    fn unknown_identity_classifies_late_without_mutation() {
        let f = fixture(Duration::from_secs(60));
        pending(&f, 1, 1000.0);

        // A reply for a probe that was never registered.
        let stray = codec::encode(99, 1_000_000_000, 20);
        f.receiver.handle_reply(&stray, 1000.2);

        let recs = records(&f);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].seq, 99);
        assert!(matches!(recs[0].outcome, Outcome::Late { .. }));
        assert_eq!(f.table.lock().unwrap().len(), 1);
    }

    #[test]
    fn out_of_band_rtt_is_discarded_and_entry_kept() {
        let f = fixture(Duration::from_secs(60));
        let payload = pending(&f, 1, 1000.0);

        // Negative RTT (receive before send): clock skew.
        f.receiver.handle_reply(&payload, 999.0);
        // RTT beyond the 300s validity ceiling.
        f.receiver.handle_reply(&payload, 1301.0);

        assert!(records(&f).is_empty());
        assert_eq!(f.table.lock().unwrap().len(), 1);

        // The same probe can still succeed afterwards.
        f.receiver.handle_reply(&payload, 1000.1);
        let recs = records(&f);
        assert_eq!(recs.len(), 1);
        assert!(matches!(recs[0].outcome, Outcome::Success { .. }));
    }

    #[test]
    fn malformed_reply_is_skipped() {
        let f = fixture(Duration::from_secs(60));
        pending(&f, 1, 1000.0);

        f.receiver.handle_reply(b"not a probe payload", 1000.1);

        assert!(records(&f).is_empty());
        assert_eq!(f.table.lock().unwrap().len(), 1);
    }

    #[test]
    fn expired_entry_swept_as_loss_exactly_once() {
        let f = fixture(Duration::from_secs(60));
        // Sent 61 seconds ago relative to the real clock the sweep reads.
        let sent = clock::unix_now() - 61.0;
        pending(&f, 7, sent);

        f.receiver.sweep_expired();
        f.receiver.sweep_expired();

        let recs = records(&f);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].seq, 7);
        assert_eq!(recs[0].outcome, Outcome::Loss);
        assert!(recs[0].to_string().ends_with("\t5\t7\t<d e=\"0\"/>"));
        assert!(f.table.lock().unwrap().is_empty());
    }

    #[test]
    fn fresh_entry_survives_sweep() {
        let f = fixture(Duration::from_secs(60));
        pending(&f, 1, clock::unix_now() - 5.0);

        f.receiver.sweep_expired();

        assert!(records(&f).is_empty());
        assert_eq!(f.table.lock().unwrap().len(), 1);
    }

    #[test]
    fn reply_after_sweep_is_late() {
        let f = fixture(Duration::from_secs(60));
        let sent = clock::unix_now() - 61.0;
        let payload = pending(&f, 3, sent);

        f.receiver.sweep_expired();
        // The straggler finally arrives; RTT is large but within 300s.
        f.receiver.handle_reply(&payload, sent + 62.0);

        let recs = records(&f);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].outcome, Outcome::Loss);
        assert!(matches!(recs[1].outcome, Outcome::Late { .. }));
    }
}
