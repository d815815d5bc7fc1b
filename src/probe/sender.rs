//! Probe sender loop.
//!
//! Runs on the supervisor's thread for the lifetime of one socket
//! generation. Each cycle samples the wall clock, encodes the payload,
//! registers it as in-flight, transmits, then sleeps whatever remains of the
//! one second cadence. Processing overruns are absorbed by skipping the
//! sleep; missed ticks are never caught up.

use std::io;
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crate::clock;
use crate::net::ProbeSocket;
use crate::probe::codec;
use crate::probe::pending::{PendingTable, ProbeKey};
use crate::probe::signal::{GenerationToken, ShutdownToken};
use crate::trace::{debug, warn};

/// Interval between probes.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Monotonically advancing probe sequence numbers.
///
/// Starts at 1 and rolls over to 1 after `max`; 0 is never produced. The
/// counter survives socket-generation restarts within one process run and
/// resets only on process restart.
#[derive(Debug)]
pub struct SeqCounter {
    next: u64,
    max: u64,
}

impl SeqCounter {
    /// Counter rolling over at `u64::MAX`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max(u64::MAX)
    }

    /// Counter rolling over at a custom maximum (the rollover point is a
    /// policy choice, not a correctness requirement).
    #[must_use]
    pub fn with_max(max: u64) -> Self {
        debug_assert!(max >= 1);
        Self { next: 1, max }
    }

    /// Returns the next sequence number and advances.
    pub fn advance(&mut self) -> u64 {
        let seq = self.next;
        self.next = if seq >= self.max { 1 } else { seq + 1 };
        seq
    }
}

impl Default for SeqCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Sender loop state for one socket generation.
pub struct Sender<'a> {
    socket: &'a ProbeSocket,
    table: &'a Mutex<PendingTable>,
    seq: &'a mut SeqCounter,
    payload_size: usize,
}

impl<'a> Sender<'a> {
    /// Creates a sender transmitting on `socket` and registering probes in
    /// `table`. The sequence counter is borrowed from the supervisor so
    /// numbering continues across generations.
    pub fn new(
        socket: &'a ProbeSocket,
        table: &'a Mutex<PendingTable>,
        seq: &'a mut SeqCounter,
        payload_size: usize,
    ) -> Self {
        Self {
            socket,
            table,
            seq,
            payload_size,
        }
    }

    /// Runs the send loop until shutdown is requested, the generation is
    /// cancelled, or a transport failure occurs.
    ///
    /// # Errors
    ///
    /// Returns the I/O error of a failed transmit; the caller treats it as
    /// a transport failure and restarts the generation. The probe already
    /// registered for the failed transmit stays in the table and is swept
    /// as loss once its timeout elapses.
    pub fn run(&mut self, shutdown: &ShutdownToken, generation: &GenerationToken) -> io::Result<()> {
        while !shutdown.is_set() && !generation.is_cancelled() {
            let send_micros = clock::unix_now_micros();
            let send_time = send_micros as f64 / 1_000_000.0;

            let seq = self.seq.advance();
            let payload = codec::encode(seq, send_micros, self.payload_size);

            self.table
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(ProbeKey::from(payload.clone()), send_time);

            if let Err(e) = self.socket.send(&payload) {
                warn!(seq, error = %e, "transport failure sending probe");
                return Err(e);
            }
            debug!(seq, "probe sent");

            // Compensate the sleep for processing time to hold ~1 Hz.
            let pause = cadence_sleep(clock::unix_now() - send_time);
            if !pause.is_zero() {
                thread::sleep(pause);
            }
        }
        Ok(())
    }
}

/// Remaining cadence sleep after `elapsed` seconds of processing.
///
/// Overruns skip the sleep entirely; a backwards wall-clock step makes
/// `elapsed` negative and is capped at one interval so the cadence never
/// stalls for the duration of the skew.
fn cadence_sleep(elapsed: f64) -> Duration {
    let interval = PROBE_INTERVAL.as_secs_f64();
    Duration::from_secs_f64((interval - elapsed).clamp(0.0, interval))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

    #[test]
    fn seq_counter_starts_at_one() {
        let mut seq = SeqCounter::new();
        assert_eq!(seq.advance(), 1);
        assert_eq!(seq.advance(), 2);
        assert_eq!(seq.advance(), 3);
    }

    #[test]
    fn seq_counter_rolls_over_to_one() {
        let mut seq = SeqCounter::with_max(3);
        assert_eq!(seq.advance(), 1);
        assert_eq!(seq.advance(), 2);
        assert_eq!(seq.advance(), 3);
        assert_eq!(seq.advance(), 1);
        // Never 0, never negative range artifacts.
        for _ in 0..10 {
            assert_ne!(seq.advance(), 0);
        }
    }

    #[test]
    fn cadence_sleep_compensates_processing_time() {
        assert_eq!(cadence_sleep(0.25), Duration::from_millis(750));
        assert_eq!(cadence_sleep(0.0), PROBE_INTERVAL);
    }

    #[test]
    fn cadence_sleep_survives_overrun_and_clock_step() {
        // Processing took longer than the interval: proceed immediately.
        assert_eq!(cadence_sleep(2.0), Duration::ZERO);
        // Wall clock stepped backwards: cap at one interval, never stall
        // for the duration of the skew.
        assert_eq!(cadence_sleep(-30.0), PROBE_INTERVAL);
    }

    #[test]
    fn cancelled_generation_sends_nothing() {
        let socket = ProbeSocket::bind(Ipv4Addr::LOCALHOST, 0).unwrap();
        let table = Mutex::new(PendingTable::new());
        let mut seq = SeqCounter::new();
        let mut sender = Sender::new(&socket, &table, &mut seq, 20);

        let generation = GenerationToken::new();
        generation.cancel();
        sender.run(&ShutdownToken::new(), &generation).unwrap();

        assert!(table.lock().unwrap().is_empty());
    }

    #[test]
    fn one_cycle_registers_then_transmits() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let peer_addr = match peer.local_addr().unwrap() {
            SocketAddr::V4(v4) => v4,
            SocketAddr::V6(_) => unreachable!(),
        };

        let socket = ProbeSocket::bind(Ipv4Addr::LOCALHOST, 0).unwrap();
        socket.connect(peer_addr).unwrap();
        let table = Mutex::new(PendingTable::new());
        let mut seq = SeqCounter::new();

        let shutdown = ShutdownToken::new();
        let generation = GenerationToken::new();
        // Let the first cycle complete, then stop during its cadence sleep.
        let canceller = generation.clone();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            canceller.cancel();
        });

        let mut sender = Sender::new(&socket, &table, &mut seq, 20);
        sender.run(&shutdown, &generation).unwrap();
        stopper.join().unwrap();

        assert_eq!(table.lock().unwrap().len(), 1);

        let mut buf = [0u8; 2048];
        let (n, _) = peer.recv_from(&mut buf).unwrap();
        assert_eq!(n, 20);
        let decoded = codec::decode(&buf[..n]).unwrap();
        assert_eq!(decoded.seq, 1);
    }
}
