//! Socket-generation supervisor.
//!
//! Owns one *generation* at a time: a bound+connected probe socket together
//! with its receiver thread. The sender loop runs on the supervisor's own
//! thread, so the supervisor regains control whenever the sender stops —
//! on shutdown, on a send-side transport failure, or when the receiver
//! cancelled the generation after a receive-side transport failure. It then
//! joins the receiver, drops the socket and, if still running, starts the
//! next generation immediately. Failures during generation setup are
//! retried with a fixed 15 second backoff, indefinitely.
//!
//! The pending table and the sequence counter live here and persist across
//! generations: probes in flight during a restart are swept as loss by the
//! next generation's receiver once their timeout elapses.

use std::io;
use std::net::SocketAddrV4;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::config::ProbeConfig;
use crate::net::iface::{self, IfaceError};
use crate::net::ProbeSocket;
use crate::probe::pending::PendingTable;
use crate::probe::receiver::Receiver;
use crate::probe::sender::{Sender, SeqCounter};
use crate::probe::signal::{GenerationToken, ShutdownToken};
use crate::record::SharedSink;
use crate::trace::{error, info, warn};

/// Fixed delay before retrying after a failed generation setup.
pub const SETUP_RETRY_BACKOFF: Duration = Duration::from_secs(15);

/// Poll interval for the shutdown token during the setup backoff.
const BACKOFF_POLL: Duration = Duration::from_millis(100);

/// Errors establishing a socket generation. All of them are retried with
/// [`SETUP_RETRY_BACKOFF`]; none are fatal to the process.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The source interface has no usable IPv4 address.
    #[error(transparent)]
    Iface(#[from] IfaceError),
    /// No source port could be acquired, not even an ephemeral one.
    #[error("failed to bind source port: {0}")]
    Bind(io::Error),
    /// The socket could not be associated with the destination.
    #[error("failed to connect to {dest}: {source}")]
    Connect {
        dest: SocketAddrV4,
        source: io::Error,
    },
    /// The receiver thread could not be spawned.
    #[error("failed to spawn receiver thread: {0}")]
    Spawn(io::Error),
}

/// Probe engine supervisor.
pub struct Supervisor {
    config: ProbeConfig,
    table: Arc<Mutex<PendingTable>>,
    sink: SharedSink,
    seq: SeqCounter,
    shutdown: ShutdownToken,
}

impl Supervisor {
    /// Creates a supervisor emitting records into `sink` and observing
    /// `shutdown` for cooperative termination.
    pub fn new(config: ProbeConfig, sink: SharedSink, shutdown: ShutdownToken) -> Self {
        Self {
            config,
            table: Arc::new(Mutex::new(PendingTable::new())),
            sink,
            seq: SeqCounter::new(),
            shutdown,
        }
    }

    /// Runs generations until shutdown is requested, then returns cleanly.
    pub fn run(&mut self) {
        info!(
            instance = self.config.instance,
            dest = %SocketAddrV4::new(self.config.dest_addr, self.config.dest_port),
            iface = %self.config.iface,
            "probe supervisor starting"
        );

        while !self.shutdown.is_set() {
            if let Err(e) = self.run_generation() {
                warn!(error = %e, "generation setup failed, backing off");
                self.backoff();
            }
        }

        info!("probe supervisor stopped");
    }

    /// Builds one generation and runs it to completion.
    ///
    /// Returns `Ok(())` both on clean shutdown and after a transport
    /// failure (which restarts immediately); `Err` only for setup failures.
    fn run_generation(&mut self) -> Result<(), SetupError> {
        let source_addr = iface::ipv4_addr(&self.config.iface)?;
        let dest = SocketAddrV4::new(self.config.dest_addr, self.config.dest_port);

        let socket =
            ProbeSocket::bind(source_addr, self.config.source_port).map_err(SetupError::Bind)?;
        socket
            .connect(dest)
            .map_err(|e| SetupError::Connect { dest, source: e })?;
        match socket.local_addr() {
            Ok(local) => info!(%local, %dest, "generation started"),
            Err(_) => info!(%dest, "generation started"),
        }

        let socket = Arc::new(socket);
        let generation = GenerationToken::new();

        let mut receiver = Receiver::new(
            Arc::clone(&socket),
            Arc::clone(&self.table),
            Arc::clone(&self.sink),
            self.config.instance,
            self.config.timeout,
        );
        let rx_shutdown = self.shutdown.clone();
        let rx_generation = generation.clone();
        let rx_handle = thread::Builder::new()
            .name("udping-rx".into())
            .spawn(move || receiver.run(&rx_shutdown, &rx_generation))
            .map_err(SetupError::Spawn)?;

        let mut sender = Sender::new(&socket, &self.table, &mut self.seq, self.config.payload_size);
        if let Err(e) = sender.run(&self.shutdown, &generation) {
            warn!(error = %e, "generation lost its transport, rebuilding");
        }

        // Teardown: cancel whatever is still running, reclaim the receiver,
        // drop the socket. In-flight probes stay in the table.
        generation.cancel();
        if rx_handle.join().is_err() {
            error!("receiver thread panicked");
        }
        Ok(())
    }

    /// Sleeps [`SETUP_RETRY_BACKOFF`], polling the shutdown token so a stop
    /// request does not have to wait out the backoff.
    fn backoff(&self) {
        let deadline = std::time::Instant::now() + SETUP_RETRY_BACKOFF;
        while !self.shutdown.is_set() && std::time::Instant::now() < deadline {
            thread::sleep(BACKOFF_POLL);
        }
    }
}
