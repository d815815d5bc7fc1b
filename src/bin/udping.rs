//! udping daemon.
//!
//! Probes a fixed UDP echo destination once per second over a named source
//! interface and appends one measurement record per probe to the output
//! stream.
//!
//! # Usage
//!
//! ```sh
//! udping --instance 5 --iface wwan0 --output /var/lib/udping/uping_5.dat
//! ```
//!
//! # Signals
//!
//! `SIGINT` / `SIGTERM`: cooperative shutdown. The current generation is
//! torn down, in-flight probes are abandoned, and the process exits 0.

use std::fs::OpenOptions;
use std::io;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use udping::config::{self, ProbeConfig};
use udping::record::{SharedSink, WriterSink};
use udping::{init_tracing, ShutdownToken, Supervisor};

/// Flipped by the signal handler; bridged to the [`ShutdownToken`] by the
/// watcher thread. Signal handlers may only touch async-signal-safe state.
static SIGNALLED: AtomicBool = AtomicBool::new(false);

/// Watcher poll interval for the signal flag.
const SIGNAL_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Parser)]
#[command(name = "udping", about = "Continuous UDP round-trip latency probe")]
struct Opt {
    /// Measurement instance ID, carried in every record
    #[arg(short = 'i', long)]
    instance: u32,

    /// Destination port
    #[arg(short = 'd', long, default_value_t = config::DEFAULT_DEST_PORT)]
    dport: u16,

    /// Destination IP
    #[arg(short = 'D', long, default_value_t = config::DEFAULT_DEST_ADDR)]
    daddr: Ipv4Addr,

    /// Source interface name
    #[arg(short = 'I', long)]
    iface: String,

    /// Payload size in bytes
    #[arg(short = 'S', long, default_value_t = config::DEFAULT_PAYLOAD_SIZE)]
    psize: usize,

    /// Reply timeout in seconds
    #[arg(short = 't', long, default_value_t = 60)]
    timeout: u64,

    /// Network identifier; derives a deterministic source port from the
    /// node hostname when given, otherwise the OS assigns one
    #[arg(short = 'N', long)]
    network_id: Option<u16>,

    /// Record output file (created/appended); defaults to stdout.
    /// Rotation is left to external tooling.
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
}

fn main() {
    let opt = Opt::parse();
    init_tracing();

    if let Err(e) = run(opt) {
        eprintln!("udping: {e}");
        std::process::exit(1);
    }
}

fn run(opt: Opt) -> io::Result<()> {
    let source_port = derive_source_port(opt.network_id)?;
    let config = ProbeConfig {
        instance: opt.instance,
        dest_addr: opt.daddr,
        dest_port: opt.dport,
        iface: opt.iface,
        payload_size: opt.psize,
        timeout: Duration::from_secs(opt.timeout),
        source_port,
    };

    let sink: SharedSink = match &opt.output {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Arc::new(Mutex::new(WriterSink::new(file)))
        }
        None => Arc::new(Mutex::new(WriterSink::new(io::stdout()))),
    };

    let shutdown = ShutdownToken::new();
    install_signal_handlers();
    let watcher = spawn_signal_watcher(shutdown.clone());

    Supervisor::new(config, sink, shutdown).run();

    // Supervisor only returns once the token is set, so the watcher exits.
    let _ = watcher.join();
    info!("exiting");
    Ok(())
}

/// Applies the deterministic source-port rule when a network ID is given.
fn derive_source_port(network_id: Option<u16>) -> io::Result<u16> {
    let Some(id) = network_id else {
        return Ok(0);
    };
    let host = config::hostname()?;
    match config::derive_source_port(&host, id) {
        Some(port) => Ok(port),
        None => {
            warn!(
                hostname = %host,
                network_id = id,
                "hostname does not follow node naming, using an OS-assigned source port"
            );
            Ok(0)
        }
    }
}

extern "C" fn on_signal(_sig: libc::c_int) {
    SIGNALLED.store(true, Ordering::Relaxed);
}

fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGINT, on_signal as *const () as libc::sighandler_t);
        libc::signal(libc::SIGTERM, on_signal as *const () as libc::sighandler_t);
    }
}

/// Bridges the async-signal-safe flag to the cooperative shutdown token.
fn spawn_signal_watcher(shutdown: ShutdownToken) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("udping-signal".into())
        .spawn(move || {
            while !SIGNALLED.load(Ordering::Relaxed) && !shutdown.is_set() {
                thread::sleep(SIGNAL_POLL);
            }
            info!("shutdown requested");
            shutdown.trigger();
        })
        .expect("failed to spawn signal watcher thread")
}
