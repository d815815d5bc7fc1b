//! Immutable probe configuration.
//!
//! The core consumes a fully resolved [`ProbeConfig`]; argument parsing and
//! validation live in the binary. Defaults match the deployed measurement
//! fleet: echo service on port 7 at the fixed probe server, 20-byte payloads,
//! 60 second reply timeout.

use std::io;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Default probe server address.
pub const DEFAULT_DEST_ADDR: Ipv4Addr = Ipv4Addr::new(128, 39, 37, 70);

/// Default destination port (UDP echo).
pub const DEFAULT_DEST_PORT: u16 = 7;

/// Default probe payload size in bytes.
pub const DEFAULT_PAYLOAD_SIZE: usize = 20;

/// Default reply timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Immutable configuration for one probe instance.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Measurement instance identifier, carried in every record.
    pub instance: u32,
    /// Probe destination address.
    pub dest_addr: Ipv4Addr,
    /// Probe destination port.
    pub dest_port: u16,
    /// Source interface name; its IPv4 address is resolved per generation.
    pub iface: String,
    /// Payload size in bytes (shorter payloads are left-zero-padded).
    pub payload_size: usize,
    /// Reply timeout; pending probes older than this are reported as loss.
    pub timeout: Duration,
    /// Source port to bind, or 0 for an OS-assigned port.
    pub source_port: u16,
}

/// Derives the deterministic source port `10000 + 10 * hostSuffix + networkId`.
///
/// `hostSuffix` is the integer suffix of the hostname after its first three
/// characters (measurement nodes are named like `nne123`). Returns `None`
/// when the hostname does not follow that convention or the result does not
/// fit a port number; the caller falls back to an OS-assigned port.
#[must_use]
pub fn derive_source_port(hostname: &str, network_id: u16) -> Option<u16> {
    let suffix: u16 = hostname.get(3..)?.trim().parse().ok()?;
    10_000u16
        .checked_add(suffix.checked_mul(10)?)?
        .checked_add(network_id)
}

/// Returns the local hostname.
///
/// # Errors
///
/// Returns an error if the `gethostname` syscall fails.
#[cfg(unix)]
pub fn hostname() -> io::Result<String> {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Ok(String::from_utf8_lossy(&buf[..len]).into_owned())
}
