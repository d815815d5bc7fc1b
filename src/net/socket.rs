//! Bound and connected UDP probe socket.
//!
//! Thin wrapper around [`std::net::UdpSocket`] with the lifecycle this
//! daemon needs: bind to the measurement interface with a one-shot fallback
//! to an OS-assigned port, connect to the fixed destination, and receive
//! with a bounded timeout so the receiver loop stays responsive to
//! cancellation.

use std::io::{self, ErrorKind};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

/// Upper bound on one blocking receive. This is the receiver loop's poll
/// interval for the shutdown and generation tokens, and the granularity of
/// loss detection.
pub const RECV_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// A UDP socket bound to the probe source address and connected to the
/// probe destination.
#[derive(Debug)]
pub struct ProbeSocket {
    inner: UdpSocket,
}

impl ProbeSocket {
    /// Binds to `(source_addr, source_port)`.
    ///
    /// If binding the explicit non-zero port fails, retries once with port 0
    /// (OS-assigned); a failure with port already 0 propagates.
    ///
    /// # Errors
    ///
    /// Returns the bind error when no port can be acquired.
    pub fn bind(source_addr: Ipv4Addr, source_port: u16) -> io::Result<Self> {
        let inner = match UdpSocket::bind(SocketAddrV4::new(source_addr, source_port)) {
            Ok(socket) => socket,
            Err(_) if source_port != 0 => UdpSocket::bind(SocketAddrV4::new(source_addr, 0))?,
            Err(e) => return Err(e),
        };
        inner.set_read_timeout(Some(RECV_POLL_TIMEOUT))?;
        Ok(Self { inner })
    }

    /// Connects the socket to the probe destination so subsequent sends and
    /// receives need not re-specify the peer.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer address cannot be associated.
    pub fn connect(&self, dest: SocketAddrV4) -> io::Result<()> {
        self.inner.connect(dest)
    }

    /// Returns the local address this socket is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the local address cannot be retrieved.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Sends a datagram to the connected peer.
    ///
    /// # Errors
    ///
    /// Returns an error on transport-level I/O failure.
    pub fn send(&self, buf: &[u8]) -> io::Result<usize> {
        self.inner.send(buf)
    }

    /// Receives one datagram from the connected peer, waiting at most
    /// [`RECV_POLL_TIMEOUT`].
    ///
    /// Returns `Ok(None)` when the wait times out; timeouts are an expected
    /// idle condition, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error on transport-level I/O failure.
    pub fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.inner.recv(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
