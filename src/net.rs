//! Network plumbing: the probe socket and source-interface address lookup.

pub mod iface;
pub mod socket;

pub use iface::ipv4_addr;
pub use socket::ProbeSocket;
