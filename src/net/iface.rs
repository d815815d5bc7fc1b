//! Source-interface address lookup.
//!
//! Probes must leave through a specific measurement interface (one per
//! mobile-broadband modem on a multi-homed node), so the socket is bound to
//! that interface's IPv4 address rather than to the wildcard. The lookup is
//! repeated at every generation setup because modem interfaces come and go
//! and change addresses on reattach.

use std::ffi::CStr;
use std::io;
use std::net::Ipv4Addr;

use thiserror::Error;

/// Errors resolving an interface name to an address.
#[derive(Debug, Error)]
pub enum IfaceError {
    /// The interface list could not be read.
    #[error("getifaddrs failed: {0}")]
    Syscall(#[from] io::Error),
    /// The interface does not exist or carries no IPv4 address.
    #[error("interface {0} has no IPv4 address")]
    NoAddress(String),
}

/// Returns the first IPv4 address assigned to the named interface.
///
/// # Errors
///
/// Returns [`IfaceError::Syscall`] if the interface list cannot be read and
/// [`IfaceError::NoAddress`] if the interface is absent or has no IPv4
/// address (common while a modem is reattaching).
#[cfg(unix)]
pub fn ipv4_addr(name: &str) -> Result<Ipv4Addr, IfaceError> {
    let mut list: *mut libc::ifaddrs = std::ptr::null_mut();
    if unsafe { libc::getifaddrs(&mut list) } != 0 {
        return Err(io::Error::last_os_error().into());
    }

    let mut found = None;
    let mut cursor = list;
    while !cursor.is_null() {
        // Safety: cursor is a valid node of the list returned by getifaddrs,
        // which stays alive until freeifaddrs below.
        let entry = unsafe { &*cursor };
        cursor = entry.ifa_next;

        if entry.ifa_addr.is_null() {
            continue;
        }
        let family = unsafe { (*entry.ifa_addr).sa_family };
        if family != libc::AF_INET as libc::sa_family_t {
            continue;
        }
        let entry_name = unsafe { CStr::from_ptr(entry.ifa_name) };
        if entry_name.to_bytes() != name.as_bytes() {
            continue;
        }

        // Safety: sa_family == AF_INET guarantees sockaddr_in layout.
        let sin = unsafe { &*entry.ifa_addr.cast::<libc::sockaddr_in>() };
        found = Some(Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr)));
        break;
    }

    unsafe { libc::freeifaddrs(list) };
    found.ok_or_else(|| IfaceError::NoAddress(name.to_string()))
}
