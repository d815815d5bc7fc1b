//! Wall-clock sampling.
//!
//! Probe timestamps are wall-clock times (seconds since the Unix epoch)
//! because the send time travels inside the payload and must survive a
//! round trip through a remote echo server. RTT validity checking in the
//! receiver bounds the damage of clock steps between send and receive.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current wall-clock time in seconds since the Unix epoch.
pub fn unix_now() -> f64 {
    since_epoch().as_secs_f64()
}

/// Current wall-clock time in whole microseconds since the Unix epoch.
pub fn unix_now_micros() -> u64 {
    let d = since_epoch();
    d.as_secs() * 1_000_000 + u64::from(d.subsec_micros())
}

fn since_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
}
