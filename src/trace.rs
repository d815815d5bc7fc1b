//! Tracing infrastructure for the probe daemon.
//!
//! The diagnostic log is free-form and non-contractual; the measurement
//! record stream is emitted separately through [`crate::record::RecordSink`].

/// Initialize the tracing subscriber.
///
/// Call this once at daemon or test startup. The filter defaults to
/// `udping=info` and can be overridden via `RUST_LOG`.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("udping=info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_file(false)
                .with_line_number(false),
        )
        .with(filter)
        .init();
}

pub(crate) use tracing::{debug, error, info, warn};
