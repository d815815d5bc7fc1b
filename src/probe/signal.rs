//! Cooperative cancellation tokens.
//!
//! Two scopes: [`ShutdownToken`] stops the whole daemon, a
//! [`GenerationToken`] cancels a single socket generation (its receiver
//! thread and the sender loop sharing that socket). The supervisor owns all
//! transitions; the loops only observe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide cooperative stop flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken(Arc<AtomicBool>);

impl ShutdownToken {
    /// Creates a token in the "running" state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown. Idempotent.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Cancellation flag scoped to one socket generation.
///
/// Set either by the supervisor during teardown or by the receiver loop when
/// it hits a transport-level I/O error; both loops poll it and exit.
#[derive(Debug, Clone, Default)]
pub struct GenerationToken(Arc<AtomicBool>);

impl GenerationToken {
    /// Creates a token in the "active" state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the generation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether the generation has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
