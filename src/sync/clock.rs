//! Time source for the polling core.
//!
//! Everything time-driven reads "now" through [`Clock`] and sleeps through
//! tokio, so a paused tokio clock drives the whole core deterministically.

use std::sync::Arc;
use tokio::time::Instant;

/// Source of the current instant
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Clock backed by tokio's runtime clock
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Shared handle to the default clock
pub fn default_clock() -> Arc<dyn Clock> {
    Arc::new(TokioClock)
}
