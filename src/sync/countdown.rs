//! Countdown projector
//!
//! Turns a Next-Fire Marker into "seconds until the next poll" on its own
//! one-second tick, independent of the driver's timer.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::clock::Clock;

/// Whole seconds left until `marker`, clamped at zero; `None` without a marker.
pub fn remaining_secs(marker: Option<Instant>, now: Instant) -> Option<u64> {
    marker.map(|at| at.saturating_duration_since(now).as_secs())
}

/// Running projector; stops on [`CountdownProjector::stop`] or drop
pub struct CountdownProjector {
    shutdown: CancellationToken,
}

impl CountdownProjector {
    pub const TICK: Duration = Duration::from_secs(1);

    /// Publish the remaining seconds of `marker` every second.
    ///
    /// The marker is re-read on every tick, never cached between ticks.
    pub fn spawn<P>(
        marker: watch::Receiver<Option<Instant>>,
        clock: Arc<dyn Clock>,
        publish: P,
    ) -> Self
    where
        P: Fn(Option<u64>) + Send + 'static,
    {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Self::TICK);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        let next_fire = *marker.borrow();
                        publish(remaining_secs(next_fire, clock.now()));
                    }
                }
            }
            debug!("countdown projector stopped");
        });

        Self { shutdown }
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for CountdownProjector {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
