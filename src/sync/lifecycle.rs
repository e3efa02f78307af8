//! Feed lifecycle
//!
//! Binds a poll driver to an activation parameter. While the parameter is
//! `None` no driver runs; the first `Some(p)` starts one, a different
//! `Some(q)` replaces it, and `None` or shutdown stops it.
//!
//! The supervisor reacts to a change one scheduling step later, so a fetch
//! may complete after the parameter moved on. Every driver therefore checks,
//! under its own lock, that the parameter it was built for is still current
//! before publishing.

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::driver::{self, DriverOptions, DriverStats, Feed, PollHandle};
use crate::error::Result;

type CurrentDriver = Arc<Mutex<Option<PollHandle>>>;

/// A feed that follows its activation parameter
pub struct FeedLifecycle {
    key: String,
    marker: watch::Receiver<Option<Instant>>,
    current: CurrentDriver,
    shutdown: CancellationToken,
}

impl FeedLifecycle {
    /// Watch `activation` and keep a driver running for its current value.
    ///
    /// `build` creates the feed for one activation value.
    pub fn spawn<P, F, B>(
        key: impl Into<String>,
        activation: watch::Receiver<Option<P>>,
        options: DriverOptions,
        build: B,
    ) -> Self
    where
        P: Clone + PartialEq + Debug + Send + Sync + 'static,
        F: Feed,
        B: Fn(P) -> F + Send + Sync + 'static,
    {
        let key = key.into();
        let (marker_tx, marker) = watch::channel(None);
        let current: CurrentDriver = Arc::new(Mutex::new(None));
        let shutdown = CancellationToken::new();

        tokio::spawn(supervise(
            key.clone(),
            activation,
            options,
            build,
            Arc::new(marker_tx),
            Arc::clone(&current),
            shutdown.clone(),
        ));

        Self {
            key,
            marker,
            current,
            shutdown,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Next-Fire Marker of whichever driver is current
    pub fn next_fire(&self) -> watch::Receiver<Option<Instant>> {
        self.marker.clone()
    }

    pub fn is_active(&self) -> bool {
        lock(&self.current).is_some()
    }

    /// Manual refresh of the current driver, if any.
    pub fn force_now(&self) {
        match lock(&self.current).as_ref() {
            Some(handle) => handle.force_now(),
            None => debug!(feed = %self.key, "refresh ignored, feed inactive"),
        }
    }

    pub fn stats(&self) -> Option<DriverStats> {
        lock(&self.current).as_ref().map(PollHandle::stats)
    }

    /// Stop the current driver and stop following activation changes.
    pub fn stop(&self) {
        self.shutdown.cancel();
        if let Some(handle) = lock(&self.current).take() {
            handle.stop();
        }
    }
}

impl Drop for FeedLifecycle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A feed bound to the activation value it was built for
struct Bound<F, P> {
    inner: F,
    param: P,
    activation: watch::Receiver<Option<P>>,
}

#[async_trait]
impl<F, P> Feed for Bound<F, P>
where
    F: Feed,
    P: PartialEq + Send + Sync + 'static,
{
    type Payload = F::Payload;

    fn key(&self) -> &str {
        self.inner.key()
    }

    fn interval(&self) -> Duration {
        self.inner.interval()
    }

    async fn fetch(&self, token: CancellationToken) -> Result<F::Payload> {
        self.inner.fetch(token).await
    }

    fn publish(&self, payload: F::Payload) {
        // the read guard holds off a concurrent send until publish returns
        let current = self.activation.borrow();
        if current.as_ref() == Some(&self.param) {
            self.inner.publish(payload);
        } else {
            debug!(feed = %self.inner.key(), "activation moved on, dropping result");
        }
    }
}

fn lock(current: &CurrentDriver) -> MutexGuard<'_, Option<PollHandle>> {
    current.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn supervise<P, F, B>(
    key: String,
    mut activation: watch::Receiver<Option<P>>,
    options: DriverOptions,
    build: B,
    marker: Arc<watch::Sender<Option<Instant>>>,
    current: CurrentDriver,
    shutdown: CancellationToken,
) where
    P: Clone + PartialEq + Debug + Send + Sync + 'static,
    F: Feed,
    B: Fn(P) -> F + Send + Sync + 'static,
{
    let mut active: Option<P> = None;

    loop {
        let wanted = activation.borrow_and_update().clone();

        if wanted != active {
            let mut slot = lock(&current);
            if shutdown.is_cancelled() {
                break;
            }
            if let Some(previous) = slot.take() {
                info!(feed = %key, from = ?active, to = ?wanted, "activation changed, stopping driver");
                previous.stop();
            }
            if let Some(param) = wanted.clone() {
                debug!(feed = %key, ?param, "activating feed");
                let feed = Bound {
                    inner: build(param.clone()),
                    param,
                    activation: activation.clone(),
                };
                *slot = Some(driver::start_with_marker(
                    feed,
                    options.clone(),
                    Arc::clone(&marker),
                ));
            }
            active = wanted;
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = activation.changed() => {
                if changed.is_err() {
                    debug!(feed = %key, "activation source closed");
                    break;
                }
            }
        }
    }

    if let Some(handle) = lock(&current).take() {
        handle.stop();
    }
}
