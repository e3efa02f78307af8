//! Scheduled poll driver
//!
//! Runs "fetch now, then again every interval" for one [`Feed`]. Each driver
//! is one spawned task owning a small state machine:
//!
//! ```text
//!   Idle --start--> InFlight --resolve(last)--> Scheduled --tick/force--> InFlight
//!     any --stop--> Stopped
//! ```
//!
//! Starting an attempt takes a fresh sequence from the feed's [`StaleGuard`],
//! cancels the previous attempt's token and arms the next timer at
//! `attempt start + interval`. A result is published only if its sequence is
//! still the latest issued and the driver has not been stopped; both checks
//! and the publish run under the driver lock, which is the same lock
//! [`PollHandle::stop`] takes.
//!
//! Every failure stops at the driver: cancelled and stale results are dropped
//! silently, transport/HTTP failures and deadline overruns are logged and the
//! previously published value stays in place.

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::clock::{default_clock, Clock};
use super::guard::StaleGuard;
use crate::error::{AgentboardError, Result};

/// One independently scheduled polling target
#[async_trait]
pub trait Feed: Send + Sync + 'static {
    type Payload: Send + 'static;

    /// Unique key, used for logging and lookup
    fn key(&self) -> &str;

    /// Time between attempt starts
    fn interval(&self) -> Duration;

    /// Fetch one payload; implementations should stop promptly once `token`
    /// is cancelled.
    async fn fetch(&self, token: CancellationToken) -> Result<Self::Payload>;

    /// Push a fresh payload into external state. Runs under the driver lock,
    /// so it must not call back into the feed's [`PollHandle`].
    fn publish(&self, payload: Self::Payload);
}

/// Driver lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Created, first attempt not yet issued
    Idle,
    /// Waiting for the next timer
    Scheduled,
    /// At least one attempt outstanding
    InFlight,
    /// Terminal
    Stopped,
}

impl std::fmt::Display for DriverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverState::Idle => write!(f, "idle"),
            DriverState::Scheduled => write!(f, "scheduled"),
            DriverState::InFlight => write!(f, "in-flight"),
            DriverState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Inputs to the driver state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverEvent {
    /// Initial immediate attempt
    Start,
    /// Recurring timer fired
    Tick,
    /// Manual refresh
    Force,
    /// An attempt settled; `outstanding` attempts remain
    Resolve { outstanding: usize },
    Stop,
}

impl std::fmt::Display for DriverEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverEvent::Start => write!(f, "start"),
            DriverEvent::Tick => write!(f, "tick"),
            DriverEvent::Force => write!(f, "force"),
            DriverEvent::Resolve { .. } => write!(f, "resolve"),
            DriverEvent::Stop => write!(f, "stop"),
        }
    }
}

impl DriverState {
    /// Apply `event`, returning the next state.
    pub fn on(self, event: DriverEvent) -> Result<DriverState> {
        use DriverState::*;

        match (self, event) {
            (_, DriverEvent::Stop) => Ok(Stopped),
            (Idle, DriverEvent::Start) => Ok(InFlight),
            (Scheduled | InFlight, DriverEvent::Tick | DriverEvent::Force) => Ok(InFlight),
            (InFlight, DriverEvent::Resolve { outstanding: 0 }) => Ok(Scheduled),
            (InFlight, DriverEvent::Resolve { .. }) => Ok(InFlight),
            (from, event) => Err(AgentboardError::InvalidStateTransition {
                from: from.to_string(),
                to: event.to_string(),
            }),
        }
    }
}

/// Options shared by every driver
#[derive(Clone)]
pub struct DriverOptions {
    /// Deadline per attempt; `None` lets an attempt run until superseded
    pub attempt_deadline: Option<Duration>,
    pub clock: Arc<dyn Clock>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            attempt_deadline: Some(Duration::from_secs(30)),
            clock: default_clock(),
        }
    }
}

impl DriverOptions {
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.attempt_deadline = deadline;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Driver statistics snapshot
#[derive(Debug, Clone, Default)]
pub struct DriverStats {
    pub attempts: u64,
    pub published: u64,
    pub stale: u64,
    pub cancelled: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub last_error: Option<String>,
    pub last_published_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct DriverCounters {
    attempts: AtomicU64,
    published: AtomicU64,
    stale: AtomicU64,
    cancelled: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

#[derive(Debug)]
struct Slot {
    state: DriverState,
    /// Token of the current attempt
    token: Option<CancellationToken>,
    last_error: Option<String>,
    last_published_at: Option<Instant>,
}

struct DriverShared {
    key: String,
    guard: StaleGuard,
    slot: Mutex<Slot>,
    next_fire: Arc<watch::Sender<Option<Instant>>>,
    /// Parent of every attempt token; cancelled by stop()
    shutdown: CancellationToken,
    counters: DriverCounters,
    clock: Arc<dyn Clock>,
}

#[derive(Debug)]
enum Command {
    Force,
}

struct Attempt {
    seq: u64,
    token: CancellationToken,
    started_at: Instant,
}

struct AttemptOutcome<T> {
    seq: u64,
    result: Result<T>,
}

impl DriverShared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issue a new attempt, superseding the current one.
    fn begin_attempt(&self, event: DriverEvent, interval: Duration) -> Option<Attempt> {
        let mut slot = self.lock();
        if slot.state == DriverState::Stopped {
            return None;
        }
        let next = match slot.state.on(event) {
            Ok(next) => next,
            Err(e) => {
                warn!(feed = %self.key, error = %e, "attempt rejected");
                return None;
            }
        };

        let seq = self.guard.next();
        if let Some(previous) = slot.token.take() {
            previous.cancel();
        }
        let token = self.shutdown.child_token();
        slot.token = Some(token.clone());
        slot.state = next;

        let started_at = self.clock.now();
        self.next_fire.send_replace(Some(started_at + interval));
        self.counters.attempts.fetch_add(1, Ordering::Relaxed);
        drop(slot);

        debug!(feed = %self.key, seq, %event, "poll attempt started");
        Some(Attempt {
            seq,
            token,
            started_at,
        })
    }

    /// Settle one attempt. Publishes only when it is still current.
    fn resolve<F: Feed>(&self, feed: &F, outcome: AttemptOutcome<F::Payload>, outstanding: usize) {
        let mut slot = self.lock();
        if slot.state == DriverState::Stopped {
            debug!(feed = %self.key, seq = outcome.seq, "dropping result of stopped feed");
            return;
        }
        match slot.state.on(DriverEvent::Resolve { outstanding }) {
            Ok(next) => slot.state = next,
            Err(e) => warn!(feed = %self.key, error = %e, "unexpected resolve"),
        }

        let current = self.guard.is_current(outcome.seq);
        match outcome.result {
            Ok(payload) if current => {
                slot.token = None;
                slot.last_published_at = Some(self.clock.now());
                feed.publish(payload);
                self.counters.published.fetch_add(1, Ordering::Relaxed);
                debug!(feed = %self.key, seq = outcome.seq, "published");
            }
            Ok(_) => {
                self.counters.stale.fetch_add(1, Ordering::Relaxed);
                debug!(
                    feed = %self.key,
                    seq = outcome.seq,
                    latest = self.guard.latest(),
                    "dropping stale response"
                );
            }
            Err(e) if e.is_cancelled() => {
                self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(feed = %self.key, seq = outcome.seq, "attempt cancelled");
            }
            Err(e) => {
                if matches!(e, AgentboardError::Timeout { .. }) {
                    self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                }
                warn!(
                    feed = %self.key,
                    seq = outcome.seq,
                    current,
                    error = %e,
                    "poll attempt failed, keeping last published value"
                );
                slot.last_error = Some(e.to_string());
                if current {
                    slot.token = None;
                }
            }
        }
    }

    fn stop(&self) -> bool {
        let mut slot = self.lock();
        if slot.state == DriverState::Stopped {
            return false;
        }
        slot.state = DriverState::Stopped;
        if let Some(token) = slot.token.take() {
            token.cancel();
        }
        self.shutdown.cancel();
        self.next_fire.send_replace(None);
        true
    }
}

/// Handle to a running driver
#[derive(Clone)]
pub struct PollHandle {
    shared: Arc<DriverShared>,
    commands: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for PollHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollHandle")
            .field("feed", &self.shared.key)
            .field("state", &self.state())
            .finish()
    }
}

impl PollHandle {
    pub fn key(&self) -> &str {
        &self.shared.key
    }

    /// Clear the timer and cancel the in-flight attempt. Idempotent; once it
    /// returns nothing is published for this feed again.
    pub fn stop(&self) {
        if self.shared.stop() {
            info!(feed = %self.shared.key, "poll driver stopped");
        }
    }

    /// Run an attempt now and restart the interval from this moment.
    pub fn force_now(&self) {
        if self.is_stopped() {
            return;
        }
        if self.commands.send(Command::Force).is_err() {
            debug!(feed = %self.shared.key, "force requested after driver exit");
        }
    }

    pub fn state(&self) -> DriverState {
        self.shared.lock().state
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == DriverState::Stopped
    }

    /// Next-Fire Marker of this feed
    pub fn next_fire(&self) -> watch::Receiver<Option<Instant>> {
        self.shared.next_fire.subscribe()
    }

    /// Latest issued attempt sequence
    pub fn latest_seq(&self) -> u64 {
        self.shared.guard.latest()
    }

    pub fn stats(&self) -> DriverStats {
        let slot = self.shared.lock();
        let counters = &self.shared.counters;
        DriverStats {
            attempts: counters.attempts.load(Ordering::Relaxed),
            published: counters.published.load(Ordering::Relaxed),
            stale: counters.stale.load(Ordering::Relaxed),
            cancelled: counters.cancelled.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            timed_out: counters.timed_out.load(Ordering::Relaxed),
            last_error: slot.last_error.clone(),
            last_published_at: slot.last_published_at,
        }
    }
}

/// Start polling `feed`: one attempt immediately, then every interval.
pub fn start<F: Feed>(feed: F, options: DriverOptions) -> PollHandle {
    start_with_marker(feed, options, Arc::new(watch::channel(None).0))
}

/// Like [`start`], writing the Next-Fire Marker into an existing channel so
/// readers survive driver recreation.
pub fn start_with_marker<F: Feed>(
    feed: F,
    options: DriverOptions,
    next_fire: Arc<watch::Sender<Option<Instant>>>,
) -> PollHandle {
    let feed = Arc::new(feed);
    let shared = Arc::new(DriverShared {
        key: feed.key().to_string(),
        guard: StaleGuard::new(),
        slot: Mutex::new(Slot {
            state: DriverState::Idle,
            token: None,
            last_error: None,
            last_published_at: None,
        }),
        next_fire,
        shutdown: CancellationToken::new(),
        counters: DriverCounters::default(),
        clock: Arc::clone(&options.clock),
    });
    let (tx, rx) = mpsc::unbounded_channel();

    info!(
        feed = %shared.key,
        interval_ms = feed.interval().as_millis() as u64,
        "starting poll driver"
    );

    let handle = PollHandle {
        shared: Arc::clone(&shared),
        commands: tx,
    };
    tokio::spawn(run(feed, shared, rx, options.attempt_deadline));
    handle
}

async fn run<F: Feed>(
    feed: Arc<F>,
    shared: Arc<DriverShared>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    deadline: Option<Duration>,
) {
    let interval = feed.interval();
    let mut pending = FuturesUnordered::new();

    let Some(first) = shared.begin_attempt(DriverEvent::Start, interval) else {
        return;
    };
    let mut next_tick = first.started_at + interval;
    pending.push(run_attempt(Arc::clone(&feed), first, deadline));

    loop {
        tokio::select! {
            _ = shared.shutdown.cancelled() => break,

            _ = tokio::time::sleep_until(next_tick) => {
                match shared.begin_attempt(DriverEvent::Tick, interval) {
                    Some(attempt) => {
                        next_tick = attempt.started_at + interval;
                        pending.push(run_attempt(Arc::clone(&feed), attempt, deadline));
                    }
                    None => break,
                }
            }

            command = commands.recv() => match command {
                Some(Command::Force) => match shared.begin_attempt(DriverEvent::Force, interval) {
                    Some(attempt) => {
                        next_tick = attempt.started_at + interval;
                        pending.push(run_attempt(Arc::clone(&feed), attempt, deadline));
                    }
                    None => break,
                },
                // Every handle dropped
                None => {
                    shared.stop();
                    break;
                }
            },

            Some(outcome) = pending.next(), if !pending.is_empty() => {
                shared.resolve(feed.as_ref(), outcome, pending.len());
            }
        }
    }

    debug!(feed = %shared.key, outstanding = pending.len(), "poll driver exited");
}

async fn run_attempt<F: Feed>(
    feed: Arc<F>,
    attempt: Attempt,
    deadline: Option<Duration>,
) -> AttemptOutcome<F::Payload> {
    let fetch = feed.fetch(attempt.token.clone());
    let result = match deadline {
        Some(limit) => match tokio::time::timeout(limit, fetch).await {
            Ok(result) => result,
            Err(_) => {
                attempt.token.cancel();
                Err(AgentboardError::Timeout {
                    elapsed_ms: limit.as_millis() as u64,
                })
            }
        },
        None => fetch.await,
    };

    AttemptOutcome {
        seq: attempt.seq,
        result,
    }
}
