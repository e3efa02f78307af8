//! Client-side polling and synchronization core
//!
//! - `clock` - time source shared by everything time-driven
//! - `guard` - per-feed stale-response sequence counter
//! - `cache` - TTL cache with in-flight request collapse
//! - `driver` - scheduled poll driver state machine
//! - `lifecycle` - activation-driven driver creation and teardown
//! - `countdown` - seconds-until-next-poll projection

pub mod cache;
pub mod clock;
pub mod countdown;
pub mod driver;
pub mod guard;
pub mod lifecycle;

pub use cache::{CacheStats, DedupCache};
pub use clock::{default_clock, Clock, TokioClock};
pub use countdown::{remaining_secs, CountdownProjector};
pub use driver::{
    start, start_with_marker, DriverEvent, DriverOptions, DriverState, DriverStats, Feed,
    PollHandle,
};
pub use guard::StaleGuard;
pub use lifecycle::FeedLifecycle;
pub use tokio_util::sync::CancellationToken;
