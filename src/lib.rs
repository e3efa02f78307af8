//! Agentboard: polling and synchronization core of a trading-agent
//! dashboard client.
//!
//! Feeds are polled on fixed cadences by [`sync::driver`]; responses that
//! were overtaken by a newer request are discarded, agent lookups are
//! deduplicated through a short-TTL cache, and return curves of several
//! participants are merged into one forward-filled chart timeline.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod domain;
pub mod error;
pub mod feeds;
pub mod series;
pub mod sync;

pub use adapters::{ApiClient, DashboardApi};
pub use config::AppConfig;
pub use dashboard::{AgentDirectory, DashboardSession, DashboardState};
pub use error::{AgentboardError, Result};
pub use feeds::FeedKind;
pub use series::{merge, MergedTimeline, Series, SeriesPoint};
pub use sync::{CountdownProjector, DedupCache, DriverOptions, Feed, FeedLifecycle, PollHandle, StaleGuard};
