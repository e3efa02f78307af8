//! Dashboard session
//!
//! Owns one lifecycle per feed. Agent-scoped feeds follow the enrolled
//! agent id, activity-scoped feeds follow the activity id; either can be
//! unknown, in which case its feeds do not poll at all.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use super::directory::AgentDirectory;
use super::state::DashboardState;
use crate::adapters::DashboardApi;
use crate::config::AppConfig;
use crate::feeds::{
    FeedKind, HoldingsFeed, LeaderboardFeed, LogsFeed, RankFeed, ReturnCurveFeed,
};
use crate::sync::{CountdownProjector, DriverOptions, DriverStats, FeedLifecycle};

pub struct DashboardSession {
    state: Arc<DashboardState>,
    directory: Arc<AgentDirectory>,
    agent_id: watch::Sender<Option<i64>>,
    activity_id: watch::Sender<Option<i64>>,
    feeds: BTreeMap<FeedKind, FeedLifecycle>,
    countdown: CountdownProjector,
}

impl DashboardSession {
    /// Wire every feed and start polling whatever the configured ids allow.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(api: Arc<dyn DashboardApi>, config: &AppConfig) -> Self {
        Self::start_with_options(
            api,
            config,
            DriverOptions::default().with_deadline(config.polling.attempt_deadline()),
        )
    }

    pub fn start_with_options(
        api: Arc<dyn DashboardApi>,
        config: &AppConfig,
        options: DriverOptions,
    ) -> Self {
        let state = Arc::new(DashboardState::new());
        let directory = Arc::new(AgentDirectory::with_clock(
            Arc::clone(&api),
            Duration::from_millis(config.cache.agent_ttl_ms),
            Arc::clone(&options.clock),
        ));
        let (agent_id, agent_rx) = watch::channel(config.session.agent_id);
        let (activity_id, activity_rx) = watch::channel(config.session.activity_id);

        let mut feeds = BTreeMap::new();
        for kind in FeedKind::ALL {
            let interval = kind.interval(&config.polling);
            let activation = if kind.is_agent_scoped() {
                agent_rx.clone()
            } else {
                activity_rx.clone()
            };
            let lifecycle = spawn_feed(
                kind,
                interval,
                config,
                activation,
                options.clone(),
                Arc::clone(&api),
                Arc::clone(&state),
            );
            feeds.insert(kind, lifecycle);
        }

        let countdown = {
            let state = Arc::clone(&state);
            let marker = feeds
                .get(&FeedKind::Rank)
                .map(FeedLifecycle::next_fire)
                .unwrap_or_else(|| watch::channel(None).1);
            CountdownProjector::spawn(marker, Arc::clone(&options.clock), move |secs| {
                state.rank_countdown.send_replace(secs);
            })
        };

        info!(
            agent_id = ?config.session.agent_id,
            activity_id = ?config.session.activity_id,
            "dashboard session started"
        );

        Self {
            state,
            directory,
            agent_id,
            activity_id,
            feeds,
            countdown,
        }
    }

    pub fn state(&self) -> &Arc<DashboardState> {
        &self.state
    }

    pub fn directory(&self) -> &Arc<AgentDirectory> {
        &self.directory
    }

    /// Enrolled agent; `None` deactivates rank, holdings and logs.
    pub fn set_agent(&self, agent_id: Option<i64>) {
        let changed = self.agent_id.send_if_modified(|current| {
            if *current == agent_id {
                return false;
            }
            *current = agent_id;
            true
        });
        if changed {
            debug!(?agent_id, "agent changed");
            self.state.clear_agent_views();
        }
    }

    /// Current activity; `None` deactivates leaderboard and return curve.
    pub fn set_activity(&self, activity_id: Option<i64>) {
        let changed = self.activity_id.send_if_modified(|current| {
            if *current == activity_id {
                return false;
            }
            *current = activity_id;
            true
        });
        if changed {
            debug!(?activity_id, "activity changed");
            self.state.clear_activity_views();
        }
    }

    pub fn agent_id(&self) -> Option<i64> {
        *self.agent_id.borrow()
    }

    pub fn activity_id(&self) -> Option<i64> {
        *self.activity_id.borrow()
    }

    /// Manual refresh of one feed; ignored while the feed is inactive.
    pub fn refresh(&self, kind: FeedKind) {
        if let Some(feed) = self.feeds.get(&kind) {
            feed.force_now();
        }
    }

    pub fn refresh_all(&self) {
        for feed in self.feeds.values() {
            feed.force_now();
        }
    }

    pub fn is_active(&self, kind: FeedKind) -> bool {
        self.feeds.get(&kind).is_some_and(FeedLifecycle::is_active)
    }

    /// Stats of the running driver behind each active feed
    pub fn stats(&self) -> Vec<(FeedKind, DriverStats)> {
        self.feeds
            .iter()
            .filter_map(|(kind, feed)| feed.stats().map(|stats| (*kind, stats)))
            .collect()
    }

    /// Stop every feed and the countdown. Nothing is published afterwards.
    pub fn shutdown(&self) {
        for feed in self.feeds.values() {
            feed.stop();
        }
        self.countdown.stop();
        self.state.rank_countdown.send_replace(None);
        self.directory.close();
        info!("dashboard session stopped");
    }
}

fn spawn_feed(
    kind: FeedKind,
    interval: Duration,
    config: &AppConfig,
    activation: watch::Receiver<Option<i64>>,
    options: DriverOptions,
    api: Arc<dyn DashboardApi>,
    state: Arc<DashboardState>,
) -> FeedLifecycle {
    match kind {
        FeedKind::Rank => FeedLifecycle::spawn(kind.as_str(), activation, options, move |id: i64| {
            RankFeed::new(id, interval, Arc::clone(&api), Arc::clone(&state))
        }),
        FeedKind::Holdings => FeedLifecycle::spawn(kind.as_str(), activation, options, move |id: i64| {
            HoldingsFeed::new(id, interval, Arc::clone(&api), Arc::clone(&state))
        }),
        FeedKind::Logs => FeedLifecycle::spawn(kind.as_str(), activation, options, move |id: i64| {
            LogsFeed::new(id, interval, Arc::clone(&api), Arc::clone(&state))
        }),
        FeedKind::Leaderboard => {
            FeedLifecycle::spawn(kind.as_str(), activation, options, move |id: i64| {
                LeaderboardFeed::new(id, interval, Arc::clone(&api), Arc::clone(&state))
            })
        }
        FeedKind::ReturnCurve => {
            let (bucket_ms, cap) = (config.chart.bucket_ms, config.chart.cap);
            FeedLifecycle::spawn(kind.as_str(), activation, options, move |id: i64| {
                ReturnCurveFeed::new(id, interval, Arc::clone(&api), Arc::clone(&state))
                    .with_chart(bucket_ms, cap)
            })
        }
    }
}
