use tokio::sync::watch;

use crate::domain::{Holdings, LeaderboardItem, LogEntry, RankInfo};
use crate::series::MergedTimeline;

/// Latest published value of every feed.
///
/// Each slot is a watch channel: views subscribe and always see the most
/// recent value, intermediate values may be skipped.
#[derive(Debug)]
pub struct DashboardState {
    pub rank: watch::Sender<Option<RankInfo>>,
    pub leaderboard: watch::Sender<Vec<LeaderboardItem>>,
    pub chart: watch::Sender<MergedTimeline>,
    pub holdings: watch::Sender<Option<Holdings>>,
    pub logs: watch::Sender<Vec<LogEntry>>,
    /// Seconds until the next rank poll; `None` while the rank feed is inactive
    pub rank_countdown: watch::Sender<Option<u64>>,
}

impl DashboardState {
    pub fn new() -> Self {
        Self {
            rank: watch::channel(None).0,
            leaderboard: watch::channel(Vec::new()).0,
            chart: watch::channel(MergedTimeline::default()).0,
            holdings: watch::channel(None).0,
            logs: watch::channel(Vec::new()).0,
            rank_countdown: watch::channel(None).0,
        }
    }

    pub fn subscribe_rank(&self) -> watch::Receiver<Option<RankInfo>> {
        self.rank.subscribe()
    }

    pub fn subscribe_leaderboard(&self) -> watch::Receiver<Vec<LeaderboardItem>> {
        self.leaderboard.subscribe()
    }

    pub fn subscribe_chart(&self) -> watch::Receiver<MergedTimeline> {
        self.chart.subscribe()
    }

    pub fn subscribe_holdings(&self) -> watch::Receiver<Option<Holdings>> {
        self.holdings.subscribe()
    }

    pub fn subscribe_logs(&self) -> watch::Receiver<Vec<LogEntry>> {
        self.logs.subscribe()
    }

    pub fn subscribe_rank_countdown(&self) -> watch::Receiver<Option<u64>> {
        self.rank_countdown.subscribe()
    }

    /// Drop agent-scoped values, e.g. when the enrolled agent changes.
    pub fn clear_agent_views(&self) {
        self.rank.send_replace(None);
        self.holdings.send_replace(None);
        self.logs.send_replace(Vec::new());
    }

    /// Drop activity-scoped values.
    pub fn clear_activity_views(&self) {
        self.leaderboard.send_replace(Vec::new());
        self.chart.send_replace(MergedTimeline::default());
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new()
    }
}
