//! Dashboard feeds
//!
//! Agent-scoped feeds (rank, holdings, logs) need an enrolled agent id;
//! activity-scoped feeds (leaderboard, return curve) need an activity id.

pub mod activity;
pub mod agent;

pub use activity::{LeaderboardFeed, ReturnCurveFeed};
pub use agent::{HoldingsFeed, LogsFeed, RankFeed};

use std::str::FromStr;
use std::time::Duration;

use crate::config::PollingConfig;
use crate::error::AgentboardError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeedKind {
    Rank,
    Leaderboard,
    ReturnCurve,
    Holdings,
    Logs,
}

impl FeedKind {
    pub const ALL: [FeedKind; 5] = [
        FeedKind::Rank,
        FeedKind::Leaderboard,
        FeedKind::ReturnCurve,
        FeedKind::Holdings,
        FeedKind::Logs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::Rank => "rank",
            FeedKind::Leaderboard => "leaderboard",
            FeedKind::ReturnCurve => "return_curve",
            FeedKind::Holdings => "holdings",
            FeedKind::Logs => "logs",
        }
    }

    /// Configured cadence of this feed
    pub fn interval(&self, polling: &PollingConfig) -> Duration {
        let ms = match self {
            FeedKind::Rank => polling.rank_interval_ms,
            FeedKind::Leaderboard => polling.leaderboard_interval_ms,
            FeedKind::ReturnCurve => polling.return_curve_interval_ms,
            FeedKind::Holdings => polling.holdings_interval_ms,
            FeedKind::Logs => polling.logs_interval_ms,
        };
        Duration::from_millis(ms)
    }

    /// Whether the feed is keyed by agent (otherwise by activity)
    pub fn is_agent_scoped(&self) -> bool {
        matches!(self, FeedKind::Rank | FeedKind::Holdings | FeedKind::Logs)
    }
}

impl std::fmt::Display for FeedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FeedKind {
    type Err = AgentboardError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "rank" => Ok(FeedKind::Rank),
            "leaderboard" => Ok(FeedKind::Leaderboard),
            "return_curve" | "curve" => Ok(FeedKind::ReturnCurve),
            "holdings" => Ok(FeedKind::Holdings),
            "logs" => Ok(FeedKind::Logs),
            other => Err(AgentboardError::Validation(format!(
                "unknown feed '{other}'; expected rank|leaderboard|return_curve|holdings|logs"
            ))),
        }
    }
}
