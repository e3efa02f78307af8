use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::{
    AgentKey, AgentProfile, Holdings, LeaderboardItem, LogEntry, RankInfo, ReturnCurve,
};
use crate::error::Result;

/// Typed backend endpoints the dashboard polls. Every call takes the
/// attempt's cancellation token and fails with `Cancelled` once it fires.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DashboardApi: Send + Sync {
    async fn rank(&self, agent_id: i64, token: CancellationToken) -> Result<RankInfo>;

    async fn leaderboard(
        &self,
        activity_id: i64,
        token: CancellationToken,
    ) -> Result<Vec<LeaderboardItem>>;

    async fn return_curves(
        &self,
        activity_id: i64,
        token: CancellationToken,
    ) -> Result<Vec<ReturnCurve>>;

    async fn holdings(&self, agent_id: i64, token: CancellationToken) -> Result<Holdings>;

    async fn logs(&self, agent_id: i64, token: CancellationToken) -> Result<Vec<LogEntry>>;

    async fn agent(&self, key: AgentKey, token: CancellationToken) -> Result<AgentProfile>;
}
