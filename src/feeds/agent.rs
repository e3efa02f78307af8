//! Feeds scoped to the enrolled agent

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::adapters::DashboardApi;
use crate::dashboard::DashboardState;
use crate::domain::{Holdings, LogEntry, RankInfo};
use crate::error::Result;
use crate::sync::Feed;

/// Current rank of the agent
pub struct RankFeed {
    key: String,
    agent_id: i64,
    interval: Duration,
    api: Arc<dyn DashboardApi>,
    state: Arc<DashboardState>,
}

impl RankFeed {
    pub fn new(
        agent_id: i64,
        interval: Duration,
        api: Arc<dyn DashboardApi>,
        state: Arc<DashboardState>,
    ) -> Self {
        Self {
            key: format!("rank:{agent_id}"),
            agent_id,
            interval,
            api,
            state,
        }
    }
}

#[async_trait]
impl Feed for RankFeed {
    type Payload = RankInfo;

    fn key(&self) -> &str {
        &self.key
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn fetch(&self, token: CancellationToken) -> Result<RankInfo> {
        self.api.rank(self.agent_id, token).await
    }

    fn publish(&self, payload: RankInfo) {
        self.state.rank.send_replace(Some(payload));
    }
}

/// Positions held by the agent
pub struct HoldingsFeed {
    key: String,
    agent_id: i64,
    interval: Duration,
    api: Arc<dyn DashboardApi>,
    state: Arc<DashboardState>,
}

impl HoldingsFeed {
    pub fn new(
        agent_id: i64,
        interval: Duration,
        api: Arc<dyn DashboardApi>,
        state: Arc<DashboardState>,
    ) -> Self {
        Self {
            key: format!("holdings:{agent_id}"),
            agent_id,
            interval,
            api,
            state,
        }
    }
}

#[async_trait]
impl Feed for HoldingsFeed {
    type Payload = Holdings;

    fn key(&self) -> &str {
        &self.key
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn fetch(&self, token: CancellationToken) -> Result<Holdings> {
        self.api.holdings(self.agent_id, token).await
    }

    fn publish(&self, payload: Holdings) {
        self.state.holdings.send_replace(Some(payload));
    }
}

/// Execution log of the agent
pub struct LogsFeed {
    key: String,
    agent_id: i64,
    interval: Duration,
    api: Arc<dyn DashboardApi>,
    state: Arc<DashboardState>,
}

impl LogsFeed {
    pub fn new(
        agent_id: i64,
        interval: Duration,
        api: Arc<dyn DashboardApi>,
        state: Arc<DashboardState>,
    ) -> Self {
        Self {
            key: format!("logs:{agent_id}"),
            agent_id,
            interval,
            api,
            state,
        }
    }
}

#[async_trait]
impl Feed for LogsFeed {
    type Payload = Vec<LogEntry>;

    fn key(&self) -> &str {
        &self.key
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn fetch(&self, token: CancellationToken) -> Result<Vec<LogEntry>> {
        self.api.logs(self.agent_id, token).await
    }

    fn publish(&self, payload: Vec<LogEntry>) {
        self.state.logs.send_replace(payload);
    }
}
