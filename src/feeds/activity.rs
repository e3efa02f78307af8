//! Feeds scoped to the current activity

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::adapters::DashboardApi;
use crate::dashboard::DashboardState;
use crate::domain::{curve_to_series, LeaderboardItem};
use crate::error::Result;
use crate::series::{merge, MergedTimeline, Series};
use crate::sync::Feed;

pub struct LeaderboardFeed {
    key: String,
    activity_id: i64,
    interval: Duration,
    api: Arc<dyn DashboardApi>,
    state: Arc<DashboardState>,
}

impl LeaderboardFeed {
    pub fn new(
        activity_id: i64,
        interval: Duration,
        api: Arc<dyn DashboardApi>,
        state: Arc<DashboardState>,
    ) -> Self {
        Self {
            key: format!("leaderboard:{activity_id}"),
            activity_id,
            interval,
            api,
            state,
        }
    }
}

#[async_trait]
impl Feed for LeaderboardFeed {
    type Payload = Vec<LeaderboardItem>;

    fn key(&self) -> &str {
        &self.key
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn fetch(&self, token: CancellationToken) -> Result<Vec<LeaderboardItem>> {
        self.api.leaderboard(self.activity_id, token).await
    }

    fn publish(&self, payload: Vec<LeaderboardItem>) {
        self.state.leaderboard.send_replace(payload);
    }
}

/// Return curves of every participant, merged into one chart timeline.
///
/// Merging happens on the fetch side so that a malformed response counts as
/// a failed attempt and the previous chart stays up.
pub struct ReturnCurveFeed {
    key: String,
    activity_id: i64,
    interval: Duration,
    bucket_ms: i64,
    cap: usize,
    api: Arc<dyn DashboardApi>,
    state: Arc<DashboardState>,
}

impl ReturnCurveFeed {
    pub fn new(
        activity_id: i64,
        interval: Duration,
        api: Arc<dyn DashboardApi>,
        state: Arc<DashboardState>,
    ) -> Self {
        Self {
            key: format!("return_curve:{activity_id}"),
            activity_id,
            interval,
            bucket_ms: crate::config::ChartConfig::default().bucket_ms,
            cap: crate::series::DEFAULT_CAP,
            api,
            state,
        }
    }

    /// Override the bucket width and the cap on merged rows.
    pub fn with_chart(mut self, bucket_ms: i64, cap: usize) -> Self {
        self.bucket_ms = bucket_ms;
        self.cap = cap;
        self
    }
}

#[async_trait]
impl Feed for ReturnCurveFeed {
    type Payload = MergedTimeline;

    fn key(&self) -> &str {
        &self.key
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn fetch(&self, token: CancellationToken) -> Result<MergedTimeline> {
        let curves = self.api.return_curves(self.activity_id, token).await?;
        let series: Vec<Series> = curves.iter().map(curve_to_series).collect();
        let timeline = merge(&series, self.bucket_ms, Some(self.cap))?;
        debug!(
            feed = %self.key,
            participants = series.len(),
            rows = timeline.len(),
            "return curves merged"
        );
        Ok(timeline)
    }

    fn publish(&self, payload: MergedTimeline) {
        self.state.chart.send_replace(payload);
    }
}
