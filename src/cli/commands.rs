//! Command implementations

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::output::{self, HoldingRow, LeaderboardRow, OutputMode};
use crate::adapters::{ApiClient, DashboardApi};
use crate::config::AppConfig;
use crate::dashboard::{AgentDirectory, DashboardSession};
use crate::domain::{curve_to_series, AgentKey};
use crate::error::{AgentboardError, Result};
use crate::series::merge;

pub async fn show_leaderboard(
    api: &ApiClient,
    activity_id: i64,
    token: CancellationToken,
    mode: OutputMode,
) -> anyhow::Result<()> {
    let items = api.leaderboard(activity_id, token).await?;
    output::print_items(&LeaderboardRow::from_items(&items), mode)
}

pub async fn show_holdings(
    api: &ApiClient,
    agent_id: i64,
    token: CancellationToken,
    mode: OutputMode,
) -> anyhow::Result<()> {
    let holdings = api.holdings(agent_id, token).await?;
    let rows: Vec<HoldingRow> = holdings.items.iter().map(HoldingRow::from).collect();
    output::print_items(&rows, mode)?;
    if mode == OutputMode::Table && !holdings.items.is_empty() {
        println!("total market value: {}", holdings.total_market_value().round_dp(2));
    }
    Ok(())
}

pub async fn show_curve(
    api: &ApiClient,
    config: &AppConfig,
    activity_id: i64,
    tail: Option<usize>,
    token: CancellationToken,
    mode: OutputMode,
) -> anyhow::Result<()> {
    let curves = api.return_curves(activity_id, token).await?;
    let series: Vec<_> = curves.iter().map(curve_to_series).collect();
    let cap = tail.unwrap_or(config.chart.cap).min(config.chart.cap);
    let timeline = merge(&series, config.chart.bucket_ms, Some(cap))?;
    output::print_timeline(&timeline, mode)
}

/// Agent lookup through the directory cache.
pub async fn show_agent(
    api: Arc<dyn DashboardApi>,
    config: &AppConfig,
    id: i64,
    by_user: bool,
    token: CancellationToken,
    mode: OutputMode,
) -> anyhow::Result<()> {
    let key = if by_user {
        AgentKey::User(id)
    } else {
        AgentKey::Id(id)
    };
    let directory = AgentDirectory::new(api, Duration::from_millis(config.cache.agent_ttl_ms));
    let profile = tokio::select! {
        _ = token.cancelled() => {
            directory.close();
            return Err(AgentboardError::Cancelled.into());
        }
        result = directory.get(key) => result?,
    };
    output::print_agent(&profile, mode)
}

/// Run a live session until `shutdown` resolves.
///
/// Every published value is printed as it arrives; the rank countdown is
/// printed when it crosses a ten-second mark.
pub async fn watch<S>(api: Arc<dyn DashboardApi>, config: &AppConfig, shutdown: S) -> Result<()>
where
    S: std::future::Future<Output = ()>,
{
    let session = DashboardSession::start(api, config);
    let state = Arc::clone(session.state());

    let mut rank = state.subscribe_rank();
    let mut leaderboard = state.subscribe_leaderboard();
    let mut chart = state.subscribe_chart();
    let mut holdings = state.subscribe_holdings();
    let mut logs = state.subscribe_logs();
    let mut countdown = state.subscribe_rank_countdown();

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
            Ok(()) = rank.changed() => {
                if let Some(info) = rank.borrow_and_update().as_ref() {
                    match info.rank {
                        Some(position) => println!("[rank] #{position} ({:+.2}%)", info.return_percent()),
                        None => println!("[rank] unranked ({:+.2}%)", info.return_percent()),
                    }
                }
            }
            Ok(()) = leaderboard.changed() => {
                let rows = leaderboard.borrow_and_update().clone();
                if let Some(top) = rows.first() {
                    println!(
                        "[leaderboard] {} participants, leader {} ({:+.2}%)",
                        rows.len(),
                        top.display_name(),
                        top.return_percent()
                    );
                }
            }
            Ok(()) = chart.changed() => {
                let timeline = chart.borrow_and_update().clone();
                if let Some(last) = timeline.buckets.last() {
                    let latest: Vec<String> = timeline
                        .names
                        .iter()
                        .zip(&last.values)
                        .map(|(name, value)| match value {
                            Some(v) => format!("{name}={v:.2}"),
                            None => format!("{name}=-"),
                        })
                        .collect();
                    println!("[curve] {} rows, latest {}", timeline.len(), latest.join(" "));
                }
            }
            Ok(()) = holdings.changed() => {
                if let Some(current) = holdings.borrow_and_update().as_ref() {
                    println!(
                        "[holdings] {} positions, value {}",
                        current.items.len(),
                        current.total_market_value().round_dp(2)
                    );
                }
            }
            Ok(()) = logs.changed() => {
                let entries = logs.borrow_and_update().clone();
                if let Some(latest) = entries.first() {
                    println!("[logs] {} entries, latest: {}", entries.len(), latest.message);
                }
            }
            Ok(()) = countdown.changed() => {
                if let Some(secs) = *countdown.borrow_and_update() {
                    if secs % 10 == 0 {
                        println!("[rank] next refresh in {secs}s");
                    }
                }
            }
        }
    }

    for (kind, stats) in session.stats() {
        if stats.failed > 0 || stats.timed_out > 0 {
            warn!(
                feed = %kind,
                failed = stats.failed,
                timed_out = stats.timed_out,
                last_error = ?stats.last_error,
                "feed had failures"
            );
        }
    }
    session.shutdown();
    Ok(())
}
