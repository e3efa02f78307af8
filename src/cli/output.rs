//! Output formatting for `agentboard` commands.
//!
//! Supports two modes: human-readable tables (default) and JSON (--json).

use chrono::DateTime;
use serde::Serialize;
use tabled::builder::Builder;
use tabled::{Table, Tabled};

use crate::domain::{AgentProfile, Holding, LeaderboardItem};
use crate::series::MergedTimeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Table,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Table
        }
    }
}

#[derive(Debug, Tabled, Serialize)]
pub struct LeaderboardRow {
    #[tabled(rename = "#")]
    pub position: usize,
    #[tabled(rename = "Participant")]
    pub name: String,
    #[tabled(rename = "Agent")]
    pub agent_id: i64,
    #[tabled(rename = "Return %")]
    pub return_percent: String,
}

impl LeaderboardRow {
    pub fn from_items(items: &[LeaderboardItem]) -> Vec<Self> {
        items
            .iter()
            .enumerate()
            .map(|(idx, item)| Self {
                position: idx + 1,
                name: item.display_name(),
                agent_id: item.agent_id,
                return_percent: format!("{:+.2}", item.return_percent()),
            })
            .collect()
    }
}

#[derive(Debug, Tabled, Serialize)]
pub struct HoldingRow {
    #[tabled(rename = "Code")]
    pub code: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Qty")]
    pub quantity: String,
    #[tabled(rename = "Price")]
    pub price: String,
    #[tabled(rename = "Value")]
    pub market_value: String,
    #[tabled(rename = "P/L %")]
    pub profit_loss_percent: String,
}

impl From<&Holding> for HoldingRow {
    fn from(holding: &Holding) -> Self {
        Self {
            code: holding.stock_code.clone(),
            name: holding.stock_name.clone(),
            quantity: holding.quantity.normalize().to_string(),
            price: holding.latest_price.round_dp(2).to_string(),
            market_value: holding.market_value().round_dp(2).to_string(),
            profit_loss_percent: format!("{:+.2}", holding.profit_loss_percent()),
        }
    }
}

/// Print a vec of Tabled + Serialize items in the chosen mode.
pub fn print_items<T: Tabled + Serialize>(items: &[T], mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table => {
            if items.is_empty() {
                println!("(no results)");
            } else {
                println!("{}", Table::new(items));
            }
        }
        OutputMode::Json => println!("{}", serde_json::to_string_pretty(items)?),
    }
    Ok(())
}

pub fn print_agent(profile: &AgentProfile, mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table => {
            println!("id:      {}", profile.id);
            if let Some(user_id) = profile.user_id {
                println!("user:    {user_id}");
            }
            if let Some(name) = &profile.name {
                println!("name:    {name}");
            }
            for (key, value) in &profile.extra {
                println!("{key}: {value}");
            }
        }
        OutputMode::Json => println!("{}", serde_json::to_string_pretty(profile)?),
    }
    Ok(())
}

/// Merged chart as a table with one column per participant.
pub fn timeline_table(timeline: &MergedTimeline) -> String {
    let mut builder = Builder::default();
    let mut header = vec!["date".to_string()];
    header.extend(timeline.names.iter().cloned());
    builder.push_record(header);

    for bucket in &timeline.buckets {
        let mut row = vec![format_date(bucket.timestamp_ms)];
        row.extend(bucket.values.iter().map(|value| match value {
            Some(v) => format!("{v:.2}"),
            None => "-".to_string(),
        }));
        builder.push_record(row);
    }
    builder.build().to_string()
}

pub fn print_timeline(timeline: &MergedTimeline, mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table if timeline.is_empty() => println!("(no results)"),
        OutputMode::Table => println!("{}", timeline_table(timeline)),
        OutputMode::Json => println!("{}", serde_json::to_string_pretty(&timeline.to_records())?),
    }
    Ok(())
}

fn format_date(timestamp_ms: i64) -> String {
    DateTime::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::{merge, Series, SeriesPoint};
    use rust_decimal_macros::dec;

    #[test]
    fn test_leaderboard_rows() {
        let rows = LeaderboardRow::from_items(&[
            LeaderboardItem {
                user_id: Some(1),
                user_name: Some("alice".into()),
                agent_id: 10,
                return_pct: 0.125,
            },
            LeaderboardItem {
                user_id: None,
                user_name: None,
                agent_id: 11,
                return_pct: -3.5,
            },
        ]);
        assert_eq!(rows[0].position, 1);
        assert_eq!(rows[0].return_percent, "+12.50");
        assert_eq!(rows[1].name, "agent 11");
        assert_eq!(rows[1].return_percent, "-3.50");
    }

    #[test]
    fn test_holding_row() {
        let row = HoldingRow::from(&Holding {
            stock_code: "600519".into(),
            stock_name: "Moutai".into(),
            quantity: dec!(100),
            latest_price: dec!(1688.456),
            profit_loss_pct: 0.031,
        });
        assert_eq!(row.quantity, "100");
        assert_eq!(row.price, "1688.46");
        assert_eq!(row.market_value, "168845.60");
        assert_eq!(row.profit_loss_percent, "+3.10");
    }

    #[test]
    fn test_timeline_table_marks_missing_values() {
        let day = 86_400_000;
        let timeline = merge(
            &[
                Series::new("a", vec![SeriesPoint::new(0, 100.0), SeriesPoint::new(day, 101.0)]),
                Series::new("b", vec![SeriesPoint::new(day, 99.5)]),
            ],
            day,
            None,
        )
        .unwrap();
        let table = timeline_table(&timeline);
        assert!(table.contains("1970-01-01"));
        assert!(table.contains("1970-01-02"));
        assert!(table.contains("99.50"));
        assert!(table.contains(" - "));
    }
}
