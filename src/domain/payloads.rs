//! Wire payloads of the dashboard API. Field names follow the backend.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::percent::percent_points;

/// Leaderboard row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardItem {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub user_name: Option<String>,
    pub agent_id: i64,
    pub return_pct: f64,
}

impl LeaderboardItem {
    /// User name, falling back to the user id
    pub fn display_name(&self) -> String {
        match (&self.user_name, self.user_id) {
            (Some(name), _) if !name.is_empty() => name.clone(),
            (_, Some(id)) => format!("user {id}"),
            _ => format!("agent {}", self.agent_id),
        }
    }

    /// Return in percentage points
    pub fn return_percent(&self) -> f64 {
        percent_points(self.return_pct)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub snapshot_date: String,
    pub return_pct: f64,
}

/// Return history of one participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnCurve {
    pub user_name: String,
    #[serde(default)]
    pub curve: Vec<CurvePoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub stock_code: String,
    #[serde(default)]
    pub stock_name: String,
    pub quantity: Decimal,
    pub latest_price: Decimal,
    pub profit_loss_pct: f64,
}

impl Holding {
    pub fn market_value(&self) -> Decimal {
        self.quantity * self.latest_price
    }

    pub fn profit_loss_percent(&self) -> f64 {
        percent_points(self.profit_loss_pct)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Holdings {
    #[serde(default)]
    pub items: Vec<Holding>,
}

impl Holdings {
    pub fn total_market_value(&self) -> Decimal {
        self.items.iter().map(Holding::market_value).sum()
    }
}

/// Current rank of the enrolled agent; `rank` is null while unranked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankInfo {
    #[serde(default)]
    pub rank: Option<u32>,
    pub return_rate: f64,
}

impl RankInfo {
    pub fn return_percent(&self) -> f64 {
        percent_points(self.return_rate)
    }
}

/// Execution log line; unknown fields are kept verbatim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: i64,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Normalized lookup key for agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKey {
    /// Agent owned by a user
    User(i64),
    /// Agent by its own id
    Id(i64),
}

impl fmt::Display for AgentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentKey::User(id) => write!(f, "user:{id}"),
            AgentKey::Id(id) => write!(f, "id:{id}"),
        }
    }
}

/// List responses arrive either bare or wrapped in `{"items": [...]}`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListEnvelope<T> {
    Bare(Vec<T>),
    Wrapped { items: Vec<T> },
}

impl<T> ListEnvelope<T> {
    pub fn into_items(self) -> Vec<T> {
        match self {
            ListEnvelope::Bare(items) | ListEnvelope::Wrapped { items } => items,
        }
    }
}
