//! Backend paths, relative to the configured base URL

use crate::domain::AgentKey;

/// Log lines requested per poll
pub const LOG_PAGE_SIZE: u32 = 100;

pub fn rank(agent_id: i64) -> String {
    format!("agents/{agent_id}/rank")
}

pub fn holdings(agent_id: i64) -> String {
    format!("agents/{agent_id}/holdings")
}

pub fn logs(agent_id: i64) -> String {
    format!("agents/{agent_id}/logs?limit={LOG_PAGE_SIZE}")
}

pub fn leaderboard(activity_id: i64) -> String {
    format!("activities/{activity_id}/leaderboard")
}

pub fn return_curves(activity_id: i64) -> String {
    format!("activities/{activity_id}/return-curves")
}

pub fn agent(key: &AgentKey) -> String {
    match key {
        AgentKey::User(user_id) => format!("agents/by-user/{user_id}"),
        AgentKey::Id(agent_id) => format!("agents/{agent_id}"),
    }
}
