//! Agentboard CLI
//!
//! Commands:
//! - `agentboard watch` - live dashboard driven by the poll drivers
//! - `agentboard leaderboard` - one-shot leaderboard of an activity
//! - `agentboard holdings` - one-shot holdings of an agent
//! - `agentboard curve` - merged return curves of an activity
//! - `agentboard agent` - agent profile lookup

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

pub use output::OutputMode;

/// Trading-agent dashboard client
#[derive(Parser, Debug)]
#[command(name = "agentboard")]
#[command(version)]
#[command(about = "Polling dashboard for trading-agent competitions", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration directory (default.toml, <env>.toml)
    #[arg(short, long, default_value = "config", global = true)]
    pub config: String,

    /// Override the API base URL
    #[arg(long, env = "AGENTBOARD_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Poll every feed and print updates until interrupted
    Watch {
        /// Enrolled agent id (enables rank, holdings, logs)
        #[arg(long)]
        agent: Option<i64>,
        /// Activity id (enables leaderboard, return curve)
        #[arg(long)]
        activity: Option<i64>,
    },
    /// Show the leaderboard of an activity
    Leaderboard {
        #[arg(long)]
        activity: i64,
    },
    /// Show an agent's holdings
    Holdings {
        #[arg(long)]
        agent: i64,
    },
    /// Show the merged return curves of an activity
    Curve {
        #[arg(long)]
        activity: i64,
        /// Only print the most recent rows
        #[arg(long)]
        tail: Option<usize>,
    },
    /// Look up an agent
    Agent {
        /// Agent id, or user id with --by-user
        id: i64,
        #[arg(long)]
        by_user: bool,
    },
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        OutputMode::from_json_flag(self.json)
    }
}
