use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub chart: ChartConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Backend base URL (e.g., "http://localhost:8000/api")
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Session cookie value forwarded as `Cookie` header
    #[serde(default)]
    pub session_cookie: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_user_agent() -> String {
    "agentboard/0.1".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            session_cookie: None,
        }
    }
}

/// Polling cadences per feed, all in milliseconds
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_rank_interval")]
    pub rank_interval_ms: u64,
    #[serde(default = "default_slow_interval")]
    pub leaderboard_interval_ms: u64,
    #[serde(default = "default_slow_interval")]
    pub return_curve_interval_ms: u64,
    #[serde(default = "default_holdings_interval")]
    pub holdings_interval_ms: u64,
    #[serde(default = "default_slow_interval")]
    pub logs_interval_ms: u64,
    /// Per-attempt deadline (0 = no deadline)
    #[serde(default = "default_attempt_deadline")]
    pub attempt_deadline_ms: u64,
}

fn default_rank_interval() -> u64 {
    60_000
}

fn default_holdings_interval() -> u64 {
    60_000
}

fn default_slow_interval() -> u64 {
    300_000 // 5 minutes
}

fn default_attempt_deadline() -> u64 {
    30_000
}

impl PollingConfig {
    pub fn attempt_deadline(&self) -> Option<Duration> {
        (self.attempt_deadline_ms > 0).then(|| Duration::from_millis(self.attempt_deadline_ms))
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            rank_interval_ms: default_rank_interval(),
            leaderboard_interval_ms: default_slow_interval(),
            return_curve_interval_ms: default_slow_interval(),
            holdings_interval_ms: default_holdings_interval(),
            logs_interval_ms: default_slow_interval(),
            attempt_deadline_ms: default_attempt_deadline(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// TTL for agent lookups
    #[serde(default = "default_agent_ttl")]
    pub agent_ttl_ms: u64,
}

fn default_agent_ttl() -> u64 {
    5_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            agent_ttl_ms: default_agent_ttl(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartConfig {
    /// Bucket granularity for the merged return curve
    #[serde(default = "default_bucket_ms")]
    pub bucket_ms: i64,
    /// Maximum number of buckets kept (most recent)
    #[serde(default = "default_cap")]
    pub cap: usize,
}

fn default_bucket_ms() -> i64 {
    86_400_000 // 1 day
}

fn default_cap() -> usize {
    500
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            bucket_ms: default_bucket_ms(),
            cap: default_cap(),
        }
    }
}

/// Identity of the session being watched
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SessionConfig {
    /// Enrolled agent id (enables rank, holdings and logs)
    #[serde(default)]
    pub agent_id: Option<i64>,
    /// Activity id (enables leaderboard and return curve)
    #[serde(default)]
    pub activity_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(
                File::from(config_dir.join(
                    std::env::var("AGENTBOARD_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // AGENTBOARD_API__BASE_URL, AGENTBOARD_POLLING__RANK_INTERVAL_MS, ...
            .add_source(
                Environment::with_prefix("AGENTBOARD")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the polling core cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("polling.rank_interval_ms", self.polling.rank_interval_ms),
            ("polling.leaderboard_interval_ms", self.polling.leaderboard_interval_ms),
            ("polling.return_curve_interval_ms", self.polling.return_curve_interval_ms),
            ("polling.holdings_interval_ms", self.polling.holdings_interval_ms),
            ("polling.logs_interval_ms", self.polling.logs_interval_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ConfigError::Message(format!("{name} must be > 0")));
            }
        }
        if self.chart.bucket_ms <= 0 {
            return Err(ConfigError::Message("chart.bucket_ms must be > 0".into()));
        }
        if self.chart.cap == 0 {
            return Err(ConfigError::Message("chart.cap must be > 0".into()));
        }
        url::Url::parse(&self.api.base_url)
            .map_err(|e| ConfigError::Message(format!("api.base_url is invalid: {e}")))?;
        Ok(())
    }
}
