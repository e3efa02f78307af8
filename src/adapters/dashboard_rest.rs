//! Dashboard REST adapter.
//!
//! Cancellable request layer over reqwest. Bodies are returned as JSON when
//! they parse as JSON and as raw text otherwise; non-2xx responses become
//! `AgentboardError::Http` carrying the status and the backend's message.
//! A 401 additionally fires the session hook before the error is returned.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use super::endpoints;
use super::traits::DashboardApi;
use crate::config::ApiConfig;
use crate::domain::{
    AgentKey, AgentProfile, Holdings, LeaderboardItem, ListEnvelope, LogEntry, RankInfo,
    ReturnCurve,
};
use crate::error::{AgentboardError, Result};

const MAX_ERROR_TEXT: usize = 200;

/// Reaction to an expired session (clear credentials, redirect to login, ...)
pub trait SessionHook: Send + Sync {
    fn session_expired(&self);
}

/// Default hook: only logs
#[derive(Debug, Default)]
pub struct LogSessionHook;

impl SessionHook for LogSessionHook {
    fn session_expired(&self) {
        warn!("session expired (401), re-authentication required");
    }
}

/// Parsed response body
#[derive(Debug, Clone, PartialEq)]
pub enum ApiBody {
    Json(Value),
    Text(String),
}

impl ApiBody {
    fn parse(raw: String) -> Self {
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => ApiBody::Json(value),
            Err(_) => ApiBody::Text(raw),
        }
    }

    /// Decode a JSON body into `T`.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            ApiBody::Json(value) => Ok(serde_json::from_value(value)?),
            ApiBody::Text(text) => Err(AgentboardError::Validation(format!(
                "expected JSON body, got text: {}",
                truncate(&text)
            ))),
        }
    }

    /// Message to attach to an HTTP error
    fn error_message(&self) -> Option<String> {
        match self {
            ApiBody::Json(Value::Object(map)) => ["detail", "message", "error"]
                .iter()
                .find_map(|field| map.get(*field).and_then(Value::as_str))
                .map(str::to_string),
            ApiBody::Json(_) => None,
            ApiBody::Text(text) if text.trim().is_empty() => None,
            ApiBody::Text(text) => Some(truncate(text.trim())),
        }
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_ERROR_TEXT {
        text.to_string()
    } else {
        let head: String = text.chars().take(MAX_ERROR_TEXT).collect();
        format!("{head}...")
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    session_hook: Arc<dyn SessionHook>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        // Url::join drops the last path segment unless the base ends with '/'
        let mut base = config.base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base)?;

        let mut headers = HeaderMap::new();
        if let Some(cookie) = &config.session_cookie {
            let value = HeaderValue::from_str(cookie).map_err(|e| {
                AgentboardError::Validation(format!("invalid session cookie: {e}"))
            })?;
            headers.insert(COOKIE, value);
        }

        let http = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AgentboardError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            session_hook: Arc::new(LogSessionHook),
        })
    }

    pub fn with_session_hook(mut self, hook: Arc<dyn SessionHook>) -> Self {
        self.session_hook = hook;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a relative endpoint path against the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// Issue one request; returns `Cancelled` as soon as `token` fires.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        token: &CancellationToken,
    ) -> Result<ApiBody> {
        let url = self.endpoint(path)?;
        debug!(%method, %url, "api request");

        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let text = response.text().await?;
            Ok::<_, AgentboardError>((status, text))
        };

        let (status, text) = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(AgentboardError::Cancelled),
            result = exchange => result?,
        };

        let body = ApiBody::parse(text);
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                self.session_hook.session_expired();
            }
            return Err(AgentboardError::Http {
                status: status.as_u16(),
                message: body.error_message(),
            });
        }
        Ok(body)
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        token: &CancellationToken,
    ) -> Result<T> {
        self.request(Method::GET, path, None, token)
            .await?
            .into_json()
    }

    async fn get_list<T: DeserializeOwned>(
        &self,
        path: &str,
        token: &CancellationToken,
    ) -> Result<Vec<T>> {
        let envelope: ListEnvelope<T> = self.get_json(path, token).await?;
        Ok(envelope.into_items())
    }
}

#[async_trait]
impl DashboardApi for ApiClient {
    async fn rank(&self, agent_id: i64, token: CancellationToken) -> Result<RankInfo> {
        self.get_json(&endpoints::rank(agent_id), &token).await
    }

    async fn leaderboard(
        &self,
        activity_id: i64,
        token: CancellationToken,
    ) -> Result<Vec<LeaderboardItem>> {
        self.get_list(&endpoints::leaderboard(activity_id), &token).await
    }

    async fn return_curves(
        &self,
        activity_id: i64,
        token: CancellationToken,
    ) -> Result<Vec<ReturnCurve>> {
        self.get_list(&endpoints::return_curves(activity_id), &token)
            .await
    }

    async fn holdings(&self, agent_id: i64, token: CancellationToken) -> Result<Holdings> {
        self.get_json(&endpoints::holdings(agent_id), &token).await
    }

    async fn logs(&self, agent_id: i64, token: CancellationToken) -> Result<Vec<LogEntry>> {
        self.get_list(&endpoints::logs(agent_id), &token).await
    }

    async fn agent(&self, key: AgentKey, token: CancellationToken) -> Result<AgentProfile> {
        self.get_json(&endpoints::agent(&key), &token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(base_url: &str) -> ApiClient {
        ApiClient::new(&ApiConfig {
            base_url: base_url.to_string(),
            ..ApiConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let api = client("http://localhost:8000/api");
        assert_eq!(
            api.endpoint("agents/7/rank").unwrap().as_str(),
            "http://localhost:8000/api/agents/7/rank"
        );
        let api = client("http://localhost:8000/api/");
        assert_eq!(
            api.endpoint("/agents/7/logs?limit=100").unwrap().as_str(),
            "http://localhost:8000/api/agents/7/logs?limit=100"
        );
    }

    #[test]
    fn test_body_parsing() {
        assert_eq!(
            ApiBody::parse(r#"{"rank": 1}"#.to_string()),
            ApiBody::Json(json!({"rank": 1}))
        );
        assert_eq!(
            ApiBody::parse("plain text".to_string()),
            ApiBody::Text("plain text".to_string())
        );
    }

    #[test]
    fn test_error_message_extraction() {
        let detail = ApiBody::Json(json!({"detail": "not enrolled"}));
        assert_eq!(detail.error_message().as_deref(), Some("not enrolled"));

        let message = ApiBody::Json(json!({"code": 3, "message": "bad id"}));
        assert_eq!(message.error_message().as_deref(), Some("bad id"));

        assert_eq!(ApiBody::Json(json!([1, 2])).error_message(), None);
        assert_eq!(ApiBody::Text("  ".into()).error_message(), None);

        let long = ApiBody::Text("x".repeat(500));
        assert_eq!(long.error_message().unwrap().len(), MAX_ERROR_TEXT + 3);
    }

    #[test]
    fn test_text_body_is_not_json() {
        let err = ApiBody::Text("<html>".into())
            .into_json::<RankInfo>()
            .unwrap_err();
        assert!(matches!(err, AgentboardError::Validation(_)));
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        // nothing listens on this port; cancellation wins before any I/O
        let api = client("http://127.0.0.1:9");
        let token = CancellationToken::new();
        token.cancel();
        let err = api.rank(1, token).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
