use std::sync::Arc;

use thiserror::Error;

/// Main error type for the dashboard client
#[derive(Error, Debug)]
pub enum AgentboardError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP {status}: {}", message.as_deref().unwrap_or("request failed"))]
    Http {
        status: u16,
        message: Option<String>,
    },

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Poll attempt outcomes
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Attempt timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A failure observed by several collapsed callers of one in-flight load
    #[error("{0}")]
    Shared(Arc<AgentboardError>),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AgentboardError {
    /// True when the failure was caused by a cancelled token.
    pub fn is_cancelled(&self) -> bool {
        match self {
            AgentboardError::Cancelled => true,
            AgentboardError::Shared(inner) => inner.is_cancelled(),
            _ => false,
        }
    }

    /// True for a 401 response.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            AgentboardError::Http { status, .. } => Some(*status),
            AgentboardError::Transport(e) => e.status().map(|s| s.as_u16()),
            AgentboardError::Shared(inner) => inner.status(),
            _ => None,
        }
    }
}

/// Result type alias for AgentboardError
pub type Result<T> = std::result::Result<T, AgentboardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_display() {
        let err = AgentboardError::Http {
            status: 503,
            message: Some("maintenance".to_string()),
        };
        assert_eq!(err.to_string(), "HTTP 503: maintenance");

        let err = AgentboardError::Http {
            status: 500,
            message: None,
        };
        assert_eq!(err.to_string(), "HTTP 500: request failed");
    }

    #[test]
    fn test_shared_error_classification() {
        let unauthorized = AgentboardError::Shared(Arc::new(AgentboardError::Http {
            status: 401,
            message: None,
        }));
        assert!(unauthorized.is_unauthorized());
        assert!(!unauthorized.is_cancelled());

        let cancelled = AgentboardError::Shared(Arc::new(AgentboardError::Cancelled));
        assert!(cancelled.is_cancelled());
        assert_eq!(cancelled.status(), None);
    }
}
