//! Authentication error types.

use thiserror::Error;

/// PostgREST code for "JSON object requested, multiple (or no) rows returned".
pub const PGRST_NO_ROWS: &str = "PGRST116";

/// Authentication and profile error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The auth provider rejected the request (bad credentials, duplicate
    /// email, weak password, rate limit, expired token).
    #[error("{message}")]
    Provider {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// No profile row exists for the requested user.
    #[error("Profile not found")]
    ProfileNotFound,

    /// The data store rejected a profile read or write.
    #[error("Data store error: {status} - {message}")]
    Store {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// No session is held by the client.
    #[error("Not logged in")]
    NotLoggedIn,

    /// A redirect URL did not carry a session.
    #[error("Invalid redirect: {0}")]
    InvalidRedirect(String),

    /// Invalid state transition in the client auth FSM
    #[error("Invalid auth state transition: {0}")]
    InvalidStateTransition(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl AuthError {
    /// Build a provider rejection.
    pub fn provider(status: u16, code: Option<String>, message: impl Into<String>) -> Self {
        AuthError::Provider {
            status,
            code,
            message: message.into(),
        }
    }

    /// Returns true if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                e.status().is_some_and(|s| s.is_server_error())
            }
            AuthError::Provider { status, .. } | AuthError::Store { status, .. } => {
                *status == 429 || *status >= 500
            }
            _ => false,
        }
    }

    /// Machine-readable error code reported by the backend, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            AuthError::Provider { code, .. } | AuthError::Store { code, .. } => code.as_deref(),
            AuthError::ProfileNotFound => Some(PGRST_NO_ROWS),
            _ => None,
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
