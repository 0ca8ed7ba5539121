//! Parsing of the URL the provider redirects back to after OAuth or an email link.
//!
//! Tokens arrive in the fragment:
//! `#access_token=..&refresh_token=..&expires_in=3600&token_type=bearer&type=signup`.
//! Failures arrive as `error`/`error_code`/`error_description` in either the
//! fragment or the query string.

use crate::error::{AuthError, AuthResult};
use crate::types::{Session, User};
use std::collections::HashMap;
use url::Url;

/// Status attached to provider errors reported through a redirect.
const REDIRECT_ERROR_STATUS: u16 = 400;

/// Redirect type for password recovery links.
pub const RECOVERY: &str = "recovery";

/// Tokens carried by a successful redirect.
#[derive(Clone, PartialEq)]
pub struct RedirectTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub expires_at: Option<i64>,
    /// `type` parameter (`signup`, `recovery`, `magiclink`, ...).
    pub kind: Option<String>,
}

impl std::fmt::Debug for RedirectTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedirectTokens")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl RedirectTokens {
    pub fn is_recovery(&self) -> bool {
        self.kind.as_deref() == Some(RECOVERY)
    }

    /// Build a session for `user`, computing the expiry from `now`.
    pub fn into_session(self, user: User, now: chrono::DateTime<chrono::Utc>) -> Session {
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type,
            expires_in: self.expires_in,
            expires_at: self.expires_at,
            user: Some(user),
        }
        .with_expiry_from(now)
    }
}

/// Extract session tokens from a redirect URL.
pub fn parse_redirect(url: &Url) -> AuthResult<RedirectTokens> {
    let fragment = parse_pairs(url.fragment().unwrap_or_default());
    let query: HashMap<String, String> = url.query_pairs().into_owned().collect();

    for params in [&fragment, &query] {
        if let Some(err) = redirect_error(params) {
            return Err(err);
        }
    }

    let access_token = required(&fragment, "access_token")?;
    let refresh_token = required(&fragment, "refresh_token")?;

    let expires_in = match fragment.get("expires_in") {
        Some(raw) => raw
            .parse()
            .map_err(|_| AuthError::InvalidRedirect(format!("bad expires_in: {}", raw)))?,
        None => 0,
    };
    let expires_at = match fragment.get("expires_at") {
        Some(raw) => Some(
            raw.parse()
                .map_err(|_| AuthError::InvalidRedirect(format!("bad expires_at: {}", raw)))?,
        ),
        None => None,
    };

    Ok(RedirectTokens {
        access_token,
        refresh_token,
        token_type: fragment
            .get("token_type")
            .cloned()
            .unwrap_or_else(|| "bearer".to_string()),
        expires_in,
        expires_at,
        kind: fragment.get("type").cloned(),
    })
}

fn parse_pairs(raw: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect()
}

fn required(params: &HashMap<String, String>, key: &str) -> AuthResult<String> {
    params
        .get(key)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| AuthError::InvalidRedirect(format!("missing {}", key)))
}

fn redirect_error(params: &HashMap<String, String>) -> Option<AuthError> {
    let error = params.get("error")?;
    let code = params
        .get("error_code")
        .cloned()
        .or_else(|| Some(error.clone()));
    let message = params
        .get("error_description")
        .cloned()
        .unwrap_or_else(|| error.clone());
    Some(AuthError::provider(REDIRECT_ERROR_STATUS, code, message))
}
