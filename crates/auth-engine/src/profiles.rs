//! PostgREST access to the `profiles` table.

use crate::error::{AuthError, AuthResult, PGRST_NO_ROWS};
use crate::types::{NewProfile, ProfileUpdate, UserProfile};
use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

const PROFILES_TABLE: &str = "profiles";
/// Accept header asking PostgREST for exactly one row as a JSON object.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Reads and writes profile rows keyed by user id.
///
/// `access_token` is the caller's session token; `None` falls back to the
/// anonymous key.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Returns `Ok(None)` when no row exists.
    async fn select_profile(
        &self,
        user_id: &str,
        access_token: Option<&str>,
    ) -> AuthResult<Option<UserProfile>>;

    async fn insert_profile(
        &self,
        profile: &NewProfile,
        access_token: Option<&str>,
    ) -> AuthResult<()>;

    /// Fails with `AuthError::ProfileNotFound` when no row exists.
    async fn update_profile(
        &self,
        user_id: &str,
        update: &ProfileUpdate,
        access_token: Option<&str>,
    ) -> AuthResult<UserProfile>;
}

/// reqwest-backed PostgREST profile store.
#[derive(Clone)]
pub struct PostgrestProfiles {
    http_client: reqwest::Client,
    base_url: Url,
    anon_key: String,
}

impl PostgrestProfiles {
    pub fn new(base_url: Url, anon_key: impl Into<String>) -> Self {
        Self::with_http_client(reqwest::Client::new(), base_url, anon_key)
    }

    pub fn with_http_client(
        http_client: reqwest::Client,
        base_url: Url,
        anon_key: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            base_url,
            anon_key: anon_key.into(),
        }
    }

    /// `{base}/rest/v1/profiles`, optionally filtered to one id.
    fn table_url(&self, user_id: Option<&str>) -> AuthResult<Url> {
        profiles_url(&self.base_url, user_id)
    }

    fn authorized(
        &self,
        request: reqwest::RequestBuilder,
        access_token: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let bearer = access_token.unwrap_or(&self.anon_key);
        request
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", bearer))
    }
}

#[async_trait]
impl ProfileStore for PostgrestProfiles {
    async fn select_profile(
        &self,
        user_id: &str,
        access_token: Option<&str>,
    ) -> AuthResult<Option<UserProfile>> {
        let mut url = self.table_url(Some(user_id))?;
        url.query_pairs_mut().append_pair("select", "*");

        debug!(user_id = %user_id, "Fetching profile");

        let request = self
            .http_client
            .get(url)
            .header("Accept", SINGLE_OBJECT);
        let response = self.authorized(request, access_token).send().await?;

        match check_status(response, "Profile fetch").await {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(err) if is_no_rows(&err) => {
                debug!(user_id = %user_id, "No profile row");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn insert_profile(
        &self,
        profile: &NewProfile,
        access_token: Option<&str>,
    ) -> AuthResult<()> {
        let url = self.table_url(None)?;

        let request = self
            .http_client
            .post(url)
            .header("Content-Type", "application/json")
            .header("Prefer", "return=minimal")
            .json(profile);
        let response = self.authorized(request, access_token).send().await?;
        check_status(response, "Profile insert").await?;

        debug!(user_id = %profile.id, "Inserted profile");
        Ok(())
    }

    async fn update_profile(
        &self,
        user_id: &str,
        update: &ProfileUpdate,
        access_token: Option<&str>,
    ) -> AuthResult<UserProfile> {
        if update.is_empty() {
            return self
                .select_profile(user_id, access_token)
                .await?
                .ok_or(AuthError::ProfileNotFound);
        }

        let url = self.table_url(Some(user_id))?;

        let request = self
            .http_client
            .patch(url)
            .header("Content-Type", "application/json")
            .header("Accept", SINGLE_OBJECT)
            .header("Prefer", "return=representation")
            .json(update);
        let response = self.authorized(request, access_token).send().await?;

        match check_status(response, "Profile update").await {
            Ok(response) => {
                let profile: UserProfile = response.json().await?;
                debug!(user_id = %user_id, "Updated profile");
                Ok(profile)
            }
            Err(err) if is_no_rows(&err) => Err(AuthError::ProfileNotFound),
            Err(err) => Err(err),
        }
    }
}

pub(crate) fn profiles_url(base: &Url, user_id: Option<&str>) -> AuthResult<Url> {
    let mut url = Url::parse(&format!(
        "{}/rest/v1/{}",
        base.as_str().trim_end_matches('/'),
        PROFILES_TABLE
    ))?;
    if let Some(id) = user_id {
        url.query_pairs_mut().append_pair("id", &format!("eq.{}", id));
    }
    Ok(url)
}

fn is_no_rows(err: &AuthError) -> bool {
    matches!(err, AuthError::Store { code: Some(code), .. } if code == PGRST_NO_ROWS)
}

async fn check_status(response: reqwest::Response, what: &str) -> AuthResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let err = parse_store_error(status.as_u16(), &body);
    if !is_no_rows(&err) {
        warn!(status = %status, code = ?err.code(), "{} failed: {}", what, err);
    }
    Err(err)
}

/// PostgREST errors look like `{code, message, details, hint}`.
pub(crate) fn parse_store_error(status: u16, body: &str) -> AuthError {
    let value: serde_json::Value = serde_json::from_str(body).unwrap_or_default();
    let text = |key: &str| {
        value
            .get(key)
            .and_then(serde_json::Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let message = text("message").unwrap_or_else(|| {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            format!("HTTP {}", status)
        } else {
            trimmed.to_string()
        }
    });

    AuthError::Store {
        status,
        code: text("code"),
        message,
    }
}
