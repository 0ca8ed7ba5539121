//! GoTrue (Supabase Auth) REST transport.

use crate::error::{AuthError, AuthResult};
use crate::types::{OAuthProvider, Session, SignUpResponse, User};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

/// Parameters for creating an account.
#[derive(Debug, Clone)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    /// Stored as `full_name` in the user metadata.
    pub full_name: String,
    /// Where the confirmation email link lands.
    pub email_redirect_to: String,
}

/// Calls the identity provider exposes.
///
/// Implemented by [`GoTrueClient`] and by test doubles.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_up(&self, request: &SignUpRequest) -> AuthResult<SignUpResponse>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session>;

    /// URL that starts the OAuth flow in a browser. No request is made.
    fn authorize_url(&self, provider: OAuthProvider, redirect_to: &str) -> AuthResult<Url>;

    async fn sign_out(&self, access_token: &str) -> AuthResult<()>;

    async fn get_user(&self, access_token: &str) -> AuthResult<User>;

    async fn refresh_session(&self, refresh_token: &str) -> AuthResult<Session>;

    /// Exchange an email confirmation token hash for a session.
    async fn verify_email(&self, token_hash: &str) -> AuthResult<Session>;

    /// Send the sign-up confirmation email again.
    async fn resend_signup(&self, email: &str, redirect_to: &str) -> AuthResult<()>;
}

#[derive(Serialize)]
struct SignUpBody<'a> {
    email: &'a str,
    password: &'a str,
    data: SignUpMetadata<'a>,
}

#[derive(Serialize)]
struct SignUpMetadata<'a> {
    full_name: &'a str,
}

#[derive(Serialize)]
struct PasswordGrantBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrantBody<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct VerifyBody<'a> {
    token_hash: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Serialize)]
struct ResendBody<'a> {
    email: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
}

/// reqwest-backed GoTrue client.
#[derive(Clone)]
pub struct GoTrueClient {
    http_client: reqwest::Client,
    base_url: Url,
    anon_key: String,
}

impl GoTrueClient {
    /// Create a client for the project at `base_url` (e.g. `https://abc.supabase.co`).
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

    /// Build `{base}/auth/v1/{path}`.
    fn endpoint(&self, path: &str) -> AuthResult<Url> {
        auth_endpoint(&self.base_url, path)
    }

    fn post(&self, url: Url) -> reqwest::RequestBuilder {
        self.http_client
            .post(url)
            .header("apikey", &self.anon_key)
            .header("Content-Type", "application/json")
    }

    async fn read_session(&self, response: reqwest::Response, what: &str) -> AuthResult<Session> {
        let response = check_status(response, what).await?;
        let session: Session = response.json().await?;
        Ok(session.with_expiry_from(chrono::Utc::now()))
    }
}

#[async_trait]
impl AuthProvider for GoTrueClient {
    async fn sign_up(&self, request: &SignUpRequest) -> AuthResult<SignUpResponse> {
        let mut url = self.endpoint("signup")?;
        url.query_pairs_mut()
            .append_pair("redirect_to", &request.email_redirect_to);

        debug!(email = %request.email, "Signing up");

        let response = self
            .post(url)
            .json(&SignUpBody {
                email: &request.email,
                password: &request.password,
                data: SignUpMetadata {
                    full_name: &request.full_name,
                },
            })
            .send()
            .await?;
        let response = check_status(response, "Sign-up").await?;
        let body: serde_json::Value = response.json().await?;
        parse_sign_up_response(body)
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session> {
        let mut url = self.endpoint("token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        debug!(email = %email, "Attempting email/password sign-in");

        let response = self
            .post(url)
            .json(&PasswordGrantBody { email, password })
            .send()
            .await?;
        self.read_session(response, "Sign-in").await
    }

    fn authorize_url(&self, provider: OAuthProvider, redirect_to: &str) -> AuthResult<Url> {
        let mut url = self.endpoint("authorize")?;
        url.query_pairs_mut()
            .append_pair("provider", provider.as_str())
            .append_pair("redirect_to", redirect_to);
        Ok(url)
    }

    async fn sign_out(&self, access_token: &str) -> AuthResult<()> {
        let mut url = self.endpoint("logout")?;
        url.query_pairs_mut().append_pair("scope", "global");

        let response = self
            .post(url)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;
        check_status(response, "Sign-out").await?;
        Ok(())
    }

    async fn get_user(&self, access_token: &str) -> AuthResult<User> {
        let url = self.endpoint("user")?;

        let response = self
            .http_client
            .get(url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;
        let response = check_status(response, "User lookup").await?;
        let user: User = response.json().await?;
        debug!(user_id = %user.id, "Fetched user");
        Ok(user)
    }

    async fn refresh_session(&self, refresh_token: &str) -> AuthResult<Session> {
        let mut url = self.endpoint("token")?;
        url.query_pairs_mut()
            .append_pair("grant_type", "refresh_token");

        debug!("Refreshing token");

        let response = self
            .post(url)
            .json(&RefreshGrantBody { refresh_token })
            .send()
            .await?;
        self.read_session(response, "Token refresh").await
    }

    async fn verify_email(&self, token_hash: &str) -> AuthResult<Session> {
        let url = self.endpoint("verify")?;

        let response = self
            .post(url)
            .json(&VerifyBody {
                token_hash,
                kind: "email",
            })
            .send()
            .await?;
        self.read_session(response, "Email verification").await
    }

    async fn resend_signup(&self, email: &str, redirect_to: &str) -> AuthResult<()> {
        let mut url = self.endpoint("resend")?;
        url.query_pairs_mut().append_pair("redirect_to", redirect_to);

        let response = self
            .post(url)
            .json(&ResendBody {
                email,
                kind: "signup",
            })
            .send()
            .await?;
        check_status(response, "Resend confirmation").await?;
        Ok(())
    }
}

/// Build `{base}/auth/v1/{path}` regardless of a trailing slash on `base`.
pub(crate) fn auth_endpoint(base: &Url, path: &str) -> AuthResult<Url> {
    let url = format!("{}/auth/v1/{}", base.as_str().trim_end_matches('/'), path);
    Ok(Url::parse(&url)?)
}

/// Turn a non-success response into `AuthError::Provider`.
async fn check_status(response: reqwest::Response, what: &str) -> AuthResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let err = parse_error_body(status.as_u16(), &body);
    warn!(status = %status, code = ?err.code(), "{} rejected: {}", what, err);
    Err(err)
}

/// Extract the provider's error message and code from a response body.
///
/// GoTrue answers with either `{code, error_code, msg}` or the OAuth-style
/// `{error, error_description}`.
pub(crate) fn parse_error_body(status: u16, body: &str) -> AuthError {
    let fallback = || AuthError::provider(status, None, format!("HTTP {}", status));

    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) if body.trim().is_empty() => return fallback(),
        Err(_) => return AuthError::provider(status, None, body.trim()),
    };

    let text = |key: &str| {
        value
            .get(key)
            .and_then(serde_json::Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let message = text("msg")
        .or_else(|| text("message"))
        .or_else(|| text("error_description"))
        .or_else(|| text("error"));
    let code = text("error_code").or_else(|| text("code")).or_else(|| {
        // `error` doubles as the code when a description is present.
        text("error_description").and_then(|_| text("error"))
    });

    match message {
        Some(message) => AuthError::provider(status, code, message),
        None => fallback(),
    }
}

/// Sign-up returns a full session when confirmation is disabled, otherwise
/// just the created user.
pub(crate) fn parse_sign_up_response(body: serde_json::Value) -> AuthResult<SignUpResponse> {
    if body.get("access_token").is_some() {
        let session: Session = serde_json::from_value(body)?;
        let session = session.with_expiry_from(chrono::Utc::now());
        return Ok(SignUpResponse {
            user: session.user.clone(),
            session: Some(session),
        });
    }

    if let Some(user) = body.get("user").filter(|u| !u.is_null()) {
        let user: User = serde_json::from_value(user.clone())?;
        return Ok(SignUpResponse {
            user: Some(user),
            session: None,
        });
    }

    if body.get("id").is_some() {
        let user: User = serde_json::from_value(body)?;
        return Ok(SignUpResponse {
            user: Some(user),
            session: None,
        });
    }

    Ok(SignUpResponse::default())
}
