//! Data types exchanged with the auth provider and the profiles table.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::AuthError;

/// Authenticated user as reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_confirmed_at: Option<String>,
    #[serde(default)]
    pub user_metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Provider session: an access/refresh token pair plus the signed-in user.
///
/// Only ever held in memory. `Debug` never prints the tokens.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
    /// Unix timestamp (seconds) at which the access token expires.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub user: Option<User>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    /// Fill in `expires_at` from `expires_in` when the provider omitted it.
    pub fn with_expiry_from(mut self, now: chrono::DateTime<chrono::Utc>) -> Self {
        if self.expires_at.is_none() && self.expires_in > 0 {
            self.expires_at = Some(now.timestamp() + self.expires_in);
        }
        self
    }

    /// Whether the access token has expired at `now`.
    pub fn is_expired_at(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now.timestamp())
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("user_id", &self.user_id())
            .finish_non_exhaustive()
    }
}

/// Kind of auth lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuthEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
    /// Any other provider event, e.g. `INITIAL_SESSION`.
    Other(String),
}

impl AuthEventKind {
    /// Provider wire name (`SIGNED_IN`, `SIGNED_OUT`, ...).
    pub fn as_str(&self) -> &str {
        match self {
            AuthEventKind::SignedIn => "SIGNED_IN",
            AuthEventKind::SignedOut => "SIGNED_OUT",
            AuthEventKind::TokenRefreshed => "TOKEN_REFRESHED",
            AuthEventKind::UserUpdated => "USER_UPDATED",
            AuthEventKind::PasswordRecovery => "PASSWORD_RECOVERY",
            AuthEventKind::Other(name) => name,
        }
    }
}

impl From<&str> for AuthEventKind {
    fn from(name: &str) -> Self {
        match name {
            "SIGNED_IN" => AuthEventKind::SignedIn,
            "SIGNED_OUT" => AuthEventKind::SignedOut,
            "TOKEN_REFRESHED" => AuthEventKind::TokenRefreshed,
            "USER_UPDATED" => AuthEventKind::UserUpdated,
            "PASSWORD_RECOVERY" => AuthEventKind::PasswordRecovery,
            other => AuthEventKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for AuthEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event name emitted when a previously obtained session is restored.
pub const INITIAL_SESSION: &str = "INITIAL_SESSION";

/// Auth lifecycle notification with the session snapshot at emission time.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<Session>,
}

impl AuthEvent {
    pub fn new(kind: AuthEventKind, session: Option<Session>) -> Self {
        Self { kind, session }
    }

    pub fn signed_in(session: Session) -> Self {
        Self::new(AuthEventKind::SignedIn, Some(session))
    }

    pub fn signed_out() -> Self {
        Self::new(AuthEventKind::SignedOut, None)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.session.as_ref().and_then(Session::user_id)
    }
}

/// OAuth providers offered on the login page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Github,
    Google,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Github => "github",
            OAuthProvider::Google => "google",
        }
    }
}

impl FromStr for OAuthProvider {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Ok(OAuthProvider::Github),
            "google" => Ok(OAuthProvider::Google),
            other => Err(AuthError::Config(format!(
                "Unsupported OAuth provider: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where to send the browser to start an OAuth sign-in.
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthRedirect {
    pub provider: OAuthProvider,
    pub url: url::Url,
}

/// Raw provider result of a sign-up.
///
/// `session` is absent when the project requires email confirmation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignUpResponse {
    pub user: Option<User>,
    pub session: Option<Session>,
}

/// Result of `SiteAuth::sign_up`.
#[derive(Debug, Clone, PartialEq)]
pub struct SignUpOutcome {
    pub response: SignUpResponse,
    /// Set when the account was created but its profile row could not be
    /// written. The row is expected to appear through a database trigger.
    pub profile_warning: Option<String>,
}

/// Value stored in a profile's `settings` mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<SettingValue>),
    Map(BTreeMap<String, SettingValue>),
}

impl From<serde_json::Value> for SettingValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => SettingValue::Null,
            serde_json::Value::Bool(b) => SettingValue::Bool(b),
            serde_json::Value::Number(n) => SettingValue::Number(n),
            serde_json::Value::String(s) => SettingValue::String(s),
            serde_json::Value::Array(items) => {
                SettingValue::List(items.into_iter().map(SettingValue::from).collect())
            }
            serde_json::Value::Object(map) => SettingValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, SettingValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        SettingValue::String(value.to_string())
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Bool(value)
    }
}

/// Open settings mapping of a profile.
pub type Settings = BTreeMap<String, SettingValue>;

/// Row of the `profiles` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub avatar_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub plan: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub billing_status: String,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub settings: Settings,
    #[serde(default)]
    pub settings_updated_at: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub const DEFAULT_PLAN: &str = "free";
pub const DEFAULT_BILLING_STATUS: &str = "inactive";

/// Row inserted into `profiles` right after sign-up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    pub username: String,
    pub avatar_url: String,
    pub plan: String,
    pub billing_status: String,
    pub settings: Settings,
}

impl NewProfile {
    /// Default profile for a freshly created account.
    ///
    /// The username is the local part of the email address.
    pub fn for_sign_up(user_id: &str, email: &str, name: &str) -> Self {
        let username = email.split('@').next().unwrap_or_default();
        Self {
            id: user_id.to_string(),
            email: email.to_string(),
            name: name.to_string(),
            username: username.to_string(),
            avatar_url: String::new(),
            plan: DEFAULT_PLAN.to_string(),
            billing_status: DEFAULT_BILLING_STATUS.to_string(),
            settings: Settings::new(),
        }
    }
}

/// Partial update of a profile row. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Settings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_updated_at: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self == &ProfileUpdate::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn session() -> Session {
        Session {
            access_token: "secret-access".to_string(),
            refresh_token: "secret-refresh".to_string(),
            token_type: "bearer".to_string(),
            expires_in: 3600,
            expires_at: None,
            user: Some(User {
                id: "user-1".to_string(),
                email: Some("a@x.com".to_string()),
                email_confirmed_at: None,
                user_metadata: BTreeMap::new(),
                created_at: None,
            }),
        }
    }

    #[test]
    fn test_session_debug_hides_tokens() {
        let rendered = format!("{:?}", session());
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
        assert!(rendered.contains("user-1"));
    }

    #[test]
    fn test_session_expiry_from_expires_in() {
        let now = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let session = session().with_expiry_from(now);
        assert_eq!(session.expires_at, Some(now.timestamp() + 3600));
        assert!(!session.is_expired_at(now));
        assert!(session.is_expired_at(now + chrono::Duration::seconds(3600)));
    }

    #[test]
    fn test_event_kind_wire_names() {
        for kind in [
            AuthEventKind::SignedIn,
            AuthEventKind::SignedOut,
            AuthEventKind::TokenRefreshed,
            AuthEventKind::UserUpdated,
            AuthEventKind::PasswordRecovery,
        ] {
            assert_eq!(AuthEventKind::from(kind.as_str()), kind);
        }
        assert_eq!(
            AuthEventKind::from(INITIAL_SESSION),
            AuthEventKind::Other(INITIAL_SESSION.to_string())
        );
    }

    #[test]
    fn test_oauth_provider_parsing() {
        assert_eq!("github".parse::<OAuthProvider>().unwrap(), OAuthProvider::Github);
        assert_eq!("Google".parse::<OAuthProvider>().unwrap(), OAuthProvider::Google);
        assert!("gitlab".parse::<OAuthProvider>().is_err());
    }

    #[test]
    fn test_new_profile_defaults() {
        let profile = NewProfile::for_sign_up("uid-1", "a@x.com", "Alice");
        assert_eq!(
            serde_json::to_value(&profile).unwrap(),
            serde_json::json!({
                "id": "uid-1",
                "email": "a@x.com",
                "name": "Alice",
                "username": "a",
                "avatar_url": "",
                "plan": "free",
                "billing_status": "inactive",
                "settings": {}
            })
        );
    }

    #[test]
    fn test_profile_tolerates_null_columns() {
        let profile: UserProfile = serde_json::from_value(serde_json::json!({
            "id": "uid-1",
            "email": "a@x.com",
            "name": null,
            "avatar_url": null,
            "plan": "pro",
            "settings": null,
            "updated_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(profile.name, "");
        assert_eq!(profile.plan, "pro");
        assert!(profile.settings.is_empty());
        assert_eq!(profile.updated_at.as_deref(), Some("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn test_settings_keep_nested_shapes() {
        let profile: UserProfile = serde_json::from_value(serde_json::json!({
            "id": "uid-1",
            "settings": {
                "theme": "dark",
                "beta": true,
                "seats": 3,
                "ratio": 0.5,
                "tags": ["a", null],
                "notifications": { "email": false }
            }
        }))
        .unwrap();

        let settings = &profile.settings;
        assert_eq!(settings["theme"], SettingValue::from("dark"));
        assert_eq!(settings["beta"], SettingValue::Bool(true));
        assert_eq!(settings["seats"], SettingValue::Number(3.into()));
        assert_eq!(
            settings["tags"],
            SettingValue::List(vec![SettingValue::from("a"), SettingValue::Null])
        );
        match &settings["notifications"] {
            SettingValue::Map(inner) => assert_eq!(inner["email"], SettingValue::Bool(false)),
            other => panic!("expected map, got {:?}", other),
        }

        let back = serde_json::to_value(&profile.settings).unwrap();
        assert_eq!(back["seats"], 3);
        assert_eq!(back["ratio"], 0.5);
    }

    #[test]
    fn test_profile_update_serializes_only_set_fields() {
        let update = ProfileUpdate {
            name: Some("Alice B".to_string()),
            ..Default::default()
        };
        assert!(!update.is_empty());
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            serde_json::json!({ "name": "Alice B" })
        );
        assert!(ProfileUpdate::default().is_empty());
    }
}
