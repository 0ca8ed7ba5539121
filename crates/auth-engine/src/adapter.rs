//! Application-facing auth client.
//!
//! [`SiteAuth`] wraps the identity provider and the profiles table, holds the
//! current session in memory and emits an [`AuthEvent`] on the bus after
//! every session change. It never navigates; that is left to whoever
//! listens on the bus.

use crate::client_fsm::{ClientAuthState, ClientMachine, ClientMachineInput};
use crate::error::{AuthError, AuthResult};
use crate::events::AuthEventBus;
use crate::gotrue::{AuthProvider, GoTrueClient, SignUpRequest};
use crate::profiles::{PostgrestProfiles, ProfileStore};
use crate::redirect::parse_redirect;
use crate::types::{
    AuthEvent, AuthEventKind, NewProfile, OAuthProvider, OAuthRedirect, ProfileUpdate, Session,
    SignUpOutcome, User, UserProfile, INITIAL_SESSION,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Path the OAuth flow returns to.
pub const OAUTH_REDIRECT_PATH: &str = "/dashboard";
/// Path confirmation emails link to.
pub const EMAIL_REDIRECT_PATH: &str = "/confirm";

/// Auth client used by the site.
pub struct SiteAuth {
    provider: Arc<dyn AuthProvider>,
    profiles: Arc<dyn ProfileStore>,
    bus: AuthEventBus,
    site_origin: String,
    session: Mutex<Option<Session>>,
    fsm: Mutex<ClientMachine>,
}

impl SiteAuth {
    /// `site_origin` is the site's scheme and host (e.g. `https://example.com`)
    /// used to build redirect targets.
    pub fn new(
        provider: Arc<dyn AuthProvider>,
        profiles: Arc<dyn ProfileStore>,
        bus: AuthEventBus,
        site_origin: impl Into<String>,
    ) -> Self {
        let site_origin = site_origin.into().trim_end_matches('/').to_string();
        Self {
            provider,
            profiles,
            bus,
            site_origin,
            session: Mutex::new(None),
            fsm: Mutex::new(ClientMachine::new()),
        }
    }

    /// Client backed by the project's GoTrue and PostgREST endpoints.
    pub fn connect(
        supabase_url: Url,
        anon_key: &str,
        site_origin: impl Into<String>,
        bus: AuthEventBus,
    ) -> Self {
        let http_client = reqwest::Client::new();
        let provider = GoTrueClient::with_http_client(
            http_client.clone(),
            supabase_url.clone(),
            anon_key,
        );
        let profiles = PostgrestProfiles::with_http_client(http_client, supabase_url, anon_key);
        Self::new(Arc::new(provider), Arc::new(profiles), bus, site_origin)
    }

    /// Raw provider client.
    pub fn client(&self) -> Arc<dyn AuthProvider> {
        Arc::clone(&self.provider)
    }

    /// Raw profile store.
    pub fn profiles(&self) -> Arc<dyn ProfileStore> {
        Arc::clone(&self.profiles)
    }

    pub fn bus(&self) -> &AuthEventBus {
        &self.bus
    }

    pub fn site_origin(&self) -> &str {
        &self.site_origin
    }

    pub fn state(&self) -> ClientAuthState {
        ClientAuthState::from(self.fsm.lock().state())
    }

    /// Snapshot of the current session.
    pub fn session(&self) -> Option<Session> {
        self.session.lock().clone()
    }

    fn redirect_url(&self, path: &str) -> String {
        format!("{}{}", self.site_origin, path)
    }

    fn access_token(&self) -> Option<String> {
        self.session.lock().as_ref().map(|s| s.access_token.clone())
    }

    fn require_access_token(&self) -> AuthResult<String> {
        self.access_token().ok_or(AuthError::NotLoggedIn)
    }

    /// Apply an input that starts an operation. Fails when the current state
    /// does not allow it.
    fn transition(&self, input: &ClientMachineInput) -> AuthResult<ClientAuthState> {
        let mut fsm = self.fsm.lock();
        let old_state = ClientAuthState::from(fsm.state());

        fsm.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;

        let new_state = ClientAuthState::from(fsm.state());
        drop(fsm);

        if old_state != new_state {
            debug!(
                old_state = ?old_state,
                new_state = ?new_state,
                "Client auth state transition"
            );
        }
        Ok(new_state)
    }

    /// Apply an input that completes an operation. A concurrent operation may
    /// already have moved the machine on, so rejection is only logged.
    fn settle(&self, input: &ClientMachineInput) {
        if let Err(e) = self.transition(input) {
            debug!(error = %e, "Ignoring stale auth state transition");
        }
    }

    fn store_session(&self, session: Session) {
        *self.session.lock() = Some(session);
    }

    fn emit(&self, kind: AuthEventKind, session: Option<Session>) {
        self.bus.emit(AuthEvent::new(kind, session));
    }

    /// Create an account and its profile row.
    ///
    /// A failed profile insert does not fail the sign-up: it is logged and
    /// reported in [`SignUpOutcome::profile_warning`].
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> AuthResult<SignUpOutcome> {
        let request = SignUpRequest {
            email: email.to_string(),
            password: password.to_string(),
            full_name: display_name.to_string(),
            email_redirect_to: self.redirect_url(EMAIL_REDIRECT_PATH),
        };
        let response = self.provider.sign_up(&request).await?;

        let mut profile_warning = None;
        if let Some(user) = &response.user {
            let profile = NewProfile::for_sign_up(&user.id, email, display_name);
            let token = response.session.as_ref().map(|s| s.access_token.as_str());
            if let Err(e) = self.profiles.insert_profile(&profile, token).await {
                warn!(
                    user_id = %user.id,
                    error = %e,
                    "Profile insert after sign-up failed"
                );
                profile_warning = Some(e.to_string());
            }
        }

        match &response.session {
            Some(session) => {
                self.store_session(session.clone());
                self.settle(&ClientMachineInput::SessionEstablished);
                info!(user_id = ?session.user_id(), "Signed up and signed in");
                self.emit(AuthEventKind::SignedIn, Some(session.clone()));
            }
            None => {
                info!(
                    user_id = ?response.user.as_ref().map(|u| u.id.as_str()),
                    "Signed up, awaiting email confirmation"
                );
            }
        }

        Ok(SignUpOutcome {
            response,
            profile_warning,
        })
    }

    /// Password sign-in.
    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Session> {
        self.transition(&ClientMachineInput::SignInAttempt)?;

        let session = match self.provider.sign_in_with_password(email, password).await {
            Ok(session) => session,
            Err(e) => {
                if self.session.lock().is_some() {
                    self.settle(&ClientMachineInput::SignInAborted);
                } else {
                    self.settle(&ClientMachineInput::SignInFailed);
                }
                return Err(e);
            }
        };

        self.store_session(session.clone());
        self.settle(&ClientMachineInput::SignInSuccess);
        info!(user_id = ?session.user_id(), "Sign-in successful");
        self.emit(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    /// Where to send the browser to sign in with `provider`.
    ///
    /// The provider returns to `{origin}/dashboard`; feed that URL to
    /// [`SiteAuth::complete_redirect`].
    pub fn sign_in_with_oauth(&self, provider: OAuthProvider) -> AuthResult<OAuthRedirect> {
        let url = self
            .provider
            .authorize_url(provider, &self.redirect_url(OAUTH_REDIRECT_PATH))?;
        info!(provider = %provider, "Starting OAuth sign-in");
        Ok(OAuthRedirect { provider, url })
    }

    /// Finish an OAuth or email-link flow from the URL the provider redirected to.
    ///
    /// Emits `PASSWORD_RECOVERY` for recovery links and `SIGNED_IN` otherwise.
    pub async fn complete_redirect(&self, url: &Url) -> AuthResult<Session> {
        let tokens = parse_redirect(url)?;
        let user = self.provider.get_user(&tokens.access_token).await?;

        let kind = if tokens.is_recovery() {
            AuthEventKind::PasswordRecovery
        } else {
            AuthEventKind::SignedIn
        };
        let session = tokens.into_session(user, chrono::Utc::now());

        self.store_session(session.clone());
        self.settle(&ClientMachineInput::SessionEstablished);
        info!(user_id = ?session.user_id(), event = %kind, "Redirect completed");
        self.emit(kind, Some(session.clone()));
        Ok(session)
    }

    /// Drop the local session and revoke it at the provider.
    ///
    /// The local sign-out always completes and `SIGNED_OUT` is always emitted.
    /// Rejections from the provider are logged; transport failures are
    /// returned afterwards.
    pub async fn sign_out(&self) -> AuthResult<()> {
        self.settle(&ClientMachineInput::SignOutRequested);

        let previous = self.session.lock().take();
        let mut result = Ok(());
        if let Some(session) = &previous {
            match self.provider.sign_out(&session.access_token).await {
                Ok(()) => {}
                Err(e @ AuthError::Http(_)) => {
                    warn!(error = %e, "Provider sign-out failed");
                    result = Err(e);
                }
                Err(e) => {
                    debug!(error = %e, "Provider rejected sign-out, session already invalid");
                }
            }
        }

        self.settle(&ClientMachineInput::SignOutComplete);
        info!(user_id = ?previous.as_ref().and_then(Session::user_id), "Signed out");
        self.emit(AuthEventKind::SignedOut, None);
        result
    }

    /// Current user as the provider sees it.
    pub async fn get_user(&self) -> AuthResult<User> {
        let token = self.require_access_token()?;
        let user = self.provider.get_user(&token).await?;

        if let Some(session) = self.session.lock().as_mut() {
            if session.access_token == token {
                session.user = Some(user.clone());
            }
        }
        Ok(user)
    }

    /// Profile row for `user_id`, or `None` when it does not exist.
    pub async fn get_profile(&self, user_id: &str) -> AuthResult<Option<UserProfile>> {
        let token = self.access_token();
        self.profiles.select_profile(user_id, token.as_deref()).await
    }

    /// Apply `update` to the profile row of `user_id` and return the new row.
    pub async fn update_profile(
        &self,
        user_id: &str,
        update: ProfileUpdate,
    ) -> AuthResult<UserProfile> {
        let token = self.access_token();
        let profile = self
            .profiles
            .update_profile(user_id, &update, token.as_deref())
            .await?;
        info!(user_id = %user_id, "Profile updated");
        Ok(profile)
    }

    /// Confirm an email address with the token hash from the confirmation link.
    ///
    /// An invalid or expired token fails without emitting any event.
    pub async fn confirm_email(&self, token_hash: &str) -> AuthResult<Session> {
        let session = self.provider.verify_email(token_hash).await?;

        self.store_session(session.clone());
        self.settle(&ClientMachineInput::SessionEstablished);
        info!(user_id = ?session.user_id(), "Email confirmed");
        self.emit(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    /// Send the sign-up confirmation email again.
    pub async fn resend_confirmation_email(&self, email: &str) -> AuthResult<()> {
        self.provider
            .resend_signup(email, &self.redirect_url(EMAIL_REDIRECT_PATH))
            .await?;
        info!(email = %email, "Confirmation email resent");
        Ok(())
    }

    /// Exchange the refresh token for a new session.
    ///
    /// A provider rejection ends the session (`SIGNED_OUT`). Transient
    /// failures keep the current session.
    pub async fn refresh_session(&self) -> AuthResult<Session> {
        let refresh_token = self
            .session
            .lock()
            .as_ref()
            .map(|s| s.refresh_token.clone())
            .ok_or(AuthError::NotLoggedIn)?;
        self.transition(&ClientMachineInput::RefreshStarted)?;

        match self.provider.refresh_session(&refresh_token).await {
            Ok(session) => {
                self.store_session(session.clone());
                self.settle(&ClientMachineInput::RefreshSuccess);
                info!(user_id = ?session.user_id(), "Token refreshed");
                self.emit(AuthEventKind::TokenRefreshed, Some(session.clone()));
                Ok(session)
            }
            Err(e) if e.is_transient() || matches!(e, AuthError::Http(_)) => {
                self.settle(&ClientMachineInput::RefreshAborted);
                warn!(error = %e, "Token refresh failed, keeping session");
                Err(e)
            }
            Err(e) => {
                self.session.lock().take();
                self.settle(&ClientMachineInput::RefreshFailed);
                warn!(error = %e, "Token refresh rejected, signing out");
                self.emit(AuthEventKind::SignedOut, None);
                Err(e)
            }
        }
    }

    /// Adopt a session obtained earlier and announce it as `INITIAL_SESSION`.
    ///
    /// A session whose access token is still valid is also announced as
    /// `SIGNED_IN`. An expired one is kept for [`Self::refresh_session`].
    pub fn restore_session(&self, session: Session) {
        self.store_session(session.clone());
        self.settle(&ClientMachineInput::SessionEstablished);
        let expired = session.is_expired_at(chrono::Utc::now());
        debug!(user_id = ?session.user_id(), expired, "Session restored");
        self.emit(
            AuthEventKind::Other(INITIAL_SESSION.to_string()),
            Some(session.clone()),
        );
        if !expired {
            self.emit(AuthEventKind::SignedIn, Some(session));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SignUpResponse;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::sync::broadcast::error::TryRecvError;

    const GOOD_PASSWORD: &str = "pw123456";
    const VALID_HASH: &str = "valid-hash";

    fn user(id: &str, email: &str) -> User {
        User {
            id: id.to_string(),
            email: Some(email.to_string()),
            email_confirmed_at: None,
            user_metadata: Default::default(),
            created_at: None,
        }
    }

    fn session(access: &str, refresh: &str) -> Session {
        Session {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
            token_type: "bearer".to_string(),
            expires_in: 3600,
            expires_at: None,
            user: Some(user("uid-1", "a@x.com")),
        }
    }

    #[derive(Default)]
    struct MockProvider {
        require_confirmation: bool,
        reject_sign_up: bool,
        offline: bool,
        calls: Mutex<Vec<String>>,
        sign_up_requests: Mutex<Vec<SignUpRequest>>,
    }

    impl MockProvider {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl AuthProvider for MockProvider {
        async fn sign_up(&self, request: &SignUpRequest) -> AuthResult<SignUpResponse> {
            self.record("sign_up");
            self.sign_up_requests.lock().push(request.clone());
            if self.reject_sign_up {
                return Err(AuthError::provider(
                    422,
                    Some("user_already_exists".to_string()),
                    "User already registered",
                ));
            }
            let session = (!self.require_confirmation).then(|| session("at-1", "rt-1"));
            Ok(SignUpResponse {
                user: Some(user("uid-1", &request.email)),
                session,
            })
        }

        async fn sign_in_with_password(&self, _email: &str, password: &str) -> AuthResult<Session> {
            self.record("sign_in");
            if password == GOOD_PASSWORD {
                Ok(session("at-1", "rt-1"))
            } else {
                Err(AuthError::provider(
                    400,
                    Some("invalid_credentials".to_string()),
                    "Invalid login credentials",
                ))
            }
        }

        fn authorize_url(&self, provider: OAuthProvider, redirect_to: &str) -> AuthResult<Url> {
            let mut url = Url::parse("https://abc.supabase.co/auth/v1/authorize")?;
            url.query_pairs_mut()
                .append_pair("provider", provider.as_str())
                .append_pair("redirect_to", redirect_to);
            Ok(url)
        }

        async fn sign_out(&self, access_token: &str) -> AuthResult<()> {
            self.record(format!("sign_out:{}", access_token));
            if access_token == "revoked" {
                return Err(AuthError::provider(401, None, "invalid JWT"));
            }
            Ok(())
        }

        async fn get_user(&self, access_token: &str) -> AuthResult<User> {
            self.record(format!("get_user:{}", access_token));
            Ok(user("uid-1", "a@x.com"))
        }

        async fn refresh_session(&self, refresh_token: &str) -> AuthResult<Session> {
            self.record(format!("refresh:{}", refresh_token));
            if self.offline {
                return Err(AuthError::provider(503, None, "Service unavailable"));
            }
            if refresh_token == "rt-1" {
                Ok(session("at-2", "rt-2"))
            } else {
                Err(AuthError::provider(
                    400,
                    Some("refresh_token_not_found".to_string()),
                    "Invalid Refresh Token: Refresh Token Not Found",
                ))
            }
        }

        async fn verify_email(&self, token_hash: &str) -> AuthResult<Session> {
            self.record("verify");
            if token_hash == VALID_HASH {
                Ok(session("at-1", "rt-1"))
            } else {
                Err(AuthError::provider(
                    403,
                    Some("otp_expired".to_string()),
                    "Email link is invalid or has expired",
                ))
            }
        }

        async fn resend_signup(&self, email: &str, redirect_to: &str) -> AuthResult<()> {
            self.record(format!("resend:{}:{}", email, redirect_to));
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockProfiles {
        fail_insert: bool,
        rows: Mutex<HashMap<String, UserProfile>>,
        inserted: Mutex<Vec<(NewProfile, Option<String>)>>,
    }

    #[async_trait]
    impl ProfileStore for MockProfiles {
        async fn select_profile(
            &self,
            user_id: &str,
            _access_token: Option<&str>,
        ) -> AuthResult<Option<UserProfile>> {
            Ok(self.rows.lock().get(user_id).cloned())
        }

        async fn insert_profile(
            &self,
            profile: &NewProfile,
            access_token: Option<&str>,
        ) -> AuthResult<()> {
            self.inserted
                .lock()
                .push((profile.clone(), access_token.map(str::to_string)));
            if self.fail_insert {
                return Err(AuthError::Store {
                    status: 403,
                    code: Some("42501".to_string()),
                    message: "new row violates row-level security policy".to_string(),
                });
            }
            Ok(())
        }

        async fn update_profile(
            &self,
            user_id: &str,
            update: &ProfileUpdate,
            _access_token: Option<&str>,
        ) -> AuthResult<UserProfile> {
            let mut rows = self.rows.lock();
            let row = rows.get_mut(user_id).ok_or(AuthError::ProfileNotFound)?;
            if let Some(name) = &update.name {
                row.name = name.clone();
            }
            if let Some(plan) = &update.plan {
                row.plan = plan.clone();
            }
            Ok(row.clone())
        }
    }

    fn profile_row(id: &str) -> UserProfile {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "email": "a@x.com",
            "name": "Alice",
            "plan": "free"
        }))
        .unwrap()
    }

    fn site_auth(provider: MockProvider, profiles: MockProfiles) -> (SiteAuth, Arc<MockProvider>, Arc<MockProfiles>) {
        let provider = Arc::new(provider);
        let profiles = Arc::new(profiles);
        let auth = SiteAuth::new(
            provider.clone(),
            profiles.clone(),
            AuthEventBus::default(),
            "https://example.com/",
        );
        (auth, provider, profiles)
    }

    #[tokio::test]
    async fn test_sign_up_inserts_default_profile() {
        let (auth, provider, profiles) = site_auth(MockProvider::default(), MockProfiles::default());
        let mut events = auth.bus().subscribe();

        let outcome = auth.sign_up("a@x.com", "pw123456", "Alice").await.unwrap();
        assert!(outcome.profile_warning.is_none());

        let inserted = profiles.inserted.lock().clone();
        assert_eq!(inserted.len(), 1);
        let (profile, token) = &inserted[0];
        assert_eq!(
            serde_json::to_value(profile).unwrap(),
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
        assert_eq!(token.as_deref(), Some("at-1"));

        let request = provider.sign_up_requests.lock()[0].clone();
        assert_eq!(request.full_name, "Alice");
        assert_eq!(request.email_redirect_to, "https://example.com/confirm");

        assert_eq!(events.try_recv().unwrap().kind, AuthEventKind::SignedIn);
        assert_eq!(auth.state(), ClientAuthState::SignedIn);
    }

    #[tokio::test]
    async fn test_sign_up_survives_profile_insert_failure() {
        let (auth, _, _) = site_auth(
            MockProvider::default(),
            MockProfiles {
                fail_insert: true,
                ..Default::default()
            },
        );

        let outcome = auth.sign_up("a@x.com", "pw123456", "Alice").await.unwrap();
        assert_eq!(outcome.response.user.as_ref().unwrap().id, "uid-1");
        assert!(outcome
            .profile_warning
            .unwrap()
            .contains("row-level security"));
    }

    #[tokio::test]
    async fn test_sign_up_awaiting_confirmation_keeps_signed_out() {
        let (auth, _, profiles) = site_auth(
            MockProvider {
                require_confirmation: true,
                ..Default::default()
            },
            MockProfiles::default(),
        );
        let mut events = auth.bus().subscribe();

        let outcome = auth.sign_up("a@x.com", "pw123456", "Alice").await.unwrap();
        assert!(outcome.response.session.is_none());
        assert_eq!(profiles.inserted.lock()[0].1, None);
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(auth.state(), ClientAuthState::SignedOut);
        assert!(auth.session().is_none());
    }

    #[tokio::test]
    async fn test_sign_up_rejection_skips_profile() {
        let (auth, _, profiles) = site_auth(
            MockProvider {
                reject_sign_up: true,
                ..Default::default()
            },
            MockProfiles::default(),
        );

        let err = auth.sign_up("a@x.com", "pw123456", "Alice").await.unwrap_err();
        assert_eq!(err.to_string(), "User already registered");
        assert!(profiles.inserted.lock().is_empty());
    }

    #[tokio::test]
    async fn test_sign_in_stores_session_and_emits() {
        let (auth, _, _) = site_auth(MockProvider::default(), MockProfiles::default());
        let mut events = auth.bus().subscribe();

        let session = auth.sign_in("a@x.com", GOOD_PASSWORD).await.unwrap();
        assert_eq!(session.access_token, "at-1");
        assert_eq!(auth.session().unwrap().access_token, "at-1");
        assert_eq!(auth.state(), ClientAuthState::SignedIn);

        let event = events.try_recv().unwrap();
        assert_eq!(event.kind, AuthEventKind::SignedIn);
        assert_eq!(event.user_id(), Some("uid-1"));
    }

    #[tokio::test]
    async fn test_sign_in_with_bad_password() {
        let (auth, _, _) = site_auth(MockProvider::default(), MockProfiles::default());
        let mut events = auth.bus().subscribe();

        let err = auth.sign_in("a@x.com", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::Provider { status: 400, .. }));
        assert_eq!(auth.state(), ClientAuthState::SignedOut);
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_failed_sign_in_keeps_existing_session() {
        let (auth, _, _) = site_auth(MockProvider::default(), MockProfiles::default());
        auth.sign_in("a@x.com", GOOD_PASSWORD).await.unwrap();

        assert!(auth.sign_in("a@x.com", "wrong").await.is_err());
        assert_eq!(auth.state(), ClientAuthState::SignedIn);
        assert!(auth.session().is_some());
    }

    #[test]
    fn test_oauth_redirect_targets_dashboard() {
        let (auth, _, _) = site_auth(MockProvider::default(), MockProfiles::default());
        let redirect = auth.sign_in_with_oauth(OAuthProvider::Google).unwrap();

        assert_eq!(redirect.provider, OAuthProvider::Google);
        let redirect_to = redirect
            .url
            .query_pairs()
            .find(|(k, _)| k == "redirect_to")
            .map(|(_, v)| v.into_owned());
        assert_eq!(redirect_to.as_deref(), Some("https://example.com/dashboard"));
    }

    #[tokio::test]
    async fn test_complete_redirect_emits_signed_in() {
        let (auth, provider, _) = site_auth(MockProvider::default(), MockProfiles::default());
        let mut events = auth.bus().subscribe();
        let url = Url::parse(
            "https://example.com/dashboard#access_token=at-9&refresh_token=rt-9&expires_in=3600&token_type=bearer",
        )
        .unwrap();

        let session = auth.complete_redirect(&url).await.unwrap();
        assert_eq!(session.access_token, "at-9");
        assert_eq!(session.user_id(), Some("uid-1"));
        assert!(provider.calls().contains(&"get_user:at-9".to_string()));
        assert_eq!(events.try_recv().unwrap().kind, AuthEventKind::SignedIn);
    }

    #[tokio::test]
    async fn test_complete_recovery_redirect() {
        let (auth, _, _) = site_auth(MockProvider::default(), MockProfiles::default());
        let mut events = auth.bus().subscribe();
        let url = Url::parse("https://example.com/#access_token=at-9&refresh_token=rt-9&type=recovery")
            .unwrap();

        auth.complete_redirect(&url).await.unwrap();
        assert_eq!(
            events.try_recv().unwrap().kind,
            AuthEventKind::PasswordRecovery
        );
    }

    #[tokio::test]
    async fn test_complete_redirect_with_error() {
        let (auth, _, _) = site_auth(MockProvider::default(), MockProfiles::default());
        let mut events = auth.bus().subscribe();
        let url = Url::parse("https://example.com/#error=access_denied&error_description=denied")
            .unwrap();

        assert!(matches!(
            auth.complete_redirect(&url).await,
            Err(AuthError::Provider { .. })
        ));
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_sign_out_clears_session_and_emits() {
        let (auth, provider, _) = site_auth(MockProvider::default(), MockProfiles::default());
        auth.sign_in("a@x.com", GOOD_PASSWORD).await.unwrap();
        let mut events = auth.bus().subscribe();

        auth.sign_out().await.unwrap();
        assert!(auth.session().is_none());
        assert_eq!(auth.state(), ClientAuthState::SignedOut);
        assert!(provider.calls().contains(&"sign_out:at-1".to_string()));
        let event = events.try_recv().unwrap();
        assert_eq!(event.kind, AuthEventKind::SignedOut);
        assert!(event.session.is_none());
    }

    #[tokio::test]
    async fn test_sign_out_ignores_provider_rejection() {
        let (auth, _, _) = site_auth(MockProvider::default(), MockProfiles::default());
        let mut revoked = session("revoked", "rt-1");
        revoked.user = None;
        auth.restore_session(revoked);

        assert!(auth.sign_out().await.is_ok());
        assert!(auth.session().is_none());
    }

    #[tokio::test]
    async fn test_sign_out_without_session_skips_provider() {
        let (auth, provider, _) = site_auth(MockProvider::default(), MockProfiles::default());
        let mut events = auth.bus().subscribe();

        auth.sign_out().await.unwrap();
        assert!(provider.calls().is_empty());
        assert_eq!(events.try_recv().unwrap().kind, AuthEventKind::SignedOut);
    }

    #[tokio::test]
    async fn test_get_user_requires_session() {
        let (auth, _, _) = site_auth(MockProvider::default(), MockProfiles::default());
        assert!(matches!(auth.get_user().await, Err(AuthError::NotLoggedIn)));

        auth.sign_in("a@x.com", GOOD_PASSWORD).await.unwrap();
        assert_eq!(auth.get_user().await.unwrap().id, "uid-1");
    }

    #[tokio::test]
    async fn test_get_profile_missing_is_none() {
        let (auth, _, _) = site_auth(MockProvider::default(), MockProfiles::default());
        assert!(auth.get_profile("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_profile() {
        let profiles = MockProfiles::default();
        profiles
            .rows
            .lock()
            .insert("uid-1".to_string(), profile_row("uid-1"));
        let (auth, _, _) = site_auth(MockProvider::default(), profiles);

        let updated = auth
            .update_profile(
                "uid-1",
                ProfileUpdate {
                    plan: Some("pro".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.plan, "pro");
        assert_eq!(updated.name, "Alice");

        let missing = auth
            .update_profile("nobody", ProfileUpdate::default())
            .await;
        assert!(matches!(missing, Err(AuthError::ProfileNotFound)));
    }

    #[tokio::test]
    async fn test_confirm_email() {
        let (auth, _, _) = site_auth(MockProvider::default(), MockProfiles::default());
        let mut events = auth.bus().subscribe();

        auth.confirm_email(VALID_HASH).await.unwrap();
        assert_eq!(events.try_recv().unwrap().kind, AuthEventKind::SignedIn);
        assert_eq!(auth.state(), ClientAuthState::SignedIn);
    }

    #[tokio::test]
    async fn test_confirm_email_with_invalid_token() {
        let (auth, _, _) = site_auth(MockProvider::default(), MockProfiles::default());
        let mut events = auth.bus().subscribe();

        let err = auth.confirm_email("expired-hash").await.unwrap_err();
        assert!(matches!(err, AuthError::Provider { .. }));
        assert_eq!(err.code(), Some("otp_expired"));
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        assert!(auth.session().is_none());
    }

    #[tokio::test]
    async fn test_resend_uses_confirm_redirect() {
        let (auth, provider, _) = site_auth(MockProvider::default(), MockProfiles::default());
        auth.resend_confirmation_email("a@x.com").await.unwrap();
        assert_eq!(
            provider.calls(),
            vec!["resend:a@x.com:https://example.com/confirm".to_string()]
        );
    }

    #[tokio::test]
    async fn test_refresh_session_emits_token_refreshed() {
        let (auth, _, _) = site_auth(MockProvider::default(), MockProfiles::default());
        assert!(matches!(
            auth.refresh_session().await,
            Err(AuthError::NotLoggedIn)
        ));

        auth.sign_in("a@x.com", GOOD_PASSWORD).await.unwrap();
        let mut events = auth.bus().subscribe();

        let refreshed = auth.refresh_session().await.unwrap();
        assert_eq!(refreshed.access_token, "at-2");
        assert_eq!(auth.session().unwrap().refresh_token, "rt-2");
        assert_eq!(auth.state(), ClientAuthState::SignedIn);
        assert_eq!(
            events.try_recv().unwrap().kind,
            AuthEventKind::TokenRefreshed
        );
    }

    #[tokio::test]
    async fn test_rejected_refresh_signs_out() {
        let (auth, _, _) = site_auth(MockProvider::default(), MockProfiles::default());
        auth.restore_session(session("at-1", "stale"));
        let mut events = auth.bus().subscribe();

        assert!(auth.refresh_session().await.is_err());
        assert!(auth.session().is_none());
        assert_eq!(auth.state(), ClientAuthState::SignedOut);
        assert_eq!(events.try_recv().unwrap().kind, AuthEventKind::SignedOut);
    }

    #[tokio::test]
    async fn test_transient_refresh_failure_keeps_session() {
        let (auth, _, _) = site_auth(
            MockProvider {
                offline: true,
                ..Default::default()
            },
            MockProfiles::default(),
        );
        auth.restore_session(session("at-1", "rt-1"));

        let err = auth.refresh_session().await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(auth.session().unwrap().access_token, "at-1");
        assert_eq!(auth.state(), ClientAuthState::SignedIn);
    }

    #[tokio::test]
    async fn test_restore_session_emits_initial_session() {
        let (auth, _, _) = site_auth(MockProvider::default(), MockProfiles::default());
        let mut events = auth.bus().subscribe();

        auth.restore_session(session("at-1", "rt-1"));
        let event = events.try_recv().unwrap();
        assert_eq!(event.kind, AuthEventKind::Other(INITIAL_SESSION.to_string()));
        let event = events.try_recv().unwrap();
        assert_eq!(event.kind, AuthEventKind::SignedIn);
        assert_eq!(event.user_id(), Some("uid-1"));
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(auth.state(), ClientAuthState::SignedIn);
    }

    #[tokio::test]
    async fn test_restore_expired_session_only_emits_initial_session() {
        let (auth, _, _) = site_auth(MockProvider::default(), MockProfiles::default());
        let mut events = auth.bus().subscribe();

        let mut expired = session("at-1", "rt-1");
        expired.expires_at = Some(chrono::Utc::now().timestamp() - 60);
        auth.restore_session(expired);

        let event = events.try_recv().unwrap();
        assert_eq!(event.kind, AuthEventKind::Other(INITIAL_SESSION.to_string()));
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(auth.session().unwrap().refresh_token, "rt-1");
    }
}
