use async_trait::async_trait;
use auth_engine::{
    AuthError, AuthProvider, AuthResult, NewProfile, OAuthProvider, ProfileStore, ProfileUpdate,
    Session, SignUpRequest, SignUpResponse, User, UserProfile,
};
use url::Url;

pub const PASSWORD: &str = "pw123456";
pub const VALID_HASH: &str = "valid-hash";

pub fn user() -> User {
    User {
        id: "uid-1".to_string(),
        email: Some("a@x.com".to_string()),
        email_confirmed_at: None,
        user_metadata: Default::default(),
        created_at: None,
    }
}

pub fn session() -> Session {
    Session {
        access_token: "at-1".to_string(),
        refresh_token: "rt-1".to_string(),
        token_type: "bearer".to_string(),
        expires_in: 3600,
        expires_at: None,
        user: Some(user()),
    }
}

/// Provider that accepts `PASSWORD` and `VALID_HASH` and rejects everything else.
pub struct StubProvider;

fn rejected(code: &str, message: &str) -> AuthError {
    AuthError::provider(400, Some(code.to_string()), message)
}

#[async_trait]
impl AuthProvider for StubProvider {
    async fn sign_up(&self, _request: &SignUpRequest) -> AuthResult<SignUpResponse> {
        Ok(SignUpResponse {
            user: Some(user()),
            session: Some(session()),
        })
    }

    async fn sign_in_with_password(&self, _email: &str, password: &str) -> AuthResult<Session> {
        if password == PASSWORD {
            Ok(session())
        } else {
            Err(rejected("invalid_credentials", "Invalid login credentials"))
        }
    }

    fn authorize_url(&self, provider: OAuthProvider, redirect_to: &str) -> AuthResult<Url> {
        let mut url = Url::parse("https://abc.supabase.co/auth/v1/authorize")?;
        url.query_pairs_mut()
            .append_pair("provider", provider.as_str())
            .append_pair("redirect_to", redirect_to);
        Ok(url)
    }

    async fn sign_out(&self, _access_token: &str) -> AuthResult<()> {
        Ok(())
    }

    async fn get_user(&self, _access_token: &str) -> AuthResult<User> {
        Ok(user())
    }

    async fn refresh_session(&self, _refresh_token: &str) -> AuthResult<Session> {
        Ok(session())
    }

    async fn verify_email(&self, token_hash: &str) -> AuthResult<Session> {
        if token_hash == VALID_HASH {
            Ok(session())
        } else {
            Err(rejected("otp_expired", "Email link is invalid or has expired"))
        }
    }

    async fn resend_signup(&self, _email: &str, _redirect_to: &str) -> AuthResult<()> {
        Ok(())
    }
}

/// Profile store with no rows that accepts every insert.
pub struct EmptyProfiles;

#[async_trait]
impl ProfileStore for EmptyProfiles {
    async fn select_profile(
        &self,
        _user_id: &str,
        _access_token: Option<&str>,
    ) -> AuthResult<Option<UserProfile>> {
        Ok(None)
    }

    async fn insert_profile(
        &self,
        _profile: &NewProfile,
        _access_token: Option<&str>,
    ) -> AuthResult<()> {
        Ok(())
    }

    async fn update_profile(
        &self,
        _user_id: &str,
        _update: &ProfileUpdate,
        _access_token: Option<&str>,
    ) -> AuthResult<UserProfile> {
        Err(AuthError::ProfileNotFound)
    }
}
