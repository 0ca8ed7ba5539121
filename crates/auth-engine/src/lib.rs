//! Supabase auth client for the site.
//!
//! - [`SiteAuth`]: sign-up, sign-in, OAuth, sign-out, profile access
//! - [`AuthEventBus`] / [`AuthEventSubscriber`]: auth lifecycle fan-out
//! - [`GoTrueClient`] and [`PostgrestProfiles`]: REST transports behind the
//!   [`AuthProvider`] and [`ProfileStore`] traits

mod adapter;
pub mod client_fsm;
mod error;
mod events;
mod gotrue;
mod profiles;
mod redirect;
mod types;

pub use adapter::{SiteAuth, EMAIL_REDIRECT_PATH, OAUTH_REDIRECT_PATH};
pub use client_fsm::ClientAuthState;
pub use error::{AuthError, AuthResult, PGRST_NO_ROWS};
pub use events::{
    AuthEventBus, AuthEventSubscriber, AuthStateListener, SubscriptionHandle,
    DEFAULT_BUS_CAPACITY,
};
pub use gotrue::{AuthProvider, GoTrueClient, SignUpRequest};
pub use profiles::{PostgrestProfiles, ProfileStore};
pub use redirect::{parse_redirect, RedirectTokens};
pub use types::{
    AuthEvent, AuthEventKind, NewProfile, OAuthProvider, OAuthRedirect, ProfileUpdate, Session,
    SettingValue, Settings, SignUpOutcome, SignUpResponse, User, UserProfile, INITIAL_SESSION,
};
