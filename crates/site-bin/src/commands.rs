//! Command handlers. Results go to stdout as JSON; tokens are never printed.

use crate::app::AppState;
use crate::Commands;
use anyhow::{anyhow, bail, Context};
use auth_engine::{OAuthProvider, ProfileUpdate, Session, SettingValue, Settings, SiteAuth};
use serde_json::json;
use url::Url;

/// Run one command against the shared client.
pub async fn run(state: &AppState, command: Commands) -> anyhow::Result<()> {
    let auth = state.auth.as_ref();

    match command {
        Commands::SignUp {
            email,
            name,
            password,
        } => {
            let outcome = auth.sign_up(&email, &password, &name).await?;
            if let Some(warning) = &outcome.profile_warning {
                eprintln!("warning: account created but profile was not saved: {}", warning);
            }
            print_json(&json!({
                "user_id": outcome.response.user.as_ref().map(|u| u.id.as_str()),
                "email_confirmation_required": outcome.response.session.is_none(),
                "profile_warning": outcome.profile_warning,
            }))
        }
        Commands::SignIn { email, password } => {
            let session = auth.sign_in(&email, &password).await?;
            print_json(&session_summary(&session))
        }
        Commands::OauthUrl { provider } => {
            let provider: OAuthProvider = provider.parse()?;
            let redirect = auth.sign_in_with_oauth(provider)?;
            println!("{}", redirect.url);
            Ok(())
        }
        Commands::CompleteRedirect { url } => {
            let url = Url::parse(&url).context("Not a valid redirect URL")?;
            let session = auth.complete_redirect(&url).await?;
            print_json(&session_summary(&session))
        }
        Commands::Confirm { token_hash } => {
            let session = auth.confirm_email(&token_hash).await?;
            print_json(&session_summary(&session))
        }
        Commands::Resend { email } => {
            auth.resend_confirmation_email(&email).await?;
            println!("Confirmation email sent to {}", email);
            Ok(())
        }
        Commands::Refresh => {
            let session = auth.refresh_session().await?;
            print_json(&session_summary(&session))
        }
        Commands::SignOut => {
            auth.sign_out().await?;
            println!("Signed out");
            Ok(())
        }
        Commands::Profile { user_id } => {
            let user_id = resolve_user_id(auth, user_id)?;
            match auth.get_profile(&user_id).await? {
                Some(profile) => print_json(&serde_json::to_value(profile)?),
                None => {
                    println!("No profile for {}", user_id);
                    Ok(())
                }
            }
        }
        Commands::UpdateProfile {
            user_id,
            name,
            username,
            avatar_url,
            plan,
            billing_status,
            settings,
        } => {
            let user_id = resolve_user_id(auth, user_id)?;
            let settings = parse_settings(&settings)?;
            let update = build_update(
                ProfileUpdate {
                    name,
                    username,
                    avatar_url,
                    plan,
                    billing_status,
                    settings,
                    ..Default::default()
                },
                chrono::Utc::now(),
            );
            if update.is_empty() {
                bail!("Nothing to update");
            }
            let profile = auth.update_profile(&user_id, update).await?;
            print_json(&serde_json::to_value(profile)?)
        }
        Commands::Whoami => {
            let mut report = json!({ "state": auth.state() });
            if auth.session().is_some() {
                let user = auth.get_user().await?;
                report["user_id"] = json!(user.id);
                report["email"] = json!(user.email);
            }
            if let Some(session) = auth.session() {
                report["expires_at"] = json!(session.expires_at);
            }
            print_json(&report)
        }
        Commands::Shell => bail!("Already in a shell"),
    }
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Printable view of a session without its tokens.
pub(crate) fn session_summary(session: &Session) -> serde_json::Value {
    let user = session.user.as_ref();
    json!({
        "user_id": user.map(|u| u.id.as_str()),
        "email": user.and_then(|u| u.email.as_deref()),
        "token_type": session.token_type,
        "expires_at": session.expires_at,
    })
}

fn resolve_user_id(auth: &SiteAuth, explicit: Option<String>) -> anyhow::Result<String> {
    explicit
        .or_else(|| {
            auth.session()
                .and_then(|s| s.user_id().map(str::to_string))
        })
        .ok_or_else(|| anyhow!("No user id given and not signed in"))
}

/// Parse `key=value` pairs. Values that parse as JSON keep their type,
/// anything else is a string.
pub(crate) fn parse_settings(raw: &[String]) -> anyhow::Result<Option<Settings>> {
    if raw.is_empty() {
        return Ok(None);
    }

    let mut settings = Settings::new();
    for pair in raw {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("Setting must be KEY=VALUE: {}", pair))?;
        let key = key.trim();
        if key.is_empty() {
            bail!("Setting has an empty key: {}", pair);
        }
        let value = serde_json::from_str::<serde_json::Value>(value)
            .map(SettingValue::from)
            .unwrap_or_else(|_| SettingValue::from(value));
        settings.insert(key.to_string(), value);
    }
    Ok(Some(settings))
}

/// Stamp the update times on a non-empty update.
pub(crate) fn build_update(
    mut update: ProfileUpdate,
    now: chrono::DateTime<chrono::Utc>,
) -> ProfileUpdate {
    if update.is_empty() {
        return update;
    }
    let stamp = now.to_rfc3339();
    if update.settings.is_some() {
        update.settings_updated_at = Some(stamp.clone());
    }
    update.updated_at = Some(stamp);
    update
}
