//! site-auth - command-line client for the site's Supabase authentication.

mod app;
mod commands;
mod shell;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use route_guard::Router;
use site_config::{init_logging, Config, Paths};

/// site-auth command-line interface.
#[derive(Parser)]
#[command(name = "site-auth")]
#[command(about = "Sign up, sign in and manage profiles against the site's Supabase project")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config and logs. Defaults to ~/.site-auth
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Page the client is on when the command runs
    #[arg(long, default_value = "/", global = true)]
    path: String,

    /// Also write logs to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub(crate) enum Commands {
    /// Create an account and its profile
    SignUp {
        email: String,
        /// Display name stored as the profile name
        #[arg(long)]
        name: String,
        #[arg(long, env = "SITE_AUTH_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign in with email and password
    SignIn {
        email: String,
        #[arg(long, env = "SITE_AUTH_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Print the URL that starts an OAuth sign-in
    OauthUrl {
        /// github or google
        provider: String,
    },
    /// Finish an OAuth or email-link sign-in from the URL the browser landed on
    CompleteRedirect { url: String },
    /// Confirm an email address with the token hash from the confirmation link
    Confirm { token_hash: String },
    /// Send the confirmation email again
    Resend { email: String },
    /// Exchange the refresh token for a new session
    Refresh,
    /// Sign out
    SignOut,
    /// Show a profile (defaults to the signed-in user)
    Profile { user_id: Option<String> },
    /// Update profile fields
    UpdateProfile {
        /// Defaults to the signed-in user
        #[arg(long)]
        user_id: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        avatar_url: Option<String>,
        #[arg(long)]
        plan: Option<String>,
        #[arg(long)]
        billing_status: Option<String>,
        /// Replace the settings with these key=value pairs (values may be JSON)
        #[arg(long = "setting", value_name = "KEY=VALUE")]
        settings: Vec<String>,
    },
    /// Show the client state and current user
    Whoami,
    /// Interactive session that keeps the sign-in across commands
    Shell,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths).context("Failed to load configuration")?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_logging(level, Some(paths.log_file()), cli.verbose);

    let state = app::AppState::build(&config, &cli.path)?;

    let result = match cli.command {
        Some(Commands::Shell) | None => shell::run(&state).await,
        Some(command) => commands::run(&state, command).await,
    };

    let router = state.shutdown().await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "Command failed");
    }
    println!("route: {}", router.current_path());
    result
}
