//! Redirects the current view when the user signs in or out.

use crate::router::Router;
use auth_engine::{AuthEvent, AuthEventKind, AuthStateListener};
use std::sync::Arc;
use tracing::{debug, info};

pub const HOME_PATH: &str = "/";
pub const LOGIN_PATH: &str = "/login";
pub const DASHBOARD_PATH: &str = "/dashboard";

/// What the guard does for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationDecision {
    Stay,
    Replace(&'static str),
}

/// Pure routing rule.
///
/// Signed-in users on the landing or login page go to the dashboard.
/// Signed-out users anywhere but the landing page go home. Paths are
/// compared exactly, query string included.
pub fn decide(kind: &AuthEventKind, current_path: &str) -> NavigationDecision {
    match kind {
        AuthEventKind::SignedIn if current_path == HOME_PATH || current_path == LOGIN_PATH => {
            NavigationDecision::Replace(DASHBOARD_PATH)
        }
        AuthEventKind::SignedOut if current_path != HOME_PATH => {
            NavigationDecision::Replace(HOME_PATH)
        }
        _ => NavigationDecision::Stay,
    }
}

/// Listener that applies [`decide`] to a router.
pub struct NavigationGuard {
    router: Arc<dyn Router>,
}

impl NavigationGuard {
    pub fn new(router: Arc<dyn Router>) -> Self {
        Self { router }
    }

    /// Apply the routing rule for `event` and return what was done.
    pub fn handle(&self, event: &AuthEvent) -> NavigationDecision {
        let current_path = self.router.current_path();
        let decision = decide(&event.kind, &current_path);

        match decision {
            NavigationDecision::Replace(to) => {
                info!(
                    event = %event.kind,
                    from = %current_path,
                    to = %to,
                    "Redirecting after auth change"
                );
                self.router.replace(to);
            }
            NavigationDecision::Stay => match event.kind {
                AuthEventKind::SignedIn | AuthEventKind::SignedOut => {
                    debug!(event = %event.kind, path = %current_path, "Already on an allowed page");
                }
                _ => {
                    debug!(event = %event.kind, path = %current_path, "Auth event needs no navigation");
                }
            },
        }
        decision
    }
}

impl AuthStateListener for NavigationGuard {
    fn on_auth_event(&self, event: &AuthEvent) {
        self.handle(event);
    }
}
