//! Auth-driven navigation guard.
//!
//! Register a [`NavigationGuard`] on the auth event bus to keep signed-in
//! users off the landing/login pages and signed-out users off everything else.

mod guard;
mod router;

pub use guard::{
    decide, NavigationDecision, NavigationGuard, DASHBOARD_PATH, HOME_PATH, LOGIN_PATH,
};
pub use router::{MemoryRouter, Navigation, NavigationKind, Router};
