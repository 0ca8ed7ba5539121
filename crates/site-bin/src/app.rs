//! Composition root: configuration, client, router and the single auth listener.

use anyhow::Context;
use auth_engine::{
    AuthEvent, AuthEventBus, AuthEventSubscriber, AuthStateListener, SiteAuth, SubscriptionHandle,
};
use route_guard::{MemoryRouter, NavigationDecision, NavigationGuard};
use site_config::Config;
use std::sync::Arc;
use tracing::info;

/// Runs the navigation guard and prints every redirect it makes.
struct RouteReporter {
    guard: NavigationGuard,
}

impl AuthStateListener for RouteReporter {
    fn on_auth_event(&self, event: &AuthEvent) {
        if let NavigationDecision::Replace(to) = self.guard.handle(event) {
            println!("-> {} ({})", to, event.kind);
        }
    }
}

/// Everything a command needs.
pub struct AppState {
    pub auth: Arc<SiteAuth>,
    pub router: Arc<MemoryRouter>,
    subscription: SubscriptionHandle,
}

impl AppState {
    /// Wire the client to the guard. Missing configuration is logged first;
    /// the client can only be built from a parseable project URL.
    pub fn build(config: &Config, start_path: &str) -> anyhow::Result<Self> {
        config.report();

        let supabase_url = config
            .supabase_url()
            .context("SUPABASE_URL is missing or not a valid URL")?;
        let site_origin = config.site_origin().context("SITE_ORIGIN is not a valid origin")?;

        let bus = AuthEventBus::default();
        let auth = Arc::new(SiteAuth::connect(
            supabase_url,
            &config.supabase_anon_key,
            site_origin,
            bus.clone(),
        ));

        let router = Arc::new(MemoryRouter::new(start_path));
        let reporter = RouteReporter {
            guard: NavigationGuard::new(router.clone()),
        };
        let subscription = AuthEventSubscriber::spawn(&bus, Arc::new(reporter));

        info!(path = %start_path, "Auth client ready");
        Ok(Self {
            auth,
            router,
            subscription,
        })
    }

    /// Wait for the guard to handle every event emitted so far.
    pub async fn settled(&self) {
        self.subscription.settled().await;
    }

    /// Close the bus, wait for the guard to handle every pending event and
    /// return the router in its final state.
    pub async fn shutdown(self) -> Arc<MemoryRouter> {
        let AppState {
            auth,
            router,
            subscription,
        } = self;
        drop(auth);
        subscription.join().await;
        router
    }
}
