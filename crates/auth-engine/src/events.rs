//! Auth lifecycle event fan-out.
//!
//! The client owns an [`AuthEventBus`] and emits on it after each state
//! change. The composition root registers a listener with
//! [`AuthEventSubscriber::spawn`], which drains the bus on a dedicated task so
//! callbacks for one subscription run one at a time, in emission order.

use crate::types::AuthEvent;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Default number of events buffered per subscriber.
pub const DEFAULT_BUS_CAPACITY: usize = 64;

/// Broadcast channel for [`AuthEvent`]s.
#[derive(Clone)]
pub struct AuthEventBus {
    tx: broadcast::Sender<AuthEvent>,
    /// Events that reached at least one subscriber.
    sent: Arc<AtomicU64>,
}

impl AuthEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            sent: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish an event. Returns the number of subscribers that will see it.
    pub fn emit(&self, event: AuthEvent) -> usize {
        let kind = event.kind.clone();
        match self.tx.send(event) {
            Ok(receivers) => {
                self.sent.fetch_add(1, Ordering::SeqCst);
                receivers
            }
            Err(_) => {
                debug!(event = %kind, "Auth event emitted with no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for AuthEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

/// Receives auth lifecycle events.
///
/// Returns nothing: whatever the listener does with an event never reaches
/// the code that emitted it.
pub trait AuthStateListener: Send + Sync + 'static {
    fn on_auth_event(&self, event: &AuthEvent);
}

impl<F> AuthStateListener for F
where
    F: Fn(&AuthEvent) + Send + Sync + 'static,
{
    fn on_auth_event(&self, event: &AuthEvent) {
        self(event)
    }
}

/// Registers listeners on a bus.
pub struct AuthEventSubscriber;

impl AuthEventSubscriber {
    /// Subscribe `listener` to `bus` on a new task.
    ///
    /// Must be called from within a tokio runtime. The subscription stays
    /// active until the returned handle is cancelled or dropped, or every
    /// bus clone is gone.
    pub fn spawn(bus: &AuthEventBus, listener: Arc<dyn AuthStateListener>) -> SubscriptionHandle {
        let rx = bus.subscribe();
        let start = bus.sent.load(Ordering::SeqCst);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (handled_tx, handled) = watch::channel(0);
        let task = tokio::spawn(dispatch(rx, cancel_rx, handled_tx, listener));
        SubscriptionHandle {
            cancel: Some(cancel_tx),
            task: Some(task),
            handled,
            sent: bus.sent.clone(),
            start,
        }
    }
}

async fn dispatch(
    mut rx: broadcast::Receiver<AuthEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
    handled: watch::Sender<u64>,
    listener: Arc<dyn AuthStateListener>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut cancel_rx => {
                debug!("Auth event subscription cancelled");
                break;
            }
            received = rx.recv() => match received {
                Ok(event) => {
                    debug!(
                        event = %event.kind,
                        user_id = ?event.user_id(),
                        "Auth state changed"
                    );
                    // A panicking listener must not end the subscription.
                    let delivered = panic::catch_unwind(AssertUnwindSafe(|| {
                        listener.on_auth_event(&event)
                    }));
                    if delivered.is_err() {
                        error!(event = %event.kind, "Auth state listener panicked");
                    }
                    handled.send_modify(|n| *n += 1);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Auth event subscriber lagged, events dropped");
                    handled.send_modify(|n| *n += skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Auth event bus closed");
                    break;
                }
            },
        }
    }
}

/// Owns a running subscription. Dropping it cancels the subscription.
pub struct SubscriptionHandle {
    cancel: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    handled: watch::Receiver<u64>,
    sent: Arc<AtomicU64>,
    start: u64,
}

impl SubscriptionHandle {
    /// Stop delivering events and wait for the dispatch task to exit.
    pub async fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        self.join_task().await;
    }

    /// Wait until the bus closes (every sender dropped) and all buffered
    /// events have been delivered.
    pub async fn join(mut self) {
        self.join_task().await;
    }

    /// Wait until the listener has handled every event emitted so far.
    ///
    /// Returns early once the subscription has ended.
    pub async fn settled(&self) {
        let mut handled = self.handled.clone();
        let _ = handled
            .wait_for(|n| self.start + n >= self.sent.load(Ordering::SeqCst))
            .await;
    }

    async fn join_task(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Auth event listener task failed");
            }
        }
    }
}
