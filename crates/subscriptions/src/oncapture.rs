//! OnCapture trigger: subscribe to the capture-commit bus, coalesce bursts
//! with a bounded debounce window before firing.
//!
//! `epcis-events`' bus is a blocking `std::sync::mpsc` channel, and
//! subscription work runs on its own thread pool rather than the async
//! request-serving one, so this module bridges it onto the async runtime
//! with a dedicated background thread before debouncing.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use epcis_core::cancel::CancellationToken;
use epcis_core::TenantId;
use epcis_events::{EventBus, RepositoryNotification};
use tokio::sync::mpsc::UnboundedSender;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Spawn the blocking bridge thread: reads `RepositoryNotification`s off
/// `bus` and forwards them to `sender`.
///
/// The bus only exposes a blocking `recv`, which would otherwise wait
/// forever for the next capture past the point a shutdown is requested;
/// `try_recv` polling against `token` keeps this thread responsive to
/// cancellation instead.
pub fn spawn_bridge<B>(
    bus: Arc<B>,
    sender: UnboundedSender<RepositoryNotification>,
    token: CancellationToken,
) -> std::thread::JoinHandle<()>
where
    B: EventBus<RepositoryNotification> + 'static,
{
    std::thread::Builder::new()
        .name("epcis-subscriptions-oncapture-bridge".to_string())
        .spawn(move || {
            let subscription = bus.subscribe();
            while !token.is_canceled() {
                match subscription.try_recv() {
                    Ok(notification) => {
                        if sender.send(notification).is_err() {
                            break;
                        }
                    }
                    Err(std::sync::mpsc::TryRecvError::Empty) => std::thread::sleep(POLL_INTERVAL),
                    Err(std::sync::mpsc::TryRecvError::Disconnected) => break,
                }
            }
        })
        .expect("failed to spawn OnCapture bridge thread")
}

/// Debounces a burst of notifications for the same tenant into a single
/// fire, `debounce` after the first notification in the burst.
pub struct Debouncer {
    pending: Arc<Mutex<HashSet<TenantId>>>,
    debounce: Duration,
}

impl Debouncer {
    pub fn new(debounce: Duration) -> Self {
        Self { pending: Arc::new(Mutex::new(HashSet::new())), debounce }
    }

    /// Record a notification for `tenant_id`. If no debounce window is
    /// already running for this tenant, spawn one; when it elapses,
    /// `on_fire(tenant_id)` runs exactly once for the whole burst.
    pub fn notify<F>(&self, tenant_id: TenantId, on_fire: F)
    where
        F: FnOnce(TenantId) + Send + 'static,
    {
        let mut pending = self.pending.lock().expect("debouncer mutex poisoned");
        if !pending.insert(tenant_id.clone()) {
            return;
        }
        drop(pending);

        let pending = self.pending.clone();
        let debounce = self.debounce;
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            pending.lock().expect("debouncer mutex poisoned").remove(&tenant_id);
            on_fire(tenant_id);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn a_burst_of_notifications_fires_once() {
        let debouncer = Debouncer::new(Duration::from_millis(250));
        let fires = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let fires = fires.clone();
            debouncer.notify(TenantId::new("acme"), move |_| {
                fires.fetch_add(1, Ordering::SeqCst);
            });
        }

        advance(Duration::from_millis(300)).await;
        tokio::task::yield_now().await;

        assert_eq!(fires.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn separate_tenants_each_get_their_own_window() {
        let debouncer = Debouncer::new(Duration::from_millis(250));
        let fires = Arc::new(Mutex::new(Vec::new()));

        for tenant in ["acme", "globex"] {
            let fires = fires.clone();
            debouncer.notify(TenantId::new(tenant), move |t| {
                fires.lock().unwrap().push(t);
            });
        }

        advance(Duration::from_millis(300)).await;
        tokio::task::yield_now().await;

        let mut fired = fires.lock().unwrap().clone();
        fired.sort();
        assert_eq!(fired, vec![TenantId::new("acme"), TenantId::new("globex")]);
    }
}
