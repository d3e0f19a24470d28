//! Wires the pieces together: a subscription registry (CRUD, delegating to
//! storage), the OnCapture bridge/debouncer, the OnSchedule min-heap loop,
//! and the coalescing runner, under one handle an `epcis-api` process can
//! start and stop.

use std::sync::Arc;
use std::time::Duration;

use epcis_core::cancel::CancellationToken;
use epcis_core::{Subscription, SubscriptionId, TenantId};
use epcis_events::{EventBus, RepositoryNotification};
use epcis_query::QueryEngine;
use epcis_storage::{Storage, StorageError};
use tracing::{info, warn};

use crate::backoff::RetryPolicy;
use crate::coalesce::{CoalesceTracker, StartOutcome};
use crate::error::{SubscriptionError, SubscriptionResult};
use crate::oncapture::{spawn_bridge, Debouncer};
use crate::runner::{RunOutcome, SubscriptionRunner};
use crate::schedule::run_schedule_loop;

/// Debounce window for OnCapture coalescing.
pub const ONCAPTURE_DEBOUNCE: Duration = Duration::from_millis(250);
/// How often the OnSchedule loop re-lists active subscriptions from storage.
pub const SCHEDULE_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

pub struct SubscriptionEngineConfig {
    pub debounce: Duration,
    pub schedule_refresh_interval: Duration,
    pub retry_policy: RetryPolicy,
}

impl Default for SubscriptionEngineConfig {
    fn default() -> Self {
        Self {
            debounce: ONCAPTURE_DEBOUNCE,
            schedule_refresh_interval: SCHEDULE_REFRESH_INTERVAL,
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// The CRUD + run surface `epcis-api` drives directly. Cheap to clone
/// (everything inside is an `Arc`); every background task below holds its
/// own clone.
#[derive(Clone)]
pub struct SubscriptionEngine<S> {
    storage: Arc<S>,
    query_engine: Arc<QueryEngine<S>>,
    runner: Arc<SubscriptionRunner<S>>,
    coalesce: Arc<CoalesceTracker>,
}

impl<S> SubscriptionEngine<S>
where
    S: Storage + 'static,
{
    pub fn new(storage: Arc<S>, query_engine: Arc<QueryEngine<S>>, config: &SubscriptionEngineConfig) -> Self {
        let runner = SubscriptionRunner::new(storage.clone(), reqwest::Client::new(), config.retry_policy);
        Self {
            storage,
            query_engine,
            runner: Arc::new(runner),
            coalesce: Arc::new(CoalesceTracker::new()),
        }
    }

    /// `POST /queries/{name}/subscriptions`: create a standing query.
    /// `QueryError::SubscriptionAlreadyExists` and this crate's own
    /// `AlreadyExists` both surface the same storage-level name conflict —
    /// `epcis-api` only needs to see one of them, so this is what it sees.
    pub async fn create_subscription(&self, subscription: Subscription) -> SubscriptionResult<()> {
        match self.storage.create_subscription(subscription.clone()).await {
            Ok(()) => Ok(()),
            Err(StorageError::Conflict(_)) => Err(SubscriptionError::AlreadyExists(subscription.name)),
            Err(other) => Err(other.into()),
        }
    }

    pub async fn list_subscriptions(&self, tenant_id: &TenantId) -> SubscriptionResult<Vec<Subscription>> {
        Ok(self.storage.list_subscriptions(tenant_id).await?)
    }

    /// `DELETE /queries/{name}/subscriptions/{subscriptionId}`.
    pub async fn delete_subscription(&self, tenant_id: &TenantId, id: &SubscriptionId) -> SubscriptionResult<()> {
        if self.storage.delete_subscription(tenant_id, id).await? {
            Ok(())
        } else {
            Err(SubscriptionError::NotFound(id.to_string()))
        }
    }

    /// Run `subscription_id` now, honoring re-entrancy coalescing: if a run
    /// is already in flight, this trigger is absorbed into the queued
    /// follow-up instead of starting a second concurrent run.
    pub fn trigger(&self, tenant_id: TenantId, subscription_id: SubscriptionId, token: CancellationToken) {
        if self.coalesce.try_start(subscription_id) != StartOutcome::Start {
            return;
        }
        let engine = self.clone();
        tokio::spawn(async move {
            engine.run_until_dry(tenant_id, subscription_id, &token).await;
        });
    }

    /// Keep re-running `subscription_id` as long as a follow-up was queued
    /// while the previous run was in flight.
    async fn run_until_dry(&self, tenant_id: TenantId, subscription_id: SubscriptionId, token: &CancellationToken) {
        loop {
            self.run_one(&tenant_id, subscription_id, token).await;
            if !self.coalesce.finish(subscription_id) {
                return;
            }
        }
    }

    async fn run_one(&self, tenant_id: &TenantId, subscription_id: SubscriptionId, token: &CancellationToken) {
        let subscription = match self.storage.get_subscription(tenant_id, &subscription_id).await {
            Ok(Some(s)) if s.active => s,
            Ok(_) => return,
            Err(error) => {
                warn!(%subscription_id, ?error, "failed to load subscription for trigger");
                return;
            }
        };

        match self.runner.run_once(&self.query_engine, &subscription, token).await {
            Ok(RunOutcome::Delivered { event_count, watermark }) => {
                info!(subscription = %subscription.name, event_count, %watermark, "subscription delivered");
            }
            Ok(RunOutcome::DeliveredEmpty) => {
                info!(subscription = %subscription.name, "subscription delivered an empty report");
            }
            Ok(RunOutcome::NothingToReport) => {}
            Ok(RunOutcome::Failed { detail }) => {
                warn!(subscription = %subscription.name, detail, "subscription run failed");
            }
            Err(SubscriptionError::Canceled) => {}
            Err(error) => {
                warn!(subscription = %subscription.name, %error, "subscription delivery failed, moving to Idle");
            }
        }
    }
}

/// Owns the background tasks (OnCapture bridge + debouncer, OnSchedule
/// loop) and their shutdown token.
pub struct SubscriptionSupervisor {
    token: CancellationToken,
    bridge_thread: Option<std::thread::JoinHandle<()>>,
    dispatch_task: Option<tokio::task::JoinHandle<()>>,
    schedule_task: Option<tokio::task::JoinHandle<()>>,
}

impl SubscriptionSupervisor {
    /// Start the OnCapture and OnSchedule trigger loops for `engine`.
    pub fn spawn<S, B>(engine: SubscriptionEngine<S>, storage: Arc<S>, bus: Arc<B>, config: &SubscriptionEngineConfig) -> Self
    where
        S: Storage + 'static,
        B: EventBus<RepositoryNotification> + 'static,
    {
        let token = CancellationToken::new();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let bridge_thread = spawn_bridge(bus, tx, token.clone());

        let dispatch_engine = engine.clone();
        let dispatch_token = token.clone();
        let debouncer = Debouncer::new(config.debounce);
        let dispatch_task = tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                if dispatch_token.is_canceled() {
                    break;
                }
                let engine = dispatch_engine.clone();
                let token = dispatch_token.clone();
                let tenant_id = notification.tenant_id.clone();
                debouncer.notify(tenant_id, move |tenant_id| {
                    tokio::spawn(async move {
                        fire_tenant_oncapture_subscriptions(&engine, tenant_id, token).await;
                    });
                });
            }
        });

        let schedule_engine = engine.clone();
        let schedule_token = token.clone();
        let refresh_interval = config.schedule_refresh_interval;
        let schedule_task = tokio::spawn(async move {
            run_schedule_loop(storage.as_ref(), refresh_interval, &schedule_token, move |tenant_id, subscription_id| {
                schedule_engine.trigger(tenant_id, subscription_id, schedule_token.clone());
            })
            .await;
        });

        Self {
            token,
            bridge_thread: Some(bridge_thread),
            dispatch_task: Some(dispatch_task),
            schedule_task: Some(schedule_task),
        }
    }

    /// Request shutdown and wait for every background task to notice.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.dispatch_task.take() {
            let _ = task.await;
        }
        if let Some(task) = self.schedule_task.take() {
            let _ = task.await;
        }
        if let Some(thread) = self.bridge_thread.take() {
            let _ = thread.join();
        }
    }
}

async fn fire_tenant_oncapture_subscriptions<S>(engine: &SubscriptionEngine<S>, tenant_id: TenantId, token: CancellationToken)
where
    S: Storage + 'static,
{
    let subscriptions = match engine.list_subscriptions(&tenant_id).await {
        Ok(s) => s,
        Err(error) => {
            warn!(%tenant_id, ?error, "failed to list subscriptions for OnCapture dispatch");
            return;
        }
    };
    for subscription in subscriptions {
        if !subscription.active || !matches!(subscription.trigger, epcis_core::Trigger::OnCapture) {
            continue;
        }
        engine.trigger(tenant_id.clone(), subscription.subscription_id, token.clone());
    }
}
