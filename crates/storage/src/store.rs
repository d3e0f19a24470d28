//! The storage contract. One implementation per backend; `epcis-capture`,
//! `epcis-query`, and `epcis-subscriptions` depend only on this trait.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use epcis_core::{Capture, CaptureId, Event, EventId, MasterData, Subscription, SubscriptionId, TenantId};

use crate::error::StorageError;
use crate::predicate::{Order, Predicate};

#[async_trait]
pub trait Storage: Send + Sync {
    /// Persist a Capture and all of its Events/MasterData in one transaction
    /// (spec.md §3.1 "the transactional unit of ingestion"). `capture` must
    /// already have `record_time` set and every event's `event_id` assigned.
    async fn insert_capture(&self, capture: Capture) -> Result<(), StorageError>;

    async fn get_capture(&self, tenant_id: &TenantId, id: &CaptureId) -> Result<Option<Capture>, StorageError>;

    async fn list_captures(
        &self,
        tenant_id: &TenantId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Capture>, StorageError>;

    /// Phase 1 (spec.md §4.7): select matching event ids only, in `order`,
    /// capped at `cap` rows. Callers (epcis-query) are responsible for
    /// eventCountLimit/maxEventCount semantics and for requesting one extra
    /// row beyond their limit to detect overflow.
    ///
    /// Returns each id paired with the value of `order.field` for that row
    /// (`eventTime` or `recordTime`). Spec.md §4.5 describes this surface
    /// as returning bare ids, but `recordTime` lives on the owning Capture,
    /// not the Event (spec.md §3.1) — a caller paging by `recordTime`
    /// cannot recover the cursor's boundary value from the id alone, so
    /// this implementation carries it alongside the id instead of issuing
    /// a second round-trip per row.
    async fn select_event_ids(
        &self,
        tenant_id: &TenantId,
        predicate: &Predicate,
        order: Order,
        cap: u32,
    ) -> Result<Vec<(EventId, DateTime<Utc>)>, StorageError>;

    /// Phase 2 (spec.md §4.7): hydrate full events for exactly these ids.
    /// Implementations need not preserve `ids`' order; callers restore it
    /// via an id → position map (never `Vec::iter().position()`, which is
    /// the explicitly forbidden O(n²) approach).
    async fn hydrate_events(&self, tenant_id: &TenantId, ids: &[EventId]) -> Result<Vec<Event>, StorageError>;

    async fn list_master_data(
        &self,
        tenant_id: &TenantId,
        vocabulary_type: Option<&str>,
    ) -> Result<Vec<MasterData>, StorageError>;

    async fn upsert_master_data(&self, tenant_id: &TenantId, entries: Vec<MasterData>) -> Result<(), StorageError>;

    async fn create_subscription(&self, subscription: Subscription) -> Result<(), StorageError>;

    async fn get_subscription(
        &self,
        tenant_id: &TenantId,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, StorageError>;

    async fn list_subscriptions(&self, tenant_id: &TenantId) -> Result<Vec<Subscription>, StorageError>;

    /// Every active subscription across every tenant, used by the scheduler
    /// sweep and by the OnCapture dispatcher (which then filters by the
    /// notification's own tenant).
    async fn list_active_subscriptions(&self) -> Result<Vec<Subscription>, StorageError>;

    async fn delete_subscription(&self, tenant_id: &TenantId, id: &SubscriptionId) -> Result<bool, StorageError>;

    async fn advance_subscription_cursor(
        &self,
        tenant_id: &TenantId,
        id: &SubscriptionId,
        watermark: DateTime<Utc>,
    ) -> Result<bool, StorageError>;
}

#[async_trait]
impl<S> Storage for Arc<S>
where
    S: Storage + ?Sized,
{
    async fn insert_capture(&self, capture: Capture) -> Result<(), StorageError> {
        (**self).insert_capture(capture).await
    }

    async fn get_capture(&self, tenant_id: &TenantId, id: &CaptureId) -> Result<Option<Capture>, StorageError> {
        (**self).get_capture(tenant_id, id).await
    }

    async fn list_captures(
        &self,
        tenant_id: &TenantId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Capture>, StorageError> {
        (**self).list_captures(tenant_id, limit, offset).await
    }

    async fn select_event_ids(
        &self,
        tenant_id: &TenantId,
        predicate: &Predicate,
        order: Order,
        cap: u32,
    ) -> Result<Vec<(EventId, DateTime<Utc>)>, StorageError> {
        (**self).select_event_ids(tenant_id, predicate, order, cap).await
    }

    async fn hydrate_events(&self, tenant_id: &TenantId, ids: &[EventId]) -> Result<Vec<Event>, StorageError> {
        (**self).hydrate_events(tenant_id, ids).await
    }

    async fn list_master_data(
        &self,
        tenant_id: &TenantId,
        vocabulary_type: Option<&str>,
    ) -> Result<Vec<MasterData>, StorageError> {
        (**self).list_master_data(tenant_id, vocabulary_type).await
    }

    async fn upsert_master_data(&self, tenant_id: &TenantId, entries: Vec<MasterData>) -> Result<(), StorageError> {
        (**self).upsert_master_data(tenant_id, entries).await
    }

    async fn create_subscription(&self, subscription: Subscription) -> Result<(), StorageError> {
        (**self).create_subscription(subscription).await
    }

    async fn get_subscription(
        &self,
        tenant_id: &TenantId,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, StorageError> {
        (**self).get_subscription(tenant_id, id).await
    }

    async fn list_subscriptions(&self, tenant_id: &TenantId) -> Result<Vec<Subscription>, StorageError> {
        (**self).list_subscriptions(tenant_id).await
    }

    async fn list_active_subscriptions(&self) -> Result<Vec<Subscription>, StorageError> {
        (**self).list_active_subscriptions().await
    }

    async fn delete_subscription(&self, tenant_id: &TenantId, id: &SubscriptionId) -> Result<bool, StorageError> {
        (**self).delete_subscription(tenant_id, id).await
    }

    async fn advance_subscription_cursor(
        &self,
        tenant_id: &TenantId,
        id: &SubscriptionId,
        watermark: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        (**self).advance_subscription_cursor(tenant_id, id, watermark).await
    }
}
